pub mod error;
mod fields;
pub mod ids;
pub mod request;
pub mod session;
pub mod snapshot;
pub mod task;
pub mod value;

pub use error::*;
pub use ids::*;
pub use request::*;
pub use session::*;
pub use snapshot::*;
pub use task::*;
pub use value::*;
