pub mod memory;
pub mod provenance;
pub mod traits;

pub use memory::*;
pub use provenance::*;
pub use traits::*;
