pub mod config;
pub mod error;
pub mod project;

pub use config::*;
pub use error::*;
pub use project::*;
