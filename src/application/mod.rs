// Application layer: the transfer engine and the services it leans on
// (configuration, audit trail, caller-facing errors).

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;

pub use audit::*;
pub use config::*;
pub use engine::*;
pub use error::*;
