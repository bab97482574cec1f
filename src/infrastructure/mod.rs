//! Infrastructure layer
//!
//! Engine configuration and logging setup.

mod config;
mod logging;

pub use config::EngineConfig;
pub use logging::init_logging;
