pub mod config;
pub mod logging;
pub mod retry;
pub mod rt;

pub use config::{ConfigError, ConfigFile, Environment};
pub use logging::setup_logging;
