//! Infrastructure layer: ambient concerns that sit outside the domain and
//! service layers (spec ambient stack) - configuration loading and
//! structured logging setup.

pub mod config;
pub mod logging;
pub mod shell_executor;

pub use config::{ConfigError, ConfigLoader, EngineSettings};
pub use logging::{LogConfig, LogFormat, LoggerGuard};
pub use shell_executor::ShellAgentExecutor;
