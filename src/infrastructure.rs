//! Infrastructure layer: HTTP transport, configuration, logging and the
//! terminal render sink.

pub mod api_client;
pub mod config; // Configuration file + environment layering
pub mod console_sink;
pub mod logging;

// Re-export commonly used items
pub use api_client::ApiClient;
pub use config::{ApiConfig, AppConfig, ConfigManager, LoggingConfig, MonitorConfig};
pub use console_sink::ConsoleSink;
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
