use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "learning-platform";
const MAX_LOG_FILES: usize = 30;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_file_logs: false,
            log_dir: "./logs".to_string(),
        }
    }
}

impl From<&Config> for LogConfig {
    fn from(config: &Config) -> Self {
        Self {
            log_level: config.log_level.clone(),
            enable_file_logs: config.enable_file_logs,
            log_dir: config.log_dir.clone(),
        }
    }
}

/// Installs the global subscriber: human-readable stdout plus, when enabled,
/// daily-rotated JSON files. Calling it twice is harmless.
pub fn init_tracing(config: &LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let stdout_layer = fmt::layer().with_target(true).with_thread_ids(false);

    let registry = Registry::default().with(env_filter).with(stdout_layer);

    let file_appender = if config.enable_file_logs {
        match RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .max_log_files(MAX_LOG_FILES)
            .build(&config.log_dir)
        {
            Ok(appender) => Some(appender),
            Err(e) => {
                eprintln!("file logging disabled, cannot open {}: {e}", config.log_dir);
                None
            }
        }
    } else {
        None
    };

    let result = match file_appender {
        Some(appender) => {
            let file_layer = fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .json();
            registry.with(file_layer).try_init()
        }
        None => registry.try_init(),
    };

    // A subscriber installed earlier (tests, embedding) wins.
    if let Err(e) = result {
        let msg = e.to_string();
        if !msg.contains("already been set") {
            eprintln!("failed to initialize tracing: {e}");
        }
    }
}
