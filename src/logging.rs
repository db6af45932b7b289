use crate::error::FetchError;
use crate::utils::truncate_str;
use tracing::{error, warn, Level};

#[cfg(feature = "logging")]
pub use subscriber::{setup_logging, LogConfig, LogLevelGuard};

fn create_separator(width: usize, ch: char) -> String {
    std::iter::repeat_n(ch, width).collect()
}

/// Level of the failure card: `WARN` for rejections, `ERROR` otherwise.
pub fn failure_card_level(error: &FetchError) -> Level {
    if error.is_rejection() {
        Level::WARN
    } else {
        Level::ERROR
    }
}

/// Logs a boxed card for an image URL that could not be turned into an
/// attachment.
pub fn log_fetch_failure_card(url: &str, error: &FetchError) {
    const CARD_WIDTH: usize = 70;
    const CONTENT_WIDTH: usize = CARD_WIDTH - 8;

    let top_bottom = create_separator(CARD_WIDTH - 2, '═');
    let middle = create_separator(CARD_WIDTH - 2, '─');

    let level = failure_card_level(error);
    let kind = if level == Level::WARN {
        "rejected"
    } else {
        "failed"
    };

    let card = format!(
        "\n╔═{}═╗\n\
         ║ URL: {:<width$} ║\n\
         ║{}║\n\
         ║ {}: {:<width$} ║\n\
         ╚═{}═╝",
        top_bottom,
        truncate_str(url, CONTENT_WIDTH),
        middle,
        kind,
        truncate_str(&error.to_string(), CONTENT_WIDTH),
        top_bottom,
        width = CONTENT_WIDTH
    );

    if level == Level::WARN {
        warn!("{}", card);
    } else {
        error!("{}", card);
    }
}

#[cfg(feature = "logging")]
mod subscriber {
    use crate::error::CleanerError;
    use std::path::PathBuf;
    use tracing::debug;
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{
        fmt as subscriber_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    #[derive(Debug)]
    pub struct LogConfig {
        pub log_dir: PathBuf,
        pub log_level: String,
        pub console_output: bool,
        pub file_output: bool,
    }

    impl Default for LogConfig {
        fn default() -> Self {
            Self {
                log_dir: "logs".into(),
                log_level: "info".into(),
                console_output: true,
                file_output: true,
            }
        }
    }

    /// Installs the global subscriber. Fails if one is already set.
    pub fn setup_logging(config: LogConfig) -> Result<(), CleanerError> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

        let mut layers = Vec::new();

        if config.console_output {
            let console_layer = subscriber_fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .pretty();
            layers.push(console_layer.boxed());
        }

        if config.file_output {
            std::fs::create_dir_all(&config.log_dir)
                .map_err(|e| CleanerError::Logging(format!("create log directory: {e}")))?;

            let file_appender =
                RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "url-cleaner.log");

            let file_layer = subscriber_fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_writer(file_appender);

            layers.push(file_layer.boxed());
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layers)
            .try_init()
            .map_err(|e| CleanerError::Logging(e.to_string()))?;

        debug!("Logging system initialized with config: {:?}", config);
        Ok(())
    }

    /// Scoped subscriber for tests and one-off debugging.
    pub struct LogLevelGuard {
        _guard: tracing::dispatcher::DefaultGuard,
    }

    impl LogLevelGuard {
        pub fn set_level(level: &str) -> Self {
            let filter = EnvFilter::new(level);
            let subscriber = tracing_subscriber::registry()
                .with(subscriber_fmt::layer())
                .with(filter);

            LogLevelGuard {
                _guard: tracing::subscriber::set_default(subscriber),
            }
        }
    }

}
