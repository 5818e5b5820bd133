pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod parser;
pub mod publisher;
pub mod query;
pub mod record;
pub mod server;
pub mod signals;
pub mod source;
pub mod store;
pub mod tailer;

use crate::config::{AppConfig, Profile};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` wins when set. Otherwise only `logger_name` and the HTTP
/// trace layer log at the configured level, everything else at warn.
/// The production profile writes one JSON object per line.
///
/// Note: This function can only be called once.
pub fn init_tracing(app: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(app));

    match app.profile {
        Profile::Development => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init(),
        Profile::Production => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().flatten_event(true))
            .init(),
    }
}

fn filter_directives(app: &AppConfig) -> String {
    let level = app.level_directive().unwrap_or_else(|_| "info".to_string());
    format!("warn,{}={},tower_http={}", app.logger_name, level, level)
}

fn default_filter(app: &AppConfig) -> EnvFilter {
    EnvFilter::try_new(filter_directives(app)).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::create_test_config;

    #[test]
    fn test_filter_directives() {
        let mut app = create_test_config().app;
        assert_eq!(filter_directives(&app), "warn,sherlock=info,tower_http=info");

        app.log_level = "WARNING".to_string();
        app.logger_name = "sherlock::tailer".to_string();
        assert_eq!(
            filter_directives(&app),
            "warn,sherlock::tailer=warn,tower_http=warn"
        );
    }

    #[test]
    fn test_filter_directives_invalid_level_falls_back() {
        let mut app = create_test_config().app;
        app.log_level = "LOUD".to_string();
        assert_eq!(filter_directives(&app), "warn,sherlock=info,tower_http=info");
    }
}
