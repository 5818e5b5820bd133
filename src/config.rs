use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub app: AppConfig,
    pub server: ServerConfig,
    pub tailer: TailerConfig,
    pub store: StoreConfig,
    pub query: QueryConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Human-readable log output
    Development,
    /// JSON log lines
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Html,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Application name, also the path prefix of the query routes
    pub name: String,
    pub profile: Profile,
    /// Tracing target whose level is controlled by `log_level`
    pub logger_name: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TailerConfig {
    /// Namespace the ingress controller pods run in
    pub namespace: String,
    /// Optional label selector narrowing the controller pods
    pub label_selector: String,
    pub kubectl: String,
    pub stall_timeout_seconds: u64,
    pub restart_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    pub lagger_threshold_seconds: f64,
    pub default_format: OutputFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublishConfig {
    /// Status sink; empty disables publishing
    pub url: String,
    pub key: String,
    /// Scheme placed before the key in the Authorization header
    pub auth_scheme: String,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
}

impl AppConfig {
    /// Translate the configured level, which may use Python-style names
    /// such as `WARNING`, into a tracing level directive.
    pub fn level_directive(&self) -> anyhow::Result<String> {
        let level = match self.log_level.to_ascii_lowercase().as_str() {
            "warning" => "warn".to_string(),
            "critical" => "error".to_string(),
            other => other.to_string(),
        };
        level
            .parse::<tracing::level_filters::LevelFilter>()
            .map_err(|_| anyhow::anyhow!("Invalid log level: {}", self.log_level))?;
        Ok(level)
    }
}

impl TailerConfig {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_seconds)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_seconds)
    }
}

impl PublishConfig {
    pub fn enabled(&self) -> bool {
        !self.url.is_empty()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Environment variables the service has always been deployed with
const DEPLOYED_ENV: [(&str, &str); 6] = [
    ("SAFIR_NAME", "app.name"),
    ("SAFIR_PROFILE", "app.profile"),
    ("SAFIR_LOGGER", "app.logger_name"),
    ("SAFIR_LOG_LEVEL", "app.log_level"),
    ("PUBLISH_URL", "publish.url"),
    ("PUBLISH_KEY", "publish.key"),
];

pub fn load_config() -> anyhow::Result<Config> {
    load_config_with(|name| std::env::var(name).ok())
}

/// Layering, lowest precedence first: defaults, optional `sherlock.*` file,
/// `SHERLOCK__SECTION__KEY` variables, then the deployed variable names.
fn load_config_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
    let mut builder = config::Config::builder()
        .set_default("app.name", "sherlock")?
        .set_default("app.profile", "development")?
        .set_default("app.logger_name", "sherlock")?
        .set_default("app.log_level", "INFO")?
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080_i64)?
        .set_default("tailer.namespace", "ingress-nginx")?
        .set_default("tailer.label_selector", "")?
        .set_default("tailer.kubectl", "kubectl")?
        .set_default("tailer.stall_timeout_seconds", 300_i64)?
        .set_default("tailer.restart_seconds", 60_i64)?
        .set_default("store.capacity", crate::store::DEFAULT_CAPACITY as i64)?
        .set_default("query.lagger_threshold_seconds", crate::query::DEFAULT_LAGGER_THRESHOLD)?
        .set_default("query.default_format", "json")?
        .set_default("publish.url", "")?
        .set_default("publish.key", "")?
        .set_default("publish.auth_scheme", "digest")?
        .set_default("publish.interval_seconds", 60_i64)?
        .set_default("publish.timeout_seconds", 10_i64)?
        .add_source(config::File::with_name("sherlock").required(false))
        .add_source(config::Environment::with_prefix("SHERLOCK").separator("__"));

    for (variable, key) in DEPLOYED_ENV {
        builder = builder.set_override_option(key, env(variable))?;
    }

    let cfg: Config = builder.build()?.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.app.name.is_empty() || cfg.app.name.contains('/') {
        anyhow::bail!("Application name must be a non-empty path segment");
    }

    cfg.app.level_directive()?;

    if cfg.store.capacity == 0 {
        anyhow::bail!("Store capacity must be at least 1");
    }

    if cfg.tailer.stall_timeout_seconds == 0 {
        anyhow::bail!("Tailer stall timeout must be greater than zero");
    }

    if cfg.tailer.restart_seconds == 0 {
        anyhow::bail!("Tailer restart delay must be greater than zero");
    }

    if !cfg.query.lagger_threshold_seconds.is_finite() || cfg.query.lagger_threshold_seconds < 0.0 {
        anyhow::bail!("Lagger threshold must be a non-negative number of seconds");
    }

    if cfg.publish.enabled() {
        let url = reqwest::Url::parse(&cfg.publish.url)
            .map_err(|e| anyhow::anyhow!("Invalid publish URL '{}': {}", cfg.publish.url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Publish URL must use http or https, got '{}'", url.scheme());
        }
        if cfg.publish.interval_seconds == 0 {
            anyhow::bail!("Publish interval must be greater than zero");
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn create_test_config() -> Config {
    Config {
        app: AppConfig {
            name: "sherlock".to_string(),
            profile: Profile::Development,
            logger_name: "sherlock".to_string(),
            log_level: "INFO".to_string(),
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        },
        tailer: TailerConfig {
            namespace: "ingress-nginx".to_string(),
            label_selector: String::new(),
            kubectl: "kubectl".to_string(),
            stall_timeout_seconds: 300,
            restart_seconds: 60,
        },
        store: StoreConfig { capacity: 100 },
        query: QueryConfig {
            lagger_threshold_seconds: 30.0,
            default_format: OutputFormat::Json,
        },
        publish: PublishConfig {
            url: String::new(),
            key: String::new(),
            auth_scheme: "digest".to_string(),
            interval_seconds: 60,
            timeout_seconds: 10,
        },
    }
}
