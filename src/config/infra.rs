//! Infra-only settings the worker needs before it can even ask the state
//! store for a bot document: where the store lives, where alerts go, how
//! chatty logging should be. Layered the way this codebase layers its other
//! config: defaults, then an optional TOML file, then environment overrides.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct InfraConfig {
    #[serde(default = "default_store_uri")]
    pub store_uri: String,

    #[serde(default = "default_webhook_url")]
    pub webhook_url: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Overrides `BotConfig::update_interval_secs` when set; `None` leaves
    /// the per-bot value from the state store untouched.
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

fn default_store_uri() -> String {
    "sqlite://bot_engine.db".to_string()
}

fn default_webhook_url() -> String {
    "http://localhost:8787/notify".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            store_uri: default_store_uri(),
            webhook_url: default_webhook_url(),
            log_level: default_log_level(),
            poll_interval_secs: None,
        }
    }
}

impl InfraConfig {
    /// Loads `config_path` (if it exists) over the defaults, then lets
    /// `BOT_` prefixed environment variables (e.g. `BOT_STORE_URI`) win.
    pub fn load(config_path: &str) -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .set_default("store_uri", default_store_uri())?
            .set_default("webhook_url", default_webhook_url())?
            .set_default("log_level", default_log_level())?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("BOT").try_parsing(true));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_any_file_or_env() {
        let cfg = InfraConfig::default();
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.poll_interval_secs.is_none());
    }

    #[test]
    fn load_falls_back_to_defaults_when_file_missing() {
        let cfg = InfraConfig::load("nonexistent_config_file_xyz").unwrap();
        assert_eq!(cfg.store_uri, default_store_uri());
    }
}
