//! Configuration loader and validator for the RSVP import service.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub webhook: Webhook,
    pub meetup: Meetup,
    pub eventbrite: Eventbrite,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    pub data_dir: String,
    /// Seconds between import passes in the long-running service.
    pub import_interval_secs: u64,
    /// Events starting before this instant are never imported.
    pub import_start_date: DateTime<Utc>,
    /// source_product_id stamped onto candidates created by this pipeline.
    pub source_product_id: i64,
    /// Optional domain stamped onto candidate sources.
    pub domain_id: Option<i64>,
}

/// Inbound webhook server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Webhook {
    pub bind_addr: String,
}

/// Meetup API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meetup {
    pub api_base: String,
    pub oauth_base: String,
    pub client_id: String,
    pub client_secret: String,
    pub social_network_id: i64,
}

/// Eventbrite API settings (webhook-driven; no polling import).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Eventbrite {
    pub api_base: String,
    pub social_network_id: i64,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.import_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.import_interval_secs must be > 0"));
    }
    if cfg.app.source_product_id <= 0 {
        return Err(ConfigError::Invalid("app.source_product_id must be > 0"));
    }

    if cfg.webhook.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("webhook.bind_addr must be non-empty"));
    }

    if cfg.meetup.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("meetup.api_base must be non-empty"));
    }
    if cfg.meetup.oauth_base.trim().is_empty() {
        return Err(ConfigError::Invalid("meetup.oauth_base must be non-empty"));
    }
    if cfg.meetup.client_id.trim().is_empty() {
        return Err(ConfigError::Invalid("meetup.client_id must be non-empty"));
    }
    if cfg.meetup.client_secret.trim().is_empty() {
        return Err(ConfigError::Invalid("meetup.client_secret must be non-empty"));
    }
    if cfg.meetup.social_network_id <= 0 {
        return Err(ConfigError::Invalid("meetup.social_network_id must be > 0"));
    }

    if cfg.eventbrite.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("eventbrite.api_base must be non-empty"));
    }
    if cfg.eventbrite.social_network_id <= 0 {
        return Err(ConfigError::Invalid("eventbrite.social_network_id must be > 0"));
    }
    if cfg.eventbrite.social_network_id == cfg.meetup.social_network_id {
        return Err(ConfigError::Invalid(
            "meetup and eventbrite social_network_id must differ",
        ));
    }

    Ok(())
}

/// Returns an example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  import_interval_secs: 3600
  import_start_date: "2016-01-01T00:00:00Z"
  source_product_id: 2
  domain_id: 1

webhook:
  bind_addr: "127.0.0.1:8083"

meetup:
  api_base: "https://api.meetup.com/2/"
  oauth_base: "https://secure.meetup.com/oauth2/access"
  client_id: "YOUR_MEETUP_CLIENT_ID"
  client_secret: "YOUR_MEETUP_CLIENT_SECRET"
  social_network_id: 13

eventbrite:
  api_base: "https://www.eventbriteapi.com/v3/"
  social_network_id: 18
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.meetup.social_network_id, 13);
    }

    #[test]
    fn invalid_interval() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.import_interval_secs = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("import_interval_secs")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_meetup_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.meetup.client_id = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("client_id")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.meetup.social_network_id = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn network_ids_must_differ() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.eventbrite.social_network_id = cfg.meetup.social_network_id;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("differ")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.source_product_id, 2);
        assert_eq!(cfg.webhook.bind_addr, "127.0.0.1:8083");
    }
}
