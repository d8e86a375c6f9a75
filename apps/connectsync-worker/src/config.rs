//! Worker configuration loaded from environment variables.
//!
//! Kafka settings live in [`connectsync_events::KafkaConfig`] and are loaded
//! separately, only by the commands that talk to the broker.

use connectsync_engine::DEFAULT_SCHEMA;
use connectsync_events::{
    redrive::{DEFAULT_DEAD_LETTER_TOPIC, DEFAULT_MAX_ATTEMPTS},
    ReconnectPolicy, RedrivePolicy,
};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::logging::LogFormat;

const DEFAULT_TOPICS: &str = "salesforce.contact=Contact,salesforce.account=Account";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// A topic and the Salesforce object type its messages carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBinding {
    pub topic: String,
    pub record_type: String,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection URL, `postgresql://` scheme.
    pub database_url: String,
    pub database_max_connections: u32,
    /// Heroku Connect schema holding the mapped tables.
    pub schema: String,
    pub topics: Vec<TopicBinding>,
    /// `mapping.json` restricting writable objects and fields.
    pub mapping_path: Option<PathBuf>,
    /// Route failed handler work to retry or dead-letter topics.
    pub retry_enabled: bool,
    pub redrive: RedrivePolicy,
    pub reconnect: ReconnectPolicy,
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL")
            .map(|url| normalize_database_url(&url))
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let database_max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => parse_positive("DATABASE_MAX_CONNECTIONS", &raw)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let topics = parse_topics(&get("SYNC_TOPICS").unwrap_or_else(|| DEFAULT_TOPICS.to_string()))?;

        let redrive = RedrivePolicy {
            max_attempts: match get("SYNC_MAX_ATTEMPTS") {
                Some(raw) => parse_positive("SYNC_MAX_ATTEMPTS", &raw)?,
                None => DEFAULT_MAX_ATTEMPTS,
            },
            dead_letter_topic: get("SYNC_DEAD_LETTER_TOPIC")
                .unwrap_or_else(|| DEFAULT_DEAD_LETTER_TOPIC.to_string()),
        };
        if topics.iter().any(|b| b.topic == redrive.dead_letter_topic) {
            return Err(ConfigError::InvalidValue {
                var: "SYNC_DEAD_LETTER_TOPIC".to_string(),
                message: format!("'{}' is also a consumed topic", redrive.dead_letter_topic),
            });
        }

        let retry_enabled = match get("SYNC_RETRY_ENABLED") {
            Some(raw) => parse_bool("SYNC_RETRY_ENABLED", &raw)?,
            None => true,
        };

        let mut reconnect = ReconnectPolicy::default();
        if let Some(raw) = get("RECONNECT_MAX_ATTEMPTS") {
            reconnect.max_attempts = parse_number("RECONNECT_MAX_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = get("RECONNECT_INITIAL_DELAY_MS") {
            reconnect.initial_delay =
                Duration::from_millis(parse_number("RECONNECT_INITIAL_DELAY_MS", &raw)?);
        }
        if let Some(raw) = get("RECONNECT_MAX_DELAY_MS") {
            reconnect.max_delay = Duration::from_millis(parse_number("RECONNECT_MAX_DELAY_MS", &raw)?);
        }
        if reconnect.max_delay < reconnect.initial_delay {
            return Err(ConfigError::InvalidValue {
                var: "RECONNECT_MAX_DELAY_MS".to_string(),
                message: "must not be lower than RECONNECT_INITIAL_DELAY_MS".to_string(),
            });
        }

        let log_format = match get("LOG_FORMAT") {
            Some(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                var: "LOG_FORMAT".to_string(),
                message,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            database_url,
            database_max_connections,
            schema: get("HEROKU_CONNECT_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
            topics,
            mapping_path: get("SYNC_MAPPING_PATH").map(PathBuf::from),
            retry_enabled,
            redrive,
            reconnect,
            log_filter: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_format,
        })
    }

    /// Consumed topic names, in configuration order.
    #[must_use]
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|b| b.topic.clone()).collect()
    }
}

/// Rewrite the legacy `postgres://` scheme to `postgresql://`.
#[must_use]
pub fn normalize_database_url(url: &str) -> String {
    match url.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{rest}"),
        None => url.to_string(),
    }
}

/// Parse `topic=RecordType,...`.
pub fn parse_topics(raw: &str) -> Result<Vec<TopicBinding>, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        var: "SYNC_TOPICS".to_string(),
        message,
    };

    let mut bindings: Vec<TopicBinding> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (topic, record_type) = entry
            .split_once('=')
            .ok_or_else(|| invalid(format!("'{entry}' is not topic=RecordType")))?;
        let (topic, record_type) = (topic.trim(), record_type.trim());
        if topic.is_empty() || record_type.is_empty() {
            return Err(invalid(format!("'{entry}' is not topic=RecordType")));
        }
        if bindings.iter().any(|b| b.topic == topic) {
            return Err(invalid(format!("topic '{topic}' is bound twice")));
        }
        bindings.push(TopicBinding {
            topic: topic.to_string(),
            record_type: record_type.to_string(),
        });
    }

    if bindings.is_empty() {
        return Err(invalid("no topics configured".to_string()));
    }
    Ok(bindings)
}

fn parse_number<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        message: format!("expected a number, got '{raw}'"),
    })
}

fn parse_positive(var: &str, raw: &str) -> Result<u32, ConfigError> {
    match parse_number::<u32>(var, raw)? {
        0 => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            message: "must be at least 1".to_string(),
        }),
        n => Ok(n),
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            message: format!("expected a boolean, got '{raw}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://u:p@db:5432/app")]).unwrap();

        assert_eq!(config.database_url, "postgresql://u:p@db:5432/app");
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.schema, "salesforce");
        assert_eq!(
            config.topics,
            vec![
                TopicBinding {
                    topic: "salesforce.contact".to_string(),
                    record_type: "Contact".to_string(),
                },
                TopicBinding {
                    topic: "salesforce.account".to_string(),
                    record_type: "Account".to_string(),
                },
            ]
        );
        assert!(config.mapping_path.is_none());
        assert!(config.retry_enabled);
        assert_eq!(config.redrive, RedrivePolicy::default());
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_missing_database_url() {
        assert_eq!(
            load(&[]).unwrap_err(),
            ConfigError::MissingVar("DATABASE_URL".to_string())
        );
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgresql://db/app"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("HEROKU_CONNECT_SCHEMA", "hc"),
            ("SYNC_TOPICS", "sf.lead = Lead"),
            ("SYNC_MAPPING_PATH", "/app/mapping.json"),
            ("SYNC_MAX_ATTEMPTS", "1"),
            ("SYNC_DEAD_LETTER_TOPIC", "sf.dlq"),
            ("SYNC_RETRY_ENABLED", "false"),
            ("RECONNECT_MAX_ATTEMPTS", "0"),
            ("RECONNECT_INITIAL_DELAY_MS", "100"),
            ("RECONNECT_MAX_DELAY_MS", "1000"),
            ("LOG_FORMAT", "pretty"),
        ])
        .unwrap();

        assert_eq!(config.database_url, "postgresql://db/app");
        assert_eq!(config.database_max_connections, 12);
        assert_eq!(config.schema, "hc");
        assert_eq!(config.topic_names(), vec!["sf.lead"]);
        assert_eq!(config.topics[0].record_type, "Lead");
        assert_eq!(config.mapping_path, Some(PathBuf::from("/app/mapping.json")));
        assert_eq!(config.redrive.max_attempts, 1);
        assert_eq!(config.redrive.dead_letter_topic, "sf.dlq");
        assert!(!config.retry_enabled);
        assert_eq!(config.reconnect.max_attempts, 0);
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(100));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(1));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_invalid_values() {
        let base = ("DATABASE_URL", "postgresql://db/app");

        for (var, value) in [
            ("DATABASE_MAX_CONNECTIONS", "0"),
            ("SYNC_MAX_ATTEMPTS", "three"),
            ("SYNC_RETRY_ENABLED", "maybe"),
            ("RECONNECT_MAX_DELAY_MS", "10"),
            ("LOG_FORMAT", "xml"),
            ("SYNC_DEAD_LETTER_TOPIC", "salesforce.contact"),
        ] {
            let err = load(&[base, (var, value)]).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidValue { var: v, .. } if v == var),
                "{var}={value} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_parse_topics_rejects_malformed_entries() {
        assert!(parse_topics("salesforce.contact").is_err());
        assert!(parse_topics("=Contact").is_err());
        assert!(parse_topics("a=Contact,a=Account").is_err());
        assert!(parse_topics(" , ").is_err());
        assert_eq!(parse_topics("a=Contact,").unwrap().len(), 1);
    }

    #[test]
    fn test_normalize_database_url() {
        assert_eq!(normalize_database_url("postgres://h/d"), "postgresql://h/d");
        assert_eq!(normalize_database_url("postgresql://h/d"), "postgresql://h/d");
    }
}
