//! Kafka connection configuration.

use crate::error::EventError;
use crate::tls::{CredentialDelivery, MaterializedCredentials, TlsCredentials};
use std::env;

/// Scheme prefix used by the hosting provider's `KAFKA_URL`.
const ENDPOINT_SCHEME: &str = "kafka+ssl://";

const DEFAULT_CLIENT_ID: &str = "connectsync";

/// Kafka connection configuration for mutual-TLS clusters.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Broker addresses (`host:port`), scheme already stripped.
    pub bootstrap_servers: Vec<String>,
    /// Client certificate, key, and trusted CA.
    pub credentials: TlsCredentials,
    /// Consumer group (required for consumers only).
    pub consumer_group: Option<String>,
    /// Client identifier.
    pub client_id: String,
    /// How credentials are handed to librdkafka.
    pub credential_delivery: CredentialDelivery,
    /// Whether the broker certificate must match its hostname.
    pub verify_hostname: bool,
}

impl KafkaConfig {
    /// Build a configuration from raw endpoint and credential strings.
    ///
    /// `bootstrap_endpoints` is a comma-separated list; each entry may carry
    /// the `kafka+ssl://` prefix.
    pub fn configure(
        bootstrap_endpoints: &str,
        client_certificate: &str,
        client_key: &str,
        trusted_ca: &str,
        consumer_group: Option<&str>,
    ) -> Result<Self, EventError> {
        let mut builder = Self::builder()
            .bootstrap_endpoints(bootstrap_endpoints)
            .credentials(client_certificate, client_key, trusted_ca);
        if let Some(group) = consumer_group {
            builder = builder.consumer_group(group);
        }
        builder.build()
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `KAFKA_URL`: Comma-separated broker list (`kafka+ssl://host:port,...`)
    /// - `KAFKA_CLIENT_CERT`: Client certificate PEM
    /// - `KAFKA_CLIENT_CERT_KEY`: Client private key PEM
    /// - `KAFKA_TRUSTED_CERT`: Trusted CA PEM
    ///
    /// Optional:
    /// - `CONSUMER_GROUP`: Consumer group id
    /// - `KAFKA_CLIENT_ID`: Client identifier (default: "connectsync")
    /// - `KAFKA_CREDENTIAL_DELIVERY`: `memory` (default) or `files`
    /// - `KAFKA_SSL_VERIFY_HOSTNAME`: `true` (default) or `false`
    pub fn from_env() -> Result<Self, EventError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EventError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |var: &str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| EventError::ConfigMissing {
                    var: var.to_string(),
                })
        };

        let endpoints = require("KAFKA_URL")?;
        let certificate = require("KAFKA_CLIENT_CERT")?;
        let key = require("KAFKA_CLIENT_CERT_KEY")?;
        let ca = require("KAFKA_TRUSTED_CERT")?;

        let mut builder = Self::builder()
            .bootstrap_endpoints(&endpoints)
            .credentials(certificate, key, ca);

        if let Some(group) = lookup("CONSUMER_GROUP").filter(|g| !g.trim().is_empty()) {
            builder = builder.consumer_group(group);
        }
        if let Some(client_id) = lookup("KAFKA_CLIENT_ID") {
            builder = builder.client_id(client_id);
        }
        if let Some(delivery) = lookup("KAFKA_CREDENTIAL_DELIVERY") {
            builder = builder.credential_delivery(delivery.parse()?);
        }
        if let Some(verify) = lookup("KAFKA_SSL_VERIFY_HOSTNAME") {
            builder = builder.verify_hostname(parse_bool("KAFKA_SSL_VERIFY_HOSTNAME", &verify)?);
        }

        builder.build()
    }

    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> KafkaConfigBuilder {
        KafkaConfigBuilder::new()
    }

    /// Broker list in librdkafka's `bootstrap.servers` format.
    #[must_use]
    pub fn bootstrap_list(&self) -> String {
        self.bootstrap_servers.join(",")
    }

    /// Consumer group, or a configuration error when none was set.
    pub fn require_consumer_group(&self) -> Result<&str, EventError> {
        self.consumer_group
            .as_deref()
            .ok_or_else(|| EventError::ConfigMissing {
                var: "CONSUMER_GROUP".to_string(),
            })
    }

    /// Properties shared by producers and consumers.
    ///
    /// The returned credentials must outlive the client built from these
    /// properties.
    pub fn client_properties(
        &self,
    ) -> Result<(Vec<(&'static str, String)>, MaterializedCredentials), EventError> {
        let materialized = self.credentials.materialize(self.credential_delivery)?;

        let mut props = vec![
            ("bootstrap.servers", self.bootstrap_list()),
            ("client.id", self.client_id.clone()),
            ("security.protocol", "ssl".to_string()),
            (
                "ssl.endpoint.identification.algorithm",
                if self.verify_hostname { "https" } else { "none" }.to_string(),
            ),
        ];
        props.extend(materialized.client_properties());

        Ok((props, materialized))
    }
}

/// Split a raw endpoint list, stripping the provider scheme from every entry.
pub fn parse_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .map(|endpoint| endpoint.strip_prefix(ENDPOINT_SCHEME).unwrap_or(endpoint))
        .filter(|endpoint| !endpoint.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(var: &str, value: &str) -> Result<bool, EventError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(EventError::ConfigInvalid {
            var: var.to_string(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

/// Builder for `KafkaConfig`.
#[derive(Debug, Default)]
pub struct KafkaConfigBuilder {
    bootstrap_servers: Vec<String>,
    credentials: Option<(String, String, String)>,
    consumer_group: Option<String>,
    client_id: Option<String>,
    credential_delivery: Option<CredentialDelivery>,
    verify_hostname: Option<bool>,
}

impl KafkaConfigBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add endpoints from a comma-separated list.
    #[must_use]
    pub fn bootstrap_endpoints(mut self, raw: &str) -> Self {
        self.bootstrap_servers.extend(parse_endpoints(raw));
        self
    }

    /// Set the PEM credential material (validated in `build`).
    #[must_use]
    pub fn credentials(
        mut self,
        client_certificate: impl Into<String>,
        client_key: impl Into<String>,
        trusted_ca: impl Into<String>,
    ) -> Self {
        self.credentials = Some((
            client_certificate.into(),
            client_key.into(),
            trusted_ca.into(),
        ));
        self
    }

    /// Set consumer group.
    #[must_use]
    pub fn consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = Some(group.into());
        self
    }

    /// Set client ID.
    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Set credential delivery mode.
    #[must_use]
    pub fn credential_delivery(mut self, delivery: CredentialDelivery) -> Self {
        self.credential_delivery = Some(delivery);
        self
    }

    /// Enable or disable broker hostname verification.
    #[must_use]
    pub fn verify_hostname(mut self, verify: bool) -> Self {
        self.verify_hostname = Some(verify);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<KafkaConfig, EventError> {
        if self.bootstrap_servers.is_empty() {
            return Err(EventError::ConfigInvalid {
                var: "bootstrap_servers".to_string(),
                reason: "endpoint list is empty".to_string(),
            });
        }

        let (certificate, key, ca) = self.credentials.ok_or(EventError::ConfigMissing {
            var: "tls_credentials".to_string(),
        })?;
        let credentials = TlsCredentials::parse(certificate, key, ca)?;

        Ok(KafkaConfig {
            bootstrap_servers: self.bootstrap_servers,
            credentials,
            consumer_group: self.consumer_group,
            client_id: self
                .client_id
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            credential_delivery: self.credential_delivery.unwrap_or_default(),
            verify_hostname: self.verify_hostname.unwrap_or(true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::fixtures::{CERT_PEM, KEY_PEM};
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_parse_endpoints_strips_scheme() {
        let endpoints = parse_endpoints(
            "kafka+ssl://ec2-1.compute.amazonaws.com:9096, kafka+ssl://ec2-2.compute.amazonaws.com:9096",
        );
        assert_eq!(
            endpoints,
            vec![
                "ec2-1.compute.amazonaws.com:9096".to_string(),
                "ec2-2.compute.amazonaws.com:9096".to_string(),
            ]
        );
        assert_eq!(parse_endpoints("localhost:9093"), vec!["localhost:9093"]);
        assert!(parse_endpoints(" , ").is_empty());
    }

    #[test]
    fn test_configure_success() {
        let config = KafkaConfig::configure(
            "kafka+ssl://broker-1:9096,kafka+ssl://broker-2:9096",
            CERT_PEM,
            KEY_PEM,
            CERT_PEM,
            Some("connectsync-workers"),
        )
        .unwrap();

        assert_eq!(config.bootstrap_list(), "broker-1:9096,broker-2:9096");
        assert_eq!(config.consumer_group.as_deref(), Some("connectsync-workers"));
        assert_eq!(config.client_id, "connectsync");
        assert_eq!(config.credential_delivery, CredentialDelivery::InMemory);
        assert!(config.verify_hostname);
    }

    #[test]
    fn test_configure_empty_endpoints() {
        let result = KafkaConfig::configure("", CERT_PEM, KEY_PEM, CERT_PEM, None);
        match result {
            Err(err @ EventError::ConfigInvalid { .. }) => assert!(err.is_config_error()),
            other => panic!("Expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_configure_malformed_key() {
        let result = KafkaConfig::configure("broker:9096", CERT_PEM, "not a key", CERT_PEM, None);
        assert!(matches!(result, Err(EventError::CredentialInvalid { .. })));
    }

    #[test]
    fn test_builder_missing_credentials() {
        let result = KafkaConfig::builder()
            .bootstrap_endpoints("localhost:9093")
            .build();
        if let Err(EventError::ConfigMissing { var }) = result {
            assert_eq!(var, "tls_credentials");
        } else {
            panic!("Expected ConfigMissing error");
        }
    }

    #[test]
    fn test_from_lookup_missing_url() {
        let result = KafkaConfig::from_lookup(lookup_from(&[]));
        if let Err(EventError::ConfigMissing { var }) = result {
            assert_eq!(var, "KAFKA_URL");
        } else {
            panic!("Expected ConfigMissing error");
        }
    }

    #[test]
    fn test_from_lookup_full() {
        let config = KafkaConfig::from_lookup(lookup_from(&[
            ("KAFKA_URL", "kafka+ssl://broker:9096"),
            ("KAFKA_CLIENT_CERT", CERT_PEM),
            ("KAFKA_CLIENT_CERT_KEY", KEY_PEM),
            ("KAFKA_TRUSTED_CERT", CERT_PEM),
            ("CONSUMER_GROUP", "sync-group"),
            ("KAFKA_CREDENTIAL_DELIVERY", "files"),
            ("KAFKA_SSL_VERIFY_HOSTNAME", "false"),
        ]))
        .unwrap();

        assert_eq!(config.bootstrap_servers, vec!["broker:9096"]);
        assert_eq!(config.require_consumer_group().unwrap(), "sync-group");
        assert_eq!(config.credential_delivery, CredentialDelivery::TempFiles);
        assert!(!config.verify_hostname);
    }

    #[test]
    fn test_from_lookup_rejects_bad_bool() {
        let result = KafkaConfig::from_lookup(lookup_from(&[
            ("KAFKA_URL", "broker:9096"),
            ("KAFKA_CLIENT_CERT", CERT_PEM),
            ("KAFKA_CLIENT_CERT_KEY", KEY_PEM),
            ("KAFKA_TRUSTED_CERT", CERT_PEM),
            ("KAFKA_SSL_VERIFY_HOSTNAME", "maybe"),
        ]));
        assert!(matches!(result, Err(EventError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_require_consumer_group_missing() {
        let config =
            KafkaConfig::configure("broker:9096", CERT_PEM, KEY_PEM, CERT_PEM, None).unwrap();
        assert!(config.require_consumer_group().is_err());
    }

    #[test]
    fn test_client_properties() {
        let config = KafkaConfig::builder()
            .bootstrap_endpoints("kafka+ssl://broker:9096")
            .credentials(CERT_PEM, KEY_PEM, CERT_PEM)
            .verify_hostname(false)
            .build()
            .unwrap();

        let (props, _credentials) = config.client_properties().unwrap();
        let get = |name: &str| {
            props
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.clone())
        };

        assert_eq!(get("bootstrap.servers").as_deref(), Some("broker:9096"));
        assert_eq!(get("security.protocol").as_deref(), Some("ssl"));
        assert_eq!(
            get("ssl.endpoint.identification.algorithm").as_deref(),
            Some("none")
        );
        assert_eq!(get("ssl.key.pem").as_deref(), Some(KEY_PEM));
    }
}
