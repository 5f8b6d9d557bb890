use crate::types::ResourceKind;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("retry_attempts must be at least 1")]
    InvalidRetryAttempts,

    #[error("breaker_failure_threshold must be at least 1")]
    InvalidFailureThreshold,

    #[error("critical_timeout_secs must be at least 1")]
    InvalidCriticalTimeout,

    #[error("http_timeout_secs for {0} must be at least 1")]
    InvalidHttpTimeout(ResourceKind),

    #[error("Channel capacity must be at least 1")]
    InvalidChannelCapacity,
}

/// Composite service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the aggregate API
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    pub admin_listener: Listener,
    /// Address reported as `cmp` in aggregate provenance. Defaults to the
    /// API listener's host:port.
    #[serde(default)]
    pub service_address: Option<String>,
    /// Base URLs of the record services
    pub downstreams: Downstreams,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.resilience.validate()?;

        for kind in ResourceKind::ALL {
            if self.downstreams.get(kind).http_timeout_secs == 0 {
                return Err(ValidationError::InvalidHttpTimeout(kind));
            }
        }

        if self.channels.capacity == 0 {
            return Err(ValidationError::InvalidChannelCapacity);
        }

        Ok(())
    }

    pub fn service_address(&self) -> String {
        self.service_address
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.listener.host, self.listener.port))
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Downstreams {
    pub post: DownstreamConfig,
    pub reaction: DownstreamConfig,
    pub comment: DownstreamConfig,
    pub image: DownstreamConfig,
}

impl Downstreams {
    pub fn get(&self, kind: ResourceKind) -> &DownstreamConfig {
        match kind {
            ResourceKind::Post => &self.post,
            ResourceKind::Reaction => &self.reaction,
            ResourceKind::Comment => &self.comment,
            ResourceKind::Image => &self.image,
        }
    }
}

/// A single record service
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DownstreamConfig {
    /// Collection URL of the record service, e.g. `http://post:8080/post`.
    /// Single records are addressed as `<url>/{postId}`, lists as
    /// `<url>?postId={postId}`.
    pub url: Url,
    /// Per-request bound applied by the HTTP client
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_http_timeout_secs() -> u64 {
    5
}

/// Reliability policy for the critical dependency
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Total attempts per call, including the first one
    pub retry_attempts: u32,
    /// Pause between attempts
    pub retry_wait_millis: u64,
    /// Consecutive failures after which the circuit opens
    pub breaker_failure_threshold: u32,
    /// How long the circuit stays open before a probe is let through
    pub breaker_cooldown_secs: u64,
    /// Bound on the whole retry sequence
    pub critical_timeout_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_wait_millis: 200,
            breaker_failure_threshold: 5,
            breaker_cooldown_secs: 10,
            critical_timeout_secs: 2,
        }
    }
}

impl ResilienceConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.retry_attempts == 0 {
            return Err(ValidationError::InvalidRetryAttempts);
        }
        if self.breaker_failure_threshold == 0 {
            return Err(ValidationError::InvalidFailureThreshold);
        }
        if self.critical_timeout_secs == 0 {
            return Err(ValidationError::InvalidCriticalTimeout);
        }
        Ok(())
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_millis)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }

    pub fn critical_timeout(&self) -> Duration {
        Duration::from_secs(self.critical_timeout_secs)
    }
}

/// Outbound write channels
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    /// Buffered intents per channel before publishing fails
    pub capacity: usize,
    /// Delivery attempts after the first before an intent is dropped
    pub delivery_retries: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            delivery_retries: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_YAML: &str = r#"
listener:
    host: "0.0.0.0"
    port: 7000
admin_listener:
    host: "127.0.0.1"
    port: 7001
downstreams:
    post:
        url: "http://post:8080/post"
        http_timeout_secs: 3
    reaction:
        url: "http://reaction:8080/reaction"
    comment:
        url: "http://comment:8080/comment"
    image:
        url: "http://image:8080/image"
resilience:
    retry_attempts: 2
    breaker_failure_threshold: 4
    breaker_cooldown_secs: 30
    critical_timeout_secs: 1
"#;

    #[test]
    fn test_parse_valid_config() {
        let config: Config = serde_yaml::from_str(VALID_YAML).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.listener.port, 7000);
        assert_eq!(config.downstreams.post.http_timeout_secs, 3);
        assert_eq!(config.downstreams.image.http_timeout_secs, 5);
        assert_eq!(
            config.downstreams.get(ResourceKind::Comment).url.as_str(),
            "http://comment:8080/comment"
        );
        assert_eq!(config.resilience.retry_attempts, 2);
        // Unset fields fall back to defaults
        assert_eq!(config.resilience.retry_wait_millis, 200);
        assert_eq!(config.resilience.breaker_cooldown(), Duration::from_secs(30));
        assert_eq!(config.channels, ChannelConfig::default());
        assert_eq!(config.service_address(), "0.0.0.0:7000");
    }

    #[test]
    fn test_validation_errors() {
        let base_config: Config = serde_yaml::from_str(VALID_YAML).unwrap();

        let mut config = base_config.clone();
        config.admin_listener.port = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));

        let mut config = base_config.clone();
        config.resilience.retry_attempts = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidRetryAttempts));

        let mut config = base_config.clone();
        config.resilience.breaker_failure_threshold = 0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidFailureThreshold)
        );

        let mut config = base_config.clone();
        config.resilience.critical_timeout_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidCriticalTimeout)
        );

        let mut config = base_config.clone();
        config.downstreams.reaction.http_timeout_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidHttpTimeout(ResourceKind::Reaction))
        );

        let mut config = base_config;
        config.channels.capacity = 0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidChannelCapacity)
        );
    }

    #[test]
    fn test_deserialization_errors() {
        // Invalid URL
        assert!(
            serde_yaml::from_str::<DownstreamConfig>(r#"{url: "not-a-url"}"#).is_err()
        );

        // Missing downstreams
        assert!(
            serde_yaml::from_str::<Config>(
                r#"
listener: {host: "0.0.0.0", port: 7000}
admin_listener: {host: "127.0.0.1", port: 7001}
"#
            )
            .is_err()
        );

        // Invalid port type
        assert!(serde_yaml::from_str::<Listener>(r#"{host: "0.0.0.0", port: "x"}"#).is_err());
    }
}
