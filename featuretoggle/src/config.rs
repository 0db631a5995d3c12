use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Database index cannot be negative: {0}")]
    InvalidDatabase(i64),

    #[error("Service name cannot be empty")]
    EmptyServiceName,

    #[error("At least one mutation marker is required")]
    NoMutationMarkers,
}

/// Connection and namespace settings for a feature toggle client.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Redis host name or address
    pub host: String,
    /// Redis port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Redis logical database index
    #[serde(default)]
    pub db: i64,
    /// The namespace whose flags are served. Flags live in one hash named
    /// after the service.
    pub service_name: String,
    #[serde(default)]
    pub notifications: Notifications,
}

fn default_port() -> u16 {
    6379
}

impl Config {
    pub fn new<H, S>(host: H, port: u16, db: i64, service_name: S) -> Self
    where
        H: Into<String>,
        S: Into<String>,
    {
        Config {
            host: host.into(),
            port,
            db,
            service_name: service_name.into(),
            notifications: Notifications::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }

        if self.db < 0 {
            return Err(ValidationError::InvalidDatabase(self.db));
        }

        if self.service_name.trim().is_empty() {
            return Err(ValidationError::EmptyServiceName);
        }

        if self.notifications.mutation_markers.is_empty() {
            return Err(ValidationError::NoMutationMarkers);
        }

        Ok(())
    }

    /// Channel pattern matching every keyspace event of the configured database.
    pub fn subscription_pattern(&self) -> String {
        format!("__keyspace@{}__:*", self.db)
    }
}

/// Keyspace notification settings
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Notifications {
    /// Whether the client enables keyspace notifications on the server at
    /// startup. Disable this when the server is managed and `CONFIG` is
    /// not permitted; notifications must then be enabled out of band.
    #[serde(default = "default_configure")]
    pub configure: bool,
    /// Value written to `notify-keyspace-events`
    #[serde(default = "default_keyspace_events")]
    pub keyspace_events: String,
    /// Event payloads that cause a cache rebuild
    #[serde(default = "default_mutation_markers")]
    pub mutation_markers: Vec<String>,
}

impl Default for Notifications {
    fn default() -> Self {
        Notifications {
            configure: default_configure(),
            keyspace_events: default_keyspace_events(),
            mutation_markers: default_mutation_markers(),
        }
    }
}

fn default_configure() -> bool {
    true
}

fn default_keyspace_events() -> String {
    "KEA".into()
}

// Every event after which the hash may hold different fields: field writes,
// deletion, a hash renamed into place, and key expiry.
fn default_mutation_markers() -> Vec<String> {
    [
        "hset",
        "hsetnx",
        "hincrby",
        "hincrbyfloat",
        "hdel",
        "del",
        "rename_to",
        "expired",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
host: redis.internal
service_name: checkout
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.host, "redis.internal");
        assert_eq!(config.port, 6379);
        assert_eq!(config.db, 0);
        assert_eq!(config.service_name, "checkout");
        assert_eq!(config.notifications, Notifications::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_mutation_markers() {
        let markers = Notifications::default().mutation_markers;
        for marker in [
            "hset",
            "hsetnx",
            "hincrby",
            "hincrbyfloat",
            "hdel",
            "del",
            "rename_to",
            "expired",
        ] {
            assert!(markers.iter().any(|m| m == marker), "missing {marker}");
        }
        assert!(!markers.iter().any(|m| m == "expire"));
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
host: 10.0.0.5
port: 6380
db: 3
service_name: payments
notifications:
    configure: false
    keyspace_events: Kh
    mutation_markers:
        - hset
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, 6380);
        assert_eq!(config.db, 3);
        assert!(!config.notifications.configure);
        assert_eq!(config.notifications.keyspace_events, "Kh");
        assert_eq!(config.notifications.mutation_markers, vec!["hset"]);
        assert_eq!(config.subscription_pattern(), "__keyspace@3__:*");
    }

    #[test]
    fn test_validate() {
        let mut config = Config::new("localhost", 0, 0, "svc");
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));

        config.port = 6379;
        config.db = -1;
        assert_eq!(config.validate(), Err(ValidationError::InvalidDatabase(-1)));

        config.db = 0;
        config.service_name = "  ".into();
        assert_eq!(config.validate(), Err(ValidationError::EmptyServiceName));

        config.service_name = "svc".into();
        config.notifications.mutation_markers.clear();
        assert_eq!(config.validate(), Err(ValidationError::NoMutationMarkers));
    }
}
