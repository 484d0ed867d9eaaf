use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: tracing::Level,
    /// Object-store credentials. When unset the service runs against
    /// the in-memory storage double (ephemeral mode).
    pub swift: Option<SwiftSettings>,
}

#[derive(Debug, Clone)]
pub struct SwiftSettings {
    /// Token endpoint of the identity service.
    pub auth_url: Url,
    pub username: String,
    pub password: String,
    pub tenant: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            swift: None,
        }
    }
}

impl Config {
    /// Load from `COVE_*` environment variables, falling back to the
    /// defaults for anything unset. Swift settings are all-or-nothing:
    /// setting `COVE_SWIFT_AUTH_URL` makes the other three required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(level) = std::env::var("COVE_LOG_LEVEL") {
            config.log_level = level
                .parse()
                .map_err(|_| ConfigError::InvalidLogLevel(level))?;
        }

        if let Ok(auth_url) = std::env::var("COVE_SWIFT_AUTH_URL") {
            let auth_url = Url::parse(&auth_url)
                .map_err(|e| ConfigError::InvalidUrl("COVE_SWIFT_AUTH_URL", e))?;
            config.swift = Some(SwiftSettings {
                auth_url,
                username: require("COVE_SWIFT_USER")?,
                password: require("COVE_SWIFT_PASSWORD")?,
                tenant: require("COVE_SWIFT_TENANT")?,
            });
        }

        Ok(config)
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid log level '{0}'")]
    InvalidLogLevel(String),
    #[error("invalid url in {0}: {1}")]
    InvalidUrl(&'static str, url::ParseError),
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),
}
