use thiserror::Error;

/// Failure talking to the provider over HTTP.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode provider response: {0}")]
    Decode(String),

    #[error("provider response missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid provider URL: {0}")]
    InvalidUrl(String),

    /// An id that would escape its path segment, such as `..` or one with a `/`.
    #[error("invalid id '{0}'")]
    InvalidId(String),
}

impl ProviderError {
    /// True for a 404 from the provider.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::Status { status: 404, .. })
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("invalid multiplier {0}: must be greater than zero")]
    InvalidMultiplier(f64),

    #[error("strategy not found: {0}")]
    StrategyNotFound(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("subscriber not found: {0}")]
    SubscriberNotFound(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
