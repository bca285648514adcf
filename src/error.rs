use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("token must be 36 characters (got {0})")]
    InvalidToken(usize),
    #[error("update value {0} cannot be converted to a positive integer")]
    InvalidUpdateSeconds(String),
    #[error("address {0} must start with http:// or https://")]
    InvalidUrl(String),
    #[error("port value {0} is not a valid port number")]
    InvalidPort(String),
    #[error("failed to read config file {path}: {reason}")]
    File { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} not found")]
    NotFound(String),
}
