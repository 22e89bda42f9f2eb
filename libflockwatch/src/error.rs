//! Error types for Flockwatch

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlockwatchError>;

#[derive(Error, Debug)]
pub enum FlockwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl FlockwatchError {
    /// Message suitable for direct display in an embedding UI.
    ///
    /// Every error that crosses the facade boundary is reduced to text; no
    /// structured error reaches the rendering layer.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read state file: {0}")]
    Read(std::io::Error),

    #[error("Failed to write state file: {0}")]
    Write(std::io::Error),

    #[error("Failed to encode state: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failure reported by the wire client, before any retry policy is applied.
///
/// The executor classifies these; everything it cannot resolve is converted
/// into an [`ApiError`].
#[derive(Error, Debug, Clone)]
pub enum XrpcError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },
}

impl XrpcError {
    pub fn status(&self) -> Option<u16> {
        match self {
            XrpcError::Network(_) => None,
            XrpcError::Status { status, .. } => Some(*status),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, XrpcError::Network(_))
    }
}

/// Domain error taxonomy surfaced above the executor.
///
/// Cloneable so retry bookkeeping and event payloads can carry copies.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Too many login attempts: {0}")]
    TooManyAttempts(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Invalid record reference: {0}")]
    InvalidRecord(String),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Fetch aborted: {0}")]
    FetchAborted(String),

    /// Unclassified transport failure, propagated unchanged.
    #[error("{0}")]
    Transport(#[from] XrpcError),
}

impl ApiError {
    /// Whether re-invoking the failed operation may reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::RateLimited(_))
    }
}
