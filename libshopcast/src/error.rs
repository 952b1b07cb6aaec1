//! Error types for Shopcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShopcastError>;

#[derive(Error, Debug)]
pub enum ShopcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Caption generation failed: {0}")]
    Generation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ShopcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ShopcastError::InvalidInput(_) => 3,
            ShopcastError::Config(_) => 2,
            ShopcastError::Platform(PlatformError::Authentication(_)) => 2,
            ShopcastError::Platform(PlatformError::NotConfigured(_)) => 2,
            ShopcastError::Platform(_) => 1,
            ShopcastError::Database(_) => 1,
            ShopcastError::Generation(_) => 1,
        }
    }

    /// The platform error behind this error, if any
    pub fn as_platform(&self) -> Option<&PlatformError> {
        match self {
            ShopcastError::Platform(e) => Some(e),
            _ => None,
        }
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

    #[error("Missing credentials for {0}. Store a token with `shop-queue token set {0} <TOKEN>`")]
    MissingCredentials(String),

    #[error("Token for {platform} expired at {expired_at}")]
    ExpiredToken { platform: String, expired_at: i64 },

    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row {id}: {reason}")]
    CorruptRow { id: String, reason: String },
}

/// Errors raised while talking to a platform, or while preparing a post for one
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("{platform} API error: {message}")]
    Api {
        platform: String,
        status: Option<u16>,
        code: Option<i64>,
        subcode: Option<i64>,
        message: String,
    },

    #[error("Media container {container_id} timed out: still not FINISHED after {attempts} status checks")]
    ContainerTimeout { container_id: String, attempts: u32 },

    #[error("Media container {container_id} failed processing with status {status}")]
    ContainerFailed { container_id: String, status: String },

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("{0} is not configured")]
    NotConfigured(String),
}

impl PlatformError {
    /// Whether this error means the platform no longer has the media
    ///
    /// Matches HTTP 404, the Graph API "object does not exist" code
    /// (100 with subcode 33) and the wording platforms use for removed media.
    pub fn indicates_deletion(&self) -> bool {
        match self {
            PlatformError::Api {
                status,
                code,
                subcode,
                message,
                ..
            } => {
                if *status == Some(404) {
                    return true;
                }
                if *code == Some(100) && *subcode == Some(33) {
                    return true;
                }
                let lower = message.to_lowercase();
                lower.contains("does not exist") || lower.contains("been deleted")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PlatformError::Network(format!("request timed out: {}", e))
        } else {
            PlatformError::Network(e.to_string())
        }
    }
}
