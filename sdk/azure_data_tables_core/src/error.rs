use thiserror::Error;

/// Errors that can occur when interacting with the Table service.
#[derive(Error, Debug)]
pub enum TablesError {
    /// An entity with the same `PartitionKey` and `RowKey` already exists.
    #[error("Entity already exists: {0}")]
    EntityAlreadyExists(String),

    /// The targeted entity does not exist.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// The entity's ETag no longer matches the one held by the service.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// A table with the same name already exists.
    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    /// The targeted table does not exist.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// The service response did not contain the fields required to build a result.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A caller-supplied argument is missing or invalid. Raised before any request is sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The request failed with an HTTP error and no structured error body.
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// The service returned a structured error that does not map to a more specific variant.
    #[error("API error ({status} {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Authentication failed or a request could not be signed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP request failed at the transport level.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint URL is invalid.
    #[error("Invalid endpoint URL: {message}")]
    InvalidEndpoint {
        message: String,
        #[source]
        source: Option<url::ParseError>,
    },

    /// A required configuration value is missing.
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    /// The connection string could not be parsed.
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// A serialized continuation token could not be parsed.
    #[error("Invalid continuation token: {0}")]
    InvalidContinuationToken(String),

    /// The runtime backing the blocking clients could not be started.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TablesError {
    /// Create an HTTP error from a status code and message.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid-endpoint error carrying the URL parse failure.
    pub fn invalid_endpoint_with_source(message: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidEndpoint {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// HTTP status reported by the service, if this error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Api { status, .. } => Some(*status),
            Self::EntityNotFound(_) | Self::TableNotFound(_) => Some(404),
            Self::EntityAlreadyExists(_) | Self::TableAlreadyExists(_) => Some(409),
            Self::PreconditionFailed(_) => Some(412),
            _ => None,
        }
    }

    /// Whether the error means the entity or table does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EntityNotFound(_) | Self::TableNotFound(_))
    }

    /// Whether the error means the entity or table already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::EntityAlreadyExists(_) | Self::TableAlreadyExists(_)
        )
    }
}

/// Result type alias for Table service operations.
pub type TablesResult<T> = std::result::Result<T, TablesError>;
