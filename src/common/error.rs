//! Error types for rokv
//!
//! The taxonomy splits into two classes that drive the retry policy:
//! client-class errors describe a request the cluster can never satisfy
//! and are surfaced immediately; server-class errors are transient and
//! are retried against the remaining replicas.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Client errors (never retried) ===
    #[error("unknown store: {0}")]
    UnknownStore(String),

    #[error("store '{store}' has persistence '{persistence}', only read-only is supported")]
    NotReadOnly { store: String, persistence: String },

    #[error("key not found")]
    KeyNotFound,

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("value out of range: {0}")]
    ValueOutOfRange(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("unknown schema version: {0}")]
    UnknownSchemaVersion(u8),

    #[error("unsupported routing strategy: {0}")]
    UnsupportedRouting(String),

    #[error("unsupported serializer: {0}")]
    UnsupportedSerializer(String),

    #[error("unsupported compression: {0}")]
    UnsupportedCompression(String),

    #[error("protocol rejected by server: {}", String::from_utf8_lossy(.0))]
    ProtocolRejected(Vec<u8>),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // === Server errors (retried across replicas) ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("request timeout")]
    RequestTimeout,

    #[error("shutdown requested")]
    ShutdownRequested,

    #[error("no connection can handle the request")]
    NoAvailableNodes,

    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("server error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid cluster metadata: {0}")]
    InvalidMetadata(String),
}

impl Error {
    /// Is this a transient, server-class error?
    pub fn is_server(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::ConnectionClosed(_)
                | Error::RequestTimeout
                | Error::ShutdownRequested
                | Error::NoAvailableNodes
                | Error::Bootstrap(_)
                | Error::Remote { .. }
                | Error::MalformedResponse(_)
                | Error::InvalidMetadata(_)
        )
    }

    /// Is this a client-class error the cluster can never satisfy?
    pub fn is_client(&self) -> bool {
        !self.is_server()
    }

    /// May the cluster retry this request on another replica?
    pub fn is_retryable(&self) -> bool {
        self.is_server()
    }
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::MalformedResponse(e.to_string())
    }
}
