use thiserror::Error;

/// Errors produced when decoding a saga message frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The frame has fewer than four `#`-separated fields.
    #[error("malformed frame, expected instance#token#kind#payload: {0:?}")]
    MalformedFrame(String),

    /// The kind field is not a known message kind.
    #[error("unknown message kind: {0:?}")]
    UnknownKind(String),

    /// An instance id or token contains the field separator.
    #[error("{field} may not contain '#': {value:?}")]
    ReservedSeparator { field: &'static str, value: String },

    /// The payload is not a valid order snapshot.
    #[error("invalid order payload: {0}")]
    InvalidPayload(String),
}

/// Errors that can occur on the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The Redis transport failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The in-process bus was shut down.
    #[error("bus closed")]
    Closed,

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
