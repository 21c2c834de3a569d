/// Errors that can occur in message bus operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The origin string is not `scheme://host[:port]` or `*`.
    #[error("invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },

    /// The window has been closed and no longer accepts events.
    #[error("window {0} is closed")]
    Closed(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
