use std::time::Duration;

/// Errors that can occur in connection and orchestration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The schema registry could not be built.
    #[error("schema error: {0}")]
    Schema(#[from] framelink_schema::SchemaError),

    /// Operation not permitted in the current connection state.
    #[error("invalid connection state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// The peer did not complete the handshake in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The connection was torn down before the operation completed.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// The connection entered its terminal error state.
    #[error("connection failed: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

#[cfg(test)]
mod tests {
    use framelink_schema::SchemaError;

    use super::*;

    #[test]
    fn schema_errors_convert() {
        let err: ConnectionError = SchemaError::CompileFailed("peer.set-title: bad".into()).into();
        assert!(matches!(err, ConnectionError::Schema(_)));
        assert!(err.to_string().starts_with("schema error:"));
    }

    #[test]
    fn timeout_message_names_the_deadline() {
        let err = ConnectionError::HandshakeTimeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "handshake timed out after 1.5s");
    }
}
