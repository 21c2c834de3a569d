/// Errors raised while handling channel messages.
///
/// These never escape a [`ReceiveChannel`](crate::ReceiveChannel): they are
/// routed to the failing handler's error callback.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The payload could not be decoded into the expected shape.
    #[error("invalid payload for '{name}': {source}")]
    InvalidPayload {
        name: String,
        source: serde_json::Error,
    },

    /// The payload decoded but failed a validation rule.
    #[error("payload validation failed for '{name}': {message}")]
    Validation { name: String, message: String },

    /// A handler reported a failure of its own.
    #[error("handler for '{name}' failed: {message}")]
    Handler { name: String, message: String },

    /// A handler panicked; the panic was contained.
    #[error("handler for '{name}' panicked: {message}")]
    HandlerPanicked { name: String, message: String },
}

impl ChannelError {
    /// Convenience constructor for handler-level failures.
    pub fn handler(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Name of the message whose handling failed.
    pub fn message_name(&self) -> &str {
        match self {
            Self::InvalidPayload { name, .. }
            | Self::Validation { name, .. }
            | Self::Handler { name, .. }
            | Self::HandlerPanicked { name, .. } => name,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Render a caught panic payload for diagnostics.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
