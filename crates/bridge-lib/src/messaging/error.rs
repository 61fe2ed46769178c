//! Messaging errors

/// Errors surfaced to callers of the messaging client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessagingError {
    /// No bus endpoint configured, or messaging explicitly disabled
    #[error("messaging is disabled or no bus endpoint is configured")]
    ConnectionUnavailable,

    /// Endpoint configured but the connection is not open right now
    #[error("not connected to the bus, cannot send to {topic}")]
    NotConnected { topic: String },

    /// Reply carried `metaData.status >= 400`
    #[error("remote error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("messaging client is shutting down")]
    Shutdown,

    /// The pending request disappeared without an outcome
    #[error("pending request was dropped before a reply arrived")]
    Dropped,
}

impl MessagingError {
    pub fn not_connected(topic: impl Into<String>) -> Self {
        MessagingError::NotConnected {
            topic: topic.into(),
        }
    }

    /// Label used for the remote error counter
    pub fn kind(&self) -> &'static str {
        match self {
            MessagingError::ConnectionUnavailable => "connection_unavailable",
            MessagingError::NotConnected { .. } => "not_connected",
            MessagingError::Remote { .. } => "remote",
            MessagingError::Transport(_) => "transport",
            MessagingError::Serialization(_) => "serialization",
            MessagingError::Shutdown => "shutdown",
            MessagingError::Dropped => "dropped",
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for MessagingError {
    fn from(err: std::io::Error) -> Self {
        MessagingError::Transport(err.to_string())
    }
}
