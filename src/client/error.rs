//! Errors raised by external collaborators

/// Failure talking to the game server
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Request timed out")]
    Timeout,
    #[error("Connection lost: {0}")]
    Disconnected(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Rate limited by server")]
    RateLimited,
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Build from an HTTP status code and body
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => ClientError::NotFound(message),
            429 => ClientError::RateLimited,
            400..=499 => ClientError::Rejected { status, message },
            _ => ClientError::Server { status, message },
        }
    }

    /// Timeouts and dropped connections
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Timeout | ClientError::Disconnected(_))
    }

    /// Worth retrying after a delay
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout
                | ClientError::Disconnected(_)
                | ClientError::RateLimited
                | ClientError::Server { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// Retrying cannot help (client-side rejection or unreadable response)
    pub fn is_final(&self) -> bool {
        !self.is_transient()
    }
}

/// Failure of the move-selection engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Engine produced no legal move")]
    NoLegalMove,
    #[error("Engine failed: {0}")]
    Failed(String),
    #[error("Engine unreachable: {0}")]
    Client(#[from] ClientError),
}

impl EngineError {
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Client(e) => e.is_transient(),
            _ => false,
        }
    }
}
