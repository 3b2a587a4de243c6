//! Error types for the camwatch console

/// Errors that can occur while talking to the surveillance backend
#[derive(Debug, thiserror::Error)]
pub enum CamwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Application-level failure; carries the backend message verbatim
    #[error("{0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("No device selected")]
    NoDeviceSelected,

    #[error("Invalid state for operation: {0}")]
    InvalidState(String),
}

impl CamwatchError {
    /// Whether the error came from the transport rather than the backend
    pub fn is_transport(&self) -> bool {
        matches!(self, CamwatchError::Http(_))
    }
}

/// Result type alias for camwatch operations
pub type Result<T> = std::result::Result<T, CamwatchError>;
