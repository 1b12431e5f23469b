use thiserror::Error;

pub type Result<T> = std::result::Result<T, QaError>;

#[derive(Debug, Error)]
pub enum QaError {
    #[error("{0}")]
    Validation(String),

    #[error("a generation request is already in progress")]
    Busy,

    #[error("generation service error: {}", .message.as_deref().unwrap_or("no message"))]
    Service { message: Option<String> },

    #[error("unknown panel: {0}")]
    PanelNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("internal error: {0}")]
    Other(String),
}

impl QaError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn service(message: Option<String>) -> Self {
        Self::Service {
            message: message.filter(|msg| !msg.trim().is_empty()),
        }
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Text shown on the notification surface; `fallback` covers rejections
    /// that carry no message of their own.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            QaError::Validation(msg) => msg.clone(),
            QaError::Service { message } => message
                .clone()
                .unwrap_or_else(|| fallback.to_string()),
            QaError::Reqwest(err) => err.to_string(),
            _ => fallback.to_string(),
        }
    }
}
