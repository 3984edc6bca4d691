use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Model refused: {0}")]
    Refused(String),

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Parse error: {0}")]
    Parse(String),
}

impl AiError {
    /// Timeouts and connection failures; everything the caller may treat as a
    /// skipped stage rather than a bug.
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::Network(_) | AiError::EmptyResponse => true,
            AiError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        AiError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for AiError {
    fn from(e: serde_json::Error) -> Self {
        AiError::Parse(e.to_string())
    }
}
