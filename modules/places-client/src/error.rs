use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlacesError>;

#[derive(Debug, Error)]
pub enum PlacesError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Google reports failures in-band with a 200 and a `status` field.
    #[error("Provider status {status}: {message}")]
    Status { status: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for PlacesError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PlacesError::Parse(err.to_string())
        } else {
            PlacesError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PlacesError {
    fn from(err: serde_json::Error) -> Self {
        PlacesError::Parse(err.to_string())
    }
}
