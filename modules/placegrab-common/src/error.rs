use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaceGrabError {
    #[error("Configuration error: {0}")]
    Config(String),
}
