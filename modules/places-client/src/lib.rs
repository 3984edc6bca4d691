pub mod error;
pub mod google;
pub mod naver;

pub use error::{PlacesError, Result};
pub use google::{GooglePlace, GooglePlacesClient, TextSearchParams};
pub use naver::{LocalItem, NaverLocalClient};

use std::time::Duration;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read a non-success response into an [`PlacesError::Api`].
pub(crate) async fn api_error(resp: reqwest::Response) -> PlacesError {
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    PlacesError::Api { status, message }
}
