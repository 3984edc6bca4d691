use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{api_error, PlacesError, Result, DEFAULT_TIMEOUT};

const GOOGLE_PLACES_URL: &str = "https://maps.googleapis.com/maps/api/place";

#[derive(Debug, Clone, Serialize)]
pub struct TextSearchParams<'a> {
    pub query: &'a str,
    pub language: &'a str,
    pub region: &'a str,
    /// `"lat,lng"` bias point.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<u32>,
}

impl<'a> TextSearchParams<'a> {
    /// Korean-language search biased to the KR region.
    pub fn korean(query: &'a str) -> Self {
        Self {
            query,
            language: "ko",
            region: "KR",
            location: None,
            radius: None,
        }
    }

    pub fn near(mut self, lat: f64, lng: f64) -> Self {
        self.location = Some(format!("{lat},{lng}"));
        self
    }
}

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GooglePlace>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GooglePlace {
    pub place_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub formatted_address: Option<String>,
    pub geometry: Geometry,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_ratings_total: Option<i64>,
    #[serde(default)]
    pub photos: Vec<PhotoRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoRef {
    pub photo_reference: String,
}

impl GooglePlace {
    pub fn first_photo_reference(&self) -> Option<&str> {
        self.photos
            .iter()
            .map(|p| p.photo_reference.as_str())
            .find(|r| !r.is_empty())
    }
}

pub struct GooglePlacesClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GooglePlacesClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: GOOGLE_PLACES_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Text search returning the top result, if any.
    pub async fn text_search(&self, params: &TextSearchParams<'_>) -> Result<Option<GooglePlace>> {
        debug!(query = params.query, "google text search");

        let url = format!("{}/textsearch/json", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", &self.api_key)])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let body: TextSearchResponse = resp.json().await?;
        first_result(body)
    }

    /// Download a place photo, scaled by Google to at most `max_width` pixels.
    pub async fn photo(&self, photo_reference: &str, max_width: u32) -> Result<Vec<u8>> {
        let url = format!("{}/photo", self.base_url);
        let max_width = max_width.to_string();
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("maxwidth", max_width.as_str()),
                ("photo_reference", photo_reference),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

fn first_result(body: TextSearchResponse) -> Result<Option<GooglePlace>> {
    match body.status.as_str() {
        "OK" => Ok(body.results.into_iter().next()),
        "ZERO_RESULTS" => Ok(None),
        _ => Err(PlacesError::Status {
            status: body.status,
            message: body.error_message.unwrap_or_default(),
        }),
    }
}
