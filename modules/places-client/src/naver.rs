use serde::Deserialize;
use tracing::debug;

use crate::{api_error, Result, DEFAULT_TIMEOUT};

const NAVER_LOCAL_URL: &str = "https://openapi.naver.com/v1/search/local.json";

/// Naver caps local search at five items per page.
const DISPLAY: u8 = 5;

#[derive(Debug, Deserialize)]
struct LocalSearchResponse {
    #[serde(default)]
    items: Vec<LocalItem>,
}

/// One business from Naver local search. `title` carries `<b>` highlight
/// markup around the matched terms.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalItem {
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub road_address: String,
    #[serde(default)]
    pub mapx: String,
    #[serde(default)]
    pub mapy: String,
}

impl LocalItem {
    /// Title with highlight tags removed.
    pub fn plain_title(&self) -> String {
        self.title.replace("<b>", "").replace("</b>", "").trim().to_string()
    }

    /// Road address when present, otherwise the lot-number address.
    pub fn best_address(&self) -> &str {
        if self.road_address.trim().is_empty() {
            self.address.trim()
        } else {
            self.road_address.trim()
        }
    }

    /// WGS84 coordinates. Naver encodes them as integers scaled by 1e7.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let x: f64 = self.mapx.parse().ok()?;
        let y: f64 = self.mapy.parse().ok()?;
        if x == 0.0 || y == 0.0 {
            return None;
        }
        Some((y / 1e7, x / 1e7))
    }
}

pub struct NaverLocalClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    base_url: String,
}

impl NaverLocalClient {
    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            client_id,
            client_secret,
            base_url: NAVER_LOCAL_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Search local businesses. An empty result is not an error.
    pub async fn search(&self, query: &str) -> Result<Vec<LocalItem>> {
        debug!(query, "naver local search");

        let display = DISPLAY.to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .header("X-Naver-Client-Id", &self.client_id)
            .header("X-Naver-Client-Secret", &self.client_secret)
            .query(&[("query", query), ("display", &display), ("sort", "random")])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let body: LocalSearchResponse = resp.json().await?;
        Ok(body.items)
    }
}
