pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Resource types a Browserless page can be told to abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Image,
    Media,
    Font,
    Stylesheet,
    Script,
}

/// Per-navigation options for [`BrowserlessClient::content`].
#[derive(Debug, Clone)]
pub struct ContentOptions {
    pub reject_resource_types: Vec<ResourceType>,
    pub navigation_timeout: Duration,
    pub user_agent: Option<String>,
    pub locale: Option<String>,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            reject_resource_types: Vec::new(),
            navigation_timeout: Duration::from_secs(15),
            user_agent: None,
            locale: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    reject_resource_types: &'a [ResourceType],
    goto_options: GotoOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    set_extra_http_headers: Option<serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GotoOptions {
    wait_until: &'static str,
    timeout: u64,
}

#[derive(Debug, Deserialize)]
struct PressureResponse {
    pressure: Pressure,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pressure {
    is_available: bool,
    #[serde(default)]
    message: Option<String>,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        match self.token {
            Some(ref token) => format!("{}/{path}?token={token}", self.base_url),
            None => format!("{}/{path}", self.base_url),
        }
    }

    /// Fetch fully-rendered HTML for a URL via the `/content` endpoint.
    ///
    /// The HTTP request is bounded by the navigation timeout plus a small
    /// allowance for Browserless' own bookkeeping.
    pub async fn content(&self, url: &str, options: &ContentOptions) -> Result<String> {
        let timeout_ms = options.navigation_timeout.as_millis() as u64;
        let body = ContentRequest {
            url,
            reject_resource_types: &options.reject_resource_types,
            goto_options: GotoOptions {
                wait_until: "domcontentloaded",
                timeout: timeout_ms,
            },
            user_agent: options.user_agent.as_deref(),
            set_extra_http_headers: options
                .locale
                .as_ref()
                .map(|locale| serde_json::json!({ "Accept-Language": locale })),
        };

        debug!(url, timeout_ms, "browserless content request");

        let resp = self
            .client
            .post(self.endpoint("content"))
            .timeout(options.navigation_timeout + Duration::from_secs(5))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }

    /// Ask Browserless whether it can accept new sessions.
    pub async fn pressure(&self) -> Result<()> {
        let resp = self
            .client
            .get(self.endpoint("pressure"))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: PressureResponse = resp.json().await?;
        if body.pressure.is_available {
            Ok(())
        } else {
            Err(BrowserlessError::Unavailable(
                body.pressure
                    .message
                    .unwrap_or_else(|| "no capacity".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_request_uses_browserless_field_names() {
        let rejected = [ResourceType::Image, ResourceType::Stylesheet];
        let body = ContentRequest {
            url: "https://www.instagram.com/p/ABC123/",
            reject_resource_types: &rejected,
            goto_options: GotoOptions {
                wait_until: "domcontentloaded",
                timeout: 15_000,
            },
            user_agent: Some("Mozilla/5.0"),
            set_extra_http_headers: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["rejectResourceTypes"][0], "image");
        assert_eq!(value["rejectResourceTypes"][1], "stylesheet");
        assert_eq!(value["gotoOptions"]["waitUntil"], "domcontentloaded");
        assert_eq!(value["gotoOptions"]["timeout"], 15_000);
        assert_eq!(value["userAgent"], "Mozilla/5.0");
        assert!(value.get("setExtraHttpHeaders").is_none());
    }

    #[test]
    fn token_is_appended_to_endpoints() {
        let client = BrowserlessClient::new("https://chrome.local/", Some("t0k")).unwrap();
        assert_eq!(client.endpoint("content"), "https://chrome.local/content?token=t0k");

        let client = BrowserlessClient::new("https://chrome.local", None).unwrap();
        assert_eq!(client.endpoint("pressure"), "https://chrome.local/pressure");
    }
}
