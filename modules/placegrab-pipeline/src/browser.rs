use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use browserless_client::{BrowserlessClient, ContentOptions, ResourceType};
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, info};

const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub url: String,
    pub token: Option<String>,
    pub page_timeout: Duration,
    pub max_tabs: usize,
}

/// The warm browser shared by every request.
///
/// The underlying client is created lazily on [`BrowserSession::start`] and
/// kept until [`BrowserSession::stop`]. Each request takes a [`Page`], which
/// holds one tab slot until it is dropped.
pub struct BrowserSession {
    settings: BrowserSettings,
    client: RwLock<Option<Arc<BrowserlessClient>>>,
    tabs: Arc<Semaphore>,
}

impl BrowserSession {
    pub fn new(settings: BrowserSettings) -> Self {
        let tabs = Arc::new(Semaphore::new(settings.max_tabs.max(1)));
        Self {
            settings,
            client: RwLock::new(None),
            tabs,
        }
    }

    /// Start the session. A no-op when it is already running.
    pub async fn start(&self) -> Result<()> {
        if self.client.read().await.is_some() {
            return Ok(());
        }

        let mut slot = self.client.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let client = BrowserlessClient::new(&self.settings.url, self.settings.token.as_deref())
            .context("failed to build browserless client")?;
        client
            .pressure()
            .await
            .context("browserless is not accepting sessions")?;

        *slot = Some(Arc::new(client));
        info!(url = %self.settings.url, "browser session started");
        Ok(())
    }

    pub async fn stop(&self) {
        if self.client.write().await.take().is_some() {
            info!("browser session stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.client.read().await.is_some()
    }

    /// Open a tab, starting the session first if needed. Waits for a free
    /// tab slot.
    pub async fn open_page(&self) -> Result<Page> {
        self.start().await?;

        let permit = self
            .tabs
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| anyhow!("browser tab pool closed"))?;

        let client = self
            .client
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow!("browser session stopped while opening a page"))?;

        Ok(Page {
            client,
            timeout: self.settings.page_timeout,
            _permit: permit,
        })
    }
}

/// One tab. Its slot is released when the handle drops.
pub struct Page {
    client: Arc<BrowserlessClient>,
    timeout: Duration,
    _permit: OwnedSemaphorePermit,
}

impl Page {
    /// Render `url` with the given resource types blocked and return its HTML.
    pub async fn content(&self, url: &str, blocked: &[ResourceType]) -> Result<String> {
        let options = ContentOptions {
            reject_resource_types: blocked.to_vec(),
            navigation_timeout: self.timeout,
            user_agent: Some(MOBILE_USER_AGENT.to_string()),
            locale: Some("ko-KR,ko;q=0.9".to_string()),
        };

        debug!(url, "rendering page");
        let html = tokio::time::timeout(
            self.timeout + Duration::from_secs(2),
            self.client.content(url, &options),
        )
        .await
        .map_err(|_| anyhow!("page render timed out after {:?}", self.timeout))??;

        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BrowserSettings {
        BrowserSettings {
            url: "http://127.0.0.1:9".to_string(),
            token: None,
            page_timeout: Duration::from_secs(1),
            max_tabs: 2,
        }
    }

    #[tokio::test]
    async fn new_session_is_not_running() {
        let session = BrowserSession::new(settings());
        assert!(!session.is_running().await);
        session.stop().await;
        assert!(!session.is_running().await);
    }

    #[test]
    fn zero_tabs_still_allows_one_page() {
        let session = BrowserSession::new(BrowserSettings {
            max_tabs: 0,
            ..settings()
        });
        assert_eq!(session.tabs.available_permits(), 1);
    }
}
