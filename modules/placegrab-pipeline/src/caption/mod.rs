pub mod strategies;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use browserless_client::ResourceType;
use tracing::{debug, warn};

use crate::browser::BrowserSession;
use crate::traits::{CaptionPage, CaptionSource};
use strategies::{first_caption, og_image, PageSource};

const CAPTION_BLOCKED: &[ResourceType] = &[
    ResourceType::Image,
    ResourceType::Media,
    ResourceType::Font,
    ResourceType::Stylesheet,
];

/// Caption fetcher backed by the warm browser session.
pub struct BrowserCaptionSource {
    session: Arc<BrowserSession>,
}

impl BrowserCaptionSource {
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl CaptionSource for BrowserCaptionSource {
    async fn fetch_caption(&self, post_url: &str) -> Result<CaptionPage> {
        let page = self.session.open_page().await?;
        let html = page.content(post_url, CAPTION_BLOCKED).await?;
        drop(page);

        let result = read_caption_page(&html);
        if result.caption.is_empty() {
            warn!(post_url, "no caption strategy matched");
        }
        Ok(result)
    }
}

/// Run every strategy over rendered HTML.
pub fn read_caption_page(html: &str) -> CaptionPage {
    let source = PageSource::parse(html);
    let caption = match first_caption(&source) {
        Some((strategy, text)) => {
            debug!(strategy, chars = text.chars().count(), "caption found");
            text
        }
        None => String::new(),
    };
    CaptionPage {
        caption,
        thumbnail: og_image(&source),
    }
}
