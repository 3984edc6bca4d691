use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use browserless_client::ResourceType;
use regex::Regex;
use tracing::debug;

use crate::browser::BrowserSession;
use crate::traits::ImageSource;

static CDN_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(https:\\?/\\?/scontent[^\s"'<>]+)"#).expect("valid regex")
});

/// Size-suffixed variants (`p150x150`, `s640x640`) are thumbnails.
static SIZED_VARIANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ps]\d{2,4}x\d{2,4}").expect("valid regex"));

const NON_CONTENT_MARKERS: &[&str] = &[
    "/t51.2885-19/",
    "vp/",
    "profile",
    "null",
    "sha256",
    "c0.",
    "/e35/",
    "/e15/",
];

/// Content image URLs in page source, in first-seen order, at most `cap`.
pub fn discover_image_urls(html: &str, cap: usize) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for found in CDN_URL.captures_iter(html) {
        let url = unescape_url(&found[1]);
        if is_content_image(&url) && !urls.contains(&url) {
            urls.push(url);
            if urls.len() >= cap {
                break;
            }
        }
    }
    urls
}

fn unescape_url(raw: &str) -> String {
    raw.replace("\\/", "/")
        .replace("\\u0026", "&")
        .replace("&amp;", "&")
        .trim_end_matches('\\')
        .to_string()
}

fn is_content_image(url: &str) -> bool {
    !NON_CONTENT_MARKERS.iter().any(|marker| url.contains(marker)) && !SIZED_VARIANT.is_match(url)
}

/// Image discovery through the warm browser, downloads over plain HTTP.
pub struct BrowserImageSource {
    session: Arc<BrowserSession>,
    http: reqwest::Client,
    max_images: usize,
}

impl BrowserImageSource {
    pub fn new(session: Arc<BrowserSession>, max_images: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self {
            session,
            http,
            max_images,
        })
    }
}

#[async_trait]
impl ImageSource for BrowserImageSource {
    async fn discover_images(&self, post_url: &str) -> Result<Vec<String>> {
        let page = self.session.open_page().await?;
        let html = page
            .content(post_url, &[ResourceType::Media, ResourceType::Font])
            .await?;
        drop(page);

        let urls = discover_image_urls(&html, self.max_images);
        debug!(post_url, count = urls.len(), "post images discovered");
        Ok(urls)
    }

    async fn download(&self, image_url: &str) -> Result<Vec<u8>> {
        let resp = self.http.get(image_url).send().await?;
        if !resp.status().is_success() {
            bail!("image download failed with status {}", resp.status());
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescapes_and_filters_cdn_urls() {
        let html = r#"
            "display_url":"https:\/\/scontent-ssn1-1.cdninstagram.com\/v\/t51.29350-15\/a_n.jpg?stp=dst-jpg&_nc_ht=x"
            "profile_pic_url":"https:\/\/scontent-ssn1-1.cdninstagram.com\/v\/t51.2885-19\/p_n.jpg"
            "thumb":"https:\/\/scontent-ssn1-1.cdninstagram.com\/v\/t51.29350-15\/a_n.jpg?stp=dst-jpg_p150x150"
            <img src="https://scontent-ssn1-1.cdninstagram.com/v/t51.29350-15/b_n.jpg?x=1&amp;y=2">
        "#;
        assert_eq!(
            discover_image_urls(html, 10),
            vec![
                "https://scontent-ssn1-1.cdninstagram.com/v/t51.29350-15/a_n.jpg?stp=dst-jpg&_nc_ht=x"
                    .to_string(),
                "https://scontent-ssn1-1.cdninstagram.com/v/t51.29350-15/b_n.jpg?x=1&y=2".to_string(),
            ]
        );
    }

    #[test]
    fn deduplicates_in_order_and_caps() {
        let html = (0..15)
            .flat_map(|i| {
                let url = format!("https://scontent.cdninstagram.com/v/t51.29350-15/{i}_n.jpg");
                [url.clone(), url]
            })
            .map(|url| format!("\"{url}\" "))
            .collect::<String>();

        let urls = discover_image_urls(&html, 10);
        assert_eq!(urls.len(), 10);
        assert!(urls[0].ends_with("/0_n.jpg"));
        assert!(urls[9].ends_with("/9_n.jpg"));
    }

    #[test]
    fn rejects_known_non_content_shapes() {
        for url in [
            "https://scontent.cdninstagram.com/v/t51.2885-19/avatar.jpg",
            "https://scontent.cdninstagram.com/v/t51.29350-15/x_n.jpg?stp=c0.135.1080.1080",
            "https://scontent.cdninstagram.com/v/t51.29350-15/e35/x_n.jpg",
            "https://scontent.cdninstagram.com/v/t51.29350-15/s640x640/x_n.jpg",
            "https://scontent.cdninstagram.com/null",
        ] {
            assert!(!is_content_image(url), "{url}");
        }
        assert!(is_content_image(
            "https://scontent.cdninstagram.com/v/t51.29350-15/x_n.jpg?stp=dst-jpg"
        ));
    }
}
