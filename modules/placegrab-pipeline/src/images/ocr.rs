use std::sync::LazyLock;

use ai_client::{ImageInput, OpenAi};
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;

use placegrab_common::PlaceCandidate;

use crate::traits::ImageReader;

const SYSTEM_PROMPT: &str = "You read place information printed in social media images \
(cards, posters, screenshots, storefront signs). Report every venue whose name is visible, \
with its address if one is printed. Never guess an address that is not in the image.";

const INSTRUCTION: &str = "List the places shown in this image. Use \"\" for a missing address. \
Return an empty list if no venue name is visible.";

/// One venue read from an image.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct Signage {
    /// Venue name exactly as printed.
    pub name: String,
    /// Printed address, or "" when none is visible.
    pub address: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SignageReading {
    pub places: Vec<Signage>,
}

/// Vision-model OCR over one normalized image.
pub struct VisionReader {
    ai: OpenAi,
}

impl VisionReader {
    pub fn new(ai: OpenAi) -> Self {
        Self { ai }
    }
}

#[async_trait]
impl ImageReader for VisionReader {
    async fn read_places(&self, jpeg: Vec<u8>) -> Result<Vec<PlaceCandidate>> {
        let reading: SignageReading = self
            .ai
            .extract_from_images(SYSTEM_PROMPT, INSTRUCTION, &[ImageInput::jpeg(jpeg)])
            .await?;
        Ok(clean_reading(reading))
    }
}

/// Sanitize fields and drop entries left without a name.
pub fn clean_reading(reading: SignageReading) -> Vec<PlaceCandidate> {
    reading
        .places
        .into_iter()
        .map(|s| PlaceCandidate::new(sanitize_name(&s.name), sanitize_address(&s.address)))
        .filter(PlaceCandidate::is_valid)
        .collect()
}

static HASHTAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\S+").expect("valid regex"));

pub fn sanitize_name(raw: &str) -> String {
    keep_chars(&raw.replace('#', ""), "()-,.&'+")
}

pub fn sanitize_address(raw: &str) -> String {
    keep_chars(&HASHTAG.replace_all(raw, ""), "()-,.")
}

fn keep_chars(raw: &str, extra: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace() || extra.contains(*c))
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_keeps_brand_punctuation() {
        assert_eq!(sanitize_name("#카페 Tom&Jerry's (연남점)!! ✨"), "카페 Tom&Jerry's (연남점)");
        assert_eq!(sanitize_name("A+ 베이커리"), "A+ 베이커리");
    }

    #[test]
    fn address_drops_hashtags_and_symbols() {
        assert_eq!(
            sanitize_address("서울 마포구 동교로 12-3, 1층 #연남동카페 📍"),
            "서울 마포구 동교로 12-3, 1층"
        );
    }

    #[test]
    fn reading_drops_nameless_entries() {
        let reading = SignageReading {
            places: vec![
                Signage {
                    name: "✨✨".into(),
                    address: "서울".into(),
                },
                Signage {
                    name: "망원 식당".into(),
                    address: "".into(),
                },
            ],
        };
        assert_eq!(clean_reading(reading), vec![PlaceCandidate::new("망원 식당", "")]);
    }
}
