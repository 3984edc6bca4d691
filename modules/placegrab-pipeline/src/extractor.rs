use ai_client::{strip_code_blocks, truncate_to_char_boundary, OpenAi};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use placegrab_common::PlaceCandidate;

use crate::traits::PlaceExtractor;

/// Captions beyond this are cut before prompting.
const MAX_PROMPT_BYTES: usize = 8_000;

const SYSTEM_PROMPT: &str = r#"You extract real-world places from Korean social media captions.

Return a JSON object of the form {"places": [{"name": "...", "address": "..."}]}.

Rules:
- Only include places the post actually describes, recommends, or visited.
- Exclude places mentioned only as wishes or plans ("가보고 싶다", "want to go").
- "name" is the business or venue name exactly as written. Do not translate it.
- "address" is the address or neighborhood as written, or "" if none is given.
- If no real place is named, return {"places": []}."#;

/// Caption-to-candidates extraction backed by a JSON-mode chat model.
pub struct LlmTextExtractor {
    ai: OpenAi,
}

impl LlmTextExtractor {
    pub fn new(ai: OpenAi) -> Self {
        Self { ai }
    }
}

#[async_trait]
impl PlaceExtractor for LlmTextExtractor {
    async fn extract_places(&self, caption: &str) -> Result<Vec<PlaceCandidate>> {
        let caption = truncate_to_char_boundary(caption, MAX_PROMPT_BYTES);
        let raw = self.ai.json_completion(SYSTEM_PROMPT, caption).await?;
        let places = parse_places(&raw);
        info!(model = self.ai.model(), count = places.len(), "caption extraction complete");
        Ok(places)
    }
}

#[derive(Deserialize)]
struct PlacesEnvelope {
    #[serde(default)]
    places: Vec<RawPlace>,
}

#[derive(Deserialize)]
struct RawPlace {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

/// Lenient parse of the model's JSON. Anything malformed is no candidates.
pub fn parse_places(raw: &str) -> Vec<PlaceCandidate> {
    match serde_json::from_str::<PlacesEnvelope>(strip_code_blocks(raw)) {
        Ok(envelope) => envelope
            .places
            .into_iter()
            .map(|p| {
                PlaceCandidate::new(
                    p.name.unwrap_or_default(),
                    p.address.unwrap_or_default(),
                )
            })
            .filter(PlaceCandidate::is_valid)
            .collect(),
        Err(e) => {
            warn!(error = %e, "unparseable extraction output");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_places_and_drops_nameless() {
        let raw = r#"{"places": [
            {"name": "카페 연남", "address": "서울 마포구 연남동"},
            {"name": "", "address": "어딘가"},
            {"name": "no_name", "address": "서울"},
            {"name": "망원 베이커리", "address": null}
        ]}"#;
        assert_eq!(
            parse_places(raw),
            vec![
                PlaceCandidate::new("카페 연남", "서울 마포구 연남동"),
                PlaceCandidate::new("망원 베이커리", ""),
            ]
        );
    }

    #[test]
    fn malformed_output_is_empty() {
        assert!(parse_places("sorry, I cannot").is_empty());
        assert!(parse_places(r#"{"places": "none"}"#).is_empty());
    }

    #[test]
    fn fenced_output_is_accepted() {
        let raw = "```json\n{\"places\": [{\"name\": \"A\", \"address\": \"\"}]}\n```";
        assert_eq!(parse_places(raw), vec![PlaceCandidate::new("A", "")]);
    }

    #[test]
    fn missing_places_key_is_empty() {
        assert!(parse_places("{}").is_empty());
    }
}
