mod client;
pub(crate) mod schema;
pub(crate) mod types;

pub use schema::StructuredOutput;

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{AiError, Result};
use client::OpenAiClient;
use types::{ChatRequest, ContentPart, ImageUrl, JsonSchemaFormat, ResponseFormat, WireMessage};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// An image passed inline to a vision-capable model.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageInput {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/jpeg".to_string(),
        }
    }

    fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

// =============================================================================
// OpenAi
// =============================================================================

#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    model: String,
    base_url: Option<String>,
    timeout: Duration,
    max_tokens: u32,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            max_tokens: 1024,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Bound every request made by this client.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> Result<OpenAiClient> {
        let client = OpenAiClient::new(&self.api_key, self.timeout)?;
        Ok(match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        })
    }

    /// JSON-mode completion at temperature 0. Returns the raw JSON text; the
    /// caller decides how strictly to parse it.
    pub async fn json_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String> {
        let request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user(user))
            .deterministic(self.max_tokens)
            .response_format(ResponseFormat::JsonObject);

        self.client()?.complete(&request).await
    }

    /// Strict structured output over one or more inline images.
    pub async fn extract_from_images<T: StructuredOutput>(
        &self,
        system: impl Into<String>,
        instruction: impl Into<String>,
        images: &[ImageInput],
    ) -> Result<T> {
        if images.is_empty() {
            return Err(AiError::Config("at least one image is required".into()));
        }

        let mut parts = vec![ContentPart::Text {
            text: instruction.into(),
        }];
        parts.extend(images.iter().map(|image| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image.data_url(),
                detail: Some("low".to_string()),
            },
        }));

        let request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user_parts(parts))
            .deterministic(self.max_tokens)
            .response_format(strict_format::<T>());

        let json = self.client()?.complete(&request).await?;
        Ok(serde_json::from_str(&json)?)
    }
}

fn strict_format<T: StructuredOutput>() -> ResponseFormat {
    ResponseFormat::JsonSchema {
        json_schema: JsonSchemaFormat {
            name: T::format_name(),
            strict: true,
            schema: T::strict_schema(),
        },
    }
}
