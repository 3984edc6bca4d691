use std::env;

use crate::error::PlaceGrabError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub database_url: String,
    pub redis_url: String,

    // Models
    pub openai_api_key: String,
    pub text_model: String,
    pub vision_model: String,

    // Headless browser
    pub browserless_url: String,
    pub browserless_token: Option<String>,

    // Lookup providers
    pub naver_client_id: String,
    pub naver_client_secret: String,
    pub google_maps_api_key: String,

    // Photos
    pub photo_dir: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,
    pub jwt_secret: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Fails naming the first missing required variable.
    pub fn from_env() -> Result<Self, PlaceGrabError> {
        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            redis_url: required_env("REDIS_URL")?,
            openai_api_key: required_env("OPENAI_API_KEY")?,
            text_model: env_or("TEXT_MODEL", "gpt-4o-mini"),
            vision_model: env_or("VISION_MODEL", "gpt-4o-mini"),
            browserless_url: required_env("BROWSERLESS_URL")?,
            browserless_token: env::var("BROWSERLESS_TOKEN").ok().filter(|t| !t.is_empty()),
            naver_client_id: required_env("NAVER_CLIENT_ID")?,
            naver_client_secret: required_env("NAVER_CLIENT_SECRET")?,
            google_maps_api_key: required_env("GOOGLE_MAPS_API_KEY")?,
            photo_dir: env_or("PHOTO_DIR", "static/uploads"),
            web_host: env_or("WEB_HOST", "0.0.0.0"),
            web_port: env_or("WEB_PORT", "5000")
                .parse()
                .map_err(|_| PlaceGrabError::Config("WEB_PORT must be a number".into()))?,
            jwt_secret: required_env("JWT_SECRET")?,
        })
    }
}

fn required_env(key: &str) -> Result<String, PlaceGrabError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| PlaceGrabError::Config(format!("{key} environment variable is required")))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_var_is_named() {
        let err = required_env("PLACEGRAB_TEST_SURELY_UNSET").unwrap_err();
        assert!(err.to_string().contains("PLACEGRAB_TEST_SURELY_UNSET"));
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(env_or("PLACEGRAB_TEST_ALSO_UNSET", "gpt-4o-mini"), "gpt-4o-mini");
    }
}
