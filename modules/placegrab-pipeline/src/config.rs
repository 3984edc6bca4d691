use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::classifier::IntentPolicy;

/// Per-source reward weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub cache: f64,
    pub caption: f64,
    /// Multiplied by the number of images that went through OCR.
    pub per_image: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            cache: 0.2,
            caption: 0.5,
            per_image: 0.3,
        }
    }
}

/// Tunables for one [`crate::AnalyzePipeline`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct PipelineConfig {
    // Abuse governor
    #[builder(default = 7)]
    pub rate_ceiling: i64,
    #[builder(default = Duration::from_secs(60))]
    pub rate_window: Duration,
    #[builder(default = 5)]
    pub failure_threshold: i64,
    #[builder(default = Duration::from_secs(600))]
    pub failure_window: Duration,
    #[builder(default = Duration::from_secs(600))]
    pub block_duration: Duration,

    // Browser
    #[builder(default = Duration::from_secs(15))]
    pub page_timeout: Duration,
    #[builder(default = 4)]
    pub max_tabs: usize,

    // Classifier
    #[builder(default)]
    pub intent_policy: IntentPolicy,

    // Image pipeline
    #[builder(default = 10)]
    pub max_images: usize,
    #[builder(default = 10)]
    pub download_concurrency: usize,
    #[builder(default = 3)]
    pub ocr_concurrency: usize,
    #[builder(default = 150)]
    pub crop_top: u32,
    #[builder(default = 800)]
    pub max_edge: u32,
    #[builder(default = 50)]
    pub jpeg_quality: u8,

    // Resolution and enrichment
    #[builder(default = 0.7)]
    pub address_token_ratio: f64,
    #[builder(default = 0.5)]
    pub local_match_threshold: f64,
    #[builder(default = Duration::from_millis(100))]
    pub provider_delay: Duration,
    #[builder(default = 800)]
    pub photo_max_width: u32,

    // Persistence
    #[builder(default = 2000)]
    pub caption_limit: usize,

    // Rewards
    #[builder(default)]
    pub score_weights: ScoreWeights,
    #[builder(default = 10.0)]
    pub ad_initial_threshold: f64,
    #[builder(default = 7.0)]
    pub ad_threshold_step: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_limits() {
        let config = PipelineConfig::default();
        assert_eq!(config.rate_ceiling, 7);
        assert_eq!(config.rate_window, Duration::from_secs(60));
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.block_duration, Duration::from_secs(600));
        assert_eq!(config.max_images, 10);
        assert_eq!(config.ocr_concurrency, 3);
        assert_eq!(config.ad_initial_threshold, 10.0);
    }

    #[test]
    fn builder_overrides_single_fields() {
        let config = PipelineConfig::builder().rate_ceiling(2).max_tabs(1).build();
        assert_eq!(config.rate_ceiling, 2);
        assert_eq!(config.max_tabs, 1);
        assert_eq!(config.download_concurrency, 10);
    }
}
