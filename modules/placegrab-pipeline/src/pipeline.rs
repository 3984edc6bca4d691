use std::sync::Arc;

use ai_client::truncate_to_char_boundary;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use placegrab_common::{dedupe_candidates, ExtractionSource, NewPost, Place, PlaceCandidate, Post};

use crate::classifier::is_place_post;
use crate::config::PipelineConfig;
use crate::enricher::{Enricher, EnricherSettings};
use crate::error::PipelineError;
use crate::governor::{AbuseGovernor, Admission, GovernorLimits};
use crate::images::normalize::NormalizeOptions;
use crate::images::{ImagePipeline, ImagePipelineLimits};
use crate::resolver::CatalogResolver;
use crate::scoring::RewardGovernor;
use crate::shortcode::shortcode_from_url;
use crate::traits::{
    CaptionPage, CaptionSource, CounterStore, ImageReader, ImageSource, LocalSearch, PersistBatch,
    PhotoStore, PlaceCatalog, PlaceExtractor, PlacesLookup,
};

/// Every collaborator the pipeline needs, injected at startup.
#[derive(Clone, TypedBuilder)]
pub struct PipelineDeps {
    pub counters: Arc<dyn CounterStore>,
    pub catalog: Arc<dyn PlaceCatalog>,
    pub captions: Arc<dyn CaptionSource>,
    pub extractor: Arc<dyn PlaceExtractor>,
    pub images: Arc<dyn ImageSource>,
    pub reader: Arc<dyn ImageReader>,
    pub local_search: Arc<dyn LocalSearch>,
    pub places: Arc<dyn PlacesLookup>,
    pub photos: Arc<dyn PhotoStore>,
}

/// How an admitted analysis ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzeOutcome {
    Found {
        places: Vec<Place>,
        source: ExtractionSource,
        show_ad: bool,
    },
    /// Neither the caption nor the images named a place.
    NoCandidates,
    /// Candidates were extracted but none could be matched or looked up.
    Unresolved,
    /// The caption does not read like a post about a place.
    NotPlacePost,
}

struct Extraction {
    candidates: Vec<PlaceCandidate>,
    source: ExtractionSource,
    images_processed: usize,
    thumbnail: Option<String>,
}

/// The extraction-and-resolution pipeline behind `POST /analyze`.
pub struct AnalyzePipeline {
    config: PipelineConfig,
    catalog: Arc<dyn PlaceCatalog>,
    captions: Arc<dyn CaptionSource>,
    extractor: Arc<dyn PlaceExtractor>,
    governor: AbuseGovernor,
    rewards: RewardGovernor,
    images: ImagePipeline,
    resolver: CatalogResolver,
    enricher: Enricher,
}

impl AnalyzePipeline {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        let governor = AbuseGovernor::new(
            deps.counters.clone(),
            GovernorLimits {
                rate_ceiling: config.rate_ceiling,
                rate_window: config.rate_window,
                failure_threshold: config.failure_threshold,
                failure_window: config.failure_window,
                block_duration: config.block_duration,
            },
        );
        let rewards = RewardGovernor::new(
            deps.counters,
            config.ad_initial_threshold,
            config.ad_threshold_step,
        );
        let images = ImagePipeline::new(
            deps.images,
            deps.reader,
            ImagePipelineLimits {
                max_images: config.max_images,
                download_concurrency: config.download_concurrency,
                ocr_concurrency: config.ocr_concurrency,
                normalize: NormalizeOptions {
                    crop_top: config.crop_top,
                    max_edge: config.max_edge,
                    jpeg_quality: config.jpeg_quality,
                },
            },
        );
        let resolver = CatalogResolver::new(deps.catalog.clone(), config.address_token_ratio);
        let enricher = Enricher::new(
            deps.catalog.clone(),
            deps.local_search,
            deps.places,
            deps.photos,
            EnricherSettings {
                match_threshold: config.local_match_threshold,
                provider_delay: config.provider_delay,
                photo_max_width: config.photo_max_width,
            },
        );

        Self {
            config,
            catalog: deps.catalog,
            captions: deps.captions,
            extractor: deps.extractor,
            governor,
            rewards,
            images,
            resolver,
            enricher,
        }
    }

    /// Analyze one post URL on behalf of `user`.
    pub async fn analyze(&self, user: &str, url: &str) -> Result<AnalyzeOutcome, PipelineError> {
        let shortcode =
            shortcode_from_url(url).ok_or_else(|| PipelineError::InvalidUrl(url.to_string()))?;

        match self.governor.admit(user).await.map_err(PipelineError::Counter)? {
            Admission::Allowed => {}
            Admission::Throttled => return Err(PipelineError::Throttled),
            Admission::Blocked => return Err(PipelineError::Blocked),
        }

        let result = self.run(user, url, &shortcode).await;

        match &result {
            Ok(AnalyzeOutcome::Found { .. }) => {
                if let Err(e) = self.governor.record_success(user).await {
                    warn!(user, error = %e, "failed to clear failure streak");
                }
            }
            Ok(AnalyzeOutcome::NoCandidates | AnalyzeOutcome::Unresolved)
            | Err(PipelineError::Persistence(_)) => {
                if let Err(e) = self.governor.record_failure(user).await {
                    warn!(user, error = %e, "failed to record failure");
                }
            }
            _ => {}
        }

        result
    }

    async fn run(
        &self,
        user: &str,
        url: &str,
        shortcode: &str,
    ) -> Result<AnalyzeOutcome, PipelineError> {
        let cached = self
            .catalog
            .find_post(shortcode)
            .await
            .map_err(PipelineError::Persistence)?;

        if let Some(ref post) = cached {
            if let Some(outcome) = self.serve_cached(user, post).await? {
                return Ok(outcome);
            }
        }

        // ------------------------------------------------------------------
        // Caption
        // ------------------------------------------------------------------

        let page = match cached.as_ref().and_then(|p| p.caption.clone()) {
            Some(caption) if !caption.trim().is_empty() => {
                info!(shortcode, "reusing cached caption");
                CaptionPage {
                    caption,
                    thumbnail: cached.as_ref().and_then(|p| p.thumbnail.clone()),
                }
            }
            _ => match self.captions.fetch_caption(url).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(shortcode, error = %e, "caption fetch failed");
                    CaptionPage::default()
                }
            },
        };

        let caption = page.caption.trim().to_string();
        if !caption.is_empty() && !is_place_post(&caption, &self.config.intent_policy) {
            info!(shortcode, "caption is not about a place");
            self.cache_post_quietly(self.new_post(shortcode, url, &caption, page.thumbnail.clone()))
                .await;
            return Ok(AnalyzeOutcome::NotPlacePost);
        }

        // ------------------------------------------------------------------
        // Extraction: caption first, images when it yields nothing
        // ------------------------------------------------------------------

        let extraction = self.extract(shortcode, url, &caption).await;
        let thumbnail = extraction.thumbnail.clone().or(page.thumbnail);
        let post = self.new_post(shortcode, url, &caption, thumbnail);

        if extraction.candidates.is_empty() {
            info!(shortcode, "no place candidates extracted");
            self.cache_post(post).await?;
            return Ok(AnalyzeOutcome::NoCandidates);
        }

        // ------------------------------------------------------------------
        // Resolution and enrichment
        // ------------------------------------------------------------------

        let resolution = self
            .resolver
            .resolve(&extraction.candidates)
            .await
            .map_err(PipelineError::Persistence)?;
        let new_places = self.enricher.enrich(&resolution.unresolved).await;

        info!(
            shortcode,
            candidates = extraction.candidates.len(),
            matched = resolution.matched.len(),
            enriched = new_places.len(),
            "resolution complete"
        );

        if resolution.matched.is_empty() && new_places.is_empty() {
            self.cache_post(post).await?;
            return Ok(AnalyzeOutcome::Unresolved);
        }

        let places = self
            .catalog
            .persist(PersistBatch {
                post,
                known: resolution.matched.iter().map(|p| p.id).collect(),
                new_places,
            })
            .await
            .map_err(PipelineError::Persistence)?;

        let weights = self.config.score_weights;
        let amount = match extraction.source {
            ExtractionSource::Image => weights.per_image * extraction.images_processed as f64,
            _ => weights.caption,
        };
        let show_ad = self.reward(user, amount).await;

        Ok(AnalyzeOutcome::Found {
            places,
            source: extraction.source,
            show_ad,
        })
    }

    /// A cached post with links short-circuits everything else.
    async fn serve_cached(
        &self,
        user: &str,
        post: &Post,
    ) -> Result<Option<AnalyzeOutcome>, PipelineError> {
        let places = self
            .catalog
            .places_for_post(post.id)
            .await
            .map_err(PipelineError::Persistence)?;
        if places.is_empty() {
            return Ok(None);
        }

        info!(shortcode = %post.shortcode, places = places.len(), "cache hit");
        let places = self
            .catalog
            .persist(PersistBatch {
                post: NewPost {
                    shortcode: post.shortcode.clone(),
                    url: post.url.clone(),
                    caption: post.caption.clone(),
                    thumbnail: post.thumbnail.clone(),
                },
                known: places.iter().map(|p| p.id).collect(),
                new_places: Vec::new(),
            })
            .await
            .map_err(PipelineError::Persistence)?;

        let show_ad = self.reward(user, self.config.score_weights.cache).await;
        Ok(Some(AnalyzeOutcome::Found {
            places,
            source: ExtractionSource::Cache,
            show_ad,
        }))
    }

    async fn extract(&self, shortcode: &str, url: &str, caption: &str) -> Extraction {
        if !caption.is_empty() {
            let candidates = match self.extractor.extract_places(caption).await {
                Ok(candidates) => dedupe_candidates(candidates),
                Err(e) => {
                    warn!(shortcode, error = %e, "caption extraction failed");
                    Vec::new()
                }
            };
            if !candidates.is_empty() {
                return Extraction {
                    candidates,
                    source: ExtractionSource::Caption,
                    images_processed: 0,
                    thumbnail: None,
                };
            }
            info!(shortcode, "caption named no place, reading images");
        }

        let images = self.images.run(url).await;
        Extraction {
            candidates: dedupe_candidates(images.candidates),
            source: ExtractionSource::Image,
            images_processed: images.images_processed,
            thumbnail: images.thumbnail,
        }
    }

    fn new_post(&self, shortcode: &str, url: &str, caption: &str, thumbnail: Option<String>) -> NewPost {
        let caption = truncate_to_char_boundary(caption, self.config.caption_limit);
        NewPost {
            shortcode: shortcode.to_string(),
            url: url.to_string(),
            caption: (!caption.is_empty()).then(|| caption.to_string()),
            thumbnail,
        }
    }

    async fn cache_post(&self, post: NewPost) -> Result<(), PipelineError> {
        self.catalog
            .persist(PersistBatch {
                post,
                known: Vec::new(),
                new_places: Vec::new(),
            })
            .await
            .map(|_| ())
            .map_err(PipelineError::Persistence)
    }

    async fn cache_post_quietly(&self, post: NewPost) {
        if let Err(e) = self.cache_post(post).await {
            warn!(error = %e, "failed to cache post");
        }
    }

    async fn reward(&self, user: &str, amount: f64) -> bool {
        match self.rewards.add_score(user, amount).await {
            Ok(show_ad) => show_ad,
            Err(e) => {
                warn!(user, error = %e, "score update failed");
                false
            }
        }
    }
}
