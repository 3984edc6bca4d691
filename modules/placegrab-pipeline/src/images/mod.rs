pub mod discovery;
pub mod normalize;
pub mod ocr;

use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use placegrab_common::PlaceCandidate;

use crate::traits::{ImageReader, ImageSource};
use normalize::{normalize_blocking, NormalizeOptions};

/// Result of running the image pipeline on one post.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageExtraction {
    pub candidates: Vec<PlaceCandidate>,
    /// Images that made it through normalization and were sent to OCR.
    pub images_processed: usize,
    /// First discovered image URL.
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ImagePipelineLimits {
    pub max_images: usize,
    pub download_concurrency: usize,
    pub ocr_concurrency: usize,
    pub normalize: NormalizeOptions,
}

/// Discover, download, normalize and OCR a post's images.
///
/// Every stage degrades to empty. A failed image never affects its siblings.
pub struct ImagePipeline {
    source: Arc<dyn ImageSource>,
    reader: Arc<dyn ImageReader>,
    limits: ImagePipelineLimits,
}

impl ImagePipeline {
    pub fn new(
        source: Arc<dyn ImageSource>,
        reader: Arc<dyn ImageReader>,
        limits: ImagePipelineLimits,
    ) -> Self {
        Self {
            source,
            reader,
            limits,
        }
    }

    pub async fn run(&self, post_url: &str) -> ImageExtraction {
        let mut urls = match self.source.discover_images(post_url).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!(post_url, error = %e, "image discovery failed");
                return ImageExtraction::default();
            }
        };
        urls.truncate(self.limits.max_images);
        let thumbnail = urls.first().cloned();
        if urls.is_empty() {
            info!(post_url, "no post images found");
            return ImageExtraction::default();
        }

        let normalized = self.download_all(&urls).await;
        if normalized.is_empty() {
            warn!(post_url, "no image survived download and normalization");
            return ImageExtraction {
                thumbnail,
                ..Default::default()
            };
        }

        let images_processed = normalized.len();
        let candidates = self.read_all(normalized).await;
        info!(
            post_url,
            images = images_processed,
            candidates = candidates.len(),
            "image extraction complete"
        );

        ImageExtraction {
            candidates,
            images_processed,
            thumbnail,
        }
    }

    async fn download_all(&self, urls: &[String]) -> Vec<Vec<u8>> {
        let options = self.limits.normalize;
        let results: Vec<Option<Vec<u8>>> = stream::iter(urls.iter().cloned())
            .map(|url| {
                let source = self.source.clone();
                async move {
                    let bytes = match source.download(&url).await {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            warn!(url, error = %e, "image download failed");
                            return None;
                        }
                    };
                    match normalize_blocking(bytes, options).await {
                        Ok(jpeg) => Some(jpeg),
                        Err(e) => {
                            warn!(url, error = %e, "image normalization failed");
                            None
                        }
                    }
                }
            })
            .buffered(self.limits.download_concurrency.max(1))
            .collect()
            .await;

        results.into_iter().flatten().collect()
    }

    async fn read_all(&self, images: Vec<Vec<u8>>) -> Vec<PlaceCandidate> {
        let permits = Arc::new(Semaphore::new(self.limits.ocr_concurrency.max(1)));

        let tasks = images.into_iter().enumerate().map(|(index, jpeg)| {
            let permits = permits.clone();
            let reader = self.reader.clone();
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Vec::new();
                };
                match reader.read_places(jpeg).await {
                    Ok(found) => found,
                    Err(e) => {
                        warn!(index, error = %e, "image OCR failed");
                        Vec::new()
                    }
                }
            }
        });

        join_all(tasks).await.into_iter().flatten().collect()
    }
}
