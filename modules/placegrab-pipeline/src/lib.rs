pub mod browser;
pub mod caption;
pub mod classifier;
pub mod config;
pub mod enricher;
pub mod error;
pub mod extractor;
pub mod governor;
pub mod images;
pub mod pipeline;
pub mod resolver;
pub mod scoring;
pub mod shortcode;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use config::{PipelineConfig, ScoreWeights};
pub use error::PipelineError;
pub use pipeline::{AnalyzeOutcome, AnalyzePipeline, PipelineDeps};
