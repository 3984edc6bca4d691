//! End-to-end analyze flows against the in-memory mocks.
//!
//! Each test wires an `AnalyzePipeline` from `testing.rs` mocks, runs one or
//! more analyses, then asserts on the outcome and on which collaborators were
//! (or were not) touched.

use std::sync::Arc;
use std::time::Duration;

use placegrab_common::{Category, ExtractionSource, PlaceCandidate};
use placegrab_pipeline::testing::{
    place, sample_png, MockCaptionSource, MockCounterStore, MockExtractor, MockImageReader,
    MockImageSource, MockLocalSearch, MockPhotoStore, MockPlaceCatalog, MockPlacesLookup,
};
use placegrab_pipeline::traits::{LocalListing, PlaceDetails};
use placegrab_pipeline::{
    AnalyzeOutcome, AnalyzePipeline, PipelineConfig, PipelineDeps, PipelineError,
};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Harness {
    counters: Arc<MockCounterStore>,
    catalog: Arc<MockPlaceCatalog>,
    captions: Arc<MockCaptionSource>,
    extractor: Arc<MockExtractor>,
    images: Arc<MockImageSource>,
    reader: Arc<MockImageReader>,
    local: Arc<MockLocalSearch>,
    places: Arc<MockPlacesLookup>,
    photos: Arc<MockPhotoStore>,
}

impl Harness {
    fn pipeline(&self) -> AnalyzePipeline {
        let deps = PipelineDeps::builder()
            .counters(self.counters.clone())
            .catalog(self.catalog.clone())
            .captions(self.captions.clone())
            .extractor(self.extractor.clone())
            .images(self.images.clone())
            .reader(self.reader.clone())
            .local_search(self.local.clone())
            .places(self.places.clone())
            .photos(self.photos.clone())
            .build();
        let config = PipelineConfig::builder()
            .provider_delay(Duration::ZERO)
            .build();
        AnalyzePipeline::new(deps, config)
    }

    fn counter(&self, key: &str) -> Option<f64> {
        self.counters.value(key).and_then(|v| v.parse().ok())
    }
}

fn post_url(shortcode: &str) -> String {
    format!("https://www.instagram.com/p/{shortcode}/")
}

fn listing(name: &str, address: &str, coordinates: Option<(f64, f64)>) -> LocalListing {
    LocalListing {
        name: name.to_string(),
        address: address.to_string(),
        coordinates,
    }
}

const YEONNAM_CAPTION: &str = "📍 카페 연남 서울 마포구 연남동 추천";

/// Caption names 카페 연남; local search and the places provider both know it.
fn yeonnam_harness() -> Harness {
    let url = post_url("YEON01");
    Harness {
        captions: Arc::new(MockCaptionSource::new().on_url(&url, YEONNAM_CAPTION)),
        extractor: Arc::new(MockExtractor::new().on_caption(
            YEONNAM_CAPTION,
            vec![PlaceCandidate::new("카페 연남", "서울 마포구 연남동")],
        )),
        local: Arc::new(MockLocalSearch::new().on_query(
            "카페 연남 서울 마포구 연남동",
            vec![listing("카페 연남", "서울 마포구 연남동 1-2", Some((37.56, 126.92)))],
        )),
        places: Arc::new(yeonnam_places()),
        ..Default::default()
    }
}

/// Places provider that knows 카페 연남 at its local-search address.
fn yeonnam_places() -> MockPlacesLookup {
    MockPlacesLookup::new()
        .on_query(
            "카페 연남 서울 마포구 연남동 1-2",
            PlaceDetails {
                place_id: "ChIJ-yeonnam".into(),
                latitude: 37.5612,
                longitude: 126.9234,
                types: vec!["point_of_interest".into(), "cafe".into()],
                rating: Some(4.4),
                rating_count: Some(120),
                photo_reference: Some("photo-ref".into()),
            },
        )
        .on_photo("photo-ref", vec![0xff, 0xd8, 0xff])
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cached_post_is_served_without_extraction() {
    let h = Harness {
        catalog: Arc::new(
            MockPlaceCatalog::new()
                .with_place(place(7, "스타벅스", "서울 중구 세종대로 1"))
                .with_post(1, "ABC123", Some("커피"))
                .with_link(1, 7),
        ),
        ..Default::default()
    };

    let outcome = h.pipeline().analyze("u1", &post_url("ABC123")).await.unwrap();

    let AnalyzeOutcome::Found { places, source, show_ad } = outcome else {
        panic!("expected Found, got {outcome:?}");
    };
    assert_eq!(source, ExtractionSource::Cache);
    assert!(!show_ad);
    assert_eq!(places.len(), 1);
    assert_eq!(places[0].name, "스타벅스");

    assert_eq!(h.captions.calls(), 0);
    assert_eq!(h.extractor.calls(), 0);
    assert_eq!(h.images.discover_calls(), 0);
    assert_eq!(h.local.calls(), 0);

    assert_eq!(h.catalog.places()[0].search_count, 1);
    assert_eq!(h.catalog.links(), vec![(1, 7)]);
    assert_eq!(h.counter("user_score:u1"), Some(0.2));
}

#[tokio::test]
async fn cached_post_without_places_reuses_its_caption() {
    let h = Harness {
        catalog: Arc::new(MockPlaceCatalog::new().with_post(4, "OLD001", Some("오늘 점심은 김밥"))),
        ..Default::default()
    };

    let outcome = h.pipeline().analyze("u1", &post_url("OLD001")).await.unwrap();

    assert_eq!(outcome, AnalyzeOutcome::NotPlacePost);
    assert_eq!(h.captions.calls(), 0, "cached caption should not be re-fetched");
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_place_caption_stops_before_extraction() {
    let url = post_url("LUNCH1");
    let h = Harness {
        captions: Arc::new(MockCaptionSource::new().on_url(&url, "오늘 점심은 김밥")),
        ..Default::default()
    };

    let outcome = h.pipeline().analyze("u1", &url).await.unwrap();

    assert_eq!(outcome, AnalyzeOutcome::NotPlacePost);
    assert_eq!(h.extractor.calls(), 0);
    assert_eq!(h.images.discover_calls(), 0);
    assert_eq!(h.local.calls(), 0);
    assert_eq!(h.places.calls(), 0);

    let posts = h.catalog.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].caption.as_deref(), Some("오늘 점심은 김밥"));
    assert!(h.catalog.links().is_empty());
    assert_eq!(h.counter("fail_count:u1"), None, "not-a-place is not a failure");
}

// ---------------------------------------------------------------------------
// Caption path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn caption_candidate_is_enriched_and_persisted() {
    let h = yeonnam_harness();

    let outcome = h.pipeline().analyze("u1", &post_url("YEON01")).await.unwrap();

    let AnalyzeOutcome::Found { places, source, .. } = outcome else {
        panic!("expected Found, got {outcome:?}");
    };
    assert_eq!(source, ExtractionSource::Caption);
    assert_eq!(places.len(), 1);

    let cafe = &places[0];
    assert_eq!(cafe.name, "카페 연남");
    assert_eq!(cafe.address, "서울 마포구 연남동 1-2");
    assert_eq!(cafe.category, Category::Cafe);
    assert_eq!(cafe.external_id, "ChIJ-yeonnam");
    assert_eq!(cafe.latitude, Some(37.5612));
    assert_eq!(cafe.rating_count, 120);
    assert_eq!(cafe.photo.as_deref(), Some("/static/uploads/mock_1.jpg"));

    assert_eq!(h.images.discover_calls(), 0, "images are only read when the caption fails");
    assert_eq!(h.photos.saved(), 1);
    assert_eq!(h.catalog.links().len(), 1);
    assert_eq!(h.counter("user_score:u1"), Some(0.5));
}

#[tokio::test]
async fn known_place_skips_providers() {
    let url = post_url("KNOWN1");
    let h = Harness {
        catalog: Arc::new(
            MockPlaceCatalog::new().with_place(place(3, "카페 연남", "서울 마포구 연남동 1-2")),
        ),
        captions: Arc::new(MockCaptionSource::new().on_url(&url, YEONNAM_CAPTION)),
        extractor: Arc::new(MockExtractor::new().on_caption(
            YEONNAM_CAPTION,
            vec![PlaceCandidate::new("카페 연남", "마포구 연남동")],
        )),
        ..Default::default()
    };

    let outcome = h.pipeline().analyze("u1", &url).await.unwrap();

    let AnalyzeOutcome::Found { places, .. } = outcome else {
        panic!("expected Found, got {outcome:?}");
    };
    assert_eq!(places[0].id, 3);
    assert_eq!(h.local.calls(), 0);
    assert_eq!(h.places.calls(), 0);
    assert_eq!(h.catalog.places()[0].search_count, 1);
    assert_eq!(h.catalog.links(), vec![(1, 3)]);
}

#[tokio::test]
async fn repeated_analysis_links_once() {
    let h = yeonnam_harness();
    let pipeline = h.pipeline();

    let first = pipeline.analyze("u1", &post_url("YEON01")).await.unwrap();
    let second = pipeline.analyze("u1", &post_url("YEON01")).await.unwrap();

    assert!(matches!(first, AnalyzeOutcome::Found { source: ExtractionSource::Caption, .. }));
    assert!(matches!(second, AnalyzeOutcome::Found { source: ExtractionSource::Cache, .. }));

    assert_eq!(h.catalog.places().len(), 1);
    assert_eq!(h.catalog.links().len(), 1);
    assert_eq!(h.catalog.places()[0].search_count, 1);
    assert_eq!(h.extractor.calls(), 1);
}

#[tokio::test]
async fn duplicate_candidates_create_one_place() {
    let url = post_url("DUP001");
    let h = Harness {
        captions: Arc::new(MockCaptionSource::new().on_url(&url, YEONNAM_CAPTION)),
        extractor: Arc::new(MockExtractor::new().on_caption(
            YEONNAM_CAPTION,
            vec![
                PlaceCandidate::new("카페 연남", ""),
                PlaceCandidate::new("카페연남", ""),
            ],
        )),
        local: Arc::new(
            MockLocalSearch::new()
                .on_query("카페 연남", vec![listing("카페 연남", "서울 마포구 연남동 1-2", None)])
                .on_query("카페연남", vec![listing("카페 연남", "서울 마포구 연남동 1-2", None)]),
        ),
        ..Default::default()
    };

    let outcome = h.pipeline().analyze("u1", &url).await.unwrap();

    let AnalyzeOutcome::Found { places, .. } = outcome else {
        panic!("expected Found, got {outcome:?}");
    };
    assert_eq!(places.len(), 1);
    assert_eq!(h.catalog.places().len(), 1);
    assert_eq!(h.catalog.places()[0].category, Category::Etc);
}

#[tokio::test]
async fn duplicate_candidates_store_one_photo() {
    let url = post_url("DUP002");
    let h = Harness {
        captions: Arc::new(MockCaptionSource::new().on_url(&url, YEONNAM_CAPTION)),
        extractor: Arc::new(MockExtractor::new().on_caption(
            YEONNAM_CAPTION,
            vec![
                PlaceCandidate::new("카페 연남", ""),
                PlaceCandidate::new("카페연남", ""),
            ],
        )),
        local: Arc::new(
            MockLocalSearch::new()
                .on_query("카페 연남", vec![listing("카페 연남", "서울 마포구 연남동 1-2", None)])
                .on_query("카페연남", vec![listing("카페 연남", "서울 마포구 연남동 1-2", None)]),
        ),
        places: Arc::new(yeonnam_places()),
        ..Default::default()
    };

    h.pipeline().analyze("u1", &url).await.unwrap();

    assert_eq!(h.photos.saved(), 1);
    assert_eq!(h.catalog.places().len(), 1);
    assert_eq!(
        h.catalog.places()[0].photo.as_deref(),
        Some("/static/uploads/mock_1.jpg")
    );
}

#[tokio::test]
async fn listing_already_in_catalog_skips_the_photo() {
    let url = post_url("ALIAS1");
    let h = Harness {
        catalog: Arc::new(
            MockPlaceCatalog::new().with_place(place(5, "카페 연남", "서울 마포구 연남동 1-2")),
        ),
        captions: Arc::new(MockCaptionSource::new().on_url(&url, YEONNAM_CAPTION)),
        extractor: Arc::new(MockExtractor::new().on_caption(
            YEONNAM_CAPTION,
            vec![PlaceCandidate::new("카페연남", "")],
        )),
        local: Arc::new(
            MockLocalSearch::new()
                .on_query("카페연남", vec![listing("카페 연남", "서울 마포구 연남동 1-2", None)]),
        ),
        places: Arc::new(yeonnam_places()),
        ..Default::default()
    };

    let outcome = h.pipeline().analyze("u1", &url).await.unwrap();

    let AnalyzeOutcome::Found { places, .. } = outcome else {
        panic!("expected Found, got {outcome:?}");
    };
    assert_eq!(places[0].id, 5);
    assert_eq!(h.photos.saved(), 0);
    assert_eq!(h.catalog.places().len(), 1);
}

// ---------------------------------------------------------------------------
// Image path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_caption_falls_back_to_images() {
    let url = post_url("IMG001");
    let h = Harness {
        captions: Arc::new(MockCaptionSource::new().on_url(&url, "")),
        images: Arc::new(
            MockImageSource::new()
                .on_post(&url, &["https://cdn.test/a.jpg", "https://cdn.test/b.jpg"])
                .on_image("https://cdn.test/a.jpg", sample_png(400, 500))
                .on_image("https://cdn.test/b.jpg", sample_png(300, 300)),
        ),
        reader: Arc::new(
            MockImageReader::new()
                .then_read(vec![PlaceCandidate::new("카페 연남", "")])
                .then_read(Vec::new()),
        ),
        local: Arc::new(MockLocalSearch::new().on_query(
            "카페 연남",
            vec![listing("카페 연남", "서울 마포구 연남동 1-2", Some((37.56, 126.92)))],
        )),
        ..Default::default()
    };

    let outcome = h.pipeline().analyze("u1", &url).await.unwrap();

    let AnalyzeOutcome::Found { places, source, .. } = outcome else {
        panic!("expected Found, got {outcome:?}");
    };
    assert_eq!(source, ExtractionSource::Image);
    assert_eq!(places[0].latitude, Some(37.56));
    assert_eq!(h.extractor.calls(), 0, "empty caption skips the text model");
    assert_eq!(h.reader.calls(), 2);

    let posts = h.catalog.posts();
    assert_eq!(posts[0].caption, None);
    assert_eq!(posts[0].thumbnail.as_deref(), Some("https://cdn.test/a.jpg"));

    let score = h.counter("user_score:u1").unwrap();
    assert!((score - 0.6).abs() < 1e-9, "two images at 0.3 each, got {score}");
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn nothing_extracted_counts_as_failure() {
    let url = post_url("EMPTY1");
    let h = Harness {
        captions: Arc::new(MockCaptionSource::new().on_url(&url, "📍 어딘가 좋은 곳")),
        ..Default::default()
    };

    let outcome = h.pipeline().analyze("u1", &url).await.unwrap();

    assert_eq!(outcome, AnalyzeOutcome::NoCandidates);
    assert_eq!(h.extractor.calls(), 1);
    assert_eq!(h.images.discover_calls(), 1);
    assert_eq!(h.catalog.posts().len(), 1);
    assert_eq!(h.counter("fail_count:u1"), Some(1.0));
}

#[tokio::test]
async fn unresolved_candidates_count_as_failure() {
    let url = post_url("NOPE01");
    let h = Harness {
        captions: Arc::new(MockCaptionSource::new().on_url(&url, YEONNAM_CAPTION)),
        extractor: Arc::new(MockExtractor::new().on_caption(
            YEONNAM_CAPTION,
            vec![PlaceCandidate::new("없는 가게", "")],
        )),
        ..Default::default()
    };

    let outcome = h.pipeline().analyze("u1", &url).await.unwrap();

    assert_eq!(outcome, AnalyzeOutcome::Unresolved);
    assert_eq!(h.local.queries(), vec!["없는 가게".to_string()]);
    assert!(h.catalog.places().is_empty());
    assert!(h.catalog.links().is_empty());
    assert_eq!(h.counter("fail_count:u1"), Some(1.0));
}

#[tokio::test]
async fn five_failures_block_the_user() {
    let h = Harness {
        captions: Arc::new(
            (1..=6).fold(MockCaptionSource::new(), |src, i| {
                src.on_url(&post_url(&format!("FAIL0{i}")), "📍 어딘가")
            }),
        ),
        ..Default::default()
    };
    let pipeline = h.pipeline();

    for i in 1..=5 {
        let outcome = pipeline.analyze("u1", &post_url(&format!("FAIL0{i}"))).await.unwrap();
        assert_eq!(outcome, AnalyzeOutcome::NoCandidates);
    }

    let sixth = pipeline.analyze("u1", &post_url("FAIL06")).await;
    assert!(matches!(sixth, Err(PipelineError::Blocked)), "got {sixth:?}");
    assert_eq!(h.captions.calls(), 5);

    let other = pipeline.analyze("u2", &post_url("FAIL06")).await.unwrap();
    assert_eq!(other, AnalyzeOutcome::NoCandidates, "blocks are per user");
}

#[tokio::test]
async fn persistence_failure_is_reported_and_counted() {
    let mut h = yeonnam_harness();
    h.catalog = Arc::new(MockPlaceCatalog::new().failing_persist());

    let result = h.pipeline().analyze("u1", &post_url("YEON01")).await;

    assert!(matches!(result, Err(PipelineError::Persistence(_))), "got {result:?}");
    assert_eq!(h.catalog.persist_calls(), 1);
    assert!(h.catalog.places().is_empty());
    assert_eq!(h.counter("fail_count:u1"), Some(1.0));
    assert_eq!(h.counter("user_score:u1"), None);
}

#[tokio::test]
async fn invalid_url_touches_nothing() {
    let h = Harness::default();

    let result = h.pipeline().analyze("u1", "https://example.com/p/ABC123/").await;

    assert!(matches!(result, Err(PipelineError::InvalidUrl(_))), "got {result:?}");
    assert_eq!(h.counters.value("rate_limit:u1"), None);
    assert_eq!(h.captions.calls(), 0);
}

#[tokio::test]
async fn unavailable_counters_reject_the_request() {
    let h = Harness {
        counters: Arc::new(MockCounterStore::unavailable()),
        ..Default::default()
    };

    let result = h.pipeline().analyze("u1", &post_url("ABC123")).await;

    assert!(matches!(result, Err(PipelineError::Counter(_))), "got {result:?}");
    assert_eq!(h.captions.calls(), 0);
}
