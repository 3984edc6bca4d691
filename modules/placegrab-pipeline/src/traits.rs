// Trait seams for every collaborator the pipeline touches.
//
// Each external capability (counter store, browser, models, lookup
// providers, catalog, photo storage) sits behind one narrow trait so the
// pipeline can run against the in-memory mocks in `testing.rs`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use placegrab_common::{NewPlace, NewPost, Place, PlaceCandidate, Post};
use places_client::{GooglePlacesClient, NaverLocalClient, TextSearchParams};

// ---------------------------------------------------------------------------
// Shared counters
// ---------------------------------------------------------------------------

/// Key-value store with atomic increment and expiry, shared by every worker.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment an integer counter, creating it at 0 first if absent.
    async fn incr(&self, key: &str) -> Result<i64>;

    async fn incr_by_float(&self, key: &str, amount: f64) -> Result<f64>;

    /// Set `key` only when it does not exist. Returns whether it was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// What a post page yields before any model call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptionPage {
    /// Empty when no strategy found a caption.
    pub caption: String,
    /// The page's `og:image`, if any.
    pub thumbnail: Option<String>,
}

#[async_trait]
pub trait CaptionSource: Send + Sync {
    async fn fetch_caption(&self, post_url: &str) -> Result<CaptionPage>;
}

#[async_trait]
pub trait PlaceExtractor: Send + Sync {
    /// Structured candidates named in a caption. Unparseable model output is
    /// an empty list, not an error.
    async fn extract_places(&self, caption: &str) -> Result<Vec<PlaceCandidate>>;
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Content image URLs on the post page, deduplicated and capped.
    async fn discover_images(&self, post_url: &str) -> Result<Vec<String>>;

    async fn download(&self, image_url: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait ImageReader: Send + Sync {
    /// Read place signage from one normalized JPEG.
    async fn read_places(&self, jpeg: Vec<u8>) -> Result<Vec<PlaceCandidate>>;
}

// ---------------------------------------------------------------------------
// Lookup providers
// ---------------------------------------------------------------------------

/// One local-search hit with markup already stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalListing {
    pub name: String,
    /// Road address, or lot address when there is no road address.
    pub address: String,
    pub coordinates: Option<(f64, f64)>,
}

/// Top places-provider match for a canonical name and address.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceDetails {
    pub place_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub types: Vec<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<i64>,
    pub photo_reference: Option<String>,
}

#[async_trait]
pub trait LocalSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<LocalListing>>;
}

#[async_trait]
pub trait PlacesLookup: Send + Sync {
    async fn text_search(&self, query: &str, near: Option<(f64, f64)>) -> Result<Option<PlaceDetails>>;

    async fn photo(&self, photo_reference: &str, max_width: u32) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Persist JPEG bytes and return the web path they are served from.
    async fn save(&self, bytes: &[u8]) -> Result<String>;
}

#[async_trait]
impl LocalSearch for NaverLocalClient {
    async fn search(&self, query: &str) -> Result<Vec<LocalListing>> {
        let items = NaverLocalClient::search(self, query).await?;
        Ok(items
            .into_iter()
            .map(|item| LocalListing {
                name: item.plain_title(),
                address: item.best_address().to_string(),
                coordinates: item.coordinates(),
            })
            .collect())
    }
}

#[async_trait]
impl PlacesLookup for GooglePlacesClient {
    async fn text_search(&self, query: &str, near: Option<(f64, f64)>) -> Result<Option<PlaceDetails>> {
        let mut params = TextSearchParams::korean(query);
        if let Some((lat, lng)) = near {
            params = params.near(lat, lng);
        }
        let Some(place) = GooglePlacesClient::text_search(self, &params).await? else {
            return Ok(None);
        };
        Ok(Some(PlaceDetails {
            photo_reference: place.first_photo_reference().map(String::from),
            place_id: place.place_id,
            latitude: place.geometry.location.lat,
            longitude: place.geometry.location.lng,
            types: place.types,
            rating: place.rating,
            rating_count: place.user_ratings_total,
        }))
    }

    async fn photo(&self, photo_reference: &str, max_width: u32) -> Result<Vec<u8>> {
        Ok(GooglePlacesClient::photo(self, photo_reference, max_width).await?)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Everything one analysis writes, committed as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistBatch {
    pub post: NewPost,
    /// Already-catalogued places to link; their search count is bumped.
    pub known: Vec<i64>,
    /// Enriched places to match-or-create, then link.
    pub new_places: Vec<NewPlace>,
}

#[async_trait]
pub trait PlaceCatalog: Send + Sync {
    async fn find_post(&self, shortcode: &str) -> Result<Option<Post>>;

    async fn places_for_post(&self, post_id: i64) -> Result<Vec<Place>>;

    /// Catalog rows whose name equals `name` exactly.
    async fn find_places_by_name(&self, name: &str) -> Result<Vec<Place>>;

    /// Commit a batch atomically. Returns the linked places, known first.
    async fn persist(&self, batch: PersistBatch) -> Result<Vec<Place>>;
}
