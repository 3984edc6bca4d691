// Test mocks for the analyze pipeline.
//
// One mock per trait seam, all in-memory and deterministic:
// - MockCounterStore (CounterStore): HashMap with tokio-clock expiry
// - MockPlaceCatalog (PlaceCatalog): stateful posts/places/links tables
// - MockCaptionSource, MockExtractor, MockImageSource, MockImageReader
// - MockLocalSearch, MockPlacesLookup, MockPhotoStore
//
// Every mock counts its calls so tests can assert a stage never ran.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use placegrab_common::{Category, NewPlace, Place, PlaceCandidate, Post};

use crate::traits::{
    CaptionPage, CaptionSource, CounterStore, ImageReader, ImageSource, LocalListing, LocalSearch,
    PersistBatch, PhotoStore, PlaceCatalog, PlaceDetails, PlaceExtractor, PlacesLookup,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A catalog place with zeroed counters.
pub fn place(id: i64, name: &str, address: &str) -> Place {
    Place {
        id,
        external_id: format!("test:{id}"),
        name: name.to_string(),
        address: address.to_string(),
        category: Category::Etc,
        latitude: None,
        longitude: None,
        photo: None,
        rating_avg: 0.0,
        rating_count: 0,
        saved_count: 0,
        search_count: 0,
    }
}

/// A small PNG that decodes and normalizes cleanly.
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    // In-memory PNG encoding of a valid buffer cannot fail.
    let _ = image::DynamicImage::ImageRgb8(img).write_to(&mut out, image::ImageFormat::Png);
    out.into_inner()
}

// ---------------------------------------------------------------------------
// MockCounterStore
// ---------------------------------------------------------------------------

/// In-memory counters. Expiry follows the tokio clock, so paused-time tests
/// can step over windows with `tokio::time::advance`.
#[derive(Default)]
pub struct MockCounterStore {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
    fail: bool,
}

impl MockCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation errors, as if the store were unreachable.
    pub fn unavailable() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fail: true,
        }
    }

    /// Current value of a live key.
    pub fn value(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        Self::live(&mut entries, key).cloned()
    }

    fn live<'a>(
        entries: &'a mut HashMap<String, (String, Option<Instant>)>,
        key: &str,
    ) -> Option<&'a mut String> {
        let expired = matches!(entries.get(key), Some((_, Some(at))) if *at <= Instant::now());
        if expired {
            entries.remove(key);
        }
        entries.get_mut(key).map(|(value, _)| value)
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            bail!("MockCounterStore: unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MockCounterStore {
    async fn incr(&self, key: &str) -> Result<i64> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let next = match Self::live(&mut entries, key) {
            Some(value) => {
                let next = value.parse::<i64>()? + 1;
                *value = next.to_string();
                next
            }
            None => {
                entries.insert(key.to_string(), ("1".to_string(), None));
                1
            }
        };
        Ok(next)
    }

    async fn incr_by_float(&self, key: &str, amount: f64) -> Result<f64> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let next = match Self::live(&mut entries, key) {
            Some(value) => {
                let next = value.parse::<f64>()? + amount;
                *value = next.to_string();
                next
            }
            None => {
                entries.insert(key.to_string(), (amount.to_string(), None));
                amount
            }
        };
        Ok(next)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), Some(Instant::now() + ttl)));
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), (value.to_string(), Some(Instant::now() + ttl)));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.value(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockPlaceCatalog
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CatalogState {
    posts: Vec<Post>,
    places: Vec<Place>,
    links: Vec<(i64, i64)>,
}

/// Stateful in-memory catalog with the same match-or-create and
/// idempotent-link rules as the Postgres store.
#[derive(Default)]
pub struct MockPlaceCatalog {
    state: Mutex<CatalogState>,
    fail_persist: bool,
    persist_calls: AtomicUsize,
}

impl MockPlaceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(self, place: Place) -> Self {
        self.state.lock().unwrap().places.push(place);
        self
    }

    /// Register a cached post. Returns the catalog for chaining.
    pub fn with_post(self, id: i64, shortcode: &str, caption: Option<&str>) -> Self {
        self.state.lock().unwrap().posts.push(Post {
            id,
            shortcode: shortcode.to_string(),
            url: format!("https://www.instagram.com/p/{shortcode}/"),
            caption: caption.map(String::from),
            thumbnail: None,
            created_at: Utc::now(),
        });
        self
    }

    pub fn with_link(self, post_id: i64, place_id: i64) -> Self {
        self.state.lock().unwrap().links.push((post_id, place_id));
        self
    }

    /// `persist` fails, leaving state untouched.
    pub fn failing_persist(mut self) -> Self {
        self.fail_persist = true;
        self
    }

    pub fn places(&self) -> Vec<Place> {
        self.state.lock().unwrap().places.clone()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn links(&self) -> Vec<(i64, i64)> {
        self.state.lock().unwrap().links.clone()
    }

    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }
}

fn create_place(id: i64, new: &NewPlace) -> Place {
    Place {
        id,
        external_id: new
            .external_id
            .clone()
            .unwrap_or_else(|| format!("local:{id}")),
        name: new.name.clone(),
        address: new.address.clone(),
        category: new.category,
        latitude: new.latitude,
        longitude: new.longitude,
        photo: new.photo.clone(),
        rating_avg: new.rating_avg,
        rating_count: new.rating_count,
        saved_count: 0,
        search_count: 0,
    }
}

#[async_trait]
impl PlaceCatalog for MockPlaceCatalog {
    async fn find_post(&self, shortcode: &str) -> Result<Option<Post>> {
        let state = self.state.lock().unwrap();
        Ok(state.posts.iter().find(|p| p.shortcode == shortcode).cloned())
    }

    async fn places_for_post(&self, post_id: i64) -> Result<Vec<Place>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .links
            .iter()
            .filter(|(post, _)| *post == post_id)
            .filter_map(|(_, place_id)| state.places.iter().find(|p| p.id == *place_id).cloned())
            .collect())
    }

    async fn find_places_by_name(&self, name: &str) -> Result<Vec<Place>> {
        let state = self.state.lock().unwrap();
        Ok(state.places.iter().filter(|p| p.name == name).cloned().collect())
    }

    async fn persist(&self, batch: PersistBatch) -> Result<Vec<Place>> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_persist {
            bail!("MockPlaceCatalog: persist failed");
        }

        // Work on a copy so a failure part-way leaves nothing behind.
        let mut guard = self.state.lock().unwrap();
        let mut state = CatalogState {
            posts: guard.posts.clone(),
            places: guard.places.clone(),
            links: guard.links.clone(),
        };

        let post_id = match state.posts.iter_mut().find(|p| p.shortcode == batch.post.shortcode) {
            Some(post) => {
                if post.caption.is_none() {
                    post.caption = batch.post.caption.clone();
                }
                if post.thumbnail.is_none() {
                    post.thumbnail = batch.post.thumbnail.clone();
                }
                post.id
            }
            None => {
                let id = state.posts.iter().map(|p| p.id).max().unwrap_or(0) + 1;
                state.posts.push(Post {
                    id,
                    shortcode: batch.post.shortcode.clone(),
                    url: batch.post.url.clone(),
                    caption: batch.post.caption.clone(),
                    thumbnail: batch.post.thumbnail.clone(),
                    created_at: Utc::now(),
                });
                id
            }
        };

        let mut linked: Vec<Place> = Vec::new();
        for id in &batch.known {
            if let Some(place) = state.places.iter_mut().find(|p| p.id == *id) {
                place.search_count += 1;
                linked.push(place.clone());
            }
        }

        for new in &batch.new_places {
            let existing = state
                .places
                .iter()
                .find(|p| p.name == new.name && p.address == new.address)
                .cloned();
            let stored = match existing {
                Some(place) => place,
                None => {
                    let id = state.places.iter().map(|p| p.id).max().unwrap_or(0) + 1;
                    let place = create_place(id, new);
                    state.places.push(place.clone());
                    place
                }
            };
            if !linked.iter().any(|p| p.id == stored.id) {
                linked.push(stored);
            }
        }

        let existing_links: HashSet<(i64, i64)> = state.links.iter().copied().collect();
        for place in &linked {
            if !existing_links.contains(&(post_id, place.id)) {
                state.links.push((post_id, place.id));
            }
        }

        *guard = state;
        Ok(linked)
    }
}

// ---------------------------------------------------------------------------
// Extraction mocks
// ---------------------------------------------------------------------------

/// URL→page caption source. Unregistered URLs error.
#[derive(Default)]
pub struct MockCaptionSource {
    pages: HashMap<String, CaptionPage>,
    calls: AtomicUsize,
}

impl MockCaptionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_url(mut self, url: &str, caption: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            CaptionPage {
                caption: caption.to_string(),
                thumbnail: None,
            },
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptionSource for MockCaptionSource {
    async fn fetch_caption(&self, post_url: &str) -> Result<CaptionPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(post_url)
            .cloned()
            .ok_or_else(|| anyhow!("MockCaptionSource: no page registered for {post_url}"))
    }
}

/// Caption→candidates extractor. Unregistered captions yield nothing.
#[derive(Default)]
pub struct MockExtractor {
    results: HashMap<String, Vec<PlaceCandidate>>,
    calls: AtomicUsize,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_caption(mut self, caption: &str, candidates: Vec<PlaceCandidate>) -> Self {
        self.results.insert(caption.to_string(), candidates);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaceExtractor for MockExtractor {
    async fn extract_places(&self, caption: &str) -> Result<Vec<PlaceCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.get(caption).cloned().unwrap_or_default())
    }
}

/// Post URL→image URLs, image URL→bytes. Unregistered downloads error.
#[derive(Default)]
pub struct MockImageSource {
    posts: HashMap<String, Vec<String>>,
    files: HashMap<String, Vec<u8>>,
    discover_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl MockImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_post(mut self, post_url: &str, image_urls: &[&str]) -> Self {
        self.posts.insert(
            post_url.to_string(),
            image_urls.iter().map(|u| u.to_string()).collect(),
        );
        self
    }

    pub fn on_image(mut self, image_url: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(image_url.to_string(), bytes);
        self
    }

    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for MockImageSource {
    async fn discover_images(&self, post_url: &str) -> Result<Vec<String>> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.posts.get(post_url).cloned().unwrap_or_default())
    }

    async fn download(&self, image_url: &str) -> Result<Vec<u8>> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(image_url)
            .cloned()
            .ok_or_else(|| anyhow!("MockImageSource: no image registered for {image_url}"))
    }
}

/// Returns scripted readings in call order, then empty lists.
#[derive(Default)]
pub struct MockImageReader {
    readings: Mutex<Vec<Result<Vec<PlaceCandidate>, String>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl MockImageReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_read(self, candidates: Vec<PlaceCandidate>) -> Self {
        self.readings.lock().unwrap().push(Ok(candidates));
        self
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.readings.lock().unwrap().push(Err(message.to_string()));
        self
    }

    /// Hold each call open for `delay` so concurrency can be observed.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageReader for MockImageReader {
    async fn read_places(&self, _jpeg: Vec<u8>) -> Result<Vec<PlaceCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = {
            let mut readings = self.readings.lock().unwrap();
            if readings.is_empty() {
                Ok(Vec::new())
            } else {
                readings.remove(0)
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        next.map_err(|message| anyhow!("MockImageReader: {message}"))
    }
}

// ---------------------------------------------------------------------------
// Provider mocks
// ---------------------------------------------------------------------------

/// Query→listings. Unregistered queries return no listings.
#[derive(Default)]
pub struct MockLocalSearch {
    results: HashMap<String, Vec<LocalListing>>,
    queries: Mutex<Vec<String>>,
}

impl MockLocalSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_query(mut self, query: &str, listings: Vec<LocalListing>) -> Self {
        self.results.insert(query.to_string(), listings);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl LocalSearch for MockLocalSearch {
    async fn search(&self, query: &str) -> Result<Vec<LocalListing>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.results.get(query).cloned().unwrap_or_default())
    }
}

/// Query→details plus reference→photo bytes.
#[derive(Default)]
pub struct MockPlacesLookup {
    results: HashMap<String, PlaceDetails>,
    photos: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl MockPlacesLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_query(mut self, query: &str, details: PlaceDetails) -> Self {
        self.results.insert(query.to_string(), details);
        self
    }

    pub fn on_photo(mut self, reference: &str, bytes: Vec<u8>) -> Self {
        self.photos.insert(reference.to_string(), bytes);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlacesLookup for MockPlacesLookup {
    async fn text_search(&self, query: &str, _near: Option<(f64, f64)>) -> Result<Option<PlaceDetails>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.get(query).cloned())
    }

    async fn photo(&self, photo_reference: &str, _max_width: u32) -> Result<Vec<u8>> {
        self.photos
            .get(photo_reference)
            .cloned()
            .ok_or_else(|| anyhow!("MockPlacesLookup: no photo for {photo_reference}"))
    }
}

/// Records saved photos and hands out sequential web paths.
#[derive(Default)]
pub struct MockPhotoStore {
    saved: Mutex<Vec<Vec<u8>>>,
}

impl MockPhotoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

#[async_trait]
impl PhotoStore for MockPhotoStore {
    async fn save(&self, bytes: &[u8]) -> Result<String> {
        let mut saved = self.saved.lock().unwrap();
        saved.push(bytes.to_vec());
        Ok(format!("/static/uploads/mock_{}.jpg", saved.len()))
    }
}
