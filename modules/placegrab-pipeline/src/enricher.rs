use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use placegrab_common::{Category, NewPlace, PlaceCandidate};

use crate::traits::{
    LocalListing, LocalSearch, PhotoStore, PlaceCatalog, PlaceDetails, PlacesLookup,
};

const ADDRESS_BONUS: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct EnricherSettings {
    pub match_threshold: f64,
    pub provider_delay: Duration,
    pub photo_max_width: u32,
}

/// Resolves unknown candidates through local search, then the places
/// provider. Provider failures skip data, never the batch.
///
/// Photos are fetched last, only for places that survive de-duplication and
/// are not already catalogued under their resolved name and address.
pub struct Enricher {
    catalog: Arc<dyn PlaceCatalog>,
    local: Arc<dyn LocalSearch>,
    places: Arc<dyn PlacesLookup>,
    photos: Arc<dyn PhotoStore>,
    settings: EnricherSettings,
}

impl Enricher {
    pub fn new(
        catalog: Arc<dyn PlaceCatalog>,
        local: Arc<dyn LocalSearch>,
        places: Arc<dyn PlacesLookup>,
        photos: Arc<dyn PhotoStore>,
        settings: EnricherSettings,
    ) -> Self {
        Self {
            catalog,
            local,
            places,
            photos,
            settings,
        }
    }

    pub async fn enrich(&self, unresolved: &[PlaceCandidate]) -> Vec<NewPlace> {
        let mut out: Vec<NewPlace> = Vec::new();

        for (i, candidate) in unresolved.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.provider_delay).await;
            }

            let Some(listing) = self.find_listing(candidate).await else {
                info!(name = %candidate.name, "no local search match");
                continue;
            };

            let (mut place, photo_reference) = self.build_place(listing).await;
            if out.iter().any(|p| p.identity() == place.identity()) {
                debug!(name = %place.name, "candidate resolved to an already-enriched place");
                continue;
            }
            if let Some(reference) = photo_reference {
                if self.is_catalogued(&place).await {
                    debug!(name = %place.name, "place already catalogued, photo skipped");
                } else {
                    place.photo = self.store_photo(&reference).await;
                }
            }
            out.push(place);
        }

        out
    }

    /// Try progressively looser queries until one yields an acceptable hit.
    async fn find_listing(&self, candidate: &PlaceCandidate) -> Option<LocalListing> {
        let simplified = simplify_address(&candidate.address);

        for query in local_queries(candidate, &simplified) {
            let listings = match self.local.search(&query).await {
                Ok(listings) => listings,
                Err(e) => {
                    warn!(query, error = %e, "local search failed");
                    continue;
                }
            };
            if let Some(best) =
                best_local_match(&candidate.name, &simplified, listings, self.settings.match_threshold)
            {
                return Some(best);
            }
        }
        None
    }

    /// The place plus its provider photo reference, not yet downloaded.
    async fn build_place(&self, listing: LocalListing) -> (NewPlace, Option<String>) {
        let query = format!("{} {}", listing.name, listing.address);
        let details = match self.places.text_search(query.trim(), listing.coordinates).await {
            Ok(details) => details,
            Err(e) => {
                warn!(name = %listing.name, error = %e, "places lookup failed");
                None
            }
        };

        let mut place = NewPlace::bare(listing.name, listing.address);
        if let Some((lat, lng)) = listing.coordinates {
            place.latitude = Some(lat);
            place.longitude = Some(lng);
        }

        let Some(mut details) = details else {
            return (place, None);
        };

        let photo_reference = details.photo_reference.take();
        apply_details(&mut place, details);
        (place, photo_reference)
    }

    async fn is_catalogued(&self, place: &NewPlace) -> bool {
        match self.catalog.find_places_by_name(&place.name).await {
            Ok(rows) => rows.iter().any(|row| row.address == place.address),
            Err(e) => {
                warn!(name = %place.name, error = %e, "catalog lookup failed");
                false
            }
        }
    }

    async fn store_photo(&self, reference: &str) -> Option<String> {
        let bytes = match self.places.photo(reference, self.settings.photo_max_width).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "place photo download failed");
                return None;
            }
        };
        match self.photos.save(&bytes).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "place photo could not be stored");
                None
            }
        }
    }
}

fn apply_details(place: &mut NewPlace, details: PlaceDetails) {
    place.category = Category::from_place_types(details.types.as_slice());
    place.latitude = Some(details.latitude);
    place.longitude = Some(details.longitude);
    place.rating_avg = details.rating.unwrap_or(0.0).max(0.0);
    place.rating_count = details.rating_count.unwrap_or(0).max(0);
    place.external_id = Some(details.place_id).filter(|id| !id.is_empty());
}

fn local_queries(candidate: &PlaceCandidate, simplified: &str) -> Vec<String> {
    let mut queries = Vec::new();
    for query in [
        format!("{} {}", candidate.name, candidate.address),
        format!("{} {}", candidate.name, simplified),
        candidate.name.clone(),
    ] {
        let query = query.trim().to_string();
        if !query.is_empty() && !queries.contains(&query) {
            queries.push(query);
        }
    }
    queries
}

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(.*?\)").expect("valid regex"));

/// Drop parenthesized qualifiers and keep the first two tokens,
/// e.g. `서울 마포구 연남동 (2층)` becomes `서울 마포구`.
pub fn simplify_address(address: &str) -> String {
    PARENTHESIZED
        .replace_all(address, "")
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_name(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Highest-scoring listing by name similarity plus an address bonus.
/// Returns `None` when the best score is under `threshold`.
pub fn best_local_match(
    name: &str,
    simplified_address: &str,
    listings: Vec<LocalListing>,
    threshold: f64,
) -> Option<LocalListing> {
    let wanted = normalize_name(name);

    let mut best: Option<(f64, LocalListing)> = None;
    for listing in listings {
        let mut score = strsim::normalized_levenshtein(&wanted, &normalize_name(&listing.name));
        if !simplified_address.is_empty() && listing.address.contains(simplified_address) {
            score += ADDRESS_BONUS;
        }
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, listing));
        }
    }

    best.filter(|(score, _)| *score >= threshold)
        .map(|(_, listing)| listing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(name: &str, address: &str) -> LocalListing {
        LocalListing {
            name: name.to_string(),
            address: address.to_string(),
            coordinates: None,
        }
    }

    #[test]
    fn simplifies_addresses() {
        assert_eq!(simplify_address("서울 마포구 연남동 (2층)"), "서울 마포구");
        assert_eq!(simplify_address("(본점) 성수동"), "성수동");
        assert_eq!(simplify_address(""), "");
    }

    #[test]
    fn address_bonus_breaks_ties() {
        let listings = vec![
            listing("카페 연남", "부산 해운대구 1"),
            listing("카페 연남", "서울 마포구 동교로 1"),
        ];
        let best = best_local_match("카페 연남", "서울 마포구", listings, 0.5).unwrap();
        assert_eq!(best.address, "서울 마포구 동교로 1");
    }

    #[test]
    fn weak_matches_are_rejected() {
        let listings = vec![listing("완전히 다른 가게 이름", "서울 강남구")];
        assert!(best_local_match("카페 연남", "", listings, 0.5).is_none());
        assert!(best_local_match("카페 연남", "", Vec::new(), 0.5).is_none());
    }

    #[test]
    fn name_comparison_ignores_case_and_spacing() {
        let listings = vec![listing("Cafe  Layered", "서울 종로구")];
        assert!(best_local_match("cafe layered", "", listings, 0.99).is_some());
    }

    #[test]
    fn queries_loosen_and_dedupe() {
        let candidate = PlaceCandidate::new("카페 연남", "서울 마포구 연남동 (2층)");
        let queries = local_queries(&candidate, &simplify_address(&candidate.address));
        assert_eq!(
            queries,
            vec![
                "카페 연남 서울 마포구 연남동 (2층)".to_string(),
                "카페 연남 서울 마포구".to_string(),
                "카페 연남".to_string(),
            ]
        );

        let bare = PlaceCandidate::new("카페 연남", "");
        assert_eq!(local_queries(&bare, ""), vec!["카페 연남".to_string()]);
    }

    #[test]
    fn details_map_category_and_clamp_ratings() {
        let mut place = NewPlace::bare("카페 연남", "서울 마포구");
        apply_details(
            &mut place,
            PlaceDetails {
                place_id: "ChIJ1".into(),
                latitude: 37.5,
                longitude: 126.9,
                types: vec!["point_of_interest".into(), "cafe".into()],
                rating: Some(4.5),
                rating_count: Some(-3),
                photo_reference: None,
            },
        );
        assert_eq!(place.category, Category::Cafe);
        assert_eq!(place.external_id.as_deref(), Some("ChIJ1"));
        assert_eq!(place.rating_count, 0);
        assert_eq!(place.latitude, Some(37.5));
    }
}
