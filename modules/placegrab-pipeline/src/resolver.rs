use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use placegrab_common::{Place, PlaceCandidate};

use crate::traits::PlaceCatalog;

/// Candidates split by whether the catalog already knows them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub matched: Vec<Place>,
    pub unresolved: Vec<PlaceCandidate>,
}

/// Matches candidates against catalog rows by exact name, then address.
pub struct CatalogResolver {
    catalog: Arc<dyn PlaceCatalog>,
    token_ratio: f64,
}

impl CatalogResolver {
    pub fn new(catalog: Arc<dyn PlaceCatalog>, token_ratio: f64) -> Self {
        Self {
            catalog,
            token_ratio,
        }
    }

    pub async fn resolve(&self, candidates: &[PlaceCandidate]) -> Result<Resolution> {
        let mut resolution = Resolution::default();

        for candidate in candidates {
            let rows = self.catalog.find_places_by_name(&candidate.name).await?;
            match pick_row(candidate, rows, self.token_ratio) {
                Some(place) => {
                    debug!(name = %candidate.name, place_id = place.id, "catalog hit");
                    if !resolution.matched.iter().any(|p| p.id == place.id) {
                        resolution.matched.push(place);
                    }
                }
                None => resolution.unresolved.push(candidate.clone()),
            }
        }

        Ok(resolution)
    }
}

fn pick_row(candidate: &PlaceCandidate, rows: Vec<Place>, token_ratio: f64) -> Option<Place> {
    if rows.len() == 1 && !candidate.has_address() {
        return rows.into_iter().next();
    }
    rows.into_iter()
        .find(|row| address_match(&candidate.address, &row.address, token_ratio))
}

/// Lenient address comparison.
///
/// True when the whitespace-normalized candidate is a substring of the
/// stored address, or when at least `token_ratio` of the candidate's tokens
/// each appear somewhere in it. An empty candidate never matches.
pub fn address_match(candidate: &str, stored: &str, token_ratio: f64) -> bool {
    let tokens: Vec<&str> = candidate.split_whitespace().collect();
    if tokens.is_empty() {
        return false;
    }

    let normalized_candidate = tokens.join(" ");
    let normalized_stored = stored.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized_stored.contains(&normalized_candidate) {
        return true;
    }

    let hits = tokens.iter().filter(|t| normalized_stored.contains(*t)).count();
    hits as f64 / tokens.len() as f64 >= token_ratio
}
