use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Candidates
// =============================================================================

/// Placeholder values models emit instead of leaving a field blank.
const SENTINELS: &[&str] = &["no_name", "no_address", "none", "null", "n/a"];

/// An extracted (name, address) pair not yet matched to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaceCandidate {
    pub name: String,
    /// Empty when the source gave no address.
    pub address: String,
}

impl PlaceCandidate {
    pub fn new(name: impl AsRef<str>, address: impl AsRef<str>) -> Self {
        Self {
            name: clean_field(name.as_ref()),
            address: clean_field(address.as_ref()),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn has_address(&self) -> bool {
        !self.address.is_empty()
    }
}

fn clean_field(raw: &str) -> String {
    let trimmed = raw.trim();
    if SENTINELS.iter().any(|s| trimmed.eq_ignore_ascii_case(s)) {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Trim, drop nameless entries and duplicates, keeping first-seen order.
pub fn dedupe_candidates(candidates: impl IntoIterator<Item = PlaceCandidate>) -> Vec<PlaceCandidate> {
    let mut out: Vec<PlaceCandidate> = Vec::new();
    for candidate in candidates {
        let candidate = PlaceCandidate::new(&candidate.name, &candidate.address);
        if candidate.is_valid() && !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

// =============================================================================
// Category
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Cafe,
    Bar,
    Restaurant,
    Dessert,
    Cloth,
    Accessory,
    Exhibition,
    Activity,
    Etc,
}

/// Provider type tags per category, highest priority first.
const CATEGORY_BUCKETS: &[(Category, &[&str])] = &[
    (Category::Exhibition, &["art_gallery", "museum", "arts_organization"]),
    (
        Category::Activity,
        &[
            "amusement_park",
            "aquarium",
            "bowling_alley",
            "campground",
            "movie_theater",
            "zoo",
            "park",
            "tourist_attraction",
            "stadium",
        ],
    ),
    (
        Category::Accessory,
        &["home_goods_store", "book_store", "florist", "furniture_store"],
    ),
    (
        Category::Cloth,
        &[
            "clothing_store",
            "shoe_store",
            "jewelry_store",
            "shopping_mall",
            "department_store",
        ],
    ),
    (Category::Dessert, &["bakery"]),
    (Category::Cafe, &["cafe"]),
    (Category::Bar, &["bar", "night_club", "casino", "liquor_store"]),
    (
        Category::Restaurant,
        &["restaurant", "food", "meal_takeaway", "meal_delivery"],
    ),
];

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Cafe,
        Category::Bar,
        Category::Restaurant,
        Category::Dessert,
        Category::Cloth,
        Category::Accessory,
        Category::Exhibition,
        Category::Activity,
        Category::Etc,
    ];

    /// Map a provider's raw type tags. First matching bucket wins; no match is `Etc`.
    pub fn from_place_types<S: AsRef<str>>(types: &[S]) -> Self {
        CATEGORY_BUCKETS
            .iter()
            .find(|(_, tags)| types.iter().any(|t| tags.contains(&t.as_ref())))
            .map(|(category, _)| *category)
            .unwrap_or(Category::Etc)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cafe => "cafe",
            Category::Bar => "bar",
            Category::Restaurant => "restaurant",
            Category::Dessert => "dessert",
            Category::Cloth => "cloth",
            Category::Accessory => "accessory",
            Category::Exhibition => "exhibition",
            Category::Activity => "activity",
            Category::Etc => "etc",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    /// Unknown stored values read back as `Etc`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .unwrap_or(Category::Etc))
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A canonical catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub address: String,
    pub category: Category,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photo: Option<String>,
    pub rating_avg: f64,
    pub rating_count: i64,
    pub saved_count: i64,
    pub search_count: i64,
}

/// An enriched place ready to be written to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlace {
    /// Provider place id; a placeholder is generated when absent.
    pub external_id: Option<String>,
    pub name: String,
    pub address: String,
    pub category: Category,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photo: Option<String>,
    pub rating_avg: f64,
    pub rating_count: i64,
}

impl NewPlace {
    /// A bare record with no provider data beyond name and address.
    pub fn bare(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            external_id: None,
            name: name.into(),
            address: address.into(),
            category: Category::Etc,
            latitude: None,
            longitude: None,
            photo: None,
            rating_avg: 0.0,
            rating_count: 0,
        }
    }

    pub fn identity(&self) -> (&str, &str) {
        (&self.name, &self.address)
    }
}

/// A cached post, keyed by shortcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub shortcode: String,
    pub url: String,
    pub caption: Option<String>,
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPost {
    pub shortcode: String,
    pub url: String,
    pub caption: Option<String>,
    pub thumbnail: Option<String>,
}

/// Where an analysis' places came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    Cache,
    Caption,
    Image,
}

impl ExtractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionSource::Cache => "cache",
            ExtractionSource::Caption => "caption",
            ExtractionSource::Image => "image",
        }
    }
}
