use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use placegrab_common::{Category, NewPlace, Place, Post};

use crate::traits::{PersistBatch, PlaceCatalog};

const PLACE_COLUMNS: &str = "id, external_id, name, address, category, latitude, longitude, photo, \
     rating_avg, rating_count, saved_count, search_count";

#[derive(Debug, sqlx::FromRow)]
struct PlaceRow {
    id: i64,
    external_id: String,
    name: String,
    address: String,
    category: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    photo: Option<String>,
    rating_avg: f64,
    rating_count: i64,
    saved_count: i64,
    search_count: i64,
}

impl From<PlaceRow> for Place {
    fn from(row: PlaceRow) -> Self {
        Place {
            id: row.id,
            external_id: row.external_id,
            name: row.name,
            address: row.address,
            category: row.category.parse().unwrap_or(Category::Etc),
            latitude: row.latitude,
            longitude: row.longitude,
            photo: row.photo,
            rating_avg: row.rating_avg,
            rating_count: row.rating_count,
            saved_count: row.saved_count,
            search_count: row.search_count,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    id: i64,
    shortcode: String,
    url: String,
    caption: Option<String>,
    thumbnail: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            shortcode: row.shortcode,
            url: row.url,
            caption: row.caption,
            thumbnail: row.thumbnail,
            created_at: row.created_at,
        }
    }
}

/// Postgres-backed place catalog and post cache.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Placeholder identity for places the provider has no id for.
fn placeholder_external_id() -> String {
    format!("local:{}", Uuid::new_v4())
}

/// Insert-or-adopt under `UNIQUE(name, address)`. A row created by a
/// concurrent request is re-read and returned untouched.
async fn match_or_create(tx: &mut Transaction<'_, Postgres>, place: &NewPlace) -> Result<Place> {
    let external_id = place
        .external_id
        .clone()
        .unwrap_or_else(placeholder_external_id);

    let inserted = sqlx::query_as::<_, PlaceRow>(&format!(
        "INSERT INTO places
             (external_id, name, address, category, latitude, longitude, photo, rating_avg, rating_count)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT DO NOTHING
         RETURNING {PLACE_COLUMNS}"
    ))
    .bind(&external_id)
    .bind(&place.name)
    .bind(&place.address)
    .bind(place.category.as_str())
    .bind(place.latitude)
    .bind(place.longitude)
    .bind(&place.photo)
    .bind(place.rating_avg)
    .bind(place.rating_count)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(row) = inserted {
        info!(place_id = row.id, name = %row.name, "place created");
        return Ok(row.into());
    }

    // Conflict on (name, address) or on external_id; adopt the existing row.
    let existing = sqlx::query_as::<_, PlaceRow>(&format!(
        "SELECT {PLACE_COLUMNS} FROM places
         WHERE (name = $1 AND address = $2) OR external_id = $3
         ORDER BY (name = $1 AND address = $2) DESC
         LIMIT 1"
    ))
    .bind(&place.name)
    .bind(&place.address)
    .bind(&external_id)
    .fetch_one(&mut **tx)
    .await?;

    debug!(place_id = existing.id, name = %existing.name, "adopted existing place");
    Ok(existing.into())
}

#[async_trait]
impl PlaceCatalog for PgCatalog {
    async fn find_post(&self, shortcode: &str) -> Result<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(
            "SELECT id, shortcode, url, caption, thumbnail, created_at
             FROM posts WHERE shortcode = $1",
        )
        .bind(shortcode)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Post::from))
    }

    async fn places_for_post(&self, post_id: i64) -> Result<Vec<Place>> {
        let rows = sqlx::query_as::<_, PlaceRow>(
            "SELECT p.id, p.external_id, p.name, p.address, p.category, p.latitude, p.longitude,
                    p.photo, p.rating_avg, p.rating_count, p.saved_count, p.search_count
             FROM post_places pp
             JOIN places p ON p.id = pp.place_id
             WHERE pp.post_id = $1
             ORDER BY pp.created_at, p.id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Place::from).collect())
    }

    async fn find_places_by_name(&self, name: &str) -> Result<Vec<Place>> {
        let rows = sqlx::query_as::<_, PlaceRow>(&format!(
            "SELECT {PLACE_COLUMNS} FROM places WHERE name = $1 ORDER BY id"
        ))
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Place::from).collect())
    }

    async fn persist(&self, batch: PersistBatch) -> Result<Vec<Place>> {
        let mut tx = self.pool.begin().await?;

        let post_id: i64 = sqlx::query_scalar(
            "INSERT INTO posts (shortcode, url, caption, thumbnail)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (shortcode) DO UPDATE
                 SET caption = COALESCE(posts.caption, EXCLUDED.caption),
                     thumbnail = COALESCE(posts.thumbnail, EXCLUDED.thumbnail)
             RETURNING id",
        )
        .bind(&batch.post.shortcode)
        .bind(&batch.post.url)
        .bind(&batch.post.caption)
        .bind(&batch.post.thumbnail)
        .fetch_one(&mut *tx)
        .await?;

        let mut linked: Vec<Place> = Vec::new();

        for place_id in &batch.known {
            let row = sqlx::query_as::<_, PlaceRow>(&format!(
                "UPDATE places SET search_count = search_count + 1, updated_at = now()
                 WHERE id = $1
                 RETURNING {PLACE_COLUMNS}"
            ))
            .bind(place_id)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(row) = row {
                linked.push(row.into());
            }
        }

        for place in &batch.new_places {
            let stored = match_or_create(&mut tx, place).await?;
            if !linked.iter().any(|p| p.id == stored.id) {
                linked.push(stored);
            }
        }

        for place in &linked {
            sqlx::query(
                "INSERT INTO post_places (post_id, place_id) VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(post_id)
            .bind(place.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            shortcode = %batch.post.shortcode,
            post_id,
            places = linked.len(),
            "analysis persisted"
        );
        Ok(linked)
    }
}
