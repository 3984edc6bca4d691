use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::traits::PhotoStore;

/// Writes place photos to a local directory served under `web_prefix`.
pub struct LocalPhotoStore {
    dir: PathBuf,
    web_prefix: String,
}

impl LocalPhotoStore {
    pub fn new(dir: impl Into<PathBuf>, web_prefix: &str) -> Self {
        Self {
            dir: dir.into(),
            web_prefix: web_prefix.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PhotoStore for LocalPhotoStore {
    async fn save(&self, bytes: &[u8]) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("cannot create {}", self.dir.display()))?;

        let filename = format!("google_{}.jpg", Uuid::new_v4());
        let path = self.dir.join(&filename);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;

        debug!(path = %path.display(), bytes = bytes.len(), "photo stored");
        Ok(format!("{}/{}", self.web_prefix, filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_file_and_returns_web_path() {
        let dir = std::env::temp_dir().join(format!("placegrab-photos-{}", Uuid::new_v4()));
        let store = LocalPhotoStore::new(&dir, "/static/uploads/");

        let web_path = store.save(b"\xff\xd8jpeg").await.unwrap();
        assert!(web_path.starts_with("/static/uploads/google_"));
        assert!(web_path.ends_with(".jpg"));

        let filename = web_path.rsplit('/').next().unwrap();
        let written = std::fs::read(dir.join(filename)).unwrap();
        assert_eq!(written, b"\xff\xd8jpeg");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
