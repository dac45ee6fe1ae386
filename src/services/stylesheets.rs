use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::info;

use crate::config::Config;

/// Stores page stylesheets as byte blobs on disk. The location is fixed by
/// the page's own id: `<stylesheets dir>/<page id>.css`.
pub struct StylesheetService {
    config: Config,
}

impl StylesheetService {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn path_for(&self, page_id: &str) -> PathBuf {
        PathBuf::from(&self.config.storage.stylesheets_path).join(format!("{page_id}.css"))
    }

    /// Write the blob and return its path for the page record.
    pub async fn save(&self, page_id: &str, bytes: &[u8]) -> Result<String> {
        let dir = PathBuf::from(&self.config.storage.stylesheets_path);
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
        }

        let file_path = self.path_for(page_id);

        fs::write(&file_path, bytes)
            .await
            .with_context(|| format!("Failed to write stylesheet to {}", file_path.display()))?;

        info!(page_id = %page_id, path = %file_path.display(), "Stylesheet stored");

        Ok(file_path.to_string_lossy().to_string())
    }

    /// Read the blob back, or `None` if the page has no stored stylesheet.
    pub async fn load(&self, page_id: &str) -> Result<Option<Vec<u8>>> {
        let file_path = self.path_for(page_id);

        match fs::read(&file_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to read stylesheet from {}", file_path.display())
            }),
        }
    }

    /// Remove the blob if present; missing files are not an error so page
    /// deletion stays idempotent.
    pub async fn remove(&self, page_id: &str) -> Result<()> {
        let file_path = self.path_for(page_id);

        match fs::remove_file(&file_path).await {
            Ok(()) => {
                info!(page_id = %page_id, "Stylesheet removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove stylesheet at {}", file_path.display())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_with_dir(dir: &std::path::Path) -> StylesheetService {
        let mut config = Config::default();
        config.storage.stylesheets_path = dir.to_string_lossy().to_string();
        StylesheetService::new(config)
    }

    #[test]
    fn test_path_is_derived_from_page_id() {
        let service = service_with_dir(std::path::Path::new("/tmp/sheets"));
        let path = service.path_for("0b5a2c1d");
        assert_eq!(path, PathBuf::from("/tmp/sheets/0b5a2c1d.css"));
    }

    #[tokio::test]
    async fn test_save_load_remove_round_trip() {
        let dir = std::env::temp_dir().join(format!("marginalia-css-{}", std::process::id()));
        let service = service_with_dir(&dir);

        let body = b"body { color: rebeccapurple; }";
        let stored = service.save("test-page", body).await.unwrap();
        assert!(stored.ends_with("test-page.css"));

        let loaded = service.load("test-page").await.unwrap();
        assert_eq!(loaded.as_deref(), Some(body.as_slice()));

        service.remove("test-page").await.unwrap();
        assert!(service.load("test-page").await.unwrap().is_none());
        // removing again is fine
        service.remove("test-page").await.unwrap();

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
