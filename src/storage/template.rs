//! Single-slot storage for the certificate background and name placement.
//!
//! The background lives at `<upload folder>/template.pdf` and the placement
//! record at `<upload folder>/settings.json`. Both are overwritten wholesale.
//! Readers take a shared lock and writers an exclusive one, so a batch that
//! snapshots the configuration never observes a half-written upload.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{InputError, StoreError};

const TEMPLATE_FILE: &str = "template.pdf";
const SETTINGS_FILE: &str = "settings.json";
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Where the participant name goes on an uploaded template. Unset values fall
/// back to the renderer's overlay defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamePlacement {
    pub name_x: Option<f32>,
    pub name_y: Option<f32>,
    pub name_size: Option<f32>,
}

/// The configuration one render operation is joined with.
#[derive(Debug, Clone, Default)]
pub struct TemplateConfig {
    pub background: Option<Arc<Vec<u8>>>,
    pub placement: NamePlacement,
}

impl TemplateConfig {
    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }
}

#[derive(Debug)]
pub struct TemplateStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: RwLock::new(()),
        }
    }

    fn template_path(&self) -> PathBuf {
        self.dir.join(TEMPLATE_FILE)
    }

    fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    /// Read the current background and placement together.
    pub async fn snapshot(&self) -> Result<TemplateConfig, StoreError> {
        let _guard = self.lock.read().await;

        let background = match tokio::fs::read(self.template_path()).await {
            Ok(bytes) => Some(Arc::new(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let placement = read_placement(&self.settings_path()).await;

        Ok(TemplateConfig {
            background,
            placement,
        })
    }

    pub async fn has_template(&self) -> bool {
        let _guard = self.lock.read().await;
        tokio::fs::try_exists(self.template_path())
            .await
            .unwrap_or(false)
    }

    pub async fn placement(&self) -> NamePlacement {
        let _guard = self.lock.read().await;
        read_placement(&self.settings_path()).await
    }

    /// Replace the stored background. Only PDF content is accepted.
    pub async fn save_template(&self, bytes: &[u8]) -> Result<(), TemplateUploadError> {
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(InputError::NotAPdf.into());
        }

        let _guard = self.lock.write().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(StoreError::from)?;
        write_replacing(&self.template_path(), bytes)
            .await
            .map_err(StoreError::from)?;

        info!(size = bytes.len(), "certificate template replaced");
        Ok(())
    }

    pub async fn save_placement(&self, placement: NamePlacement) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&placement)
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;

        let _guard = self.lock.write().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        write_replacing(&self.settings_path(), &json).await?;

        info!(?placement, "template placement saved");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateUploadError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

async fn read_placement(path: &Path) -> NamePlacement {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return NamePlacement::default(),
        Err(e) => {
            warn!(error = %e, "could not read template settings, using defaults");
            return NamePlacement::default();
        }
    };

    serde_json::from_slice(&raw).unwrap_or_else(|e| {
        warn!(error = %e, "template settings are malformed, using defaults");
        NamePlacement::default()
    })
}

/// Write to a sibling temp file and rename over the target.
async fn write_replacing(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_store_has_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path());

        let config = store.snapshot().await.unwrap();
        assert!(!config.has_background());
        assert_eq!(config.placement, NamePlacement::default());
        assert!(!store.has_template().await);
    }

    #[tokio::test]
    async fn upload_overwrites_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path());

        store.save_template(b"%PDF-1.5 first").await.unwrap();
        store.save_template(b"%PDF-1.5 second").await.unwrap();

        let config = store.snapshot().await.unwrap();
        assert_eq!(config.background.unwrap().as_slice(), b"%PDF-1.5 second");
        assert!(store.has_template().await);
    }

    #[tokio::test]
    async fn rejects_non_pdf_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path());

        let err = store.save_template(b"PK\x03\x04 zip").await.unwrap_err();
        assert!(matches!(err, TemplateUploadError::Input(InputError::NotAPdf)));
        assert!(!store.has_template().await);
    }

    #[tokio::test]
    async fn placement_is_readable_without_template() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path());
        let placement = NamePlacement {
            name_x: Some(120.0),
            name_y: Some(300.5),
            name_size: Some(30.0),
        };

        store.save_placement(placement).await.unwrap();

        let config = store.snapshot().await.unwrap();
        assert!(!config.has_background());
        assert_eq!(config.placement, placement);
    }

    #[tokio::test]
    async fn malformed_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), b"{not json").unwrap();
        let store = TemplateStore::new(dir.path());

        assert_eq!(store.placement().await, NamePlacement::default());
    }
}
