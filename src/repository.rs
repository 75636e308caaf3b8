use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use signage_model::Image;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The collection file could not be read or replaced.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file holds something other than a JSON array of records.
    #[error("{} is not a JSON array of image records: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// One stored record does not have the image record shape.
    #[error("record #{index} in {} is unreadable: {source}", path.display())]
    Record {
        path: PathBuf,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Serialising the collection for writing failed.
    #[error("failed to encode image collection: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persisted image collection, read and written as a whole.
pub trait ImageRepository: Send + Sync {
    /// Read for display. Absent or unreadable data yields an empty collection
    /// and unreadable records are skipped; never an error.
    fn get(&self) -> Vec<Image>;

    /// Read for editing. Fails instead of returning less than is stored.
    fn try_get(&self) -> Result<Vec<Image>, RepositoryError>;

    /// Replaces the entire collection.
    fn set(&self, images: &[Image]) -> Result<(), RepositoryError>;
}

impl<R: ImageRepository + ?Sized> ImageRepository for Arc<R> {
    fn get(&self) -> Vec<Image> {
        (**self).get()
    }

    fn try_get(&self) -> Result<Vec<Image>, RepositoryError> {
        (**self).try_get()
    }

    fn set(&self, images: &[Image]) -> Result<(), RepositoryError> {
        (**self).set(images)
    }
}

/// The collection stored as a JSON array in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "images.json".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    /// Raw records; a missing or blank file is an empty collection.
    fn records(&self) -> Result<Vec<serde_json::Value>, RepositoryError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "repository file missing; treating as empty");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(RepositoryError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(|source| RepositoryError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    fn decode(&self, index: usize, record: serde_json::Value) -> Result<Image, RepositoryError> {
        serde_json::from_value(record).map_err(|source| RepositoryError::Record {
            path: self.path.clone(),
            index,
            source,
        })
    }
}

impl ImageRepository for JsonFileRepository {
    fn get(&self) -> Vec<Image> {
        let records = match self.records() {
            Ok(records) => records,
            Err(err) => {
                warn!("{err}; treating collection as empty");
                return Vec::new();
            }
        };
        records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| match self.decode(index, record) {
                Ok(image) => Some(image),
                Err(err) => {
                    warn!("{err}; skipping it");
                    None
                }
            })
            .collect()
    }

    fn try_get(&self) -> Result<Vec<Image>, RepositoryError> {
        self.records()?
            .into_iter()
            .enumerate()
            .map(|(index, record)| self.decode(index, record))
            .collect()
    }

    fn set(&self, images: &[Image]) -> Result<(), RepositoryError> {
        let body = serde_json::to_string_pretty(images)?;
        let staging = self.staging_path();
        let io_err = |source| RepositoryError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&staging, body).map_err(io_err)?;
        fs::rename(&staging, &self.path).map_err(io_err)?;
        debug!(path = %self.path.display(), images = images.len(), "repository written");
        Ok(())
    }
}

/// Shared in-process collection.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    images: Arc<Mutex<Vec<Image>>>,
}

impl MemoryRepository {
    pub fn new(images: Vec<Image>) -> Self {
        Self {
            images: Arc::new(Mutex::new(images)),
        }
    }
}

impl ImageRepository for MemoryRepository {
    fn get(&self) -> Vec<Image> {
        self.images
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn try_get(&self) -> Result<Vec<Image>, RepositoryError> {
        Ok(self.get())
    }

    fn set(&self, images: &[Image]) -> Result<(), RepositoryError> {
        *self
            .images
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = images.to_vec();
        Ok(())
    }
}
