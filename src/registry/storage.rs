//! Storage backend for dataset version files

use crate::error::{RegistryError, Result, ResultExt as _};
use crate::integrity::copy_and_hash;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Longest accepted version label.
pub const MAX_LABEL_LEN: usize = 50;

/// A version file persisted by [`VersionStore::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub hash: String,
    pub size: u64,
    /// Extension of the source file including the dot, or empty
    pub extension: String,
}

/// Storage backend for dataset versions
#[derive(Debug)]
pub struct VersionStore {
    base_path: PathBuf,
}

impl VersionStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_path).context("Failed to create version store directory")?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the directory path for a dataset
    fn dataset_dir(&self, dataset_id: &Uuid) -> PathBuf {
        self.base_path.join(dataset_id.to_string())
    }

    /// Get the path for a version's data file
    pub fn version_path(&self, dataset_id: &Uuid, label: &str, extension: &str) -> PathBuf {
        self.dataset_dir(dataset_id).join(format!("{label}{extension}"))
    }

    /// Copy `source` into the store as version `label` of `dataset_id`.
    ///
    /// # Errors
    ///
    /// `Validation` if the source is missing or the label is unusable,
    /// `Conflict` if a file for this label is already stored.
    pub fn store(&self, dataset_id: &Uuid, label: &str, source: &Path) -> Result<StoredFile> {
        validate_label(label)?;
        if !source.is_file() {
            return Err(RegistryError::Validation(format!(
                "source file {} does not exist",
                source.display()
            )));
        }

        let extension = source
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let dataset_dir = self.dataset_dir(dataset_id);
        fs::create_dir_all(&dataset_dir).context("Failed to create dataset directory")?;

        let dest = self.version_path(dataset_id, label, &extension);
        if dest.exists() {
            return Err(RegistryError::Conflict(format!(
                "version file {} already exists",
                dest.display()
            )));
        }

        let copied = copy_and_hash(source, &dest)?;
        tracing::info!(
            "Stored version '{label}' of dataset {dataset_id} ({} bytes, sha256 {})",
            copied.bytes,
            copied.hash
        );

        Ok(StoredFile {
            path: dest,
            hash: copied.hash,
            size: copied.bytes,
            extension,
        })
    }

    /// Read a stored version file as UTF-8 text.
    pub fn read_text(path: &Path) -> Result<String> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read version file {}", path.display()))?;
        String::from_utf8(bytes).map_err(|e| {
            RegistryError::DataFormat(format!("{} is not UTF-8 text: {e}", path.display()))
        })
    }

    /// Delete every stored file of a dataset
    pub fn delete_dataset_files(&self, dataset_id: &Uuid) -> Result<()> {
        let dataset_dir = self.dataset_dir(dataset_id);
        if dataset_dir.exists() {
            fs::remove_dir_all(&dataset_dir).context("Failed to delete dataset directory")?;
        }
        Ok(())
    }
}

/// Labels become file names, so they must be a single plain path component.
pub fn validate_label(label: &str) -> Result<()> {
    let problem = if label.trim().is_empty() {
        Some("must not be empty")
    } else if label.len() > MAX_LABEL_LEN {
        Some("is longer than 50 characters")
    } else if label.contains(['/', '\\', '\0']) {
        Some("must not contain path separators")
    } else if label == "." || label == ".." {
        Some("must not be a relative path")
    } else {
        None
    };

    match problem {
        Some(why) => Err(RegistryError::Validation(format!(
            "version label '{label}' {why}"
        ))),
        None => Ok(()),
    }
}
