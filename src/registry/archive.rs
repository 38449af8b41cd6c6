//! Portable dataset archives.
//!
//! An archive is a gzip-compressed tarball holding `metadata.json` at its root
//! and, optionally, one file per version under `versions/`:
//!
//! ```text
//! sales.tar.gz
//! ├── metadata.json
//! └── versions/
//!     ├── 1.0.jsonl
//!     └── 2.0.jsonl
//! ```
//!
//! `metadata.json` carries the keys `dataset`, `metadata` and, when versions
//! are included, `versions`.

use super::model::{DatasetStatus, FieldValue, MetricsDocument, SchemaDocument};
use crate::error::{RegistryError, Result, ResultExt as _};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

pub const MANIFEST_NAME: &str = "metadata.json";
pub const VERSIONS_DIR: &str = "versions";
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestDataset {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_status")]
    pub status: DatasetStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_status() -> DatasetStatus {
    DatasetStatus::Draft
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default)]
    pub schema: SchemaDocument,
    /// Kept loose so archives from other producers still import
    #[serde(default)]
    pub statistics: Option<Value>,
    /// Label of the version the statistics were computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics_version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestVersion {
    pub version: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub file_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_metrics: Option<MetricsDocument>,
    /// File name under `versions/`; defaults to the label plus any extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub dataset: ManifestDataset,
    pub metadata: ManifestMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<Vec<ManifestVersion>>,
}

/// A version file to pack, with its name inside `versions/`.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub source: PathBuf,
    pub file_name: String,
}

/// `path` with a `.tar.gz` suffix, appended when missing.
pub fn normalize_archive_path(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if text.ends_with(ARCHIVE_SUFFIX) {
        path.to_path_buf()
    } else {
        PathBuf::from(format!("{text}{ARCHIVE_SUFFIX}"))
    }
}

/// Write `manifest` and `entries` as a gzip tarball at `path` (suffix enforced).
pub fn write_archive(path: &Path, manifest: &Manifest, entries: &[ArchiveEntry]) -> Result<PathBuf> {
    let path = normalize_archive_path(path);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).context("Failed to create export directory")?;
    }

    let file = File::create(&path)
        .with_context(|| format!("Failed to create archive {}", path.display()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    let json = serde_json::to_vec_pretty(manifest)?;
    let mut header = tar::Header::new_gnu();
    header.set_size(json.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(u64::try_from(Utc::now().timestamp()).unwrap_or_default());
    builder
        .append_data(&mut header, MANIFEST_NAME, json.as_slice())
        .context("Failed to write manifest to archive")?;

    for entry in entries {
        builder
            .append_path_with_name(&entry.source, Path::new(VERSIONS_DIR).join(&entry.file_name))
            .with_context(|| format!("Failed to add {} to archive", entry.source.display()))?;
    }

    let encoder = builder.into_inner().context("Failed to finish archive")?;
    encoder.finish().context("Failed to finish compression")?;

    tracing::info!(
        "Wrote archive {} with {} version file(s)",
        path.display(),
        entries.len()
    );
    Ok(path)
}

/// Unpack the archive at `path` into `dest` and parse its manifest.
///
/// # Errors
///
/// `Validation` when the archive cannot be opened or unpacked, or the manifest
/// is missing or malformed.
pub fn extract_archive(path: &Path, dest: &Path) -> Result<Manifest> {
    let file = File::open(path).map_err(|e| {
        RegistryError::Validation(format!("cannot open archive {}: {e}", path.display()))
    })?;
    tar::Archive::new(GzDecoder::new(file))
        .unpack(dest)
        .map_err(|e| {
            RegistryError::Validation(format!("cannot unpack archive {}: {e}", path.display()))
        })?;

    let manifest_path = dest.join(MANIFEST_NAME);
    let json = fs::read_to_string(&manifest_path)
        .map_err(|e| RegistryError::Validation(format!("archive has no readable {MANIFEST_NAME}: {e}")))?;
    serde_json::from_str(&json)
        .map_err(|e| RegistryError::Validation(format!("invalid {MANIFEST_NAME}: {e}")))
}

/// Find the file for `version` inside an extracted archive.
///
/// Only regular files directly under `versions/` are considered; symlinks are
/// ignored.
///
/// # Errors
///
/// `Validation` when the manifest's file name or version label is not a
/// single plain path component.
pub fn locate_version_file(extracted: &Path, version: &ManifestVersion) -> Result<Option<PathBuf>> {
    let dir = extracted.join(VERSIONS_DIR);
    if let Some(name) = &version.file_name {
        require_plain_name(name, "file name")?;
        return Ok(regular_file(dir.join(name)));
    }

    require_plain_name(&version.version, "version label")?;
    if let Some(exact) = regular_file(dir.join(&version.version)) {
        return Ok(Some(exact));
    }
    // Label plus an extension, e.g. "1.0" -> "1.0.jsonl"
    let prefix = format!("{}.", version.version);
    let Ok(entries) = fs::read_dir(&dir) else {
        return Ok(None);
    };
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with(&prefix))
        })
        .filter_map(regular_file)
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}

fn require_plain_name(name: &str, what: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(RegistryError::Validation(format!(
            "archive {what} '{name}' must be a plain name inside {VERSIONS_DIR}/"
        ))),
    }
}

fn regular_file(path: PathBuf) -> Option<PathBuf> {
    fs::symlink_metadata(&path)
        .is_ok_and(|m| m.file_type().is_file())
        .then_some(path)
}
