//! Dataset catalog: datasets, versions, statistics, comparison and access.
//!
//! [`DatasetRegistry`] is the single entry point. Every operation takes the
//! acting user's id and checks their access level on the dataset before it
//! reads or changes anything:
//!
//! | level | allows |
//! |-------|--------|
//! | read  | statistics, comparison, history, export, search visibility |
//! | write | new versions, metadata updates, validation records |
//! | admin | grants, access listing, deletion |
//!
//! The creator of a dataset is always an admin of it.
//!
//! ## Example
//!
//! ```no_run
//! use dataset_registry::config::RegistryConfig;
//! use dataset_registry::registry::{DatasetRegistry, DiffOptions, NewDataset};
//! use std::path::Path;
//!
//! # fn example() -> dataset_registry::error::Result<()> {
//! let registry = DatasetRegistry::open(RegistryConfig::rooted_at(Path::new("data")))?;
//! let alice = registry.register_user("alice", None)?;
//!
//! let dataset = registry.create_dataset(NewDataset::new("sales").tag("finance"), &alice.id)?;
//! registry.add_version(&dataset.id, "1.0", Path::new("sales-jan.jsonl"), &alice.id, None)?;
//! registry.add_version(&dataset.id, "2.0", Path::new("sales-feb.jsonl"), &alice.id, None)?;
//!
//! let report = registry.get_statistics(&dataset.id, None, false, &alice.id)?;
//! println!("{} rows in {}", report.statistics.row_count, report.version);
//!
//! let diff = registry.compare_versions(&dataset.id, "1.0", "2.0", DiffOptions::default(), &alice.id)?;
//! if let Some(text) = diff.file_diff {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Persistence
//!
//! All tables live in one [`db::Database`] guarded by an `RwLock`. A mutating
//! operation works on a staged copy and only replaces the live tables once the
//! state file was written, so a failed operation leaves no partial changes.
//! Stored version files are not rolled back.

pub mod access;
pub mod archive;
pub mod db;
pub mod diff;
pub mod model;
pub mod search;
pub mod storage;
pub mod summary;
pub mod validation;

pub use access::AccessEntry;
pub use diff::{DiffOptions, DiffResult, ValueChange};
pub use model::{
    AccessLevel, Dataset, DatasetAccess, DatasetStatus, DatasetVersion, FieldValue,
    MetadataSnapshot, MetricsDocument, QualityRecord, QualityStatus, SchemaDocument, User,
    UserGroup,
};
pub use search::{FieldFilter, FilterOperator, SearchPage, SearchQuery, SortField, SortOrder};
pub use storage::{StoredFile, VersionStore};
pub use summary::{DEFAULT_SUMMARY_LIMIT, FieldUsage, TagUsage};

use crate::config::RegistryConfig;
use crate::error::{EntityKind, RegistryError, Result, ResultExt as _};
use crate::integrity::compute_file_hash;
use crate::profiling::{DatasetStatistics, profile_file};
use archive::{ArchiveEntry, Manifest, ManifestDataset, ManifestMetadata, ManifestVersion};
use chrono::{DateTime, Utc};
use db::Database;
use model::{CachedStatistics, Metadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Parameters of [`DatasetRegistry::create_dataset`].
#[derive(Debug, Clone, Default)]
pub struct NewDataset {
    pub name: String,
    pub description: String,
    pub schema: SchemaDocument,
    pub tags: Vec<String>,
    /// Grants created together with the dataset
    pub grants: Vec<(Uuid, AccessLevel)>,
}

impl NewDataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = SchemaDocument::new(schema);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn grant(mut self, group_id: Uuid, level: AccessLevel) -> Self {
        self.grants.push((group_id, level));
        self
    }
}

/// Fields of [`DatasetRegistry::update_dataset`]; `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct DatasetUpdate {
    pub description: Option<String>,
    pub status: Option<DatasetStatus>,
    pub tags: Option<Vec<String>>,
}

/// Filters of [`DatasetRegistry::list_datasets`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<DatasetStatus>,
    /// Every tag must be present
    pub tags: Vec<String>,
    /// Minimum access level; any level when `None`
    pub level: Option<AccessLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub include_versions: bool,
    pub include_metrics: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_versions: true,
            include_metrics: true,
        }
    }
}

/// Overrides applied when importing an archive.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedDataset {
    pub dataset: Dataset,
    pub versions: Vec<DatasetVersion>,
}

/// Statistics and quality metrics of one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub dataset_id: Uuid,
    pub version_id: Uuid,
    pub version: String,
    pub statistics: DatasetStatistics,
    pub quality_metrics: MetricsDocument,
    pub computed_at: DateTime<Utc>,
    /// False when served from cache
    pub recalculated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionHistoryEntry {
    pub id: Uuid,
    pub version: String,
    pub file_hash: String,
    pub file_size: u64,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_metrics: Option<MetricsDocument>,
}

/// Central registry for all datasets and their versions
#[derive(Clone)]
pub struct DatasetRegistry {
    db: Arc<RwLock<Database>>,
    store: Arc<VersionStore>,
    config: Arc<RegistryConfig>,
}

impl DatasetRegistry {
    /// Open the registry described by `config`, loading its state file if present.
    ///
    /// # Errors
    ///
    /// `Io` if the storage root cannot be created, `Validation` if the state
    /// file is malformed.
    pub fn open(config: RegistryConfig) -> Result<Self> {
        let store = Arc::new(VersionStore::new(config.storage_root.clone())?);
        let db = match &config.state_file {
            Some(path) => Database::load(path)?,
            None => Database::default(),
        };
        tracing::info!(
            "Opened registry: {} datasets, store at {}",
            db.datasets.len(),
            store.base_path().display()
        );
        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            store,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Database>> {
        self.db
            .read()
            .map_err(|e| RegistryError::Other(format!("Lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Database>> {
        self.db
            .write()
            .map_err(|e| RegistryError::Other(format!("Lock poisoned: {e}")))
    }

    /// Run `op` against a staged copy of the tables and publish it once committed.
    fn transact<T>(&self, op: impl FnOnce(&mut Database) -> Result<T>) -> Result<T> {
        let mut db = self.write()?;
        let mut staged = db.clone();
        let out = op(&mut staged)?;
        if let Some(path) = &self.config.state_file {
            staged.commit(path)?;
        }
        *db = staged;
        Ok(out)
    }

    // ---- users and groups ----

    /// Add a user to the directory.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty username, `Conflict` if it is taken.
    pub fn register_user(&self, username: &str, email: Option<String>) -> Result<User> {
        let user = self.transact(|db| access::register_user(db, username, email))?;
        tracing::info!("Registered user '{}' ({})", user.username, user.id);
        Ok(user)
    }

    /// Look a user up by username.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown username.
    pub fn find_user(&self, username: &str) -> Result<User> {
        self.read()?.user_by_name(username).cloned()
    }

    /// Create a group with its initial members.
    ///
    /// # Errors
    ///
    /// `Conflict` if the name is taken, `NotFound` for an unknown creator or member.
    pub fn create_group(
        &self,
        name: &str,
        description: &str,
        created_by: &Uuid,
        members: &[Uuid],
    ) -> Result<UserGroup> {
        let group =
            self.transact(|db| access::create_group(db, name, description, created_by, members))?;
        tracing::info!("Created group '{}' with {} member(s)", group.name, members.len());
        Ok(group)
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown group name.
    pub fn find_group(&self, name: &str) -> Result<UserGroup> {
        self.read()?.group_by_name(name).cloned()
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown group.
    pub fn group_members(&self, group_id: &Uuid) -> Result<Vec<User>> {
        let db = self.read()?;
        db.group(group_id)?;
        db.members_of(group_id)
            .iter()
            .map(|id| db.user(id).cloned())
            .collect()
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown group or user.
    pub fn add_users_to_group(&self, group_id: &Uuid, users: &[Uuid]) -> Result<UserGroup> {
        self.transact(|db| access::add_users_to_group(db, group_id, users))
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown group.
    pub fn remove_users_from_group(&self, group_id: &Uuid, users: &[Uuid]) -> Result<UserGroup> {
        self.transact(|db| access::remove_users_from_group(db, group_id, users))
    }

    // ---- access control ----

    /// Whether `user_id` holds at least `required` on the dataset.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user or dataset.
    pub fn check_access(
        &self,
        dataset_id: &Uuid,
        user_id: &Uuid,
        required: AccessLevel,
    ) -> Result<bool> {
        let db = self.read()?;
        access::check_access(&db, dataset_id, user_id, required)
    }

    /// Grant `level` to a group. Requires admin access.
    ///
    /// # Errors
    ///
    /// `AccessDenied` without admin access, `NotFound` for an unknown dataset or group.
    pub fn grant_access(
        &self,
        dataset_id: &Uuid,
        group_id: &Uuid,
        level: AccessLevel,
        granted_by: &Uuid,
    ) -> Result<DatasetAccess> {
        let grant = self.transact(|db| {
            access::require_access(db, dataset_id, granted_by, AccessLevel::Admin)?;
            access::grant_access(db, dataset_id, group_id, level, granted_by)
        })?;
        tracing::info!("Granted {level} on dataset {dataset_id} to group {group_id}");
        Ok(grant)
    }

    /// Remove a group's grant. Requires admin access.
    ///
    /// # Errors
    ///
    /// `AccessDenied` without admin access, `NotFound` for an unknown dataset.
    pub fn revoke_access(&self, dataset_id: &Uuid, group_id: &Uuid, revoked_by: &Uuid) -> Result<bool> {
        let removed = self.transact(|db| {
            access::require_access(db, dataset_id, revoked_by, AccessLevel::Admin)?;
            access::revoke_access(db, dataset_id, group_id)
        })?;
        if removed {
            tracing::info!("Revoked access of group {group_id} on dataset {dataset_id}");
        }
        Ok(removed)
    }

    /// Grants on a dataset. Requires admin access.
    ///
    /// # Errors
    ///
    /// `AccessDenied` without admin access, `NotFound` for an unknown dataset.
    pub fn access_list(&self, dataset_id: &Uuid, user_id: &Uuid) -> Result<Vec<AccessEntry>> {
        let db = self.read()?;
        access::require_access(&db, dataset_id, user_id, AccessLevel::Admin)?;
        access::access_list(&db, dataset_id)
    }

    /// Datasets the user created or reaches through a grant of at least `level`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user.
    pub fn list_accessible_datasets(
        &self,
        user_id: &Uuid,
        level: Option<AccessLevel>,
    ) -> Result<Vec<Dataset>> {
        let db = self.read()?;
        Ok(access::list_accessible(&db, user_id, level)?
            .into_iter()
            .cloned()
            .collect())
    }

    // ---- datasets ----

    /// Create a dataset in `draft` together with its metadata and initial grants.
    ///
    /// # Errors
    ///
    /// `Conflict` if the name is taken, `NotFound` for an unknown user or group.
    pub fn create_dataset(&self, new: NewDataset, created_by: &Uuid) -> Result<Dataset> {
        if new.name.trim().is_empty() {
            return Err(RegistryError::Validation("dataset name must not be empty".to_owned()));
        }
        let dataset = self.transact(|db| {
            db.user(created_by)?;
            if db.dataset_by_name(&new.name).is_some() {
                return Err(RegistryError::Conflict(format!(
                    "dataset name '{}' already in use",
                    new.name
                )));
            }
            let dataset = Dataset::new(
                new.name,
                new.description,
                *created_by,
                Metadata::new(new.schema, new.tags),
            );
            db.datasets.push(dataset.clone());
            for (group_id, level) in &new.grants {
                access::grant_access(db, &dataset.id, group_id, *level, created_by)?;
            }
            Ok(dataset)
        })?;
        tracing::info!("Created dataset '{}' ({})", dataset.name, dataset.id);
        Ok(dataset)
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown dataset or user, `AccessDenied` without read access.
    pub fn get_dataset(&self, dataset_id: &Uuid, user_id: &Uuid) -> Result<Dataset> {
        let db = self.read()?;
        access::require_access(&db, dataset_id, user_id, AccessLevel::Read)?;
        db.dataset(dataset_id).cloned()
    }

    /// Look a dataset up by name. Requires read access.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown name or user, `AccessDenied` without read access.
    pub fn find_dataset(&self, name: &str, user_id: &Uuid) -> Result<Dataset> {
        let db = self.read()?;
        let dataset = db
            .dataset_by_name(name)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Dataset, name))?;
        access::require_access(&db, &dataset.id, user_id, AccessLevel::Read)?;
        Ok(dataset.clone())
    }

    /// Store `source` as a new version. Requires write access.
    ///
    /// Statistics are not computed here; see [`Self::get_statistics`].
    ///
    /// # Errors
    ///
    /// `AccessDenied` without write access, `Conflict` for a label already in use,
    /// `Validation` for a bad label or a missing source file.
    pub fn add_version(
        &self,
        dataset_id: &Uuid,
        label: &str,
        source: &Path,
        user_id: &Uuid,
        quality_metrics: Option<MetricsDocument>,
    ) -> Result<DatasetVersion> {
        let version = self.transact(|db| {
            access::require_access(db, dataset_id, user_id, AccessLevel::Write)?;
            let dataset = db.dataset_mut(dataset_id)?;
            if dataset.version(label).is_some() {
                return Err(RegistryError::Conflict(format!(
                    "version '{label}' already exists for dataset '{}'",
                    dataset.name
                )));
            }

            let stored = self.store.store(dataset_id, label, source)?;
            let version = DatasetVersion {
                id: Uuid::new_v4(),
                dataset_id: *dataset_id,
                version: label.to_owned(),
                storage_path: stored.path,
                extension: stored.extension,
                file_hash: stored.hash,
                file_size: stored.size,
                quality_metrics,
                metadata_snapshot: dataset.metadata.snapshot(),
                created_by: *user_id,
                created_at: Utc::now(),
            };
            dataset.versions.push(version.clone());
            dataset.touch(*user_id);
            Ok(version)
        })?;
        tracing::info!("Added version '{label}' to dataset {dataset_id}");
        Ok(version)
    }

    /// Statistics and quality metrics of `version` (latest when `None`).
    ///
    /// Served from cache unless `recalculate` is set or nothing is cached for
    /// that version. A recomputation replaces the dataset's cached statistics
    /// and merges completeness and uniqueness into the version's metrics.
    ///
    /// # Errors
    ///
    /// `NotFound` if the version does not exist, `AccessDenied` without read
    /// access, `DataFormat` if the stored file is not NDJSON.
    pub fn get_statistics(
        &self,
        dataset_id: &Uuid,
        version: Option<&str>,
        recalculate: bool,
        user_id: &Uuid,
    ) -> Result<StatisticsReport> {
        let (target, cached, declared) = {
            let db = self.read()?;
            access::require_access(&db, dataset_id, user_id, AccessLevel::Read)?;
            let dataset = db.dataset(dataset_id)?;
            let target = resolve_version(dataset, version)?.clone();
            let cached = dataset
                .metadata
                .statistics
                .as_ref()
                .filter(|c| c.version_id == target.id)
                .cloned();
            (target, cached, dataset.metadata.schema.declared_columns())
        };

        if !recalculate
            && let Some(cached) = cached
            && let Some(metrics) = target.quality_metrics.as_ref().filter(|m| m.scores().is_some())
        {
            tracing::debug!("Serving cached statistics for version '{}'", target.version);
            return Ok(StatisticsReport {
                dataset_id: *dataset_id,
                version_id: target.id,
                version: target.version.clone(),
                statistics: cached.statistics,
                quality_metrics: metrics.clone(),
                computed_at: cached.computed_at,
                recalculated: false,
            });
        }

        let profile = profile_file(&target.storage_path, &self.config.profiling)
            .with_context(|| format!("Failed to profile version '{}'", target.version))?;
        if !declared.is_empty() {
            let undeclared: Vec<&String> = profile
                .statistics
                .data_types
                .keys()
                .filter(|c| !declared.contains(c))
                .collect();
            if !undeclared.is_empty() {
                tracing::warn!(
                    "Version '{}' has columns missing from the schema: {undeclared:?}",
                    target.version
                );
            }
        }

        let computed_at = Utc::now();
        let quality_metrics = self.transact(|db| {
            let dataset = db.dataset_mut(dataset_id)?;
            dataset.metadata.statistics = Some(CachedStatistics {
                version_id: target.id,
                computed_at,
                statistics: profile.statistics.clone(),
            });
            dataset.metadata.updated_at = computed_at;

            let version = dataset
                .version_mut(&target.version)
                .ok_or_else(|| RegistryError::not_found(EntityKind::Version, &target.version))?;
            let metrics = version.quality_metrics.get_or_insert_with(MetricsDocument::new);
            metrics.merge_scores(&profile.quality_metrics)?;
            Ok(metrics.clone())
        })?;

        tracing::info!(
            "Computed statistics for version '{}' of dataset {dataset_id}: {} rows",
            target.version,
            profile.statistics.row_count
        );
        Ok(StatisticsReport {
            dataset_id: *dataset_id,
            version_id: target.id,
            version: target.version,
            statistics: profile.statistics,
            quality_metrics,
            computed_at,
            recalculated: true,
        })
    }

    /// Compare two versions of a dataset. Requires read access.
    ///
    /// # Errors
    ///
    /// `NotFound` if either label does not resolve, `AccessDenied` without read access.
    /// An unreadable file does not fail the comparison.
    pub fn compare_versions(
        &self,
        dataset_id: &Uuid,
        version1: &str,
        version2: &str,
        options: DiffOptions,
        user_id: &Uuid,
    ) -> Result<DiffResult> {
        let (dataset, v1, v2) = {
            let db = self.read()?;
            access::require_access(&db, dataset_id, user_id, AccessLevel::Read)?;
            let dataset = db.dataset(dataset_id)?;
            let v1 = resolve_version(dataset, Some(version1))?.clone();
            let v2 = resolve_version(dataset, Some(version2))?.clone();
            (dataset.clone(), v1, v2)
        };
        diff::compute_version_diff(&dataset, &v1, &v2, options)
    }

    /// Update description, status or tags. Requires write access.
    ///
    /// # Errors
    ///
    /// `AccessDenied` without write access, `NotFound` for an unknown dataset.
    pub fn update_dataset(
        &self,
        dataset_id: &Uuid,
        user_id: &Uuid,
        update: DatasetUpdate,
    ) -> Result<Dataset> {
        let dataset = self.transact(|db| {
            access::require_access(db, dataset_id, user_id, AccessLevel::Write)?;
            let dataset = db.dataset_mut(dataset_id)?;
            if let Some(description) = update.description {
                dataset.description = description;
            }
            if let Some(status) = update.status {
                dataset.status = status;
            }
            if let Some(tags) = update.tags {
                dataset.metadata.set_tags(tags);
            }
            dataset.touch(*user_id);
            Ok(dataset.clone())
        })?;
        tracing::info!("Updated dataset '{}'", dataset.name);
        Ok(dataset)
    }

    /// Set one custom metadata field. Requires write access.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty field name, `AccessDenied` without write access.
    pub fn set_custom_field(
        &self,
        dataset_id: &Uuid,
        user_id: &Uuid,
        key: &str,
        value: FieldValue,
    ) -> Result<Dataset> {
        if key.trim().is_empty() {
            return Err(RegistryError::Validation("field name must not be empty".to_owned()));
        }
        self.transact(|db| {
            access::require_access(db, dataset_id, user_id, AccessLevel::Write)?;
            let dataset = db.dataset_mut(dataset_id)?;
            dataset.metadata.custom_fields.insert(key.to_owned(), value);
            dataset.metadata.updated_at = Utc::now();
            dataset.touch(*user_id);
            Ok(dataset.clone())
        })
    }

    /// Remove a custom metadata field; absent fields are ignored. Requires write access.
    ///
    /// # Errors
    ///
    /// `AccessDenied` without write access, `NotFound` for an unknown dataset.
    pub fn remove_custom_field(&self, dataset_id: &Uuid, user_id: &Uuid, key: &str) -> Result<Dataset> {
        self.transact(|db| {
            access::require_access(db, dataset_id, user_id, AccessLevel::Write)?;
            let dataset = db.dataset_mut(dataset_id)?;
            if dataset.metadata.custom_fields.remove(key).is_some() {
                dataset.metadata.updated_at = Utc::now();
                dataset.touch(*user_id);
            }
            Ok(dataset.clone())
        })
    }

    /// Delete a dataset with its versions, grants, records and stored files.
    /// Requires admin access.
    ///
    /// # Errors
    ///
    /// `AccessDenied` without admin access, `Io` if the stored files cannot be removed.
    pub fn delete_dataset(&self, dataset_id: &Uuid, user_id: &Uuid) -> Result<()> {
        let removed = self.transact(|db| {
            access::require_access(db, dataset_id, user_id, AccessLevel::Admin)?;
            db.remove_dataset(dataset_id)
        })?;
        self.store.delete_dataset_files(&removed.id)?;
        tracing::info!(
            "Deleted dataset '{}' and {} version(s)",
            removed.name,
            removed.versions.len()
        );
        Ok(())
    }

    // ---- listing and search ----

    /// Visible datasets narrowed by `filter`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user.
    pub fn list_datasets(&self, user_id: &Uuid, filter: &ListFilter) -> Result<Vec<Dataset>> {
        let db = self.read()?;
        Ok(access::list_accessible(&db, user_id, filter.level)?
            .into_iter()
            .filter(|d| filter.status.is_none_or(|s| s == d.status))
            .filter(|d| filter.tags.iter().all(|t| d.metadata.has_tag(t)))
            .cloned()
            .collect())
    }

    /// Search the datasets visible to `user_id`.
    ///
    /// # Errors
    ///
    /// `Validation` for a page below 1 or a page size outside the configured range.
    pub fn search(&self, user_id: &Uuid, query: &SearchQuery) -> Result<SearchPage> {
        query.validate(self.config.search.max_per_page)?;
        let db = self.read()?;
        let visible = access::list_accessible(&db, user_id, None)?;
        let page = search::run_search(visible, query);
        tracing::debug!("Search by {user_id}: {page}");
        Ok(page)
    }

    /// Versions ordered by creation time. Requires read access.
    ///
    /// # Errors
    ///
    /// `AccessDenied` without read access, `NotFound` for an unknown dataset.
    pub fn version_history(
        &self,
        dataset_id: &Uuid,
        user_id: &Uuid,
        include_metadata: bool,
        include_metrics: bool,
    ) -> Result<Vec<VersionHistoryEntry>> {
        let db = self.read()?;
        access::require_access(&db, dataset_id, user_id, AccessLevel::Read)?;
        Ok(db
            .dataset(dataset_id)?
            .history()
            .into_iter()
            .map(|v| VersionHistoryEntry {
                id: v.id,
                version: v.version.clone(),
                file_hash: v.file_hash.clone(),
                file_size: v.file_size,
                created_by: v.created_by,
                created_at: v.created_at,
                metadata: include_metadata.then(|| v.metadata_snapshot.clone()),
                quality_metrics: if include_metrics {
                    v.quality_metrics.clone()
                } else {
                    None
                },
            })
            .collect())
    }

    /// Tag usage across the datasets visible to `user_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user.
    pub fn tag_summary(&self, user_id: &Uuid, prefix: Option<&str>, limit: usize) -> Result<Vec<TagUsage>> {
        let db = self.read()?;
        let visible = access::list_accessible(&db, user_id, None)?;
        Ok(summary::tag_summary(&visible, prefix, limit))
    }

    /// Custom field usage across the datasets visible to `user_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user.
    pub fn field_summary(
        &self,
        user_id: &Uuid,
        prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<FieldUsage>> {
        let db = self.read()?;
        let visible = access::list_accessible(&db, user_id, None)?;
        Ok(summary::field_summary(&visible, prefix, limit))
    }

    // ---- validation records ----

    /// Evaluate `values` against minimum `threshold`s and record the outcome.
    /// Requires write access.
    ///
    /// A failing record marks the dataset invalid; a passing one promotes a draft.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown version, `AccessDenied` without write access.
    pub fn validate_version(
        &self,
        version_id: &Uuid,
        metric_type: &str,
        values: BTreeMap<String, f64>,
        threshold: Option<BTreeMap<String, f64>>,
        user_id: &Uuid,
    ) -> Result<QualityRecord> {
        let record = self.transact(|db| {
            let dataset_id = db.dataset_of_version(version_id)?.id;
            access::require_access(db, &dataset_id, user_id, AccessLevel::Write)?;

            let evaluation = validation::evaluate(&values, threshold.as_ref());
            let dataset = db.dataset_mut(&dataset_id)?;
            if validation::apply_status(dataset, evaluation.status) {
                dataset.touch(*user_id);
                tracing::info!("Dataset '{}' is now {}", dataset.name, dataset.status);
            }

            let record = QualityRecord {
                id: Uuid::new_v4(),
                dataset_id,
                version_id: *version_id,
                metric_type: metric_type.to_owned(),
                values,
                threshold,
                status: evaluation.status,
                details: evaluation.details,
                created_at: Utc::now(),
            };
            db.quality_records.push(record.clone());
            Ok(record)
        })?;
        tracing::info!(
            "Validation '{metric_type}' of version {version_id}: {}",
            record.status.as_str()
        );
        Ok(record)
    }

    /// Validation records of a dataset, newest first. Requires read access.
    ///
    /// # Errors
    ///
    /// `AccessDenied` without read access, `NotFound` for an unknown dataset.
    pub fn validation_history(
        &self,
        dataset_id: &Uuid,
        metric_type: Option<&str>,
        user_id: &Uuid,
    ) -> Result<Vec<QualityRecord>> {
        let db = self.read()?;
        access::require_access(&db, dataset_id, user_id, AccessLevel::Read)?;
        let mut records: Vec<QualityRecord> = db
            .quality_records
            .iter()
            .filter(|r| r.dataset_id == *dataset_id)
            .filter(|r| metric_type.is_none_or(|m| r.metric_type == m))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    // ---- archives ----

    /// Write a dataset archive to `path` (a `.tar.gz` suffix is enforced).
    /// Requires read access.
    ///
    /// # Errors
    ///
    /// `AccessDenied` without read access, `Io` if the archive cannot be written.
    pub fn export_dataset(
        &self,
        dataset_id: &Uuid,
        path: &Path,
        options: ExportOptions,
        user_id: &Uuid,
    ) -> Result<PathBuf> {
        let (manifest, entries) = {
            let db = self.read()?;
            access::require_access(&db, dataset_id, user_id, AccessLevel::Read)?;
            build_manifest(db.dataset(dataset_id)?, options)?
        };
        let written = archive::write_archive(path, &manifest, &entries)?;
        tracing::info!(
            "Exported dataset '{}' to {}",
            manifest.dataset.name,
            written.display()
        );
        Ok(written)
    }

    /// Recreate a dataset from an archive written by [`Self::export_dataset`].
    ///
    /// Every version file is checked against the digest in the manifest before
    /// anything is created. If a later step fails the new dataset is removed.
    ///
    /// # Errors
    ///
    /// `Validation` if the archive cannot be opened, the manifest is missing or
    /// malformed, or a file does not match its digest; `Conflict` if the name
    /// is taken.
    pub fn import_dataset(
        &self,
        archive_path: &Path,
        user_id: &Uuid,
        options: ImportOptions,
    ) -> Result<ImportedDataset> {
        if !archive_path.is_file() {
            return Err(RegistryError::Validation(format!(
                "archive {} does not exist",
                archive_path.display()
            )));
        }
        let staging = tempfile::TempDir::new().context("Failed to create staging directory")?;
        let manifest = archive::extract_archive(archive_path, staging.path())?;

        let versions_dir = staging.path().join(archive::VERSIONS_DIR);
        let mut files = Vec::new();
        for entry in manifest.versions.iter().flatten() {
            let Some(path) = archive::locate_version_file(staging.path(), entry)? else {
                tracing::warn!("Archive has no file for version '{}', skipping", entry.version);
                continue;
            };
            if !path.starts_with(&versions_dir) {
                return Err(RegistryError::Validation(format!(
                    "version '{}' points outside the archive",
                    entry.version
                )));
            }
            let actual = compute_file_hash(&path)?;
            if actual != entry.file_hash {
                return Err(RegistryError::Validation(format!(
                    "version '{}' does not match its digest (expected {}, found {actual})",
                    entry.version, entry.file_hash
                )));
            }
            files.push((entry, path));
        }

        let new = NewDataset {
            name: options.name.unwrap_or_else(|| manifest.dataset.name.clone()),
            description: options
                .description
                .unwrap_or_else(|| manifest.dataset.description.clone()),
            schema: manifest.metadata.schema.clone(),
            tags: manifest.metadata.tags.clone(),
            grants: Vec::new(),
        };
        let dataset = self.create_dataset(new, user_id)?;

        let restore = || -> Result<Vec<DatasetVersion>> {
            for (key, value) in &manifest.metadata.custom_fields {
                self.set_custom_field(&dataset.id, user_id, key, value.clone())?;
            }
            let mut versions = Vec::with_capacity(files.len());
            for (entry, path) in &files {
                versions.push(self.add_version(
                    &dataset.id,
                    &entry.version,
                    path,
                    user_id,
                    entry.quality_metrics.clone(),
                )?);
            }
            self.restore_statistics(&dataset.id, &manifest.metadata, &versions)?;
            Ok(versions)
        };

        let versions = match restore() {
            Ok(versions) => versions,
            Err(e) => {
                tracing::warn!("Import of '{}' failed, removing it: {e}", dataset.name);
                if let Err(cleanup) = self.delete_dataset(&dataset.id, user_id) {
                    tracing::warn!("Could not remove partial import '{}': {cleanup}", dataset.name);
                }
                return Err(e);
            }
        };

        tracing::info!(
            "Imported dataset '{}' with {} version(s) from {}",
            dataset.name,
            versions.len(),
            archive_path.display()
        );
        Ok(ImportedDataset {
            dataset: self.get_dataset(&dataset.id, user_id)?,
            versions,
        })
    }

    /// Put exported statistics back into the cache when the version they
    /// describe was imported and the document is well formed.
    fn restore_statistics(
        &self,
        dataset_id: &Uuid,
        metadata: &ManifestMetadata,
        versions: &[DatasetVersion],
    ) -> Result<()> {
        let (Some(value), Some(label)) = (&metadata.statistics, &metadata.statistics_version) else {
            return Ok(());
        };
        let Some(version) = versions.iter().find(|v| v.version == *label) else {
            return Ok(());
        };
        let statistics: DatasetStatistics = match serde_json::from_value(value.clone()) {
            Ok(statistics) => statistics,
            Err(e) => {
                tracing::debug!("Ignoring unreadable statistics in archive: {e}");
                return Ok(());
            }
        };
        self.transact(|db| {
            db.dataset_mut(dataset_id)?.metadata.statistics = Some(CachedStatistics {
                version_id: version.id,
                computed_at: Utc::now(),
                statistics,
            });
            Ok(())
        })
    }
}

/// Version labelled `label`, or the most recently created one.
fn resolve_version<'a>(dataset: &'a Dataset, label: Option<&str>) -> Result<&'a DatasetVersion> {
    match label {
        Some(label) => dataset
            .version(label)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Version, label)),
        None => dataset.latest_version().ok_or_else(|| {
            RegistryError::not_found(EntityKind::Version, format!("latest of '{}'", dataset.name))
        }),
    }
}

fn build_manifest(dataset: &Dataset, options: ExportOptions) -> Result<(Manifest, Vec<ArchiveEntry>)> {
    let cached = dataset.metadata.statistics.as_ref();
    let metadata = ManifestMetadata {
        schema: dataset.metadata.schema.clone(),
        statistics: cached
            .map(|c| serde_json::to_value(&c.statistics))
            .transpose()?,
        statistics_version: cached
            .and_then(|c| dataset.version_by_id(&c.version_id))
            .map(|v| v.version.clone()),
        tags: dataset.metadata.tags.clone(),
        custom_fields: dataset.metadata.custom_fields.clone(),
    };

    let mut entries = Vec::new();
    let versions = options.include_versions.then(|| {
        dataset
            .history()
            .into_iter()
            .map(|v| {
                let file_name = v.archive_file_name();
                entries.push(ArchiveEntry {
                    source: v.storage_path.clone(),
                    file_name: file_name.clone(),
                });
                ManifestVersion {
                    version: v.version.clone(),
                    created_at: Some(v.created_at),
                    file_hash: v.file_hash.clone(),
                    quality_metrics: if options.include_metrics {
                        v.quality_metrics.clone()
                    } else {
                        None
                    },
                    file_name: Some(file_name),
                }
            })
            .collect()
    });

    let manifest = Manifest {
        dataset: ManifestDataset {
            id: Some(dataset.id),
            name: dataset.name.clone(),
            description: dataset.description.clone(),
            status: dataset.status,
            created_at: Some(dataset.created_at),
            updated_at: Some(dataset.updated_at),
        },
        metadata,
        versions,
    };
    Ok((manifest, entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> DatasetRegistry {
        DatasetRegistry::open(RegistryConfig::rooted_at(dir.path())).unwrap()
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_registry_creation() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        assert!(dir.path().join("versions").exists());
        assert_eq!(registry.config().search.max_per_page, 100);
    }

    #[test]
    fn test_in_memory_registry_writes_no_state() {
        let dir = TempDir::new().unwrap();
        let config = RegistryConfig::in_memory(dir.path().join("store"));
        let registry = DatasetRegistry::open(config.clone()).unwrap();
        let alice = registry.register_user("alice", None).unwrap();
        let dataset = registry.create_dataset(NewDataset::new("scratch"), &alice.id).unwrap();
        let file = write(&dir, "v1.jsonl", "{\"a\": 1}\n");
        let version = registry.add_version(&dataset.id, "1.0", &file, &alice.id, None).unwrap();

        assert!(version.storage_path.starts_with(dir.path().join("store")));
        let entries: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(!entries.iter().any(|n| n.ends_with(".json") || n.ends_with(".json.tmp")));

        let reopened = DatasetRegistry::open(config).unwrap();
        assert!(matches!(
            reopened.find_user("alice"),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_names_and_labels_conflict() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let user = registry.register_user("alice", None).unwrap();
        let dataset = registry.create_dataset(NewDataset::new("sales"), &user.id).unwrap();
        assert_eq!(dataset.status, DatasetStatus::Draft);

        assert!(matches!(
            registry.create_dataset(NewDataset::new("sales"), &user.id),
            Err(RegistryError::Conflict(_))
        ));

        let file = write(&dir, "a.jsonl", "{\"a\": 1}\n");
        registry.add_version(&dataset.id, "1.0", &file, &user.id, None).unwrap();
        assert!(matches!(
            registry.add_version(&dataset.id, "1.0", &file, &user.id, None),
            Err(RegistryError::Conflict(_))
        ));
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "a.jsonl", "{\"a\": 1}\n");
        let (user_id, dataset_id) = {
            let registry = registry(&dir);
            let user = registry.register_user("alice", None).unwrap();
            let dataset = registry
                .create_dataset(NewDataset::new("sales").tag("finance"), &user.id)
                .unwrap();
            registry.add_version(&dataset.id, "1.0", &file, &user.id, None).unwrap();
            (user.id, dataset.id)
        };

        let reopened = registry(&dir);
        let dataset = reopened.get_dataset(&dataset_id, &user_id).unwrap();
        assert_eq!(dataset.versions.len(), 1);
        assert_eq!(dataset.metadata.tags, vec!["finance".to_owned()]);
    }

    #[test]
    fn test_failed_operation_leaves_no_partial_state() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let user = registry.register_user("alice", None).unwrap();
        let missing_group = Uuid::new_v4();

        let result = registry.create_dataset(
            NewDataset::new("sales").grant(missing_group, AccessLevel::Read),
            &user.id,
        );
        assert!(matches!(result, Err(RegistryError::NotFound { kind: EntityKind::Group, .. })));
        assert!(registry.list_accessible_datasets(&user.id, None).unwrap().is_empty());
    }

    #[test]
    fn test_statistics_cache_and_recalculate() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let user = registry.register_user("alice", None).unwrap();
        let dataset = registry.create_dataset(NewDataset::new("sales"), &user.id).unwrap();
        let file = write(&dir, "a.jsonl", "{\"v\": 1}\n{\"v\": 2}\n");
        let metrics = MetricsDocument::new().with("accuracy", serde_json::json!(0.9));
        registry
            .add_version(&dataset.id, "1.0", &file, &user.id, Some(metrics))
            .unwrap();

        let first = registry.get_statistics(&dataset.id, None, false, &user.id).unwrap();
        assert!(first.recalculated);
        assert_eq!(first.statistics.row_count, 2);
        assert!(first.quality_metrics.get("accuracy").is_some());
        assert!(first.quality_metrics.get("completeness").is_some());

        let second = registry.get_statistics(&dataset.id, Some("1.0"), false, &user.id).unwrap();
        assert!(!second.recalculated);
        assert_eq!(second.statistics, first.statistics);

        let third = registry.get_statistics(&dataset.id, None, true, &user.id).unwrap();
        assert!(third.recalculated);
        assert_eq!(third.statistics, first.statistics);
    }

    #[test]
    fn test_statistics_without_versions_is_not_found() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let user = registry.register_user("alice", None).unwrap();
        let dataset = registry.create_dataset(NewDataset::new("empty"), &user.id).unwrap();
        let err = registry.get_statistics(&dataset.id, None, false, &user.id).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { kind: EntityKind::Version, .. }));
    }

    #[test]
    fn test_validation_moves_status() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let user = registry.register_user("alice", None).unwrap();
        let dataset = registry.create_dataset(NewDataset::new("sales"), &user.id).unwrap();
        let file = write(&dir, "a.jsonl", "{\"v\": 1}\n");
        let version = registry.add_version(&dataset.id, "1.0", &file, &user.id, None).unwrap();

        let values: BTreeMap<String, f64> = [("completeness".to_owned(), 0.99)].into();
        let record = registry
            .validate_version(&version.id, "quality", values.clone(), None, &user.id)
            .unwrap();
        assert_eq!(record.status, QualityStatus::Pass);
        assert_eq!(registry.get_dataset(&dataset.id, &user.id).unwrap().status, DatasetStatus::Valid);

        let threshold: BTreeMap<String, f64> = [("completeness".to_owned(), 0.999)].into();
        let record = registry
            .validate_version(&version.id, "quality", values, Some(threshold), &user.id)
            .unwrap();
        assert_eq!(record.status, QualityStatus::Fail);
        assert_eq!(registry.get_dataset(&dataset.id, &user.id).unwrap().status, DatasetStatus::Invalid);

        let history = registry.validation_history(&dataset.id, Some("quality"), &user.id).unwrap();
        assert_eq!(history.len(), 2);
        assert!(registry.validation_history(&dataset.id, Some("other"), &user.id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_cascades() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let owner = registry.register_user("owner", None).unwrap();
        let reader = registry.register_user("reader", None).unwrap();
        let group = registry.create_group("readers", "", &owner.id, &[reader.id]).unwrap();
        let dataset = registry
            .create_dataset(NewDataset::new("sales").grant(group.id, AccessLevel::Read), &owner.id)
            .unwrap();
        let file = write(&dir, "a.jsonl", "{\"v\": 1}\n");
        let version = registry.add_version(&dataset.id, "1.0", &file, &owner.id, None).unwrap();

        assert!(matches!(
            registry.delete_dataset(&dataset.id, &reader.id),
            Err(RegistryError::AccessDenied(_))
        ));
        registry.delete_dataset(&dataset.id, &owner.id).unwrap();
        assert!(!version.storage_path.exists());
        assert!(matches!(
            registry.get_dataset(&dataset.id, &owner.id),
            Err(RegistryError::NotFound { .. })
        ));
        assert!(registry.list_accessible_datasets(&reader.id, None).unwrap().is_empty());
    }
}
