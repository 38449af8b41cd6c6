//! In-memory registry tables with JSON persistence.
//!
//! The whole state is one [`Database`] value. Operations mutate it under the
//! registry's write lock and then [`Database::commit`] it to the state file,
//! so either every change of an operation lands or, on a failed write, the
//! file keeps its previous content.

use super::model::{
    Dataset, DatasetAccess, Membership, QualityRecord, User, UserGroup,
};
use crate::error::{EntityKind, RegistryError, Result, ResultExt as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    pub users: Vec<User>,
    pub groups: Vec<UserGroup>,
    pub memberships: BTreeSet<Membership>,
    pub datasets: Vec<Dataset>,
    pub grants: Vec<DatasetAccess>,
    pub quality_records: Vec<QualityRecord>,
}

impl Database {
    /// Load state from `path`, or start empty when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No registry state at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read registry state {}", path.display()))?;
        serde_json::from_str(&json).map_err(|e| {
            RegistryError::Validation(format!(
                "registry state {} is malformed: {e}",
                path.display()
            ))
        })
    }

    /// Write state to `path` via a sibling temp file and rename.
    pub fn commit(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).context("Failed to write registry state")?;
        fs::rename(&tmp, path).context("Failed to replace registry state")?;
        Ok(())
    }

    pub fn user(&self, id: &Uuid) -> Result<&User> {
        self.users
            .iter()
            .find(|u| u.id == *id)
            .ok_or_else(|| RegistryError::not_found(EntityKind::User, id))
    }

    pub fn user_by_name(&self, username: &str) -> Result<&User> {
        self.users
            .iter()
            .find(|u| u.username == username)
            .ok_or_else(|| RegistryError::not_found(EntityKind::User, username))
    }

    pub fn group(&self, id: &Uuid) -> Result<&UserGroup> {
        self.groups
            .iter()
            .find(|g| g.id == *id)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Group, id))
    }

    pub fn group_mut(&mut self, id: &Uuid) -> Result<&mut UserGroup> {
        self.groups
            .iter_mut()
            .find(|g| g.id == *id)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Group, id))
    }

    pub fn group_by_name(&self, name: &str) -> Result<&UserGroup> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Group, name))
    }

    pub fn dataset(&self, id: &Uuid) -> Result<&Dataset> {
        self.datasets
            .iter()
            .find(|d| d.id == *id)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Dataset, id))
    }

    pub fn dataset_mut(&mut self, id: &Uuid) -> Result<&mut Dataset> {
        self.datasets
            .iter_mut()
            .find(|d| d.id == *id)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Dataset, id))
    }

    pub fn dataset_by_name(&self, name: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.name == name)
    }

    /// Dataset owning the version with id `version_id`.
    pub fn dataset_of_version(&self, version_id: &Uuid) -> Result<&Dataset> {
        self.datasets
            .iter()
            .find(|d| d.version_by_id(version_id).is_some())
            .ok_or_else(|| RegistryError::not_found(EntityKind::Version, version_id))
    }

    /// Ids of every group `user_id` belongs to.
    pub fn groups_of(&self, user_id: &Uuid) -> BTreeSet<Uuid> {
        self.memberships
            .iter()
            .filter(|m| m.user_id == *user_id)
            .map(|m| m.group_id)
            .collect()
    }

    pub fn members_of(&self, group_id: &Uuid) -> Vec<Uuid> {
        self.memberships
            .iter()
            .filter(|m| m.group_id == *group_id)
            .map(|m| m.user_id)
            .collect()
    }

    pub fn grants_for(&self, dataset_id: &Uuid) -> impl Iterator<Item = &DatasetAccess> {
        self.grants.iter().filter(move |g| g.dataset_id == *dataset_id)
    }

    /// Remove a dataset together with its grants and quality records.
    pub fn remove_dataset(&mut self, id: &Uuid) -> Result<Dataset> {
        let index = self
            .datasets
            .iter()
            .position(|d| d.id == *id)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Dataset, id))?;
        let dataset = self.datasets.remove(index);
        self.grants.retain(|g| g.dataset_id != *id);
        self.quality_records.retain(|r| r.dataset_id != *id);
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::model::{Metadata, SchemaDocument};
    use chrono::Utc;
    use tempfile::TempDir;

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: name.to_owned(),
            email: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let db = Database::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(db, Database::default());
    }

    #[test]
    fn test_commit_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut db = Database::default();
        let alice = user("alice");
        let alice_id = alice.id;
        db.users.push(alice);
        db.datasets.push(Dataset::new(
            "sales".to_owned(),
            String::new(),
            alice_id,
            Metadata::new(SchemaDocument::default(), vec!["finance".to_owned()]),
        ));
        db.commit(&path).unwrap();

        let loaded = Database::load(&path).unwrap();
        assert_eq!(loaded, db);
        assert_eq!(loaded.user_by_name("alice").unwrap().id, alice_id);
        assert!(loaded.dataset_by_name("sales").is_some());
    }

    #[test]
    fn test_malformed_state_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(Database::load(&path), Err(RegistryError::Validation(_))));
    }

    #[test]
    fn test_lookups_report_kind() {
        let db = Database::default();
        let err = db.dataset(&Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { kind: EntityKind::Dataset, .. }));
        let err = db.group(&Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { kind: EntityKind::Group, .. }));
    }
}
