//! Group-based access control and the user/group directory.
//!
//! A user may act on a dataset when they created it, or when any group they
//! belong to holds a grant at or above the required level. Grants are unique
//! per (dataset, group); granting again replaces the level.

use super::db::Database;
use super::model::{AccessLevel, DatasetAccess, Dataset, Membership, User, UserGroup};
use crate::error::{RegistryError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of [`access_list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    pub group_id: Uuid,
    pub group_name: String,
    pub level: AccessLevel,
    pub granted_at: DateTime<Utc>,
    pub granted_by: Uuid,
}

/// Whether `user_id` holds at least `required` on `dataset_id`.
///
/// # Errors
///
/// `NotFound` if the user or the dataset does not exist.
pub fn check_access(
    db: &Database,
    dataset_id: &Uuid,
    user_id: &Uuid,
    required: AccessLevel,
) -> Result<bool> {
    db.user(user_id)?;
    let dataset = db.dataset(dataset_id)?;
    Ok(effective_level(db, dataset, user_id).is_some_and(|level| level.satisfies(required)))
}

/// Like [`check_access`], but a missing grant is an `AccessDenied` error.
pub fn require_access(
    db: &Database,
    dataset_id: &Uuid,
    user_id: &Uuid,
    required: AccessLevel,
) -> Result<()> {
    if check_access(db, dataset_id, user_id, required)? {
        Ok(())
    } else {
        tracing::warn!("User {user_id} denied {required} access to dataset {dataset_id}");
        Err(RegistryError::AccessDenied(format!(
            "{required} access to dataset {dataset_id} required"
        )))
    }
}

/// Highest level `user_id` holds on `dataset`. Creators are implicit admins.
fn effective_level(db: &Database, dataset: &Dataset, user_id: &Uuid) -> Option<AccessLevel> {
    if dataset.created_by == *user_id {
        return Some(AccessLevel::Admin);
    }
    let groups = db.groups_of(user_id);
    db.grants_for(&dataset.id)
        .filter(|g| groups.contains(&g.group_id))
        .map(|g| g.level)
        .max()
}

/// Grant `level` to `group_id` on `dataset_id`, replacing any existing grant.
pub fn grant_access(
    db: &mut Database,
    dataset_id: &Uuid,
    group_id: &Uuid,
    level: AccessLevel,
    granted_by: &Uuid,
) -> Result<DatasetAccess> {
    db.dataset(dataset_id)?;
    db.group(group_id)?;
    let now = Utc::now();

    if let Some(existing) = db
        .grants
        .iter_mut()
        .find(|g| g.dataset_id == *dataset_id && g.group_id == *group_id)
    {
        existing.level = level;
        existing.updated_at = now;
        return Ok(existing.clone());
    }

    let grant = DatasetAccess {
        dataset_id: *dataset_id,
        group_id: *group_id,
        level,
        created_by: *granted_by,
        created_at: now,
        updated_at: now,
    };
    db.grants.push(grant.clone());
    Ok(grant)
}

/// Remove the grant of `group_id` on `dataset_id`. Returns whether one existed.
pub fn revoke_access(db: &mut Database, dataset_id: &Uuid, group_id: &Uuid) -> Result<bool> {
    db.dataset(dataset_id)?;
    db.group(group_id)?;
    let before = db.grants.len();
    db.grants
        .retain(|g| !(g.dataset_id == *dataset_id && g.group_id == *group_id));
    Ok(db.grants.len() != before)
}

/// Datasets the user created or reaches through a grant of at least `level`
/// (any grant when `level` is `None`), in creation order.
pub fn list_accessible<'a>(
    db: &'a Database,
    user_id: &Uuid,
    level: Option<AccessLevel>,
) -> Result<Vec<&'a Dataset>> {
    db.user(user_id)?;
    let required = level.unwrap_or(AccessLevel::Read);
    Ok(db
        .datasets
        .iter()
        .filter(|d| effective_level(db, d, user_id).is_some_and(|l| l.satisfies(required)))
        .collect())
}

pub fn access_list(db: &Database, dataset_id: &Uuid) -> Result<Vec<AccessEntry>> {
    db.dataset(dataset_id)?;
    db.grants_for(dataset_id)
        .map(|grant| {
            let group = db.group(&grant.group_id)?;
            Ok(AccessEntry {
                group_id: group.id,
                group_name: group.name.clone(),
                level: grant.level,
                granted_at: grant.updated_at,
                granted_by: grant.created_by,
            })
        })
        .collect()
}

/// Add a user to the directory. Usernames are unique.
pub fn register_user(db: &mut Database, username: &str, email: Option<String>) -> Result<User> {
    if username.trim().is_empty() {
        return Err(RegistryError::Validation("username must not be empty".to_owned()));
    }
    if db.user_by_name(username).is_ok() {
        return Err(RegistryError::Conflict(format!(
            "username '{username}' already in use"
        )));
    }
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_owned(),
        email,
        is_active: true,
        created_at: Utc::now(),
    };
    db.users.push(user.clone());
    Ok(user)
}

pub fn create_group(
    db: &mut Database,
    name: &str,
    description: &str,
    created_by: &Uuid,
    members: &[Uuid],
) -> Result<UserGroup> {
    db.user(created_by)?;
    if db.group_by_name(name).is_ok() {
        return Err(RegistryError::Conflict(format!(
            "group name '{name}' already in use"
        )));
    }
    for member in members {
        db.user(member)?;
    }

    let now = Utc::now();
    let group = UserGroup {
        id: Uuid::new_v4(),
        name: name.to_owned(),
        description: description.to_owned(),
        created_by: *created_by,
        created_at: now,
        updated_at: now,
    };
    db.memberships.extend(members.iter().map(|user_id| Membership {
        user_id: *user_id,
        group_id: group.id,
    }));
    db.groups.push(group.clone());
    Ok(group)
}

/// Add users to a group. Existing members are left as they are.
pub fn add_users_to_group(db: &mut Database, group_id: &Uuid, users: &[Uuid]) -> Result<UserGroup> {
    for user in users {
        db.user(user)?;
    }
    let group = db.group_mut(group_id)?;
    group.updated_at = Utc::now();
    let group = group.clone();
    db.memberships.extend(users.iter().map(|user_id| Membership {
        user_id: *user_id,
        group_id: *group_id,
    }));
    Ok(group)
}

pub fn remove_users_from_group(
    db: &mut Database,
    group_id: &Uuid,
    users: &[Uuid],
) -> Result<UserGroup> {
    let group = db.group_mut(group_id)?;
    group.updated_at = Utc::now();
    let group = group.clone();
    db.memberships
        .retain(|m| !(m.group_id == *group_id && users.contains(&m.user_id)));
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EntityKind;
    use crate::registry::model::{Metadata, SchemaDocument};

    struct Fixture {
        db: Database,
        owner: Uuid,
        reader: Uuid,
        outsider: Uuid,
        group: Uuid,
        dataset: Uuid,
    }

    fn fixture() -> Fixture {
        let mut db = Database::default();
        let owner = register_user(&mut db, "owner", None).unwrap().id;
        let reader = register_user(&mut db, "reader", None).unwrap().id;
        let outsider = register_user(&mut db, "outsider", None).unwrap().id;
        let group = create_group(&mut db, "analysts", "", &owner, &[reader]).unwrap().id;
        let dataset = Dataset::new(
            "sales".to_owned(),
            String::new(),
            owner,
            Metadata::new(SchemaDocument::default(), Vec::new()),
        );
        let dataset_id = dataset.id;
        db.datasets.push(dataset);
        Fixture {
            db,
            owner,
            reader,
            outsider,
            group,
            dataset: dataset_id,
        }
    }

    #[test]
    fn test_creator_is_admin() {
        let f = fixture();
        for level in [AccessLevel::Read, AccessLevel::Write, AccessLevel::Admin] {
            assert!(check_access(&f.db, &f.dataset, &f.owner, level).unwrap());
            assert!(!check_access(&f.db, &f.dataset, &f.outsider, level).unwrap());
        }
    }

    #[test]
    fn test_regrant_replaces_level() {
        let mut f = fixture();
        grant_access(&mut f.db, &f.dataset, &f.group, AccessLevel::Read, &f.owner).unwrap();
        assert!(check_access(&f.db, &f.dataset, &f.reader, AccessLevel::Read).unwrap());
        assert!(!check_access(&f.db, &f.dataset, &f.reader, AccessLevel::Write).unwrap());

        grant_access(&mut f.db, &f.dataset, &f.group, AccessLevel::Write, &f.owner).unwrap();
        assert!(check_access(&f.db, &f.dataset, &f.reader, AccessLevel::Write).unwrap());
        assert_eq!(f.db.grants_for(&f.dataset).count(), 1);
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let mut f = fixture();
        let err = check_access(&f.db, &Uuid::new_v4(), &f.owner, AccessLevel::Read).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { kind: EntityKind::Dataset, .. }));
        let err = check_access(&f.db, &f.dataset, &Uuid::new_v4(), AccessLevel::Read).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { kind: EntityKind::User, .. }));
        let err = grant_access(&mut f.db, &f.dataset, &Uuid::new_v4(), AccessLevel::Read, &f.owner)
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { kind: EntityKind::Group, .. }));
    }

    #[test]
    fn test_revoke_and_membership_changes() {
        let mut f = fixture();
        grant_access(&mut f.db, &f.dataset, &f.group, AccessLevel::Read, &f.owner).unwrap();

        add_users_to_group(&mut f.db, &f.group, &[f.outsider]).unwrap();
        assert!(check_access(&f.db, &f.dataset, &f.outsider, AccessLevel::Read).unwrap());
        remove_users_from_group(&mut f.db, &f.group, &[f.outsider]).unwrap();
        assert!(!check_access(&f.db, &f.dataset, &f.outsider, AccessLevel::Read).unwrap());

        assert!(revoke_access(&mut f.db, &f.dataset, &f.group).unwrap());
        assert!(!revoke_access(&mut f.db, &f.dataset, &f.group).unwrap());
        assert!(!check_access(&f.db, &f.dataset, &f.reader, AccessLevel::Read).unwrap());
    }

    #[test]
    fn test_list_accessible_honours_level() {
        let mut f = fixture();
        grant_access(&mut f.db, &f.dataset, &f.group, AccessLevel::Read, &f.owner).unwrap();

        assert_eq!(list_accessible(&f.db, &f.reader, None).unwrap().len(), 1);
        assert!(list_accessible(&f.db, &f.reader, Some(AccessLevel::Write)).unwrap().is_empty());
        assert_eq!(list_accessible(&f.db, &f.owner, Some(AccessLevel::Admin)).unwrap().len(), 1);
        assert!(list_accessible(&f.db, &f.outsider, None).unwrap().is_empty());
    }

    #[test]
    fn test_access_list_and_duplicates() {
        let mut f = fixture();
        grant_access(&mut f.db, &f.dataset, &f.group, AccessLevel::Admin, &f.owner).unwrap();
        let entries = access_list(&f.db, &f.dataset).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = entries.first().unwrap();
        assert_eq!(entry.group_name, "analysts");
        assert_eq!(entry.level, AccessLevel::Admin);

        assert!(matches!(
            create_group(&mut f.db, "analysts", "", &f.owner, &[]),
            Err(RegistryError::Conflict(_))
        ));
        assert!(matches!(
            register_user(&mut f.db, "owner", None),
            Err(RegistryError::Conflict(_))
        ));
    }
}
