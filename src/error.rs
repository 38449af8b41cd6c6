//! Centralized error handling for the dataset registry.
//!
//! Every fallible registry operation returns [`Result<T>`], whose error side is
//! [`RegistryError`]. The variants mirror the failure classes a boundary layer
//! (HTTP, CLI) needs to tell apart:
//!
//! - [`RegistryError::NotFound`]: a dataset, version, group or user id did not
//!   resolve. Carries the kind and the missing identifier.
//! - [`RegistryError::Conflict`]: a unique name or label is already taken.
//! - [`RegistryError::Validation`]: caller input was unusable (missing source
//!   file, malformed archive or manifest, bad search parameters).
//! - [`RegistryError::DataFormat`]: a version file could not be parsed as
//!   newline-delimited JSON.
//! - [`RegistryError::AccessDenied`]: the caller lacks the required grant.
//!
//! ## Context Extension Trait
//!
//! The [`ResultExt`] trait adds `.context()` to any `Result` whose error
//! converts into [`RegistryError`]:
//!
//! ```no_run
//! use dataset_registry::error::ResultExt as _;
//! use std::fs;
//!
//! fn load_manifest() -> dataset_registry::error::Result<String> {
//!     let text = fs::read_to_string("metadata.json").context("Failed to read manifest")?;
//!     Ok(text)
//! }
//! ```

use std::fmt;

/// Kind of entity a [`RegistryError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Dataset,
    Version,
    Group,
    User,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::Version => "version",
            Self::Group => "group",
            Self::User => "user",
        }
    }
}

/// Main error type for registry operations.
#[derive(Debug)]
pub enum RegistryError {
    /// Referenced entity does not exist
    NotFound { kind: EntityKind, id: String },

    /// Unique name or label already in use
    Conflict(String),

    /// Caller input rejected (missing file, malformed archive, bad filter)
    Validation(String),

    /// Version file is not valid newline-delimited JSON
    DataFormat(String),

    /// Caller lacks the required access level
    AccessDenied(String),

    /// I/O errors (file operations)
    Io(std::io::Error),

    /// Generic error with context
    Other(String),
}

impl RegistryError {
    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True for failures a boundary layer maps to a 4xx-class response.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Conflict(_)
                | Self::Validation(_)
                | Self::DataFormat(_)
                | Self::AccessDenied(_)
        )
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { kind, id } => write!(f, "{} not found: {id}", kind.as_str()),
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::Validation(msg) => write!(f, "Validation failed: {msg}"),
            Self::DataFormat(msg) => write!(f, "Data format error: {msg}"),
            Self::AccessDenied(msg) => write!(f, "Access denied: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for RegistryError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataFormat(err.to_string())
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<RegistryError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| wrap(msg.into(), e.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap(f(), e.into()))
    }
}

/// Prefix the message while keeping the taxonomy of classified errors.
fn wrap(msg: String, err: RegistryError) -> RegistryError {
    match err {
        RegistryError::Validation(inner) => RegistryError::Validation(format!("{msg}: {inner}")),
        RegistryError::DataFormat(inner) => RegistryError::DataFormat(format!("{msg}: {inner}")),
        RegistryError::NotFound { .. }
        | RegistryError::Conflict(_)
        | RegistryError::AccessDenied(_) => err,
        RegistryError::Io(_) | RegistryError::Other(_) => {
            RegistryError::Other(format!("{msg}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::not_found(EntityKind::Dataset, "42");
        assert_eq!(err.to_string(), "dataset not found: 42");

        let err = RegistryError::Conflict("dataset name 'sales' already in use".to_owned());
        assert_eq!(
            err.to_string(),
            "Conflict: dataset name 'sales' already in use"
        );
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file.txt",
        ));

        let result: Result<()> = result.context("Failed to read file");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read file")
        );
    }

    #[test]
    fn test_context_keeps_classification() {
        let result: Result<()> = Err(RegistryError::Validation("bad manifest".to_owned()));
        let err = result.context("Import failed").unwrap_err();
        assert!(matches!(err, RegistryError::Validation(ref m) if m == "Import failed: bad manifest"));

        let result: Result<()> = Err(RegistryError::not_found(EntityKind::User, "7"));
        let err = result.context("ignored").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { kind: EntityKind::User, .. }));
        assert!(err.is_client_error());
    }
}
