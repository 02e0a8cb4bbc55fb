//! Dataset identifier validation.
//!
//! Valid dataset IDs:
//! - Must be non-empty
//! - May contain only ASCII letters, digits, `-`, `_`, and `/`
//! - Must not start or end with `/`
//! - Components between slashes must be non-empty (no `//`)
//!
//! Conventionally IDs are ref-style paths such as `refs/heads/main` or
//! `refs/tags/v1`, but the grammar does not require the prefix.

use crate::error::{DatasetError, DatasetResult};

fn invalid(id: &str, reason: &str) -> DatasetError {
    DatasetError::InvalidDatasetId {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate a dataset ID, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use strata_datasets::validate_dataset_id;
///
/// assert!(validate_dataset_id("refs/heads/main").is_ok());
/// assert!(validate_dataset_id("workingSets/main").is_ok());
/// assert!(validate_dataset_id("has spaces").is_err());
/// assert!(validate_dataset_id("").is_err());
/// ```
pub fn validate_dataset_id(id: &str) -> DatasetResult<()> {
    if id.is_empty() {
        return Err(invalid(id, "dataset ID must not be empty"));
    }

    for ch in id.chars() {
        let ok = ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '/';
        if !ok {
            return Err(invalid(id, &format!("contains forbidden character: {ch:?}")));
        }
    }

    if id.starts_with('/') || id.ends_with('/') {
        return Err(invalid(id, "must not start or end with '/'"));
    }

    for component in id.split('/') {
        if component.is_empty() {
            return Err(invalid(id, "path components must not be empty"));
        }
    }

    Ok(())
}
