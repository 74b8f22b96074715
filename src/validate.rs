//! Resolution-time checks: unknown keys and unset required fields.
//!
//! Each stage removes the keys it consumed from its source map, so anything
//! left over afterwards was never claimed by a field. Duplicate keys are
//! caught earlier, when the field tree is built.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::LayerfigError;
use crate::file::RawMap;
use crate::record::Record;
use crate::resolve::Policy;
use crate::tree::FieldTree;

/// Reject the first key (in key order) left unconsumed in a file map.
pub fn check_unknown_fields(
    remaining: &RawMap,
    path: &Path,
    policy: &Policy,
) -> Result<(), LayerfigError> {
    if policy.allow_unknown_fields {
        return Ok(());
    }
    match remaining.keys().next() {
        Some(key) => Err(LayerfigError::UnknownField {
            key: key.clone(),
            path: path.to_path_buf(),
        }),
        None => Ok(()),
    }
}

/// The first leftover pair whose key starts with `prefix` followed by the
/// delimiter. An empty prefix claims nothing.
pub fn find_unknown_prefixed<'a>(
    remaining: &'a BTreeMap<String, String>,
    prefix: &str,
    delimiter: &str,
) -> Option<(&'a String, &'a String)> {
    if prefix.is_empty() {
        return None;
    }
    let needle = format!("{prefix}{delimiter}");
    remaining.iter().find(|(key, _)| key.starts_with(&needle))
}

pub fn check_unknown_envs(
    remaining: &BTreeMap<String, String>,
    policy: &Policy,
) -> Result<(), LayerfigError> {
    if policy.allow_unknown_envs {
        return Ok(());
    }
    match find_unknown_prefixed(remaining, &policy.keys.env_prefix, &policy.keys.env_delimiter) {
        Some((key, value)) => Err(LayerfigError::UnknownEnv {
            key: key.clone(),
            value: value.clone(),
        }),
        None => Ok(()),
    }
}

pub fn check_unknown_flags(
    remaining: &BTreeMap<String, String>,
    policy: &Policy,
) -> Result<(), LayerfigError> {
    if policy.allow_unknown_flags {
        return Ok(());
    }
    match find_unknown_prefixed(remaining, &policy.keys.flag_prefix, &policy.keys.flag_delimiter) {
        Some((key, value)) => Err(LayerfigError::UnknownFlag {
            key: key.clone(),
            value: value.clone(),
        }),
        None => Ok(()),
    }
}

/// Every required leaf that no stage set, named together in one error.
pub fn check_required(
    tree: &FieldTree,
    record: &Record,
    policy: &Policy,
) -> Result<(), LayerfigError> {
    let missing: Vec<String> = tree
        .leaves()
        .filter(|&index| {
            let field = tree.get(index);
            (field.required || policy.all_fields_required) && !record.is_set(index)
        })
        .map(|index| tree.get(index).path.clone())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(LayerfigError::MissingRequired { fields: missing })
    }
}
