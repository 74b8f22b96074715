//! Dotted-path lookahead over a decoded file map.
//!
//! Decoders hand back the top-level table of a file, so the value of a nested
//! field like `database.pool.size` sits two objects deep. Rather than walking
//! every file into a flat map up front, [`lookup`] splices parent objects
//! into the map on demand: `database` becomes `database.pool`, which becomes
//! `database.pool.size`. Spliced parents are removed so that only genuinely
//! unconsumed keys remain for the unknown-field check.

use serde_json::Value;

use crate::file::RawMap;

/// Make `name` directly addressable in `map` if any ancestor holds it.
///
/// An object parent is spliced as `parent.<key>`. An array whose elements
/// are all objects is spliced element by element, later elements winning.
/// Any other parent value is left alone.
pub fn splice(map: &mut RawMap, name: &str) {
    if map.contains_key(name) {
        return;
    }
    let Some((parent, _)) = name.rsplit_once('.') else {
        return;
    };
    if !map.contains_key(parent) {
        splice(map, parent);
    }

    let spliceable = match map.get(parent) {
        Some(Value::Object(_)) => true,
        Some(Value::Array(items)) => items.iter().all(Value::is_object),
        _ => false,
    };
    if !spliceable {
        return;
    }
    let Some(value) = map.remove(parent) else {
        return;
    };
    let objects = match value {
        Value::Object(object) => vec![object],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(object) => Some(object),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    for object in objects {
        for (key, value) in object {
            map.insert(format!("{parent}.{key}"), value);
        }
    }
}

/// Splice as needed, then return the value stored under `name`.
pub fn lookup<'m>(map: &'m mut RawMap, name: &str) -> Option<&'m Value> {
    splice(map, name);
    map.get(name)
}
