//! The owned-slot arena the resolution stages write into.
//!
//! There is one slot per descriptor of the [`FieldTree`]. Leaf slots start at
//! the zero value of their kind (an empty `null` for optionals) and remember
//! whether any stage wrote them. Container slots only exist so that
//! [`Record::to_value`] can rebuild the nested object shape.

use std::fmt;

use serde_json::{Map, Value};

use crate::tree::FieldTree;

#[derive(Debug, Clone)]
struct Slot {
    path: String,
    segments: Vec<String>,
    is_leaf: bool,
    value: Value,
    is_set: bool,
}

/// Resolved values, indexed like the descriptors of the tree they came from.
#[derive(Debug, Clone)]
pub struct Record {
    slots: Vec<Slot>,
}

impl Record {
    pub fn new(tree: &FieldTree) -> Self {
        let slots = tree
            .descriptors()
            .iter()
            .map(|field| Slot {
                path: field.path.clone(),
                segments: field.segments.clone(),
                is_leaf: field.is_leaf,
                value: if field.is_leaf {
                    field.kind.zero()
                } else {
                    Value::Object(Map::new())
                },
                is_set: false,
            })
            .collect();
        Self { slots }
    }

    /// Store a coerced value and mark the slot as set.
    pub fn write(&mut self, slot: usize, value: Value) {
        let slot = &mut self.slots[slot];
        debug_assert!(slot.is_leaf, "containers are never written directly");
        slot.value = value;
        slot.is_set = true;
    }

    pub fn is_set(&self, slot: usize) -> bool {
        self.slots[slot].is_set
    }

    pub fn get(&self, slot: usize) -> &Value {
        &self.slots[slot].value
    }

    /// Look a leaf up by dotted path.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        self.slots
            .iter()
            .find(|s| s.is_leaf && s.path == path)
            .map(|s| &s.value)
    }

    /// Nested object matching the serde shape of the settings type.
    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        for slot in &self.slots {
            let Some((last, parents)) = slot.segments.split_last() else {
                continue;
            };
            let mut target = &mut root;
            for segment in parents {
                let entry = target
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                let Value::Object(next) = entry else {
                    unreachable!("entry was just made an object");
                };
                target = next;
            }
            if slot.is_leaf {
                target.insert(last.clone(), slot.value.clone());
            } else {
                target
                    .entry(last.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
        }
        Value::Object(root)
    }

    /// `(path, value)` pairs of every leaf in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.slots
            .iter()
            .filter(|s| s.is_leaf)
            .map(|s| (s.path.as_str(), &s.value))
    }
}

/// Lists resolved values as `path = value`, one per line.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (path, value) in self.entries() {
            writeln!(f, "{path} = {value}")?;
        }
        Ok(())
    }
}
