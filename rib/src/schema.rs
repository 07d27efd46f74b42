//! Schema-driven validation (§4.6): a registered table of
//! `(container class, field) -> child class` relations that every
//! insertion is checked against.
//!
//! Grounded on `original_source/librina/include/librina/rib.h`'s
//! `RIBSchema`/`RIBSchemaObject`/`ribSchemaDefContRelation`, flattened
//! from the original's tree of `RIBSchemaObject` nodes (each owning its
//! own children list) into one flat map keyed by `(container_class,
//! field)` — the tree structure the original builds is exactly the
//! information a map lookup recovers in one step, and nothing here walks
//! the schema independently of a concrete object's parent chain.
use std::collections::HashMap;

use crate::error::{RibError, Result};

/// Class name of the implicit root every top-level object's parent
/// resolves to.
pub const ROOT_CLASS: &str = "ROOT";

/// One registered container/child relation.
#[derive(Clone, Debug)]
struct SchemaEntry {
    child_class: String,
    #[allow(dead_code)]
    mandatory: bool,
    max_objs: Option<u32>,
}

/// The schema: which classes may appear as children of which, under
/// which field name, and how many (§3.7, §4.6).
#[derive(Clone, Debug, Default)]
pub struct RibSchema {
    entries: HashMap<(String, String), SchemaEntry>,
}

impl RibSchema {
    /// An empty schema; nothing validates until relations are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers that `container_class` may have a child of class
    /// `child_class` under field name `field`, optionally capped at
    /// `max_objs` instances (`None` = unbounded).
    ///
    /// Mirrors `RIBSchema::ribSchemaDefContRelation`.
    pub fn def_cont_relation(
        &mut self,
        container_class: &str,
        field: &str,
        child_class: &str,
        mandatory: bool,
        max_objs: Option<u32>,
    ) {
        self.entries.insert(
            (container_class.to_string(), field.to_string()),
            SchemaEntry {
                child_class: child_class.to_string(),
                mandatory,
                max_objs,
            },
        );
    }

    /// Validates that `child_class` is the class registered for
    /// `container_class`'s `field`, returning the entry's `max_objs`
    /// bound on success.
    pub fn validate(&self, container_class: &str, field: &str, child_class: &str) -> Result<Option<u32>> {
        match self.entries.get(&(container_class.to_string(), field.to_string())) {
            Some(entry) if entry.child_class == child_class => Ok(entry.max_objs),
            Some(entry) => Err(RibError::SchemaViolation(format!(
                "field {} under {} expects class {}, got {}",
                field, container_class, entry.child_class, child_class
            ))),
            None => Err(RibError::SchemaViolation(format!(
                "no schema entry for field {} under {}",
                field, container_class
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_relation_is_rejected() {
        let schema = RibSchema::new();
        assert!(schema.validate(ROOT_CLASS, "A", "A").is_err());
    }

    #[test]
    fn registered_relation_with_wrong_class_is_rejected() {
        let mut schema = RibSchema::new();
        schema.def_cont_relation(ROOT_CLASS, "A", "A", true, None);
        assert!(schema.validate(ROOT_CLASS, "A", "B").is_err());
    }

    #[test]
    fn registered_relation_with_matching_class_succeeds() {
        let mut schema = RibSchema::new();
        schema.def_cont_relation(ROOT_CLASS, "A", "A", true, Some(1));
        assert_eq!(schema.validate(ROOT_CLASS, "A", "A").unwrap(), Some(1));
    }
}
