//! A RIB object and the hierarchical-name parsing it is keyed by (§3.7).
//!
//! Grounded on `original_source/librina/include/librina/rib.h`'s
//! `BaseRIBObject`/`RIB::get_parent_name`, collapsed from the original's
//! virtual-dispatch object (one C++ class per RIB class, each overriding
//! `createObject`/`remoteCreateObject`/...) into a single plain struct: the
//! per-class behaviour the original hangs off subclassing lives instead in
//! the class-name string and the schema table, since nothing in this layer
//! needs to invoke class-specific code — that is the application's job,
//! reached through the response-handler/remote-dispatch seam in
//! [`crate::daemon`].
pub use cdap::ObjectValue;

/// Default field separator between name components (§3.7).
pub const DEFAULT_FIELD_SEPARATOR: char = ',';
/// Default separator between a field and its id within one component
/// (§3.7).
pub const DEFAULT_ID_SEPARATOR: char = '=';

/// One object in the RIB (§3.7).
#[derive(Clone, Debug)]
pub struct RibObject {
    /// The object's class.
    pub class: String,
    /// The object's full hierarchical name.
    pub name: String,
    /// Globally unique instance id.
    pub instance: u64,
    /// The object's current encoded value, if any.
    pub value: Option<ObjectValue>,
    /// The parent object's name, `None` for a root-level object.
    pub parent: Option<String>,
    /// Names of this object's direct children, insertion order.
    pub children: Vec<String>,
}

impl RibObject {
    pub(crate) fn new(class: String, name: String, instance: u64, value: Option<ObjectValue>, parent: Option<String>) -> Self {
        Self {
            class,
            name,
            instance,
            value,
            parent,
            children: Vec::new(),
        }
    }
}

/// Splits `name` on `field_sep` into its components (§3.7/§4.6).
fn components(name: &str, field_sep: char) -> Vec<&str> {
    name.split(field_sep).collect()
}

/// The prefix identifying `name`'s parent: every component but the last,
/// rejoined with `field_sep`. `None` for a single-component (root-level)
/// name (§4.6 "the parent name is the prefix up to... the last
/// field-separator").
pub fn parent_name(name: &str, field_sep: char) -> Option<String> {
    let parts = components(name, field_sep);
    if parts.len() <= 1 {
        None
    } else {
        Some(parts[..parts.len() - 1].join(&field_sep.to_string()))
    }
}

/// The field name of `name`'s last component: the part before
/// `id_sep`, or the whole component if no id is present (e.g.
/// `"Barcelona"` has field `"Barcelona"`, `"1=2"` has field `"1"`).
pub fn last_field(name: &str, field_sep: char, id_sep: char) -> String {
    let last = components(name, field_sep).pop().unwrap_or(name);
    match last.find(id_sep) {
        Some(idx) => last[..idx].to_string(),
        None => last.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_name_strips_last_component() {
        assert_eq!(parent_name("A=1", ',').as_deref(), None);
        assert_eq!(parent_name("A=1,Barcelona", ',').as_deref(), Some("A=1"));
        assert_eq!(
            parent_name("A=1,Barcelona,1=2,test2=1,test3", ',').as_deref(),
            Some("A=1,Barcelona,1=2,test2=1")
        );
    }

    #[test]
    fn last_field_strips_id_separator() {
        assert_eq!(last_field("A=1", ',', '='), "A");
        assert_eq!(last_field("A=1,Barcelona", ',', '='), "Barcelona");
        assert_eq!(last_field("A=1,Barcelona,1=2", ',', '='), "1");
        assert_eq!(last_field("A=1,Barcelona,1=2,test2=1", ',', '='), "test2");
    }
}
