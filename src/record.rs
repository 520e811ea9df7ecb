//! Raw directory records.

use std::collections::HashMap;

use serde_json::Value;

/// Separator used when a multi-valued attribute is flattened to text.
pub const MULTI_VALUE_SEPARATOR: &str = ";";

/// One user entry as returned by a directory reader.
///
/// Values are kept as loosely typed JSON values: LDAP yields strings and
/// string lists, Graph may yield booleans, numbers or nested objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawUserRecord {
    attributes: HashMap<String, Value>,
    extension_attributes: HashMap<String, Value>,
}

impl RawUserRecord {
    /// Create an empty [`RawUserRecord`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a regular attribute.
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Add an attribute to the extension bag.
    pub fn with_extension(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.extension_attributes.insert(name.into(), value.into());
        self
    }

    /// Raw value of a regular attribute.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Raw value of an extension attribute.
    pub fn extension(&self, name: &str) -> Option<&Value> {
        self.extension_attributes.get(name)
    }

    /// Text of a regular attribute, empty when absent.
    pub fn attribute_or_empty(&self, name: &str) -> String {
        self.attribute(name).map(stringify).unwrap_or_default()
    }

    /// Text of an extension attribute, empty when absent.
    pub fn extension_or_empty(&self, name: &str) -> String {
        self.extension(name).map(stringify).unwrap_or_default()
    }
}

/// Flatten any JSON value into the text written to a row.
///
/// `null` becomes empty, scalars their textual form, lists are joined with
/// [`MULTI_VALUE_SEPARATOR`] and objects are written as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(stringify)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(MULTI_VALUE_SEPARATOR),
        Value::Object(_) => value.to_string(),
    }
}
