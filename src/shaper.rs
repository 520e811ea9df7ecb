//! Turn raw directory records into the rows expected by the profile import.

use std::collections::HashSet;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::record::{RawUserRecord, stringify};

/// Leading key of every row, holding the user identity.
pub const IDENTITY_FIELD: &str = "idName";

/// Errors raised by an invalid [`AttributeRequest`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("at least one attribute must be requested")]
    NoAttributes,
    #[error("identity source attribute name is empty")]
    EmptyIdentitySource,
    #[error("attribute `{0}` is requested more than once")]
    DuplicateAttribute(String),
    #[error("attribute name `idName` is reserved for the identity")]
    ReservedName,
}

/// Attributes to export, in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRequest {
    identity_source: String,
    attributes: Vec<String>,
    extension_attributes: Vec<String>,
}

impl AttributeRequest {
    /// Create a new [`AttributeRequest`].
    ///
    /// Every output column must be unique, otherwise the serialized rows
    /// would carry the same key twice.
    pub fn new(
        identity_source: impl Into<String>,
        attributes: Vec<String>,
        extension_attributes: Vec<String>,
    ) -> Result<Self, ShapeError> {
        let identity_source = identity_source.into();

        if identity_source.trim().is_empty() {
            return Err(ShapeError::EmptyIdentitySource);
        }
        if attributes.is_empty() {
            return Err(ShapeError::NoAttributes);
        }

        // directories match attribute names case-insensitively.
        let mut seen = HashSet::new();
        for name in attributes.iter().chain(&extension_attributes) {
            if name.eq_ignore_ascii_case(IDENTITY_FIELD) {
                return Err(ShapeError::ReservedName);
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(ShapeError::DuplicateAttribute(name.clone()));
            }
        }

        Ok(Self {
            identity_source,
            attributes,
            extension_attributes,
        })
    }

    pub fn identity_source(&self) -> &str {
        &self.identity_source
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn extension_attributes(&self) -> &[String] {
        &self.extension_attributes
    }

    /// Names a property map may use as source: the identity (under its
    /// directory name and its row key) plus every requested attribute.
    pub fn known_source_names(&self) -> HashSet<String> {
        [self.identity_source.as_str(), IDENTITY_FIELD]
            .into_iter()
            .chain(self.attributes.iter().map(String::as_str))
            .chain(self.extension_attributes.iter().map(String::as_str))
            .map(str::to_owned)
            .collect()
    }

    /// Attribute names a directory reader has to fetch.
    pub fn directory_attributes(&self) -> Vec<String> {
        let mut names = vec![self.identity_source.clone()];
        for name in self.attributes.iter().chain(&self.extension_attributes) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

/// A single output row.
///
/// Fields are `idName` followed by the requested attributes then the
/// extension attributes, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRow {
    fields: Vec<(String, String)>,
}

impl NormalizedRow {
    /// Build a row out of a record, `None` when the identity is missing.
    fn from_record(
        record: &RawUserRecord,
        request: &AttributeRequest,
    ) -> Option<Self> {
        let id = record
            .attribute(&request.identity_source)
            .map(stringify)
            .filter(|id| !id.trim().is_empty())?;

        let mut fields = Vec::with_capacity(
            1 + request.attributes.len() + request.extension_attributes.len(),
        );
        fields.push((IDENTITY_FIELD.to_owned(), id));
        fields.extend(
            request
                .attributes
                .iter()
                .map(|name| (name.clone(), record.attribute_or_empty(name))),
        );
        fields.extend(
            request
                .extension_attributes
                .iter()
                .map(|name| (name.clone(), record.extension_or_empty(name))),
        );

        Some(Self { fields })
    }

    /// Identity value of the row.
    pub fn id(&self) -> &str {
        // `idName` is always the first field.
        &self.fields[0].1
    }

    /// Value of a field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Field names in output order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    /// `(name, value)` pairs in output order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for NormalizedRow {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for NormalizedRow {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = NormalizedRow;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "an object whose first key is `{IDENTITY_FIELD}`")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<Self::Value, A::Error> {
                let mut fields: Vec<(String, String)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(1));

                while let Some((key, value)) =
                    access.next_entry::<String, String>()?
                {
                    if fields.iter().any(|(k, _)| *k == key) {
                        return Err(de::Error::custom(format!(
                            "duplicate field `{key}`"
                        )));
                    }
                    fields.push((key, value));
                }

                let has_identity = matches!(
                    fields.first(),
                    Some((key, id))
                        if key == IDENTITY_FIELD && !id.trim().is_empty()
                );
                if !has_identity {
                    return Err(de::Error::custom(format!(
                        "row must start with a non-empty `{IDENTITY_FIELD}`"
                    )));
                }

                Ok(NormalizedRow { fields })
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// Document uploaded for the import job: `{ "value": [ rows... ] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDocument {
    value: Vec<NormalizedRow>,
}

impl OutputDocument {
    pub fn rows(&self) -> &[NormalizedRow] {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Serialize the document. Output is stable for identical rows.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Parse a previously serialized document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Shape records into an [`OutputDocument`].
///
/// Records without an identity value are skipped; the order of the
/// remaining records is preserved.
pub fn shape(
    records: &[RawUserRecord],
    request: &AttributeRequest,
) -> OutputDocument {
    let value = records
        .iter()
        .filter_map(|record| {
            let row = NormalizedRow::from_record(record, request);
            if row.is_none() {
                tracing::debug!(
                    identity = %request.identity_source,
                    "record skipped, identity attribute is missing"
                );
            }
            row
        })
        .collect();

    OutputDocument { value }
}
