//! Source to destination property mapping handed to the import job.

use std::collections::HashSet;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Mapping validation failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("source attribute `{0}` is mapped more than once")]
    DuplicateKey(String),
    #[error("source attribute `{0}` is not part of the exported document")]
    UnknownSourceAttribute(String),
    #[error("source attribute `{0}` has an empty destination name")]
    EmptyDestinationName(String),
}

/// How unknown source attributes are handled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Log a warning and keep going.
    Warn,
    /// Abort the run.
    #[default]
    Fail,
}

/// Property map as written in the configuration.
///
/// Entries are kept in order and duplicated keys are retained, so that
/// [`validate`] can reject them rather than keeping the last one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyPairs(Vec<(String, String)>);

impl PropertyPairs {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertyPairs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<'de> Deserialize<'de> for PropertyPairs {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = PropertyPairs;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of source to destination names")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<Self::Value, A::Error> {
                let mut pairs =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(pair) = access.next_entry::<String, String>()? {
                    pairs.push(pair);
                }
                Ok(PropertyPairs(pairs))
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}

/// Validated property map with unique source names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap {
    entries: Vec<(String, String)>,
}

impl PropertyMap {
    /// Build the map, failing on the first repeated source name.
    pub fn try_from_pairs(pairs: &PropertyPairs) -> Result<Self, MappingError> {
        let mut seen = HashSet::with_capacity(pairs.len());
        let mut entries = Vec::with_capacity(pairs.len());

        for (source, destination) in pairs.iter() {
            if !seen.insert(source) {
                return Err(MappingError::DuplicateKey(source.to_owned()));
            }
            entries.push((source.to_owned(), destination.to_owned()));
        }

        Ok(Self { entries })
    }

    /// Destination name of a source attribute.
    pub fn get(&self, source: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, d)| d.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for PropertyMap {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (source, destination) in &self.entries {
            map.serialize_entry(source, destination)?;
        }
        map.end()
    }
}

/// Validate a property map before it reaches the import job.
///
/// Checks, in order: unique source names, non-empty destinations, and
/// source names present in `known`. The last check only logs a warning
/// under [`Strictness::Warn`].
pub fn validate(
    pairs: &PropertyPairs,
    known: &HashSet<String>,
    strictness: Strictness,
) -> Result<PropertyMap, MappingError> {
    let map = PropertyMap::try_from_pairs(pairs)?;

    if let Some((source, _)) =
        map.iter().find(|(_, destination)| destination.trim().is_empty())
    {
        return Err(MappingError::EmptyDestinationName(source.to_owned()));
    }

    for (source, destination) in map.iter() {
        if known.contains(source) {
            continue;
        }

        match strictness {
            Strictness::Fail => {
                return Err(MappingError::UnknownSourceAttribute(
                    source.to_owned(),
                ));
            },
            Strictness::Warn => tracing::warn!(
                source,
                destination,
                "mapped source attribute is never exported, check for a typo"
            ),
        }
    }

    if map.is_empty() {
        tracing::warn!("property map is empty, import job will update nothing");
    }

    Ok(map)
}
