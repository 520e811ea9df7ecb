//! Directory readers.

mod graph;
mod ldap;

use async_trait::async_trait;
use serde_json::Value;

pub use graph::GraphDirectory;
pub use ldap::{LdapConfig, LdapDirectory};

use crate::error::ServiceError;
use crate::record::RawUserRecord;
use crate::shaper::AttributeRequest;

/// Which users to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selector {
    /// Every user matched by the reader's base filter.
    #[default]
    All,
    /// Users whose name or mail contains the string.
    Search(String),
}

impl From<Option<String>> for Selector {
    fn from(search: Option<String>) -> Self {
        match search {
            Some(search) if !search.trim().is_empty() => Self::Search(search),
            _ => Self::All,
        }
    }
}

/// Port for reading users out of a directory service.
#[async_trait]
pub trait DirectoryReader: Send + Sync {
    /// List users with the attributes of `request`.
    async fn list_users(
        &self,
        selector: &Selector,
        request: &AttributeRequest,
    ) -> Result<Vec<RawUserRecord>, ServiceError>;
}

/// Build a record out of directory attributes.
///
/// Directory attribute names are case-insensitive; they are stored under
/// the spelling used in `request` and everything not requested is dropped.
/// The identity always lands in the regular bag, even when it is also an
/// exported extension attribute.
pub(crate) fn record_from_attributes<I>(
    attributes: I,
    request: &AttributeRequest,
) -> RawUserRecord
where
    I: IntoIterator<Item = (String, Value)>,
{
    let regular: Vec<&str> = std::iter::once(request.identity_source())
        .chain(request.attributes().iter().map(String::as_str))
        .collect();

    attributes
        .into_iter()
        .fold(RawUserRecord::new(), |mut record, (name, value)| {
            let requested =
                |candidate: &&str| candidate.eq_ignore_ascii_case(&name);

            let identity = request.identity_source();
            if requested(&identity) {
                record = record.with_attribute(identity, value.clone());
            }

            if let Some(ext) = request
                .extension_attributes()
                .iter()
                .map(String::as_str)
                .find(requested)
            {
                record.with_extension(ext, value)
            } else if let Some(attr) = regular.iter().copied().find(requested) {
                record.with_attribute(attr, value)
            } else {
                record
            }
        })
}
