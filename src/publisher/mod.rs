//! Publication of the exported document: upload then import request.

mod drive;
mod import;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use drive::DriveStore;
pub use import::SharePointImporter;

use crate::error::ServiceError;
use crate::mapping::PropertyMap;

/// How the import job resolves a row identity to a user profile.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IdentityType {
    #[default]
    Email,
    CloudId,
    PrincipalName,
}

impl IdentityType {
    /// Numeric value expected by the import queue.
    pub fn wire_value(self) -> u8 {
        match self {
            IdentityType::Email => 0,
            IdentityType::CloudId => 1,
            IdentityType::PrincipalName => 2,
        }
    }
}

/// Identifier of a queued import job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportJob(String);

impl ImportJob {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Port for storing the exported document.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store `content` as `file_name` in `library`, returning the URL the
    /// import job can read it from.
    async fn upload(
        &self,
        content: Vec<u8>,
        library: &str,
        file_name: &str,
    ) -> Result<String, ServiceError>;
}

/// Port for queueing a user profile property import.
#[async_trait]
pub trait ImportSubmitter: Send + Sync {
    async fn submit_import(
        &self,
        identity_type: IdentityType,
        identity_field: &str,
        property_map: &PropertyMap,
        source_url: &str,
    ) -> Result<ImportJob, ServiceError>;
}
