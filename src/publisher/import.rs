//! SharePoint user profile bulk import queue.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{IdentityType, ImportJob, ImportSubmitter};
use crate::error::ServiceError;
use crate::graph::RestClient;
use crate::mapping::PropertyMap;

const QUEUE_PATH: &str = "/_api/Microsoft.Online.SharePoint.TenantManagement.Office365Tenant/QueueImportProfileProperties";
const ACCEPT: &str = "application/json;odata=nometadata";
const EMPTY_JOB_ID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueueRequest<'a> {
    id_type: u8,
    source_data_id_property: &'a str,
    property_map: Vec<KeyValue<'a>>,
    source_uri: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct KeyValue<'a> {
    key: &'a str,
    value: &'a str,
    value_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    value: String,
}

/// Queues imports on the SharePoint tenant administration site.
#[derive(Debug, Clone)]
pub struct SharePointImporter {
    client: RestClient,
    url: String,
}

impl SharePointImporter {
    /// Create a new [`SharePointImporter`].
    ///
    /// `admin_url` has no trailing slash.
    pub fn new(client: RestClient, admin_url: &str) -> Self {
        Self {
            client: client.accept(ACCEPT),
            url: format!("{admin_url}{QUEUE_PATH}"),
        }
    }
}

fn queue_request<'a>(
    identity_type: IdentityType,
    identity_field: &'a str,
    property_map: &'a PropertyMap,
    source_url: &'a str,
) -> QueueRequest<'a> {
    QueueRequest {
        id_type: identity_type.wire_value(),
        source_data_id_property: identity_field,
        property_map: property_map
            .iter()
            .map(|(key, value)| KeyValue {
                key,
                value,
                value_type: "Edm.String",
            })
            .collect(),
        source_uri: source_url,
    }
}

#[async_trait]
impl ImportSubmitter for SharePointImporter {
    #[instrument(skip(self, property_map))]
    async fn submit_import(
        &self,
        identity_type: IdentityType,
        identity_field: &str,
        property_map: &PropertyMap,
        source_url: &str,
    ) -> Result<ImportJob, ServiceError> {
        let body = queue_request(
            identity_type,
            identity_field,
            property_map,
            source_url,
        );
        let response: QueueResponse =
            self.client.post_json(&self.url, &body).await?;

        // the queue answers an empty GUID when nothing was queued.
        let id = response.value.trim();
        if id.is_empty() || id == EMPTY_JOB_ID {
            return Err(ServiceError::Response(
                "import request was not queued".into(),
            ));
        }

        Ok(ImportJob::new(id))
    }
}
