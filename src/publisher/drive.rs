//! Upload to a SharePoint document library through Microsoft Graph.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use super::FileStore;
use crate::error::ServiceError;
use crate::graph::RestClient;

const CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Deserialize)]
struct DriveItem {
    #[serde(rename = "webUrl")]
    web_url: String,
}

/// Graph drive used as file store.
#[derive(Debug, Clone)]
pub struct DriveStore {
    client: RestClient,
    drive_url: String,
}

impl DriveStore {
    /// Default library of a site.
    pub fn for_site(
        client: RestClient,
        endpoint: &str,
        api_version: &str,
        site_id: &str,
    ) -> Self {
        Self {
            client,
            drive_url: format!("{endpoint}/{api_version}/sites/{site_id}/drive"),
        }
    }

    /// Library identified by its drive id.
    pub fn for_drive(
        client: RestClient,
        endpoint: &str,
        api_version: &str,
        drive_id: &str,
    ) -> Self {
        Self {
            client,
            drive_url: format!("{endpoint}/{api_version}/drives/{drive_id}"),
        }
    }

    /// `.../root:/<library>/<file>:/content`, every segment escaped.
    fn content_url(
        &self,
        library: &str,
        file_name: &str,
    ) -> Result<Url, ServiceError> {
        let mut url = Url::parse(&self.drive_url)?;
        let folders: Vec<&str> =
            library.split('/').filter(|s| !s.is_empty()).collect();

        url.path_segments_mut()
            .map_err(|_| {
                ServiceError::Response(format!(
                    "`{}` cannot be a base URL",
                    self.drive_url
                ))
            })?
            .pop_if_empty()
            .push("root:")
            .extend(folders)
            .push(&format!("{file_name}:"))
            .push("content");

        Ok(url)
    }
}

#[async_trait]
impl FileStore for DriveStore {
    #[instrument(skip(self, content), fields(size_bytes = content.len()))]
    async fn upload(
        &self,
        content: Vec<u8>,
        library: &str,
        file_name: &str,
    ) -> Result<String, ServiceError> {
        let url = self.content_url(library, file_name)?;
        let item: DriveItem = self
            .client
            .put_bytes(url.as_str(), content, CONTENT_TYPE)
            .await?;

        Ok(item.web_url)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::StaticToken;

    #[test]
    fn test_content_url() {
        let client = RestClient::new(
            reqwest::Client::new(),
            Arc::new(StaticToken::new("t")),
        );
        let store = DriveStore::for_site(
            client,
            "https://graph.microsoft.com",
            "v1.0",
            "contoso.sharepoint.com,1,2",
        );

        let url = store
            .content_url("/Shared Documents/imports/", "users.json")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://graph.microsoft.com/v1.0/sites/contoso.sharepoint.com,1,2/drive/root:/Shared%20Documents/imports/users.json:/content"
        );

        let url = store.content_url("", "users.json").unwrap();
        assert!(url.as_str().ends_with("/drive/root:/users.json:/content"));
    }
}
