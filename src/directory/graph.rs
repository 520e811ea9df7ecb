//! Microsoft Graph users.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{DirectoryReader, Selector, record_from_attributes};
use crate::error::ServiceError;
use crate::graph::{ODataPage, RestClient};
use crate::record::RawUserRecord;
use crate::shaper::AttributeRequest;

/// Attributes a search string is matched against.
const SEARCH_ATTRIBUTES: [&str; 3] = ["displayName", "mail", "userPrincipalName"];

/// Reads users from Microsoft Graph `/users`.
#[derive(Debug, Clone)]
pub struct GraphDirectory {
    client: RestClient,
    base_url: String,
    page_size: Option<u16>,
}

impl GraphDirectory {
    /// Create a new [`GraphDirectory`].
    ///
    /// `endpoint` has no trailing slash, e.g. `https://graph.microsoft.com`.
    pub fn new(
        client: RestClient,
        endpoint: &str,
        api_version: &str,
        page_size: Option<u16>,
    ) -> Self {
        Self {
            client,
            base_url: format!("{endpoint}/{api_version}"),
            page_size,
        }
    }

    fn query(
        &self,
        selector: &Selector,
        request: &AttributeRequest,
    ) -> Vec<(&'static str, String)> {
        let mut query =
            vec![("$select", request.directory_attributes().join(","))];

        if let Some(size) = self.page_size {
            query.push(("$top", size.to_string()));
        }

        if let Selector::Search(search) = selector {
            query.push(("$filter", search_filter(search)));
        }

        query
    }
}

fn search_filter(search: &str) -> String {
    let search = search.replace('\'', "''");
    SEARCH_ATTRIBUTES
        .iter()
        .map(|attr| format!("startswith({attr},'{search}')"))
        .collect::<Vec<_>>()
        .join(" or ")
}

#[async_trait]
impl DirectoryReader for GraphDirectory {
    #[instrument(skip(self, request))]
    async fn list_users(
        &self,
        selector: &Selector,
        request: &AttributeRequest,
    ) -> Result<Vec<RawUserRecord>, ServiceError> {
        let mut records = Vec::new();

        let mut page: ODataPage<Map<String, Value>> = self
            .client
            .get_json(
                &format!("{}/users", self.base_url),
                &self.query(selector, request),
            )
            .await?;

        loop {
            debug!(users = page.value.len(), "users page received");
            records.extend(
                page.value
                    .into_iter()
                    .map(|user| record_from_attributes(user, request)),
            );

            // `nextLink` already carries the query.
            match page.next_link {
                Some(next) => page = self.client.get_json(&next, &[]).await?,
                None => break,
            }
        }

        Ok(records)
    }
}
