//! Bearer-authenticated JSON client shared by the Microsoft adapters.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::auth::TokenSource;
use crate::error::ServiceError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Graph `OData` error response.
#[derive(Debug, Deserialize)]
struct ODataError {
    error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
struct ODataErrorBody {
    code: String,
    message: String,
}

/// SharePoint REST error response (`odata=nometadata`).
#[derive(Debug, Deserialize)]
struct SharePointError {
    #[serde(rename = "odata.error")]
    error: SharePointErrorBody,
}

#[derive(Debug, Deserialize)]
struct SharePointErrorBody {
    code: String,
    message: SharePointMessage,
}

#[derive(Debug, Deserialize)]
struct SharePointMessage {
    value: String,
}

/// Paginated collection response.
#[derive(Debug, Deserialize)]
pub struct ODataPage<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// HTTP client adding a bearer token to every request.
///
/// Requests are sent once; failures go straight back to the caller.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    token: Arc<dyn TokenSource>,
    accept: &'static str,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("accept", &self.accept)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Create a new [`RestClient`].
    pub fn new(http: reqwest::Client, token: Arc<dyn TokenSource>) -> Self {
        Self {
            http,
            token,
            accept: "application/json",
        }
    }

    /// Update `Accept` header sent with every request.
    pub fn accept(mut self, accept: &'static str) -> Self {
        self.accept = accept;
        self
    }

    /// `GET` a JSON resource.
    #[instrument(skip(self, query))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let request = self.http.get(url).query(query);
        self.send(request).await
    }

    /// `PUT` raw bytes, expecting a JSON answer.
    #[instrument(skip(self, body), fields(size_bytes = body.len()))]
    pub async fn put_bytes<T: DeserializeOwned>(
        &self,
        url: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<T, ServiceError> {
        let request = self
            .http
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(body);
        self.send(request).await
    }

    /// `POST` a JSON body, expecting a JSON answer.
    #[instrument(skip(self, body))]
    pub async fn post_json<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ServiceError> {
        let request = self.http.post(url).json(body);
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ServiceError> {
        let token = self.token.token().await?;
        let response = request
            .bearer_auth(token)
            .header(ACCEPT, self.accept)
            .send()
            .await?;

        let status = response.status();
        debug!(%status, url = %response.url(), "response received");

        if status.is_success() {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        Err(api_error(response).await)
    }
}

/// Build the HTTP client shared by every adapter.
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("propsync/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Turn an error response into [`ServiceError::Api`], keeping the remote
/// diagnostic when the body can be decoded.
async fn api_error(response: Response) -> ServiceError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    decode_error(status.as_str(), &body)
}

fn decode_error(status: &str, body: &str) -> ServiceError {
    if let Ok(odata) = serde_json::from_str::<ODataError>(body) {
        return ServiceError::Api {
            code: odata.error.code,
            message: odata.error.message,
        };
    }

    if let Ok(sharepoint) = serde_json::from_str::<SharePointError>(body) {
        return ServiceError::Api {
            code: sharepoint.error.code,
            message: sharepoint.error.message.value,
        };
    }

    ServiceError::Api {
        code: status.to_owned(),
        message: body.to_owned(),
    }
}
