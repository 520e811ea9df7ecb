//! Microsoft adapters against a mock HTTP server.

use std::sync::Arc;

use propsync::auth::{StaticToken, TokenCache, TokenSource};
use propsync::directory::{DirectoryReader, GraphDirectory, Selector};
use propsync::error::ServiceError;
use propsync::graph::RestClient;
use propsync::mapping::{PropertyMap, PropertyPairs};
use propsync::publisher::{
    DriveStore, FileStore, IdentityType, ImportSubmitter, SharePointImporter,
};
use propsync::shaper::AttributeRequest;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{
    body_json, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUEUE_PATH: &str = "/_api/Microsoft.Online.SharePoint.TenantManagement.Office365Tenant/QueueImportProfileProperties";

fn client() -> RestClient {
    RestClient::new(reqwest::Client::new(), Arc::new(StaticToken::new("t")))
}

fn request() -> AttributeRequest {
    AttributeRequest::new(
        "mail",
        vec!["jobTitle".into(), "department".into()],
        vec![],
    )
    .unwrap()
}

fn property_map() -> PropertyMap {
    let pairs: PropertyPairs =
        [("jobTitle", "SPS-JobTitle")].into_iter().collect();
    PropertyMap::try_from_pairs(&pairs).unwrap()
}

#[tokio::test]
async fn test_graph_directory_follows_next_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$select", "mail,jobTitle,department"))
        .and(header("authorization", "Bearer t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {"id": "1", "mail": "a@x.com", "jobTitle": "Eng"},
                {"id": "2", "mail": null, "jobTitle": "Mgr"},
            ],
            "@odata.nextLink": format!("{}/v1.0/users?$skiptoken=abc", server.uri()),
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$skiptoken", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {"id": "3", "mail": "b@x.com", "Department": "R&D"},
            ],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let directory = GraphDirectory::new(client(), &server.uri(), "v1.0", None);
    let records = directory
        .list_users(&Selector::All, &request())
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].attribute_or_empty("mail"), "a@x.com");
    assert_eq!(records[0].attribute_or_empty("jobTitle"), "Eng");
    assert!(records[0].attribute("id").is_none());
    assert_eq!(records[1].attribute_or_empty("mail"), "");
    // names are matched case-insensitively.
    assert_eq!(records[2].attribute_or_empty("department"), "R&D");
}

#[tokio::test]
async fn test_graph_directory_search() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$top", "50"))
        .and(query_param(
            "$filter",
            "startswith(displayName,'al') or startswith(mail,'al') \
             or startswith(userPrincipalName,'al')",
        ))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"value": []})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let directory =
        GraphDirectory::new(client(), &server.uri(), "v1.0", Some(50));
    let records = directory
        .list_users(&Selector::Search("al".into()), &request())
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_graph_directory_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": "Authorization_RequestDenied",
                "message": "Insufficient privileges to complete the operation.",
            }
        })))
        .mount(&server)
        .await;

    let directory = GraphDirectory::new(client(), &server.uri(), "v1.0", None);
    match directory.list_users(&Selector::All, &request()).await {
        Err(ServiceError::Api { code, .. }) => {
            assert_eq!(code, "Authorization_RequestDenied")
        },
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_drive_upload() {
    let server = MockServer::start().await;
    let document = json!({"value": [{"idName": "a@x.com", "jobTitle": "Eng"}]});

    Mock::given(method("PUT"))
        .and(path("/v1.0/drives/b!abc/root:/imports/users.json:/content"))
        .and(header("authorization", "Bearer t"))
        .and(body_json(&document))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "01ABC",
            "name": "users.json",
            "webUrl": "https://contoso.sharepoint.com/imports/users.json",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = DriveStore::for_drive(client(), &server.uri(), "v1.0", "b!abc");
    let url = store
        .upload(serde_json::to_vec(&document).unwrap(), "imports", "users.json")
        .await
        .unwrap();
    assert_eq!(url, "https://contoso.sharepoint.com/imports/users.json");
}

#[tokio::test]
async fn test_drive_upload_failure() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(507).set_body_json(json!({
            "error": {"code": "quotaLimitReached", "message": "Insufficient Storage"}
        })))
        .mount(&server)
        .await;

    let store = DriveStore::for_site(client(), &server.uri(), "v1.0", "site");
    let result = store.upload(b"{}".to_vec(), "", "users.json").await;
    assert!(matches!(
        result,
        Err(ServiceError::Api { ref code, .. }) if code == "quotaLimitReached"
    ));
}

#[tokio::test]
async fn test_import_submission() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(QUEUE_PATH))
        .and(header("accept", "application/json;odata=nometadata"))
        .and(body_json(json!({
            "idType": 2,
            "sourceDataIdProperty": "idName",
            "propertyMap": [
                {"Key": "jobTitle", "Value": "SPS-JobTitle", "ValueType": "Edm.String"},
            ],
            "sourceUri": "https://contoso.sharepoint.com/imports/users.json",
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"value": "8f1c9e4a-2b1d-4c55-9a0e-1f7b3f1c2d3e"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let importer = SharePointImporter::new(client(), &server.uri());
    let job = importer
        .submit_import(
            IdentityType::PrincipalName,
            "idName",
            &property_map(),
            "https://contoso.sharepoint.com/imports/users.json",
        )
        .await
        .unwrap();
    assert_eq!(job.id(), "8f1c9e4a-2b1d-4c55-9a0e-1f7b3f1c2d3e");
}

#[tokio::test]
async fn test_import_not_queued() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(QUEUE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"value": "00000000-0000-0000-0000-000000000000"}),
        ))
        .mount(&server)
        .await;

    let importer = SharePointImporter::new(client(), &server.uri());
    let result = importer
        .submit_import(IdentityType::Email, "idName", &property_map(), "x")
        .await;
    assert!(matches!(result, Err(ServiceError::Response(_))));
}

#[tokio::test]
async fn test_import_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(QUEUE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "odata.error": {
                "code": "-2147024809, System.ArgumentException",
                "message": {"lang": "en-US", "value": "Invalid source URI."},
            }
        })))
        .mount(&server)
        .await;

    let importer = SharePointImporter::new(client(), &server.uri());
    match importer
        .submit_import(IdentityType::Email, "idName", &property_map(), "x")
        .await
    {
        Err(ServiceError::Api { message, .. }) => {
            assert_eq!(message, "Invalid source URI.")
        },
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_token_cache_reuses_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/contoso.onmicrosoft.com/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "eyJ0eXAi",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = TokenCache::new(
        reqwest::Client::new(),
        &server.uri(),
        "contoso.onmicrosoft.com",
        "app",
        SecretString::from("secret"),
        "https://graph.microsoft.com",
    );

    assert_eq!(cache.token().await.unwrap(), "eyJ0eXAi");
    assert_eq!(cache.token().await.unwrap(), "eyJ0eXAi");
}

#[tokio::test]
async fn test_token_cache_refreshes_short_lived_token() {
    let server = MockServer::start().await;

    // shorter than the grace period, so never reused.
    Mock::given(method("POST"))
        .and(path("/tenant/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "expires_in": 60,
            "access_token": "short",
        })))
        .expect(2)
        .mount(&server)
        .await;

    let cache = TokenCache::new(
        reqwest::Client::new(),
        &server.uri(),
        "tenant",
        "app",
        SecretString::from("secret"),
        "https://graph.microsoft.com",
    );

    cache.token().await.unwrap();
    cache.token().await.unwrap();
}

#[tokio::test]
async fn test_token_cache_rejected_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided.",
        })))
        .mount(&server)
        .await;

    let cache = TokenCache::new(
        reqwest::Client::new(),
        &server.uri(),
        "tenant",
        "app",
        SecretString::from("wrong"),
        "https://graph.microsoft.com",
    );
    assert!(matches!(cache.token().await, Err(ServiceError::Auth(_))));
}

#[tokio::test]
async fn test_client_uses_cached_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant/oauth2/v2.0/token"))
        .and(body_string_contains("scope=https%3A%2F%2Fgraph.microsoft.com%2F.default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "expires_in": 3599,
            "access_token": "graph-token",
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(header("authorization", "Bearer graph-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"mail": "a@x.com"}],
        })))
        .expect(2)
        .mount(&server)
        .await;

    let cache = Arc::new(TokenCache::new(
        reqwest::Client::new(),
        &server.uri(),
        "tenant",
        "app",
        SecretString::from("secret"),
        "https://graph.microsoft.com",
    ));
    let client = RestClient::new(reqwest::Client::new(), cache);
    let directory = GraphDirectory::new(client, &server.uri(), "v1.0", None);

    for _ in 0..2 {
        let records = directory
            .list_users(&Selector::All, &request())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }
}
