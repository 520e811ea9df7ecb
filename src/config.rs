//! Configuration manager for propsync.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;
use validator::{Validate, ValidationError};

use crate::mapping::{PropertyPairs, Strictness};
use crate::publisher::IdentityType;
use crate::shaper::{AttributeRequest, ShapeError};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_IDENTITY_SOURCE: &str = "mail";
const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com";
const DEFAULT_GRAPH_VERSION: &str = "v1.0";
const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
const DEFAULT_SECRET_ENV: &str = "PROPSYNC_CLIENT_SECRET";
const DEFAULT_LOG_FILTER: &str = "info";

/// Errors that may occur during the configuration loading process.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to deserialize configuration: {0}")]
    Deserialize(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("invalid attribute list: {0}")]
    Attributes(#[from] ShapeError),
    #[error("URL is invalid: {0}")]
    Url(#[from] url::ParseError),
    #[error("missing `{0}` environment variable")]
    MissingEnv(String),
    #[error("missing `{0}` entry")]
    MissingSection(&'static str),
    #[error("cannot build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct Configuration {
    /// Which directory attribute identifies a user.
    #[serde(default)]
    #[validate(nested)]
    pub identity: Identity,
    /// Exported attributes, in column order.
    #[validate(length(min = 1, message = "at least one attribute is required"))]
    pub attributes: Vec<String>,
    /// Exported custom attributes, after regular ones.
    #[serde(default)]
    pub extension_attributes: Vec<String>,
    /// Source attribute to user profile property.
    #[serde(default)]
    pub property_map: PropertyPairs,
    #[serde(default)]
    pub mapping: Mapping,
    /// Where users are read from.
    pub directory: Directory,
    /// OAuth2 application used against Microsoft services.
    #[validate(nested)]
    pub credentials: Option<Credentials>,
    /// Upload and import settings.
    #[validate(nested)]
    pub publish: Option<Publish>,
    /// Local copies of the exported document.
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub telemetry: Telemetry,
    #[serde(skip)]
    path: PathBuf,
}

/// Identity attribute configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(default)]
pub struct Identity {
    /// Directory attribute holding the identity, `mail` by default.
    #[validate(length(min = 1))]
    pub source: String,
    /// How the import job resolves the identity.
    #[serde(rename = "type")]
    pub kind: IdentityType,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            source: DEFAULT_IDENTITY_SOURCE.into(),
            kind: IdentityType::default(),
        }
    }
}

/// Mapping validation configuration.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct Mapping {
    #[serde(default)]
    pub strictness: Strictness,
}

/// Directory service configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Directory {
    Ldap(Ldap),
    Graph(Graph),
}

/// LDAP configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ldap {
    /// `ldap://` or `ldaps://` URL of the instance.
    pub address: String,
    /// DN used to bind, anonymous when missing.
    pub bind_dn: Option<String>,
    /// Environment variable holding the bind password.
    pub password_env: Option<String>,
    /// Search base.
    pub base_dn: String,
    /// Filter selecting user entries.
    pub users_filter: Option<String>,
    /// Attributes matched against a search string.
    #[serde(default = "default_search_attributes")]
    pub search_attributes: Vec<String>,
}

fn default_search_attributes() -> Vec<String> {
    vec!["cn".into(), "mail".into(), "uid".into()]
}

/// Microsoft Graph users configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Graph {
    #[serde(default = "default_graph_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_graph_version")]
    pub api_version: String,
    /// `$top` value, Graph default when missing.
    pub page_size: Option<u16>,
}

fn default_graph_endpoint() -> String {
    DEFAULT_GRAPH_ENDPOINT.into()
}

fn default_graph_version() -> String {
    DEFAULT_GRAPH_VERSION.into()
}

/// OAuth2 client credentials.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct Credentials {
    #[validate(length(min = 1))]
    pub tenant_id: String,
    #[validate(length(min = 1))]
    pub client_id: String,
    /// Environment variable holding the client secret.
    #[serde(default = "default_secret_env")]
    pub client_secret_env: String,
    #[serde(default = "default_login_endpoint")]
    pub login_endpoint: String,
}

fn default_secret_env() -> String {
    DEFAULT_SECRET_ENV.into()
}

fn default_login_endpoint() -> String {
    DEFAULT_LOGIN_ENDPOINT.into()
}

impl Credentials {
    /// Read the client secret from the environment.
    pub fn client_secret(&self) -> Result<SecretString, ConfigError> {
        read_env(&self.client_secret_env)
    }
}

/// Publication configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct Publish {
    #[validate(nested)]
    pub drive: Drive,
    pub import: Import,
}

/// Document library receiving the exported document.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[validate(schema(function = "validate_drive"))]
pub struct Drive {
    #[serde(default = "default_graph_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_graph_version")]
    pub api_version: String,
    /// Site whose default library is used.
    pub site_id: Option<String>,
    /// Explicit library, wins over `site_id`.
    pub drive_id: Option<String>,
    /// Folder inside the library.
    #[serde(default)]
    pub library: String,
    #[validate(length(min = 1))]
    pub file_name: String,
}

fn validate_drive(drive: &Drive) -> Result<(), ValidationError> {
    if drive.site_id.is_none() && drive.drive_id.is_none() {
        return Err(ValidationError::new("site_id_or_drive_id"));
    }
    Ok(())
}

/// SharePoint tenant administration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Import {
    /// `https://<tenant>-admin.sharepoint.com`.
    pub admin_url: String,
}

/// Local artifacts.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct Output {
    /// Copy of the uploaded JSON document.
    pub json_path: Option<PathBuf>,
    /// Tabular view of the rows.
    pub csv_path: Option<PathBuf>,
    /// CSV columns, every row field when empty.
    #[serde(default)]
    pub csv_fields: Vec<String>,
}

/// Logging and OpenTelemetry configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Telemetry {
    /// gRPC OTLP collector, logs stay local when missing.
    pub otlp_endpoint: Option<String>,
    /// `EnvFilter` directive, `RUST_LOG` wins when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.into()
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            filter: default_log_filter(),
        }
    }
}

impl Configuration {
    /// Reads the configuration file from the specified path or the default
    /// location.
    pub fn read(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let file = File::open(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        let mut config = Self::from_reader(file)?;
        config.path = path;
        Ok(config)
    }

    /// Parse and check a YAML configuration.
    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigError> {
        let config: Configuration = serde_yaml::from_reader(reader)?;
        config.finalize()
    }

    fn finalize(mut self) -> Result<Self, ConfigError> {
        self.validate()?;
        // fails on duplicated or reserved column names.
        self.attribute_request()?;

        match &mut self.directory {
            Directory::Graph(graph) => {
                graph.endpoint = normalize_url(&graph.endpoint)?;
            },
            Directory::Ldap(ldap) => {
                ldap.search_attributes.retain(|attr| !attr.trim().is_empty());
                if ldap.search_attributes.is_empty() {
                    return Err(ConfigError::MissingSection(
                        "search_attributes",
                    ));
                }
            },
        }
        if let Some(credentials) = &mut self.credentials {
            credentials.login_endpoint =
                normalize_url(&credentials.login_endpoint)?;
        }
        if let Some(publish) = &mut self.publish {
            publish.drive.endpoint = normalize_url(&publish.drive.endpoint)?;
            publish.import.admin_url =
                normalize_url(&publish.import.admin_url)?;
        }

        Ok(self)
    }

    /// Path the configuration was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attributes to export.
    pub fn attribute_request(&self) -> Result<AttributeRequest, ShapeError> {
        AttributeRequest::new(
            &self.identity.source,
            self.attributes.clone(),
            self.extension_attributes.clone(),
        )
    }

    pub fn credentials(&self) -> Result<&Credentials, ConfigError> {
        self.credentials
            .as_ref()
            .ok_or(ConfigError::MissingSection("credentials"))
    }

    pub fn publish(&self) -> Result<&Publish, ConfigError> {
        self.publish
            .as_ref()
            .ok_or(ConfigError::MissingSection("publish"))
    }
}

/// Read a secret from an environment variable.
pub fn read_env(name: &str) -> Result<SecretString, ConfigError> {
    std::env::var(name)
        .map(SecretString::from)
        .map_err(|_| ConfigError::MissingEnv(name.to_owned()))
}

/// Normalizes a URL string by ensuring it starts with a valid scheme
/// (`http` or `https`), without trailing slash.
fn normalize_url(url: &str) -> Result<String, url::ParseError> {
    let url_with_scheme =
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{url}")
        };

    let parsed_url = Url::parse(&url_with_scheme)?;
    Ok(parsed_url.as_str().trim_end_matches('/').to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping;

    const CONFIG: &str = r#"
attributes: [Title, Department]
extension_attributes: [costCenter]
property_map:
  Title: SPS-JobTitle
  costCenter: CostCenter
mapping:
  strictness: warn
directory:
  kind: graph
credentials:
  tenant_id: contoso.onmicrosoft.com
  client_id: 00000000-0000-0000-0000-000000000000
publish:
  drive:
    site_id: contoso.sharepoint.com,1,2
    library: Shared Documents/imports
    file_name: users.json
  import:
    admin_url: contoso-admin.sharepoint.com/
output:
  csv_path: users.csv
  csv_fields: [idName, Title]
"#;

    #[test]
    fn test_read_configuration() {
        let config = Configuration::from_reader(CONFIG.as_bytes()).unwrap();

        assert_eq!(config.identity.source, "mail");
        assert_eq!(config.identity.kind, IdentityType::Email);
        assert_eq!(config.mapping.strictness, mapping::Strictness::Warn);
        assert_eq!(config.property_map.len(), 2);
        assert_eq!(config.telemetry.filter, "info");
        assert_eq!(
            config.directory,
            Directory::Graph(Graph {
                endpoint: "https://graph.microsoft.com".into(),
                api_version: "v1.0".into(),
                page_size: None,
            })
        );

        let publish = config.publish().unwrap();
        assert_eq!(
            publish.import.admin_url,
            "https://contoso-admin.sharepoint.com"
        );
        assert_eq!(
            config.credentials().unwrap().login_endpoint,
            "https://login.microsoftonline.com"
        );
        assert_eq!(config.output.csv_fields, ["idName", "Title"]);
    }

    #[test]
    fn test_empty_attributes() {
        let yaml = "attributes: []\ndirectory:\n  kind: graph\n";
        assert!(matches!(
            Configuration::from_reader(yaml.as_bytes()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_duplicated_column() {
        let yaml = "attributes: [Title]\nextension_attributes: [Title]\n\
                    directory:\n  kind: graph\n";
        assert!(matches!(
            Configuration::from_reader(yaml.as_bytes()),
            Err(ConfigError::Attributes(ShapeError::DuplicateAttribute(_)))
        ));
    }

    #[test]
    fn test_drive_requires_location() {
        let yaml = r#"
attributes: [Title]
directory:
  kind: ldap
  address: ldap://localhost:389
  base_dn: dc=example,dc=org
publish:
  drive:
    file_name: users.json
  import:
    admin_url: https://contoso-admin.sharepoint.com
"#;
        assert!(matches!(
            Configuration::from_reader(yaml.as_bytes()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_ldap_search_attributes() {
        let yaml = r#"
attributes: [title]
directory:
  kind: ldap
  address: ldap://localhost:389
  base_dn: dc=example,dc=org
  search_attributes: []
"#;
        assert!(matches!(
            Configuration::from_reader(yaml.as_bytes()),
            Err(ConfigError::MissingSection("search_attributes"))
        ));

        let config =
            Configuration::from_reader(yaml.replace("[]", "[cn, '']").as_bytes())
                .unwrap();
        match config.directory {
            Directory::Ldap(ldap) => {
                assert_eq!(ldap.search_attributes, ["cn"])
            },
            other => panic!("unexpected directory: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let err =
            Configuration::read(Some(Path::new("does/not/exist.yaml")));
        assert!(matches!(err, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("graph.microsoft.com").unwrap(),
            "https://graph.microsoft.com"
        );
        assert_eq!(
            normalize_url("http://localhost:8080/").unwrap(),
            "http://localhost:8080"
        );
    }
}
