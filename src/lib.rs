//! propsync exports directory user attributes to a JSON document, uploads it
//! to a SharePoint document library and queues a user profile property
//! import reading that document.

#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod export;
pub mod graph;
pub mod mapping;
pub mod pipeline;
pub mod publisher;
pub mod record;
pub mod shaper;
pub mod telemetry;

use std::collections::HashMap;
use std::sync::Arc;

use auth::{TokenCache, TokenSource};
use config::{ConfigError, Configuration, Directory};
use directory::{DirectoryReader, GraphDirectory, LdapConfig, LdapDirectory};
use error::Error;
use graph::RestClient;
use pipeline::{Pipeline, Publisher, Settings};
use publisher::{DriveStore, SharePointImporter};

/// Token caches shared by adapters talking to the same resource.
struct Tokens<'a> {
    config: &'a Configuration,
    http: reqwest::Client,
    caches: HashMap<String, Arc<TokenCache>>,
}

impl<'a> Tokens<'a> {
    fn new(config: &'a Configuration, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            caches: HashMap::new(),
        }
    }

    fn client(&mut self, resource: &str) -> Result<RestClient, ConfigError> {
        let token: Arc<dyn TokenSource> = match self.caches.get(resource) {
            Some(cache) => cache.clone(),
            None => {
                let credentials = self.config.credentials()?;
                let cache = Arc::new(TokenCache::new(
                    self.http.clone(),
                    &credentials.login_endpoint,
                    &credentials.tenant_id,
                    &credentials.client_id,
                    credentials.client_secret()?,
                    resource,
                ));
                self.caches.insert(resource.to_owned(), cache.clone());
                cache
            },
        };

        Ok(RestClient::new(self.http.clone(), token))
    }
}

/// Build the pipeline described by `config`.
///
/// Publication targets are skipped on a dry run, so neither the `publish`
/// section nor the credentials are required to only export.
pub fn build_pipeline(
    config: &Configuration,
    dry_run: bool,
) -> Result<Pipeline, Error> {
    let settings = Settings {
        request: config.attribute_request()?,
        property_map: config.property_map.clone(),
        strictness: config.mapping.strictness,
        output: config.output.clone(),
    };

    let http = graph::http_client().map_err(ConfigError::from)?;
    let mut tokens = Tokens::new(config, http);

    let directory: Box<dyn DirectoryReader> = match &config.directory {
        Directory::Ldap(cfg) => {
            let bind = match &cfg.bind_dn {
                Some(dn) => {
                    let env = cfg
                        .password_env
                        .as_deref()
                        .ok_or(ConfigError::MissingSection("password_env"))?;
                    Some((dn.clone(), config::read_env(env)?))
                },
                None => None,
            };

            Box::new(LdapDirectory::new(
                LdapConfig::new(
                    &cfg.address,
                    &cfg.base_dn,
                    cfg.users_filter.as_deref(),
                    cfg.search_attributes.clone(),
                ),
                bind,
            ))
        },
        Directory::Graph(cfg) => Box::new(GraphDirectory::new(
            tokens.client(&cfg.endpoint)?,
            &cfg.endpoint,
            &cfg.api_version,
            cfg.page_size,
        )),
    };

    let pipeline = Pipeline::new(settings, directory);
    if dry_run {
        return Ok(pipeline);
    }

    let publish = config.publish()?;
    let drive = &publish.drive;
    let drive_client = tokens.client(&drive.endpoint)?;
    let file_store = match (&drive.drive_id, &drive.site_id) {
        (Some(drive_id), _) => DriveStore::for_drive(
            drive_client,
            &drive.endpoint,
            &drive.api_version,
            drive_id,
        ),
        (None, Some(site_id)) => DriveStore::for_site(
            drive_client,
            &drive.endpoint,
            &drive.api_version,
            site_id,
        ),
        (None, None) => {
            return Err(ConfigError::MissingSection("site_id").into());
        },
    };

    let importer = SharePointImporter::new(
        tokens.client(&publish.import.admin_url)?,
        &publish.import.admin_url,
    );

    Ok(pipeline.with_publisher(Publisher {
        file_store: Box::new(file_store),
        importer: Box::new(importer),
        identity_type: config.identity.kind,
        library: drive.library.clone(),
        file_name: drive.file_name.clone(),
    }))
}
