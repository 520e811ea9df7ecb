//! Read, shape, validate and publish, strictly in that order.

use tracing::{info, instrument, warn};

use crate::config::{ConfigError, Output};
use crate::directory::{DirectoryReader, Selector};
use crate::error::{Error, Result, ServiceError};
use crate::export;
use crate::mapping::{self, PropertyMap, PropertyPairs, Strictness};
use crate::publisher::{FileStore, IdentityType, ImportJob, ImportSubmitter};
use crate::shaper::{self, AttributeRequest, IDENTITY_FIELD, OutputDocument};

/// Inputs of a run which do not depend on remote services.
#[derive(Debug, Clone)]
pub struct Settings {
    pub request: AttributeRequest,
    pub property_map: PropertyPairs,
    pub strictness: Strictness,
    pub output: Output,
}

/// Counts reported at the end of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub records_read: usize,
    pub rows_shaped: usize,
    pub rows_dropped: usize,
}

/// Result of [`Pipeline::prepare`], ready to be published.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub document: OutputDocument,
    pub property_map: PropertyMap,
    pub report: RunReport,
}

/// File store and import queue, with the destination of the document.
pub struct Publisher {
    pub file_store: Box<dyn FileStore>,
    pub importer: Box<dyn ImportSubmitter>,
    pub identity_type: IdentityType,
    pub library: String,
    pub file_name: String,
}

impl Publisher {
    /// Upload the document then queue the import.
    ///
    /// The import is never queued when the upload failed.
    #[instrument(
        skip_all,
        fields(library = %self.library, file = %self.file_name)
    )]
    pub async fn publish(&self, prepared: &Prepared) -> Result<ImportJob> {
        let content = prepared
            .document
            .to_bytes()
            .map_err(|err| Error::UploadFailure(ServiceError::Json(err)))?;

        let url = self
            .file_store
            .upload(content, &self.library, &self.file_name)
            .await
            .map_err(Error::UploadFailure)?;
        info!(%url, "document uploaded");

        let job = self
            .importer
            .submit_import(
                self.identity_type,
                IDENTITY_FIELD,
                &prepared.property_map,
                &url,
            )
            .await
            .map_err(Error::ImportSubmissionFailure)?;
        info!(job_id = %job, "import job queued");

        Ok(job)
    }
}

/// Pipeline coordinator.
pub struct Pipeline {
    settings: Settings,
    directory: Box<dyn DirectoryReader>,
    publisher: Option<Publisher>,
}

impl Pipeline {
    /// Create a new [`Pipeline`] without publication.
    pub fn new(
        settings: Settings,
        directory: Box<dyn DirectoryReader>,
    ) -> Self {
        Self {
            settings,
            directory,
            publisher: None,
        }
    }

    /// Update publication targets of [`Pipeline`].
    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Validate the mapping, read the directory, shape the rows and write
    /// local artifacts.
    ///
    /// The mapping only depends on configuration, so it is checked first
    /// and an invalid one never leads to a remote call.
    #[instrument(skip(self))]
    pub async fn prepare(&self, selector: &Selector) -> Result<Prepared> {
        let Settings {
            request,
            property_map,
            strictness,
            output,
        } = &self.settings;

        let property_map = mapping::validate(
            property_map,
            &request.known_source_names(),
            *strictness,
        )?;

        let records = self
            .directory
            .list_users(selector, request)
            .await
            .map_err(|err| Error::directory("query failed", Some(err)))?;
        if records.is_empty() {
            return Err(Error::directory("no user returned", None));
        }

        let document = shaper::shape(&records, request);
        let report = RunReport {
            records_read: records.len(),
            rows_shaped: document.len(),
            rows_dropped: records.len() - document.len(),
        };
        if report.rows_dropped > 0 {
            warn!(
                rows_dropped = report.rows_dropped,
                identity = %request.identity_source(),
                "records without identity were skipped"
            );
        }
        if document.is_empty() {
            return Err(Error::directory("no usable records", None));
        }

        write_artifacts(&document, output)?;

        info!(
            records_read = report.records_read,
            rows_shaped = report.rows_shaped,
            rows_dropped = report.rows_dropped,
            "document shaped"
        );

        Ok(Prepared {
            document,
            property_map,
            report,
        })
    }

    /// Publish a prepared document.
    pub async fn publish(&self, prepared: &Prepared) -> Result<ImportJob> {
        let publisher = self
            .publisher
            .as_ref()
            .ok_or(Error::Config(ConfigError::MissingSection("publish")))?;
        publisher.publish(prepared).await
    }

    /// Run every stage and return the queued job.
    pub async fn run(
        &self,
        selector: &Selector,
    ) -> Result<(ImportJob, RunReport)> {
        let prepared = self.prepare(selector).await?;
        let job = self.publish(&prepared).await?;
        Ok((job, prepared.report))
    }
}

fn write_artifacts(document: &OutputDocument, output: &Output) -> Result<()> {
    if let Some(path) = &output.json_path {
        export::write_json(document, path).map_err(|source| Error::Artifact {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "JSON document written");
    }

    if let Some(path) = &output.csv_path {
        export::write_csv_file(document, &output.csv_fields, path).map_err(
            |source| Error::Artifact {
                path: path.clone(),
                source,
            },
        )?;
        info!(path = %path.display(), "CSV projection written");
    }

    Ok(())
}
