//! Error handler for propsync.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::export::ExportError;
use crate::mapping::MappingError;
use crate::shaper::ShapeError;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of a pipeline run, one variant per stage.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid property map: {0}")]
    Mapping(#[from] MappingError),

    #[error("cannot shape directory records: {0}")]
    Shape(#[from] ShapeError),

    #[error("directory unavailable, {details}")]
    DirectoryUnavailable {
        details: String,
        #[source]
        source: Option<ServiceError>,
    },

    #[error("cannot write artifact `{}`: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: ExportError,
    },

    #[error("document upload failed: {0}")]
    UploadFailure(#[source] ServiceError),

    #[error("import submission failed: {0}")]
    ImportSubmissionFailure(#[source] ServiceError),
}

impl Error {
    /// Name of the stage which produced the error.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Config(_) => "configuration",
            Error::Mapping(_) => "mapping",
            Error::Shape(_) => "shaping",
            Error::DirectoryUnavailable { .. } => "directory",
            Error::Artifact { .. } => "artifact",
            Error::UploadFailure(_) => "upload",
            Error::ImportSubmissionFailure(_) => "import",
        }
    }

    pub(crate) fn directory(
        details: impl Into<String>,
        source: Option<ServiceError>,
    ) -> Self {
        Self::DirectoryUnavailable {
            details: details.into(),
            source,
        }
    }
}

/// Errors returned by remote collaborators (directory, file store, import
/// queue, token endpoint).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LDAP request failed: {0}")]
    Ldap(#[from] ldap3::LdapError),

    #[error("remote service answered {code}: {message}")]
    Api { code: String, message: String },

    #[error("token acquisition failed: {0}")]
    Auth(String),

    #[error("invalid response payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL is invalid: {0}")]
    Url(#[from] url::ParseError),

    #[error("unexpected response, {0}")]
    Response(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        let err = Error::directory("no usable records", None);
        assert_eq!(err.stage(), "directory");
        assert_eq!(err.to_string(), "directory unavailable, no usable records");

        let err = Error::ImportSubmissionFailure(ServiceError::Api {
            code: "400 Bad Request".into(),
            message: "Invalid source URI".into(),
        });
        assert_eq!(err.stage(), "import");
        assert!(err.to_string().contains("Invalid source URI"));
    }
}
