//! Normalizes uploads, ZIP archives and cloned repositories into uniform
//! `(path, content, type)` project files.

mod archive;
pub mod filter;
mod github;
mod upload;

use resilience::FetchError;
use thiserror::Error;

pub use archive::extract_zip;
pub use github::{RepoCloner, RepoRef, parse_repo_url};
pub use upload::{NormalizedUpload, UploadedFile, is_zip, normalize_upload, normalize_uploads};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("invalid base64 content for {name}")]
    InvalidBase64 { name: String },

    #[error("invalid GitHub repository URL: {0}")]
    InvalidRepoUrl(String),

    #[error("GitHub returned {status} for {path}")]
    UpstreamStatus { status: u16, path: String },

    #[error("{0} is not a UTF-8 text file")]
    NotText(String),

    #[error("GitHub request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IngestError {
    pub fn http_status(&self) -> u16 {
        match self {
            IngestError::Zip(_) | IngestError::InvalidBase64 { .. } | IngestError::InvalidRepoUrl(_) => {
                400
            }
            IngestError::UpstreamStatus { .. }
            | IngestError::NotText(_)
            | IngestError::Fetch(_)
            | IngestError::Http(_) => 502,
            IngestError::Join(_) => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Zip(_) => "invalid_archive",
            IngestError::InvalidBase64 { .. } => "invalid_upload",
            IngestError::InvalidRepoUrl(_) => "invalid_repo_url",
            IngestError::UpstreamStatus { .. } => "upstream_status",
            IngestError::NotText(_) => "not_text",
            IngestError::Fetch(_) | IngestError::Http(_) => "transport",
            IngestError::Join(_) => "internal",
        }
    }
}
