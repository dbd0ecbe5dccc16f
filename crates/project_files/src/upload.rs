use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use core_types::{Attachment, ProjectFile, ProjectFileSet, new_id};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::IngestError;
use crate::archive::extract_zip;
use crate::filter::{file_type, is_text_like};

/// A file as posted by the browser, content base64-encoded.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub name: String,
    #[serde(alias = "type", default)]
    pub mime_type: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedUpload {
    pub attachments: Vec<Attachment>,
    pub project_files: Vec<ProjectFile>,
}

pub fn is_zip(name: &str, mime_type: &str) -> bool {
    matches!(mime_type, "application/zip" | "application/x-zip-compressed")
        || name.to_ascii_lowercase().ends_with(".zip")
}

/// Turns one upload into its attachment and any project files it yields.
pub async fn normalize_upload(
    name: &str,
    mime_type: &str,
    bytes: Vec<u8>,
) -> Result<NormalizedUpload, IngestError> {
    let size_bytes = bytes.len() as u64;

    if is_zip(name, mime_type) {
        let project_files = extract_zip(bytes).await?;
        info!(name, files = project_files.len(), "zip upload normalized");
        let attachment = Attachment {
            id: new_id(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size_bytes,
            content: None,
            is_zip: true,
            file_count: Some(project_files.len() as u64),
        };
        return Ok(NormalizedUpload {
            attachments: vec![attachment],
            project_files,
        });
    }

    let mut project_files = Vec::new();
    if is_text_like(name, mime_type) {
        match std::str::from_utf8(&bytes) {
            Ok(text) => project_files.push(ProjectFile::new(name, text, file_type(name))),
            Err(_) => debug!(name, reason = "not_utf8", "upload kept as attachment only"),
        }
    }

    let attachment = Attachment {
        id: new_id(),
        name: name.to_string(),
        mime_type: mime_type.to_string(),
        size_bytes,
        content: Some(STANDARD.encode(&bytes)),
        is_zip: false,
        file_count: None,
    };
    Ok(NormalizedUpload {
        attachments: vec![attachment],
        project_files,
    })
}

/// Normalizes a batch; project files from later uploads replace earlier ones
/// with the same path.
pub async fn normalize_uploads(files: Vec<UploadedFile>) -> Result<NormalizedUpload, IngestError> {
    let mut attachments = Vec::with_capacity(files.len());
    let mut project_files = ProjectFileSet::new();

    for file in files {
        let bytes = STANDARD
            .decode(strip_data_url(&file.content))
            .map_err(|_| IngestError::InvalidBase64 {
                name: file.name.clone(),
            })?;
        let normalized = normalize_upload(&file.name, &file.mime_type, bytes).await?;
        attachments.extend(normalized.attachments);
        project_files.extend(normalized.project_files);
    }

    Ok(NormalizedUpload {
        attachments,
        project_files: project_files.into_vec(),
    })
}

/// Browsers hand out `data:<mime>;base64,<payload>` URLs; accept those too.
fn strip_data_url(content: &str) -> &str {
    match content.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => content.trim(),
    }
}
