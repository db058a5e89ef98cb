//! Artifact receiver: multipart parsing and upload persistence.
//!
//! The whole form is read into memory first (the router caps the body at
//! `max_upload_bytes`), so the request is validated before anything touches
//! the upload directory.

use std::io::ErrorKind;
use std::path::PathBuf;

use axum::extract::Multipart;
use bytes::Bytes;
use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::validator::DeployRequest;
use crate::errors::DeployError;

/// Multipart field carrying the artifact.
pub const FILE_FIELD: &str = "file";

/// Used when a client-supplied filename has no usable final component.
const FALLBACK_FILE_NAME: &str = "upload";

/// Re-stamp attempts when two uploads land on the same nanosecond.
const MAX_NAME_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Filename exactly as the client sent it.
    pub file_name: String,
    pub data: Bytes,
}

#[derive(Debug, Default)]
pub struct DeployForm {
    pub request: DeployRequest,
    pub file: Option<UploadedFile>,
}

/// Read every field of a deploy form.
///
/// Unknown fields are skipped. For repeated fields the first value wins.
pub async fn read_form(mut multipart: Multipart) -> Result<DeployForm, DeployError> {
    let mut form = DeployForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DeployError::BadUpload(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let slot = match name.as_str() {
            FILE_FIELD => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| DeployError::BadUpload(e.to_string()))?;
                // An empty filename is what browsers send for "no file chosen".
                if !file_name.is_empty() && form.file.is_none() {
                    form.file = Some(UploadedFile { file_name, data });
                }
                continue;
            }
            "code" => &mut form.request.code,
            "timestamp" => &mut form.request.timestamp,
            "sign" => &mut form.request.signature,
            _ => continue,
        };

        let value = field
            .text()
            .await
            .map_err(|e| DeployError::BadUpload(e.to_string()))?;
        if slot.is_empty() {
            *slot = value;
        }
    }

    Ok(form)
}

/// Reduce a client filename to its final path element.
///
/// Both `/` and `\` count as separators so Windows-style paths are handled
/// too. Names that reduce to nothing, `.` or `..` become `upload`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    match base {
        "" | "." | ".." => FALLBACK_FILE_NAME.to_string(),
        other => other.to_string(),
    }
}

/// Writes uploaded artifacts into the upload directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist `file` as `{dir}/{nanos}_{sanitized name}` and return its path.
    ///
    /// Files are opened create-new, so an existing artifact is never
    /// overwritten. A partially written file is removed on failure.
    pub async fn store(&self, file: &UploadedFile) -> Result<PathBuf, DeployError> {
        let name = sanitize_file_name(&file.file_name);
        let mut attempt = 0;

        let (path, mut out) = loop {
            let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
            let path = self.dir.join(format!("{}_{}", nanos, name));
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(out) => break (path, out),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    attempt += 1;
                    tokio::task::yield_now().await;
                }
                Err(source) => return Err(DeployError::StorageError { path, source }),
            }
        };

        let written = async {
            out.write_all(&file.data).await?;
            out.flush().await?;
            out.sync_all().await
        }
        .await;

        if let Err(source) = written {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove partial upload");
            }
            return Err(DeployError::StorageError { path, source });
        }

        tracing::debug!(path = %path.display(), bytes = file.data.len(), "stored artifact");
        Ok(path)
    }
}
