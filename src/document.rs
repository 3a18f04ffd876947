//! Uploaded document handling.
//!
//! A [`Document`] only exists once an [`Upload`] passes validation: the declared MIME type must
//! be exactly `application/pdf` and the payload may not exceed [`MAX_UPLOAD_BYTES`]. The raw
//! bytes are base64-encoded once at acceptance so every backend request can inline them.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// The only MIME type accepted for uploads.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Upper bound on upload size (10 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Reasons an upload is refused. The display text is shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// Declared MIME type is not PDF.
    #[error("Please upload a PDF file.")]
    UnsupportedType {
        /// MIME type that was declared for the rejected file.
        mime_type: String,
    },
    /// Payload exceeds the upload cap.
    #[error("File is too large (Max 10MB).")]
    TooLarge {
        /// Size of the rejected payload in bytes.
        size: u64,
    },
    /// File name was blank.
    #[error("Uploaded file must have a name.")]
    MissingName,
    /// File could not be read from disk.
    #[error("Failed to read {path}: {message}")]
    Unreadable {
        /// Path that failed to load.
        path: String,
        /// Underlying I/O error message.
        message: String,
    },
}

/// A file offered for upload, before validation.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original file name, e.g. `spec.pdf`.
    pub name: String,
    /// MIME type declared by the client.
    pub mime_type: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Build an upload, guessing the MIME type from the file name when none was declared.
    pub fn new(name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = mime_type
            .map(|value| essence(&value).to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| guess_mime(&name));
        Self {
            name,
            mime_type,
            bytes,
        }
    }

    /// Read an upload from the local filesystem.
    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| UploadError::Unreadable {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, None, bytes))
    }

    /// Validate the upload and turn it into a [`Document`].
    pub fn validate(self) -> Result<Document, UploadError> {
        if self.name.trim().is_empty() {
            return Err(UploadError::MissingName);
        }
        if self.mime_type != PDF_MIME_TYPE {
            return Err(UploadError::UnsupportedType {
                mime_type: self.mime_type,
            });
        }
        let size = self.bytes.len() as u64;
        if size > MAX_UPLOAD_BYTES {
            return Err(UploadError::TooLarge { size });
        }

        Ok(Document {
            name: self.name,
            mime_type: self.mime_type,
            size,
            content_base64: BASE64_STANDARD.encode(&self.bytes),
        })
    }
}

/// A validated, immutable document owned by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    name: String,
    mime_type: String,
    size: u64,
    content_base64: String,
}

impl Document {
    /// File name as uploaded.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared MIME type (always PDF).
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Size of the raw payload in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Base64 encoding of the raw payload, ready for inline transport.
    pub fn content_base64(&self) -> &str {
        &self.content_base64
    }

    /// File name up to its first `.`, or the whole name when that part is empty.
    pub fn stem(&self) -> &str {
        self.name
            .split('.')
            .next()
            .filter(|stem| !stem.is_empty())
            .unwrap_or(&self.name)
    }

    /// Serializable summary without the payload.
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
            size_mb: format!("{:.2}", self.size as f64 / 1024.0 / 1024.0),
        }
    }
}

/// Document metadata exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    /// File name as uploaded.
    pub name: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Size in mebibytes with two decimals.
    pub size_mb: String,
}

fn essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or_default().trim()
}

fn guess_mime(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}
