//! `multipart/form-data` body construction.
//!
//! Field syntax:
//! - `name=value` : literal text part
//! - `name=@path[;filename=X][;type=Y]` : file part read from `path`
//!
//! The `filename=` override is written into `Content-Disposition` exactly as
//! given. No quoting, no traversal sanitisation: `../../etc/passwd` goes on
//! the wire untouched so upload handlers can be tested against it.

use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::{ProbeError, ProbeResult};

/// Prefix of every generated boundary.
pub const BOUNDARY_PREFIX: &str = "----WireprobeFormBoundary";

/// One parsed form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        path: PathBuf,
        filename: String,
        content_type: String,
    },
}

impl FormField {
    /// Parse a `name=value` or `name=@path;filename=X;type=Y` spec.
    pub fn parse(spec: &str) -> ProbeResult<Self> {
        let (name, value) = spec.split_once('=').ok_or_else(|| {
            ProbeError::validation("form", format!("'{}' is not a name=value field", spec))
        })?;

        let Some(file_spec) = value.strip_prefix('@') else {
            return Ok(FormField::Text {
                name: name.to_string(),
                value: value.to_string(),
            });
        };

        let mut parts = file_spec.split(';');
        let path = parts.next().unwrap_or_default();
        if path.is_empty() {
            return Err(ProbeError::validation(
                "form",
                format!("file field '{}' has no path", name),
            ));
        }

        let mut filename = None;
        let mut content_type = None;
        for param in parts {
            match param.split_once('=') {
                Some(("filename", v)) => filename = Some(v.to_string()),
                Some(("type", v)) => content_type = Some(v.to_string()),
                _ => tracing::warn!(field = %name, param = %param, "Ignoring unknown file field parameter"),
            }
        }

        let path = PathBuf::from(path);
        Ok(FormField::File {
            name: name.to_string(),
            filename: filename.unwrap_or_else(|| default_filename(&path)),
            content_type: content_type.unwrap_or_else(|| guess_content_type(&path).to_string()),
            path,
        })
    }
}

/// An encoded multipart body.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    pub boundary: String,
    pub body: Vec<u8>,
}

impl MultipartBody {
    /// Value for the `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

/// Generate a boundary unlikely to collide with body content.
pub fn generate_boundary() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("{}{}", BOUNDARY_PREFIX, suffix)
}

/// Parse field specs, read referenced files and encode the body.
pub fn build(specs: &[String]) -> ProbeResult<MultipartBody> {
    let fields = specs
        .iter()
        .map(|s| FormField::parse(s))
        .collect::<ProbeResult<Vec<_>>>()?;
    let boundary = generate_boundary();
    let body = encode(&fields, &boundary)?;
    Ok(MultipartBody { boundary, body })
}

/// Encode already parsed fields with a fixed boundary.
pub fn encode(fields: &[FormField], boundary: &str) -> ProbeResult<Vec<u8>> {
    let mut body = Vec::new();

    for field in fields {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        match field {
            FormField::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            FormField::File {
                name,
                path,
                filename,
                content_type,
            } => {
                let contents = std::fs::read(path).map_err(|e| {
                    ProbeError::validation("form", format!("cannot read '{}': {}", path.display(), e))
                })?;
                tracing::debug!(field = %name, path = %path.display(), filename = %filename, bytes = contents.len(), "Attaching file");
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
                body.extend_from_slice(&contents);
            }
        }
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    Ok(body)
}

fn default_filename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "php" => "application/x-httpd-php",
        _ => "application/octet-stream",
    }
}
