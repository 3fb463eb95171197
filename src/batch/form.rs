//! Decoded multipart upload forms.
//!
//! The whole form is read up front: the resolver needs every text field
//! before it can decide where any file goes, and clients send metadata
//! fields before and after the files.

use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use bytes::Bytes;
use tracing::debug;

use crate::error::RequestError;

/// Field names that carry upload payloads, in lookup order.
pub const FILE_FIELDS: [&str; 3] = ["files", "file", "binary"];

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Form field the file was sent under
    pub field_name: String,

    /// Filename supplied by the client (may be empty)
    pub file_name: String,

    /// `Content-Type` of the part, if sent
    pub content_type: Option<String>,

    pub data: Bytes,
}

/// A fully decoded `multipart/form-data` body.
///
/// Text fields keep every value in submission order, so repeated fields
/// (`path`, `id`, `fileId`) can be read as lists.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
}

impl UploadForm {
    /// Create an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Add a file part.
    pub fn with_file(
        mut self,
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<&str>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.files.push(FilePart {
            field_name: field_name.into(),
            file_name: file_name.into(),
            content_type: content_type.map(|s| s.to_string()),
            data: data.into(),
        });
        self
    }

    /// Read every part of a multipart body.
    ///
    /// Parts with a filename are files; everything else is a text field.
    pub async fn read(
        multipart: Result<Multipart, MultipartRejection>,
    ) -> Result<Self, RequestError> {
        let mut multipart = multipart.map_err(|e| {
            debug!(error = %e, "Rejected non-multipart request");
            RequestError::NotMultipart
        })?;

        let mut form = Self::new();
        while let Some(field) = multipart.next_field().await.map_err(invalid)? {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(|s| s.to_string()) {
                Some(file_name) => {
                    let content_type = field.content_type().map(|s| s.to_string());
                    let data = field.bytes().await.map_err(invalid)?;
                    form.files.push(FilePart {
                        field_name: name,
                        file_name,
                        content_type,
                        data,
                    });
                }
                None => {
                    let value = field.text().await.map_err(invalid)?;
                    form.fields.push((name, value));
                }
            }
        }

        debug!(
            fields = form.fields.len(),
            files = form.files.len(),
            "Decoded multipart form"
        );
        Ok(form)
    }

    /// First value of a text field, trimmed. Blank values count as missing.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Every value of a text field, trimmed, blank values dropped.
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// Every text field in submission order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Files sent under `name`.
    pub fn files_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FilePart> + 'a {
        self.files.iter().filter(move |f| f.field_name == name)
    }

    /// The files to upload: the first of `files`, `file`, `binary` that has any.
    pub fn upload_parts(&self) -> Vec<&FilePart> {
        FILE_FIELDS
            .iter()
            .map(|name| self.files_named(name).collect::<Vec<_>>())
            .find(|parts| !parts.is_empty())
            .unwrap_or_default()
    }

    /// Take ownership of the upload parts, in submission order.
    pub fn into_upload_parts(self) -> Vec<FilePart> {
        let Some(field) = FILE_FIELDS
            .iter()
            .find(|name| self.files.iter().any(|f| f.field_name == **name))
        else {
            return Vec::new();
        };

        self.files
            .into_iter()
            .filter(|f| f.field_name == *field)
            .collect()
    }
}

fn invalid(e: MultipartError) -> RequestError {
    RequestError::InvalidMultipart(e.body_text())
}
