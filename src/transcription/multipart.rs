use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::error::TranscriptionError;

const LINE_FEED: &[u8] = b"\r\n";
const BOUNDARY_PREFIX: &str = "----NotescribeBoundary";

#[derive(Debug, Clone)]
pub struct FilePart {
    pub field_name: String,
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl FilePart {
    pub fn new(
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Bytes,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// Builds a `multipart/form-data` body byte for byte.
///
/// Fields are emitted in insertion order, followed by the single file part.
#[derive(Debug, Clone)]
pub struct MultipartEncoder {
    boundary: String,
    fields: Vec<(String, String)>,
    file: Option<FilePart>,
}

impl Default for MultipartEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartEncoder {
    pub fn new() -> Self {
        Self::with_boundary(format!("{}{}", BOUNDARY_PREFIX, Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            fields: Vec::new(),
            file: None,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Replaces any previously set file part.
    pub fn set_file(&mut self, file: FilePart) -> &mut Self {
        self.file = Some(file);
        self
    }

    pub fn encode(&self) -> Result<Bytes, TranscriptionError> {
        self.check_boundary_collisions()?;

        let file_len = self.file.as_ref().map_or(0, |file| file.data.len());
        let mut body = BytesMut::with_capacity(file_len + 256 * (self.fields.len() + 2));

        for (name, value) in &self.fields {
            self.put_delimiter(&mut body);
            body.put_slice(
                format!("Content-Disposition: form-data; name=\"{}\"", name).as_bytes(),
            );
            body.put_slice(LINE_FEED);
            body.put_slice(LINE_FEED);
            body.put_slice(value.as_bytes());
            body.put_slice(LINE_FEED);
        }

        if let Some(file) = &self.file {
            self.put_delimiter(&mut body);
            body.put_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"",
                    file.field_name, file.file_name
                )
                .as_bytes(),
            );
            body.put_slice(LINE_FEED);
            body.put_slice(format!("Content-Type: {}", file.mime_type).as_bytes());
            body.put_slice(LINE_FEED);
            body.put_slice(LINE_FEED);
            body.put_slice(&file.data);
            body.put_slice(LINE_FEED);
        }

        body.put_slice(b"--");
        body.put_slice(self.boundary.as_bytes());
        body.put_slice(b"--");
        body.put_slice(LINE_FEED);

        Ok(body.freeze())
    }

    fn put_delimiter(&self, body: &mut BytesMut) {
        body.put_slice(b"--");
        body.put_slice(self.boundary.as_bytes());
        body.put_slice(LINE_FEED);
    }

    fn check_boundary_collisions(&self) -> Result<(), TranscriptionError> {
        let needle = self.boundary.as_bytes();
        let collides = |haystack: &[u8]| contains(haystack, needle);

        for (name, value) in &self.fields {
            if collides(name.as_bytes()) || collides(value.as_bytes()) {
                return Err(TranscriptionError::InvalidRequest(format!(
                    "form field '{}' contains the multipart boundary",
                    name
                )));
            }
        }

        if let Some(file) = &self.file {
            if collides(file.file_name.as_bytes()) || collides(&file.data) {
                return Err(TranscriptionError::InvalidRequest(format!(
                    "file part '{}' contains the multipart boundary",
                    file.file_name
                )));
            }
        }

        Ok(())
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|window| window == needle)
}
