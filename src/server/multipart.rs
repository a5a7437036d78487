//! Multipart form reader for upload requests

use std::error::Error as StdError;

use futures::TryStreamExt;
use http_body_util::{BodyStream, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use multer::Multipart;

use crate::config::DEFAULT_MAX_RETRIES;
use crate::upload::{UploadError, UploadRequest};

/// Form field carrying the file
pub const FIELD_FILE: &str = "file";

/// Form field carrying the presigned URL
pub const FIELD_UPLOAD_URL: &str = "uploadUrl";

/// Form field carrying the retry budget
pub const FIELD_MAX_RETRIES: &str = "max_retries";

/// The uploaded file part
#[derive(Debug, Clone)]
pub struct FilePart {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Fields of an upload form as sent by the client
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub file: Option<FilePart>,
    pub upload_url: Option<String>,
    pub max_retries: Option<String>,
}

impl UploadForm {
    /// Turn the form into an upload request.
    ///
    /// `fixed_retries` overrides whatever `max_retries` the client sent.
    pub fn into_request(self, fixed_retries: Option<u32>) -> Result<UploadRequest, UploadError> {
        let file = self.file.ok_or(UploadError::MissingFile)?;

        let upload_url = self
            .upload_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or(UploadError::MissingUploadUrl)?;

        let max_retries = match fixed_retries {
            Some(n) => n,
            None => parse_max_retries(self.max_retries.as_deref())?,
        };

        Ok(UploadRequest::new(file.data, upload_url)
            .with_content_type(file.content_type)
            .with_filename(file.filename)
            .with_max_retries(max_retries))
    }
}

/// Parse the optional `max_retries` field; absent or blank means the default
pub fn parse_max_retries(value: Option<&str>) -> Result<u32, UploadError> {
    match value.map(str::trim) {
        None | Some("") => Ok(DEFAULT_MAX_RETRIES),
        Some(v) => v
            .parse::<u32>()
            .map_err(|_| UploadError::InvalidMaxRetries(v.to_string())),
    }
}

/// Read a `multipart/form-data` body of at most `max_body_bytes` bytes
pub async fn read_upload_form<B>(
    content_type: Option<&str>,
    body: B,
    max_body_bytes: usize,
) -> Result<UploadForm, UploadError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let content_type = content_type
        .ok_or_else(|| UploadError::MalformedForm("missing Content-Type header".to_string()))?;
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| UploadError::MalformedForm(e.to_string()))?;

    let stream = BodyStream::new(Limited::new(body, max_body_bytes))
        .try_filter_map(|frame| async move { Ok(frame.into_data().ok()) });
    let mut multipart = Multipart::new(stream, boundary);

    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| map_multer_error(e, max_body_bytes))?
    {
        match field.name() {
            Some(FIELD_FILE) => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(|m| m.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| map_multer_error(e, max_body_bytes))?;
                form.file = Some(FilePart {
                    filename,
                    content_type,
                    data,
                });
            }
            Some(FIELD_UPLOAD_URL) => {
                form.upload_url = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| map_multer_error(e, max_body_bytes))?,
                );
            }
            Some(FIELD_MAX_RETRIES) => {
                form.max_retries = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| map_multer_error(e, max_body_bytes))?,
                );
            }
            // Unknown fields are skipped by the next `next_field` call
            _ => {}
        }
    }

    Ok(form)
}

fn map_multer_error(err: multer::Error, max_body_bytes: usize) -> UploadError {
    if let multer::Error::StreamReadFailed(source) = &err {
        if source.is::<LengthLimitError>() {
            return UploadError::BodyTooLarge(max_body_bytes);
        }
    }
    UploadError::MalformedForm(err.to_string())
}
