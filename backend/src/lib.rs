use futures::TryStreamExt;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::ApiError;

pub mod analysis;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod gc;
pub mod jobs;
pub mod models;
pub mod rank;
pub mod schema;
pub mod service;
pub mod storage;

pub const UPLOAD_FIELD: &str = "file";

/// An upload that passed the cheap checks and was written to a temporary file.
#[derive(Debug)]
pub struct SpooledDemo {
    pub file: tempfile::NamedTempFile,
    pub filename: String,
    /// Hex encoded sha256 of the content.
    pub digest: String,
    pub size: u64,
}

pub fn has_demo_extension(filename: &str) -> bool {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("dem"))
        .unwrap_or(false)
}

/// Streams the `file` field of a multipart form into a spool file.
///
/// Rejects the upload as soon as the extension, the size or the header
/// prefix give it away, before anything is handed to the pipeline.
#[tracing::instrument(skip(form, settings))]
pub async fn spool_upload(
    mut form: axum::extract::Multipart,
    settings: &service::Settings,
) -> Result<SpooledDemo, ApiError> {
    while let Some(field) = form
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("reading form: {}", e)))?
    {
        if field.name().map(|n| n != UPLOAD_FIELD).unwrap_or(true) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_owned();
        if !has_demo_extension(&filename) {
            return Err(ApiError::Validation(format!(
                "expected a .dem file, got {:?}",
                filename
            )));
        }

        // Convert the stream into an `AsyncRead`.
        let body_with_io_error = field.map_err(std::io::Error::other);
        let body_reader = tokio_util::io::StreamReader::new(body_with_io_error);
        futures::pin_mut!(body_reader);

        return spool(body_reader, filename, settings).await;
    }

    Err(ApiError::Validation(format!(
        "missing form field {:?}",
        UPLOAD_FIELD
    )))
}

async fn spool<R>(
    mut reader: R,
    filename: String,
    settings: &service::Settings,
) -> Result<SpooledDemo, ApiError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let internal = |e: std::io::Error| ApiError::Internal(format!("spooling upload: {}", e));

    let spool = match settings.spool_dir.as_ref() {
        Some(dir) => tempfile::Builder::new()
            .prefix("demo-")
            .suffix(".dem")
            .tempfile_in(dir),
        None => tempfile::Builder::new()
            .prefix("demo-")
            .suffix(".dem")
            .tempfile(),
    }
    .map_err(internal)?;
    let mut file = tokio::io::BufWriter::new(tokio::fs::File::from_std(
        spool.as_file().try_clone().map_err(internal)?,
    ));

    let mut hasher = Sha256::new();
    let mut prefix = Vec::with_capacity(::analysis::frame::PREFIX_LEN);
    let mut size: u64 = 0;
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let read = reader
            .read(&mut buf)
            .await
            .map_err(|e| ApiError::Validation(format!("reading upload: {}", e)))?;
        if read == 0 {
            break;
        }
        let chunk = &buf[..read];

        size += read as u64;
        if size > settings.max_upload_bytes {
            return Err(ApiError::Validation(format!(
                "upload exceeds {} bytes",
                settings.max_upload_bytes
            )));
        }

        if prefix.len() < ::analysis::frame::PREFIX_LEN {
            let missing = ::analysis::frame::PREFIX_LEN - prefix.len();
            prefix.extend_from_slice(&chunk[..missing.min(chunk.len())]);
            if prefix.len() == ::analysis::frame::PREFIX_LEN {
                ::analysis::frame::Header::check_prefix(&prefix)?;
            }
        }

        hasher.update(chunk);
        file.write_all(chunk).await.map_err(internal)?;
    }

    if size == 0 {
        return Err(ApiError::Validation("upload is empty".to_owned()));
    }
    if prefix.len() < ::analysis::frame::PREFIX_LEN {
        ::analysis::frame::Header::check_prefix(&prefix)?;
    }

    file.flush().await.map_err(internal)?;

    let digest = hex::encode(hasher.finalize());
    tracing::debug!(size, %digest, "Spooled upload");

    Ok(SpooledDemo {
        file: spool,
        filename,
        digest,
        size,
    })
}
