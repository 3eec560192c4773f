//! Attachment resolution and the S3-style multipart upload.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use tracing::debug;
use uuid::Uuid;

use perplexity_protocol::UploadTicket;

use crate::error::{ClientError, Result};

/// Extension/MIME pairs the backend accepts.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("pdf", "application/pdf"),
    ("jpg", "image/jpeg"),
    ("png", "image/png"),
];

fn content_type_for(extension: &str) -> Option<&'static str> {
    CONTENT_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

fn extension_for(mime: &str) -> Option<&'static str> {
    CONTENT_TYPES
        .iter()
        .find(|(_, m)| *m == mime)
        .map(|(ext, _)| *ext)
}

/// An attachment with its bytes in hand, ready for the ticket request.
#[derive(Debug)]
pub(crate) struct ResolvedAttachment {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Fetch/read/decode an attachment source into bytes.
///
/// Accepts an `http(s)` URL, a `data:` URI with base64 payload, or a local
/// file path.
pub(crate) async fn resolve_attachment(
    http: &reqwest::Client,
    source: &str,
) -> Result<ResolvedAttachment> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let extension = extension_of(source)?;
        let content_type = require_content_type(extension)?;
        let bytes = http.get(source).send().await?.bytes().await?.to_vec();
        return Ok(ResolvedAttachment {
            filename: source.to_owned(),
            content_type,
            bytes,
        });
    }

    if let Some(rest) = source.strip_prefix("data:") {
        let mime = rest.split(';').next().unwrap_or_default();
        let extension = extension_for(mime).ok_or_else(|| ClientError::UnsupportedAttachment {
            extension: mime.to_owned(),
        })?;
        let payload = rest
            .split_once("base64,")
            .map(|(_, tail)| tail)
            .ok_or_else(|| ClientError::InvalidAttachment {
                message: "data URI without base64 payload".to_owned(),
            })?;
        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| ClientError::InvalidAttachment {
                message: format!("bad base64 payload: {e}"),
            })?;
        return Ok(ResolvedAttachment {
            filename: format!("{}.{extension}", Uuid::new_v4()),
            content_type: content_type_for(extension).unwrap_or("text/plain"),
            bytes,
        });
    }

    let extension = extension_of(source)?;
    let content_type = require_content_type(extension)?;
    let bytes = tokio::fs::read(source).await?;
    Ok(ResolvedAttachment {
        filename: source.to_owned(),
        content_type,
        bytes,
    })
}

fn extension_of(source: &str) -> Result<&str> {
    source
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .ok_or_else(|| ClientError::InvalidAttachment {
            message: format!("no file extension in {source:?}"),
        })
}

fn require_content_type(extension: &str) -> Result<&'static str> {
    content_type_for(extension).ok_or_else(|| ClientError::UnsupportedAttachment {
        extension: extension.to_owned(),
    })
}

/// POST the attachment to the ticketed URL; returns the hosted file URL.
pub(crate) async fn perform_upload(
    http: &reqwest::Client,
    ticket: &UploadTicket,
    attachment: ResolvedAttachment,
) -> Result<String> {
    if ticket.rate_limited {
        return Err(ClientError::RateLimited);
    }

    let mut form = Form::new();
    for (name, value) in &ticket.fields {
        form = form.text(name.clone(), value.clone());
    }
    let part = Part::bytes(attachment.bytes)
        .file_name(attachment.filename)
        .mime_str(attachment.content_type)?;
    form = form.part("file", part);

    let response: serde_json::Value = http
        .post(&ticket.url)
        .multipart(form)
        .send()
        .await?
        .json()
        .await?;
    debug!(url = %ticket.url, "upload completed");
    response
        .get("secure_url")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ClientError::UploadFailed {
            message: "upload response without secure_url".to_owned(),
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
