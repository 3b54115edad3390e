//! Inbound request parsing and validation.
//!
//! Clients send either `multipart/form-data` (fields `prompt`, `language` and
//! one file per image field of the mode) or JSON with base64 images. Both
//! forms reduce to the same [`OptimizeRequest`] before any upstream call.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart};
use axum::http::{header, HeaderMap, Request};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::Deserialize;
use tower::{Layer as _, ServiceExt as _};

use crate::config::FeaturesConfig;
use crate::error::RelayError;
use crate::modes::ModeDescriptor;
use crate::protocol::canonical::{ImageAttachment, OptimizeRequest, OutputLanguage};

const DEFAULT_IMAGE_MIME: &str = "image/png";

#[derive(Debug, Default)]
struct RawRequest {
    prompt: Option<String>,
    language: Option<String>,
    images: Vec<RawImage>,
}

#[derive(Debug)]
struct RawImage {
    field: Option<String>,
    mime_type: Option<String>,
    data: Bytes,
}

#[derive(Debug, Deserialize)]
struct JsonRequest {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    images: Vec<JsonImage>,
}

#[derive(Debug, Deserialize)]
struct JsonImage {
    #[serde(default)]
    field: Option<String>,
    #[serde(default, alias = "mimeType")]
    mime_type: Option<String>,
    data: String,
}

/// Parse and validate an optimization request body for `descriptor`.
///
/// # Errors
///
/// Returns [`RelayError::InvalidRequest`] for any malformed or incomplete
/// input.
pub(crate) async fn parse_optimize_request(
    headers: &HeaderMap,
    body: Bytes,
    descriptor: &ModeDescriptor,
    features: &FeaturesConfig,
    body_limit: usize,
) -> Result<OptimizeRequest, RelayError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let raw = match mime.as_str() {
        "multipart/form-data" => read_multipart(content_type, body, descriptor, body_limit).await?,
        "" | "application/json" => read_json(&body)?,
        other => {
            return Err(RelayError::InvalidRequest(format!(
                "Unsupported content type '{other}': expected multipart/form-data or application/json"
            )))
        }
    };
    validate(raw, descriptor, features)
}

async fn read_multipart(
    content_type: &str,
    body: Bytes,
    descriptor: &ModeDescriptor,
    body_limit: usize,
) -> Result<RawRequest, RelayError> {
    let request = Request::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .map_err(|err| RelayError::Internal(format!("Failed to rebuild request: {err}")))?;

    // The body was already bounded on read; lift the extractor's 2 MiB default
    // to the configured limit.
    let extractor = tower::service_fn(|request: Request<Body>| async move {
        Ok::<_, Infallible>(Multipart::from_request(request, &()).await)
    });
    let mut multipart = match DefaultBodyLimit::max(body_limit)
        .layer(extractor)
        .oneshot(request)
        .await
    {
        Ok(extracted) => extracted.map_err(|rejection| {
            RelayError::InvalidRequest(format!("Invalid multipart body: {}", rejection.body_text()))
        })?,
        Err(never) => match never {},
    };

    let mut raw = RawRequest::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| RelayError::InvalidRequest(format!("Invalid multipart body: {}", err.body_text())))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        let mime_type = field.content_type().map(str::to_owned);
        let data = field.bytes().await.map_err(|err| {
            RelayError::InvalidRequest(format!("Invalid multipart field '{name}': {}", err.body_text()))
        })?;

        if name == "prompt" {
            raw.prompt = Some(String::from_utf8_lossy(&data).into_owned());
        } else if name == "language" {
            raw.language = Some(String::from_utf8_lossy(&data).into_owned());
        } else if descriptor.image_fields.contains(&name.as_str()) {
            raw.images.push(RawImage {
                field: Some(name),
                mime_type,
                data,
            });
        } else {
            tracing::debug!(field = %name, "ignoring unknown multipart field");
        }
    }
    Ok(raw)
}

fn read_json(body: &[u8]) -> Result<RawRequest, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RelayError::InvalidRequest("Request body is empty".into()));
    }
    let parsed: JsonRequest = serde_json::from_slice(body)
        .map_err(|err| RelayError::InvalidRequest(format!("Invalid JSON body: {err}")))?;

    let images = parsed
        .images
        .into_iter()
        .map(|image| {
            let (inline_mime, payload) = split_data_uri(&image.data);
            let data = STANDARD.decode(payload.trim()).map_err(|_| {
                RelayError::InvalidRequest("Image data must be base64 encoded".into())
            })?;
            Ok(RawImage {
                field: image.field,
                mime_type: image.mime_type.or(inline_mime),
                data: Bytes::from(data),
            })
        })
        .collect::<Result<Vec<_>, RelayError>>()?;

    Ok(RawRequest {
        prompt: parsed.prompt,
        language: parsed.language,
        images,
    })
}

/// `data:image/jpeg;base64,AAAA` -> (`Some("image/jpeg")`, `"AAAA"`).
fn split_data_uri(data: &str) -> (Option<String>, &str) {
    let Some(rest) = data.strip_prefix("data:") else {
        return (None, data);
    };
    match rest.split_once(";base64,") {
        Some((mime, payload)) if !mime.is_empty() => (Some(mime.to_string()), payload),
        Some((_, payload)) => (None, payload),
        None => (None, data),
    }
}

fn validate(
    raw: RawRequest,
    descriptor: &ModeDescriptor,
    features: &FeaturesConfig,
) -> Result<OptimizeRequest, RelayError> {
    let prompt = raw.prompt.as_deref().map(str::trim).unwrap_or("");
    if prompt.is_empty() {
        return Err(RelayError::InvalidRequest("prompt is required".into()));
    }

    let language = match raw.language.as_deref().map(str::trim) {
        None | Some("") => features.default_language,
        Some(code) => OutputLanguage::parse(code).ok_or_else(|| {
            RelayError::InvalidRequest(format!(
                "Unsupported language '{code}': expected en or zh"
            ))
        })?,
    };

    let fields = descriptor.image_fields;
    let mut slots: Vec<Option<RawImage>> = fields.iter().map(|_| None).collect();
    for image in raw.images {
        let index = match image.field.as_deref() {
            Some(name) => fields.iter().position(|field| *field == name).ok_or_else(|| {
                RelayError::InvalidRequest(format!(
                    "Unexpected image field '{name}' for {}",
                    descriptor.name
                ))
            })?,
            None => slots.iter().position(Option::is_none).ok_or_else(|| {
                RelayError::InvalidRequest(format!(
                    "Too many images: {} accepts {}",
                    descriptor.name,
                    fields.len()
                ))
            })?,
        };
        if slots[index].is_some() {
            return Err(RelayError::InvalidRequest(format!(
                "Duplicate image field '{}'",
                fields[index]
            )));
        }
        slots[index] = Some(image);
    }

    let mut images = Vec::with_capacity(fields.len());
    for (field, slot) in fields.iter().zip(slots) {
        let image = slot.ok_or_else(|| {
            RelayError::InvalidRequest(format!("Missing required image '{field}'"))
        })?;
        images.push(check_image(field, image, features.max_image_bytes)?);
    }

    Ok(OptimizeRequest {
        prompt: prompt.to_string(),
        language,
        images,
    })
}

fn check_image(field: &str, image: RawImage, max_bytes: usize) -> Result<ImageAttachment, RelayError> {
    if image.data.is_empty() {
        return Err(RelayError::InvalidRequest(format!("Image '{field}' is empty")));
    }
    if image.data.len() > max_bytes {
        return Err(RelayError::InvalidRequest(format!(
            "Image '{field}' exceeds the {max_bytes} byte limit"
        )));
    }
    let mime_type = match image.mime_type.as_deref().map(str::trim) {
        None | Some("") | Some("application/octet-stream") => DEFAULT_IMAGE_MIME.to_string(),
        Some(mime) if mime.to_ascii_lowercase().starts_with("image/") => mime.to_ascii_lowercase(),
        Some(mime) => {
            return Err(RelayError::InvalidRequest(format!(
                "Image '{field}' has unsupported type '{mime}'"
            )))
        }
    };
    Ok(ImageAttachment {
        field: field.to_string(),
        mime_type,
        data: image.data,
    })
}
