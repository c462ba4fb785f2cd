use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::blocking::{multipart, Client, Response};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::canvas::export::{MASK_FILE_NAME, MASK_MEDIA_TYPE};
use crate::canvas::SampledColor;
use crate::history::artifact::sniff_media_type;
use crate::history::Artifact;
use crate::refine::metrics::{ColorizeMetrics, RefineMetrics};
use crate::settings::ServiceSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl SourceImage {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let media_type = sniff_media_type(&bytes);
        Self {
            file_name: file_name.into(),
            media_type,
            bytes: Arc::from(bytes),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, std::io::Error> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("image.jpg")
            .to_string();
        Ok(Self::new(file_name, bytes))
    }
}

#[derive(Debug, Clone)]
pub struct ColorizeRequest {
    pub original: SourceImage,
}

#[derive(Debug, Clone)]
pub struct RefineRequest {
    pub original: SourceImage,
    pub mask_png: Vec<u8>,
    pub base: Arc<Artifact>,
    pub target_color: Option<SampledColor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceImage {
    pub bytes: Vec<u8>,
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorizeResponse {
    pub image: ServiceImage,
    pub metrics: ColorizeMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefineResponse {
    pub image: ServiceImage,
    pub metrics: RefineMetrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceStatus {
    pub message: String,
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("http client init failed: {0}")]
    ClientInit(String),
    #[error("invalid mime '{mime}': {message}")]
    InvalidMime { mime: String, message: String },
    #[error("request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("service rejected the request: {0}")]
    Rejected(String),
    #[error("response decode failed: {0}")]
    Decode(String),
    #[error("service returned no image payload")]
    MissingImage,
}

pub trait ColorizationService: Send + Sync + 'static {
    fn colorize(&self, request: &ColorizeRequest) -> Result<ColorizeResponse, ServiceError>;
    fn refine(&self, request: &RefineRequest) -> Result<RefineResponse, ServiceError>;
    fn status(&self) -> Result<ServiceStatus, ServiceError>;
}

pub type SharedColorizationService = Arc<dyn ColorizationService>;

#[derive(Debug, Clone)]
pub struct HttpColorizationService {
    settings: ServiceSettings,
}

impl HttpColorizationService {
    pub fn new(settings: ServiceSettings) -> Self {
        Self { settings }
    }

    fn client(&self) -> Result<Client, ServiceError> {
        Client::builder()
            .timeout(self.settings.timeout)
            .build()
            .map_err(|e| ServiceError::ClientInit(e.to_string()))
    }

    fn post(&self, path: &str, form: multipart::Form) -> Result<Response, ServiceError> {
        let endpoint = self.settings.endpoint(path);
        let resp = self
            .client()?
            .post(endpoint.as_str())
            .multipart(form)
            .send()
            .map_err(|e| transport_error(endpoint.as_str(), e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

impl ColorizationService for HttpColorizationService {
    fn colorize(&self, request: &ColorizeRequest) -> Result<ColorizeResponse, ServiceError> {
        let form = multipart::Form::new().part("file", source_part(&request.original)?);
        let resp = self.post("colorize", form)?;
        let (image, metrics) = read_image_response::<ColorizeMetrics>(resp)?;
        Ok(ColorizeResponse { image, metrics })
    }

    fn refine(&self, request: &RefineRequest) -> Result<RefineResponse, ServiceError> {
        let mut form = multipart::Form::new()
            .part("file", source_part(&request.original)?)
            .part(
                "mask",
                bytes_part(request.mask_png.clone(), MASK_FILE_NAME, MASK_MEDIA_TYPE)?,
            )
            .part(
                "base",
                bytes_part(
                    request.base.bytes().to_vec(),
                    request.base.file_name().as_str(),
                    request.base.media_type(),
                )?,
            );
        if let Some(color) = request.target_color {
            form = form.text("target_color", color.to_hex());
        }
        let resp = self.post("refine", form)?;
        let (image, metrics) = read_image_response::<RefineMetrics>(resp)?;
        Ok(RefineResponse { image, metrics })
    }

    fn status(&self) -> Result<ServiceStatus, ServiceError> {
        let endpoint = self.settings.endpoint("");
        let resp = self
            .client()?
            .get(endpoint.as_str())
            .send()
            .map_err(|e| transport_error(endpoint.as_str(), e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<ServiceStatus>()
            .map_err(|e| ServiceError::Decode(format!("status JSON: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct ImageEnvelope<M> {
    #[serde(default, alias = "image_base64")]
    image: Option<String>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default = "Option::default")]
    metrics: Option<M>,
}

fn read_image_response<M>(resp: Response) -> Result<(ServiceImage, M), ServiceError>
where
    M: DeserializeOwned + Default,
{
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase());
    let body = resp
        .bytes()
        .map_err(|e| ServiceError::Decode(format!("HTTP body read failed: {e}")))?;

    if let Some(mime) = content_type.filter(|v| v.starts_with("image/")) {
        if body.is_empty() {
            return Err(ServiceError::MissingImage);
        }
        return Ok((
            ServiceImage {
                bytes: body.to_vec(),
                media_type: Some(mime),
            },
            M::default(),
        ));
    }
    decode_image_envelope(body.as_ref())
}

pub(crate) fn decode_image_envelope<M>(body: &[u8]) -> Result<(ServiceImage, M), ServiceError>
where
    M: DeserializeOwned + Default,
{
    let envelope: ImageEnvelope<M> = serde_json::from_slice(body)
        .map_err(|e| ServiceError::Decode(format!("JSON decode failed: {e}")))?;
    if let Some(message) = envelope.error {
        return Err(ServiceError::Rejected(message));
    }
    let encoded = envelope
        .image
        .as_deref()
        .map(strip_data_uri_prefix)
        .filter(|v| !v.is_empty())
        .ok_or(ServiceError::MissingImage)?;
    let bytes = BASE64_STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| ServiceError::Decode(format!("image base64 decode failed: {e}")))?;
    Ok((
        ServiceImage {
            bytes,
            media_type: envelope.media_type,
        },
        envelope.metrics.unwrap_or_default(),
    ))
}

fn strip_data_uri_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    }
}

fn source_part(source: &SourceImage) -> Result<multipart::Part, ServiceError> {
    bytes_part(
        source.bytes.to_vec(),
        source.file_name.as_str(),
        source.media_type.as_str(),
    )
}

fn bytes_part(
    bytes: Vec<u8>,
    file_name: &str,
    mime: &str,
) -> Result<multipart::Part, ServiceError> {
    multipart::Part::bytes(bytes)
        .file_name(file_name.to_string())
        .mime_str(mime)
        .map_err(|e| ServiceError::InvalidMime {
            mime: mime.to_string(),
            message: e.to_string(),
        })
}

fn transport_error(endpoint: &str, error: reqwest::Error) -> ServiceError {
    if error.is_timeout() {
        ServiceError::Timeout {
            endpoint: endpoint.to_string(),
        }
    } else {
        ServiceError::Request {
            endpoint: endpoint.to_string(),
            message: error.to_string(),
        }
    }
}
