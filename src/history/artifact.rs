use std::fmt;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::refine::metrics::ArtifactMetrics;

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

pub struct Artifact {
    id: Uuid,
    bytes: Vec<u8>,
    media_type: String,
    metrics: ArtifactMetrics,
    created_at: DateTime<Utc>,
    sha256: String,
    display: OnceLock<String>,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, media_type: Option<&str>, metrics: ArtifactMetrics) -> Self {
        let media_type = media_type
            .map(str::trim)
            .filter(|v| v.starts_with("image/"))
            .map(str::to_string)
            .unwrap_or_else(|| sniff_media_type(&bytes));
        Self {
            id: Uuid::new_v4(),
            sha256: sha256_hex(&bytes),
            bytes,
            media_type,
            metrics,
            created_at: Utc::now(),
            display: OnceLock::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn metrics(&self) -> &ArtifactMetrics {
        &self.metrics
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn file_name(&self) -> String {
        let ext = ImageFormat::from_mime_type(self.media_type.as_str())
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("bin");
        format!("base.{ext}")
    }

    pub fn display_handle(&self) -> &str {
        self.display.get_or_init(|| {
            format!(
                "data:{};base64,{}",
                self.media_type,
                BASE64_STANDARD.encode(&self.bytes)
            )
        })
    }

    pub fn has_display_handle(&self) -> bool {
        self.display.get().is_some()
    }

    pub fn decode(&self) -> Result<DynamicImage, image::ImageError> {
        image::load_from_memory(&self.bytes)
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("id", &self.id)
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .field("sha256", &self.sha256)
            .field("metrics", &self.metrics)
            .field("created_at", &self.created_at)
            .finish()
    }
}

pub fn sniff_media_type(bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| String::from(FALLBACK_MEDIA_TYPE))
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}
