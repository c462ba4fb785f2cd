mod dotenv;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::refine::metrics::ConfidenceThresholds;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const ENV_SERVICE_URL: &str = "COLORIZER_SERVICE_URL";
pub const ENV_TIMEOUT_SECS: &str = "COLORIZER_TIMEOUT_SECS";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushSettings {
    pub default_size: f32,
    pub min_size: f32,
    pub max_size: f32,
    pub reference_width: f32,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            default_size: 30.0,
            min_size: 10.0,
            max_size: 80.0,
            reference_width: 800.0,
        }
    }
}

impl BrushSettings {
    pub fn clamp_size(&self, size: f32) -> f32 {
        if !size.is_finite() {
            return self.default_size.clamp(self.min_size, self.max_size);
        }
        size.clamp(self.min_size, self.max_size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: String::from(DEFAULT_SERVICE_URL),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ServiceSettings {
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColorizerSettings {
    pub service: ServiceSettings,
    pub brush: BrushSettings,
    pub confidence: ConfidenceThresholds,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColorizerSettingsOverlay {
    pub service_base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub brush_default_size: Option<f32>,
    pub brush_min_size: Option<f32>,
    pub brush_max_size: Option<f32>,
    pub brush_reference_width: Option<f32>,
    pub confidence_high: Option<f64>,
    pub confidence_medium: Option<f64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("failed to read colorizer settings '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse colorizer settings JSON '{path}': {message}")]
    ParseJson { path: String, message: String },
    #[error("failed to parse colorizer settings TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
    #[error("colorizer settings root must be an object")]
    RootMustBeObject,
    #[error("colorizer settings field '{field}' has invalid type")]
    InvalidFieldType { field: String },
    #[error("colorizer settings field '{field}' is invalid: {message}")]
    InvalidValue { field: String, message: String },
}

pub fn load_colorizer_settings(
    app_root: &Path,
    explicit_path: Option<&str>,
) -> Result<ColorizerSettings, SettingsError> {
    let file = load_settings_file(app_root, explicit_path)?;
    let dotenv = dotenv::read_env_file(app_root).unwrap_or_else(|error| {
        warn!(error = %error, "ignoring unreadable .env");
        HashMap::new()
    });
    let env = env_overlay(|key| {
        std::env::var(key)
            .ok()
            .or_else(|| dotenv.get(key).cloned())
            .filter(|v| !v.trim().is_empty())
    })?;
    ColorizerSettings::resolve(&merge_overlays(&file, &env))
}

impl ColorizerSettings {
    pub fn resolve(overlay: &ColorizerSettingsOverlay) -> Result<Self, SettingsError> {
        let defaults = Self::default();

        let base_url = match overlay.service_base_url.as_deref() {
            Some(raw) => parse_service_url(raw)?,
            None => defaults.service.base_url,
        };
        let timeout = overlay
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.service.timeout);
        if timeout.is_zero() {
            return Err(invalid_value("service.timeout_secs", "must be > 0"));
        }

        let brush = BrushSettings {
            default_size: overlay
                .brush_default_size
                .unwrap_or(defaults.brush.default_size),
            min_size: overlay.brush_min_size.unwrap_or(defaults.brush.min_size),
            max_size: overlay.brush_max_size.unwrap_or(defaults.brush.max_size),
            reference_width: overlay
                .brush_reference_width
                .unwrap_or(defaults.brush.reference_width),
        };
        if brush.min_size <= 0.0 || brush.min_size > brush.max_size {
            return Err(invalid_value(
                "brush.min_size",
                "must be > 0 and <= brush.max_size",
            ));
        }
        if brush.reference_width <= 0.0 {
            return Err(invalid_value("brush.reference_width", "must be > 0"));
        }

        let confidence = ConfidenceThresholds {
            high: overlay.confidence_high.unwrap_or(defaults.confidence.high),
            medium: overlay
                .confidence_medium
                .unwrap_or(defaults.confidence.medium),
        };
        if confidence.medium > confidence.high {
            return Err(invalid_value(
                "confidence.medium",
                "must not exceed confidence.high",
            ));
        }

        Ok(Self {
            service: ServiceSettings { base_url, timeout },
            brush,
            confidence,
        })
    }
}

pub fn merge_overlays(
    lower: &ColorizerSettingsOverlay,
    upper: &ColorizerSettingsOverlay,
) -> ColorizerSettingsOverlay {
    ColorizerSettingsOverlay {
        service_base_url: upper
            .service_base_url
            .clone()
            .or_else(|| lower.service_base_url.clone()),
        timeout_secs: upper.timeout_secs.or(lower.timeout_secs),
        brush_default_size: upper.brush_default_size.or(lower.brush_default_size),
        brush_min_size: upper.brush_min_size.or(lower.brush_min_size),
        brush_max_size: upper.brush_max_size.or(lower.brush_max_size),
        brush_reference_width: upper
            .brush_reference_width
            .or(lower.brush_reference_width),
        confidence_high: upper.confidence_high.or(lower.confidence_high),
        confidence_medium: upper.confidence_medium.or(lower.confidence_medium),
    }
}

pub fn load_settings_file(
    app_root: &Path,
    explicit_path: Option<&str>,
) -> Result<ColorizerSettingsOverlay, SettingsError> {
    if let Some(path) = explicit_path
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .map(|p| if p.is_absolute() { p } else { app_root.join(p) })
    {
        return load_overlay_by_extension(path.as_path());
    }

    let toml_path = app_root.join("config/colorizer.settings.toml");
    if toml_path.exists() {
        return load_overlay_from_toml_path(toml_path.as_path());
    }
    load_overlay_from_json_path(app_root.join("config/colorizer.settings.json").as_path())
}

pub fn parse_colorizer_settings_overlay_json(
    value: &Value,
) -> Result<ColorizerSettingsOverlay, SettingsError> {
    let root = value.as_object().ok_or(SettingsError::RootMustBeObject)?;
    let mut out = ColorizerSettingsOverlay::default();

    if let Some(service) = section(root, "service")? {
        if let Some(v) = service.get("base_url") {
            out.service_base_url = Some(parse_string(v, "service.base_url")?);
        }
        if let Some(v) = service.get("timeout_secs") {
            out.timeout_secs = Some(parse_u64(v, "service.timeout_secs")?);
        }
    }
    if let Some(brush) = section(root, "brush")? {
        if let Some(v) = brush.get("default_size") {
            out.brush_default_size = Some(parse_f64(v, "brush.default_size")? as f32);
        }
        if let Some(v) = brush.get("min_size") {
            out.brush_min_size = Some(parse_f64(v, "brush.min_size")? as f32);
        }
        if let Some(v) = brush.get("max_size") {
            out.brush_max_size = Some(parse_f64(v, "brush.max_size")? as f32);
        }
        if let Some(v) = brush.get("reference_width") {
            out.brush_reference_width = Some(parse_f64(v, "brush.reference_width")? as f32);
        }
    }
    if let Some(confidence) = section(root, "confidence")? {
        if let Some(v) = confidence.get("high") {
            out.confidence_high = Some(parse_f64(v, "confidence.high")?);
        }
        if let Some(v) = confidence.get("medium") {
            out.confidence_medium = Some(parse_f64(v, "confidence.medium")?);
        }
    }
    Ok(out)
}

pub fn env_overlay<F>(lookup: F) -> Result<ColorizerSettingsOverlay, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = ColorizerSettingsOverlay::default();
    if let Some(raw) = lookup(ENV_SERVICE_URL) {
        out.service_base_url = Some(raw.trim().to_string());
    }
    if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
        let secs = raw
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid_value(ENV_TIMEOUT_SECS, e.to_string().as_str()))?;
        out.timeout_secs = Some(secs);
    }
    Ok(out)
}

fn parse_service_url(raw: &str) -> Result<String, SettingsError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url =
        Url::parse(trimmed).map_err(|e| invalid_value("service.base_url", e.to_string().as_str()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid_value(
            "service.base_url",
            "scheme must be http or https",
        ));
    }
    if url.host_str().is_none() {
        return Err(invalid_value("service.base_url", "missing host"));
    }
    Ok(trimmed.to_string())
}

fn section<'a>(
    root: &'a serde_json::Map<String, Value>,
    name: &str,
) -> Result<Option<&'a serde_json::Map<String, Value>>, SettingsError> {
    match root.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_object()
            .map(Some)
            .ok_or_else(|| SettingsError::InvalidFieldType {
                field: name.to_string(),
            }),
    }
}

fn load_overlay_by_extension(path: &Path) -> Result<ColorizerSettingsOverlay, SettingsError> {
    match path
        .extension()
        .and_then(|v| v.to_str())
        .map(|v| v.to_ascii_lowercase())
    {
        Some(ext) if ext == "toml" => load_overlay_from_toml_path(path),
        _ => load_overlay_from_json_path(path),
    }
}

fn load_overlay_from_json_path(path: &Path) -> Result<ColorizerSettingsOverlay, SettingsError> {
    if !path.exists() {
        return Ok(ColorizerSettingsOverlay::default());
    }
    let raw = read_settings_file(path)?;
    let parsed =
        serde_json::from_str::<Value>(raw.as_str()).map_err(|error| SettingsError::ParseJson {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
    parse_colorizer_settings_overlay_json(&parsed)
}

fn load_overlay_from_toml_path(path: &Path) -> Result<ColorizerSettingsOverlay, SettingsError> {
    if !path.exists() {
        return Ok(ColorizerSettingsOverlay::default());
    }
    let raw = read_settings_file(path)?;
    let parsed =
        toml::from_str::<toml::Value>(raw.as_str()).map_err(|error| SettingsError::ParseToml {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
    let json_value = serde_json::to_value(parsed).map_err(|error| SettingsError::ParseToml {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    parse_colorizer_settings_overlay_json(&json_value)
}

fn read_settings_file(path: &Path) -> Result<String, SettingsError> {
    fs::read_to_string(path).map_err(|error| SettingsError::ReadFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })
}

fn parse_string(value: &Value, field: &str) -> Result<String, SettingsError> {
    let parsed = value
        .as_str()
        .map(str::trim)
        .ok_or_else(|| invalid_type(field))?;
    if parsed.is_empty() {
        return Err(invalid_type(field));
    }
    Ok(parsed.to_string())
}

fn parse_u64(value: &Value, field: &str) -> Result<u64, SettingsError> {
    value.as_u64().ok_or_else(|| invalid_type(field))
}

fn parse_f64(value: &Value, field: &str) -> Result<f64, SettingsError> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid_type(field))
}

fn invalid_type(field: &str) -> SettingsError {
    SettingsError::InvalidFieldType {
        field: field.to_string(),
    }
}

fn invalid_value(field: &str, message: &str) -> SettingsError {
    SettingsError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}
