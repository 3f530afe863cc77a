//! Gateway settings.
//!
//! Two fields belong to the assistant's plugin configuration (the provider
//! API key and the persistence toggle) and are described by
//! [`settings_schema`]. The rest are deployment knobs for running the gateway
//! as a standalone server. Everything is read from the environment once at
//! startup.

use anyhow::{bail, Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_API_URL: &str = "https://api.mistral.ai/v1";
pub const DEFAULT_MODEL: &str = "mistral-ocr-latest";
pub const DEFAULT_RABBIT_HOLE_URL: &str = "http://localhost:1865";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_SIGNED_URL_EXPIRY_HOURS: u32 = 24;

/// Settings exposed to the assistant's configuration UI.
#[derive(Clone, Serialize, Deserialize, JsonSchema)]
pub struct PluginSettings {
    pub mistral_api_key: String,
    #[serde(default)]
    pub save_text_to_rabbit_hole: bool,
}

impl fmt::Debug for PluginSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSettings")
            .field("mistral_api_key", &"<redacted>")
            .field("save_text_to_rabbit_hole", &self.save_text_to_rabbit_hole)
            .finish()
    }
}

/// JSON Schema of [`PluginSettings`].
pub fn settings_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(PluginSettings)
}

/// How a PDF reaches the OCR provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PdfStrategy {
    /// Upload to the Files API, then hand the provider a signed URL.
    #[default]
    SignedUrl,
    /// Embed the PDF as a base64 `data:` URL in the OCR request.
    Inline,
}

impl PdfStrategy {
    /// Parse an `OCR_PDF_STRATEGY` value.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "signed_url" => Some(Self::SignedUrl),
            "inline" => Some(Self::Inline),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Settings {
    pub plugin: PluginSettings,
    pub api_url: String,
    pub model: String,
    pub pdf_strategy: PdfStrategy,
    pub signed_url_expiry_hours: u32,
    pub rabbit_hole_url: String,
    pub rabbit_hole_token: Option<String>,
    /// When set, every OCR request must carry this bearer token.
    pub gateway_api_key: Option<String>,
    /// Root for per-request transient files.
    pub work_dir: PathBuf,
    pub bind_addr: SocketAddr,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |secret: &Option<String>| secret.as_ref().map(|_| "<redacted>");
        f.debug_struct("Settings")
            .field("plugin", &self.plugin)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("pdf_strategy", &self.pdf_strategy)
            .field("signed_url_expiry_hours", &self.signed_url_expiry_hours)
            .field("rabbit_hole_url", &self.rabbit_hole_url)
            .field("rabbit_hole_token", &redact(&self.rabbit_hole_token))
            .field("gateway_api_key", &redact(&self.gateway_api_key))
            .field("work_dir", &self.work_dir)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mistral_api_key =
            var("MISTRAL_API_KEY").context("MISTRAL_API_KEY environment variable not set")?;

        let save_text_to_rabbit_hole = match var("SAVE_TEXT_TO_RABBIT_HOLE") {
            Some(value) => parse_bool("SAVE_TEXT_TO_RABBIT_HOLE", &value)?,
            None => false,
        };

        let pdf_strategy = match var("OCR_PDF_STRATEGY") {
            Some(value) => PdfStrategy::from_str(value.trim()).with_context(|| {
                format!(
                    "Invalid OCR_PDF_STRATEGY: {:?} (expected signed_url or inline)",
                    value
                )
            })?,
            None => PdfStrategy::default(),
        };

        let signed_url_expiry_hours = match var("SIGNED_URL_EXPIRY_HOURS") {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("Invalid SIGNED_URL_EXPIRY_HOURS: {:?}", value))?,
            None => DEFAULT_SIGNED_URL_EXPIRY_HOURS,
        };

        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse()
            .with_context(|| format!("Invalid BIND_ADDR: {:?}", bind_addr))?;

        Ok(Self {
            plugin: PluginSettings {
                mistral_api_key,
                save_text_to_rabbit_hole,
            },
            api_url: trim_url(var("MISTRAL_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into())),
            model: var("MISTRAL_OCR_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            pdf_strategy,
            signed_url_expiry_hours,
            rabbit_hole_url: trim_url(
                var("RABBIT_HOLE_URL").unwrap_or_else(|| DEFAULT_RABBIT_HOLE_URL.into()),
            ),
            rabbit_hole_token: var("RABBIT_HOLE_TOKEN"),
            gateway_api_key: var("GATEWAY_API_KEY"),
            work_dir: var("OCR_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            bind_addr,
        })
    }

    pub fn save_text(&self) -> bool {
        self.plugin.save_text_to_rabbit_hole
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => bail!("Invalid {}: {:?} (expected a boolean)", name, value),
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
