//! Mistral OCR provider (uses Mistral's REST API directly).

use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::request::Document;
use super::{OcrProvider, OcrResult};
use crate::config::Settings;
use crate::error::GatewayError;

const SERVICE: &str = "mistral";

pub struct MistralOcrProvider {
    api_key: String,
    base_url: String,
    model: String,
    signed_url_expiry_hours: u32,
    client: reqwest::Client,
}

impl MistralOcrProvider {
    pub fn new(client: reqwest::Client, settings: &Settings) -> Self {
        Self {
            api_key: settings.plugin.mistral_api_key.clone(),
            base_url: settings.api_url.clone(),
            model: settings.model.clone(),
            signed_url_expiry_hours: settings.signed_url_expiry_hours,
            client,
        }
    }
}

// ── Mistral API request/response types ──────────────────────────────────────

#[derive(Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: &'a Document,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    include_image_base64: bool,
}

#[derive(Deserialize)]
struct FileUploadResponse {
    id: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    url: String,
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for MistralOcrProvider {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn process(
        &self,
        document: &Document,
        include_images: bool,
    ) -> Result<OcrResult, GatewayError> {
        let body = OcrRequest {
            model: &self.model,
            document,
            include_image_base64: include_images,
        };

        info!("MistralOcrProvider: calling OCR API (model={})", self.model);

        let resp = self
            .client
            .post(format!("{}/ocr", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(GatewayError::transport(SERVICE))?;

        let raw_text = success_body(resp).await?;
        debug!(
            "MistralOcrProvider: raw response ({} bytes): {}",
            raw_text.len(),
            raw_text.chars().take(500).collect::<String>()
        );

        let raw: Value =
            serde_json::from_str(&raw_text).map_err(|e| GatewayError::decode(SERVICE, e))?;
        let result = OcrResult::from_raw(SERVICE, raw)?;
        info!("MistralOcrProvider: {} pages returned", result.pages.len());
        Ok(result)
    }

    async fn upload_and_sign(&self, path: &Path) -> Result<String, GatewayError> {
        let file_id = self.upload_file(path).await?;
        self.signed_url(&file_id).await
    }
}

impl MistralOcrProvider {
    /// Upload a local file to the Files API with purpose `ocr`, return the file id.
    async fn upload_file(&self, path: &Path) -> Result<String, GatewayError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| GatewayError::io(format!("reading {}", path.display()), e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        info!(
            "MistralOcrProvider: uploading {} ({} bytes) to Files API",
            filename,
            data.len()
        );

        let part = Part::bytes(data)
            .file_name(filename)
            .mime_str("application/pdf")
            .map_err(GatewayError::transport(SERVICE))?;

        let form = Form::new().text("purpose", "ocr").part("file", part);

        let resp = self
            .client
            .post(format!("{}/files", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(GatewayError::transport(SERVICE))?;

        let upload: FileUploadResponse = decode_json(success_body(resp).await?)?;
        info!("MistralOcrProvider: uploaded file_id={}", upload.id);
        Ok(upload.id)
    }

    /// Request a time-limited URL for an uploaded file.
    async fn signed_url(&self, file_id: &str) -> Result<String, GatewayError> {
        let resp = self
            .client
            .get(format!("{}/files/{}/url", self.base_url, file_id))
            .query(&[("expiry", self.signed_url_expiry_hours)])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(GatewayError::transport(SERVICE))?;

        let signed: SignedUrlResponse = decode_json(success_body(resp).await?)?;
        debug!(
            "MistralOcrProvider: signed URL for {} valid {}h",
            file_id, self.signed_url_expiry_hours
        );
        Ok(signed.url)
    }
}

async fn success_body(resp: reqwest::Response) -> Result<String, GatewayError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GatewayError::Upstream {
            service: SERVICE,
            status: status.as_u16(),
            body,
        });
    }
    resp.text().await.map_err(GatewayError::transport(SERVICE))
}

fn decode_json<T: for<'de> Deserialize<'de>>(text: String) -> Result<T, GatewayError> {
    serde_json::from_str(&text).map_err(|e| GatewayError::decode(SERVICE, e))
}
