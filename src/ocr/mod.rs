//! OCR provider abstraction.
//!
//! Handlers talk to an [`OcrProvider`]; the Mistral REST client is the
//! production implementation. The provider's JSON is kept verbatim for the
//! caller, with a typed view of the pages for ingestion.

pub mod mistral;
pub mod request;

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::GatewayError;
use request::Document;

/// One page of OCR output.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrPage {
    /// 0-based page index as reported by the provider.
    pub index: usize,
    pub markdown: String,
}

/// Provider response: raw JSON for the caller, extracted pages for ingestion.
#[derive(Debug, Clone)]
pub struct OcrResult {
    pub raw: Value,
    pub pages: Vec<OcrPage>,
}

#[derive(Deserialize)]
struct PagesView {
    pages: Vec<PageView>,
}

#[derive(Deserialize)]
struct PageView {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    markdown: String,
}

impl OcrResult {
    pub fn from_raw(service: &'static str, raw: Value) -> Result<Self, GatewayError> {
        let view = PagesView::deserialize(&raw).map_err(|e| GatewayError::decode(service, e))?;
        let pages = view
            .pages
            .into_iter()
            .enumerate()
            .map(|(position, p)| OcrPage {
                index: p.index.unwrap_or(position),
                markdown: p.markdown,
            })
            .collect();
        Ok(Self { raw, pages })
    }
}

#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Submit one document for OCR.
    async fn process(
        &self,
        document: &Document,
        include_images: bool,
    ) -> Result<OcrResult, GatewayError>;

    /// Upload a local file to the provider and return a signed URL for it.
    async fn upload_and_sign(&self, path: &Path) -> Result<String, GatewayError>;
}
