//! HTTP handlers.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    response::Json,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::Caller;
use crate::config::{self, PdfStrategy};
use crate::error::GatewayError;
use crate::ingest::{self, PageNaming, TransientFile, WorkDir, IMAGE_CHUNKING, PDF_CHUNKING};
use crate::ocr::request;
use crate::schema::{self, OcrInput, OcrPdfInput, Tag};
use crate::AppState;

/// Transient file each image page is written to before ingestion.
const IMAGE_PAGE_FILE: &str = "ocrpage.md";
const DEFAULT_PDF_NAME: &str = "document.pdf";

/// Health check endpoint.
pub async fn health() -> &'static str {
    "ok"
}

/// JSON Schema of the plugin settings.
pub async fn settings_schema() -> Json<schemars::schema::RootSchema> {
    Json(config::settings_schema())
}

/// OCR a single base64 image.
pub async fn ocr_image(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<OcrInput>, JsonRejection>,
) -> Result<Json<Value>, GatewayError> {
    let Json(input) = payload.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    schema::validate_tags(&input.tags)?;

    let bytes = schema::decode_base64("image", &input.image)?;
    info!(
        "OCR image request: {} ({} bytes, {} tags) from {}",
        input.mime_type,
        bytes.len(),
        input.tags.len(),
        caller.user_id
    );
    if let Some(sniffed) = request::declared_type_mismatch(&input.mime_type, &bytes) {
        warn!(
            "Declared type {} does not match image bytes ({:?})",
            input.mime_type, sniffed
        );
    }

    let document = request::image_document(&input.mime_type, &input.image);
    let result = state.provider.process(&document, false).await?;

    if state.settings.save_text() {
        let work_dir = WorkDir::create(&state.settings.work_dir).await?;
        ingest::forward_pages(
            state.ingestor.as_ref(),
            &work_dir,
            &caller.user_id,
            PageNaming::Fixed(IMAGE_PAGE_FILE),
            &result.pages,
            IMAGE_CHUNKING,
            &schema::flatten_tags(&input.tags),
        )
        .await?;
    }

    Ok(Json(result.raw))
}

/// A PDF submitted either as JSON (`pdf`, `filename`, `tags`) or as a
/// multipart upload (`file`, optional `tags` and `filename` fields).
#[derive(Debug)]
pub struct PdfUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub tags: Vec<Tag>,
}

#[async_trait]
impl<S> FromRequest<S> for PdfUpload
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("application/json") {
            let Json(input) = Json::<OcrPdfInput>::from_request(req, state)
                .await
                .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
            let bytes = schema::decode_base64("pdf", &input.pdf)?;
            Ok(Self {
                filename: input.filename,
                bytes,
                tags: input.tags,
            })
        } else if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
            read_multipart(multipart).await
        } else {
            Err(GatewayError::UnsupportedMediaType(content_type))
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<PdfUpload, GatewayError> {
    let bad_request = |e: axum::extract::multipart::MultipartError| {
        GatewayError::BadRequest(format!("Multipart error: {}", e))
    };

    let mut filename = None;
    let mut upload_name = None;
    let mut bytes = Vec::new();
    let mut tags = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                upload_name = field.file_name().map(str::to_string);
                bytes = field.bytes().await.map_err(bad_request)?.to_vec();
            }
            Some("filename") => {
                filename = Some(field.text().await.map_err(bad_request)?);
            }
            Some("tags") => {
                let text = field.text().await.map_err(bad_request)?;
                tags = serde_json::from_str(&text)
                    .map_err(|e| GatewayError::BadRequest(format!("Invalid tags: {}", e)))?;
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    if bytes.is_empty() {
        return Err(GatewayError::BadRequest("No file uploaded".to_string()));
    }

    let filename = filename
        .or(upload_name)
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PDF_NAME.to_string());

    Ok(PdfUpload {
        filename,
        bytes,
        tags,
    })
}

/// OCR a PDF, returning the provider response with embedded page images.
pub async fn ocr_pdf(
    State(state): State<AppState>,
    caller: Caller,
    upload: PdfUpload,
) -> Result<Json<Value>, GatewayError> {
    schema::validate_tags(&upload.tags)?;
    let settings = &state.settings;
    info!(
        "OCR PDF request: {} ({} bytes, {} tags, {:?}) from {}",
        upload.filename,
        upload.bytes.len(),
        upload.tags.len(),
        settings.pdf_strategy,
        caller.user_id
    );

    let needs_work_dir = settings.save_text() || settings.pdf_strategy == PdfStrategy::SignedUrl;
    let work_dir = if needs_work_dir {
        Some(WorkDir::create(&settings.work_dir).await?)
    } else {
        None
    };

    // The uploaded PDF copy is removed when `_pdf_file` drops, on every exit path.
    let (document, _pdf_file) = match (settings.pdf_strategy, &work_dir) {
        (PdfStrategy::SignedUrl, Some(dir)) => {
            let file = TransientFile::write(dir.join(&upload.filename), &upload.bytes).await?;
            let url = state.provider.upload_and_sign(file.path()).await?;
            (request::signed_url_document(url), Some(file))
        }
        _ => (request::inline_pdf_document(&upload.bytes), None),
    };

    let result = state.provider.process(&document, true).await?;

    if let Some(dir) = work_dir.as_ref().filter(|_| settings.save_text()) {
        ingest::forward_pages(
            state.ingestor.as_ref(),
            dir,
            &caller.user_id,
            PageNaming::Indexed(&ingest::file_component(&upload.filename)),
            &result.pages,
            PDF_CHUNKING,
            &schema::flatten_tags(&upload.tags),
        )
        .await?;
    }

    Ok(Json(result.raw))
}
