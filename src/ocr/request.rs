//! Builds the provider's document payloads.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::ImageFormat;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Document {
    ImageUrl { image_url: String },
    DocumentUrl { document_url: String },
}

/// `data:` URL around data that is already base64-encoded.
pub fn data_url(mime_type: &str, base64_data: &str) -> String {
    format!("data:{};base64,{}", mime_type, base64_data.trim())
}

pub fn image_document(mime_type: &str, base64_image: &str) -> Document {
    Document::ImageUrl {
        image_url: data_url(mime_type, base64_image),
    }
}

pub fn inline_pdf_document(pdf: &[u8]) -> Document {
    Document::DocumentUrl {
        document_url: data_url("application/pdf", &BASE64.encode(pdf)),
    }
}

pub fn signed_url_document(url: String) -> Document {
    Document::DocumentUrl { document_url: url }
}

/// Sniff the image bytes and report the detected format when it contradicts
/// the declared MIME type. Unknown formats on either side are not a mismatch.
pub fn declared_type_mismatch(declared: &str, bytes: &[u8]) -> Option<ImageFormat> {
    let sniffed = image::guess_format(bytes).ok()?;
    let declared = declared
        .trim()
        .to_ascii_lowercase()
        .strip_prefix("image/")
        .and_then(|ext| ImageFormat::from_extension(ext))?;
    (sniffed != declared).then_some(sniffed)
}
