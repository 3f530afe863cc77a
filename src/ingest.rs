//! Forwards OCR pages into the assistant's ingestion API ("rabbit hole").
//!
//! Each page is mirrored to a transient markdown file, uploaded with the
//! caller's tags as metadata, and removed again. Files live in a per-request
//! [`WorkDir`] so concurrent requests never share a path.

use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::GatewayError;
use crate::ocr::OcrPage;

const SERVICE: &str = "rabbit hole";

/// Chunking parameters passed to the ingestion API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunking {
    pub size: u32,
    pub overlap: u32,
}

pub const IMAGE_CHUNKING: Chunking = Chunking { size: 400, overlap: 100 };
pub const PDF_CHUNKING: Chunking = Chunking { size: 512, overlap: 128 };

#[async_trait::async_trait]
pub trait Ingestor: Send + Sync {
    /// Ingest one markdown file on behalf of `user_id`.
    async fn ingest_file(
        &self,
        user_id: &str,
        path: &Path,
        chunking: Chunking,
        metadata: &Map<String, Value>,
    ) -> Result<(), GatewayError>;
}

/// HTTP client for the rabbit hole upload endpoint.
pub struct RabbitHoleClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RabbitHoleClient {
    pub fn new(client: reqwest::Client, settings: &Settings) -> Self {
        Self {
            client,
            base_url: settings.rabbit_hole_url.clone(),
            token: settings.rabbit_hole_token.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Ingestor for RabbitHoleClient {
    async fn ingest_file(
        &self,
        user_id: &str,
        path: &Path,
        chunking: Chunking,
        metadata: &Map<String, Value>,
    ) -> Result<(), GatewayError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| GatewayError::io(format!("reading {}", path.display()), e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let metadata = serde_json::to_string(metadata)
            .map_err(|e| GatewayError::decode(SERVICE, e))?;

        let part = Part::bytes(data)
            .file_name(filename.clone())
            .mime_str("text/markdown")
            .map_err(GatewayError::transport(SERVICE))?;

        let form = Form::new()
            .part("file", part)
            .text("chunk_size", chunking.size.to_string())
            .text("chunk_overlap", chunking.overlap.to_string())
            .text("metadata", metadata);

        let mut request = self
            .client
            .post(format!("{}/rabbithole/", self.base_url))
            .header("user_id", user_id)
            .multipart(form);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(GatewayError::transport(SERVICE))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        debug!("RabbitHole: ingested {} for user {}", filename, user_id);
        Ok(())
    }
}

/// Per-request scratch directory under the configured work root, removed
/// with everything in it on drop.
pub struct WorkDir {
    dir: tempfile::TempDir,
}

impl WorkDir {
    pub async fn create(root: &Path) -> Result<Self, GatewayError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| GatewayError::io(format!("creating {}", root.display()), e))?;
        let dir = tempfile::Builder::new()
            .prefix("ocr-")
            .tempdir_in(root)
            .map_err(|e| GatewayError::io(format!("creating work dir in {}", root.display()), e))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside this directory. Only the final component of
    /// `name` is used.
    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(file_component(name))
    }
}

/// A file that is deleted on drop unless already removed with [`TransientFile::remove`].
pub struct TransientFile {
    path: Option<PathBuf>,
}

impl TransientFile {
    pub async fn write(path: PathBuf, contents: &[u8]) -> Result<Self, GatewayError> {
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| GatewayError::io(format!("writing {}", path.display()), e))?;
        Ok(Self { path: Some(path) })
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new(""))
    }

    /// Delete the file now, surfacing any error.
    pub async fn remove(mut self) -> Result<(), GatewayError> {
        if let Some(path) = self.path.take() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| GatewayError::io(format!("removing {}", path.display()), e))?;
        }
        Ok(())
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// File name used for each page's transient markdown copy.
#[derive(Debug, Clone, Copy)]
pub enum PageNaming<'a> {
    /// Every page reuses one name; pages are written and removed one at a time.
    Fixed(&'a str),
    /// `{stem}_{index}.md`
    Indexed(&'a str),
}

impl PageNaming<'_> {
    pub fn file_name(&self, page: &OcrPage) -> String {
        match self {
            Self::Fixed(name) => name.to_string(),
            Self::Indexed(stem) => format!("{}_{}.md", stem, page.index),
        }
    }
}

/// Write each page to its transient file, ingest it, delete it.
///
/// Stops at the first failing page. Pages already ingested stay ingested.
pub async fn forward_pages(
    ingestor: &dyn Ingestor,
    work_dir: &WorkDir,
    user_id: &str,
    naming: PageNaming<'_>,
    pages: &[OcrPage],
    chunking: Chunking,
    metadata: &Map<String, Value>,
) -> Result<usize, GatewayError> {
    for page in pages {
        let wrap = |e| GatewayError::Ingestion {
            page: page.index,
            source: Box::new(e),
        };

        let path = work_dir.join(&naming.file_name(page));
        let file = TransientFile::write(path, page.markdown.as_bytes())
            .await
            .map_err(wrap)?;
        ingestor
            .ingest_file(user_id, file.path(), chunking, metadata)
            .await
            .map_err(wrap)?;
        file.remove().await.map_err(wrap)?;
    }

    info!(
        "Forwarded {} pages ({:?}) to ingestion (chunk {}/{})",
        pages.len(),
        naming,
        chunking.size,
        chunking.overlap
    );
    Ok(pages.len())
}

/// Final path component of `name`, or `document` when there is none.
pub fn file_component(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "document".to_string())
}
