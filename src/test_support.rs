//! In-process stand-ins for the Mistral API and the rabbit hole, for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Multipart, Path as UrlPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::config::Settings;

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Settings pointing at the mocks.
pub fn test_settings(
    mistral_base: &str,
    rabbit_base: &str,
    work_dir: &Path,
    extra: &[(&str, &str)],
) -> Settings {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("MISTRAL_API_KEY".to_string(), "sk-test".to_string()),
        ("MISTRAL_API_URL".to_string(), format!("{}/v1", mistral_base)),
        ("RABBIT_HOLE_URL".to_string(), rabbit_base.to_string()),
        ("OCR_WORK_DIR".to_string(), work_dir.display().to_string()),
    ]);
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Settings::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

/// Whether `root` holds no files at any depth (a missing root counts as empty).
pub fn tree_is_empty(root: &Path) -> bool {
    count_files(root) == 0
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|e| {
            let path = e.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}

fn file_exists_under(dir: &Path, name: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|e| {
        let path = e.path();
        if path.is_dir() {
            file_exists_under(&path, name)
        } else {
            path.file_name().map(|n| n == name).unwrap_or(false)
        }
    })
}

/// A provider OCR response with one page per markdown string.
pub fn ocr_response(pages: &[&str]) -> Value {
    let pages: Vec<Value> = pages
        .iter()
        .enumerate()
        .map(|(i, md)| {
            json!({
                "index": i,
                "markdown": md,
                "images": [],
                "dimensions": {"dpi": 200, "height": 2200, "width": 1700}
            })
        })
        .collect();
    let count = pages.len();
    json!({
        "pages": pages,
        "model": "mistral-ocr-2505-completion",
        "usage_info": {"pages_processed": count, "doc_size_bytes": null}
    })
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub purpose: String,
    pub bytes: Vec<u8>,
    pub authorization: String,
}

/// Mock of the Mistral OCR, Files and signed URL endpoints.
#[derive(Clone)]
pub struct MockMistral {
    ocr_status: u16,
    ocr_body: String,
    upload_status: u16,
    /// Work root to inspect while an upload is in flight.
    work_root: Option<PathBuf>,
    ocr_requests: Arc<Mutex<Vec<Value>>>,
    uploads: Arc<Mutex<Vec<Upload>>>,
    pdf_seen_on_disk: Arc<Mutex<Vec<bool>>>,
}

impl Default for MockMistral {
    fn default() -> Self {
        Self::with_pages(&["# Page one", "Page two"])
    }
}

impl MockMistral {
    pub fn with_pages(pages: &[&str]) -> Self {
        Self::with_raw_body(&ocr_response(pages).to_string())
    }

    pub fn with_raw_body(body: &str) -> Self {
        Self {
            ocr_status: 200,
            ocr_body: body.to_string(),
            upload_status: 200,
            work_root: None,
            ocr_requests: Default::default(),
            uploads: Default::default(),
            pdf_seen_on_disk: Default::default(),
        }
    }

    pub fn failing(status: u16) -> Self {
        let mut mock = Self::with_raw_body(r#"{"detail":"internal error"}"#);
        mock.ocr_status = status;
        mock
    }

    pub fn failing_upload(status: u16) -> Self {
        let mut mock = Self::default();
        mock.upload_status = status;
        mock
    }

    pub fn watching(mut self, work_root: &Path) -> Self {
        self.work_root = Some(work_root.to_path_buf());
        self
    }

    pub fn ocr_requests(&self) -> Vec<Value> {
        self.ocr_requests.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    /// For each upload, whether the gateway's PDF copy existed on disk.
    pub fn pdf_seen_on_disk(&self) -> Vec<bool> {
        self.pdf_seen_on_disk.lock().unwrap().clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/ocr", post(mock_ocr))
            .route("/v1/files", post(mock_upload))
            .route("/v1/files/:id/url", get(mock_signed_url))
            .with_state(self.clone())
    }
}

async fn mock_ocr(State(mock): State<MockMistral>, Json(body): Json<Value>) -> Response {
    mock.ocr_requests.lock().unwrap().push(body);
    let status = StatusCode::from_u16(mock.ocr_status).unwrap();
    (
        status,
        [("content-type", "application/json")],
        mock.ocr_body.clone(),
    )
        .into_response()
}

async fn mock_upload(
    State(mock): State<MockMistral>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut upload = Upload {
        filename: String::new(),
        purpose: String::new(),
        bytes: Vec::new(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    };
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("purpose") => upload.purpose = field.text().await.unwrap(),
            Some("file") => {
                upload.filename = field.file_name().unwrap_or_default().to_string();
                upload.bytes = field.bytes().await.unwrap().to_vec();
            }
            _ => {}
        }
    }

    if let Some(root) = &mock.work_root {
        let seen = file_exists_under(root, &upload.filename);
        mock.pdf_seen_on_disk.lock().unwrap().push(seen);
    }
    mock.uploads.lock().unwrap().push(upload);

    if mock.upload_status != 200 {
        let status = StatusCode::from_u16(mock.upload_status).unwrap();
        return (status, "upload rejected").into_response();
    }
    Json(json!({
        "id": "file-abc",
        "object": "file",
        "purpose": "ocr",
        "filename": "uploaded.pdf"
    }))
    .into_response()
}

async fn mock_signed_url(
    UrlPath(id): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let expiry = query.get("expiry").cloned().unwrap_or_default();
    Json(json!({"url": format!("https://signed.example/{}?expiry={}", id, expiry)}))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub filename: String,
    pub content: String,
    pub chunk_size: String,
    pub chunk_overlap: String,
    pub metadata: Value,
    pub user_id: String,
    /// Whether the gateway's transient copy existed while being ingested.
    pub on_disk: bool,
}

/// Mock of the rabbit hole upload endpoint.
#[derive(Clone)]
pub struct MockRabbitHole {
    status: u16,
    work_root: PathBuf,
    ingested: Arc<Mutex<Vec<Ingested>>>,
}

impl MockRabbitHole {
    pub fn new(work_root: &Path) -> Self {
        Self {
            status: 200,
            work_root: work_root.to_path_buf(),
            ingested: Default::default(),
        }
    }

    pub fn failing(work_root: &Path, status: u16) -> Self {
        Self {
            status,
            ..Self::new(work_root)
        }
    }

    pub fn ingested(&self) -> Vec<Ingested> {
        self.ingested.lock().unwrap().clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/rabbithole/", post(mock_ingest))
            .with_state(self.clone())
    }
}

async fn mock_ingest(
    State(mock): State<MockRabbitHole>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut ingested = Ingested {
        filename: String::new(),
        content: String::new(),
        chunk_size: String::new(),
        chunk_overlap: String::new(),
        metadata: Value::Null,
        user_id: headers
            .get("user_id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        on_disk: false,
    };
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                ingested.filename = field.file_name().unwrap_or_default().to_string();
                ingested.content = field.text().await.unwrap();
            }
            Some("chunk_size") => ingested.chunk_size = field.text().await.unwrap(),
            Some("chunk_overlap") => ingested.chunk_overlap = field.text().await.unwrap(),
            Some("metadata") => {
                ingested.metadata = serde_json::from_str(&field.text().await.unwrap()).unwrap()
            }
            _ => {}
        }
    }
    ingested.on_disk = file_exists_under(&mock.work_root, &ingested.filename);
    mock.ingested.lock().unwrap().push(ingested);

    if mock.status != 200 {
        let status = StatusCode::from_u16(mock.status).unwrap();
        return (status, "ingestion failed").into_response();
    }
    Json(json!({"filename": "ok", "content_type": "text/markdown", "info": "File is being ingested asynchronously"}))
        .into_response()
}
