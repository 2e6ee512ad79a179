#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tower::ServiceExt;

use meme_board::admin::AdminPassword;
use meme_board::backend::Backend;
use meme_board::board::Board;
use meme_board::card::{CardContext, PostCard, RefreshFeed};
use meme_board::domain::{FileStorage, StoredObject};
use meme_board::errors::StorageError;
use meme_board::feed::FeedController;
use meme_board::media::StorageDomain;
use meme_board::memory::{MemoryRepository, MemoryStorage};
use meme_board::models::{MediaFile, MediaType, Meme, NewMeme};
use meme_board::notice::{Notice, NoticeLevel, Notices};
use meme_board::routes::create_router;
use meme_board::share::MemoryClipboard;
use meme_board::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const STORAGE_BASE: &str = "https://storage.test/memes";
pub const STORAGE_HOST: &str = "storage.test";
pub const PAGE_URL: &str = "https://board.test/";
pub const ADMIN: &str = "367098";

// ---------------------------------------------------------------------------
// Harness: one fresh in-memory backend per test
// ---------------------------------------------------------------------------

pub struct Harness {
    pub backend: Backend,
    pub repo: Arc<MemoryRepository>,
    pub storage: Arc<MemoryStorage>,
    pub notices: Notices,
    pub clipboard: Arc<MemoryClipboard>,
    notice_rx: broadcast::Receiver<Notice>,
}

impl Harness {
    pub fn new() -> Self {
        let (backend, repo, storage) = Backend::memory(STORAGE_BASE, StorageDomain::new(STORAGE_HOST));
        Self::from_parts(backend, repo, storage)
    }

    /// Like [`Harness::new`], but every upload takes `delay` before it lands.
    pub fn with_slow_uploads(delay: Duration) -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let storage = Arc::new(MemoryStorage::new(STORAGE_BASE));
        let slow = Arc::new(SlowUploads {
            inner: storage.clone(),
            delay,
        });
        let backend = Backend::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            slow,
            StorageDomain::new(STORAGE_HOST),
        );
        Self::from_parts(backend, repo, storage)
    }

    fn from_parts(backend: Backend, repo: Arc<MemoryRepository>, storage: Arc<MemoryStorage>) -> Self {
        let notices = Notices::new();
        let notice_rx = notices.subscribe();
        Self {
            backend,
            repo,
            storage,
            notices,
            clipboard: Arc::new(MemoryClipboard::new()),
            notice_rx,
        }
    }

    pub fn feed(&self) -> Arc<FeedController> {
        FeedController::new(self.backend.clone(), self.notices.clone(), AdminPassword::default())
    }

    pub fn context(&self, parent: Option<Arc<dyn RefreshFeed>>) -> CardContext {
        CardContext {
            backend: self.backend.clone(),
            notices: self.notices.clone(),
            admin: AdminPassword::default(),
            page_url: PAGE_URL.to_string(),
            clipboard: self.clipboard.clone(),
            parent,
        }
    }

    pub fn card(&self, meme: Meme) -> Arc<PostCard> {
        PostCard::new(meme, self.context(None))
    }

    pub fn board(&self) -> Arc<Board> {
        Board::new(
            self.backend.clone(),
            self.notices.clone(),
            AdminPassword::default(),
            PAGE_URL.to_string(),
            self.clipboard.clone(),
        )
    }

    pub fn router(&self, board: Arc<Board>) -> Router {
        create_router(Arc::new(AppState {
            board,
            backend: self.backend.clone(),
        }))
    }

    /// Inserts a meme row that links to `media_url`.
    pub async fn seed(&self, media_url: &str, media_type: MediaType) -> Meme {
        self.backend
            .memes
            .insert(NewMeme {
                title: None,
                media_url: media_url.to_string(),
                media_type,
            })
            .await
            .expect("seed meme")
    }

    /// Inserts a meme whose file lives in our storage, object included.
    pub async fn seed_hosted(&self, file_name: &str) -> (Meme, String) {
        let key = format!("memes/{}", file_name);
        self.backend
            .storage
            .upload(&key, vec![1, 2, 3], Some("image/png".into()))
            .await
            .expect("seed object");
        let url = self.backend.storage.public_url(&key);
        (self.seed(&url, MediaType::Image).await, key)
    }

    /// Notices published since the last call.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        loop {
            match self.notice_rx.try_recv() {
                Ok(notice) => out.push(notice),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        out
    }

    pub fn last_notice(&mut self) -> Option<Notice> {
        self.drain_notices().pop()
    }
}

/// Storage whose uploads stall for a while, to keep an upload in flight.
struct SlowUploads {
    inner: Arc<MemoryStorage>,
    delay: Duration,
}

#[async_trait]
impl FileStorage for SlowUploads {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.upload(key, data, content_type).await
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StorageError> {
        self.inner.remove(keys).await
    }

    async fn download(&self, key: &str) -> Result<StoredObject, StorageError> {
        self.inner.download(key).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }
}

pub fn success(message: &str) -> Notice {
    Notice {
        level: NoticeLevel::Success,
        message: message.to_string(),
    }
}

pub fn error(message: &str) -> Notice {
    Notice {
        level: NoticeLevel::Error,
        message: message.to_string(),
    }
}

pub fn image_file(name: &str, size: usize) -> MediaFile {
    MediaFile::new(name, Some("image/png".to_string()), vec![7; size])
}

pub fn video_file(name: &str, size: usize) -> MediaFile {
    MediaFile::new(name, Some("video/mp4".to_string()), vec![7; size])
}

/// Lets change-feed listeners catch up.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body_bytes: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.expect("oneshot failed");
    let status = response.status();
    let headers = response.headers().clone();
    let body_bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to collect body")
        .to_bytes();
    TestResponse {
        status,
        headers,
        body_bytes,
    }
}

pub async fn request(router: &Router, method: Method, path: &str, body: Option<Value>) -> TestResponse {
    let builder = Request::builder().method(method).uri(path);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("valid request");
    send(router, request).await
}

pub const BOUNDARY: &str = "meme-board-test-boundary";

/// Builder for `multipart/form-data` bodies.
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        self.body
            .extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes());
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                name, file_name, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }
}

pub async fn post_multipart(router: &Router, path: &str, body: Vec<u8>) -> TestResponse {
    let request = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .expect("valid request");
    send(router, request).await
}
