//! Process-local backend: the tables and the object store live in memory.
//!
//! Used for local development (`BOARD_BACKEND=memory`) and by the test suite, which relies on
//! the call counters to prove that rejected actions never reached the backend and on
//! [`MemoryRepository::set_failing`] / [`MemoryStorage::set_failing`] to simulate outages.

use crate::domain::{CommentRepository, FileStorage, LikeRepository, MemeRepository, StoredObject};
use crate::errors::{RepoError, StorageError};
use crate::models::{Comment, Like, Meme, NewMeme};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryRepository {
    memes: RwLock<Vec<Meme>>,
    comments: RwLock<Vec<Comment>>,
    likes: RwLock<Vec<Like>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of row calls served so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// While set, every row call fails.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn meme(&self, id: Uuid) -> Option<Meme> {
        self.memes.read().await.iter().find(|m| m.id == id).cloned()
    }

    pub async fn meme_count(&self) -> usize {
        self.memes.read().await.len()
    }

    fn enter(&self, table: &'static str) -> Result<(), RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            tracing::debug!(table, "Memory repository: injected failure");
            return Err(RepoError::Injected(table));
        }
        Ok(())
    }
}

/// Newest first; rows sharing a timestamp keep reverse insertion order.
fn newest_first<T: Clone>(rows: &[T], created_at: impl Fn(&T) -> OffsetDateTime) -> Vec<T> {
    let mut out: Vec<T> = rows.iter().rev().cloned().collect();
    out.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    out
}

#[async_trait]
impl MemeRepository for MemoryRepository {
    async fn list_newest_first(&self) -> Result<Vec<Meme>, RepoError> {
        self.enter("memes")?;
        let memes = self.memes.read().await;
        Ok(newest_first(&memes, |m| m.created_at))
    }

    async fn list_with_media_url_like(&self, pattern: &str) -> Result<Vec<Meme>, RepoError> {
        self.enter("memes")?;
        let pattern = pattern.to_lowercase();
        let memes = self.memes.read().await;
        Ok(memes
            .iter()
            .filter(|m| m.media_url.to_lowercase().contains(&pattern))
            .cloned()
            .collect())
    }

    async fn insert(&self, meme: NewMeme) -> Result<Meme, RepoError> {
        self.enter("memes")?;
        let row = Meme {
            id: Uuid::new_v4(),
            title: meme.title,
            media_url: meme.media_url,
            media_type: meme.media_type,
            created_at: OffsetDateTime::now_utc(),
            likes_count: 0,
        };
        self.memes.write().await.push(row.clone());
        Ok(row)
    }

    async fn set_likes_count(&self, id: Uuid, likes_count: u64) -> Result<(), RepoError> {
        self.enter("memes")?;
        let mut memes = self.memes.write().await;
        let meme = memes
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(RepoError::NotFound(id))?;
        meme.likes_count = likes_count;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.enter("memes")?;
        self.memes.write().await.retain(|m| m.id != id);
        Ok(())
    }

    async fn delete_all(&self) -> Result<usize, RepoError> {
        self.enter("memes")?;
        let mut memes = self.memes.write().await;
        let removed = memes.len();
        memes.clear();
        Ok(removed)
    }
}

#[async_trait]
impl CommentRepository for MemoryRepository {
    async fn list_for_meme(&self, meme_id: Uuid) -> Result<Vec<Comment>, RepoError> {
        self.enter("comments")?;
        let comments = self.comments.read().await;
        let mine: Vec<Comment> = comments.iter().filter(|c| c.meme_id == meme_id).cloned().collect();
        Ok(newest_first(&mine, |c| c.created_at))
    }

    async fn insert(&self, meme_id: Uuid, content: String) -> Result<Comment, RepoError> {
        self.enter("comments")?;
        let row = Comment {
            id: Uuid::new_v4(),
            meme_id,
            content,
            created_at: OffsetDateTime::now_utc(),
        };
        self.comments.write().await.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl LikeRepository for MemoryRepository {
    async fn insert(&self, meme_id: Uuid) -> Result<Like, RepoError> {
        self.enter("likes")?;
        let row = Like {
            id: Uuid::new_v4(),
            meme_id,
            created_at: OffsetDateTime::now_utc(),
        };
        self.likes.write().await.push(row.clone());
        Ok(row)
    }

    async fn count_for_meme(&self, meme_id: Uuid) -> Result<u64, RepoError> {
        self.enter("likes")?;
        let likes = self.likes.read().await;
        Ok(likes.iter().filter(|l| l.meme_id == meme_id).count() as u64)
    }
}

pub struct MemoryStorage {
    public_base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
    removed: RwLock<Vec<String>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStorage {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
            removed: RwLock::new(Vec::new()),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Number of storage calls served so far. `public_url` is local and not counted.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Every key ever passed to `remove`, in call order.
    pub async fn removed_keys(&self) -> Vec<String> {
        self.removed.read().await.clone()
    }

    fn enter(&self, op: &'static str) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            tracing::debug!(op, "Memory storage: injected failure");
            return Err(StorageError::Injected(op));
        }
        Ok(())
    }
}

#[async_trait]
impl FileStorage for MemoryStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        self.enter("upload")
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        self.objects
            .write()
            .await
            .insert(key.to_string(), StoredObject { data, content_type });
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StorageError> {
        self.enter("remove")?;
        let mut objects = self.objects.write().await;
        let mut removed = self.removed.write().await;
        for key in keys {
            objects.remove(key);
            removed.push(key.clone());
        }
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<StoredObject, StorageError> {
        self.enter("download")?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}
