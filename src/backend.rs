use crate::domain::{CommentRepository, FileStorage, LikeRepository, MemeRepository};
use crate::media::StorageDomain;
use crate::memory::{MemoryRepository, MemoryStorage};
use crate::realtime::{ChangeHub, Publishing};
use std::sync::Arc;

/// Handles to the backend collaborator: row tables, object storage and the change feed.
///
/// Cloning is cheap; every clone talks to the same backend.
#[derive(Clone)]
pub struct Backend {
    pub memes: Arc<dyn MemeRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub likes: Arc<dyn LikeRepository>,
    pub storage: Arc<dyn FileStorage>,
    pub changes: ChangeHub,
    pub storage_domain: StorageDomain,
}

impl Backend {
    /// Wires the given repositories so that every successful write is announced on a fresh hub.
    pub fn new(
        memes: Arc<dyn MemeRepository>,
        comments: Arc<dyn CommentRepository>,
        likes: Arc<dyn LikeRepository>,
        storage: Arc<dyn FileStorage>,
        storage_domain: StorageDomain,
    ) -> Self {
        let changes = ChangeHub::new();
        Self {
            memes: Arc::new(Publishing::new(memes, changes.clone())),
            comments: Arc::new(Publishing::new(comments, changes.clone())),
            likes: Arc::new(Publishing::new(likes, changes.clone())),
            storage,
            changes,
            storage_domain,
        }
    }

    /// In-memory backend. The concrete stores are returned too, for inspection.
    pub fn memory(
        public_base_url: &str,
        storage_domain: StorageDomain,
    ) -> (Self, Arc<MemoryRepository>, Arc<MemoryStorage>) {
        let repo = Arc::new(MemoryRepository::new());
        let storage = Arc::new(MemoryStorage::new(public_base_url));
        let backend = Self::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            storage.clone(),
            storage_domain,
        );
        (backend, repo, storage)
    }
}
