use crate::errors::{RepoError, StorageError};
use crate::models::{Comment, Like, Meme, NewMeme};
use async_trait::async_trait;
use uuid::Uuid;

/// Rows of the `memes` table.
#[async_trait]
pub trait MemeRepository: Send + Sync + 'static {
    /// All memes, newest first.
    async fn list_newest_first(&self) -> Result<Vec<Meme>, RepoError>;

    /// Memes whose `media_url` contains `pattern`, compared case-insensitively.
    async fn list_with_media_url_like(&self, pattern: &str) -> Result<Vec<Meme>, RepoError>;

    async fn insert(&self, meme: NewMeme) -> Result<Meme, RepoError>;

    /// Overwrites `likes_count`. Plain write, not an increment.
    async fn set_likes_count(&self, id: Uuid, likes_count: u64) -> Result<(), RepoError>;

    /// Deleting a missing row is not an error.
    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;

    /// Deletes every row. Returns how many were removed.
    async fn delete_all(&self) -> Result<usize, RepoError>;
}

/// Rows of the `comments` table.
#[async_trait]
pub trait CommentRepository: Send + Sync + 'static {
    /// Comments of one meme, newest first.
    async fn list_for_meme(&self, meme_id: Uuid) -> Result<Vec<Comment>, RepoError>;

    async fn insert(&self, meme_id: Uuid, content: String) -> Result<Comment, RepoError>;
}

/// Rows of the `likes` audit table.
#[async_trait]
pub trait LikeRepository: Send + Sync + 'static {
    async fn insert(&self, meme_id: Uuid) -> Result<Like, RepoError>;

    async fn count_for_meme(&self, meme_id: Uuid) -> Result<u64, RepoError>;
}

/// A stored object together with its content type.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// Object storage for uploaded media.
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError>;

    /// Removes a batch of objects. Missing keys are not an error.
    async fn remove(&self, keys: &[String]) -> Result<(), StorageError>;

    async fn download(&self, key: &str) -> Result<StoredObject, StorageError>;

    /// Public URL under which `key` is served.
    fn public_url(&self, key: &str) -> String;
}
