//! In-process change feed.
//!
//! Repositories handed to [`crate::backend::Backend`] are wrapped in [`Publishing`], which
//! announces every successful write on a [`ChangeHub`]. Observers subscribe with a
//! [`ChangeFilter`] and get back a [`Subscription`] guard; dropping the guard stops the
//! listener task.

use crate::domain::{CommentRepository, LikeRepository, MemeRepository};
use crate::errors::RepoError;
use crate::models::{Comment, Like, Meme, NewMeme};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Memes,
    Comments,
    Likes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// The meme the changed row belongs to. `None` for bulk deletes.
    pub meme_id: Option<Uuid>,
}

/// Which events a subscriber wants: one table, optionally narrowed to `meme_id = X`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: Table,
    pub meme_id: Option<Uuid>,
}

impl ChangeFilter {
    pub fn table(table: Table) -> Self {
        Self { table, meme_id: None }
    }

    pub fn meme(table: Table, meme_id: Uuid) -> Self {
        Self {
            table,
            meme_id: Some(meme_id),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        match (self.meme_id, event.meme_id) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => wanted == actual,
            // A bulk delete may have touched any row.
            (Some(_), None) => true,
        }
    }
}

#[derive(Clone)]
pub struct ChangeHub {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // No receivers is fine: nobody is watching.
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::trace!(?event, delivered, "Published change event");
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Runs `callback` for every event matching `filter` until the returned guard is dropped.
    pub fn subscribe<F, Fut>(&self, filter: ChangeFilter, callback: F) -> Subscription
    where
        F: Fn(ChangeEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut receiver = self.sender.subscribe();
        tracing::debug!(?filter, "Change feed subscription opened");

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if filter.matches(&event) => callback(event).await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(?filter, skipped, "Change feed subscriber lagged, forcing a reload");
                        callback(ChangeEvent {
                            table: filter.table,
                            kind: ChangeKind::Update,
                            meme_id: filter.meme_id,
                        })
                        .await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Subscription {
            filter,
            task: Some(task),
        }
    }
}

/// Live subscription. The listener stops when this is dropped.
#[derive(Debug)]
pub struct Subscription {
    filter: ChangeFilter,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(filter = ?self.filter, "Change feed subscription closed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Repository decorator that announces successful writes on a [`ChangeHub`].
pub struct Publishing<T: ?Sized> {
    inner: Arc<T>,
    hub: ChangeHub,
}

impl<T: ?Sized> Publishing<T> {
    pub fn new(inner: Arc<T>, hub: ChangeHub) -> Self {
        Self { inner, hub }
    }

    fn emit(&self, table: Table, kind: ChangeKind, meme_id: Option<Uuid>) {
        self.hub.publish(ChangeEvent { table, kind, meme_id });
    }
}

#[async_trait]
impl MemeRepository for Publishing<dyn MemeRepository> {
    async fn list_newest_first(&self) -> Result<Vec<Meme>, RepoError> {
        self.inner.list_newest_first().await
    }

    async fn list_with_media_url_like(&self, pattern: &str) -> Result<Vec<Meme>, RepoError> {
        self.inner.list_with_media_url_like(pattern).await
    }

    async fn insert(&self, meme: NewMeme) -> Result<Meme, RepoError> {
        let created = self.inner.insert(meme).await?;
        self.emit(Table::Memes, ChangeKind::Insert, Some(created.id));
        Ok(created)
    }

    async fn set_likes_count(&self, id: Uuid, likes_count: u64) -> Result<(), RepoError> {
        self.inner.set_likes_count(id, likes_count).await?;
        self.emit(Table::Memes, ChangeKind::Update, Some(id));
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.inner.delete(id).await?;
        self.emit(Table::Memes, ChangeKind::Delete, Some(id));
        Ok(())
    }

    async fn delete_all(&self) -> Result<usize, RepoError> {
        let removed = self.inner.delete_all().await?;
        self.emit(Table::Memes, ChangeKind::Delete, None);
        Ok(removed)
    }
}

#[async_trait]
impl CommentRepository for Publishing<dyn CommentRepository> {
    async fn list_for_meme(&self, meme_id: Uuid) -> Result<Vec<Comment>, RepoError> {
        self.inner.list_for_meme(meme_id).await
    }

    async fn insert(&self, meme_id: Uuid, content: String) -> Result<Comment, RepoError> {
        let created = self.inner.insert(meme_id, content).await?;
        self.emit(Table::Comments, ChangeKind::Insert, Some(meme_id));
        Ok(created)
    }
}

#[async_trait]
impl LikeRepository for Publishing<dyn LikeRepository> {
    async fn insert(&self, meme_id: Uuid) -> Result<Like, RepoError> {
        let like = self.inner.insert(meme_id).await?;
        self.emit(Table::Likes, ChangeKind::Insert, Some(meme_id));
        Ok(like)
    }

    async fn count_for_meme(&self, meme_id: Uuid) -> Result<u64, RepoError> {
        self.inner.count_for_meme(meme_id).await
    }
}
