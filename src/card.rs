use crate::admin::AdminPassword;
use crate::backend::Backend;
use crate::busy::BusyFlag;
use crate::errors::{BackendError, BoardError, Failure};
use crate::feed::FeedController;
use crate::models::{Comment, Meme};
use crate::notice::Notices;
use crate::realtime::{ChangeFilter, Subscription, Table};
use crate::share::Clipboard;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Whoever renders the list a card sits in. Told to reload after a like or delete.
#[async_trait]
pub trait RefreshFeed: Send + Sync + 'static {
    async fn refresh(&self);
}

#[async_trait]
impl RefreshFeed for FeedController {
    async fn refresh(&self) {
        // Failures are already reported by the feed itself.
        let _ = self.load_feed().await;
    }
}

/// Everything a card shares with its siblings.
#[derive(Clone)]
pub struct CardContext {
    pub backend: Backend,
    pub notices: Notices,
    pub admin: AdminPassword,
    pub page_url: String,
    pub clipboard: Arc<dyn Clipboard>,
    pub parent: Option<Arc<dyn RefreshFeed>>,
}

/// One meme with its likes, comments and delete action.
pub struct PostCard {
    ctx: CardContext,
    meme: RwLock<Meme>,
    comments: RwLock<Vec<Comment>>,
    comments_open: AtomicBool,
    comments_loading: AtomicBool,
    draft: Mutex<String>,
    liking: BusyFlag,
    deleting: BusyFlag,
    subscription: Mutex<Option<Subscription>>,
}

impl PostCard {
    pub fn new(meme: Meme, ctx: CardContext) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            meme: RwLock::new(meme),
            comments: RwLock::new(Vec::new()),
            comments_open: AtomicBool::new(false),
            comments_loading: AtomicBool::new(false),
            draft: Mutex::new(String::new()),
            liking: BusyFlag::new(),
            deleting: BusyFlag::new(),
            subscription: Mutex::new(None),
        })
    }

    pub async fn meme(&self) -> Meme {
        self.meme.read().await.clone()
    }

    pub async fn meme_id(&self) -> Uuid {
        self.meme.read().await.id
    }

    pub async fn comments(&self) -> Vec<Comment> {
        self.comments.read().await.clone()
    }

    pub fn comments_open(&self) -> bool {
        self.comments_open.load(Ordering::SeqCst)
    }

    /// Restores the viewer's expanded/collapsed state without loading anything.
    pub fn set_comments_open(&self, open: bool) {
        self.comments_open.store(open, Ordering::SeqCst);
    }

    pub fn is_loading_comments(&self) -> bool {
        self.comments_loading.load(Ordering::SeqCst)
    }

    pub fn is_liking(&self) -> bool {
        self.liking.is_set()
    }

    pub fn is_deleting(&self) -> bool {
        self.deleting.is_set()
    }

    // --- Lifecycle ---

    /// Starts following this meme's comments.
    pub async fn mount(self: &Arc<Self>) {
        let id = self.meme_id().await;
        let subscription = self.subscribe_to_own_comments(id);
        *self.subscription.lock().await = Some(subscription);
    }

    pub async fn unmount(&self) {
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.unsubscribe();
        }
    }

    pub async fn is_mounted(&self) -> bool {
        self.subscription.lock().await.is_some()
    }

    /// Hands the card a newer row. A different meme id moves the comment subscription
    /// over to the new meme and drops the old comment list.
    pub async fn set_meme(self: &Arc<Self>, meme: Meme) {
        let new_id = meme.id;
        let old_id = std::mem::replace(&mut *self.meme.write().await, meme).id;
        if old_id == new_id {
            return;
        }

        self.comments.write().await.clear();
        let mut slot = self.subscription.lock().await;
        if let Some(old) = slot.take() {
            old.unsubscribe();
            *slot = Some(self.subscribe_to_own_comments(new_id));
        }
        drop(slot);

        if self.comments_open() {
            let _ = self.load_comments().await;
        }
    }

    /// Reloads the comment list on changes to `meme_id`'s comments, but only while the list
    /// is expanded.
    pub fn subscribe_to_own_comments(self: &Arc<Self>, meme_id: Uuid) -> Subscription {
        let card = Arc::downgrade(self);
        self.ctx
            .backend
            .changes
            .subscribe(ChangeFilter::meme(Table::Comments, meme_id), move |_| {
                let card = card.clone();
                async move {
                    if let Some(card) = card.upgrade() {
                        if card.comments_open() {
                            let _ = card.load_comments().await;
                        }
                    }
                }
            })
    }

    // --- Comments ---

    /// Flips comment visibility. Expanding loads the comments. Returns the new state.
    pub async fn toggle_comments(&self) -> Result<bool, BoardError> {
        let open = !self.comments_open.fetch_xor(true, Ordering::SeqCst);
        if open {
            self.load_comments().await?;
        }
        Ok(open)
    }

    /// Comments of this meme, newest first.
    pub async fn load_comments(&self) -> Result<Vec<Comment>, BoardError> {
        let id = self.meme_id().await;
        self.comments_loading.store(true, Ordering::SeqCst);
        let result = self.ctx.backend.comments.list_for_meme(id).await;
        self.comments_loading.store(false, Ordering::SeqCst);

        match result {
            Ok(comments) => {
                *self.comments.write().await = comments.clone();
                Ok(comments)
            }
            Err(e) => Err(self.fail(Failure::LoadComments, e)),
        }
    }

    pub async fn comment_draft(&self) -> String {
        self.draft.lock().await.clone()
    }

    pub async fn set_comment_draft(&self, text: impl Into<String>) {
        *self.draft.lock().await = text.into();
    }

    /// Posts the current draft.
    pub async fn add_draft_comment(&self) -> Result<Option<Comment>, BoardError> {
        let draft = self.comment_draft().await;
        self.add_comment(&draft).await
    }

    /// Posts `text` trimmed. Blank text is ignored and leaves the draft as it is.
    ///
    /// The comment list is not touched here; it refreshes through the subscription.
    pub async fn add_comment(&self, text: &str) -> Result<Option<Comment>, BoardError> {
        let content = text.trim();
        if content.is_empty() {
            return Ok(None);
        }

        let id = self.meme_id().await;
        let comment = self
            .ctx
            .backend
            .comments
            .insert(id, content.to_string())
            .await
            .map_err(|e| self.fail(Failure::AddComment, e))?;

        self.draft.lock().await.clear();
        tracing::debug!(meme_id = %id, comment_id = %comment.id, "Comment added");
        self.ctx.notices.success("Comment added!");
        Ok(Some(comment))
    }

    // --- Likes ---

    /// Records a like and writes `likes_count + 1`, computed from the row this card holds.
    ///
    /// The counter is a read-modify-write on a client snapshot, not an atomic increment:
    /// two clients liking at once can both write the same value, so the counter may end up
    /// below the number of audit rows in `likes`. Returns the value written.
    pub async fn like(&self) -> Result<u64, BoardError> {
        let _busy = self.liking.try_acquire().ok_or(BoardError::Busy("like"))?;
        let meme = self.meme().await;

        self.ctx
            .backend
            .likes
            .insert(meme.id)
            .await
            .map_err(|e| self.fail(Failure::Like, e))?;

        let likes_count = meme.likes_count + 1;
        self.ctx
            .backend
            .memes
            .set_likes_count(meme.id, likes_count)
            .await
            .map_err(|e| self.fail(Failure::Like, e))?;

        tracing::debug!(meme_id = %meme.id, likes_count, "Meme liked");
        self.ctx.notices.success("Meme liked!");
        self.refresh_parent().await;
        Ok(likes_count)
    }

    // --- Moderation ---

    /// Deletes this meme after checking the admin password. A stored file is removed first;
    /// if that fails the row stays.
    pub async fn request_delete(&self, password: &str) -> Result<(), BoardError> {
        if !self.ctx.admin.matches(password) {
            let err = BoardError::IncorrectPassword;
            self.ctx.notices.error(err.to_string());
            return Err(err);
        }
        let _busy = self.deleting.try_acquire().ok_or(BoardError::Busy("delete"))?;
        let meme = self.meme().await;

        if let Some(key) = self.ctx.backend.storage_domain.object_path(&meme.media_url) {
            tracing::debug!(meme_id = %meme.id, object_key = %key, "Removing stored media");
            self.ctx
                .backend
                .storage
                .remove(&[key])
                .await
                .map_err(|e| self.fail(Failure::Delete, e))?;
        }

        self.ctx
            .backend
            .memes
            .delete(meme.id)
            .await
            .map_err(|e| self.fail(Failure::Delete, e))?;

        tracing::info!(meme_id = %meme.id, "Meme deleted");
        self.ctx.notices.success("Meme deleted successfully");
        self.refresh_parent().await;
        Ok(())
    }

    // --- Sharing ---

    /// Copies the board's page URL. Always reports success; a clipboard failure is only logged.
    pub fn copy_share_link(&self) -> String {
        let link = self.ctx.page_url.clone();
        if let Err(e) = self.ctx.clipboard.write_text(&link) {
            tracing::debug!(error = %e, "Clipboard write failed");
        }
        self.ctx.notices.success("Link copied to clipboard!");
        link
    }

    async fn refresh_parent(&self) {
        if let Some(parent) = &self.ctx.parent {
            parent.refresh().await;
        }
    }

    fn fail(&self, action: Failure, source: impl Into<BackendError>) -> BoardError {
        let err = BoardError::backend(action, source);
        tracing::error!(error = ?err, "{}", action);
        self.ctx.notices.error(err.to_string());
        err
    }
}
