use crate::admin::AdminPassword;
use crate::backend::Backend;
use crate::card::{CardContext, PostCard};
use crate::feed::FeedController;
use crate::notice::Notices;
use crate::share::Clipboard;
use std::sync::Arc;
use uuid::Uuid;

/// The page as the server hosts it: one mounted feed shared by every viewer.
///
/// Per-viewer state (upload form, busy flags, comment visibility) lives in the handles
/// returned by [`Board::feed_session`] and [`Board::card`], which last for one request.
pub struct Board {
    feed: Arc<FeedController>,
    ctx: CardContext,
}

impl Board {
    pub fn new(
        backend: Backend,
        notices: Notices,
        admin: AdminPassword,
        page_url: String,
        clipboard: Arc<dyn Clipboard>,
    ) -> Arc<Self> {
        let feed = FeedController::new(backend.clone(), notices.clone(), admin.clone());
        let ctx = CardContext {
            backend,
            notices,
            admin,
            page_url,
            clipboard,
            parent: Some(feed.clone()),
        };
        Arc::new(Self { feed, ctx })
    }

    pub fn feed(&self) -> &Arc<FeedController> {
        &self.feed
    }

    pub async fn mount(&self) {
        self.feed.mount().await;
    }

    pub async fn unmount(&self) {
        self.feed.unmount().await;
    }

    /// Upload form and moderation handle for one viewer, over the shared meme list.
    pub fn feed_session(&self) -> Arc<FeedController> {
        self.feed.session()
    }

    /// Unmounted card for one viewer, built from the meme's row in the current feed.
    /// Likes and deletes refresh the shared feed.
    pub async fn card(&self, meme_id: Uuid) -> Option<Arc<PostCard>> {
        let meme = self.feed.meme(meme_id).await?;
        Some(PostCard::new(meme, self.ctx.clone()))
    }
}
