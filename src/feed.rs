use crate::admin::AdminPassword;
use crate::backend::Backend;
use crate::busy::BusyFlag;
use crate::errors::{BackendError, BoardError, Failure};
use crate::media::{object_key_for, parse_media_url, validate_file};
use crate::models::{MediaFile, MediaType, Meme, NewMeme};
use crate::notice::Notices;
use crate::realtime::{ChangeFilter, Subscription, Table};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// State of the "share a meme" form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadForm {
    pub title: String,
    pub media_url: String,
    /// Last selected media type; used when the media comes from a URL.
    pub media_type: MediaType,
    pub file: Option<MediaFile>,
}

/// Owns the meme list, the upload form and the board-wide moderation action.
///
/// [`FeedController::session`] hands out further controllers over the same list, each with
/// its own form and busy flags.
pub struct FeedController {
    backend: Backend,
    notices: Notices,
    admin: AdminPassword,
    memes: Arc<RwLock<Vec<Meme>>>,
    form: Mutex<UploadForm>,
    uploading: BusyFlag,
    clearing: BusyFlag,
    subscription: Mutex<Option<Subscription>>,
}

impl FeedController {
    pub fn new(backend: Backend, notices: Notices, admin: AdminPassword) -> Arc<Self> {
        Arc::new(Self {
            backend,
            notices,
            admin,
            memes: Arc::new(RwLock::new(Vec::new())),
            form: Mutex::new(UploadForm::default()),
            uploading: BusyFlag::new(),
            clearing: BusyFlag::new(),
            subscription: Mutex::new(None),
        })
    }

    /// Controller for one more viewer of this feed. Reloads from either side replace the
    /// same list; the form and busy flags are the session's own. Sessions start unmounted.
    pub fn session(&self) -> Arc<Self> {
        Arc::new(Self {
            backend: self.backend.clone(),
            notices: self.notices.clone(),
            admin: self.admin.clone(),
            memes: self.memes.clone(),
            form: Mutex::new(UploadForm::default()),
            uploading: BusyFlag::new(),
            clearing: BusyFlag::new(),
            subscription: Mutex::new(None),
        })
    }

    /// Snapshot of the current feed, newest first.
    pub async fn memes(&self) -> Vec<Meme> {
        self.memes.read().await.clone()
    }

    pub async fn meme(&self, id: uuid::Uuid) -> Option<Meme> {
        self.memes.read().await.iter().find(|m| m.id == id).cloned()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading.is_set()
    }

    pub fn is_clearing(&self) -> bool {
        self.clearing.is_set()
    }

    /// Loads the feed and starts following the memes table.
    pub async fn mount(self: &Arc<Self>) {
        // Failures are reported by load_feed.
        let _ = self.load_feed().await;
        let subscription = self.subscribe_to_changes();
        *self.subscription.lock().await = Some(subscription);
    }

    /// Stops following the memes table.
    pub async fn unmount(&self) {
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.unsubscribe();
        }
    }

    pub async fn is_mounted(&self) -> bool {
        self.subscription.lock().await.is_some()
    }

    /// Replaces the in-memory list with a fresh copy. On failure the previous list is kept.
    pub async fn load_feed(&self) -> Result<(), BoardError> {
        match self.backend.memes.list_newest_first().await {
            Ok(memes) => {
                tracing::debug!(count = memes.len(), "Feed reloaded");
                *self.memes.write().await = memes;
                Ok(())
            }
            Err(e) => Err(self.fail(Failure::LoadFeed, e)),
        }
    }

    /// Reloads the feed on every insert, update or delete in the memes table.
    ///
    /// The callback only holds a weak reference, so the subscription never keeps the
    /// controller alive.
    pub fn subscribe_to_changes(self: &Arc<Self>) -> Subscription {
        let feed = Arc::downgrade(self);
        self.backend
            .changes
            .subscribe(ChangeFilter::table(Table::Memes), move |event| {
                let feed = feed.clone();
                async move {
                    if let Some(feed) = feed.upgrade() {
                        tracing::debug!(?event, "Memes changed, reloading feed");
                        let _ = feed.load_feed().await;
                    }
                }
            })
    }

    // --- Upload form ---

    pub async fn form(&self) -> UploadForm {
        self.form.lock().await.clone()
    }

    pub async fn set_title(&self, title: impl Into<String>) {
        self.form.lock().await.title = title.into();
    }

    /// Typing a URL detaches any selected file.
    pub async fn set_media_url(&self, media_url: impl Into<String>) {
        let mut form = self.form.lock().await;
        form.media_url = media_url.into();
        form.file = None;
    }

    pub async fn set_media_type(&self, media_type: MediaType) {
        self.form.lock().await.media_type = media_type;
    }

    /// Validates and attaches a file. A rejected file leaves the form untouched.
    pub async fn attach_file(&self, file: MediaFile) -> Result<MediaType, BoardError> {
        let media_type = validate_file(&file).map_err(|e| self.reject(e))?;
        let mut form = self.form.lock().await;
        form.media_url.clear();
        form.media_type = media_type;
        form.file = Some(file);
        Ok(media_type)
    }

    /// Submits whatever the form currently holds.
    pub async fn submit_form(&self) -> Result<Meme, BoardError> {
        let form = self.form().await;
        self.submit_upload(form).await
    }

    /// Creates a meme from `form`. An attached file wins over the URL field; files are
    /// validated before anything is sent. On success the form is reset and the feed reloaded.
    pub async fn submit_upload(&self, form: UploadForm) -> Result<Meme, BoardError> {
        let _busy = self.uploading.try_acquire().ok_or(BoardError::Busy("upload"))?;

        let (media_url, media_type) = match form.file {
            Some(file) => {
                let media_type = validate_file(&file).map_err(|e| self.reject(e))?;
                let key = object_key_for(&file.file_name);
                let content_type = file.mime();
                tracing::debug!(object_key = %key, %media_type, size = file.size(), "Uploading media");
                self.backend
                    .storage
                    .upload(&key, file.data, content_type)
                    .await
                    .map_err(|e| self.fail(Failure::Upload, e))?;
                (self.backend.storage.public_url(&key), media_type)
            }
            None if !form.media_url.trim().is_empty() => {
                let media_url = parse_media_url(&form.media_url).map_err(|e| self.reject(e))?;
                (media_url, form.media_type)
            }
            None => return Err(self.reject(BoardError::MissingMedia)),
        };

        let new_meme = NewMeme {
            title: Some(form.title).filter(|t| !t.is_empty()),
            media_url,
            media_type,
        };
        let meme = self
            .backend
            .memes
            .insert(new_meme)
            .await
            .map_err(|e| self.fail(Failure::Upload, e))?;

        *self.form.lock().await = UploadForm::default();
        tracing::info!(meme_id = %meme.id, media_type = %meme.media_type, "Meme created");
        self.notices.success("Meme uploaded successfully!");
        let _ = self.load_feed().await;
        Ok(meme)
    }

    // --- Moderation ---

    /// Deletes every meme and every stored file that belongs to our storage.
    ///
    /// A failed file deletion aborts before any row is touched. The feed is reloaded
    /// whether or not the clear succeeded.
    pub async fn clear_all(&self, password: &str) -> Result<usize, BoardError> {
        if !self.admin.matches(password) {
            return Err(self.reject(BoardError::IncorrectPassword));
        }
        let _busy = self.clearing.try_acquire().ok_or(BoardError::Busy("clear"))?;

        let result = self.remove_everything().await;
        let outcome = match result {
            Ok(removed) => {
                tracing::info!(removed, "Board cleared");
                self.notices.success("All memes have been cleared");
                Ok(removed)
            }
            Err(e) => Err(self.fail(Failure::ClearAll, e)),
        };
        let _ = self.load_feed().await;
        outcome
    }

    async fn remove_everything(&self) -> Result<usize, BackendError> {
        let domain = &self.backend.storage_domain;
        let hosted = self.backend.memes.list_with_media_url_like(domain.pattern()).await?;
        let keys: Vec<String> = hosted
            .iter()
            .filter_map(|meme| domain.object_path(&meme.media_url))
            .collect();

        if !keys.is_empty() {
            tracing::debug!(count = keys.len(), "Removing stored media");
            self.backend.storage.remove(&keys).await?;
        }

        Ok(self.backend.memes.delete_all().await?)
    }

    // --- Notices ---

    fn reject(&self, err: BoardError) -> BoardError {
        tracing::debug!(error = %err, "Feed action rejected");
        self.notices.error(err.to_string());
        err
    }

    fn fail(&self, action: Failure, source: impl Into<BackendError>) -> BoardError {
        let err = BoardError::backend(action, source);
        tracing::error!(error = ?err, "{}", action);
        self.notices.error(err.to_string());
        err
    }
}
