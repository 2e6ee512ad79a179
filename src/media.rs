use crate::errors::BoardError;
use crate::models::{MediaFile, MediaType};
use uuid::Uuid;

const MIB: u64 = 1024 * 1024;
pub const IMAGE_MAX_BYTES: u64 = 5 * MIB;
pub const VIDEO_MAX_BYTES: u64 = 50 * MIB;

/// Folder inside the bucket that holds every uploaded file.
pub const OBJECT_PREFIX: &str = "memes";

/// Checks size and MIME class of an attached file and returns its media type.
///
/// The size limit is picked first (videos get the larger one, anything else the image one),
/// then the MIME class is checked, so an oversized PDF reports the size problem.
pub fn validate_file(file: &MediaFile) -> Result<MediaType, BoardError> {
    let mime = file.mime();
    let media_type = mime.as_deref().and_then(MediaType::from_mime);

    let limit = match media_type {
        Some(MediaType::Video) => VIDEO_MAX_BYTES,
        _ => IMAGE_MAX_BYTES,
    };
    if file.size() > limit {
        return Err(BoardError::FileTooLarge {
            size: file.size(),
            limit_mib: limit / MIB,
        });
    }

    media_type.ok_or(BoardError::UnsupportedMediaType(mime))
}

/// Fresh object key for an upload: `memes/<uuid>.<ext>`, the extension taken from the file name.
pub fn object_key_for(file_name: &str) -> String {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    format!("{}/{}.{}", OBJECT_PREFIX, Uuid::new_v4(), extension)
}

/// Recognises media URLs served from the board's own object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDomain {
    pattern: String,
}

impl StorageDomain {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into().to_lowercase(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Case-insensitive substring match, like `ilike '%pattern%'`.
    pub fn is_hosted(&self, media_url: &str) -> bool {
        !self.pattern.is_empty() && media_url.to_lowercase().contains(&self.pattern)
    }

    /// Object key of a hosted URL, rebuilt from its last path segment.
    pub fn object_path(&self, media_url: &str) -> Option<String> {
        if !self.is_hosted(media_url) {
            return None;
        }
        let without_query = media_url.split(['?', '#']).next().unwrap_or(media_url);
        let segment = without_query.rsplit('/').next()?;
        if segment.is_empty() {
            return None;
        }
        Some(format!("{}/{}", OBJECT_PREFIX, segment))
    }
}

/// Accepts only absolute http(s) URLs.
pub fn parse_media_url(raw: &str) -> Result<String, BoardError> {
    let trimmed = raw.trim();
    let parsed = url::Url::parse(trimmed).map_err(|_| BoardError::InvalidMediaUrl(trimmed.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        _ => Err(BoardError::InvalidMediaUrl(trimmed.to_string())),
    }
}
