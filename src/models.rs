use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Category of a meme's media, derived from its MIME type when uploaded.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Image,
    Video,
}

impl MediaType {
    /// Classifies a MIME type. Returns `None` for anything that is not `image/*` or `video/*`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Meme {
    pub id: Uuid,
    pub title: Option<String>,
    pub media_url: String,
    pub media_type: MediaType,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub likes_count: u64,
}

/// Row payload for a meme insert. The backend assigns `id`, `created_at` and a zero `likes_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeme {
    pub title: Option<String>,
    pub media_url: String,
    pub media_type: MediaType,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: Uuid,
    pub meme_id: Uuid,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Append-only audit row written for every like.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Like {
    pub id: Uuid,
    pub meme_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A file attached to the upload form.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl MediaFile {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// The declared MIME type, or one guessed from the file name.
    pub fn mime(&self) -> Option<String> {
        self.content_type
            .clone()
            .filter(|ct| !ct.trim().is_empty())
            .or_else(|| {
                mime_guess::from_path(&self.file_name)
                    .first_raw()
                    .map(|s| s.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_mime_types() {
        assert_eq!(MediaType::from_mime("image/png"), Some(MediaType::Image));
        assert_eq!(MediaType::from_mime("VIDEO/mp4"), Some(MediaType::Video));
        assert_eq!(MediaType::from_mime("application/pdf"), None);
        assert_eq!(MediaType::from_mime(""), None);
    }

    #[test]
    fn guesses_missing_mime_from_file_name() {
        let file = MediaFile::new("clip.mp4", None, vec![1, 2, 3]);
        assert_eq!(file.mime().as_deref(), Some("video/mp4"));

        let declared = MediaFile::new("clip.bin", Some("image/gif".into()), vec![]);
        assert_eq!(declared.mime().as_deref(), Some("image/gif"));
    }

    #[test]
    fn meme_serializes_media_type_lowercase() {
        let meme = Meme {
            id: Uuid::nil(),
            title: None,
            media_url: "https://example.com/cat.jpg".into(),
            media_type: MediaType::Video,
            created_at: OffsetDateTime::UNIX_EPOCH,
            likes_count: 3,
        };
        let value = serde_json::to_value(&meme).unwrap();
        assert_eq!(value["media_type"], "video");
        assert_eq!(value["created_at"], "1970-01-01T00:00:00Z");
        assert!(value["title"].is_null());
    }
}
