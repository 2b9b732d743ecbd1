use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Resource class of a stored object, as the media store understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Auto,
    Image,
    Video,
    Raw,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Auto => "auto",
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Raw => "raw",
        }
    }

    /// Guess from an upload's declared content type.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type.and_then(|ct| ct.split('/').next()) {
            Some("image") => MediaKind::Image,
            Some("video") | Some("audio") => MediaKind::Video,
            Some(_) => MediaKind::Raw,
            None => MediaKind::Auto,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(MediaKind::Auto),
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            "raw" => Ok(MediaKind::Raw),
            other => Err(format!("unknown media type '{other}'")),
        }
    }
}

/// Represents the 'media' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Media {
    pub id: i64,
    pub post_id: i64,
    pub url: String,
    pub thumbnail_url: Option<String>,
    #[serde(skip)]
    pub public_id: Option<String>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// What the deletion path needs to know about a media row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub id: i64,
    pub post_id: i64,
    pub url: String,
    pub public_id: Option<String>,
    pub kind: MediaKind,
}

impl MediaRef {
    /// Identifier to hand to the media store: the one recorded at upload
    /// time, otherwise the last URL path segment without its extension.
    pub fn remote_id(&self) -> Option<String> {
        self.public_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| public_id_from_url(&self.url))
    }
}

impl From<Media> for MediaRef {
    fn from(row: Media) -> Self {
        MediaRef {
            id: row.id,
            post_id: row.post_id,
            kind: row.kind.parse().unwrap_or(MediaKind::Auto),
            url: row.url,
            public_id: row.public_id,
        }
    }
}

/// `https://host/a/b/v17/name.jpg` → `name`.
///
/// Only the final segment is considered, so objects stored under folders
/// cannot be recovered this way; rows written by this service carry an
/// explicit `public_id` instead.
pub fn public_id_from_url(raw: &str) -> Option<String> {
    let url = url::Url::parse(raw).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let stem = segment.split('.').next()?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_id_is_last_segment_without_extension() {
        assert_eq!(
            public_id_from_url(
                "https://res.cloudinary.com/demo/image/upload/v1712345678/kq3xv9ab.jpg"
            )
            .as_deref(),
            Some("kq3xv9ab")
        );
        assert_eq!(
            public_id_from_url("https://res.cloudinary.com/demo/raw/upload/notes").as_deref(),
            Some("notes")
        );
    }

    #[test]
    fn unparseable_urls_have_no_public_id() {
        assert_eq!(public_id_from_url("not a url"), None);
        assert_eq!(public_id_from_url("https://example.com/"), None);
        assert_eq!(public_id_from_url("https://example.com/.hidden"), None);
    }

    #[test]
    fn stored_public_id_wins_over_url() {
        let media = MediaRef {
            id: 1,
            post_id: 1,
            url: "https://res.cloudinary.com/demo/image/upload/v1/other.png".into(),
            public_id: Some("posts/abc".into()),
            kind: MediaKind::Image,
        };
        assert_eq!(media.remote_id().as_deref(), Some("posts/abc"));
    }

    #[test]
    fn kind_from_content_type() {
        assert_eq!(MediaKind::from_content_type(Some("image/png")), MediaKind::Image);
        assert_eq!(MediaKind::from_content_type(Some("video/mp4")), MediaKind::Video);
        assert_eq!(
            MediaKind::from_content_type(Some("application/pdf")),
            MediaKind::Raw
        );
        assert_eq!(MediaKind::from_content_type(None), MediaKind::Auto);
        assert_eq!("video".parse::<MediaKind>(), Ok(MediaKind::Video));
    }
}
