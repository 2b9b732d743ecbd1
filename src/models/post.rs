use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::media::Media;

/// Who may see a post in feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Followers,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Followers => "followers",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "followers" => Ok(Visibility::Followers),
            other => Err(format!("Unknown visibility '{other}'")),
        }
    }
}

/// Represents the 'posts' table in the database.
/// A post with a `parent_post_id` is a reply.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub parent_post_id: Option<i64>,
    pub content: String,
    pub visibility: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A direct reply as embedded in a post view.
#[derive(Debug, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub post: Post,
    pub media: Vec<Media>,
    pub like_count: i64,
}

/// A post with its media, like count and direct replies.
#[derive(Debug, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub media: Vec<Media>,
    pub like_count: i64,
    pub comments: Vec<CommentView>,
}

/// Text fields of the multipart body used to create a post.
#[derive(Debug, Default, Validate)]
pub struct CreatePostRequest {
    #[validate(length(
        min = 1,
        max = 10000,
        message = "Post content must be between 1 and 10000 characters"
    ))]
    pub content: String,

    pub visibility: Visibility,

    /// Set when the post is a reply.
    #[validate(range(min = 1, message = "Invalid parent post id provided"))]
    pub parent_post_id: Option<i64>,
}

/// A file part of the multipart body, not yet uploaded.
#[derive(Debug)]
pub struct PendingUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Query parameters for feeds and post lists.
#[derive(Debug, Deserialize)]
pub struct PostListParams {
    /// Cursor for pagination: the created_at timestamp of the last post in the previous page.
    pub cursor: Option<chrono::DateTime<chrono::Utc>>,

    /// Number of items to return (default: 20, max: 100).
    pub limit: Option<i64>,
}

impl PostListParams {
    pub fn page_size(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedPost {
    pub post_id: i64,
    pub media: Vec<Media>,
}

#[derive(Debug, Serialize)]
pub struct DeletedPost {
    pub deleted_id: i64,
}
