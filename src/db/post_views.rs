//! Read-side assembly of posts with their media, like counts and direct
//! replies, batched so a page costs a fixed number of queries.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        media::Media,
        post::{CommentView, Post, PostView},
    },
};

pub const POST_COLUMNS: &str =
    "p.id, p.user_id, p.parent_post_id, p.content, p.visibility, p.created_at, p.updated_at";

#[derive(sqlx::FromRow)]
struct LikeCount {
    post_id: i64,
    count: i64,
}

async fn media_by_post(pool: &PgPool, ids: &[i64]) -> Result<HashMap<i64, Vec<Media>>, AppError> {
    let rows = sqlx::query_as::<_, Media>(
        r#"
        SELECT id, post_id, url, thumbnail_url, public_id, type, created_at
        FROM media
        WHERE post_id = ANY($1)
        ORDER BY id
        "#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<i64, Vec<Media>> = HashMap::new();
    for row in rows {
        grouped.entry(row.post_id).or_default().push(row);
    }
    Ok(grouped)
}

async fn like_counts(pool: &PgPool, ids: &[i64]) -> Result<HashMap<i64, i64>, AppError> {
    let rows = sqlx::query_as::<_, LikeCount>(
        r#"
        SELECT post_id, COUNT(*) AS count
        FROM post_likes
        WHERE post_id = ANY($1)
        GROUP BY post_id
        "#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| (r.post_id, r.count)).collect())
}

async fn replies_by_parent(pool: &PgPool, parent_ids: &[i64]) -> Result<HashMap<i64, Vec<Post>>, AppError> {
    let rows = sqlx::query_as::<_, Post>(&format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts p
        WHERE p.parent_post_id = ANY($1)
        ORDER BY p.updated_at DESC
        "#
    ))
    .bind(parent_ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<i64, Vec<Post>> = HashMap::new();
    for row in rows {
        if let Some(parent) = row.parent_post_id {
            grouped.entry(parent).or_default().push(row);
        }
    }
    Ok(grouped)
}

/// Attaches media, like counts and one level of replies to `posts`,
/// preserving their order.
pub async fn hydrate(pool: &PgPool, posts: Vec<Post>) -> Result<Vec<PostView>, AppError> {
    if posts.is_empty() {
        return Ok(Vec::new());
    }

    let post_ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
    let mut replies = replies_by_parent(pool, &post_ids).await?;

    let mut all_ids = post_ids;
    all_ids.extend(replies.values().flatten().map(|r| r.id));

    let media = media_by_post(pool, &all_ids).await?;
    let likes = like_counts(pool, &all_ids).await?;

    let views = posts
        .into_iter()
        .map(|post| {
            let comments = replies
                .remove(&post.id)
                .unwrap_or_default()
                .into_iter()
                .map(|reply| CommentView {
                    media: media.get(&reply.id).cloned().unwrap_or_default(),
                    like_count: likes.get(&reply.id).copied().unwrap_or(0),
                    post: reply,
                })
                .collect();

            PostView {
                media: media.get(&post.id).cloned().unwrap_or_default(),
                like_count: likes.get(&post.id).copied().unwrap_or(0),
                comments,
                post,
            }
        })
        .collect();

    Ok(views)
}
