use axum::{
    Extension,
    extract::{Query, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    db::post_views::{POST_COLUMNS, hydrate},
    error::AppError,
    models::post::{Post, PostListParams},
    utils::{jwt::Claims, response::ApiResponse},
};

/// Latest public root posts from everyone.
pub async fn simple_for_you(
    State(pool): State<PgPool>,
    Query(params): Query<PostListParams>,
) -> Result<impl IntoResponse, AppError> {
    let posts = sqlx::query_as::<_, Post>(&format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts p
        WHERE p.parent_post_id IS NULL
          AND p.visibility = 'public'
          AND ($1::TIMESTAMPTZ IS NULL OR p.created_at < $1)
        ORDER BY p.created_at DESC
        LIMIT $2
        "#
    ))
    .bind(params.cursor)
    .bind(params.page_size())
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load for-you feed: {:?}", e);
        AppError::from(e)
    })?;

    let feed = hydrate(&pool, posts).await?;
    Ok(ApiResponse::ok("Simple For You feed fetched successfully", feed))
}

/// Root posts of the users the caller follows, any visibility.
pub async fn following(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<PostListParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.principal()?.user_id;

    let posts = sqlx::query_as::<_, Post>(&format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts p
        JOIN follows f ON f.following_id = p.user_id AND f.follower_id = $1
        WHERE p.parent_post_id IS NULL
          AND ($2::TIMESTAMPTZ IS NULL OR p.created_at < $2)
        ORDER BY p.created_at DESC
        LIMIT $3
        "#
    ))
    .bind(user_id)
    .bind(params.cursor)
    .bind(params.page_size())
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load following feed for {}: {:?}", user_id, e);
        AppError::from(e)
    })?;

    let feed = hydrate(&pool, posts).await?;
    Ok(ApiResponse::ok("Following feed fetched successfully", feed))
}
