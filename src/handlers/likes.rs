use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::{AppError, is_unique_violation},
    models::user::CountResponse,
    utils::{extract::ApiPath, jwt::Claims, response::ApiResponse},
};

async fn ensure_post_exists(pool: &PgPool, post_id: i64) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
        .bind(post_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Err(AppError::NotFound("No post found with given ID".to_string()));
    }
    Ok(())
}

/// Toggle Like on a post.
/// 201 when the post became liked, 200 when the like was removed.
pub async fn toggle_like(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    ApiPath(post_id): ApiPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.principal()?.user_id;
    ensure_post_exists(&pool, post_id).await?;

    let mut tx = pool.begin().await?;

    // 1. Unlike if a like exists
    let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if removed > 0 {
        tx.commit().await?;
        return Ok(ApiResponse::message("Unliked post successfully", StatusCode::OK));
    }

    // 2. Otherwise like
    sqlx::query("INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2)")
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                // Concurrent request handled gracefully
                return AppError::Conflict("Already liked".to_string());
            }
            tracing::error!("Failed to like post {}: {:?}", post_id, e);
            AppError::from(e)
        })?;

    tx.commit().await?;

    Ok(ApiResponse::message("Post liked successfully", StatusCode::CREATED))
}

/// Number of likes on a post.
pub async fn likes_count(
    State(pool): State<PgPool>,
    ApiPath(post_id): ApiPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_post_exists(&pool, post_id).await?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = $1")
        .bind(post_id)
        .fetch_one(&pool)
        .await?;

    Ok(ApiResponse::ok("Likes count fetched", CountResponse { count }))
}
