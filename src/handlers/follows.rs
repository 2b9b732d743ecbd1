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

async fn ensure_user_exists(pool: &PgPool, user_id: i64) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Err(AppError::NotFound("User with given ID not found".to_string()));
    }
    Ok(())
}

/// Follow a user, or unfollow if already following.
pub async fn toggle_follow(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    ApiPath(following_id): ApiPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let follower_id = claims.principal()?.user_id;

    if follower_id == following_id {
        return Err(AppError::BadRequest("User cannot follow themselves".to_string()));
    }
    ensure_user_exists(&pool, following_id).await?;

    let removed = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND following_id = $2")
        .bind(follower_id)
        .bind(following_id)
        .execute(&pool)
        .await?
        .rows_affected();

    if removed > 0 {
        return Ok(ApiResponse::message("User unfollowed", StatusCode::OK));
    }

    sqlx::query("INSERT INTO follows (follower_id, following_id) VALUES ($1, $2)")
        .bind(follower_id)
        .bind(following_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return AppError::Conflict("Already following".to_string());
            }
            tracing::error!("Failed to follow user {}: {:?}", following_id, e);
            AppError::from(e)
        })?;

    Ok(ApiResponse::message("User followed successfully", StatusCode::CREATED))
}

pub async fn follower_count(
    State(pool): State<PgPool>,
    ApiPath(user_id): ApiPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_user_exists(&pool, user_id).await?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE following_id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await?;

    Ok(ApiResponse::ok("Follower count fetched", CountResponse { count }))
}

pub async fn following_count(
    State(pool): State<PgPool>,
    ApiPath(user_id): ApiPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_user_exists(&pool, user_id).await?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE follower_id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await?;

    Ok(ApiResponse::ok("Following count fetched", CountResponse { count }))
}
