// src/routes.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, feed, follows, likes, posts},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Public and protected sub-routers per resource; protected ones sit
///   behind `auth_middleware`.
/// * Global middleware: Trace, CORS.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let require_auth = || middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/password-reset/send", post(auth::send_password_reset_code))
        .route("/password-reset/confirm", post(auth::confirm_password_reset))
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .route(
                    "/email-verification/send",
                    post(auth::send_verification_code),
                )
                .route("/email-verification/verify", post(auth::verify_email))
                .layer(require_auth()),
        );

    // Room for several files per post on top of the per-file limit.
    let upload_limit = state.config.max_upload_bytes.saturating_mul(4);

    let post_routes = Router::new()
        .route("/{id}", get(posts::get_post))
        .route("/users/{id}", get(posts::list_user_posts))
        .merge(
            Router::new()
                .route("/", post(posts::create_post))
                .route("/{id}", axum::routing::delete(posts::delete_post))
                .layer(DefaultBodyLimit::max(upload_limit))
                .layer(require_auth()),
        );

    let like_routes = Router::new()
        .route("/posts/{post_id}", get(likes::likes_count))
        .merge(
            Router::new()
                .route("/{post_id}", post(likes::toggle_like))
                .layer(require_auth()),
        );

    let follow_routes = Router::new()
        .route("/followers/{user_id}", get(follows::follower_count))
        .route("/following/{user_id}", get(follows::following_count))
        .merge(
            Router::new()
                .route("/{user_id}", post(follows::toggle_follow))
                .layer(require_auth()),
        );

    let feed_routes = Router::new()
        .route("/simple-for-you", get(feed::simple_for_you))
        .merge(
            Router::new()
                .route("/following", get(feed::following))
                .layer(require_auth()),
        );

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/posts", post_routes)
        .nest("/api/likes", like_routes)
        .nest("/api/follows", follow_routes)
        .nest("/api/feed", feed_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
