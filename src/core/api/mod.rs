pub mod auth;
pub mod error;
pub mod handlers;
pub mod requests;

use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Router};

use crate::core::storage::PostRepository;

pub use error::{ApiError, FieldErrors};

#[derive(Debug, Clone)]
pub struct AppState {
    pub repository: PostRepository,
    pub api_token: Arc<str>,
}

impl AppState {
    pub fn new(repository: PostRepository, api_token: &str) -> Self {
        Self {
            repository,
            api_token: Arc::from(api_token),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/posts",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .route(
            "/api/posts/{id}",
            get(handlers::show_post)
                .put(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .with_state(state)
}
