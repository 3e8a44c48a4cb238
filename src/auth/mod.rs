use crate::state::AppState;
use axum::Router;

pub mod callback;
pub mod cookies;
pub mod dto;
pub mod handlers;
pub mod repo;
mod repo_types;
pub mod services;

pub use services::AuthUser;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
