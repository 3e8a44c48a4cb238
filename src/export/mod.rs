pub mod dto;
pub mod fonts;
pub mod handlers;
pub mod pdf;
pub mod render;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::export_routes()
}
