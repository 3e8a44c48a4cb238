use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::dto::{DayCard, DayCardResponse, FavoriteRequest, Pagination, UpsertDayCardRequest};
use super::{repo, services};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    photos,
    state::AppState,
};

pub fn entry_routes() -> Router<AppState> {
    Router::new()
        .route("/entries/:date", get(get_day_card).put(upsert_day_card))
        .route("/entries/:date/favorite", put(set_favorite))
        .route("/favorites", get(list_favorites))
}

/// GET /entries/:date
#[instrument(skip(state))]
pub async fn get_day_card(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(date): Path<String>,
) -> AppResult<Json<DayCardResponse>> {
    let day = services::parse_date(&date)?;
    let card = match repo::fetch_by_date(&state.db, user_id, day).await? {
        Some(entry) => Some(services::to_day_card(entry, &state.signed_urls).await),
        None => None,
    };
    Ok(Json(DayCardResponse {
        date: services::format_date(day),
        card,
    }))
}

/// PUT /entries/:date
#[instrument(skip(state, body))]
pub async fn upsert_day_card(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(date): Path<String>,
    Json(body): Json<UpsertDayCardRequest>,
) -> AppResult<Json<DayCard>> {
    let day = services::parse_date(&date)?;
    let write = services::validate_write(body)?;

    if let Some(path) = write.photo_path.as_deref() {
        if !photos::repo::is_owned_by(&state.db, user_id, path).await? {
            warn!(%user_id, %path, "photo not owned by user");
            return Err(AppError::Forbidden);
        }
    }

    let previous = repo::fetch_by_date(&state.db, user_id, day).await?;
    let entry = repo::upsert(&state.db, user_id, day, &write).await?;
    info!(%user_id, date = %date, has_photo = entry.photo_path.is_some(), "day card saved");

    let old_photo = previous.as_ref().and_then(|p| {
        photos::services::replaced_photo(p.photo_path.as_deref(), entry.photo_path.as_deref())
    });
    if let Some(old) = old_photo {
        if !repo::photo_in_use(&state.db, user_id, old).await? {
            if photos::services::discard_photo(state.storage.as_ref(), &state.signed_urls, old).await {
                photos::repo::delete_photo(&state.db, user_id, old).await?;
            }
        }
    }
    Ok(Json(services::to_day_card(entry, &state.signed_urls).await))
}

/// PUT /entries/:date/favorite
#[instrument(skip(state))]
pub async fn set_favorite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(date): Path<String>,
    Json(body): Json<FavoriteRequest>,
) -> AppResult<Json<DayCard>> {
    let day = services::parse_date(&date)?;
    let entry = repo::set_favorite(&state.db, user_id, day, body.favorite)
        .await?
        .ok_or_else(|| AppError::NotFound("No entry for this date".into()))?;
    Ok(Json(services::to_day_card(entry, &state.signed_urls).await))
}

/// GET /favorites
#[instrument(skip(state))]
pub async fn list_favorites(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<Pagination>,
) -> AppResult<Json<Vec<DayCard>>> {
    let limit = p.limit.clamp(1, 100);
    let offset = p.offset.max(0);
    let entries = repo::list_favorites(&state.db, user_id, limit, offset).await?;

    // Resolved one at a time; the URL cache absorbs repeats.
    let mut cards = Vec::with_capacity(entries.len());
    for entry in entries {
        cards.push(services::to_day_card(entry, &state.signed_urls).await);
    }
    Ok(Json(cards))
}
