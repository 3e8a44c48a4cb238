use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use tracing::{debug, instrument};

use super::dto::{MonthQuery, MonthResponse, WeekQuery, WeekResponse};
use super::services;
use crate::{
    auth::AuthUser,
    entries::{
        repo,
        services::{format_date, parse_date},
    },
    error::AppResult,
    state::AppState,
};

pub fn calendar_routes() -> Router<AppState> {
    Router::new()
        .route("/calendar/month", get(month_view))
        .route("/calendar/week", get(week_view))
}

/// GET /calendar/month?year=2025&month=4
#[instrument(skip(state))]
pub async fn month_view(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<MonthQuery>,
) -> AppResult<Json<MonthResponse>> {
    let (first, last) = services::month_bounds(q.year, q.month)?;
    let rows = repo::list_range(&state.db, user_id, first, last).await?;
    debug!(rows = rows.len(), "month entries loaded");

    let entries = services::build_lookup(rows, &state.signed_urls).await;
    let grid = services::month_grid(first, last)?
        .into_iter()
        .map(format_date)
        .collect();

    Ok(Json(MonthResponse {
        year: q.year,
        month: q.month,
        grid,
        entries,
    }))
}

/// GET /calendar/week?date=2025-01-15
#[instrument(skip(state))]
pub async fn week_view(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<WeekQuery>,
) -> AppResult<Json<WeekResponse>> {
    let (start, end) = services::week_bounds(parse_date(&q.date)?)?;
    let rows = repo::list_range(&state.db, user_id, start, end).await?;
    let entries = services::build_lookup(rows, &state.signed_urls).await;

    Ok(Json(WeekResponse {
        start: format_date(start),
        end: format_date(end),
        days: services::days_between(start, end)
            .into_iter()
            .map(format_date)
            .collect(),
        entries,
    }))
}
