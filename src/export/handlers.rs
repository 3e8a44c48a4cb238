use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, instrument};

use super::dto::{ExportFormat, ExportQuery, ShareResponse};
use super::services::{self, ShareOutcome};
use super::{pdf, render};
use crate::{
    auth::AuthUser,
    entries::{repo, services::format_date, services::parse_date},
    error::{AppError, AppResult},
    state::AppState,
};

pub fn export_routes() -> Router<AppState> {
    Router::new().route("/entries/:date/export", get(export_card))
}

/// GET /entries/:date/export?format=png|pdf|share
#[instrument(skip(state))]
pub async fn export_card(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(date): Path<String>,
    Query(q): Query<ExportQuery>,
) -> AppResult<Response> {
    let day = parse_date(&date)?;
    let date = format_date(day);
    let entry = repo::fetch_by_date(&state.db, user_id, day)
        .await?
        .ok_or_else(|| AppError::NotFound("No entry for this date".into()))?;

    let export = &state.config.export;
    let font = state.fonts.korean().await;
    let mut source = services::card_source(&entry);
    if q.format == ExportFormat::Pdf {
        // The PDF sets the caption as text under the image instead.
        source.caption = None;
    }
    let card = render::render_card(
        state.storage.clone(),
        &source,
        font.clone(),
        Duration::from_millis(export.settle_ms),
        export.pixel_ratio,
    )
    .await?;
    info!(%user_id, %date, format = ?q.format, "card exported");

    match q.format {
        ExportFormat::Png => Ok(services::attachment(
            card.png,
            services::PNG,
            &services::export_file_name(&date, "png"),
        )),
        ExportFormat::Pdf => {
            let caption = entry.praise.clone();
            let title = date.clone();
            let bytes = tokio::task::spawn_blocking(move || {
                pdf::build_pdf(&card, caption.as_deref(), font.as_deref().map(Vec::as_slice), &title)
            })
            .await
            .context("pdf worker")??;
            Ok(services::attachment(
                bytes,
                services::PDF,
                &services::export_file_name(&date, "pdf"),
            ))
        }
        ExportFormat::Share => {
            let ttl = state.config.photos.signed_url_ttl_secs;
            let png = Bytes::from(card.png);
            match services::deliver_share(state.storage.clone(), png.clone(), ttl).await {
                ShareOutcome::Link { url, expires_in } => {
                    Ok(Json(ShareResponse { url, expires_in }).into_response())
                }
                ShareOutcome::Download => Ok(services::attachment(
                    png.to_vec(),
                    services::PNG,
                    &services::export_file_name(&date, "png"),
                )),
            }
        }
    }
}
