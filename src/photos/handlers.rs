use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use tracing::{instrument, warn};

use super::dto::{PhotoBase64Request, PhotoUploadResponse, SignedUrlQuery, SignedUrlResponse};
use super::{repo, services};
use crate::{
    auth::AuthUser,
    entries::services::is_valid_photo_path,
    error::{AppError, AppResult},
    state::AppState,
};

/// Hard cap on request bodies; the per-photo limit from config is checked
/// again after reading.
const BODY_LIMIT: usize = 25 * 1024 * 1024;

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/photos/signed-url", get(signed_url))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/photos", post(upload_multipart)) // multipart field `file`
        .route("/photos/base64", post(upload_base64))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::Validation(e.body_text())
    }
}

/// POST /photos (multipart)
#[instrument(skip(state, mp))]
pub async fn upload_multipart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> AppResult<(StatusCode, Json<PhotoUploadResponse>)> {
    let mut file: Option<Bytes> = None;
    while let Some(field) = mp.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            file = Some(field.bytes().await.map_err(multipart_error)?);
            break;
        }
    }
    let Some(raw) = file else {
        return Err(AppError::Validation("file is required".into()));
    };

    let stored = services::store_photo(&state, user_id, raw).await?;
    Ok((
        StatusCode::CREATED,
        Json(PhotoUploadResponse {
            path: stored.path,
            url: stored.url,
        }),
    ))
}

/// POST /photos/base64 { image_b64: "..." }
#[instrument(skip(state, body))]
pub async fn upload_base64(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<PhotoBase64Request>,
) -> AppResult<(StatusCode, Json<PhotoUploadResponse>)> {
    let b64 = match body.image_b64.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => body.image_b64.as_str(),
    };
    let raw = Base64::decode_vec(b64.trim()).map_err(|_| {
        warn!("invalid base64 photo payload");
        AppError::Validation("invalid base64".into())
    })?;

    let stored = services::store_photo(&state, user_id, Bytes::from(raw)).await?;
    Ok((
        StatusCode::CREATED,
        Json(PhotoUploadResponse {
            path: stored.path,
            url: stored.url,
        }),
    ))
}

/// GET /photos/signed-url?path=...
#[instrument(skip(state))]
pub async fn signed_url(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<SignedUrlQuery>,
) -> AppResult<Json<SignedUrlResponse>> {
    if !is_valid_photo_path(&q.path) {
        return Err(AppError::Validation("Invalid photo path".into()));
    }
    if !repo::is_owned_by(&state.db, user_id, &q.path).await? {
        return Err(AppError::Forbidden);
    }
    let url = state.signed_urls.get_signed_url(&q.path).await;
    Ok(Json(SignedUrlResponse { path: q.path, url }))
}
