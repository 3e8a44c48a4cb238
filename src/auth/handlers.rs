use axum::{
    extract::{FromRef, Query, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use time::Duration;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        callback::{self, CallbackStep},
        cookies::{clear_session, write_session, REFRESH_COOKIE},
        dto::{
            AuthResponse, CallbackParams, EmailRequest, LoginRequest, PublicUser, RefreshRequest,
            RegisterRequest, ResetPasswordRequest,
        },
        repo::{self, CodeKind, User},
        services::{
            generate_code, hash_password, is_valid_email, verify_password, AuthUser, IssuedTokens,
            JwtKeys, MIN_PASSWORD_LEN,
        },
    },
    error::{AppError, AppResult},
    state::AppState,
};

const CODE_TTL_MINUTES: i64 = 30;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/recover", post(request_recovery))
        .route("/auth/magic-link", post(request_magic_link))
        .route("/auth/reset", post(reset_password))
        .route("/auth/callback", get(auth_callback))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn respond(
    jar: CookieJar,
    keys: &JwtKeys,
    tokens: IssuedTokens,
    user: User,
) -> (CookieJar, Json<AuthResponse>) {
    let jar = write_session(jar, keys, &tokens);
    (
        jar,
        Json(AuthResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            remember_me: tokens.remember_me,
            user: PublicUser {
                id: user.id,
                email: user.email,
            },
        }),
    )
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<RegisterRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::Validation("Password too short".into()));
    }

    // Ensure email is not taken
    if let Ok(Some(_)) = User::find_by_email(&state.db, &payload.email).await {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        AppError::Internal(e)
    })?;

    let user = User::create(&state.db, &payload.email, &hash).await.map_err(|e| {
        error!(error = %e, "create user failed");
        AppError::Internal(e)
    })?;

    let keys = JwtKeys::from_ref(&state);
    let tokens = keys.issue(user.id, payload.remember_me)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(respond(jar, &keys, tokens, user))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }

    let user = match User::find_by_email(&state.db, &payload.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %payload.email, "login unknown email");
            return Err(AppError::Unauthorized);
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(AppError::Internal(e));
        }
    };

    let ok = verify_password(&payload.password, &user.password_hash)?;
    if !ok {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized);
    }

    let keys = JwtKeys::from_ref(&state);
    let tokens = keys.issue(user.id, payload.remember_me)?;

    info!(user_id = %user.id, remember_me = payload.remember_me, "user logged in");
    Ok(respond(jar, &keys, tokens, user))
}

#[instrument(skip(state, jar, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Option<Json<RefreshRequest>>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let token = payload
        .and_then(|Json(p)| p.refresh_token)
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .ok_or(AppError::Unauthorized)?;

    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_refresh(&token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        AppError::Unauthorized
    })?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or(AppError::Unauthorized)?;

    // Keep the remember-me choice made at login.
    let tokens = keys.issue(user.id, claims.remember)?;
    Ok(respond(jar, &keys, tokens, user))
}

/// Drops the session cookies and every cached signed URL so the next user
/// of this server never sees the previous user's photo links.
#[instrument(skip(state, jar))]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (StatusCode, CookieJar) {
    state.signed_urls.clear();
    info!("session cleared");
    (StatusCode::NO_CONTENT, clear_session(jar))
}

async fn issue_code_for(state: &AppState, email: &str, kind: CodeKind) -> AppResult<()> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email".into()));
    }
    // Unknown addresses get the same answer as known ones.
    let Some(user) = User::find_by_email(&state.db, &email).await? else {
        warn!(%email, kind = kind.as_str(), "code requested for unknown email");
        return Ok(());
    };
    let code = generate_code();
    repo::insert_code(&state.db, &code, user.id, kind, Duration::minutes(CODE_TTL_MINUTES)).await?;
    // No mailer is wired in; the link is logged for delivery by the operator.
    info!(
        user_id = %user.id,
        link = %format!("/api/v1/auth/callback?code={}&type={}", code, kind.as_str()),
        "auth link issued"
    );
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn request_recovery(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<StatusCode> {
    issue_code_for(&state, &payload.email, CodeKind::Recovery).await?;
    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state, payload))]
pub async fn request_magic_link(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<StatusCode> {
    issue_code_for(&state, &payload.email, CodeKind::Magiclink).await?;
    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<StatusCode> {
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation("Password too short".into()));
    }
    let hash = hash_password(&payload.password)?;
    User::update_password(&state.db, user_id, &hash).await?;
    info!(%user_id, "password reset");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /auth/callback?code&error&type&next
///
/// Exchanges a one-time code for a session and redirects to the login page,
/// the password reset page or the requested `next` path.
#[instrument(skip(state, jar, params), fields(kind = ?params.kind))]
pub async fn auth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> (CookieJar, Redirect) {
    let (code, recovery, next) = match callback::plan(&params) {
        CallbackStep::Fail(reason) => {
            warn!(%reason, "auth callback failed");
            return (jar, Redirect::to(&callback::login_redirect(&reason)));
        }
        CallbackStep::Exchange { code, recovery, next } => (code, recovery, next),
    };

    let (user_id, kind) = match repo::consume_code(&state.db, &code).await {
        Ok(Some(found)) => found,
        Ok(None) => {
            warn!("auth code invalid or expired");
            return (jar, Redirect::to(&callback::login_redirect("invalid_code")));
        }
        Err(e) => {
            error!(error = %e, "auth code exchange failed");
            return (jar, Redirect::to(&callback::login_redirect("exchange_failed")));
        }
    };

    let keys = JwtKeys::from_ref(&state);
    let tokens = match keys.issue(user_id, false) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "jwt sign failed");
            return (jar, Redirect::to(&callback::login_redirect("exchange_failed")));
        }
    };

    info!(%user_id, kind = kind.as_str(), "auth code exchanged");
    let jar = write_session(jar, &keys, &tokens);
    (jar, Redirect::to(&callback::success_redirect(kind, recovery, next)))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<PublicUser>> {
    let user = User::find_by_id(&state.db, user_id).await?.ok_or_else(|| {
        error!(user_id = %user_id, "user not found");
        AppError::Unauthorized
    })?;

    Ok(Json(PublicUser {
        id: user.id,
        email: user.email,
    }))
}

#[cfg(test)]
mod me_tests {
    use super::*;

    #[test]
    fn test_me_response_serialization() {
        let response = PublicUser {
            id: uuid::Uuid::new_v4(),
            email: "test@example.com".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("id"));
    }
}
