use anyhow::Context;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

pub use crate::auth::repo_types::{CodeKind, User};
use crate::auth::repo_types::RedeemedCodeRow;

impl User {
    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, email, password_hash, created_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with hashed password.
    pub async fn create(db: &PgPool, email: &str, password_hash: &str) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn update_password(db: &PgPool, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET password_hash = $2 WHERE id = $1"#)
            .bind(id)
            .bind(password_hash)
            .execute(db)
            .await
            .context("update password")?;
        Ok(())
    }
}

/// Store a single-use code for `user_id`.
pub async fn insert_code(
    db: &PgPool,
    code: &str,
    user_id: Uuid,
    kind: CodeKind,
    ttl: Duration,
) -> anyhow::Result<()> {
    let expires_at = OffsetDateTime::now_utc() + ttl;
    sqlx::query(
        r#"
        INSERT INTO auth_codes (code, user_id, kind, expires_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(code)
    .bind(user_id)
    .bind(kind.as_str())
    .bind(expires_at)
    .execute(db)
    .await
    .context("insert auth code")?;
    Ok(())
}

/// Mark a code used and return its owner. `None` when the code is unknown,
/// expired or already used.
pub async fn consume_code(db: &PgPool, code: &str) -> anyhow::Result<Option<(Uuid, CodeKind)>> {
    let row = sqlx::query_as::<_, RedeemedCodeRow>(
        r#"
        UPDATE auth_codes
           SET used_at = now()
         WHERE code = $1
           AND used_at IS NULL
           AND expires_at > now()
        RETURNING user_id, kind
        "#,
    )
    .bind(code)
    .fetch_optional(db)
    .await
    .context("consume auth code")?;

    Ok(row.and_then(|r| CodeKind::parse(&r.kind).map(|kind| (r.user_id, kind))))
}
