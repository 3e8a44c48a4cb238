use anyhow::Context;
use sqlx::{types::Json, PgPool};
use time::Date;
use uuid::Uuid;

use super::repo_types::{Entry, EntryWrite};

const ENTRY_COLUMNS: &str =
    "id, user_id, date, praise, photo_path, stickers, is_favorite, created_at, updated_at";

pub async fn fetch_by_date(db: &PgPool, user_id: Uuid, date: Date) -> anyhow::Result<Option<Entry>> {
    let row = sqlx::query_as::<_, Entry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries WHERE user_id = $1 AND date = $2"
    ))
    .bind(user_id)
    .bind(date)
    .fetch_optional(db)
    .await
    .context("fetch entry by date")?;
    Ok(row)
}

/// Insert or replace the entry for (user, date). The unique constraint on
/// that pair is what keeps one card per day.
pub async fn upsert(db: &PgPool, user_id: Uuid, date: Date, write: &EntryWrite) -> anyhow::Result<Entry> {
    let row = sqlx::query_as::<_, Entry>(&format!(
        r#"
        INSERT INTO entries (user_id, date, praise, photo_path, stickers)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id, date) DO UPDATE
           SET praise = EXCLUDED.praise,
               photo_path = EXCLUDED.photo_path,
               stickers = EXCLUDED.stickers,
               updated_at = now()
        RETURNING {ENTRY_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(date)
    .bind(write.praise.as_deref())
    .bind(write.photo_path.as_deref())
    .bind(Json(&write.stickers))
    .fetch_one(db)
    .await
    .context("upsert entry")?;
    Ok(row)
}

/// All entries in `[from, to]`, oldest first.
pub async fn list_range(db: &PgPool, user_id: Uuid, from: Date, to: Date) -> anyhow::Result<Vec<Entry>> {
    let rows = sqlx::query_as::<_, Entry>(&format!(
        r#"
        SELECT {ENTRY_COLUMNS}
          FROM entries
         WHERE user_id = $1 AND date BETWEEN $2 AND $3
         ORDER BY date ASC
        "#
    ))
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_all(db)
    .await
    .context("list entries in range")?;
    Ok(rows)
}

pub async fn set_favorite(
    db: &PgPool,
    user_id: Uuid,
    date: Date,
    favorite: bool,
) -> anyhow::Result<Option<Entry>> {
    let row = sqlx::query_as::<_, Entry>(&format!(
        r#"
        UPDATE entries
           SET is_favorite = $3, updated_at = now()
         WHERE user_id = $1 AND date = $2
        RETURNING {ENTRY_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(date)
    .bind(favorite)
    .fetch_optional(db)
    .await
    .context("set favorite")?;
    Ok(row)
}

pub async fn list_favorites(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<Entry>> {
    let rows = sqlx::query_as::<_, Entry>(&format!(
        r#"
        SELECT {ENTRY_COLUMNS}
          FROM entries
         WHERE user_id = $1 AND is_favorite
         ORDER BY date DESC
         LIMIT $2 OFFSET $3
        "#
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list favorites")?;
    Ok(rows)
}

/// Whether any of the user's entries still shows `photo_path`.
pub async fn photo_in_use(db: &PgPool, user_id: Uuid, photo_path: &str) -> anyhow::Result<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"SELECT count(*) FROM entries WHERE user_id = $1 AND photo_path = $2"#,
    )
    .bind(user_id)
    .bind(photo_path)
    .fetch_one(db)
    .await
    .context("count photo references")?;
    Ok(count > 0)
}
