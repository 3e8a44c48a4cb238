use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

/// Record an uploaded photo object and its owner.
pub async fn insert_photo(db: &PgPool, photo_id: Uuid, user_id: Uuid, path: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO photos (id, user_id, path)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(photo_id)
    .bind(user_id)
    .bind(path)
    .execute(db)
    .await
    .context("insert photo")?;

    Ok(())
}

/// Whether `path` was uploaded by `user_id`.
pub async fn is_owned_by(db: &PgPool, user_id: Uuid, path: &str) -> anyhow::Result<bool> {
    let found = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT count(*)
          FROM photos
         WHERE user_id = $1 AND path = $2
        "#,
    )
    .bind(user_id)
    .bind(path)
    .fetch_one(db)
    .await
    .context("check photo owner")?;

    Ok(found > 0)
}

/// Remove the ownership row of a deleted photo object.
pub async fn delete_photo(db: &PgPool, user_id: Uuid, path: &str) -> anyhow::Result<()> {
    sqlx::query(r#"DELETE FROM photos WHERE user_id = $1 AND path = $2"#)
        .bind(user_id)
        .bind(path)
        .execute(db)
        .await
        .context("delete photo")?;
    Ok(())
}
