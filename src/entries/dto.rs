use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub use super::repo_types::Sticker;

/// Client-facing projection of an entry.
#[derive(Debug, Clone, Serialize)]
pub struct DayCard {
    pub id: Uuid,
    pub date: String,
    pub caption: Option<String>,
    pub photo_path: Option<String>,
    pub photo_url: Option<String>,
    pub stickers: Vec<Sticker>,
    pub is_favorite: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// `card` is `null` when nothing was written for the date yet.
#[derive(Debug, Serialize)]
pub struct DayCardResponse {
    pub date: String,
    pub card: Option<DayCard>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertDayCardRequest {
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub photo_path: Option<String>,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub favorite: bool,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 { 20 }
