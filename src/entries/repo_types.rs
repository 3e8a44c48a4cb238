use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// One decorative sticker placed on a card. Coordinates are normalized to
/// the card's width and height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sticker {
    pub id: String,
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub rotation: f32, // degrees, clockwise
    #[serde(default)]
    pub z_index: i32,
}

fn default_scale() -> f32 {
    1.0
}

/// Row of the `entries` table; one per (user, date).
#[derive(Debug, Clone, FromRow)]
pub struct Entry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: Date,
    pub praise: Option<String>,
    pub photo_path: Option<String>,
    pub stickers: Json<Vec<Sticker>>,
    pub is_favorite: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields written by an upsert.
#[derive(Debug, Clone, Default)]
pub struct EntryWrite {
    pub praise: Option<String>,
    pub photo_path: Option<String>,
    pub stickers: Vec<Sticker>,
}
