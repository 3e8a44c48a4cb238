use lazy_static::lazy_static;
use regex::Regex;
use time::{macros::format_description, Date};

use super::dto::{DayCard, UpsertDayCardRequest};
use super::repo_types::{Entry, EntryWrite, Sticker};
use crate::error::AppError;
use crate::photos::signed_urls::SignedUrlCache;

pub const MAX_CAPTION_CHARS: usize = 200;
pub const MAX_STICKERS: usize = 50;
pub const MAX_STICKER_SCALE: f32 = 5.0;

pub fn parse_date(s: &str) -> Result<Date, AppError> {
    Date::parse(s, format_description!("[year]-[month]-[day]")).map_err(|_| AppError::Validation(format!("Invalid date: {}", s)))
}

pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]")).unwrap_or_else(|_| date.to_string())
}

/// Photo objects are flat `{uuid}.webp` keys.
pub fn is_valid_photo_path(path: &str) -> bool {
    lazy_static! {
        static ref PHOTO_PATH_RE: Regex =
            Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\.webp$")
                .unwrap();
    }
    PHOTO_PATH_RE.is_match(path)
}

fn is_valid_sticker_id(id: &str) -> bool {
    lazy_static! {
        static ref STICKER_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap();
    }
    STICKER_ID_RE.is_match(id)
}

fn validate_sticker(s: &Sticker) -> Result<(), AppError> {
    if !is_valid_sticker_id(&s.id) {
        return Err(AppError::Validation(format!("Invalid sticker id: {}", s.id)));
    }
    let in_unit = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);
    if !in_unit(s.x) || !in_unit(s.y) {
        return Err(AppError::Validation("Sticker position must be within the card".into()));
    }
    if !s.scale.is_finite() || s.scale <= 0.0 || s.scale > MAX_STICKER_SCALE {
        return Err(AppError::Validation("Sticker scale out of range".into()));
    }
    if !s.rotation.is_finite() {
        return Err(AppError::Validation("Sticker rotation must be a number".into()));
    }
    Ok(())
}

/// Normalize and check an upsert body. Blank captions are stored as NULL.
pub fn validate_write(req: UpsertDayCardRequest) -> Result<EntryWrite, AppError> {
    let praise = req
        .caption
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(c) = &praise {
        if c.chars().count() > MAX_CAPTION_CHARS {
            return Err(AppError::Validation(format!(
                "Caption must be at most {} characters",
                MAX_CAPTION_CHARS
            )));
        }
    }

    if let Some(p) = &req.photo_path {
        if !is_valid_photo_path(p) {
            return Err(AppError::Validation("Invalid photo path".into()));
        }
    }

    if req.stickers.len() > MAX_STICKERS {
        return Err(AppError::Validation(format!("At most {} stickers per card", MAX_STICKERS)));
    }
    for s in &req.stickers {
        validate_sticker(s)?;
    }

    Ok(EntryWrite {
        praise,
        photo_path: req.photo_path,
        stickers: req.stickers,
    })
}

/// Project an entry to a card, resolving its photo through the URL cache.
pub async fn to_day_card(entry: Entry, urls: &SignedUrlCache) -> DayCard {
    let photo_url = match entry.photo_path.as_deref() {
        Some(path) => urls.get_signed_url(path).await,
        None => None,
    };
    DayCard {
        id: entry.id,
        date: format_date(entry.date),
        caption: entry.praise,
        photo_path: entry.photo_path,
        photo_url,
        stickers: entry.stickers.0,
        is_favorite: entry.is_favorite,
        created_at: entry.created_at,
        updated_at: entry.updated_at,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use sqlx::types::Json;
    use time::OffsetDateTime;
    use uuid::Uuid;

    pub fn entry(date: &str, praise: Option<&str>, photo_path: Option<&str>) -> Entry {
        Entry {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            date: parse_date(date).unwrap(),
            praise: praise.map(Into::into),
            photo_path: photo_path.map(Into::into),
            stickers: Json(Vec::new()),
            is_favorite: false,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FakeStorage, StorageClient};
    use std::sync::Arc;
    use std::time::Duration;

    const PHOTO: &str = "0b7e9c4a-1d2f-4e3a-9b8c-7d6e5f4a3b2c.webp";

    fn sticker(x: f32, y: f32, scale: f32) -> Sticker {
        Sticker {
            id: "heart".into(),
            x,
            y,
            scale,
            rotation: 15.0,
            z_index: 1,
        }
    }

    #[test]
    fn dates_parse_and_format() {
        let d = parse_date("2025-01-15").unwrap();
        assert_eq!(format_date(d), "2025-01-15");
        assert!(parse_date("2025-13-01").is_err());
        assert!(parse_date("15/01/2025").is_err());
    }

    #[test]
    fn photo_paths_are_flat_uuid_webp() {
        assert!(is_valid_photo_path(PHOTO));
        assert!(!is_valid_photo_path("../secret.webp"));
        assert!(!is_valid_photo_path("user/0b7e9c4a-1d2f-4e3a-9b8c-7d6e5f4a3b2c.webp"));
        assert!(!is_valid_photo_path("0b7e9c4a-1d2f-4e3a-9b8c-7d6e5f4a3b2c.png"));
    }

    #[test]
    fn blank_caption_becomes_none() {
        let write = validate_write(UpsertDayCardRequest {
            caption: Some("   ".into()),
            photo_path: None,
            stickers: vec![],
        })
        .unwrap();
        assert!(write.praise.is_none());
    }

    #[test]
    fn caption_is_trimmed_and_bounded() {
        let write = validate_write(UpsertDayCardRequest {
            caption: Some("  Went for a walk ".into()),
            photo_path: Some(PHOTO.into()),
            stickers: vec![sticker(0.5, 0.5, 1.0)],
        })
        .unwrap();
        assert_eq!(write.praise.as_deref(), Some("Went for a walk"));

        let long = "가".repeat(MAX_CAPTION_CHARS + 1);
        assert!(validate_write(UpsertDayCardRequest {
            caption: Some(long),
            photo_path: None,
            stickers: vec![],
        })
        .is_err());
    }

    #[test]
    fn korean_caption_counts_chars_not_bytes() {
        let caption = "산책".repeat(MAX_CAPTION_CHARS / 2);
        assert!(validate_write(UpsertDayCardRequest {
            caption: Some(caption),
            photo_path: None,
            stickers: vec![],
        })
        .is_ok());
    }

    #[test]
    fn stickers_are_checked() {
        for bad in [sticker(1.5, 0.5, 1.0), sticker(0.5, -0.1, 1.0), sticker(0.5, 0.5, 0.0), sticker(0.5, 0.5, f32::NAN)] {
            assert!(validate_write(UpsertDayCardRequest {
                caption: None,
                photo_path: None,
                stickers: vec![bad],
            })
            .is_err());
        }
        let mut odd_id = sticker(0.5, 0.5, 1.0);
        odd_id.id = "../../etc".into();
        assert!(validate_write(UpsertDayCardRequest {
            caption: None,
            photo_path: None,
            stickers: vec![odd_id],
        })
        .is_err());
    }

    #[tokio::test]
    async fn card_without_photo_has_no_url() {
        let storage = Arc::new(FakeStorage::new());
        let urls = SignedUrlCache::new(
            storage.clone() as Arc<dyn StorageClient>,
            Duration::from_secs(3600),
            Duration::from_secs(3000),
        );
        let card = to_day_card(fixtures::entry("2025-01-15", Some("Went for a walk"), None), &urls).await;
        assert_eq!(card.date, "2025-01-15");
        assert_eq!(card.caption.as_deref(), Some("Went for a walk"));
        assert!(card.photo_url.is_none());
        assert_eq!(storage.presign_calls(), 0);

        let card = to_day_card(fixtures::entry("2025-01-16", None, Some(PHOTO)), &urls).await;
        assert!(card.photo_url.unwrap().contains(PHOTO));
    }
}
