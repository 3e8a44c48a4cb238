use std::collections::BTreeMap;

use time::{Date, Duration, Month};

use super::dto::CalendarCell;
use crate::entries::repo_types::Entry;
use crate::entries::services::format_date;
use crate::error::AppError;
use crate::photos::signed_urls::SignedUrlCache;

/// First and last day of a month.
pub fn month_bounds(year: i32, month: u8) -> Result<(Date, Date), AppError> {
    let m = Month::try_from(month)
        .map_err(|_| AppError::Validation(format!("Invalid month: {}", month)))?;
    let first = Date::from_calendar_date(year, m, 1)
        .map_err(|_| AppError::Validation(format!("Invalid year: {}", year)))?;
    let days = time::util::days_in_year_month(year, m);
    Ok((first, first + Duration::days(i64::from(days) - 1)))
}

fn out_of_range() -> AppError {
    AppError::Validation("Date is out of range".into())
}

/// Sunday-started week containing `date`. Weeks that run past the supported
/// calendar are rejected.
pub fn week_bounds(date: Date) -> Result<(Date, Date), AppError> {
    let back = Duration::days(i64::from(date.weekday().number_days_from_sunday()));
    let start = date.checked_sub(back).ok_or_else(out_of_range)?;
    let end = start.checked_add(Duration::days(6)).ok_or_else(out_of_range)?;
    Ok((start, end))
}

/// Every cell of the month layout: whole Sunday-started weeks covering the
/// month, so 28, 35 or 42 days.
pub fn month_grid(first: Date, last: Date) -> Result<Vec<Date>, AppError> {
    let (start, _) = week_bounds(first)?;
    let (_, end) = week_bounds(last)?;
    Ok(days_between(start, end))
}

pub fn days_between(from: Date, to: Date) -> Vec<Date> {
    let mut out = Vec::new();
    let mut d = from;
    while d <= to {
        out.push(d);
        match d.next_day() {
            Some(n) => d = n,
            None => break,
        }
    }
    out
}

/// Date-keyed lookup for a calendar window. Photos are resolved one entry
/// after another through the shared URL cache.
pub async fn build_lookup(entries: Vec<Entry>, urls: &SignedUrlCache) -> BTreeMap<String, CalendarCell> {
    let mut lookup = BTreeMap::new();
    for entry in entries {
        let photo_url = match entry.photo_path.as_deref() {
            Some(path) => urls.get_signed_url(path).await,
            None => None,
        };
        let date = format_date(entry.date);
        lookup.insert(
            date.clone(),
            CalendarCell {
                date,
                caption: entry.praise,
                photo_path: entry.photo_path,
                photo_url,
                sticker_count: entry.stickers.0.len(),
                is_favorite: entry.is_favorite,
            },
        );
    }
    lookup
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::services::{fixtures, parse_date};
    use crate::storage::{FakeStorage, StorageClient};
    use std::sync::Arc;

    fn d(s: &str) -> Date {
        parse_date(s).unwrap()
    }

    #[test]
    fn bounds_of_thirty_day_month() {
        let (first, last) = month_bounds(2025, 4).unwrap();
        assert_eq!(first, d("2025-04-01"));
        assert_eq!(last, d("2025-04-30"));
    }

    #[test]
    fn bounds_of_leap_february() {
        let (_, last) = month_bounds(2024, 2).unwrap();
        assert_eq!(last, d("2024-02-29"));
    }

    #[test]
    fn invalid_month_is_rejected() {
        assert!(month_bounds(2025, 0).is_err());
        assert!(month_bounds(2025, 13).is_err());
    }

    #[test]
    fn grid_starts_on_sunday() {
        let (first, last) = month_bounds(2025, 4).unwrap();
        let grid = month_grid(first, last).unwrap();
        assert_eq!(grid.len(), 35);
        assert_eq!(grid[0], d("2025-03-30"));
        assert_eq!(*grid.last().unwrap(), d("2025-05-03"));
    }

    #[test]
    fn grid_sizes_stay_within_six_weeks() {
        // February 2026 starts on a Sunday and fits four rows.
        let (first, last) = month_bounds(2026, 2).unwrap();
        assert_eq!(month_grid(first, last).unwrap().len(), 28);
        // August 2025 starts on a Friday and needs six rows.
        let (first, last) = month_bounds(2025, 8).unwrap();
        assert_eq!(month_grid(first, last).unwrap().len(), 42);
    }

    #[test]
    fn week_of_a_wednesday() {
        let (start, end) = week_bounds(d("2025-01-15")).unwrap();
        assert_eq!(start, d("2025-01-12"));
        assert_eq!(end, d("2025-01-18"));
        assert_eq!(days_between(start, end).len(), 7);
    }

    #[test]
    fn weeks_past_the_calendar_edge_are_rejected() {
        // 9999-12-31 is a Friday; its week would end in year 10000.
        assert!(matches!(week_bounds(d("9999-12-31")), Err(AppError::Validation(_))));
        let (first, last) = month_bounds(9999, 12).unwrap();
        assert!(matches!(month_grid(first, last), Err(AppError::Validation(_))));

        // The earliest date is a Monday; its Sunday does not exist.
        assert!(week_bounds(Date::MIN).is_err());
        assert!(week_bounds(d("9999-12-25")).is_ok());
    }

    #[tokio::test]
    async fn month_lookup_has_one_key_per_entry() {
        let storage = Arc::new(FakeStorage::new());
        let urls = SignedUrlCache::new(
            storage.clone() as Arc<dyn StorageClient>,
            std::time::Duration::from_secs(3600),
            std::time::Duration::from_secs(3000),
        );
        let entries = vec![
            fixtures::entry("2025-04-04", Some("sunny"), Some("aaaaaaaa-0000-0000-0000-000000000004.webp")),
            fixtures::entry("2025-04-06", Some("rest day"), None),
            fixtures::entry("2025-04-08", None, Some("aaaaaaaa-0000-0000-0000-000000000008.webp")),
        ];

        let lookup = build_lookup(entries, &urls).await;

        assert_eq!(lookup.len(), 3);
        assert!(lookup["2025-04-04"].photo_url.is_some());
        assert!(lookup["2025-04-06"].photo_url.is_none());
        assert!(lookup["2025-04-08"].photo_url.is_some());
        assert_eq!(lookup["2025-04-06"].caption.as_deref(), Some("rest day"));
        assert_eq!(storage.presign_calls(), 2);
    }
}
