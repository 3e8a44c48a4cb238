use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One day in a calendar view.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarCell {
    pub date: String,
    pub caption: Option<String>,
    pub photo_path: Option<String>,
    pub photo_url: Option<String>,
    pub sticker_count: usize,
    pub is_favorite: bool,
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub year: i32,
    pub month: u8,
}

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    /// Any day inside the wanted week.
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct MonthResponse {
    pub year: i32,
    pub month: u8,
    pub grid: Vec<String>,
    pub entries: BTreeMap<String, CalendarCell>,
}

#[derive(Debug, Serialize)]
pub struct WeekResponse {
    pub start: String,
    pub end: String,
    pub days: Vec<String>,
    pub entries: BTreeMap<String, CalendarCell>,
}
