use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                     // unique user ID
    pub email: String,                // user email
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 hash, not exposed in JSON
    pub created_at: OffsetDateTime,   // creation timestamp
}

/// What a one-time auth code unlocks when it is exchanged at the callback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    Magiclink,
    Recovery,
}

impl CodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeKind::Magiclink => "magiclink",
            CodeKind::Recovery => "recovery",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "magiclink" => Some(CodeKind::Magiclink),
            "recovery" => Some(CodeKind::Recovery),
            _ => None,
        }
    }
}

/// Row returned when an auth code is consumed.
#[derive(Debug, Clone, FromRow)]
pub struct RedeemedCodeRow {
    pub user_id: Uuid,
    pub kind: String,
}
