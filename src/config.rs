use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    /// Refresh TTL when the user asked to be remembered.
    pub refresh_ttl_minutes: i64,
    /// Refresh TTL for a session-only login.
    pub session_refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoConfig {
    /// Lifetime of a presigned GET URL.
    pub signed_url_ttl_secs: u64,
    /// Age after which a cached URL is re-signed. Always below the TTL.
    pub signed_url_refresh_secs: u64,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub font_url: String,
    pub settle_ms: u64,
    pub pixel_ratio: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub photos: PhotoConfig,
    pub export: ExportConfig,
}

const DEFAULT_FONT_URL: &str =
    "https://raw.githubusercontent.com/google/fonts/main/ofl/nanumgothic/NanumGothic-Regular.ttf";

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "daypat".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "daypat-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
            session_refresh_ttl_minutes: env_or("JWT_SESSION_REFRESH_TTL_MINUTES", 60 * 12),
        };
        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT").context("S3_ENDPOINT is not set")?,
            bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "entry-photos".into()),
            access_key: std::env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY is not set")?,
            secret_key: std::env::var("S3_SECRET_KEY").context("S3_SECRET_KEY is not set")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };
        let photos = PhotoConfig {
            signed_url_ttl_secs: env_or("SIGNED_URL_TTL_SECS", 60 * 60),
            signed_url_refresh_secs: env_or("SIGNED_URL_REFRESH_SECS", 50 * 60),
            max_upload_bytes: env_or("MAX_PHOTO_BYTES", 10 * 1024 * 1024),
        };
        let export = ExportConfig {
            font_url: std::env::var("EXPORT_FONT_URL").unwrap_or_else(|_| DEFAULT_FONT_URL.into()),
            settle_ms: env_or("EXPORT_SETTLE_MS", 100),
            pixel_ratio: env_or("EXPORT_PIXEL_RATIO", 2),
        };

        let config = Self {
            database_url,
            jwt,
            storage,
            photos,
            export,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.photos.signed_url_refresh_secs < self.photos.signed_url_ttl_secs,
            "SIGNED_URL_REFRESH_SECS ({}) must be shorter than SIGNED_URL_TTL_SECS ({})",
            self.photos.signed_url_refresh_secs,
            self.photos.signed_url_ttl_secs
        );
        anyhow::ensure!(self.export.pixel_ratio >= 1, "EXPORT_PIXEL_RATIO must be at least 1");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::state::AppState;

    #[tokio::test]
    async fn fake_config_is_valid() {
        let state = AppState::fake();
        state.config.validate().expect("fake config should validate");
    }

    #[tokio::test]
    async fn refresh_window_must_be_shorter_than_ttl() {
        let state = AppState::fake();
        let mut config = (*state.config).clone();
        config.photos.signed_url_refresh_secs = config.photos.signed_url_ttl_secs;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SIGNED_URL_REFRESH_SECS"));
    }
}
