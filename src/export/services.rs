use std::sync::Arc;

use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use super::render::CardSource;
use crate::entries::repo_types::Entry;
use crate::storage::StorageClient;

pub const PNG: &str = "image/png";
pub const PDF: &str = "application/pdf";

pub fn card_source(entry: &Entry) -> CardSource {
    CardSource {
        photo_path: entry.photo_path.clone(),
        caption: entry.praise.clone(),
        stickers: entry.stickers.0.clone(),
    }
}

pub fn export_file_name(date: &str, ext: &str) -> String {
    format!("daypat-{}.{}", date, ext)
}

pub fn share_key(id: Uuid) -> String {
    format!("shares/{}.png", id)
}

/// A file download response.
pub fn attachment(body: Vec<u8>, content_type: &'static str, file_name: &str) -> Response {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

#[derive(Debug)]
pub enum ShareOutcome {
    Link { url: String, expires_in: u64 },
    /// Sharing failed; the caller hands the PNG over as a download instead.
    Download,
}

/// Store the PNG under `shares/` and sign a link to it.
pub async fn deliver_share(storage: Arc<dyn StorageClient>, png: Bytes, ttl_secs: u64) -> ShareOutcome {
    let key = share_key(Uuid::new_v4());
    if let Err(e) = storage.put_object(&key, png, PNG).await {
        warn!(error = %e, %key, "share upload failed, falling back to download");
        return ShareOutcome::Download;
    }
    match storage.presign_get(&key, ttl_secs).await {
        Ok(url) => {
            info!(%key, "share link issued");
            ShareOutcome::Link {
                url,
                expires_in: ttl_secs,
            }
        }
        Err(e) => {
            warn!(error = %e, %key, "share link signing failed, falling back to download");
            ShareOutcome::Download
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FakeStorage;

    #[test]
    fn file_names_carry_the_date() {
        assert_eq!(export_file_name("2025-01-15", "png"), "daypat-2025-01-15.png");
    }

    #[test]
    fn attachment_headers() {
        let res = attachment(vec![1, 2], PDF, "daypat-2025-01-15.pdf");
        assert_eq!(res.headers()[header::CONTENT_TYPE], PDF);
        assert_eq!(
            res.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"daypat-2025-01-15.pdf\""
        );
    }

    #[tokio::test]
    async fn share_stores_under_shares_prefix() {
        let storage = Arc::new(FakeStorage::new());
        let outcome = deliver_share(storage.clone(), Bytes::from_static(b"png"), 600).await;

        let ShareOutcome::Link { url, expires_in } = outcome else {
            panic!("expected a link");
        };
        assert_eq!(expires_in, 600);
        let key = url
            .strip_prefix("https://fake.local/")
            .and_then(|rest| rest.split('?').next())
            .unwrap();
        assert!(key.starts_with("shares/") && key.ends_with(".png"));
        assert!(storage.contains(key));
        assert_eq!(storage.content_type(key).as_deref(), Some(PNG));
    }

    #[tokio::test]
    async fn failed_upload_falls_back_to_download() {
        let storage = Arc::new(FakeStorage::new());
        storage.set_fail_put(true);
        let outcome = deliver_share(storage.clone(), Bytes::from_static(b"png"), 600).await;
        assert!(matches!(outcome, ShareOutcome::Download));
        assert_eq!(storage.presign_calls(), 0);
    }

    #[tokio::test]
    async fn failed_signing_falls_back_to_download() {
        let storage = Arc::new(FakeStorage::new());
        storage.set_fail_presign(true);
        let outcome = deliver_share(storage, Bytes::from_static(b"png"), 600).await;
        assert!(matches!(outcome, ShareOutcome::Download));
    }
}
