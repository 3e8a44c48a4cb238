use std::io::Cursor;

use anyhow::Context;
use bytes::Bytes;
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::repo;
use super::signed_urls::SignedUrlCache;
use crate::error::AppError;
use crate::state::AppState;
use crate::storage::StorageClient;

/// Longest edge of a stored photo.
pub const MAX_EDGE_PX: u32 = 1600;
pub const PHOTO_CONTENT_TYPE: &str = "image/webp";

pub struct StoredPhoto {
    pub path: String,
    pub url: Option<String>,
}

pub fn photo_key(id: Uuid) -> String {
    format!("{}.webp", id)
}

/// Decode any supported upload, shrink it to `MAX_EDGE_PX` and re-encode as
/// WebP.
pub fn normalize_photo(raw: &[u8]) -> anyhow::Result<Vec<u8>> {
    let img = image::load_from_memory(raw).context("decode uploaded photo")?;
    let img = if img.width() > MAX_EDGE_PX || img.height() > MAX_EDGE_PX {
        img.resize(MAX_EDGE_PX, MAX_EDGE_PX, FilterType::Lanczos3)
    } else {
        img
    };
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());

    let mut out = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut out), ImageFormat::WebP)
        .context("encode webp")?;
    debug!(width = rgba.width(), height = rgba.height(), bytes = out.len(), "photo normalized");
    Ok(out)
}

/// Validate, normalize and store an upload, then record its owner.
pub async fn store_photo(st: &AppState, user_id: Uuid, raw: Bytes) -> Result<StoredPhoto, AppError> {
    if raw.is_empty() {
        return Err(AppError::Validation("Photo is empty".into()));
    }
    if raw.len() > st.config.photos.max_upload_bytes {
        return Err(AppError::PayloadTooLarge);
    }

    let encoded = tokio::task::spawn_blocking(move || normalize_photo(&raw))
        .await
        .context("photo worker")?
        .map_err(|e| {
            debug!(error = %e, "photo rejected");
            AppError::Validation("Unsupported image".into())
        })?;

    let id = Uuid::new_v4();
    let path = photo_key(id);
    st.storage
        .put_object(&path, Bytes::from(encoded), PHOTO_CONTENT_TYPE)
        .await
        .with_context(|| format!("put_object {}", path))
        .map_err(AppError::Storage)?;
    repo::insert_photo(&st.db, id, user_id, &path).await?;

    let url = st.signed_urls.get_signed_url(&path).await;
    info!(%user_id, %path, "photo stored");
    Ok(StoredPhoto { path, url })
}

/// The photo an entry no longer shows after a write, if any.
pub fn replaced_photo<'a>(before: Option<&'a str>, after: Option<&str>) -> Option<&'a str> {
    before.filter(|old| Some(*old) != after)
}

/// Delete a photo object and forget its cached URL. Failures are logged;
/// the entry write that dropped the photo has already succeeded.
pub async fn discard_photo(storage: &dyn StorageClient, urls: &SignedUrlCache, path: &str) -> bool {
    urls.forget(path);
    match storage.delete_object(path).await {
        Ok(()) => {
            info!(%path, "replaced photo deleted");
            true
        }
        Err(e) => {
            warn!(error = %e, %path, "replaced photo not deleted");
            false
        }
    }
}

#[cfg(test)]
mod photo_tests {
    use super::*;
    use image::{ImageEncoder, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut out = Vec::new();
        image::codecs::png::PngEncoder::new(&mut out)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    #[test]
    fn keys_are_flat_webp() {
        let id = Uuid::new_v4();
        let key = photo_key(id);
        assert_eq!(key, format!("{}.webp", id));
        assert!(crate::entries::services::is_valid_photo_path(&key));
    }

    #[test]
    fn large_photos_are_downscaled() {
        let out = normalize_photo(&png(3200, 800)).unwrap();
        let decoded = image::load_from_memory_with_format(&out, ImageFormat::WebP).unwrap();
        assert_eq!(decoded.width(), MAX_EDGE_PX);
        assert_eq!(decoded.height(), 400);
    }

    #[test]
    fn small_photos_keep_their_size() {
        let out = normalize_photo(&png(40, 30)).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(normalize_photo(b"definitely not an image").is_err());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_before_decoding() {
        let state = AppState::fake();
        let too_big = Bytes::from(vec![0u8; state.config.photos.max_upload_bytes + 1]);
        let err = store_photo(&state, Uuid::new_v4(), too_big).await.err().unwrap();
        assert!(matches!(err, AppError::PayloadTooLarge));
    }

    #[test]
    fn only_a_changed_photo_counts_as_replaced() {
        assert_eq!(replaced_photo(Some("a.webp"), Some("b.webp")), Some("a.webp"));
        assert_eq!(replaced_photo(Some("a.webp"), None), Some("a.webp"));
        assert_eq!(replaced_photo(Some("a.webp"), Some("a.webp")), None);
        assert_eq!(replaced_photo(None, Some("b.webp")), None);
    }

    #[tokio::test]
    async fn discarded_photo_leaves_storage_and_cache() {
        let storage = std::sync::Arc::new(crate::storage::FakeStorage::new());
        let path = photo_key(Uuid::new_v4());
        storage
            .put_object(&path, Bytes::from_static(b"webp"), PHOTO_CONTENT_TYPE)
            .await
            .unwrap();
        let urls = SignedUrlCache::new(
            storage.clone(),
            std::time::Duration::from_secs(3600),
            std::time::Duration::from_secs(3000),
        );
        urls.get_signed_url(&path).await.unwrap();
        assert_eq!(urls.len(), 1);

        assert!(discard_photo(storage.as_ref(), &urls, &path).await);
        assert!(!storage.contains(&path));
        assert!(urls.is_empty());
    }
}
