use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::OnceCell;
use tracing::{info, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Korean caption font, downloaded on first use and kept for the life of the
/// process. A failed download is not cached, so a later export retries.
pub struct FontCache {
    url: String,
    http: reqwest::Client,
    korean: OnceCell<Arc<Vec<u8>>>,
}

impl FontCache {
    pub fn new(url: String) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
            korean: OnceCell::new(),
        }
    }

    /// A cache that already holds `bytes`; nothing is fetched.
    pub fn preloaded(bytes: Vec<u8>) -> Self {
        Self {
            url: String::new(),
            http: reqwest::Client::new(),
            korean: OnceCell::new_with(Some(Arc::new(bytes))),
        }
    }

    /// Font bytes, or `None` when the font cannot be fetched.
    pub async fn korean(&self) -> Option<Arc<Vec<u8>>> {
        match self.korean.get_or_try_init(|| self.fetch()).await {
            Ok(font) => Some(font.clone()),
            Err(e) => {
                warn!(error = %e, url = %self.url, "korean font unavailable, using built-in font");
                None
            }
        }
    }

    async fn fetch(&self) -> anyhow::Result<Arc<Vec<u8>>> {
        let bytes = self
            .http
            .get(&self.url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .context("request font")?
            .error_for_status()
            .context("font response")?
            .bytes()
            .await
            .context("read font body")?;
        anyhow::ensure!(!bytes.is_empty(), "font response was empty");
        info!(bytes = bytes.len(), "korean font loaded");
        Ok(Arc::new(bytes.to_vec()))
    }
}
