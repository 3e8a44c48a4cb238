use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use async_trait::async_trait;
use bytes::Bytes;

use crate::config::StorageConfig;

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn get_object(&self, key: &str) -> anyhow::Result<Bytes>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
        })
    }
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> anyhow::Result<Bytes> {
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 get_object")?;
        let data = out.body.collect().await.context("s3 read body")?;
        Ok(data.into_bytes())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        let req = self.client.get_object().bucket(&self.bucket).key(key);
        let presigned = req
            .presigned(PresigningConfig::expires_in(
                std::time::Duration::from_secs(seconds),
            )?)
            .await
            .context("s3 presign_get")?;
        Ok(presigned.uri().to_string())
    }
}

/// In-memory object store used by `AppState::fake()` and tests.
///
/// Presigned URLs carry a sequence number so two signatures of the same key
/// are distinguishable.
#[cfg(any(test, feature = "test-util"))]
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
    presign_calls: AtomicUsize,
    fail_presign: AtomicBool,
    fail_put: AtomicBool,
}

#[cfg(any(test, feature = "test-util"))]
impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presign_calls(&self) -> usize {
        self.presign_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_presign(&self, fail: bool) {
        self.fail_presign.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .map(|objects| objects.contains_key(key))
            .unwrap_or(false)
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        let objects = self.objects.lock().ok()?;
        objects.get(key).map(|(_, ct)| ct.clone())
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        if self.fail_put.load(Ordering::SeqCst) {
            anyhow::bail!("fake put_object failure");
        }
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| anyhow::anyhow!("fake storage poisoned"))?;
        objects.insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn get_object(&self, key: &str) -> anyhow::Result<Bytes> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| anyhow::anyhow!("fake storage poisoned"))?;
        objects
            .get(key)
            .map(|(body, _)| body.clone())
            .ok_or_else(|| anyhow::anyhow!("no such key: {}", key))
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| anyhow::anyhow!("fake storage poisoned"))?;
        objects.remove(key);
        Ok(())
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        if self.fail_presign.load(Ordering::SeqCst) {
            anyhow::bail!("fake presign failure");
        }
        let n = self.presign_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("https://fake.local/{}?expires={}&sig={}", key, seconds, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_storage_roundtrips_objects() {
        let storage = FakeStorage::new();
        storage
            .put_object("a.webp", Bytes::from_static(b"abc"), "image/webp")
            .await
            .unwrap();
        assert!(storage.contains("a.webp"));
        assert_eq!(storage.content_type("a.webp").as_deref(), Some("image/webp"));
        assert_eq!(storage.get_object("a.webp").await.unwrap(), Bytes::from_static(b"abc"));

        storage.delete_object("a.webp").await.unwrap();
        assert!(storage.get_object("a.webp").await.is_err());
    }

    #[tokio::test]
    async fn fake_presign_changes_per_call() {
        let storage = FakeStorage::new();
        let a = storage.presign_get("x.webp", 60).await.unwrap();
        let b = storage.presign_get("x.webp", 60).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(storage.presign_calls(), 2);
    }
}
