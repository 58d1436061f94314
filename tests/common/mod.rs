#![allow(dead_code)]

use b2_adapter::{
    B2Adapter, LocalObjectStore,
    client::{ByteStream, KeyRestriction},
    config::AdapterConfig,
    models::bucket::{Bucket, BucketType},
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tempfile::TempDir;

pub const BUCKET: &str = "adapter-tests";
pub const BASE_URL: &str = "http://localhost:3000";

/// A migrated store over an in-memory database and a temporary payload root.
///
/// The pool holds a single connection; every connection to `sqlite::memory:`
/// would otherwise see its own empty database.
pub struct TestEnv {
    pub store: LocalObjectStore,
    pub bucket: Bucket,
    pub dir: TempDir,
}

impl TestEnv {
    pub async fn new(bucket_type: BucketType) -> Self {
        Self::with_store(bucket_type, |store| store).await
    }

    pub async fn with_store(
        bucket_type: BucketType,
        customize: impl FnOnce(LocalObjectStore) -> LocalObjectStore,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = customize(LocalObjectStore::new(Arc::new(pool), dir.path(), BASE_URL));
        store.migrate().await.unwrap();
        let bucket = store.create_bucket(BUCKET, bucket_type).await.unwrap();
        Self { store, bucket, dir }
    }

    pub async fn restricted(restriction: KeyRestriction) -> Self {
        Self::with_store(BucketType::AllPrivate, |store| store.with_restriction(restriction)).await
    }

    pub async fn adapter(&self) -> B2Adapter {
        self.adapter_with(AdapterConfig::for_bucket(BUCKET)).await
    }

    pub async fn adapter_with(&self, config: AdapterConfig) -> B2Adapter {
        B2Adapter::connect(Arc::new(self.store.clone()), config)
            .await
            .unwrap()
    }
}

pub fn body(data: &'static [u8]) -> ByteStream {
    stream::once(async move { Ok(Bytes::from_static(data)) }).boxed()
}

pub fn chunked(chunks: &[&'static str]) -> ByteStream {
    let chunks: Vec<_> = chunks
        .iter()
        .map(|c| Ok(Bytes::from_static(c.as_bytes())))
        .collect();
    stream::iter(chunks).boxed()
}

pub async fn collect(stream: ByteStream) -> Vec<u8> {
    let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
    chunks.concat()
}
