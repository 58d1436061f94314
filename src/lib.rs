//! Filesystem adapter over a B2-style versioned object store, plus a local
//! SQLite-and-disk store that speaks the same semantics.

pub mod adapter;
pub mod client;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod mime;
pub mod models;
pub mod routes;
pub mod services;

pub use adapter::{B2Adapter, FilesystemAdapter, FilesystemError, FsResult};
pub use client::{ClientError, ObjectStoreClient};
pub use services::local_store::LocalObjectStore;
