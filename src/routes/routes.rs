//! Routes served next to the adapter.
//!
//! - `GET /healthz` — liveness
//! - `GET /readyz` — readiness
//! - `GET /file/{bucket}/{*key}` — download the newest version of a file
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`, which
//! is the shape of every URL the adapter's `public_url` hands out.

use crate::{
    handlers::{
        download_handlers::download_file,
        health_handlers::{healthz, readyz},
    },
    services::local_store::LocalObjectStore,
};
use axum::{Router, routing::get};

/// Build the router. Every handler shares the `LocalObjectStore` state.
pub fn routes() -> Router<LocalObjectStore> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/file/{bucket}/{*key}", get(download_file))
}
