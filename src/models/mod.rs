//! Core data models.
//!
//! Stored objects, buckets and large-file parts mirror what the object store
//! keeps; they map to database tables via `sqlx::FromRow` and serialize as
//! JSON via `serde`. Attributes and options are the adapter-facing types.

pub mod attributes;
pub mod bucket;
pub mod multipart;
pub mod options;
pub mod stored_object;
