mod common;

use b2_adapter::{
    B2Adapter, FilesystemAdapter, FilesystemError, ObjectStoreClient,
    adapter::{MetadataError, UrlError},
    client::{ClientError, KeyRestriction, PutObjectRequest},
    config::{AdapterConfig, ConfigError},
    models::{
        attributes::{Attribute, StorageAttributes, Visibility},
        bucket::BucketType,
        options::{
            ChecksumOptions, CopyOptions, MetadataDirective, PublicUrlOptions, WriteOptions,
        },
        stored_object::LegalHold,
    },
};
use bytes::Bytes;
use common::{BASE_URL, BUCKET, TestEnv, body, chunked, collect};
use futures::TryStreamExt;
use sha1::{Digest, Sha1};
use std::{collections::BTreeMap, sync::Arc, time::Duration};

async fn list(adapter: &B2Adapter, path: &str, deep: bool) -> Vec<String> {
    let entries: Vec<StorageAttributes> = adapter
        .list_contents(path, deep)
        .try_collect()
        .await
        .unwrap();
    entries
        .iter()
        .map(|entry| match entry {
            StorageAttributes::File(file) => format!("f:{}", file.path),
            StorageAttributes::Dir(dir) => format!("d:{}", dir.path),
        })
        .collect()
}

fn with_info(key: &str, value: &str) -> WriteOptions {
    WriteOptions {
        file_info: BTreeMap::from([(key.to_string(), value.to_string())]),
        ..Default::default()
    }
}

fn held() -> WriteOptions {
    WriteOptions {
        legal_hold: Some(LegalHold::On),
        ..Default::default()
    }
}

// --- Reads and writes ---

#[tokio::test]
async fn write_then_read_and_existence() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    assert!(!adapter.file_exists("docs/readme.txt").await.unwrap());
    adapter
        .write("docs/readme.txt", Bytes::from_static(b"hello"), WriteOptions::default())
        .await
        .unwrap();
    assert!(adapter.file_exists("docs/readme.txt").await.unwrap());
    assert!(adapter.file_exists("/docs/./readme.txt").await.unwrap());
    assert_eq!(&adapter.read("docs/readme.txt").await.unwrap()[..], b"hello");
}

#[tokio::test]
async fn empty_content_round_trips() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write("empty.bin", Bytes::new(), WriteOptions::default())
        .await
        .unwrap();
    assert!(adapter.read("empty.bin").await.unwrap().is_empty());
    assert_eq!(adapter.file_size("empty.bin").await.unwrap().file_size, Some(0));
}

#[tokio::test]
async fn streamed_writes_and_reads() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write_stream("logs/app.log", chunked(&["one ", "two ", "three"]), WriteOptions::default())
        .await
        .unwrap();
    let content = collect(adapter.read_stream("logs/app.log").await.unwrap()).await;
    assert_eq!(content, b"one two three");
}

#[tokio::test]
async fn buffered_reads_yield_one_chunk() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let config = AdapterConfig {
        stream_reads: false,
        ..AdapterConfig::for_bucket(BUCKET)
    };
    let adapter = env.adapter_with(config).await;

    adapter
        .write_stream("a.bin", chunked(&["ab", "cd"]), WriteOptions::default())
        .await
        .unwrap();
    let chunks: Vec<Bytes> = adapter.read_stream("a.bin").await.unwrap().try_collect().await.unwrap();
    assert_eq!(chunks, vec![Bytes::from_static(b"abcd")]);
}

#[tokio::test]
async fn reading_a_missing_file_fails_with_its_path() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    let err = adapter.read("nope.txt").await.unwrap_err();
    match err {
        FilesystemError::ReadFailed { path, source } => {
            assert_eq!(path, "nope.txt");
            assert!(source.is_not_found());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn writing_the_root_is_rejected() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    let err = adapter
        .write("/", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FilesystemError::InvalidPath { .. }));

    let err = adapter.read("../outside.txt").await.unwrap_err();
    assert!(matches!(err, FilesystemError::InvalidPath { .. }));
}

#[tokio::test]
async fn content_types_are_detected_or_taken_from_options() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write("notes.txt", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap();
    adapter
        .write("README", Bytes::from_static(b"plain words"), WriteOptions::default())
        .await
        .unwrap();
    adapter
        .write_stream("pic.png", body(b"\x89PNG"), WriteOptions::default())
        .await
        .unwrap();
    let explicit = WriteOptions {
        content_type: Some("application/x-custom".into()),
        ..Default::default()
    };
    adapter
        .write("data.txt", Bytes::from_static(b"x"), explicit)
        .await
        .unwrap();

    let mime = |path: &'static str| {
        let adapter = adapter.clone();
        async move { adapter.mime_type(path).await.unwrap().mime_type }
    };
    assert_eq!(mime("notes.txt").await.as_deref(), Some("text/plain"));
    assert_eq!(mime("README").await.as_deref(), Some("text/plain"));
    assert_eq!(mime("pic.png").await.as_deref(), Some("image/png"));
    assert_eq!(mime("data.txt").await.as_deref(), Some("application/x-custom"));
}

// --- Deletes ---

#[tokio::test]
async fn delete_is_idempotent() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter.delete("never-written.txt").await.unwrap();

    adapter
        .write("a.txt", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap();
    adapter.delete("a.txt").await.unwrap();
    assert!(!adapter.file_exists("a.txt").await.unwrap());
    adapter.delete("a.txt").await.unwrap();
}

#[tokio::test]
async fn deleting_the_newest_version_reveals_the_previous_one() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write("v.txt", Bytes::from_static(b"one"), WriteOptions::default())
        .await
        .unwrap();
    adapter
        .write("v.txt", Bytes::from_static(b"two"), WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(&adapter.read("v.txt").await.unwrap()[..], b"two");

    adapter.delete("v.txt").await.unwrap();
    assert_eq!(&adapter.read("v.txt").await.unwrap()[..], b"one");
}

// --- Directories ---

#[tokio::test]
async fn directories_exist_through_markers_or_descendants() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    assert!(adapter.directory_exists("").await.unwrap());
    assert!(!adapter.directory_exists("photos").await.unwrap());

    adapter.create_directory("photos").await.unwrap();
    assert!(adapter.directory_exists("photos").await.unwrap());
    assert!(adapter.directory_exists("photos/").await.unwrap());
    assert!(!adapter.file_exists("photos").await.unwrap());

    adapter
        .write("a/b/c.txt", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap();
    assert!(adapter.directory_exists("a").await.unwrap());
    assert!(adapter.directory_exists("a/b").await.unwrap());
    assert!(!adapter.directory_exists("a/b/c.txt").await.unwrap());

    // Names sorting next to the probe must not be mistaken for it.
    adapter
        .write("x-1.txt", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap();
    assert!(!adapter.directory_exists("x").await.unwrap());
}

#[tokio::test]
async fn created_directory_lists_empty_and_appears_in_parent() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter.create_directory("docs/empty").await.unwrap();
    assert!(list(&adapter, "docs/empty", false).await.is_empty());
    assert_eq!(list(&adapter, "docs", false).await, vec!["d:docs/empty"]);
}

#[tokio::test]
async fn delete_directory_removes_descendants_and_marker() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter.create_directory("a").await.unwrap();
    for path in ["a/1.txt", "a/b/2.txt", "ab.txt"] {
        adapter
            .write(path, Bytes::from_static(b"x"), WriteOptions::default())
            .await
            .unwrap();
    }

    adapter.delete_directory("a").await.unwrap();
    assert!(!adapter.directory_exists("a").await.unwrap());
    assert!(!adapter.file_exists("a/b/2.txt").await.unwrap());
    assert!(adapter.file_exists("ab.txt").await.unwrap());

    // Implied-only or already-gone directories delete cleanly.
    adapter.delete_directory("a").await.unwrap();
}

#[tokio::test]
async fn delete_directory_removes_every_version() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter.create_directory("d").await.unwrap();
    adapter.create_directory("d").await.unwrap();
    for contents in [b"v1", b"v2"] {
        adapter
            .write("d/f.txt", Bytes::from_static(contents), WriteOptions::default())
            .await
            .unwrap();
    }

    adapter.delete_directory("d").await.unwrap();
    assert!(!adapter.file_exists("d/f.txt").await.unwrap());
    assert!(!adapter.directory_exists("d").await.unwrap());
    assert!(list(&adapter, "", true).await.is_empty());
}

#[tokio::test]
async fn delete_directory_stops_at_first_failure() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write("locked/a.txt", Bytes::from_static(b"x"), held())
        .await
        .unwrap();
    adapter
        .write("locked/b.txt", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap();

    let err = adapter.delete_directory("locked").await.unwrap_err();
    assert!(matches!(
        err,
        FilesystemError::DirectoryDeleteFailed { source: ClientError::Unauthorized(_), .. }
    ));
    assert!(adapter.file_exists("locked/b.txt").await.unwrap());
}

// --- Listings ---

#[tokio::test]
async fn shallow_and_deep_listings() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter.create_directory("docs/empty").await.unwrap();
    for path in ["docs/a.txt", "docs/sub/b.txt", "top.txt"] {
        adapter
            .write(path, Bytes::from_static(b"x"), WriteOptions::default())
            .await
            .unwrap();
    }

    assert_eq!(
        list(&adapter, "docs", false).await,
        vec!["f:docs/a.txt", "d:docs/empty", "d:docs/sub"]
    );
    assert_eq!(
        list(&adapter, "docs", true).await,
        vec!["f:docs/a.txt", "d:docs/empty", "f:docs/sub/b.txt"]
    );
    assert_eq!(list(&adapter, "", false).await, vec!["d:docs", "f:top.txt"]);
}

#[tokio::test]
async fn listed_files_carry_attributes() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write(
            "a.txt",
            Bytes::from_static(b"hello"),
            with_info("src_last_modified_millis", "1700000000999"),
        )
        .await
        .unwrap();

    let entries: Vec<StorageAttributes> =
        adapter.list_contents("", false).try_collect().await.unwrap();
    let StorageAttributes::File(file) = &entries[0] else {
        panic!("expected a file entry");
    };
    assert_eq!(file.file_size, Some(5));
    assert_eq!(file.last_modified, Some(1_700_000_000));
    assert_eq!(file.mime_type.as_deref(), Some("text/plain"));
    assert_eq!(file.visibility, None);
    assert!(file.extra_metadata.contains_key("b2.file_id"));
}

#[tokio::test]
async fn hidden_and_unfinished_entries_are_not_listed() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    for path in ["gone.txt", "kept.txt"] {
        adapter
            .write(path, Bytes::from_static(b"x"), WriteOptions::default())
            .await
            .unwrap();
    }
    env.store.hide_object(&env.bucket.id, "gone.txt").await.unwrap();
    env.store
        .start_large_object(PutObjectRequest {
            bucket_id: env.bucket.id.clone(),
            key: "pending.bin".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(list(&adapter, "", true).await, vec!["f:kept.txt"]);
    assert!(!adapter.file_exists("gone.txt").await.unwrap());
    assert!(!adapter.file_exists("pending.bin").await.unwrap());
}

#[tokio::test]
async fn directory_of_only_hidden_files_does_not_exist() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write("h/gone.txt", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap();
    env.store.hide_object(&env.bucket.id, "h/gone.txt").await.unwrap();

    assert!(!adapter.file_exists("h/gone.txt").await.unwrap());
    assert!(!adapter.directory_exists("h").await.unwrap());
    assert!(list(&adapter, "", false).await.is_empty());
}

#[tokio::test]
async fn listings_span_many_pages() {
    let env = TestEnv::with_store(BucketType::AllPrivate, |store| store.with_page_size(2)).await;
    let adapter = env.adapter().await;

    adapter.create_directory("p/dir").await.unwrap();
    for path in ["p/1", "p/2", "p/3", "p/4", "p/5", "p/dir/x", "p/dir/y", "p/dir/z"] {
        adapter
            .write(path, Bytes::from_static(b"x"), WriteOptions::default())
            .await
            .unwrap();
    }

    assert_eq!(
        list(&adapter, "p", false).await,
        vec!["f:p/1", "f:p/2", "f:p/3", "f:p/4", "f:p/5", "d:p/dir"]
    );
    assert_eq!(list(&adapter, "p", true).await.len(), 9);
}

// --- Copy and move ---

#[tokio::test]
async fn copy_keeps_the_source() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write("src.txt", Bytes::from_static(b"payload"), WriteOptions::default())
        .await
        .unwrap();
    adapter
        .copy_file("src.txt", "dst.txt", CopyOptions::default())
        .await
        .unwrap();

    assert_eq!(&adapter.read("dst.txt").await.unwrap()[..], b"payload");
    assert!(adapter.file_exists("src.txt").await.unwrap());
}

#[tokio::test]
async fn copy_can_replace_metadata() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write("report.txt", Bytes::from_static(b"a,b"), WriteOptions::default())
        .await
        .unwrap();
    let options = CopyOptions {
        metadata_directive: MetadataDirective::Replace {
            content_type: "text/csv".into(),
            file_info: BTreeMap::new(),
        },
        ..Default::default()
    };
    adapter.copy_file("report.txt", "report.csv", options).await.unwrap();

    let attributes = adapter.mime_type("report.csv").await.unwrap();
    assert_eq!(attributes.mime_type.as_deref(), Some("text/csv"));
}

#[tokio::test]
async fn copying_a_missing_file_fails() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    let err = adapter
        .copy_file("missing.txt", "dst.txt", CopyOptions::default())
        .await
        .unwrap_err();
    match err {
        FilesystemError::CopyFailed { from, source, .. } => {
            assert_eq!(from, "missing.txt");
            assert!(source.is_not_found());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn move_relocates_the_file() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write("old/name.txt", Bytes::from_static(b"moving"), WriteOptions::default())
        .await
        .unwrap();
    adapter
        .move_file("old/name.txt", "new/name.txt", CopyOptions::default())
        .await
        .unwrap();

    assert!(!adapter.file_exists("old/name.txt").await.unwrap());
    assert_eq!(&adapter.read("new/name.txt").await.unwrap()[..], b"moving");
}

#[tokio::test]
async fn move_of_an_overwritten_file_leaves_no_source() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    for contents in [b"v1", b"v2"] {
        adapter
            .write("src.txt", Bytes::from_static(contents), WriteOptions::default())
            .await
            .unwrap();
    }
    adapter
        .move_file("src.txt", "dst.txt", CopyOptions::default())
        .await
        .unwrap();

    assert!(!adapter.file_exists("src.txt").await.unwrap());
    assert!(matches!(
        adapter.read("src.txt").await,
        Err(FilesystemError::ReadFailed { .. })
    ));
    assert_eq!(&adapter.read("dst.txt").await.unwrap()[..], b"v2");
}

#[tokio::test]
async fn moving_onto_itself_keeps_the_file() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write("same.txt", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap();
    adapter
        .move_file("same.txt", "./same.txt", CopyOptions::default())
        .await
        .unwrap();
    assert!(adapter.file_exists("same.txt").await.unwrap());

    let err = adapter
        .move_file("ghost.txt", "ghost.txt", CopyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FilesystemError::MoveFailed { .. }));
}

#[tokio::test]
async fn failed_source_delete_leaves_both_copies() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write("held.txt", Bytes::from_static(b"x"), held())
        .await
        .unwrap();
    let err = adapter
        .move_file("held.txt", "moved.txt", CopyOptions::default())
        .await
        .unwrap_err();

    let FilesystemError::MoveFailed { source, .. } = err else {
        panic!("expected a move failure");
    };
    assert!(matches!(
        *source,
        FilesystemError::DeleteFailed { source: ClientError::Unauthorized(_), .. }
    ));
    assert!(adapter.file_exists("held.txt").await.unwrap());
    assert!(adapter.file_exists("moved.txt").await.unwrap());
}

// --- Attributes ---

#[tokio::test]
async fn attributes_come_from_the_newest_version() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write(
            "a.txt",
            Bytes::from_static(b"12345"),
            with_info("src_last_modified_millis", "1700000000123"),
        )
        .await
        .unwrap();

    let size = adapter.file_size("a.txt").await.unwrap();
    assert_eq!(size.path, "a.txt");
    assert_eq!(size.file_size, Some(5));
    assert_eq!(
        adapter.last_modified("a.txt").await.unwrap().last_modified,
        Some(1_700_000_000)
    );

    let metadata = adapter.metadata("a.txt").await.unwrap();
    assert_eq!(
        metadata.extra_metadata["b2.file_info"]["src_last_modified_millis"],
        "1700000000123"
    );
}

#[tokio::test]
async fn writes_record_a_modification_time() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write("a.txt", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap();
    assert!(adapter.last_modified("a.txt").await.unwrap().last_modified.is_some());
}

#[tokio::test]
async fn last_modified_has_no_upload_time_fallback() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    env.store
        .put_object(
            PutObjectRequest {
                bucket_id: env.bucket.id.clone(),
                key: "external.txt".into(),
                ..Default::default()
            },
            body(b"x"),
        )
        .await
        .unwrap();

    let err = adapter.last_modified("external.txt").await.unwrap_err();
    assert!(matches!(
        err,
        FilesystemError::MetadataUnavailable {
            attribute: Attribute::LastModified,
            source: MetadataError::Missing(_),
            ..
        }
    ));
}

#[tokio::test]
async fn attributes_of_missing_files_are_unavailable() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    let err = adapter.file_size("missing.txt").await.unwrap_err();
    assert!(matches!(
        err,
        FilesystemError::MetadataUnavailable {
            attribute: Attribute::FileSize,
            source: MetadataError::Client(ClientError::ObjectNotFound(_)),
            ..
        }
    ));
}

#[tokio::test]
async fn visibility_is_unsupported() {
    let env = TestEnv::new(BucketType::AllPublic).await;
    let adapter = env.adapter().await;

    adapter
        .write("a.txt", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap();
    assert!(matches!(
        adapter.visibility("a.txt").await,
        Err(FilesystemError::VisibilityUnsupported { .. })
    ));
    assert!(matches!(
        adapter.set_visibility("a.txt", Visibility::Public).await,
        Err(FilesystemError::VisibilityUnsupported { .. })
    ));
}

// --- Checksums ---

#[tokio::test]
async fn checksums_use_stored_hashes() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    adapter
        .write("a.txt", Bytes::from_static(b"checksum me"), WriteOptions::default())
        .await
        .unwrap();

    let sha1 = adapter.checksum("a.txt", ChecksumOptions::default()).await.unwrap();
    assert_eq!(sha1, hex::encode(Sha1::digest(b"checksum me")));

    let md5 = adapter
        .checksum("a.txt", ChecksumOptions::algorithm("MD5"))
        .await
        .unwrap();
    assert_eq!(md5, format!("{:x}", md5::compute(b"checksum me")));
}

#[tokio::test]
async fn unknown_algorithms_fail_before_lookup() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    let err = adapter
        .checksum("does-not-exist.txt", ChecksumOptions::algorithm("crc"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FilesystemError::ChecksumAlgorithmUnsupported { ref algorithm } if algorithm == "crc"
    ));
}

#[tokio::test]
async fn large_files_have_no_checksum() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    let started = env
        .store
        .start_large_object(PutObjectRequest {
            bucket_id: env.bucket.id.clone(),
            key: "big.bin".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let id = started.id.unwrap();
    env.store.upload_part(&id, 1, body(b"part one ")).await.unwrap();
    env.store.upload_part(&id, 2, body(b"part two")).await.unwrap();
    env.store.finish_large_object(&id).await.unwrap();

    assert_eq!(&adapter.read("big.bin").await.unwrap()[..], b"part one part two");
    for algorithm in ["sha1", "md5"] {
        let err = adapter
            .checksum("big.bin", ChecksumOptions::algorithm(algorithm))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FilesystemError::ChecksumUnavailable { source: MetadataError::Missing(_), .. }
        ));
    }
}

// --- URLs ---

#[tokio::test]
async fn public_buckets_get_plain_urls() {
    let env = TestEnv::new(BucketType::AllPublic).await;
    let adapter = env.adapter().await;

    let url = adapter
        .public_url("docs/a b.txt", PublicUrlOptions::default())
        .await
        .unwrap();
    assert_eq!(url, format!("{}/file/{}/docs/a%20b.txt", BASE_URL, BUCKET));
}

#[tokio::test]
async fn private_buckets_need_a_validity() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    let err = adapter
        .public_url("docs/a.txt", PublicUrlOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FilesystemError::PublicUrlGenerationFailed { source: UrlError::ValidityRequired, .. }
    ));

    let url = adapter
        .public_url("docs/a.txt", PublicUrlOptions::valid_for(Duration::from_secs(60)))
        .await
        .unwrap();
    let (base, token) = url.split_once("?Authorization=").unwrap();
    assert_eq!(base, format!("{}/file/{}/docs/a.txt", BASE_URL, BUCKET));

    let bucket = env.store.fetch_bucket(BUCKET).await.unwrap();
    assert!(env.store.check_download(&bucket, "docs/a.txt", Some(token)).await.is_ok());
    assert!(env.store.check_download(&bucket, "docs/b.txt", Some(token)).await.is_err());
}

#[tokio::test]
async fn visibility_changes_are_picked_up() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env.adapter().await;

    env.store
        .update_bucket_type(BUCKET, BucketType::AllPublic)
        .await
        .unwrap();
    let url = adapter
        .public_url("a.txt", PublicUrlOptions::default())
        .await
        .unwrap();
    assert!(!url.contains("Authorization"));
}

#[tokio::test]
async fn temporary_urls_expire() {
    let env = TestEnv::new(BucketType::AllPublic).await;
    let adapter = env.adapter().await;

    let url = adapter
        .temporary_url("a.txt", Duration::from_secs(1))
        .await
        .unwrap();
    let (_, token) = url.split_once("?Authorization=").unwrap();

    let mut bucket = env.store.fetch_bucket(BUCKET).await.unwrap();
    bucket.bucket_type = BucketType::AllPrivate;
    assert!(env.store.check_download(&bucket, "a.txt", Some(token)).await.is_ok());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(env.store.check_download(&bucket, "a.txt", Some(token)).await.is_err());
}

// --- Prefixes and construction ---

#[tokio::test]
async fn root_prefix_is_applied_and_stripped() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let adapter = env
        .adapter_with(AdapterConfig::for_bucket(BUCKET).with_prefix("tenant"))
        .await;
    assert_eq!(adapter.prefixer().prefix(), "tenant/");

    adapter
        .write("a.txt", Bytes::from_static(b"x"), WriteOptions::default())
        .await
        .unwrap();
    adapter.create_directory("sub").await.unwrap();

    let stored = env
        .store
        .get_object_by_name(&env.bucket.id, "tenant/a.txt")
        .await
        .unwrap();
    assert_eq!(stored.size, 1);
    assert_eq!(list(&adapter, "", false).await, vec!["f:a.txt", "d:sub"]);
    assert!(adapter.directory_exists("").await.unwrap());

    let unprefixed = env.adapter().await;
    assert!(!unprefixed.file_exists("a.txt").await.unwrap());
    assert!(unprefixed.directory_exists("tenant").await.unwrap());
}

#[tokio::test]
async fn bucket_and_prefix_default_to_the_key_restriction() {
    let env = TestEnv::restricted(KeyRestriction {
        bucket_id: None,
        bucket_name: Some(BUCKET.into()),
        name_prefix: Some("scoped/".into()),
    })
    .await;

    let adapter = env.adapter_with(AdapterConfig::default()).await;
    assert_eq!(adapter.bucket().name, BUCKET);
    assert_eq!(adapter.prefixer().prefix(), "scoped/");

    let outside = B2Adapter::connect(
        Arc::new(env.store.clone()),
        AdapterConfig::for_bucket("another-bucket"),
    )
    .await;
    assert!(matches!(outside, Err(ConfigError::BucketOutsideRestriction { .. })));
}

#[tokio::test]
async fn construction_needs_a_resolvable_bucket() {
    let env = TestEnv::new(BucketType::AllPrivate).await;

    let no_bucket = B2Adapter::connect(Arc::new(env.store.clone()), AdapterConfig::default()).await;
    assert!(matches!(no_bucket, Err(ConfigError::BucketRequired)));

    let unknown = B2Adapter::connect(
        Arc::new(env.store.clone()),
        AdapterConfig::for_bucket("missing-bucket"),
    )
    .await;
    assert!(matches!(
        unknown,
        Err(ConfigError::BucketLookup { source: ClientError::BucketNotFound(_), .. })
    ));
}

#[tokio::test]
async fn usable_as_a_trait_object() {
    let env = TestEnv::new(BucketType::AllPrivate).await;
    let fs: Arc<dyn FilesystemAdapter> = Arc::new(env.adapter().await);

    fs.write("t.txt", Bytes::from_static(b"dyn"), WriteOptions::default())
        .await
        .unwrap();
    assert!(fs.file_exists("t.txt").await.unwrap());
    let entries: Vec<StorageAttributes> = fs.list_contents("", false).try_collect().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_file());
}
