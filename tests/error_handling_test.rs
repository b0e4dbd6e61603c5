// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy tests against the public store API.

use tempfile::TempDir;
use treebase::codec::{BytesCodec, I32Codec, StringCodec};
use treebase::{Store, StoreConfig, TreeError};

fn config(dir: &TempDir, open_existing: bool) -> StoreConfig<i32, String> {
    let mut config = StoreConfig::new(
        dir.path().join("errors.tbs"),
        Box::new(I32Codec),
        Box::new(StringCodec),
    );
    config.order = 4;
    config.open_existing = open_existing;
    config
}

#[test]
fn create_over_existing_is_already_exists() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(config(&dir, false)).unwrap();
    store.close().unwrap();

    match Store::open(config(&dir, false)) {
        Err(TreeError::AlreadyExists { name }) => assert!(name.contains("errors.tbs")),
        other => panic!("expected AlreadyExists, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn open_absent_is_not_found() {
    let dir = TempDir::new().unwrap();
    match Store::open(config(&dir, true)) {
        Err(TreeError::NotFound { .. }) => {}
        other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn destroy_absent_is_not_found() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("never-created.tbs");
    assert!(matches!(
        Store::<i32, String>::destroy(&path),
        Err(TreeError::NotFound { .. })
    ));
}

#[test]
fn invalid_order_is_invalid_argument() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir, false);
    cfg.order = 2;
    match Store::open(cfg) {
        Err(TreeError::InvalidArgument { .. }) => {}
        other => panic!("expected InvalidArgument, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn zero_cache_capacity_is_invalid_argument() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir, false);
    cfg.cache_capacity = 0;
    assert!(matches!(
        Store::open(cfg),
        Err(TreeError::InvalidArgument { .. })
    ));
}

#[test]
fn order_too_large_for_page_is_invalid_argument() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir, false);
    cfg.order = 4096; // 4 KiB pages cannot hold 4095 entries
    assert!(matches!(
        Store::open(cfg),
        Err(TreeError::InvalidArgument { .. })
    ));
}

#[test]
fn codec_tag_mismatch_is_invalid_argument() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(config(&dir, false)).unwrap();
    store.close().unwrap();

    let mut cfg: StoreConfig<i32, Vec<u8>> = StoreConfig::new(
        dir.path().join("errors.tbs"),
        Box::new(I32Codec),
        Box::new(BytesCodec),
    );
    cfg.open_existing = true;
    match Store::open(cfg) {
        Err(TreeError::InvalidArgument { reason }) => {
            assert!(reason.contains("codec"), "reason: {}", reason);
        }
        other => panic!("expected InvalidArgument, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn oversized_entry_is_capacity_error_and_harmless() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(config(&dir, false)).unwrap();
    store.insert(1, "small".to_string()).unwrap();

    match store.insert(2, "y".repeat(1 << 20)) {
        Err(TreeError::Capacity { needed, limit }) => assert!(needed > limit),
        other => panic!("expected Capacity, got {:?}", other),
    }

    // The failed insert mutated nothing
    assert_eq!(store.stats().unwrap().key_count, 1);
    assert!(store.verify().unwrap());
    store.close().unwrap();
}

#[test]
fn truncated_header_is_corruption() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("errors.tbs");
    std::fs::write(&path, b"short").unwrap();

    match Store::open(config(&dir, true)) {
        Err(TreeError::Corruption { .. }) => {}
        other => panic!("expected Corruption, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn garbage_header_is_corruption() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("errors.tbs");
    std::fs::write(&path, vec![0xABu8; 1024]).unwrap();

    match Store::open(config(&dir, true)) {
        Err(TreeError::Corruption { .. }) => {}
        other => panic!("expected Corruption, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn lookup_miss_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(config(&dir, false)).unwrap();
    assert_eq!(store.search(12345).unwrap(), None);
    assert!(!store.delete(12345).unwrap());
    store.close().unwrap();
}

#[test]
fn errors_format_with_context() {
    let err = TreeError::Capacity {
        needed: 5000,
        limit: 121,
    };
    let message = err.to_string();
    assert!(message.contains("5000"));
    assert!(message.contains("121"));

    let err = TreeError::Timeout {
        operation: "range".to_string(),
        request_id: "69b7d2c8-0b1a-4c3d-9e5f-7a8b9c0d1e2f".to_string(),
    };
    let message = err.to_string();
    assert!(message.contains("range"));
    assert!(message.contains("69b7d2c8"));
}
