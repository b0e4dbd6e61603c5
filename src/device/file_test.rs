// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Tests for the file-backed block device.

use super::*;
use crate::error::TreeError;
use tempfile::TempDir;

fn temp_store(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("device_test.tbs")
}

#[test]
fn test_create_then_exists() {
    let dir = TempDir::new().unwrap();
    let path = temp_store(&dir);

    assert!(!FileDevice::exists(&path));
    let _device = FileDevice::create(&path).unwrap();
    assert!(FileDevice::exists(&path));
}

#[test]
fn test_create_twice_fails() {
    let dir = TempDir::new().unwrap();
    let path = temp_store(&dir);

    let first = FileDevice::create(&path).unwrap();
    drop(first);

    match FileDevice::create(&path) {
        Err(TreeError::AlreadyExists { .. }) => {}
        other => panic!("expected AlreadyExists, got {:?}", other),
    }
}

#[test]
fn test_open_missing_fails() {
    let dir = TempDir::new().unwrap();
    match FileDevice::open(temp_store(&dir)) {
        Err(TreeError::NotFound { .. }) => {}
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[test]
fn test_write_read_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut device = FileDevice::create(temp_store(&dir)).unwrap();

    device.write(0, b"hello").unwrap();
    device.write(512, b"world").unwrap();

    assert_eq!(device.read(0, 5).unwrap(), b"hello");
    assert_eq!(device.read(512, 5).unwrap(), b"world");
}

#[test]
fn test_write_extends_file() {
    let dir = TempDir::new().unwrap();
    let mut device = FileDevice::create(temp_store(&dir)).unwrap();

    device.write(4096, &[0xAB; 16]).unwrap();
    assert_eq!(device.size().unwrap(), 4096 + 16);

    // Gap reads back as zeros
    assert_eq!(device.read(100, 4).unwrap(), vec![0u8; 4]);
}

#[test]
fn test_read_past_end_fails() {
    let dir = TempDir::new().unwrap();
    let mut device = FileDevice::create(temp_store(&dir)).unwrap();

    device.write(0, &[1, 2, 3, 4]).unwrap();

    match device.read(2, 4) {
        Err(TreeError::Io { operation, .. }) => assert_eq!(operation, "read"),
        other => panic!("expected Io error, got {:?}", other),
    }
}

#[test]
fn test_truncate_shrinks() {
    let dir = TempDir::new().unwrap();
    let mut device = FileDevice::create(temp_store(&dir)).unwrap();

    device.write(0, &[7u8; 1024]).unwrap();
    device.truncate(128).unwrap();
    assert_eq!(device.size().unwrap(), 128);
    assert!(device.read(0, 1024).is_err());
}

#[test]
fn test_remove() {
    let dir = TempDir::new().unwrap();
    let path = temp_store(&dir);

    let device = FileDevice::create(&path).unwrap();
    drop(device);

    FileDevice::remove(&path).unwrap();
    assert!(!FileDevice::exists(&path));
    assert!(matches!(
        FileDevice::remove(&path),
        Err(TreeError::NotFound { .. })
    ));
}

#[test]
fn test_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = temp_store(&dir);

    {
        let mut device = FileDevice::create(&path).unwrap();
        device.write(64, b"durable").unwrap();
        device.flush().unwrap();
    }

    let mut device = FileDevice::open(&path).unwrap();
    assert_eq!(device.read(64, 7).unwrap(), b"durable");
}
