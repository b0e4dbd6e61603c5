// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Tests for TreeBase error types.

use super::*;

#[test]
fn test_display_io_error() {
    let err = TreeError::Io {
        operation: "read_page".to_string(),
        reason: "unexpected end of file".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "I/O error during 'read_page': unexpected end of file"
    );
}

#[test]
fn test_display_capacity_error() {
    let err = TreeError::Capacity {
        needed: 900,
        limit: 128,
    };
    assert!(err.to_string().contains("900"));
    assert!(err.to_string().contains("128"));
}

#[test]
fn test_display_timeout_names_operation_and_request() {
    let err = TreeError::Timeout {
        operation: "bulk_load".to_string(),
        request_id: "1db4a0e4-6f92-4e5a-8f2e-3f7a4b6c0d11".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Operation 'bulk_load' timed out (request 1db4a0e4-6f92-4e5a-8f2e-3f7a4b6c0d11)"
    );
}

#[test]
fn test_from_io_error() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: TreeError = io.into();
    match err {
        TreeError::Io { reason, .. } => assert!(reason.contains("denied")),
        other => panic!("expected Io, got {:?}", other),
    }
}

#[test]
fn test_error_is_std_error() {
    fn assert_std_error<E: std::error::Error>(_: &E) {}
    assert_std_error(&TreeError::Closed);
}
