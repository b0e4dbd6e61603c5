// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! TreeBase - embeddable persistent ordered key-value store.
//!
//! A B-tree over a single page-addressed file with pluggable binary codecs
//! for keys and values.
//!
//! ## Features
//!
//! - **Single-File Stores**: 512-byte header plus fixed-size node pages
//! - **CRC32 Integrity**: every page and the header carry checksums
//! - **Pluggable Codecs**: integers, floats, strings, big integers, JSON,
//!   and composites; bring your own `Codec` for custom types
//! - **Buffer Pool**: LRU node cache with write-through or write-back
//! - **Ordered Access**: range scans and in-order enumeration over linked
//!   leaves
//! - **Serialized Engine**: one worker thread per store; callers talk to it
//!   through a request gateway
//!
//! ## Quick Start
//!
//! ```no_run
//! use treebase::codec::{I32Codec, StringCodec};
//! use treebase::{Store, StoreConfig};
//!
//! let config = StoreConfig::new(
//!     "data.tbs",
//!     Box::new(I32Codec),
//!     Box::new(StringCodec),
//! );
//! let store: treebase::Store<i32, String> = Store::open(config)?;
//!
//! store.insert(1, "one".to_string())?;
//! assert_eq!(store.search(1)?, Some("one".to_string()));
//!
//! store.close()?;
//! # Ok::<(), treebase::TreeError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Store (gateway handle)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 worker thread owns the engine               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BTree        │ search / insert / delete / range / verify   │
//! │  BufferPool   │ LRU cache, write-through / write-back       │
//! │  page codec   │ 64-byte node header + payload, CRC32        │
//! │  FileHeader   │ order, root, counters, free list            │
//! │  FileDevice   │ locked single file, positioned I/O          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine can also be embedded directly without the gateway via
//! [`store::BTree`] when single-threaded ownership is enough.

pub mod codec;
pub mod device;
pub mod error;
pub mod gateway;
pub mod store;

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;

// Re-export commonly used types
pub use error::{TreeError, TreeResult};
pub use gateway::Store;
pub use store::{
    BTree, BulkLoadOptions, RangeOptions, StoreConfig, TreeStats, WriteMode,
};

/// TreeBase version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
