// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Fixed 512-byte file header at offset 0 of every store file.
//!
//! The header carries the store's configuration (order, page size, codec
//! identifiers) and the tree-wide counters that change with structure
//! (root offset, node count, height, free list, file size). It is protected
//! by a CRC32 over everything after the checksum field itself.
//!
//! ## Layout (little-endian)
//!
//! ```text
//! Offset | Size | Field
//! -------|------|-----------------------------
//! 0      | 4    | magic (0x42545245, "BTRE")
//! 4      | 4    | version (1)
//! 8      | 4    | header checksum (CRC32 of bytes [12, 512))
//! 12     | 4    | order
//! 16     | 4    | key_fixed_size (0 = variable)
//! 20     | 4    | value_fixed_size (0 = variable)
//! 24     | 4    | node_size (page size in bytes)
//! 28     | 8    | root_offset (0 = tree not yet created)
//! 36     | 8    | node_count
//! 44     | 4    | height
//! 48     | 8    | free_list_head (0 = empty)
//! 56     | 8    | total_file_size
//! 64     | 8    | created_at (µs since epoch)
//! 72     | 8    | modified_at
//! 80     | 8    | transaction_id (reserved)
//! 88     | 4    | flags (bit 0: transaction log, reserved)
//! 92     | 16   | key codec tag (NUL-padded ASCII)
//! 108    | 16   | value codec tag
//! 124    | 388  | reserved, zeroed
//! ```

use crate::error::{TreeError, TreeResult};

/// Header size in bytes. Node pages start at this offset.
pub const HEADER_SIZE: usize = 512;

/// Magic bytes identifying a store file ("BTRE").
pub const STORE_MAGIC: u32 = 0x4254_5245;

/// Current file format version.
pub const FORMAT_VERSION: u32 = 1;

/// Length of a NUL-padded codec tag field.
pub const CODEC_TAG_SIZE: usize = 16;

/// Flag bit: transaction log enabled (reserved, no recovery protocol yet).
pub const FLAG_TRANSACTION_LOG: u32 = 1;

/// Parsed store file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Maximum children per internal node.
    pub order: u32,

    /// Encoded key size if the key codec is fixed-size, else 0.
    pub key_fixed_size: u32,

    /// Encoded value size if the value codec is fixed-size, else 0.
    pub value_fixed_size: u32,

    /// Page size in bytes. Every node occupies exactly one page.
    pub node_size: u32,

    /// Byte offset of the current root node; 0 while the tree is empty.
    pub root_offset: u64,

    /// Number of live nodes reachable from the root.
    pub node_count: u64,

    /// Tree height (leaf depth + 1); 0 while the tree is empty.
    pub height: u32,

    /// Head of the singly linked free page list; 0 if empty.
    pub free_list_head: u64,

    /// Logical end of file; new pages are appended here.
    pub total_file_size: u64,

    /// Creation timestamp, microseconds since the Unix epoch.
    pub created_at: i64,

    /// Last structural change, microseconds since the Unix epoch.
    pub modified_at: i64,

    /// Reserved for a future transaction log.
    pub transaction_id: u64,

    /// Feature flags; see `FLAG_TRANSACTION_LOG`.
    pub flags: u32,

    /// Identifier of the key codec this file was written with.
    pub key_codec_tag: String,

    /// Identifier of the value codec this file was written with.
    pub value_codec_tag: String,
}

impl FileHeader {
    /// Build a header for a freshly created store.
    ///
    /// Counters start at their empty-tree values; `total_file_size` starts
    /// just past the header.
    pub fn new(
        order: u32,
        node_size: u32,
        key_fixed_size: u32,
        value_fixed_size: u32,
        key_codec_tag: &str,
        value_codec_tag: &str,
        transaction_log: bool,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_micros();
        Self {
            order,
            key_fixed_size,
            value_fixed_size,
            node_size,
            root_offset: 0,
            node_count: 0,
            height: 0,
            free_list_head: 0,
            total_file_size: HEADER_SIZE as u64,
            created_at: now,
            modified_at: now,
            transaction_id: 0,
            flags: if transaction_log {
                FLAG_TRANSACTION_LOG
            } else {
                0
            },
            key_codec_tag: key_codec_tag.to_string(),
            value_codec_tag: value_codec_tag.to_string(),
        }
    }

    /// Stamp `modified_at` with the current time.
    pub fn touch(&mut self) {
        self.modified_at = chrono::Utc::now().timestamp_micros();
    }

    /// Serialise to the 512-byte on-disc form, computing the checksum.
    pub fn to_bytes(&self) -> TreeResult<[u8; HEADER_SIZE]> {
        let mut bytes = [0u8; HEADER_SIZE];

        bytes[0..4].copy_from_slice(&STORE_MAGIC.to_le_bytes());
        bytes[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        // checksum at [8..12] filled in below
        bytes[12..16].copy_from_slice(&self.order.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.key_fixed_size.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.value_fixed_size.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.node_size.to_le_bytes());
        bytes[28..36].copy_from_slice(&self.root_offset.to_le_bytes());
        bytes[36..44].copy_from_slice(&self.node_count.to_le_bytes());
        bytes[44..48].copy_from_slice(&self.height.to_le_bytes());
        bytes[48..56].copy_from_slice(&self.free_list_head.to_le_bytes());
        bytes[56..64].copy_from_slice(&self.total_file_size.to_le_bytes());
        bytes[64..72].copy_from_slice(&self.created_at.to_le_bytes());
        bytes[72..80].copy_from_slice(&self.modified_at.to_le_bytes());
        bytes[80..88].copy_from_slice(&self.transaction_id.to_le_bytes());
        bytes[88..92].copy_from_slice(&self.flags.to_le_bytes());

        write_tag(&mut bytes[92..108], &self.key_codec_tag)?;
        write_tag(&mut bytes[108..124], &self.value_codec_tag)?;

        let checksum = crc32fast::hash(&bytes[12..]);
        bytes[8..12].copy_from_slice(&checksum.to_le_bytes());

        Ok(bytes)
    }

    /// Parse and validate the 512-byte on-disc form.
    ///
    /// ## Error Conditions
    /// - `Corruption`: wrong length, magic, version, or checksum mismatch;
    ///   order below the structural minimum
    pub fn from_bytes(bytes: &[u8]) -> TreeResult<Self> {
        if bytes.len() != HEADER_SIZE {
            return Err(TreeError::Corruption {
                detail: format!("header must be {} bytes, got {}", HEADER_SIZE, bytes.len()),
            });
        }

        let magic = read_u32(bytes, 0);
        if magic != STORE_MAGIC {
            return Err(TreeError::Corruption {
                detail: format!(
                    "invalid magic: expected 0x{:08X}, got 0x{:08X}",
                    STORE_MAGIC, magic
                ),
            });
        }

        let version = read_u32(bytes, 4);
        if version != FORMAT_VERSION {
            return Err(TreeError::Corruption {
                detail: format!("unsupported format version {}", version),
            });
        }

        let stored_checksum = read_u32(bytes, 8);
        let computed = crc32fast::hash(&bytes[12..]);
        if stored_checksum != computed {
            return Err(TreeError::Corruption {
                detail: format!(
                    "header checksum mismatch: stored 0x{:08X}, computed 0x{:08X}",
                    stored_checksum, computed
                ),
            });
        }

        let order = read_u32(bytes, 12);
        if order < 4 {
            return Err(TreeError::Corruption {
                detail: format!("stored order {} below minimum 4", order),
            });
        }

        Ok(Self {
            order,
            key_fixed_size: read_u32(bytes, 16),
            value_fixed_size: read_u32(bytes, 20),
            node_size: read_u32(bytes, 24),
            root_offset: read_u64(bytes, 28),
            node_count: read_u64(bytes, 36),
            height: read_u32(bytes, 44),
            free_list_head: read_u64(bytes, 48),
            total_file_size: read_u64(bytes, 56),
            created_at: read_i64(bytes, 64),
            modified_at: read_i64(bytes, 72),
            transaction_id: read_u64(bytes, 80),
            flags: read_u32(bytes, 88),
            key_codec_tag: read_tag(&bytes[92..108]),
            value_codec_tag: read_tag(&bytes[108..124]),
        })
    }
}

fn write_tag(slot: &mut [u8], tag: &str) -> TreeResult<()> {
    if !tag.is_ascii() || tag.len() > CODEC_TAG_SIZE {
        return Err(TreeError::InvalidArgument {
            reason: format!(
                "codec tag '{}' must be ASCII and at most {} bytes",
                tag, CODEC_TAG_SIZE
            ),
        });
    }
    slot[..tag.len()].copy_from_slice(tag.as_bytes());
    Ok(())
}

fn read_tag(slot: &[u8]) -> String {
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    String::from_utf8_lossy(&slot[..end]).to_string()
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    i64::from_le_bytes(raw)
}
