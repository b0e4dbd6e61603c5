// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Node page codec: fixed-size pages with headers and CRC32 validation.
//!
//! Every node occupies exactly one page. A page is a 64-byte node header
//! followed by the payload and zero padding up to the page size. The CRC32
//! covers the entire data section (payload plus padding), so any corrupted
//! byte in the stored page body is detected before entry decoding begins.
//!
//! ## Page Layout
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │ Node header (64 bytes)                          │
//! ├─────────────────────────────────────────────────┤
//! │ Payload                                         │
//! │ - Leaf: (key, value) per entry                  │
//! │ - Internal: child₀, (key, childᵢ₊₁) per key     │
//! ├─────────────────────────────────────────────────┤
//! │ Zero padding to page size                       │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Node Header Layout (little-endian)
//! ```text
//! Offset | Size | Field
//! -------|------|-----------------------------
//! 0      | 1    | node type (0 internal, 1 leaf)
//! 1      | 1    | deleted flag
//! 2      | 2    | key count (u16)
//! 4      | 4    | checksum (CRC32 of data section)
//! 8      | 8    | node id
//! 16     | 8    | parent offset
//! 24     | 8    | left sibling offset
//! 32     | 8    | right sibling offset
//! 40     | 8    | created_at (µs since epoch)
//! 48     | 8    | modified_at
//! 56     | 8    | reserved
//! ```
//!
//! Variable-length keys and values frame themselves (see `codec`); fixed-size
//! codecs write raw bytes. Child offsets are 8-byte little-endian.

use super::node::{InternalNode, LeafNode, Node, NodeType};
use crate::codec::Codec;
use crate::error::{TreeError, TreeResult};

/// Node header size in bytes.
pub const NODE_HEADER_SIZE: usize = 64;

/// Size of a child offset in an internal node payload.
const CHILD_OFFSET_SIZE: usize = 8;

/// Largest admissible encoded entry (key + value) for a page/order pair.
///
/// Chosen so that any node holding up to `order - 1` keys is guaranteed to
/// fit its page, including the extra child offsets an internal node carries.
/// Inserts above this limit fail with a capacity error; callers needing
/// larger entries raise the page size or lower the order.
pub fn max_entry_size(page_size: usize, order: u32) -> usize {
    let data = page_size.saturating_sub(NODE_HEADER_SIZE + CHILD_OFFSET_SIZE);
    let max_keys = (order - 1) as usize;
    (data / max_keys).saturating_sub(CHILD_OFFSET_SIZE)
}

/// Exact payload size of a node under the given codecs.
pub fn payload_size<K, V>(
    node: &Node<K, V>,
    key_codec: &dyn Codec<K>,
    value_codec: &dyn Codec<V>,
) -> usize
where
    K: Clone,
    V: Clone,
{
    match node {
        Node::Leaf(leaf) => leaf
            .keys
            .iter()
            .zip(leaf.values.iter())
            .map(|(k, v)| key_codec.encoded_size(k) + value_codec.encoded_size(v))
            .sum(),
        Node::Internal(internal) => {
            let key_bytes: usize = internal
                .keys
                .iter()
                .map(|k| key_codec.encoded_size(k))
                .sum();
            key_bytes + internal.children.len() * CHILD_OFFSET_SIZE
        }
    }
}

/// Encode a node into a full page buffer of exactly `page_size` bytes.
///
/// The data-section checksum is computed and stored in the node header.
///
/// ## Error Conditions
/// - `Capacity`: the encoded payload does not fit the page
/// - `Codec`: a key or value failed to encode
pub fn encode_node<K, V>(
    node: &Node<K, V>,
    key_codec: &dyn Codec<K>,
    value_codec: &dyn Codec<V>,
    page_size: usize,
) -> TreeResult<Vec<u8>>
where
    K: Clone,
    V: Clone,
{
    let mut payload = Vec::with_capacity(page_size - NODE_HEADER_SIZE);

    match node {
        Node::Leaf(leaf) => {
            for (key, value) in leaf.keys.iter().zip(leaf.values.iter()) {
                key_codec.encode(key, &mut payload)?;
                value_codec.encode(value, &mut payload)?;
            }
        }
        Node::Internal(internal) => {
            if internal.children.len() != internal.keys.len() + 1 {
                return Err(TreeError::Corruption {
                    detail: format!(
                        "internal node {} has {} keys but {} children",
                        internal.node_id,
                        internal.keys.len(),
                        internal.children.len()
                    ),
                });
            }
            payload.extend_from_slice(&internal.children[0].to_le_bytes());
            for (idx, key) in internal.keys.iter().enumerate() {
                key_codec.encode(key, &mut payload)?;
                payload.extend_from_slice(&internal.children[idx + 1].to_le_bytes());
            }
        }
    }

    let data_size = page_size - NODE_HEADER_SIZE;
    if payload.len() > data_size {
        return Err(TreeError::Capacity {
            needed: payload.len(),
            limit: data_size,
        });
    }

    let mut page = vec![0u8; page_size];
    page[NODE_HEADER_SIZE..NODE_HEADER_SIZE + payload.len()].copy_from_slice(&payload);

    let checksum = crc32fast::hash(&page[NODE_HEADER_SIZE..]);

    let (node_id, parent, left, right, created_at, modified_at) = match node {
        Node::Leaf(leaf) => (
            leaf.node_id,
            leaf.parent,
            leaf.left,
            leaf.right,
            leaf.created_at,
            leaf.modified_at,
        ),
        Node::Internal(internal) => (
            internal.node_id,
            internal.parent,
            0,
            0,
            internal.created_at,
            internal.modified_at,
        ),
    };

    page[0] = node.node_type() as u8;
    page[1] = 0; // deleted flag
    page[2..4].copy_from_slice(&(node.key_count() as u16).to_le_bytes());
    page[4..8].copy_from_slice(&checksum.to_le_bytes());
    page[8..16].copy_from_slice(&node_id.to_le_bytes());
    page[16..24].copy_from_slice(&parent.to_le_bytes());
    page[24..32].copy_from_slice(&left.to_le_bytes());
    page[32..40].copy_from_slice(&right.to_le_bytes());
    page[40..48].copy_from_slice(&created_at.to_le_bytes());
    page[48..56].copy_from_slice(&modified_at.to_le_bytes());

    Ok(page)
}

/// Decode a node from a full page buffer.
///
/// Verifies the data-section checksum before any entry decoding.
///
/// ## Input
/// - `page`: exactly one page as read from the device
/// - `offset`: the page's file offset, for error context only
///
/// ## Error Conditions
/// - `Corruption`: checksum mismatch, unknown node type, deleted page,
///   or a key count the payload cannot satisfy
/// - `Codec`: a key or value failed to decode
pub fn decode_node<K, V>(
    page: &[u8],
    offset: u64,
    key_codec: &dyn Codec<K>,
    value_codec: &dyn Codec<V>,
) -> TreeResult<Node<K, V>>
where
    K: Clone,
    V: Clone,
{
    if page.len() <= NODE_HEADER_SIZE {
        return Err(TreeError::Corruption {
            detail: format!(
                "page at offset {} is {} bytes, below minimum {}",
                offset,
                page.len(),
                NODE_HEADER_SIZE
            ),
        });
    }

    let node_type = NodeType::from_byte(page[0]).map_err(|_| TreeError::Corruption {
        detail: format!("invalid node type byte {} at offset {}", page[0], offset),
    })?;

    if page[1] != 0 {
        return Err(TreeError::Corruption {
            detail: format!("node at offset {} is marked deleted", offset),
        });
    }

    let key_count = u16::from_le_bytes([page[2], page[3]]) as usize;

    let stored_checksum = u32::from_le_bytes([page[4], page[5], page[6], page[7]]);
    let computed = crc32fast::hash(&page[NODE_HEADER_SIZE..]);
    if stored_checksum != computed {
        return Err(TreeError::Corruption {
            detail: format!(
                "checksum mismatch at offset {}: stored 0x{:08X}, computed 0x{:08X}",
                offset, stored_checksum, computed
            ),
        });
    }

    let node_id = read_u64(page, 8);
    let parent = read_u64(page, 16);
    let left = read_u64(page, 24);
    let right = read_u64(page, 32);
    let created_at = read_i64(page, 40);
    let modified_at = read_i64(page, 48);

    let mut cursor = &page[NODE_HEADER_SIZE..];

    match node_type {
        NodeType::Leaf => {
            let mut keys = Vec::with_capacity(key_count);
            let mut values = Vec::with_capacity(key_count);
            for _ in 0..key_count {
                keys.push(key_codec.decode(&mut cursor).map_err(|e| at(e, offset))?);
                values.push(value_codec.decode(&mut cursor).map_err(|e| at(e, offset))?);
            }
            Ok(Node::Leaf(LeafNode {
                node_id,
                parent,
                left,
                right,
                keys,
                values,
                created_at,
                modified_at,
            }))
        }
        NodeType::Internal => {
            let mut children = Vec::with_capacity(key_count + 1);
            let first = take_offset(&mut cursor, offset)?;
            children.push(first);
            let mut keys = Vec::with_capacity(key_count);
            for _ in 0..key_count {
                keys.push(key_codec.decode(&mut cursor).map_err(|e| at(e, offset))?);
                children.push(take_offset(&mut cursor, offset)?);
            }
            Ok(Node::Internal(InternalNode {
                node_id,
                parent,
                keys,
                children,
                created_at,
                modified_at,
            }))
        }
    }
}

/// Rewrap a codec error with the page offset it occurred at.
fn at(err: TreeError, offset: u64) -> TreeError {
    match err {
        TreeError::Codec { reason } => TreeError::Corruption {
            detail: format!("undecodable payload at offset {}: {}", offset, reason),
        },
        other => other,
    }
}

fn take_offset(cursor: &mut &[u8], offset: u64) -> TreeResult<u64> {
    if cursor.len() < CHILD_OFFSET_SIZE {
        return Err(TreeError::Corruption {
            detail: format!("truncated child offset at offset {}", offset),
        });
    }
    let (head, tail) = cursor.split_at(CHILD_OFFSET_SIZE);
    *cursor = tail;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(head);
    Ok(u64::from_le_bytes(raw))
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
