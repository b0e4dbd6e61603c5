// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Tests for the node page codec.

use super::node::{InternalNode, LeafNode, Node};
use super::page::*;
use crate::codec::{I32Codec, StringCodec};
use crate::error::TreeError;

const PAGE: usize = 4096;

fn sample_leaf() -> Node<i32, String> {
    let mut leaf: LeafNode<i32, String> = LeafNode::new(512);
    leaf.parent = 8704;
    leaf.left = 4608;
    leaf.right = 12800;
    leaf.keys = vec![10, 20, 30];
    leaf.values = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    Node::Leaf(leaf)
}

fn sample_internal() -> Node<i32, String> {
    let mut internal: InternalNode<i32> = InternalNode::new(8704);
    internal.keys = vec![100, 200];
    internal.children = vec![512, 4608, 12800];
    Node::Internal(internal)
}

#[test]
fn test_leaf_round_trip() {
    let node = sample_leaf();
    let page = encode_node(&node, &I32Codec, &StringCodec, PAGE).unwrap();
    assert_eq!(page.len(), PAGE);

    let decoded = decode_node(&page, 512, &I32Codec, &StringCodec).unwrap();
    let leaf = decoded.expect_leaf().unwrap();
    assert_eq!(leaf.node_id, 512);
    assert_eq!(leaf.parent, 8704);
    assert_eq!(leaf.left, 4608);
    assert_eq!(leaf.right, 12800);
    assert_eq!(leaf.keys, vec![10, 20, 30]);
    assert_eq!(leaf.values, vec!["a", "b", "c"]);
}

#[test]
fn test_internal_round_trip() {
    let node = sample_internal();
    let page = encode_node(&node, &I32Codec, &StringCodec, PAGE).unwrap();

    let decoded: Node<i32, String> = decode_node(&page, 8704, &I32Codec, &StringCodec).unwrap();
    let internal = decoded.expect_internal().unwrap();
    assert_eq!(internal.node_id, 8704);
    assert_eq!(internal.keys, vec![100, 200]);
    assert_eq!(internal.children, vec![512, 4608, 12800]);
}

#[test]
fn test_empty_leaf_round_trip() {
    let node: Node<i32, String> = Node::Leaf(LeafNode::new(512));
    let page = encode_node(&node, &I32Codec, &StringCodec, PAGE).unwrap();
    let decoded = decode_node(&page, 512, &I32Codec, &StringCodec).unwrap();
    assert_eq!(decoded.key_count(), 0);
}

#[test]
fn test_header_fields_in_page() {
    let page = encode_node(&sample_leaf(), &I32Codec, &StringCodec, PAGE).unwrap();
    assert_eq!(page[0], 1); // leaf discriminator
    assert_eq!(page[1], 0); // not deleted
    assert_eq!(u16::from_le_bytes([page[2], page[3]]), 3); // key count
}

#[test]
fn test_flipped_payload_bit_detected() {
    let mut page = encode_node(&sample_leaf(), &I32Codec, &StringCodec, PAGE).unwrap();
    page[NODE_HEADER_SIZE + 5] ^= 0x40;

    match decode_node::<i32, String>(&page, 512, &I32Codec, &StringCodec) {
        Err(TreeError::Corruption { detail }) => assert!(detail.contains("checksum")),
        other => panic!("expected corruption, got {:?}", other),
    }
}

#[test]
fn test_flipped_padding_bit_detected() {
    // The checksum covers padding too, so corruption anywhere in the data
    // section is caught.
    let mut page = encode_node(&sample_leaf(), &I32Codec, &StringCodec, PAGE).unwrap();
    let last = page.len() - 1;
    page[last] ^= 0x01;
    assert!(decode_node::<i32, String>(&page, 512, &I32Codec, &StringCodec).is_err());
}

#[test]
fn test_deleted_page_rejected() {
    let mut page = encode_node(&sample_leaf(), &I32Codec, &StringCodec, PAGE).unwrap();
    page[1] = 1;
    assert!(matches!(
        decode_node::<i32, String>(&page, 512, &I32Codec, &StringCodec),
        Err(TreeError::Corruption { .. })
    ));
}

#[test]
fn test_unknown_node_type_rejected() {
    let mut page = encode_node(&sample_leaf(), &I32Codec, &StringCodec, PAGE).unwrap();
    page[0] = 9;
    assert!(decode_node::<i32, String>(&page, 512, &I32Codec, &StringCodec).is_err());
}

#[test]
fn test_oversized_node_rejected() {
    let mut leaf: LeafNode<i32, String> = LeafNode::new(512);
    leaf.keys.push(1);
    leaf.values.push("x".repeat(PAGE));
    let node = Node::Leaf(leaf);

    match encode_node(&node, &I32Codec, &StringCodec, PAGE) {
        Err(TreeError::Capacity { needed, limit }) => {
            assert!(needed > limit);
            assert_eq!(limit, PAGE - NODE_HEADER_SIZE);
        }
        other => panic!("expected capacity error, got {:?}", other),
    }
}

#[test]
fn test_mismatched_child_count_rejected() {
    let mut internal: InternalNode<i32> = InternalNode::new(512);
    internal.keys = vec![1, 2];
    internal.children = vec![10, 20]; // should be 3
    let node: Node<i32, String> = Node::Internal(internal);
    assert!(encode_node(&node, &I32Codec, &StringCodec, PAGE).is_err());
}

#[test]
fn test_payload_size_matches_encoding() {
    let node = sample_leaf();
    let size = payload_size(&node, &I32Codec, &StringCodec);
    // 3 entries: 4-byte key + (4-byte prefix + 1-byte string) each
    assert_eq!(size, 3 * (4 + 5));

    let internal = sample_internal();
    let size = payload_size(&internal, &I32Codec, &StringCodec);
    // child0 + 2 * (key + child)
    assert_eq!(size, 8 + 2 * (4 + 8));
}

#[test]
fn test_max_entry_size_bounds() {
    // order 32 on a 4 KiB page leaves usable room per entry
    let limit = max_entry_size(4096, 32);
    assert!(limit > 64, "limit {} too small", limit);
    assert!(limit < 4096 - NODE_HEADER_SIZE);

    // larger order shrinks the per-entry limit
    assert!(max_entry_size(4096, 128) < limit);
}
