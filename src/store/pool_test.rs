// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Tests for the LRU buffer pool.

use super::node::{LeafNode, Node};
use super::pool::*;

fn leaf(id: u64, key: i32) -> Node<i32, i32> {
    let mut node: LeafNode<i32, i32> = LeafNode::new(id);
    node.keys.push(key);
    node.values.push(key);
    Node::Leaf(node)
}

fn first_key(node: &Node<i32, i32>) -> i32 {
    node.expect_leaf().unwrap().keys[0]
}

#[test]
fn test_get_after_put_hits() {
    let mut pool: BufferPool<i32, i32> = BufferPool::new(10);
    pool.put(512, leaf(512, 1), false);

    let node = pool.get(512).expect("cached node");
    assert_eq!(first_key(&node), 1);

    let stats = pool.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 0);
}

#[test]
fn test_miss_counted() {
    let mut pool: BufferPool<i32, i32> = BufferPool::new(10);
    assert!(pool.get(4096).is_none());
    assert_eq!(pool.stats().misses, 1);
}

#[test]
fn test_capacity_honoured_after_put() {
    let mut pool: BufferPool<i32, i32> = BufferPool::new(3);
    for i in 0..5u64 {
        pool.put(512 + i * 4096, leaf(i, i as i32), false);
    }
    assert_eq!(pool.len(), 3);
    assert_eq!(pool.stats().evictions, 2);
}

#[test]
fn test_lru_order_evicts_least_recent() {
    let mut pool: BufferPool<i32, i32> = BufferPool::new(2);
    pool.put(100, leaf(100, 1), false);
    pool.put(200, leaf(200, 2), false);

    // Touch 100 so that 200 becomes least recently used
    pool.get(100);
    pool.put(300, leaf(300, 3), false);

    assert!(pool.get(100).is_some());
    assert!(pool.get(300).is_some());
    assert!(pool.get(200).is_none());
}

#[test]
fn test_dirty_eviction_returned_for_writing() {
    let mut pool: BufferPool<i32, i32> = BufferPool::new(1);
    pool.put(100, leaf(100, 1), true);

    let evicted = pool.put(200, leaf(200, 2), false);
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].0, 100);
    assert_eq!(first_key(&evicted[0].1), 1);
}

#[test]
fn test_clean_eviction_not_returned() {
    let mut pool: BufferPool<i32, i32> = BufferPool::new(1);
    pool.put(100, leaf(100, 1), false);
    let evicted = pool.put(200, leaf(200, 2), false);
    assert!(evicted.is_empty());
}

#[test]
fn test_take_dirty_marks_clean() {
    let mut pool: BufferPool<i32, i32> = BufferPool::new(10);
    pool.put(100, leaf(100, 1), true);
    pool.put(200, leaf(200, 2), false);
    pool.put(300, leaf(300, 3), true);

    let dirty = pool.take_dirty();
    let offsets: Vec<u64> = dirty.iter().map(|(o, _)| *o).collect();
    assert_eq!(offsets, vec![100, 300]);

    // Second call finds nothing dirty
    assert!(pool.take_dirty().is_empty());
    assert!(!pool.is_dirty(100));
}

#[test]
fn test_put_replaces_and_updates_dirty_flag() {
    let mut pool: BufferPool<i32, i32> = BufferPool::new(10);
    pool.put(100, leaf(100, 1), true);
    assert!(pool.is_dirty(100));

    // Write-through rewrite marks the entry clean again
    pool.put(100, leaf(100, 9), false);
    assert!(!pool.is_dirty(100));
    assert_eq!(first_key(&pool.get(100).unwrap()), 9);
    assert_eq!(pool.len(), 1);
}

#[test]
fn test_remove_discards_entry() {
    let mut pool: BufferPool<i32, i32> = BufferPool::new(10);
    pool.put(100, leaf(100, 1), true);
    pool.remove(100);
    assert!(pool.get(100).is_none());
    assert!(pool.take_dirty().is_empty());
}

#[test]
fn test_clear_empties_cache() {
    let mut pool: BufferPool<i32, i32> = BufferPool::new(10);
    pool.put(100, leaf(100, 1), false);
    pool.put(200, leaf(200, 2), false);
    pool.clear();
    assert!(pool.is_empty());
}

#[test]
fn test_hit_rate() {
    let mut pool: BufferPool<i32, i32> = BufferPool::new(10);
    assert_eq!(pool.stats().hit_rate, 0.0);

    pool.put(100, leaf(100, 1), false);
    pool.get(100);
    pool.get(100);
    pool.get(999);

    let stats = pool.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_stale_recency_records_skipped() {
    let mut pool: BufferPool<i32, i32> = BufferPool::new(2);
    pool.put(100, leaf(100, 1), false);
    // Touch repeatedly to pile up stale recency records
    for _ in 0..10 {
        pool.get(100);
    }
    pool.put(200, leaf(200, 2), false);
    pool.put(300, leaf(300, 3), false);

    // 100's last touch predates both puts, so it is the true LRU victim
    assert!(pool.get(100).is_none());
    assert!(pool.get(200).is_some());
    assert!(pool.get(300).is_some());
    assert_eq!(pool.len(), 2);
}
