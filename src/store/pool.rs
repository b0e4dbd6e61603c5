// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! LRU buffer pool of decoded nodes keyed by file offset.
//!
//! The pool caches fully decoded nodes so that repeated descents touch the
//! device as little as possible. Entries carry a dirty flag; the write policy
//! (write-through vs write-back) is enforced by the engine, which decides
//! whether a `put` is clean or dirty.
//!
//! ## Recency Bookkeeping
//!
//! A `HashMap` holds the entries; a queue of `(offset, tick)` pairs records
//! access order. Touching an entry bumps its tick and pushes a fresh pair;
//! stale pairs are skipped at eviction time. This gives O(1) amortised
//! touches without a linked list.
//!
//! ## I/O Discipline
//!
//! The pool never performs I/O. Evicted dirty nodes are *returned* from
//! [`BufferPool::put`] and the engine writes them out immediately, before
//! the operation proceeds; no dirty entry ever leaves the cache without
//! being handed to the writer.

use super::node::Node;
use std::collections::{HashMap, VecDeque};

/// Policy for propagating mutated nodes to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Mutations are written to the device before being cached clean.
    #[default]
    WriteThrough,

    /// Mutations are cached dirty and written on eviction, flush, or close.
    WriteBack,
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolStats {
    /// Lookups answered from the cache.
    pub hits: u64,

    /// Lookups that required a device read.
    pub misses: u64,

    /// Entries evicted to honour the capacity bound.
    pub evictions: u64,

    /// Nodes currently cached.
    pub cached_nodes: usize,

    /// `hits / (hits + misses)`, or 0.0 before any lookup.
    pub hit_rate: f64,
}

struct CacheEntry<K, V> {
    node: Node<K, V>,
    dirty: bool,
    tick: u64,
}

/// LRU cache of decoded nodes.
pub struct BufferPool<K, V> {
    capacity: usize,
    entries: HashMap<u64, CacheEntry<K, V>>,
    recency: VecDeque<(u64, u64)>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K: Clone, V: Clone> BufferPool<K, V> {
    /// Create a pool holding at most `capacity` nodes.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            recency: VecDeque::new(),
            tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up a node by offset, counting a hit or miss.
    ///
    /// Returns a clone; the engine mutates its copy and `put`s it back.
    pub fn get(&mut self, offset: u64) -> Option<Node<K, V>> {
        self.tick += 1;
        let tick = self.tick;
        match self.entries.get_mut(&offset) {
            Some(entry) => {
                entry.tick = tick;
                self.recency.push_back((offset, tick));
                self.hits += 1;
                Some(entry.node.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Whether `offset` is currently cached and dirty.
    pub fn is_dirty(&self, offset: u64) -> bool {
        self.entries.get(&offset).is_some_and(|e| e.dirty)
    }

    /// Insert or replace a node, then evict down to capacity.
    ///
    /// ## Output
    /// - Evicted dirty nodes, oldest first. The caller must write every one
    ///   of them out before continuing the operation.
    pub fn put(&mut self, offset: u64, node: Node<K, V>, dirty: bool) -> Vec<(u64, Node<K, V>)> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.insert(offset, CacheEntry { node, dirty, tick });
        self.recency.push_back((offset, tick));
        self.evict_to_capacity()
    }

    /// Remove an entry (freed node); its dirty state is discarded.
    pub fn remove(&mut self, offset: u64) {
        self.entries.remove(&offset);
    }

    /// Clone out every dirty node and mark the originals clean.
    ///
    /// Returned in offset order for deterministic write patterns.
    pub fn take_dirty(&mut self) -> Vec<(u64, Node<K, V>)> {
        let mut dirty: Vec<(u64, Node<K, V>)> = self
            .entries
            .iter_mut()
            .filter(|(_, entry)| entry.dirty)
            .map(|(offset, entry)| {
                entry.dirty = false;
                (*offset, entry.node.clone())
            })
            .collect();
        dirty.sort_by_key(|(offset, _)| *offset);
        dirty
    }

    /// Drop every entry and reset recency (statistics are kept).
    ///
    /// Callers flush first; any dirty entries still cached are discarded.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    /// Number of cached nodes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> PoolStats {
        let total = self.hits + self.misses;
        PoolStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            cached_nodes: self.entries.len(),
            hit_rate: if total == 0 {
                0.0
            } else {
                self.hits as f64 / total as f64
            },
        }
    }

    fn evict_to_capacity(&mut self) -> Vec<(u64, Node<K, V>)> {
        let mut written_back = Vec::new();
        while self.entries.len() > self.capacity {
            let (offset, tick) = match self.recency.pop_front() {
                Some(pair) => pair,
                None => break,
            };
            // Skip stale recency records for entries touched since
            let current = match self.entries.get(&offset) {
                Some(entry) if entry.tick == tick => entry,
                _ => continue,
            };
            let dirty = current.dirty;
            if let Some(entry) = self.entries.remove(&offset) {
                self.evictions += 1;
                if dirty {
                    written_back.push((offset, entry.node));
                }
            }
        }
        written_back
    }
}
