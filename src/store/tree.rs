// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! B-tree engine over a single page-addressed store file.
//!
//! Ties the lower layers together: the block device holds the bytes, the
//! header carries tree-wide state, the buffer pool caches decoded nodes, the
//! allocator hands out pages, and this module implements the actual tree
//! algorithms.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │ BTree                                           │
//! ├─────────────────────────────────────────────────┤
//! │ - device: FileDevice (locked store file)        │
//! │ - header: FileHeader (root, counters, freelist) │
//! │ - pool:   BufferPool (LRU of decoded nodes)     │
//! │ - codecs: Codec<K>, Codec<V>                    │
//! │ - compare: total order over keys                │
//! └─────────────────────────────────────────────────┘
//!          │ page read/write         │ decode/encode
//!          ▼                         ▼
//! ┌──────────────────┐      ┌──────────────────────┐
//! │ store file       │      │ node pages           │
//! │ [header 512B]    │      │ [64B hdr | payload]  │
//! │ [page][page]...  │      │ CRC32 over data      │
//! └──────────────────┘      └──────────────────────┘
//! ```
//!
//! ## Algorithms
//!
//! - **Insert**: preemptive top-down splitting. Any full node is split on
//!   the way down, so the final leaf insertion never propagates back up.
//! - **Delete**: top-down "ensure t keys" fixing. Before descending into a
//!   child at minimum occupancy, one key is borrowed through the parent or
//!   the child is merged with a sibling around the separator.
//! - **Range / entries**: descend once, then walk the leaf sibling chain.
//! - **Verify**: re-reads every reachable page from the device so stored
//!   checksums are actually validated, then audits ordering, separator
//!   bounds, occupancy, leaf depth, and the node count.
//!
//! Values live in leaves only; internal nodes hold separator keys and child
//! offsets. A fatal error (I/O or corruption) poisons the engine: every
//! subsequent operation fails with `Closed` until the store is re-opened.

use super::alloc::{allocate_page, free_page};
use super::header::{FileHeader, HEADER_SIZE};
use super::node::{InternalNode, KeyCompare, LeafNode, Node, Order};
use super::page::{decode_node, encode_node, max_entry_size};
use super::pool::{BufferPool, WriteMode};
use crate::codec::Codec;
use crate::device::{BlockDevice, FileDevice};
use crate::error::{TreeError, TreeResult};
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default branching factor.
pub const DEFAULT_ORDER: u32 = 128;

/// Default buffer pool capacity in nodes.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

/// Progress callback for bulk loading: `(entries_loaded, total)`.
pub type ProgressFn = Box<dyn Fn(usize, usize) + Send>;

/// Store configuration.
///
/// Construct with [`StoreConfig::new`] for defaults, then adjust fields.
/// When opening an existing store, the stored `order` and `page_size` win
/// over the configured values.
pub struct StoreConfig<K, V> {
    /// Path of the store file.
    pub path: PathBuf,

    /// Maximum children per internal node (default 128).
    pub order: u32,

    /// Buffer pool capacity in nodes (default 1000).
    pub cache_capacity: usize,

    /// Write policy (default write-through).
    pub write_mode: WriteMode,

    /// Page size in bytes (default 4096).
    pub page_size: u32,

    /// Open an existing store instead of creating a new one.
    pub open_existing: bool,

    /// Record the reserved transaction-log flag in the header.
    pub enable_transaction_log: bool,

    /// Skip the codec-tag compatibility check when opening.
    pub ignore_codec_tags: bool,

    /// Gateway reply timeout; `None` waits indefinitely.
    pub timeout: Option<Duration>,

    /// Key codec handle.
    pub key_codec: Box<dyn Codec<K>>,

    /// Value codec handle.
    pub value_codec: Box<dyn Codec<V>>,

    /// Total order over keys; defaults to the key type's natural order.
    pub compare_keys: Option<KeyCompare<K>>,
}

impl<K, V> StoreConfig<K, V> {
    /// Configuration with defaults for everything but path and codecs.
    pub fn new<P: Into<PathBuf>>(
        path: P,
        key_codec: Box<dyn Codec<K>>,
        value_codec: Box<dyn Codec<V>>,
    ) -> Self {
        Self {
            path: path.into(),
            order: DEFAULT_ORDER,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            write_mode: WriteMode::WriteThrough,
            page_size: DEFAULT_PAGE_SIZE,
            open_existing: false,
            enable_transaction_log: false,
            ignore_codec_tags: false,
            timeout: None,
            key_codec,
            value_codec,
            compare_keys: None,
        }
    }
}

/// Range scan options.
#[derive(Debug, Clone, Copy)]
pub struct RangeOptions {
    /// Include entries equal to the start bound (default true).
    pub include_start: bool,

    /// Include entries equal to the end bound (default true).
    pub include_end: bool,

    /// Maximum number of results; `None` is unbounded.
    pub limit: Option<usize>,

    /// Return results in descending key order.
    pub reverse: bool,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            include_start: true,
            include_end: true,
            limit: None,
            reverse: false,
        }
    }
}

/// Bulk load options.
pub struct BulkLoadOptions {
    /// Input is already sorted by key.
    pub sorted: bool,

    /// Entries per progress-callback batch (default 100).
    pub batch_size: usize,

    /// Invoked after each batch and once at the end.
    pub progress: Option<ProgressFn>,
}

impl Default for BulkLoadOptions {
    fn default() -> Self {
        Self {
            sorted: false,
            batch_size: 100,
            progress: None,
        }
    }
}

/// Store statistics snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeStats {
    /// Live nodes reachable from the root.
    pub node_count: u64,

    /// Tree height (0 for a never-written store).
    pub height: u32,

    /// Number of entries, counted from the leaf chain.
    pub key_count: u64,

    /// Logical file size in bytes.
    pub file_size: u64,

    /// Buffer pool hit rate.
    pub cache_hit_rate: f64,

    /// Nodes currently cached.
    pub cached_nodes: usize,
}

/// Persistent ordered key-value store over a single-file B-tree.
pub struct BTree<K, V> {
    device: FileDevice,
    header: FileHeader,
    pool: BufferPool<K, V>,
    order: Order,
    page_size: usize,
    write_mode: WriteMode,
    max_entry: usize,
    key_codec: Box<dyn Codec<K>>,
    value_codec: Box<dyn Codec<V>>,
    compare: KeyCompare<K>,
    poisoned: bool,
}

impl<K, V> BTree<K, V>
where
    K: Clone + Ord + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create or open a store according to `config`.
    ///
    /// ## Output
    /// - `Ok(BTree)`: store ready for operations
    /// - `Err(TreeError::AlreadyExists)`: create, but the file is present
    /// - `Err(TreeError::NotFound)`: open, but the file is absent
    /// - `Err(TreeError::InvalidArgument)`: bad order/page-size combination
    ///   or codec tags disagreeing with the stored ones
    /// - `Err(TreeError::Corruption)`: stored header fails validation
    pub fn open(config: StoreConfig<K, V>) -> TreeResult<Self> {
        if config.cache_capacity == 0 {
            return Err(TreeError::InvalidArgument {
                reason: "cache capacity must be at least 1".to_string(),
            });
        }

        let compare: KeyCompare<K> = match config.compare_keys {
            Some(cmp) => cmp,
            None => Arc::new(|a: &K, b: &K| a.cmp(b)),
        };

        let (device, header) = if config.open_existing {
            let mut device = FileDevice::open(&config.path)?;
            if device.size()? < HEADER_SIZE as u64 {
                return Err(TreeError::Corruption {
                    detail: "file too short to hold a store header".to_string(),
                });
            }
            let raw = device.read(0, HEADER_SIZE)?;
            let header = FileHeader::from_bytes(&raw)?;

            if !config.ignore_codec_tags {
                check_codec_tag("key", &header.key_codec_tag, config.key_codec.tag())?;
                check_codec_tag("value", &header.value_codec_tag, config.value_codec.tag())?;
            }
            (device, header)
        } else {
            Order::new(config.order)?;
            // Reject impossible geometry before touching the filesystem
            check_geometry(config.page_size as usize, config.order)?;
            let header = FileHeader::new(
                config.order,
                config.page_size,
                config.key_codec.fixed_size().unwrap_or(0) as u32,
                config.value_codec.fixed_size().unwrap_or(0) as u32,
                config.key_codec.tag(),
                config.value_codec.tag(),
                config.enable_transaction_log,
            );
            let mut device = FileDevice::create(&config.path)?;
            device.write(0, &header.to_bytes()?)?;
            device.flush()?;
            (device, header)
        };

        // Stored geometry wins over the caller's configuration
        let order = Order::new(header.order)?;
        let page_size = header.node_size as usize;
        let max_entry = check_geometry(page_size, header.order)?;

        Ok(Self {
            device,
            header,
            pool: BufferPool::new(config.cache_capacity),
            order,
            page_size,
            write_mode: config.write_mode,
            max_entry,
            key_codec: config.key_codec,
            value_codec: config.value_codec,
            compare,
            poisoned: false,
        })
    }

    /// Largest admissible encoded entry for this store's geometry.
    pub fn max_entry(&self) -> usize {
        self.max_entry
    }

    /// Insert or overwrite one entry.
    pub fn insert(&mut self, key: K, value: V) -> TreeResult<()> {
        self.check_open()?;
        let result = self
            .insert_inner(key, value)
            .and_then(|_| self.commit());
        self.poison_on_fatal(&result);
        result
    }

    /// Look up a key.
    ///
    /// A missing key is a normal `Ok(None)` result, not an error.
    pub fn search(&mut self, key: &K) -> TreeResult<Option<V>> {
        self.check_open()?;
        let result = self.search_inner(key);
        self.poison_on_fatal(&result);
        result
    }

    /// Remove a key. Returns whether it existed.
    pub fn delete(&mut self, key: &K) -> TreeResult<bool> {
        self.check_open()?;
        let result = self.delete_outer(key);
        self.poison_on_fatal(&result);
        result
    }

    /// Ordered scan of `[start, end]` under `options`.
    pub fn range(
        &mut self,
        start: &K,
        end: &K,
        options: &RangeOptions,
    ) -> TreeResult<Vec<(K, V)>> {
        self.check_open()?;
        let result = self.range_inner(start, end, options);
        self.poison_on_fatal(&result);
        result
    }

    /// All entries in key order.
    pub fn entries(&mut self) -> TreeResult<Vec<(K, V)>> {
        self.check_open()?;
        let result = self.walk_leaves();
        self.poison_on_fatal(&result);
        result
    }

    /// Reset the store to empty, preserving configuration.
    pub fn clear(&mut self) -> TreeResult<()> {
        self.check_open()?;
        let result = self.clear_inner();
        self.poison_on_fatal(&result);
        result
    }

    /// Statistics snapshot.
    pub fn stats(&mut self) -> TreeResult<TreeStats> {
        self.check_open()?;
        let result = self.stats_inner();
        self.poison_on_fatal(&result);
        result
    }

    /// Structural audit; see the module docs.
    ///
    /// Corruption makes `verify` return `Ok(false)`; only genuine I/O
    /// failures surface as errors.
    pub fn verify(&mut self) -> TreeResult<bool> {
        self.check_open()?;
        let result = self.verify_inner();
        self.poison_on_fatal(&result);
        result
    }

    /// Replace the store contents with `entries`.
    ///
    /// Unsorted input is stably sorted by key first; duplicate keys keep the
    /// later value. The progress callback fires after every
    /// `batch_size` entries and once at the end.
    pub fn bulk_load(
        &mut self,
        entries: Vec<(K, V)>,
        options: BulkLoadOptions,
    ) -> TreeResult<()> {
        self.check_open()?;
        let result = self.bulk_load_inner(entries, options);
        self.poison_on_fatal(&result);
        result
    }

    /// Write out all dirty state and flush the device.
    pub fn flush(&mut self) -> TreeResult<()> {
        self.check_open()?;
        let result = self.flush_inner();
        self.poison_on_fatal(&result);
        result
    }

    /// Flush and release the store.
    pub fn close(mut self) -> TreeResult<()> {
        if self.poisoned {
            // Nothing trustworthy left to write
            return Ok(());
        }
        let result = self.flush_inner();
        self.pool.clear();
        result
    }

    // ---- internals -------------------------------------------------------

    fn check_open(&self) -> TreeResult<()> {
        if self.poisoned {
            return Err(TreeError::Closed);
        }
        Ok(())
    }

    fn poison_on_fatal<T>(&mut self, result: &TreeResult<T>) {
        if let Err(TreeError::Io { .. } | TreeError::Corruption { .. }) = result {
            self.poisoned = true;
        }
    }

    fn cmp(&self, a: &K, b: &K) -> Ordering {
        (self.compare)(a, b)
    }

    /// Persist the header and flush, in write-through mode only.
    fn commit(&mut self) -> TreeResult<()> {
        if self.write_mode == WriteMode::WriteThrough {
            self.write_header()?;
            self.device.flush()?;
        }
        Ok(())
    }

    fn write_header(&mut self) -> TreeResult<()> {
        let bytes = self.header.to_bytes()?;
        self.device.write(0, &bytes)
    }

    /// Load a node through the buffer pool.
    fn load_node(&mut self, offset: u64) -> TreeResult<Node<K, V>> {
        if let Some(node) = self.pool.get(offset) {
            return Ok(node);
        }
        let node = self.read_node_from_device(offset)?;
        let evicted = self.pool.put(offset, node.clone(), false);
        self.write_evicted(evicted)?;
        Ok(node)
    }

    /// Read and decode a node directly from the device (no cache).
    fn read_node_from_device(&mut self, offset: u64) -> TreeResult<Node<K, V>> {
        if offset < HEADER_SIZE as u64
            || offset + self.page_size as u64 > self.header.total_file_size
        {
            return Err(TreeError::Corruption {
                detail: format!("dangling node offset {}", offset),
            });
        }
        let page = self.device.read(offset, self.page_size)?;
        decode_node(&page, offset, self.key_codec.as_ref(), self.value_codec.as_ref())
    }

    /// Submit a mutated node according to the write policy.
    fn store_node(&mut self, offset: u64, node: Node<K, V>) -> TreeResult<()> {
        let evicted = match self.write_mode {
            WriteMode::WriteThrough => {
                self.write_node(offset, &node)?;
                self.pool.put(offset, node, false)
            }
            WriteMode::WriteBack => self.pool.put(offset, node, true),
        };
        self.write_evicted(evicted)
    }

    fn write_node(&mut self, offset: u64, node: &Node<K, V>) -> TreeResult<()> {
        let page = encode_node(
            node,
            self.key_codec.as_ref(),
            self.value_codec.as_ref(),
            self.page_size,
        )?;
        self.device.write(offset, &page)
    }

    fn write_evicted(&mut self, evicted: Vec<(u64, Node<K, V>)>) -> TreeResult<()> {
        for (offset, node) in evicted {
            self.write_node(offset, &node)?;
        }
        Ok(())
    }

    fn free_node(&mut self, offset: u64) -> TreeResult<()> {
        self.pool.remove(offset);
        free_page(&mut self.header, &mut self.device, offset)
    }

    fn check_entry_size(&self, key: &K, value: &V) -> TreeResult<()> {
        let needed = self.key_codec.encoded_size(key) + self.value_codec.encoded_size(value);
        if needed > self.max_entry {
            return Err(TreeError::Capacity {
                needed,
                limit: self.max_entry,
            });
        }
        Ok(())
    }

    // ---- search ----------------------------------------------------------

    fn search_inner(&mut self, key: &K) -> TreeResult<Option<V>> {
        if self.header.root_offset == 0 {
            return Ok(None);
        }
        let leaf_offset = self.find_leaf(key)?;
        let node = self.load_node(leaf_offset)?;
        let leaf = node.expect_leaf()?;
        Ok(leaf
            .search(key, &self.compare)
            .ok()
            .map(|idx| leaf.values[idx].clone()))
    }

    /// Offset of the leaf whose key range covers `key`.
    fn find_leaf(&mut self, key: &K) -> TreeResult<u64> {
        let mut current = self.header.root_offset;
        loop {
            let node = self.load_node(current)?;
            match node {
                Node::Leaf(_) => return Ok(current),
                Node::Internal(internal) => {
                    let idx = internal.child_index(key, &self.compare);
                    current = internal.children[idx];
                }
            }
        }
    }

    // ---- insert ----------------------------------------------------------

    fn insert_inner(&mut self, key: K, value: V) -> TreeResult<()> {
        self.check_entry_size(&key, &value)?;

        if self.header.root_offset == 0 {
            let offset = allocate_page(&mut self.header, &mut self.device)?;
            let mut leaf: LeafNode<K, V> = LeafNode::new(offset);
            leaf.upsert(key, value, &self.compare);
            self.store_node(offset, Node::Leaf(leaf))?;
            self.header.root_offset = offset;
            self.header.height = 1;
            self.header.touch();
            return Ok(());
        }

        // Preemptive split: a full root grows the tree by one level
        let root = self.load_node(self.header.root_offset)?;
        if root.is_full(self.order) {
            let old_root_offset = self.header.root_offset;
            let new_root_offset = allocate_page(&mut self.header, &mut self.device)?;
            let mut new_root: InternalNode<K> = InternalNode::new(new_root_offset);
            new_root.children.push(old_root_offset);

            let mut old_root = root;
            old_root.set_parent(new_root_offset);
            self.store_node(old_root_offset, old_root)?;
            self.store_node(new_root_offset, Node::Internal(new_root))?;

            self.header.root_offset = new_root_offset;
            self.header.height += 1;
            self.split_child(new_root_offset, 0)?;
        }

        let mut current = self.header.root_offset;
        loop {
            let node = self.load_node(current)?;
            match node {
                Node::Leaf(mut leaf) => {
                    leaf.upsert(key, value, &self.compare);
                    leaf.modified_at = chrono::Utc::now().timestamp_micros();
                    self.store_node(current, Node::Leaf(leaf))?;
                    self.header.touch();
                    return Ok(());
                }
                Node::Internal(internal) => {
                    let idx = internal.child_index(&key, &self.compare);
                    let child_offset = internal.children[idx];
                    let child = self.load_node(child_offset)?;
                    if child.is_full(self.order) {
                        self.split_child(current, idx)?;
                        // The promoted median shifts the routing: re-read
                        let refreshed = self.load_node(current)?;
                        let refreshed = refreshed.expect_internal()?;
                        let idx = refreshed.child_index(&key, &self.compare);
                        current = refreshed.children[idx];
                    } else {
                        current = child_offset;
                    }
                }
            }
        }
    }

    /// Split the full child at `idx` of the internal node at `parent_offset`.
    fn split_child(&mut self, parent_offset: u64, idx: usize) -> TreeResult<()> {
        let parent_node = self.load_node(parent_offset)?;
        let mut parent = parent_node.expect_internal()?.clone();
        let child_offset = parent.children[idx];
        let child = self.load_node(child_offset)?;

        let right_offset = allocate_page(&mut self.header, &mut self.device)?;

        match child {
            Node::Leaf(mut leaf) => {
                let (separator, mut right) = leaf.split(self.order, right_offset)?;

                // Re-link the sibling chain: leaf <-> right <-> old right
                right.left = child_offset;
                right.right = leaf.right;
                right.parent = parent_offset;
                if leaf.right != 0 {
                    let next_node = self.load_node(leaf.right)?;
                    if let Node::Leaf(mut next) = next_node {
                        next.left = right_offset;
                        self.store_node(leaf.right, Node::Leaf(next))?;
                    }
                }
                leaf.right = right_offset;
                leaf.parent = parent_offset;

                parent.insert_separator(idx, separator, right_offset);

                self.store_node(child_offset, Node::Leaf(leaf))?;
                self.store_node(right_offset, Node::Leaf(right))?;
                self.store_node(parent_offset, Node::Internal(parent))?;
            }
            Node::Internal(mut inner) => {
                let (median, mut right) = inner.split(self.order, right_offset)?;
                right.parent = parent_offset;
                inner.parent = parent_offset;

                parent.insert_separator(idx, median, right_offset);

                // Children that moved to the new sibling get a new parent
                let moved = right.children.clone();
                self.store_node(child_offset, Node::Internal(inner))?;
                self.store_node(right_offset, Node::Internal(right))?;
                self.store_node(parent_offset, Node::Internal(parent))?;
                for child in moved {
                    let mut node = self.load_node(child)?;
                    node.set_parent(right_offset);
                    self.store_node(child, node)?;
                }
            }
        }

        Ok(())
    }

    // ---- delete ----------------------------------------------------------

    fn delete_outer(&mut self, key: &K) -> TreeResult<bool> {
        if self.header.root_offset == 0 {
            return Ok(false);
        }

        let removed = self.delete_from(self.header.root_offset, key)?;

        // An internal root emptied by a merge collapses onto its only child
        let root = self.load_node(self.header.root_offset)?;
        if let Node::Internal(internal) = &root {
            if internal.keys.is_empty() {
                let new_root = internal.children[0];
                let old_root = self.header.root_offset;
                self.free_node(old_root)?;
                self.header.root_offset = new_root;
                self.header.height = self.header.height.saturating_sub(1);

                let mut node = self.load_node(new_root)?;
                node.set_parent(0);
                self.store_node(new_root, node)?;
            }
        }

        if removed {
            self.header.touch();
        }
        // Fix-ups may have run even when the key was absent; persist either way
        self.commit()?;
        Ok(removed)
    }

    fn delete_from(&mut self, offset: u64, key: &K) -> TreeResult<bool> {
        let node = self.load_node(offset)?;
        match node {
            Node::Leaf(mut leaf) => match leaf.search(key, &self.compare) {
                Ok(idx) => {
                    leaf.keys.remove(idx);
                    leaf.values.remove(idx);
                    leaf.modified_at = chrono::Utc::now().timestamp_micros();
                    self.store_node(offset, Node::Leaf(leaf))?;
                    Ok(true)
                }
                Err(_) => Ok(false),
            },
            Node::Internal(internal) => {
                let idx = internal.child_index(key, &self.compare);
                let child_offset = internal.children[idx];
                let child = self.load_node(child_offset)?;

                let next_offset = if child.key_count() <= self.order.min_keys() {
                    // Fix before descent so the child can afford a removal
                    self.fix_child(offset, idx)?;
                    let refreshed = self.load_node(offset)?;
                    let refreshed = refreshed.expect_internal()?;
                    let idx = refreshed.child_index(key, &self.compare);
                    refreshed.children[idx]
                } else {
                    child_offset
                };

                let removed = self.delete_from(next_offset, key)?;

                if removed {
                    self.refresh_separator(offset, key)?;
                }
                Ok(removed)
            }
        }
    }

    /// If `key` is still a separator in the node at `offset`, replace it
    /// with the new maximum of its left subtree (its predecessor).
    fn refresh_separator(&mut self, offset: u64, key: &K) -> TreeResult<()> {
        let node = self.load_node(offset)?;
        if let Node::Internal(mut internal) = node {
            if let Ok(idx) = internal.search(key, &self.compare) {
                let max = self.subtree_max(internal.children[idx])?;
                internal.keys[idx] = max;
                internal.modified_at = chrono::Utc::now().timestamp_micros();
                self.store_node(offset, Node::Internal(internal))?;
            }
        }
        Ok(())
    }

    /// Largest key in the subtree rooted at `offset`.
    fn subtree_max(&mut self, offset: u64) -> TreeResult<K> {
        let mut current = offset;
        loop {
            let node = self.load_node(current)?;
            match node {
                Node::Leaf(leaf) => {
                    return leaf.keys.last().cloned().ok_or_else(|| TreeError::Corruption {
                        detail: format!("empty leaf {} inside a populated subtree", current),
                    })
                }
                Node::Internal(internal) => {
                    current = *internal.children.last().ok_or_else(|| {
                        TreeError::Corruption {
                            detail: format!("internal node {} with no children", current),
                        }
                    })?;
                }
            }
        }
    }

    /// Bring the child at `idx` of `parent_offset` up to at least `t` keys.
    fn fix_child(&mut self, parent_offset: u64, idx: usize) -> TreeResult<()> {
        let parent_node = self.load_node(parent_offset)?;
        let parent = parent_node.expect_internal()?;
        let t = self.order.min_degree();

        if idx > 0 {
            let left_offset = parent.children[idx - 1];
            let left = self.load_node(left_offset)?;
            if left.key_count() >= t {
                return self.borrow_from_left(parent_offset, idx);
            }
        }

        let parent_node = self.load_node(parent_offset)?;
        let parent = parent_node.expect_internal()?;
        if idx + 1 < parent.children.len() {
            let right_offset = parent.children[idx + 1];
            let right = self.load_node(right_offset)?;
            if right.key_count() >= t {
                return self.borrow_from_right(parent_offset, idx);
            }
        }

        // Both siblings at minimum: merge around a separator
        if idx > 0 {
            self.merge_children(parent_offset, idx - 1)
        } else {
            self.merge_children(parent_offset, idx)
        }
    }

    /// Rotate one key from the left sibling through the parent into the
    /// child at `idx`.
    fn borrow_from_left(&mut self, parent_offset: u64, idx: usize) -> TreeResult<()> {
        let parent_node = self.load_node(parent_offset)?;
        let mut parent = parent_node.expect_internal()?.clone();
        let left_offset = parent.children[idx - 1];
        let child_offset = parent.children[idx];

        let left = self.load_node(left_offset)?;
        let child = self.load_node(child_offset)?;
        let now = chrono::Utc::now().timestamp_micros();

        match (left, child) {
            (Node::Leaf(mut left), Node::Leaf(mut child)) => {
                let key = left.keys.pop().ok_or_else(|| underflow(left_offset))?;
                let value = left.values.pop().ok_or_else(|| underflow(left_offset))?;
                child.keys.insert(0, key);
                child.values.insert(0, value);

                // New boundary: the left leaf's remaining maximum
                parent.keys[idx - 1] = left
                    .keys
                    .last()
                    .cloned()
                    .ok_or_else(|| underflow(left_offset))?;

                left.modified_at = now;
                child.modified_at = now;
                self.store_node(left_offset, Node::Leaf(left))?;
                self.store_node(child_offset, Node::Leaf(child))?;
            }
            (Node::Internal(mut left), Node::Internal(mut child)) => {
                let separator = parent.keys[idx - 1].clone();
                let moved_child = left
                    .children
                    .pop()
                    .ok_or_else(|| underflow(left_offset))?;
                let new_separator = left.keys.pop().ok_or_else(|| underflow(left_offset))?;

                child.keys.insert(0, separator);
                child.children.insert(0, moved_child);
                parent.keys[idx - 1] = new_separator;

                left.modified_at = now;
                child.modified_at = now;
                self.store_node(left_offset, Node::Internal(left))?;
                self.store_node(child_offset, Node::Internal(child))?;

                let mut node = self.load_node(moved_child)?;
                node.set_parent(child_offset);
                self.store_node(moved_child, node)?;
            }
            _ => {
                return Err(TreeError::Corruption {
                    detail: format!(
                        "siblings at offsets {} and {} have different node types",
                        left_offset, child_offset
                    ),
                })
            }
        }

        parent.modified_at = now;
        self.store_node(parent_offset, Node::Internal(parent))
    }

    /// Rotate one key from the right sibling through the parent into the
    /// child at `idx`.
    fn borrow_from_right(&mut self, parent_offset: u64, idx: usize) -> TreeResult<()> {
        let parent_node = self.load_node(parent_offset)?;
        let mut parent = parent_node.expect_internal()?.clone();
        let child_offset = parent.children[idx];
        let right_offset = parent.children[idx + 1];

        let child = self.load_node(child_offset)?;
        let right = self.load_node(right_offset)?;
        let now = chrono::Utc::now().timestamp_micros();

        match (child, right) {
            (Node::Leaf(mut child), Node::Leaf(mut right)) => {
                let key = right.keys.remove(0);
                let value = right.values.remove(0);
                // The moved key becomes the child's maximum and the boundary
                parent.keys[idx] = key.clone();
                child.keys.push(key);
                child.values.push(value);

                child.modified_at = now;
                right.modified_at = now;
                self.store_node(child_offset, Node::Leaf(child))?;
                self.store_node(right_offset, Node::Leaf(right))?;
            }
            (Node::Internal(mut child), Node::Internal(mut right)) => {
                let separator = parent.keys[idx].clone();
                let moved_child = right.children.remove(0);
                let new_separator = right.keys.remove(0);

                child.keys.push(separator);
                child.children.push(moved_child);
                parent.keys[idx] = new_separator;

                child.modified_at = now;
                right.modified_at = now;
                self.store_node(child_offset, Node::Internal(child))?;
                self.store_node(right_offset, Node::Internal(right))?;

                let mut node = self.load_node(moved_child)?;
                node.set_parent(child_offset);
                self.store_node(moved_child, node)?;
            }
            _ => {
                return Err(TreeError::Corruption {
                    detail: format!(
                        "siblings at offsets {} and {} have different node types",
                        child_offset, right_offset
                    ),
                })
            }
        }

        parent.modified_at = now;
        self.store_node(parent_offset, Node::Internal(parent))
    }

    /// Merge the children at `idx` and `idx + 1`, pulling the separator at
    /// `idx` out of the parent. The right node is freed.
    fn merge_children(&mut self, parent_offset: u64, idx: usize) -> TreeResult<()> {
        let parent_node = self.load_node(parent_offset)?;
        let mut parent = parent_node.expect_internal()?.clone();
        let left_offset = parent.children[idx];
        let right_offset = parent.children[idx + 1];

        let left = self.load_node(left_offset)?;
        let right = self.load_node(right_offset)?;
        let now = chrono::Utc::now().timestamp_micros();

        match (left, right) {
            (Node::Leaf(mut left), Node::Leaf(right)) => {
                left.keys.extend(right.keys);
                left.values.extend(right.values);

                // Unlink the absorbed leaf from the sibling chain
                left.right = right.right;
                if right.right != 0 {
                    let next_node = self.load_node(right.right)?;
                    if let Node::Leaf(mut next) = next_node {
                        next.left = left_offset;
                        self.store_node(right.right, Node::Leaf(next))?;
                    }
                }

                left.modified_at = now;
                self.store_node(left_offset, Node::Leaf(left))?;
            }
            (Node::Internal(mut left), Node::Internal(right)) => {
                left.keys.push(parent.keys[idx].clone());
                left.keys.extend(right.keys);
                let moved = right.children.clone();
                left.children.extend(right.children);

                left.modified_at = now;
                self.store_node(left_offset, Node::Internal(left))?;
                for child in moved {
                    let mut node = self.load_node(child)?;
                    node.set_parent(left_offset);
                    self.store_node(child, node)?;
                }
            }
            _ => {
                return Err(TreeError::Corruption {
                    detail: format!(
                        "siblings at offsets {} and {} have different node types",
                        left_offset, right_offset
                    ),
                })
            }
        }

        parent.keys.remove(idx);
        parent.children.remove(idx + 1);
        parent.modified_at = now;
        self.store_node(parent_offset, Node::Internal(parent))?;
        self.free_node(right_offset)?;
        Ok(())
    }

    // ---- range / entries -------------------------------------------------

    fn range_inner(
        &mut self,
        start: &K,
        end: &K,
        options: &RangeOptions,
    ) -> TreeResult<Vec<(K, V)>> {
        let mut results = Vec::new();
        if self.header.root_offset == 0 {
            return Ok(results);
        }

        let mut current = self.find_leaf(start)?;
        'chain: loop {
            let node = self.load_node(current)?;
            let leaf = node.expect_leaf()?;

            for (key, value) in leaf.keys.iter().zip(leaf.values.iter()) {
                match self.cmp(key, start) {
                    Ordering::Less => continue,
                    Ordering::Equal if !options.include_start => continue,
                    _ => {}
                }
                match self.cmp(key, end) {
                    Ordering::Greater => break 'chain,
                    Ordering::Equal if !options.include_end => break 'chain,
                    _ => {}
                }
                results.push((key.clone(), value.clone()));
                if !options.reverse {
                    if let Some(limit) = options.limit {
                        if results.len() >= limit {
                            break 'chain;
                        }
                    }
                }
            }

            if leaf.right == 0 {
                break;
            }
            current = leaf.right;
        }

        if options.reverse {
            results.reverse();
            if let Some(limit) = options.limit {
                results.truncate(limit);
            }
        }
        Ok(results)
    }

    /// Walk the whole leaf chain, collecting every entry in key order.
    fn walk_leaves(&mut self) -> TreeResult<Vec<(K, V)>> {
        let mut results = Vec::new();
        if self.header.root_offset == 0 {
            return Ok(results);
        }

        let mut current = self.leftmost_leaf()?;
        loop {
            let node = self.load_node(current)?;
            let leaf = node.expect_leaf()?;
            for (key, value) in leaf.keys.iter().zip(leaf.values.iter()) {
                results.push((key.clone(), value.clone()));
            }
            if leaf.right == 0 {
                return Ok(results);
            }
            current = leaf.right;
        }
    }

    fn leftmost_leaf(&mut self) -> TreeResult<u64> {
        let mut current = self.header.root_offset;
        loop {
            let node = self.load_node(current)?;
            match node {
                Node::Leaf(_) => return Ok(current),
                Node::Internal(internal) => {
                    current = *internal.children.first().ok_or_else(|| {
                        TreeError::Corruption {
                            detail: format!("internal node {} with no children", current),
                        }
                    })?;
                }
            }
        }
    }

    // ---- clear / stats / bulk load / flush -------------------------------

    fn clear_inner(&mut self) -> TreeResult<()> {
        self.pool.clear();
        self.header.root_offset = 0;
        self.header.node_count = 0;
        self.header.height = 0;
        self.header.free_list_head = 0;
        self.header.total_file_size = HEADER_SIZE as u64;
        self.header.touch();

        self.device.truncate(HEADER_SIZE as u64)?;
        self.write_header()?;
        self.device.flush()
    }

    fn stats_inner(&mut self) -> TreeResult<TreeStats> {
        let mut key_count = 0u64;
        if self.header.root_offset != 0 {
            let mut current = self.leftmost_leaf()?;
            loop {
                let node = self.load_node(current)?;
                let leaf = node.expect_leaf()?;
                key_count += leaf.keys.len() as u64;
                if leaf.right == 0 {
                    break;
                }
                current = leaf.right;
            }
        }

        let pool_stats = self.pool.stats();
        Ok(TreeStats {
            node_count: self.header.node_count,
            height: self.header.height,
            key_count,
            file_size: self.header.total_file_size,
            cache_hit_rate: pool_stats.hit_rate,
            cached_nodes: pool_stats.cached_nodes,
        })
    }

    fn bulk_load_inner(
        &mut self,
        mut entries: Vec<(K, V)>,
        options: BulkLoadOptions,
    ) -> TreeResult<()> {
        self.clear_inner()?;

        if !options.sorted {
            let compare = Arc::clone(&self.compare);
            entries.sort_by(|a, b| compare(&a.0, &b.0));
        }

        let total = entries.len();
        let batch = options.batch_size.max(1);
        let mut loaded = 0usize;

        for (key, value) in entries {
            self.insert_inner(key, value)?;
            loaded += 1;
            if loaded % batch == 0 {
                if let Some(progress) = options.progress.as_ref() {
                    progress(loaded, total);
                }
            }
        }

        if loaded % batch != 0 {
            if let Some(progress) = options.progress.as_ref() {
                progress(loaded, total);
            }
        }

        self.commit()
    }

    fn flush_inner(&mut self) -> TreeResult<()> {
        let dirty = self.pool.take_dirty();
        for (offset, node) in dirty {
            self.write_node(offset, &node)?;
        }
        self.write_header()?;
        self.device.flush()
    }

    // ---- verify ----------------------------------------------------------

    fn verify_inner(&mut self) -> TreeResult<bool> {
        // Push dirty state out so the on-disc image is current, then audit
        // the file itself rather than the cache.
        self.flush_inner()?;

        if self.header.root_offset == 0 {
            return Ok(self.header.node_count == 0 && self.header.height == 0);
        }

        let mut audit = Audit {
            node_count: 0,
            leaf_depth: None,
        };
        let ok = match self.verify_node(self.header.root_offset, 1, None, None, &mut audit) {
            Ok(ok) => ok,
            Err(TreeError::Corruption { .. }) => false,
            Err(other) => return Err(other),
        };

        Ok(ok
            && audit.node_count == self.header.node_count
            && audit.leaf_depth == Some(self.header.height))
    }

    fn verify_node(
        &mut self,
        offset: u64,
        depth: u32,
        lower: Option<&K>,
        upper: Option<&K>,
        audit: &mut Audit,
    ) -> TreeResult<bool> {
        // Bypass the pool so the stored checksum is recomputed
        let node = self.read_node_from_device(offset)?;
        audit.node_count += 1;

        let is_root = offset == self.header.root_offset;
        let keys: &[K] = match &node {
            Node::Leaf(leaf) => &leaf.keys,
            Node::Internal(internal) => &internal.keys,
        };

        // I1: strictly increasing keys
        for pair in keys.windows(2) {
            if self.cmp(&pair[0], &pair[1]) != Ordering::Less {
                return Ok(false);
            }
        }

        // I2: keys confined to (lower, upper]
        if let Some(lower) = lower {
            if let Some(first) = keys.first() {
                if self.cmp(first, lower) != Ordering::Greater {
                    return Ok(false);
                }
            }
        }
        if let Some(upper) = upper {
            if let Some(last) = keys.last() {
                if self.cmp(last, upper) == Ordering::Greater {
                    return Ok(false);
                }
            }
        }

        // I3: occupancy
        if keys.len() > self.order.max_keys() {
            return Ok(false);
        }
        if !is_root && keys.len() < self.order.min_keys() {
            return Ok(false);
        }

        match &node {
            Node::Leaf(_) => {
                // I4: all leaves at one depth
                match audit.leaf_depth {
                    None => audit.leaf_depth = Some(depth),
                    Some(expected) if expected != depth => return Ok(false),
                    _ => {}
                }
                Ok(true)
            }
            Node::Internal(internal) => {
                if internal.children.len() != internal.keys.len() + 1 {
                    return Ok(false);
                }
                if is_root && internal.keys.is_empty() {
                    return Ok(false);
                }
                let keys = internal.keys.clone();
                let children = internal.children.clone();
                for (idx, child) in children.iter().enumerate() {
                    let child_lower = if idx > 0 { Some(&keys[idx - 1]) } else { lower };
                    let child_upper = if idx < keys.len() {
                        Some(&keys[idx])
                    } else {
                        upper
                    };
                    if !self.verify_node(*child, depth + 1, child_lower, child_upper, audit)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

struct Audit {
    node_count: u64,
    leaf_depth: Option<u32>,
}

/// Validate an order/page-size pair and return the per-entry byte limit.
fn check_geometry(page_size: usize, order: u32) -> TreeResult<usize> {
    let max_entry = max_entry_size(page_size, order);
    if max_entry < 16 {
        return Err(TreeError::InvalidArgument {
            reason: format!(
                "order {} leaves only {} bytes per entry on {}-byte pages; \
                 raise page_size or lower order",
                order, max_entry, page_size
            ),
        });
    }
    Ok(max_entry)
}

fn check_codec_tag(which: &str, stored: &str, supplied: &str) -> TreeResult<()> {
    if !stored.is_empty() && stored != supplied {
        return Err(TreeError::InvalidArgument {
            reason: format!(
                "{} codec '{}' does not match stored codec '{}'",
                which, supplied, stored
            ),
        });
    }
    Ok(())
}

fn underflow(offset: u64) -> TreeError {
    TreeError::Corruption {
        detail: format!("node at offset {} is unexpectedly empty", offset),
    }
}
