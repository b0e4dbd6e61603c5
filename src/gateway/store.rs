// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Client handle and worker loop.
//!
//! [`Store::open`] spawns the worker thread, waits for the engine to
//! initialise, and returns a handle. Every public method builds a request
//! envelope, submits it, and waits for the reply (optionally bounded by the
//! configured timeout). Dropping the handle closes the store.

use super::types::{Envelope, Reply, Request, Response};
use crate::device::FileDevice;
use crate::error::{TreeError, TreeResult};
use crate::store::{BTree, BulkLoadOptions, RangeOptions, StoreConfig, TreeStats};
use std::path::Path;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use uuid::Uuid;

/// Handle to a store owned by a dedicated worker thread.
///
/// The handle itself never touches the file; all I/O happens on the worker.
/// Methods take `&self` and may be called from the owning thread freely;
/// requests are answered strictly in submission order.
pub struct Store<K, V> {
    sender: mpsc::Sender<Envelope<K, V>>,
    worker: Option<JoinHandle<()>>,
    timeout: Option<Duration>,
    closed: bool,
}

impl<K, V> Store<K, V>
where
    K: Clone + Ord + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create or open a store and spawn its worker.
    ///
    /// ## Input
    /// - `config`: store configuration; `open_existing` selects create/open
    ///
    /// ## Output
    /// - `Ok(Store)`: engine initialised and ready
    /// - `Err(_)`: initialisation failed; the worker has already exited
    ///
    /// ## Example
    /// ```no_run
    /// use treebase::codec::{I32Codec, StringCodec};
    /// use treebase::{Store, StoreConfig};
    ///
    /// let config = StoreConfig::new(
    ///     "data.tbs",
    ///     Box::new(I32Codec),
    ///     Box::new(StringCodec),
    /// );
    /// let store: Store<i32, String> = Store::open(config)?;
    /// store.insert(1, "one".to_string())?;
    /// # Ok::<(), treebase::TreeError>(())
    /// ```
    pub fn open(config: StoreConfig<K, V>) -> TreeResult<Self> {
        let timeout = config.timeout;
        let (sender, receiver) = mpsc::channel::<Envelope<K, V>>();
        let (ready_sender, ready_receiver) = mpsc::channel::<TreeResult<()>>();

        let worker = std::thread::Builder::new()
            .name("treebase-worker".to_string())
            .spawn(move || worker_loop(config, receiver, ready_sender))
            .map_err(|e| TreeError::Io {
                operation: "spawn_worker".to_string(),
                reason: e.to_string(),
            })?;

        match ready_receiver.recv() {
            Ok(Ok(())) => Ok(Self {
                sender,
                worker: Some(worker),
                timeout,
                closed: false,
            }),
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                let _ = worker.join();
                Err(TreeError::Io {
                    operation: "initialize".to_string(),
                    reason: "worker exited before reporting readiness".to_string(),
                })
            }
        }
    }

    /// Whether a store file exists at `path`.
    pub fn exists<P: AsRef<Path>>(path: P) -> bool {
        FileDevice::exists(path)
    }

    /// Remove the store file at `path`. The store must not be open.
    pub fn destroy<P: AsRef<Path>>(path: P) -> TreeResult<()> {
        FileDevice::remove(path)
    }

    /// Insert or overwrite one entry.
    pub fn insert(&self, key: K, value: V) -> TreeResult<()> {
        match self.request(Request::Insert { key, value })? {
            Response::Unit => Ok(()),
            _ => Err(protocol_error("insert")),
        }
    }

    /// Look up a key; `None` means absent.
    pub fn search(&self, key: K) -> TreeResult<Option<V>> {
        match self.request(Request::Search { key })? {
            Response::Value(value) => Ok(value),
            _ => Err(protocol_error("search")),
        }
    }

    /// Remove a key. Returns whether it existed.
    pub fn delete(&self, key: K) -> TreeResult<bool> {
        match self.request(Request::Delete { key })? {
            Response::Removed(removed) => Ok(removed),
            _ => Err(protocol_error("delete")),
        }
    }

    /// Ordered scan of `[start, end]` under `options`.
    pub fn range(&self, start: K, end: K, options: RangeOptions) -> TreeResult<Vec<(K, V)>> {
        match self.request(Request::Range {
            start,
            end,
            options,
        })? {
            Response::Entries(entries) => Ok(entries),
            _ => Err(protocol_error("range")),
        }
    }

    /// All entries in key order.
    pub fn entries(&self) -> TreeResult<Vec<(K, V)>> {
        match self.request(Request::Entries)? {
            Response::Entries(entries) => Ok(entries),
            _ => Err(protocol_error("entries")),
        }
    }

    /// Reset the store to empty, preserving configuration.
    pub fn clear(&self) -> TreeResult<()> {
        match self.request(Request::Clear)? {
            Response::Unit => Ok(()),
            _ => Err(protocol_error("clear")),
        }
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> TreeResult<TreeStats> {
        match self.request(Request::Stats)? {
            Response::Stats(stats) => Ok(stats),
            _ => Err(protocol_error("stats")),
        }
    }

    /// Replace the store contents with `entries`.
    pub fn bulk_load(&self, entries: Vec<(K, V)>, options: BulkLoadOptions) -> TreeResult<()> {
        match self.request(Request::BulkLoad { entries, options })? {
            Response::Unit => Ok(()),
            _ => Err(protocol_error("bulk_load")),
        }
    }

    /// Structural audit; `false` means the tree is damaged.
    pub fn verify(&self) -> TreeResult<bool> {
        match self.request(Request::Verify)? {
            Response::Verified(ok) => Ok(ok),
            _ => Err(protocol_error("verify")),
        }
    }

    /// Write out all dirty state and flush the device.
    pub fn flush(&self) -> TreeResult<()> {
        match self.request(Request::Flush)? {
            Response::Unit => Ok(()),
            _ => Err(protocol_error("flush")),
        }
    }

    /// Flush, release the store, and stop the worker.
    pub fn close(mut self) -> TreeResult<()> {
        let result = match self.request(Request::Close) {
            Ok(Response::Unit) => Ok(()),
            Ok(_) => Err(protocol_error("close")),
            Err(err) => Err(err),
        };
        self.closed = true;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        result
    }

    fn request(&self, request: Request<K, V>) -> TreeResult<Response<K, V>> {
        if self.closed {
            return Err(TreeError::Closed);
        }
        let operation = request.name();
        let id = Uuid::new_v4();
        let (reply_sender, reply_receiver) = mpsc::channel::<Reply<K, V>>();
        let envelope = Envelope {
            id,
            request,
            reply: reply_sender,
        };

        self.sender.send(envelope).map_err(|_| TreeError::Closed)?;

        let reply = match self.timeout {
            Some(timeout) => reply_receiver.recv_timeout(timeout).map_err(|e| match e {
                mpsc::RecvTimeoutError::Timeout => TreeError::Timeout {
                    operation: operation.to_string(),
                    request_id: id.to_string(),
                },
                mpsc::RecvTimeoutError::Disconnected => TreeError::Closed,
            })?,
            None => reply_receiver.recv().map_err(|_| TreeError::Closed)?,
        };

        if reply.id != id {
            return Err(TreeError::Io {
                operation: operation.to_string(),
                reason: format!("reply for request {} answered request {}", reply.id, id),
            });
        }
        reply.result
    }
}

impl<K, V> Drop for Store<K, V> {
    fn drop(&mut self) {
        if !self.closed {
            // Best-effort close so write-back state reaches the device
            let (reply_sender, reply_receiver) = mpsc::channel::<Reply<K, V>>();
            let envelope = Envelope {
                id: Uuid::new_v4(),
                request: Request::Close,
                reply: reply_sender,
            };
            if self.sender.send(envelope).is_ok() {
                let _ = reply_receiver.recv();
            }
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Worker: initialise the engine, then serve requests FIFO until close.
fn worker_loop<K, V>(
    config: StoreConfig<K, V>,
    receiver: mpsc::Receiver<Envelope<K, V>>,
    ready: mpsc::Sender<TreeResult<()>>,
) where
    K: Clone + Ord + Send + 'static,
    V: Clone + Send + 'static,
{
    let mut tree = match BTree::open(config) {
        Ok(tree) => {
            let _ = ready.send(Ok(()));
            Some(tree)
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    while let Ok(envelope) = receiver.recv() {
        let Envelope { id, request, reply } = envelope;

        if matches!(request, Request::Close) {
            let result = match tree.take() {
                Some(tree) => tree.close().map(|_| Response::Unit),
                None => Ok(Response::Unit),
            };
            // The caller may have timed out and dropped the receiver
            let _ = reply.send(Reply { id, result });
            break;
        }

        let result = match tree.as_mut() {
            Some(tree) => dispatch(tree, request),
            None => Err(TreeError::Closed),
        };
        let _ = reply.send(Reply { id, result });
    }
}

fn dispatch<K, V>(tree: &mut BTree<K, V>, request: Request<K, V>) -> TreeResult<Response<K, V>>
where
    K: Clone + Ord + Send + 'static,
    V: Clone + Send + 'static,
{
    match request {
        Request::Insert { key, value } => tree.insert(key, value).map(|_| Response::Unit),
        Request::Search { key } => tree.search(&key).map(Response::Value),
        Request::Delete { key } => tree.delete(&key).map(Response::Removed),
        Request::Range {
            start,
            end,
            options,
        } => tree.range(&start, &end, &options).map(Response::Entries),
        Request::Entries => tree.entries().map(Response::Entries),
        Request::Clear => tree.clear().map(|_| Response::Unit),
        Request::Stats => tree.stats().map(Response::Stats),
        Request::BulkLoad { entries, options } => {
            tree.bulk_load(entries, options).map(|_| Response::Unit)
        }
        Request::Verify => tree.verify().map(Response::Verified),
        Request::Flush => tree.flush().map(|_| Response::Unit),
        // Close is handled by the worker loop itself
        Request::Close => Err(TreeError::Closed),
    }
}

fn protocol_error(operation: &str) -> TreeError {
    TreeError::Io {
        operation: operation.to_string(),
        reason: "mismatched reply from worker".to_string(),
    }
}
