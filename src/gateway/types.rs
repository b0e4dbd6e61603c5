// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Request and reply envelopes exchanged with the worker thread.

use crate::error::TreeResult;
use crate::store::{BulkLoadOptions, RangeOptions, TreeStats};
use std::sync::mpsc;
use uuid::Uuid;

/// One operation submitted to the engine.
pub(crate) enum Request<K, V> {
    Insert { key: K, value: V },
    Search { key: K },
    Delete { key: K },
    Range {
        start: K,
        end: K,
        options: RangeOptions,
    },
    Entries,
    Clear,
    Stats,
    BulkLoad {
        entries: Vec<(K, V)>,
        options: BulkLoadOptions,
    },
    Verify,
    Flush,
    Close,
}

impl<K, V> Request<K, V> {
    /// Operation name, used in timeout errors.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Request::Insert { .. } => "insert",
            Request::Search { .. } => "search",
            Request::Delete { .. } => "delete",
            Request::Range { .. } => "range",
            Request::Entries => "entries",
            Request::Clear => "clear",
            Request::Stats => "stats",
            Request::BulkLoad { .. } => "bulk_load",
            Request::Verify => "verify",
            Request::Flush => "flush",
            Request::Close => "close",
        }
    }
}

/// Successful reply payloads.
pub(crate) enum Response<K, V> {
    Unit,
    Value(Option<V>),
    Removed(bool),
    Entries(Vec<(K, V)>),
    Stats(TreeStats),
    Verified(bool),
}

/// A reply: the request's correlation id plus a result or typed error.
pub(crate) struct Reply<K, V> {
    /// Correlation id echoed from the request envelope.
    pub id: Uuid,

    /// Result payload or typed error.
    pub result: TreeResult<Response<K, V>>,
}

/// Request envelope with correlation id and reply channel.
pub(crate) struct Envelope<K, V> {
    /// Correlation id. The worker echoes it in the reply, the handle
    /// verifies the echo, and timeout errors quote it to the caller.
    pub id: Uuid,

    /// The operation to perform.
    pub request: Request<K, V>,

    /// Where the worker sends the reply.
    pub reply: mpsc::Sender<Reply<K, V>>,
}
