// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Codec for arbitrary structured values as length-prefixed UTF-8 JSON.

use super::{read_frame, write_frame, Codec, FRAME_PREFIX};
use crate::error::{TreeError, TreeResult};
use serde_json::Value;

/// JSON value codec.
///
/// Serialises with `serde_json` in compact form. Encoding is not canonical
/// across implementations (object key order is preserved, not sorted), which
/// is fine for values; JSON is not suitable as a key type.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec<Value> for JsonCodec {
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> TreeResult<()> {
        let text = serde_json::to_string(value).map_err(|e| TreeError::Codec {
            reason: format!("JSON encode failed: {}", e),
        })?;
        write_frame(out, text.as_bytes());
        Ok(())
    }

    fn decode(&self, input: &mut &[u8]) -> TreeResult<Value> {
        let bytes = read_frame(input, "JSON value")?;
        serde_json::from_slice(bytes).map_err(|e| TreeError::Codec {
            reason: format!("JSON decode failed: {}", e),
        })
    }

    fn encoded_size(&self, value: &Value) -> usize {
        // serde_json::to_string on an in-memory Value cannot fail
        let text = serde_json::to_string(value).unwrap_or_default();
        FRAME_PREFIX + text.len()
    }

    fn tag(&self) -> &'static str {
        "json"
    }
}
