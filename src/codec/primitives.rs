// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Codecs for primitive key and value types.

use super::{read_frame, take, write_frame, Codec, FRAME_PREFIX};
use crate::error::{TreeError, TreeResult};

/// 32-bit signed integer codec (little-endian, fixed 4 bytes).
#[derive(Debug, Clone, Copy, Default)]
pub struct I32Codec;

impl Codec<i32> for I32Codec {
    fn encode(&self, value: &i32, out: &mut Vec<u8>) -> TreeResult<()> {
        out.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn decode(&self, input: &mut &[u8]) -> TreeResult<i32> {
        let bytes = take(input, 4, "i32")?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn encoded_size(&self, _value: &i32) -> usize {
        4
    }

    fn fixed_size(&self) -> Option<usize> {
        Some(4)
    }

    fn tag(&self) -> &'static str {
        "i32"
    }
}

/// IEEE-754 64-bit float codec (little-endian, fixed 8 bytes).
#[derive(Debug, Clone, Copy, Default)]
pub struct F64Codec;

impl Codec<f64> for F64Codec {
    fn encode(&self, value: &f64, out: &mut Vec<u8>) -> TreeResult<()> {
        out.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn decode(&self, input: &mut &[u8]) -> TreeResult<f64> {
        let bytes = take(input, 8, "f64")?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    fn encoded_size(&self, _value: &f64) -> usize {
        8
    }

    fn fixed_size(&self) -> Option<usize> {
        Some(8)
    }

    fn tag(&self) -> &'static str {
        "f64"
    }
}

/// Boolean codec (single byte, 0 or 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolCodec;

impl Codec<bool> for BoolCodec {
    fn encode(&self, value: &bool, out: &mut Vec<u8>) -> TreeResult<()> {
        out.push(u8::from(*value));
        Ok(())
    }

    fn decode(&self, input: &mut &[u8]) -> TreeResult<bool> {
        let bytes = take(input, 1, "bool")?;
        match bytes[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(TreeError::Codec {
                reason: format!("invalid boolean byte: {}", other),
            }),
        }
    }

    fn encoded_size(&self, _value: &bool) -> usize {
        1
    }

    fn fixed_size(&self) -> Option<usize> {
        Some(1)
    }

    fn tag(&self) -> &'static str {
        "bool"
    }
}

/// UTF-8 string codec (length-prefixed, variable).
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Codec<String> for StringCodec {
    fn encode(&self, value: &String, out: &mut Vec<u8>) -> TreeResult<()> {
        write_frame(out, value.as_bytes());
        Ok(())
    }

    fn decode(&self, input: &mut &[u8]) -> TreeResult<String> {
        let bytes = read_frame(input, "utf8 string")?;
        String::from_utf8(bytes.to_vec()).map_err(|e| TreeError::Codec {
            reason: format!("invalid UTF-8: {}", e),
        })
    }

    fn encoded_size(&self, value: &String) -> usize {
        FRAME_PREFIX + value.len()
    }

    fn tag(&self) -> &'static str {
        "utf8"
    }
}

/// Raw byte-sequence codec (length-prefixed, variable).
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec<Vec<u8>> for BytesCodec {
    fn encode(&self, value: &Vec<u8>, out: &mut Vec<u8>) -> TreeResult<()> {
        write_frame(out, value);
        Ok(())
    }

    fn decode(&self, input: &mut &[u8]) -> TreeResult<Vec<u8>> {
        Ok(read_frame(input, "byte sequence")?.to_vec())
    }

    fn encoded_size(&self, value: &Vec<u8>) -> usize {
        FRAME_PREFIX + value.len()
    }

    fn tag(&self) -> &'static str {
        "bytes"
    }
}
