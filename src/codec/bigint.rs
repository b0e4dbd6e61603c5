// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Arbitrary-precision integer transport type and codec.
//!
//! `BigInt` is a storage representation, not an arithmetic library: a sign
//! and a big-endian magnitude with no leading zero bytes. Ordering follows
//! numeric value, so it is usable as a key type.

use super::{read_frame, take, write_frame, Codec, FRAME_PREFIX};
use crate::error::{TreeError, TreeResult};
use std::cmp::Ordering;

/// Sign-and-magnitude integer of arbitrary width.
///
/// ## Invariants
/// - `magnitude` is big-endian with no leading zero bytes
/// - zero is represented as an empty magnitude with `negative = false`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigInt {
    negative: bool,
    magnitude: Vec<u8>,
}

impl BigInt {
    /// Zero value.
    pub fn zero() -> Self {
        Self {
            negative: false,
            magnitude: Vec::new(),
        }
    }

    /// Construct from sign and big-endian magnitude; leading zeros stripped.
    pub fn new(negative: bool, magnitude: Vec<u8>) -> Self {
        let start = magnitude.iter().position(|&b| b != 0);
        match start {
            Some(idx) => Self {
                negative,
                magnitude: magnitude[idx..].to_vec(),
            },
            None => Self::zero(),
        }
    }

    /// Construct from a native integer.
    pub fn from_i128(value: i128) -> Self {
        let negative = value < 0;
        let magnitude = value.unsigned_abs().to_be_bytes().to_vec();
        Self::new(negative, magnitude)
    }

    /// Convert back to a native integer if it fits.
    pub fn to_i128(&self) -> Option<i128> {
        if self.magnitude.len() > 16 {
            return None;
        }
        let mut raw = [0u8; 16];
        raw[16 - self.magnitude.len()..].copy_from_slice(&self.magnitude);
        let unsigned = u128::from_be_bytes(raw);
        if self.negative {
            if unsigned > i128::MAX as u128 + 1 {
                return None;
            }
            Some((unsigned as i128).wrapping_neg())
        } else {
            if unsigned > i128::MAX as u128 {
                return None;
            }
            Some(unsigned as i128)
        }
    }

    /// Whether this value is negative.
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Big-endian magnitude without leading zeros.
    pub fn magnitude(&self) -> &[u8] {
        &self.magnitude
    }

    fn magnitude_cmp(&self, other: &Self) -> Ordering {
        self.magnitude
            .len()
            .cmp(&other.magnitude.len())
            .then_with(|| self.magnitude.cmp(&other.magnitude))
    }
}

impl Ord for BigInt {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.magnitude_cmp(other),
            (true, true) => other.magnitude_cmp(self),
        }
    }
}

impl PartialOrd for BigInt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Codec for [`BigInt`]: sign byte + length-prefixed big-endian magnitude.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigIntCodec;

impl Codec<BigInt> for BigIntCodec {
    fn encode(&self, value: &BigInt, out: &mut Vec<u8>) -> TreeResult<()> {
        out.push(u8::from(value.negative));
        write_frame(out, &value.magnitude);
        Ok(())
    }

    fn decode(&self, input: &mut &[u8]) -> TreeResult<BigInt> {
        let sign = take(input, 1, "bigint sign")?[0];
        let negative = match sign {
            0 => false,
            1 => true,
            other => {
                return Err(TreeError::Codec {
                    reason: format!("invalid bigint sign byte: {}", other),
                })
            }
        };
        let magnitude = read_frame(input, "bigint magnitude")?;
        if magnitude.first() == Some(&0) {
            return Err(TreeError::Codec {
                reason: "bigint magnitude has leading zero".to_string(),
            });
        }
        if negative && magnitude.is_empty() {
            return Err(TreeError::Codec {
                reason: "negative zero bigint".to_string(),
            });
        }
        Ok(BigInt {
            negative,
            magnitude: magnitude.to_vec(),
        })
    }

    fn encoded_size(&self, value: &BigInt) -> usize {
        1 + FRAME_PREFIX + value.magnitude.len()
    }

    fn tag(&self) -> &'static str {
        "bigint"
    }
}
