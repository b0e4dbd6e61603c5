// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Node page allocation and recycling.
//!
//! Pages are recycled through a singly linked free list threaded through the
//! freed pages themselves: the first 8 bytes of a freed page hold the offset
//! of the next free page (0 terminates the list). The list head lives in the
//! file header. When the list is empty, allocation appends at
//! `total_file_size`.
//!
//! Overwriting a freed page's first 8 bytes destroys its stored checksum
//! field, so a stale pointer into a freed page fails validation instead of
//! decoding silently.

use super::header::{FileHeader, HEADER_SIZE};
use crate::device::BlockDevice;
use crate::error::{TreeError, TreeResult};

/// Allocate one page, recycling from the free list when possible.
///
/// Updates `node_count`, `total_file_size` / `free_list_head` in the header;
/// the caller persists the header at its next flush boundary.
///
/// ## Output
/// - Byte offset of the allocated page
///
/// ## Error Conditions
/// - `Corruption`: the free list points outside the file
/// - `Io`: reading the free-list link failed
pub fn allocate_page(
    header: &mut FileHeader,
    device: &mut dyn BlockDevice,
) -> TreeResult<u64> {
    let page_size = header.node_size as u64;

    let offset = if header.free_list_head != 0 {
        let offset = header.free_list_head;
        if offset < HEADER_SIZE as u64 || offset + page_size > header.total_file_size {
            return Err(TreeError::Corruption {
                detail: format!("free list head {} points outside the file", offset),
            });
        }
        let link = device.read(offset, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&link);
        header.free_list_head = u64::from_le_bytes(raw);
        offset
    } else {
        let offset = header.total_file_size;
        header.total_file_size += page_size;
        offset
    };

    header.node_count += 1;
    header.touch();
    Ok(offset)
}

/// Return a page to the free list.
///
/// Writes the current list head into the page's first 8 bytes and makes the
/// page the new head. Updates `node_count` in the header.
pub fn free_page(
    header: &mut FileHeader,
    device: &mut dyn BlockDevice,
    offset: u64,
) -> TreeResult<()> {
    device.write(offset, &header.free_list_head.to_le_bytes())?;
    header.free_list_head = offset;
    header.node_count = header.node_count.saturating_sub(1);
    header.touch();
    Ok(())
}
