// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! File-backed block device with exclusive locking.
//!
//! Wraps a `std::fs::File` with seek-based positioned I/O. An exclusive
//! advisory lock is taken for the lifetime of the device, so two processes
//! cannot open the same store file; the lock is released when the device is
//! dropped.

use super::BlockDevice;
use crate::error::{TreeError, TreeResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Block device over a single named file.
///
/// ## Ownership
/// The device exclusively owns the file handle. Higher layers (buffer pool,
/// tree engine) borrow the device for the duration of one operation.
#[derive(Debug)]
pub struct FileDevice {
    /// Path to the store file (kept for error context).
    path: PathBuf,

    /// Locked file handle.
    file: File,
}

impl FileDevice {
    /// Create a new store file. Fails if the file already exists.
    ///
    /// ## Input
    /// - `path`: Path to the store file
    ///
    /// ## Output
    /// - `Ok(FileDevice)`: File created and exclusively locked
    /// - `Err(TreeError::AlreadyExists)`: A file is already present
    /// - `Err(TreeError::Io)`: Creation or locking failed
    pub fn create<P: AsRef<Path>>(path: P) -> TreeResult<Self> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            return Err(TreeError::AlreadyExists {
                name: path.to_string_lossy().to_string(),
            });
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| TreeError::Io {
                operation: "create_store_file".to_string(),
                reason: e.to_string(),
            })?;

        Self::lock(&path, file)
    }

    /// Open an existing store file. Fails if the file is absent.
    ///
    /// ## Output
    /// - `Ok(FileDevice)`: File opened and exclusively locked
    /// - `Err(TreeError::NotFound)`: No file at `path`
    /// - `Err(TreeError::Io)`: Open or locking failed
    pub fn open<P: AsRef<Path>>(path: P) -> TreeResult<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(TreeError::NotFound {
                name: path.to_string_lossy().to_string(),
            });
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| TreeError::Io {
                operation: "open_store_file".to_string(),
                reason: e.to_string(),
            })?;

        Self::lock(&path, file)
    }

    /// Whether a store file exists at `path`.
    pub fn exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    /// Remove the store file at `path`.
    ///
    /// ## Error Conditions
    /// - `NotFound`: No file at `path`
    /// - `Io`: Removal failed (permissions, held elsewhere)
    pub fn remove<P: AsRef<Path>>(path: P) -> TreeResult<()> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(TreeError::NotFound {
                name: path.to_string_lossy().to_string(),
            });
        }

        std::fs::remove_file(path).map_err(|e| TreeError::Io {
            operation: "remove_store_file".to_string(),
            reason: e.to_string(),
        })
    }

    /// Path this device is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(path: &Path, file: File) -> TreeResult<Self> {
        file.try_lock_exclusive().map_err(|e| TreeError::Io {
            operation: "lock_store_file".to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn seek_to(&mut self, offset: u64, operation: &str) -> TreeResult<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| TreeError::Io {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

impl BlockDevice for FileDevice {
    fn read(&mut self, offset: u64, len: usize) -> TreeResult<Vec<u8>> {
        let file_len = self.size()?;
        if offset + len as u64 > file_len {
            return Err(TreeError::Io {
                operation: "read".to_string(),
                reason: format!(
                    "read of {} bytes at offset {} exceeds file length {}",
                    len, offset, file_len
                ),
            });
        }

        self.seek_to(offset, "read")?;

        let mut buffer = vec![0u8; len];
        self.file
            .read_exact(&mut buffer)
            .map_err(|e| TreeError::Io {
                operation: "read".to_string(),
                reason: e.to_string(),
            })?;

        Ok(buffer)
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) -> TreeResult<()> {
        self.seek_to(offset, "write")?;

        self.file.write_all(bytes).map_err(|e| TreeError::Io {
            operation: "write".to_string(),
            reason: e.to_string(),
        })
    }

    fn truncate(&mut self, len: u64) -> TreeResult<()> {
        self.file.set_len(len).map_err(|e| TreeError::Io {
            operation: "truncate".to_string(),
            reason: e.to_string(),
        })
    }

    fn flush(&mut self) -> TreeResult<()> {
        self.file.sync_all().map_err(|e| TreeError::Io {
            operation: "flush".to_string(),
            reason: e.to_string(),
        })
    }

    fn size(&mut self) -> TreeResult<u64> {
        let meta = self.file.metadata().map_err(|e| TreeError::Io {
            operation: "size".to_string(),
            reason: e.to_string(),
        })?;
        Ok(meta.len())
    }
}
