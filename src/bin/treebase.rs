// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! TreeBase CLI: manage single-file key-value stores from the command line.
//!
//! Keys are strings, values are JSON. The CLI is a plain consumer of the
//! request gateway; it never touches the engine directly.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "treebase",
    version,
    about = "Embeddable persistent ordered key-value store"
)]
struct Cli {
    /// Optional TOML settings file (order, cache_capacity, page_size, write_mode)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new store file
    Init {
        /// Path of the store file to create
        path: PathBuf,
    },

    /// Insert or overwrite one entry (value is JSON)
    Set {
        path: PathBuf,
        key: String,
        value: String,
    },

    /// Look up a key
    Get { path: PathBuf, key: String },

    /// Delete a key
    Del { path: PathBuf, key: String },

    /// Scan a key range in order
    Scan {
        path: PathBuf,
        start: String,
        end: String,
        /// Exclude the start bound
        #[arg(long)]
        exclusive_start: bool,
        /// Exclude the end bound
        #[arg(long)]
        exclusive_end: bool,
        /// Stop after this many entries
        #[arg(long)]
        limit: Option<usize>,
        /// Descending key order
        #[arg(long)]
        reverse: bool,
    },

    /// List every entry in key order
    Entries { path: PathBuf },

    /// Show store statistics
    Stats { path: PathBuf },

    /// Audit the tree structure and checksums
    Verify { path: PathBuf },

    /// Remove a store file
    Destroy { path: PathBuf },

    /// Interactive shell
    Shell { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = commands::load_settings(cli.config.as_deref())?;

    match cli.command {
        Command::Init { path } => commands::init(&path, &settings),
        Command::Set { path, key, value } => commands::set(&path, &settings, key, &value),
        Command::Get { path, key } => commands::get(&path, &settings, key),
        Command::Del { path, key } => commands::del(&path, &settings, key),
        Command::Scan {
            path,
            start,
            end,
            exclusive_start,
            exclusive_end,
            limit,
            reverse,
        } => commands::scan(
            &path,
            &settings,
            start,
            end,
            exclusive_start,
            exclusive_end,
            limit,
            reverse,
        ),
        Command::Entries { path } => commands::entries(&path, &settings),
        Command::Stats { path } => commands::stats(&path, &settings),
        Command::Verify { path } => commands::verify(&path, &settings),
        Command::Destroy { path } => commands::destroy(&path),
        Command::Shell { path } => commands::shell::run(&path, &settings),
    }
}
