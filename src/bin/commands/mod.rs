// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! CLI command implementations.

pub mod shell;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use treebase::codec::{JsonCodec, StringCodec};
use treebase::{RangeOptions, Store, StoreConfig, WriteMode};

/// CLI defaults are sized for interactive use, not server workloads.
const CLI_ORDER: u32 = 32;
const CLI_CACHE_CAPACITY: usize = 100;

/// Optional settings loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    pub order: Option<u32>,
    pub cache_capacity: Option<usize>,
    pub page_size: Option<u32>,
    pub write_mode: Option<String>,
}

/// Load settings from `path`, or defaults when no file is given.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid settings file {}", path.display()))
}

fn store_config(
    path: &Path,
    settings: &Settings,
    open_existing: bool,
) -> Result<StoreConfig<String, Value>> {
    let mut config = StoreConfig::new(path, Box::new(StringCodec), Box::new(JsonCodec));
    config.order = settings.order.unwrap_or(CLI_ORDER);
    config.cache_capacity = settings.cache_capacity.unwrap_or(CLI_CACHE_CAPACITY);
    if let Some(page_size) = settings.page_size {
        config.page_size = page_size;
    }
    config.write_mode = match settings.write_mode.as_deref() {
        None | Some("write-through") => WriteMode::WriteThrough,
        Some("write-back") => WriteMode::WriteBack,
        Some(other) => anyhow::bail!("unknown write_mode '{}'", other),
    };
    config.open_existing = open_existing;
    Ok(config)
}

pub(crate) fn open(path: &Path, settings: &Settings) -> Result<Store<String, Value>> {
    let config = store_config(path, settings, true)?;
    Store::open(config).with_context(|| format!("failed to open store {}", path.display()))
}

/// Parse a CLI value argument: JSON if it parses, else a plain string.
pub(crate) fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn init(path: &Path, settings: &Settings) -> Result<()> {
    let config = store_config(path, settings, false)?;
    let store: Store<String, Value> = Store::open(config)
        .with_context(|| format!("failed to create store {}", path.display()))?;
    store.close()?;
    println!("Created store {}", path.display());
    Ok(())
}

pub fn set(path: &Path, settings: &Settings, key: String, raw: &str) -> Result<()> {
    let store = open(path, settings)?;
    store.insert(key, parse_value(raw))?;
    store.close()?;
    println!("OK");
    Ok(())
}

pub fn get(path: &Path, settings: &Settings, key: String) -> Result<()> {
    let store = open(path, settings)?;
    match store.search(key)? {
        Some(value) => println!("{}", value),
        None => println!("(absent)"),
    }
    store.close()?;
    Ok(())
}

pub fn del(path: &Path, settings: &Settings, key: String) -> Result<()> {
    let store = open(path, settings)?;
    let removed = store.delete(key)?;
    store.close()?;
    println!("{}", if removed { "Removed" } else { "Not found" });
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn scan(
    path: &Path,
    settings: &Settings,
    start: String,
    end: String,
    exclusive_start: bool,
    exclusive_end: bool,
    limit: Option<usize>,
    reverse: bool,
) -> Result<()> {
    let store = open(path, settings)?;
    let options = RangeOptions {
        include_start: !exclusive_start,
        include_end: !exclusive_end,
        limit,
        reverse,
    };
    let results = store.range(start, end, options)?;
    for (key, value) in &results {
        println!("{}\t{}", key, value);
    }
    println!("({} entries)", results.len());
    store.close()?;
    Ok(())
}

pub fn entries(path: &Path, settings: &Settings) -> Result<()> {
    let store = open(path, settings)?;
    let entries = store.entries()?;
    for (key, value) in &entries {
        println!("{}\t{}", key, value);
    }
    println!("({} entries)", entries.len());
    store.close()?;
    Ok(())
}

pub fn stats(path: &Path, settings: &Settings) -> Result<()> {
    let store = open(path, settings)?;
    let stats = store.stats()?;
    store.close()?;
    println!("Keys:           {}", stats.key_count);
    println!("Nodes:          {}", stats.node_count);
    println!("Height:         {}", stats.height);
    println!("File size:      {} bytes", stats.file_size);
    println!("Cached nodes:   {}", stats.cached_nodes);
    println!("Cache hit rate: {:.1}%", stats.cache_hit_rate * 100.0);
    Ok(())
}

pub fn verify(path: &Path, settings: &Settings) -> Result<()> {
    let store = open(path, settings)?;
    let ok = store.verify()?;
    store.close()?;
    if ok {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("store {} failed verification", path.display())
    }
}

pub fn destroy(path: &Path) -> Result<()> {
    Store::<String, Value>::destroy(path)
        .with_context(|| format!("failed to destroy store {}", path.display()))?;
    println!("Destroyed {}", path.display());
    Ok(())
}
