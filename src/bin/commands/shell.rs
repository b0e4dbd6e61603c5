// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Interactive shell (REPL) implementation.

use super::{open, parse_value, Settings};
use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::Value;
use std::path::Path;
use treebase::{RangeOptions, Store};

pub fn run(path: &Path, settings: &Settings) -> Result<()> {
    let store = open(path, settings)?;

    println!("TreeBase Shell v{}", treebase::VERSION);
    println!("Store: {}", path.display());
    println!("Type help for commands, exit to quit\n");

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("treebase> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);

                if trimmed == "exit" || trimmed == "quit" {
                    break;
                }

                if let Err(e) = execute(&store, trimmed) {
                    eprintln!("Error: {}", e);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    store.close()?;
    Ok(())
}

fn execute(store: &Store<String, Value>, line: &str) -> Result<()> {
    let mut parts = line.splitn(3, char::is_whitespace);
    let command = parts.next().unwrap_or_default();

    match command {
        "help" => {
            println!("Commands:");
            println!("  get <key>             look up a key");
            println!("  set <key> <json>      insert or overwrite");
            println!("  del <key>             delete a key");
            println!("  scan <start> <end>    inclusive range scan");
            println!("  entries               list every entry");
            println!("  stats                 store statistics");
            println!("  verify                structural audit");
            println!("  exit                  quit");
        }
        "get" => {
            let key = required(parts.next(), "get <key>")?;
            match store.search(key.to_string())? {
                Some(value) => println!("{}", value),
                None => println!("(absent)"),
            }
        }
        "set" => {
            let key = required(parts.next(), "set <key> <json>")?;
            let raw = required(parts.next(), "set <key> <json>")?;
            store.insert(key.to_string(), parse_value(raw))?;
            println!("OK");
        }
        "del" => {
            let key = required(parts.next(), "del <key>")?;
            let removed = store.delete(key.to_string())?;
            println!("{}", if removed { "Removed" } else { "Not found" });
        }
        "scan" => {
            let start = required(parts.next(), "scan <start> <end>")?;
            let end = required(parts.next(), "scan <start> <end>")?;
            let results = store.range(
                start.to_string(),
                end.trim().to_string(),
                RangeOptions::default(),
            )?;
            for (key, value) in &results {
                println!("{}\t{}", key, value);
            }
            println!("({} entries)", results.len());
        }
        "entries" => {
            let entries = store.entries()?;
            for (key, value) in &entries {
                println!("{}\t{}", key, value);
            }
            println!("({} entries)", entries.len());
        }
        "stats" => {
            let stats = store.stats()?;
            println!("Keys:           {}", stats.key_count);
            println!("Nodes:          {}", stats.node_count);
            println!("Height:         {}", stats.height);
            println!("File size:      {} bytes", stats.file_size);
            println!("Cached nodes:   {}", stats.cached_nodes);
            println!("Cache hit rate: {:.1}%", stats.cache_hit_rate * 100.0);
        }
        "verify" => {
            if store.verify()? {
                println!("OK");
            } else {
                println!("FAILED: store is damaged");
            }
        }
        other => {
            anyhow::bail!("unknown command '{}', try help", other);
        }
    }
    Ok(())
}

fn required<'a>(part: Option<&'a str>, usage: &str) -> Result<&'a str> {
    part.filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("usage: {}", usage))
}
