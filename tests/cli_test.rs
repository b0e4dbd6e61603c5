// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! CLI integration tests.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn treebase() -> Command {
    Command::cargo_bin("treebase").unwrap()
}

fn store_path(dir: &TempDir) -> String {
    dir.path().join("cli.tbs").to_string_lossy().to_string()
}

#[test]
fn init_set_get_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);

    treebase()
        .args(["init", &path])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created store"));

    treebase()
        .args(["set", &path, "greeting", "\"hello\""])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));

    treebase()
        .args(["get", &path, "greeting"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello"));
}

#[test]
fn get_absent_key() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);

    treebase().args(["init", &path]).assert().success();
    treebase()
        .args(["get", &path, "nothing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(absent)"));
}

#[test]
fn del_reports_outcome() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);

    treebase().args(["init", &path]).assert().success();
    treebase()
        .args(["set", &path, "k", "1"])
        .assert()
        .success();

    treebase()
        .args(["del", &path, "k"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));

    treebase()
        .args(["del", &path, "k"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not found"));
}

#[test]
fn scan_lists_range_in_order() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);

    treebase().args(["init", &path]).assert().success();
    for key in ["apple", "banana", "cherry", "damson"] {
        treebase()
            .args(["set", &path, key, "1"])
            .assert()
            .success();
    }

    treebase()
        .args(["scan", &path, "apple", "cherry"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("apple")
                .and(predicate::str::contains("banana"))
                .and(predicate::str::contains("cherry"))
                .and(predicate::str::contains("damson").not())
                .and(predicate::str::contains("(3 entries)")),
        );
}

#[test]
fn stats_and_verify() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);

    treebase().args(["init", &path]).assert().success();
    treebase()
        .args(["set", &path, "k", "{\"n\": 1}"])
        .assert()
        .success();

    treebase()
        .args(["stats", &path])
        .assert()
        .success()
        .stdout(predicate::str::contains("Keys:           1"));

    treebase()
        .args(["verify", &path])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));
}

#[test]
fn destroy_removes_store() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);

    treebase().args(["init", &path]).assert().success();
    treebase()
        .args(["destroy", &path])
        .assert()
        .success()
        .stdout(predicate::str::contains("Destroyed"));

    treebase()
        .args(["get", &path, "k"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open store"));
}

#[test]
fn init_twice_fails() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);

    treebase().args(["init", &path]).assert().success();
    treebase()
        .args(["init", &path])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}
