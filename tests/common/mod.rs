//! Common test utilities for wikiledger integration tests
//!
//! Builds engines over in-memory or file-backed stores with a `test` web
//! and offers terse helpers for saving pages at fixed times.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;
use wikiledger::{
    Author, NewWeb, OpenStore, PageEdit, PageSnapshot, SqliteStore, WikiConfig, WikiEngine, WikiResult,
};

pub const WEB: &str = "test";

/// Fixed base time; `at(n)` is `n` minutes later
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
}

/// Engine over an in-memory store with a bracket-only `test` web
pub fn engine() -> WikiEngine {
    let engine = WikiEngine::in_memory(WikiConfig::default()).unwrap();
    engine
        .create_web(&NewWeb::new("Test", WEB).brackets_only(true))
        .unwrap();
    engine
}

/// Engine over a database file, creating the `test` web if needed
pub fn file_engine(path: &Path) -> WikiEngine {
    let store = SqliteStore::open(path).unwrap();
    let engine = WikiEngine::new(Arc::new(store), WikiConfig::default());
    if engine.web(WEB).is_err() {
        engine
            .create_web(&NewWeb::new("Test", WEB).brackets_only(true))
            .unwrap();
    }
    engine
}

pub fn try_save(engine: &WikiEngine, name: &str, content: &str, author: &str, minute: i64) -> WikiResult<PageSnapshot> {
    engine.revise(WEB, &PageEdit::new(name, content, Author::new(author), at(minute)))
}

pub fn save(engine: &WikiEngine, name: &str, content: &str, author: &str, minute: i64) -> PageSnapshot {
    try_save(engine, name, content, author, minute).unwrap()
}

pub fn rename(engine: &WikiEngine, from: &str, to: &str, content: &str, author: &str, minute: i64) -> PageSnapshot {
    let edit = PageEdit::new(from, content, Author::new(author), at(minute)).renamed_to(to);
    engine.revise(WEB, &edit).unwrap()
}
