// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Parse cache
//!
//! A size-bounded LRU keyed by lambda source text. Stored entries sit behind
//! `Arc`, so a hit hands out a shared immutable value: cached operation trees
//! cannot be mutated through the handle, and callers that need a private
//! auto-param map clone it out of the entry. The mutex covers the LRU
//! bookkeeping; entries themselves are read lock-free after the clone of the
//! `Arc`.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parse cache configuration
///
/// Process-wide; `capacity = 0` disables caching entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1024,
        }
    }
}

impl CacheConfig {
    fn active(&self) -> bool {
        self.enabled && self.capacity > 0
    }
}

/// LRU cache over parsed entries
#[derive(Debug)]
pub struct ParseCache<T> {
    inner: Mutex<CacheInner<T>>,
}

#[derive(Debug)]
struct CacheInner<T> {
    entries: HashMap<String, Arc<T>>,
    /// Access order, least recently used first
    order: VecDeque<String>,
    config: CacheConfig,
}

impl<T> Default for ParseCache<T> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<T> ParseCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                config,
            }),
        }
    }

    /// Replace the configuration; shrinking evicts oldest entries immediately
    pub fn configure(&self, config: CacheConfig) {
        let mut inner = self.inner.lock().expect("parse cache poisoned");
        inner.config = config;
        if !inner.config.active() {
            inner.entries.clear();
            inner.order.clear();
            return;
        }
        while inner.entries.len() > inner.config.capacity {
            inner.evict_oldest();
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.inner.lock().expect("parse cache poisoned").config
    }

    /// Look up an entry, refreshing its access order
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let mut inner = self.inner.lock().expect("parse cache poisoned");
        if !inner.config.active() {
            return None;
        }
        let entry = inner.entries.get(key).cloned()?;
        inner.touch(key);
        debug!(key_len = key.len(), "parse cache hit");
        Some(entry)
    }

    /// Store an entry, evicting the least recently used on overflow
    pub fn insert(&self, key: &str, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let mut inner = self.inner.lock().expect("parse cache poisoned");
        if !inner.config.active() {
            return value;
        }
        if inner.entries.insert(key.to_string(), Arc::clone(&value)).is_none() {
            inner.order.push_back(key.to_string());
        } else {
            inner.touch(key);
        }
        while inner.entries.len() > inner.config.capacity {
            inner.evict_oldest();
        }
        value
    }

    /// Fetch or build; `use_cache = false` bypasses both reads and writes
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &str,
        use_cache: bool,
        build: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        if use_cache {
            if let Some(hit) = self.get(key) {
                return Ok(hit);
            }
        }
        let value = build()?;
        if use_cache {
            Ok(self.insert(key, value))
        } else {
            Ok(Arc::new(value))
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("parse cache poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries, keeping the configuration
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("parse cache poisoned");
        inner.entries.clear();
        inner.order.clear();
    }
}

impl<T> CacheInner<T> {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let key = self.order.remove(pos).expect("position just found");
            self.order.push_back(key);
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            debug!(key_len = oldest.len(), "parse cache eviction");
            self.entries.remove(&oldest);
        }
    }
}
