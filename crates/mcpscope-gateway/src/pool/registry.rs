//! Configuration Registry
//!
//! Validated server configurations keyed by name. Listing follows first
//! registration order; re-registering a name replaces its config but keeps
//! its position.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use mcpscope_core::ServerConfig;
use parking_lot::RwLock;

struct Entry {
    seq: u64,
    config: ServerConfig,
}

#[derive(Default)]
pub struct ConfigRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    next_seq: AtomicU64,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns the previous config, if any.
    pub fn register(&self, config: ServerConfig) -> Option<ServerConfig> {
        let mut entries = self.entries.write();
        match entries.get_mut(&config.name) {
            Some(entry) => Some(std::mem::replace(&mut entry.config, config)),
            None => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                entries.insert(config.name.clone(), Entry { seq, config });
                None
            }
        }
    }

    pub fn remove(&self, name: &str) -> Option<ServerConfig> {
        self.entries.write().remove(name).map(|e| e.config)
    }

    pub fn get(&self, name: &str) -> Option<ServerConfig> {
        self.entries.read().get(name).map(|e| e.config.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// All configs in registration order
    pub fn list(&self) -> Vec<ServerConfig> {
        let entries = self.entries.read();
        let mut ordered: Vec<&Entry> = entries.values().collect();
        ordered.sort_by_key(|e| e.seq);
        ordered.into_iter().map(|e| e.config.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
