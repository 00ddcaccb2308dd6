//! Coalescing connection table
//!
//! One slot per key, either a connect attempt in flight or a live
//! connection. Concurrent `acquire` calls for the same key share a single
//! attempt; the adapter is never asked to open two channels for one key.
//!
//! Each attempt runs in its own task, so it settles even when every caller
//! waiting on it has gone away (timed out, dropped). The task settles the slot
//! itself before the shared result resolves, which means a caller that
//! observes the result also observes the settled table.
//!
//! Locking: the slot map is behind a `parking_lot` mutex that is never held
//! across an `.await`. Only `settle` removes a `Connecting` slot.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use mcpscope_core::{ChannelId, ManagerError, ManagerResult, TransportError};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::connection::Connection;

/// Result of a connect attempt, shareable between every attached caller
pub type Attempt = Shared<BoxFuture<'static, ManagerResult<Arc<Connection>>>>;

enum Slot {
    Connecting { attempt_id: u64, attempt: Attempt },
    Connected(Arc<Connection>),
}

/// Outcome of [`ConnectionTable::acquire`]
pub enum Join {
    /// A live connection already existed
    Live(Arc<Connection>),
    /// Wait on this attempt. `started` is true for the caller that began it.
    Attempt { attempt: Attempt, started: bool },
}

impl Join {
    pub async fn wait(self) -> ManagerResult<Arc<Connection>> {
        match self {
            Self::Live(conn) => Ok(conn),
            Self::Attempt { attempt, .. } => attempt.await,
        }
    }
}

pub struct ConnectionTable<K> {
    slots: Mutex<HashMap<K, Slot>>,
    next_attempt: AtomicU64,
}

impl<K> ConnectionTable<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(HashMap::new()),
            next_attempt: AtomicU64::new(1),
        })
    }

    /// Return the live connection for `key`, join the attempt in flight, or
    /// start a new attempt with `open`.
    ///
    /// `open` is only invoked when a new attempt starts. A live connection
    /// whose channel reports closed is discarded here and replaced by a new
    /// attempt.
    pub fn acquire<F, Fut>(self: &Arc<Self>, key: &K, open: F) -> Join
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ManagerResult<Arc<Connection>>> + Send + 'static,
    {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(Slot::Connected(conn)) if !conn.is_closed() => {
                trace!(key = ?key, "Reusing live connection");
                return Join::Live(Arc::clone(conn));
            }
            Some(Slot::Connecting { attempt, .. }) => {
                debug!(key = ?key, "Joining in-flight connect attempt");
                return Join::Attempt {
                    attempt: attempt.clone(),
                    started: false,
                };
            }
            _ => {}
        }

        let attempt_id = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        let table = Arc::clone(self);
        let task_key = key.clone();
        let connect = open();
        let handle = tokio::spawn(async move {
            let result = connect.await;
            table.settle(&task_key, attempt_id, &result);
            result
        });

        let attempt: Attempt = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(ManagerError::Transport(TransportError::Closed(format!(
                    "connect task failed: {}",
                    e
                )))),
            }
        }
        .boxed()
        .shared();

        slots.insert(
            key.clone(),
            Slot::Connecting {
                attempt_id,
                attempt: attempt.clone(),
            },
        );
        debug!(key = ?key, attempt_id, "Started connect attempt");

        Join::Attempt {
            attempt,
            started: true,
        }
    }

    fn settle(&self, key: &K, attempt_id: u64, result: &ManagerResult<Arc<Connection>>) {
        let mut slots = self.slots.lock();
        let ours = matches!(
            slots.get(key),
            Some(Slot::Connecting { attempt_id: id, .. }) if *id == attempt_id
        );
        if !ours {
            return;
        }
        match result {
            Ok(conn) => {
                slots.insert(key.clone(), Slot::Connected(Arc::clone(conn)));
            }
            Err(_) => {
                slots.remove(key);
            }
        }
    }

    /// Live connection for `key`, if any. Closed channels are still returned;
    /// callers decide how to evict them.
    pub fn get(&self, key: &K) -> Option<Arc<Connection>> {
        match self.slots.lock().get(key) {
            Some(Slot::Connected(conn)) => Some(Arc::clone(conn)),
            _ => None,
        }
    }

    pub fn is_connected(&self, key: &K) -> bool {
        matches!(self.slots.lock().get(key), Some(Slot::Connected(conn)) if !conn.is_closed())
    }

    pub fn is_connecting(&self, key: &K) -> bool {
        matches!(self.slots.lock().get(key), Some(Slot::Connecting { .. }))
    }

    /// Whether `key` has a connection or an attempt in flight
    pub fn contains(&self, key: &K) -> bool {
        self.slots.lock().contains_key(key)
    }

    pub fn contains_where(&self, predicate: impl Fn(&K) -> bool) -> bool {
        self.slots.lock().keys().any(predicate)
    }

    pub fn keys_where(&self, predicate: impl Fn(&K) -> bool) -> Vec<K> {
        self.slots
            .lock()
            .keys()
            .filter(|k| predicate(k))
            .cloned()
            .collect()
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.slots
            .lock()
            .values()
            .filter_map(|slot| match slot {
                Slot::Connected(conn) => Some(Arc::clone(conn)),
                Slot::Connecting { .. } => None,
            })
            .collect()
    }

    /// Remove the live connection only if it is still the one on `channel_id`
    pub fn evict(&self, key: &K, channel_id: ChannelId) -> Option<Arc<Connection>> {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(Slot::Connected(conn)) if conn.channel_id() == channel_id => {}
            _ => return None,
        }
        match slots.remove(key) {
            Some(Slot::Connected(conn)) => Some(conn),
            _ => None,
        }
    }

    /// Remove whatever `key` holds. An attempt in flight is waited for first,
    /// and whatever it produced is removed.
    pub async fn remove(&self, key: &K) -> Option<Arc<Connection>> {
        loop {
            let attempt = {
                let mut slots = self.slots.lock();
                match slots.get(key) {
                    None => return None,
                    Some(Slot::Connected(_)) => {
                        return match slots.remove(key) {
                            Some(Slot::Connected(conn)) => Some(conn),
                            _ => None,
                        };
                    }
                    Some(Slot::Connecting { attempt, .. }) => attempt.clone(),
                }
            };
            debug!(key = ?key, "Waiting for in-flight attempt before removal");
            let _ = attempt.await;
        }
    }
}
