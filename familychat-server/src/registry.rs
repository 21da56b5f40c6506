//! In-memory registry of live chat connections.
//!
//! Each identity maps to at most one connection. Logging in again from
//! another tab or device evicts the older connection (last login wins).
//! The map lives only as long as the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Frames a connection may have queued before sends to it start failing.
pub const OUTBOUND_CAPACITY: usize = 4096;

/// Frames queued for a connection's socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Ask the writer to close the socket (eviction).
    Close,
}

/// A frame could not be queued: the writer is gone or the queue is full.
#[derive(Debug, thiserror::Error)]
#[error("connection {0} is gone")]
pub struct SendError(pub u64);

/// The send side of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a text frame without waiting. Fails when the writer is gone or
    /// the peer has stopped reading and its queue is full.
    pub fn try_send(&self, text: String) -> Result<(), SendError> {
        self.tx
            .try_send(Outbound::Text(text))
            .map_err(|_| SendError(self.id))
    }

    pub fn close(&self) -> Result<(), SendError> {
        self.tx.try_send(Outbound::Close).map_err(|_| SendError(self.id))
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<String, ConnectionHandle>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle with a fresh connection id, plus the receiving end
    /// its writer task drains. The handle is not registered until `admit`.
    pub fn connect(&self) -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        (ConnectionHandle { id, tx }, rx)
    }

    /// Install `handle` as the connection for `identity`, closing whatever
    /// connection held that identity before. Returns the evicted handle.
    pub fn admit(&self, identity: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let previous = self.entries.lock().insert(identity.to_string(), handle);
        if let Some(ref old) = previous {
            // The old socket may already be gone.
            let _ = old.close();
        }
        previous
    }

    /// Drop the entry for `identity` if it still belongs to `connection_id`.
    /// A connection that was evicted must not remove its replacement.
    pub fn remove(&self, identity: &str, connection_id: u64) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(identity) {
            Some(current) if current.id == connection_id => {
                entries.remove(identity);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, identity: &str) -> Option<ConnectionHandle> {
        self.entries.lock().get(identity).cloned()
    }

    /// Point-in-time copy of every registered connection, for broadcast.
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.entries.lock().values().cloned().collect()
    }

    /// Identities currently online, sorted.
    pub fn online(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
