//! Live connections grouped by origin, for broadcast and cleanup.

use super::rpc::{Notification, Outbound};
use crate::types::{Origin, TabId};
use crate::vault::Vault;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Who is on the other end of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OriginClass {
    /// The extension's own UI
    Ui,
    /// A web page
    Page(Origin),
}

impl OriginClass {
    pub fn is_trusted(&self) -> bool {
        matches!(self, OriginClass::Ui)
    }

    pub fn origin(&self) -> Option<&Origin> {
        match self {
            OriginClass::Ui => None,
            OriginClass::Page(origin) => Some(origin),
        }
    }
}

impl fmt::Display for OriginClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginClass::Ui => f.write_str("ui"),
            OriginClass::Page(origin) => write!(f, "{}", origin),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct ConnectionEntry {
    tab_id: Option<TabId>,
    outbound: mpsc::Sender<Outbound>,
}

/// `origin class -> connection id -> outbound handle`.
///
/// A class has a bucket only while it has at least one live connection.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<OriginClass, HashMap<ConnectionId, ConnectionEntry>>>,
    next_id: AtomicU64,
    vault: Vault,
}

impl ConnectionRegistry {
    pub fn new(vault: Vault) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            vault,
        }
    }

    pub fn register(
        &self,
        class: OriginClass,
        tab_id: Option<TabId>,
        outbound: mpsc::Sender<Outbound>,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(connection = %id, origin = %class, "connection registered");
        self.connections
            .lock()
            .entry(class)
            .or_default()
            .insert(id, ConnectionEntry { tab_id, outbound });
        id
    }

    /// Remove a connection. Returns its tab if it was registered.
    pub fn unregister(&self, class: &OriginClass, id: ConnectionId) -> Option<Option<TabId>> {
        let mut connections = self.connections.lock();
        let bucket = connections.get_mut(class)?;
        let entry = bucket.remove(&id)?;
        if bucket.is_empty() {
            connections.remove(class);
        }
        debug!(connection = %id, origin = %class, "connection unregistered");
        Some(entry.tab_id)
    }

    pub fn connection_count(&self, class: &OriginClass) -> usize {
        self.connections
            .lock()
            .get(class)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    pub fn has_origin(&self, class: &OriginClass) -> bool {
        self.connections.lock().contains_key(class)
    }

    /// Send an event to every connection of `class`. No-op while the vault is locked.
    ///
    /// Returns the number of connections the event was queued for.
    pub fn notify(&self, class: &OriginClass, method: &str, params: Value) -> usize {
        if !self.vault.is_unlocked() {
            trace!(origin = %class, method, "notify skipped: vault locked");
            return 0;
        }
        let connections = self.connections.lock();
        let Some(bucket) = connections.get(class) else {
            return 0;
        };
        send_all(bucket.values(), method, &params)
    }

    /// Send an event to every connection. No-op while the vault is locked.
    pub fn notify_all(&self, method: &str, params: Value) -> usize {
        if !self.vault.is_unlocked() {
            trace!(method, "notify_all skipped: vault locked");
            return 0;
        }
        let connections = self.connections.lock();
        send_all(connections.values().flat_map(|bucket| bucket.values()), method, &params)
    }
}

fn send_all<'a>(
    entries: impl Iterator<Item = &'a ConnectionEntry>,
    method: &str,
    params: &Value,
) -> usize {
    let mut sent = 0;
    for entry in entries {
        let event = Outbound::Notification(Notification::new(method, params.clone()));
        // Slow or closed connections miss the event rather than block others
        match entry.outbound.try_send(event) {
            Ok(()) => sent += 1,
            Err(e) => debug!(method, "event not delivered: {}", e),
        }
    }
    sent
}
