// Per-user registry of open event stream connections.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shop_models::UserId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::connection::{Connection, ConnectionId};
use crate::message::encode_payload;

type ConnectionSet = HashMap<ConnectionId, Arc<dyn Connection>>;

/// Routes payloads to the open connections of one user.
///
/// A user has an entry exactly while at least one of their connections is
/// open. Entries are pruned from the connection's close observer, never from
/// a failed write. Connections are only referenced here; closing them is the
/// transport's job.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    users: DashMap<UserId, ConnectionSet>,
    owners: DashMap<ConnectionId, UserId>,
    stats: RegistryStats,
}

#[derive(Debug, Default)]
struct RegistryStats {
    delivered: AtomicU64,
    failed_writes: AtomicU64,
    routing_misses: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub users: usize,
    pub connections: usize,
    pub delivered: u64,
    pub failed_writes: u64,
    pub routing_misses: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, user_id: UserId, connection: Arc<dyn Connection>) {
        let id = connection.id();

        {
            // the owner slot stays locked until the handle sits in exactly one user's set
            let mut owner = self.inner.owners.entry(id).or_insert_with(|| user_id.clone());
            if *owner != user_id {
                let previous = std::mem::replace(&mut *owner, user_id.clone());
                self.inner.detach(&previous, id);
            }

            let inserted = self
                .inner
                .users
                .entry(user_id.clone())
                .or_default()
                .insert(id, Arc::clone(&connection))
                .is_none();

            if !inserted {
                tracing::trace!(user = %user_id, connection = %id, "connection already subscribed");
                return;
            }
        }

        tracing::debug!(user = %user_id, connection = %id, "order stream subscribed");

        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        connection.on_close(Box::new(move || {
            if let Some(inner) = registry.upgrade() {
                inner.remove(&user_id, id);
            }
        }));
    }

    /// Forgets `connection_id` under `user_id`. Safe to call repeatedly.
    pub fn unsubscribe(&self, user_id: &UserId, connection_id: ConnectionId) {
        self.inner.remove(user_id, connection_id);
    }

    /// Serializes `payload` once and hands it to every open connection of
    /// `user_id`. Returns how many writes succeeded.
    ///
    /// No connections is the normal case for a user without an open tab and
    /// is not an error. A failing write is skipped without touching the
    /// other recipients or the registry.
    pub fn broadcast_to_user<T: Serialize + ?Sized>(&self, user_id: &UserId, payload: &T) -> usize {
        let targets: Vec<Arc<dyn Connection>> = match self.inner.users.get(user_id) {
            Some(set) => set.values().cloned().collect(),
            None => Vec::new(),
        };

        if targets.is_empty() {
            self.inner.stats.routing_misses.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(user = %user_id, "no open order streams, dropping event");
            return 0;
        }

        let encoded = match encode_payload(payload) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(user = %user_id, "failed to encode broadcast payload: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        for connection in &targets {
            match connection.send(&encoded) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    self.inner.stats.failed_writes.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(user = %user_id, connection = %connection.id(), "write skipped: {}", e);
                }
            }
        }

        self.inner
            .stats
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        tracing::debug!(user = %user_id, delivered, targets = targets.len(), "order event broadcast");

        delivered
    }

    pub fn is_subscribed(&self, user_id: &UserId) -> bool {
        self.inner.users.contains_key(user_id)
    }

    pub fn connection_count(&self, user_id: &UserId) -> usize {
        self.inner.users.get(user_id).map_or(0, |set| set.len())
    }

    pub fn user_count(&self) -> usize {
        self.inner.users.len()
    }

    pub fn total_connections(&self) -> usize {
        self.inner.users.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let stats = &self.inner.stats;
        RegistrySnapshot {
            users: self.user_count(),
            connections: self.total_connections(),
            delivered: stats.delivered.load(Ordering::Relaxed),
            failed_writes: stats.failed_writes.load(Ordering::Relaxed),
            routing_misses: stats.routing_misses.load(Ordering::Relaxed),
        }
    }
}

impl RegistryInner {
    /// Drops `id` from the user's set, pruning the entry once it is empty.
    /// Never touches `owners`, so it is safe while an owner slot is held.
    fn detach(&self, user_id: &UserId, id: ConnectionId) -> bool {
        match self.users.entry(user_id.clone()) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(&id).is_some();
                if entry.get().is_empty() {
                    entry.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    fn remove(&self, user_id: &UserId, id: ConnectionId) {
        if self.detach(user_id, id) {
            self.owners.remove_if(&id, |_, owner| owner == user_id);
            tracing::debug!(user = %user_id, connection = %id, "order stream unsubscribed");
        }
    }
}
