//! Who is connected and joined to the board.
//!
//! The registry owns the connection-to-user mapping exclusively; no
//! other component retains connection identifiers beyond a single event
//! handler's scope. Presence is ephemeral by design — it has no durable
//! counterpart and is rebuilt from live connections alone.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::RwLock;

use dealboard_proto::presence::{ConnId, PresenceEntry, PresenceStatus};
use dealboard_proto::task::now_ms;

/// Errors produced by presence operations.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PresenceError {
    /// The announced display name was missing or blank.
    #[error("display name must not be blank")]
    InvalidName,
}

#[derive(Default)]
struct PresenceInner {
    users: HashMap<ConnId, PresenceEntry>,
    typing: BTreeSet<String>,
}

/// In-memory registry of joined users, keyed by connection.
#[derive(Default)]
pub struct PresenceRegistry {
    inner: RwLock<PresenceInner>,
}

impl PresenceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a joined user for the given connection.
    ///
    /// A second join on the same connection replaces the entry.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::InvalidName`] when the name is blank.
    pub async fn join(&self, conn_id: ConnId, name: &str) -> Result<(), PresenceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PresenceError::InvalidName);
        }
        let mut inner = self.inner.write().await;
        inner.users.insert(
            conn_id,
            PresenceEntry {
                conn_id,
                name: name.to_string(),
                status: PresenceStatus::Online,
                joined_at: now_ms(),
            },
        );
        Ok(())
    }

    /// Removes the connection's entry, returning it if the user had
    /// joined. Any typing state for the name is cleared with it.
    pub async fn leave(&self, conn_id: ConnId) -> Option<PresenceEntry> {
        let mut inner = self.inner.write().await;
        let entry = inner.users.remove(&conn_id)?;
        inner.typing.remove(&entry.name);
        Some(entry)
    }

    /// Returns a presence snapshot ordered by join time (stable within
    /// a snapshot).
    pub async fn all(&self) -> Vec<PresenceEntry> {
        let inner = self.inner.read().await;
        let mut entries: Vec<PresenceEntry> = inner.users.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.conn_id.as_uuid().cmp(b.conn_id.as_uuid()))
        });
        entries
    }

    /// Returns the display name joined on the given connection.
    pub async fn name_of(&self, conn_id: ConnId) -> Option<String> {
        let inner = self.inner.read().await;
        inner.users.get(&conn_id).map(|e| e.name.clone())
    }

    /// Returns how many users have joined.
    pub async fn count(&self) -> usize {
        self.inner.read().await.users.len()
    }

    /// Marks or unmarks the connection's user as typing, returning the
    /// updated set of typing names. Returns `None` when the connection
    /// never joined.
    pub async fn set_typing(&self, conn_id: ConnId, typing: bool) -> Option<Vec<String>> {
        let mut inner = self.inner.write().await;
        let name = inner.users.get(&conn_id)?.name.clone();
        if typing {
            inner.typing.insert(name);
        } else {
            inner.typing.remove(&name);
        }
        Some(inner.typing.iter().cloned().collect())
    }
}
