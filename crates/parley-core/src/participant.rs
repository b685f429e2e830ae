//! Participant registry for Parley.
//!
//! Tracks who is currently in the room and when each participant was
//! last heard from.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::ChatError;

/// A registered chat participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Display name, unique across the room.
    pub name: String,
    /// Last heartbeat. Serialized as epoch milliseconds.
    #[serde(rename = "lastStatus", with = "chrono::serde::ts_milliseconds")]
    pub last_seen: DateTime<Utc>,
}

impl Participant {
    /// Create a participant that was seen just now.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_seen: Utc::now(),
        }
    }

    /// Refresh the heartbeat timestamp.
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    /// Check whether the participant has been silent for longer than `timeout`.
    #[must_use]
    pub fn is_stale(&self, timeout: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.last_seen);
        chrono::Duration::from_std(timeout).is_ok_and(|threshold| age > threshold)
    }
}

/// Registry of everyone currently in the room.
#[derive(Debug, Default)]
pub struct ParticipantStore {
    /// Participants indexed by display name.
    members: DashMap<String, Participant>,
}

impl ParticipantStore {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered participants.
    #[must_use]
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Check whether a name is currently registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Register a new participant with its heartbeat set to now.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NameTaken`] if the name is already registered.
    pub fn register(&self, name: &str) -> Result<Participant, ChatError> {
        match self.members.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ChatError::NameTaken(name.to_string())),
            Entry::Vacant(slot) => {
                let participant = Participant::new(name);
                slot.insert(participant.clone());
                debug!(participant = %name, "registered");
                Ok(participant)
            }
        }
    }

    /// Refresh a participant's heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnknownParticipant`] if the name is not registered.
    pub fn touch(&self, name: &str) -> Result<(), ChatError> {
        match self.members.get_mut(name) {
            Some(mut participant) => {
                participant.touch();
                Ok(())
            }
            None => Err(ChatError::UnknownParticipant(name.to_string())),
        }
    }

    /// Remove a participant. Idempotent.
    ///
    /// Returns the removed entry, if any.
    pub fn remove(&self, name: &str) -> Option<Participant> {
        let removed = self.members.remove(name).map(|(_, participant)| participant);
        if removed.is_some() {
            debug!(participant = %name, "removed");
        }
        removed
    }

    /// Snapshot of all current participants, in storage order.
    #[must_use]
    pub fn list(&self) -> Vec<Participant> {
        self.members.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Names of participants whose heartbeat is older than `timeout`.
    ///
    /// Read-only scan; removal is the caller's decision.
    #[must_use]
    pub fn stale(&self, timeout: Duration) -> Vec<String> {
        self.members
            .iter()
            .filter(|entry| entry.value().is_stale(timeout))
            .map(|entry| entry.key().clone())
            .collect()
    }
}
