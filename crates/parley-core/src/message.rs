//! Chat events and the append-only log that stores them.
//!
//! The log is shared by request handlers and the liveness sweeper; user
//! messages and system notices land in the same ordered history.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::error::ChatError;

/// A unique message identifier.
pub type MessageId = u64;

/// Reserved recipient meaning "all current participants".
pub const BROADCAST_TARGET: &str = "Todos";

/// Notice text announcing a join.
pub const JOIN_NOTICE: &str = "entra na sala...";

/// Notice text announcing a departure.
pub const LEAVE_NOTICE: &str = "sai da sala...";

/// Atomic counter for ensuring unique IDs even within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique message ID.
fn next_message_id() -> MessageId {
    // Combine timestamp with atomic counter for guaranteed uniqueness
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64;
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    timestamp.wrapping_add(counter)
}

/// What kind of chat event a message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Addressed to the whole room.
    Message,
    /// Addressed to a single participant.
    PrivateMessage,
    /// System-generated join/leave notice.
    Status,
}

impl MessageKind {
    /// Whether clients may post this kind themselves.
    #[must_use]
    pub fn is_postable(self) -> bool {
        !matches!(self, MessageKind::Status)
    }
}

/// A single chat event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique, stable identity assigned at creation.
    pub id: MessageId,
    /// Sender. Fixed at creation; the sole authorization key for edit and delete.
    pub from: String,
    /// Recipient name, or [`BROADCAST_TARGET`].
    pub to: String,
    /// Message body.
    pub text: String,
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Wall-clock creation time, formatted for display.
    pub time: String,
}

impl Message {
    /// Create a message stamped with the current wall-clock time.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        text: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: next_message_id(),
            from: from.into(),
            to: to.into(),
            text: text.into(),
            kind,
            time: Local::now().format("%H:%M:%S").to_string(),
        }
    }

    /// Create a broadcast status notice attributed to `name`.
    #[must_use]
    pub fn status(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, BROADCAST_TARGET, text, MessageKind::Status)
    }

    /// Whether `user` may see this message: its sender, its recipient,
    /// and everyone for broadcast recipients.
    #[must_use]
    pub fn is_visible_to(&self, user: &str) -> bool {
        self.from == user || self.to == user || self.to == BROADCAST_TARGET
    }
}

/// Append-only, queryable log of chat events.
///
/// Backed by an in-memory vector; suitable for a single-process room.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: RwLock<Vec<Message>>,
}

impl MessageLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Check if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a message and return the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Storage`] if the log is unavailable.
    pub fn append(&self, message: Message) -> Result<Message, ChatError> {
        let mut entries = self.write()?;
        entries.push(message.clone());
        debug!(id = message.id, kind = ?message.kind, "message appended");
        Ok(message)
    }

    /// Messages visible to `user`.
    ///
    /// Without a limit, the full visible set in storage order. With
    /// `limit = n`, the last `n` visible messages most recent first; the
    /// two orderings are intentionally distinct.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Storage`] if the log is unavailable.
    pub fn visible_to(&self, user: &str, limit: Option<usize>) -> Result<Vec<Message>, ChatError> {
        let entries = self.read()?;
        let visible = entries.iter().filter(|message| message.is_visible_to(user));
        let messages = match limit {
            None => visible.cloned().collect(),
            Some(count) => {
                let all: Vec<&Message> = visible.collect();
                all.into_iter().rev().take(count).cloned().collect()
            }
        };
        Ok(messages)
    }

    /// Replace the mutable fields of a message owned by `editor`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnknownMessage`] if no message has `id`, or
    /// [`ChatError::NotOwner`] if `editor` did not send it.
    pub fn edit_owned(
        &self,
        id: MessageId,
        editor: &str,
        to: String,
        text: String,
        kind: MessageKind,
    ) -> Result<Message, ChatError> {
        let mut entries = self.write()?;
        let message = entries
            .iter_mut()
            .find(|message| message.id == id)
            .ok_or(ChatError::UnknownMessage(id))?;

        if message.from != editor {
            return Err(ChatError::NotOwner(id));
        }

        message.to = to;
        message.text = text;
        message.kind = kind;
        debug!(id, editor = %editor, "message edited");
        Ok(message.clone())
    }

    /// Remove a message owned by `requester`.
    ///
    /// # Errors
    ///
    /// Same authorization rule as [`MessageLog::edit_owned`].
    pub fn delete_owned(&self, id: MessageId, requester: &str) -> Result<Message, ChatError> {
        let mut entries = self.write()?;
        let index = entries
            .iter()
            .position(|message| message.id == id)
            .ok_or(ChatError::UnknownMessage(id))?;

        if entries[index].from != requester {
            return Err(ChatError::NotOwner(id));
        }

        let removed = entries.remove(index);
        debug!(id, requester = %requester, "message deleted");
        Ok(removed)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Message>>, ChatError> {
        self.entries
            .read()
            .map_err(|_| ChatError::Storage("message log lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Message>>, ChatError> {
        self.entries
            .write()
            .map_err(|_| ChatError::Storage("message log lock poisoned".to_string()))
    }
}
