//! The room: one participant registry plus one message log.
//!
//! A single [`Room`] is constructed at startup and shared, behind an
//! `Arc`, by every request handler and the liveness sweeper. The stores
//! give per-operation atomicity only; the two-step sequences here
//! (register plus join notice, evict plus departure notice) can
//! interleave with concurrent requests and the next sweep cycle.

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ChatError;
use crate::message::{
    Message, MessageId, MessageKind, MessageLog, BROADCAST_TARGET, JOIN_NOTICE, LEAVE_NOTICE,
};
use crate::participant::{Participant, ParticipantStore};

/// Maximum accepted display-name length.
pub const MAX_NAME_LENGTH: usize = 64;

/// Strip control characters and surrounding whitespace from client input.
fn sanitize(input: &str) -> String {
    input.trim().chars().filter(|c| !c.is_control()).collect()
}

/// Validate a sanitized display name.
fn validate_name(name: &str) -> Result<(), ChatError> {
    if name.is_empty() {
        return Err(ChatError::InvalidInput("name cannot be empty"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(ChatError::InvalidInput("name too long"));
    }
    if name == BROADCAST_TARGET {
        return Err(ChatError::InvalidInput("name is reserved"));
    }
    Ok(())
}

/// Sanitize and validate a client-supplied message payload.
fn validate_payload(
    to: &str,
    text: &str,
    kind: MessageKind,
) -> Result<(String, String), ChatError> {
    if !kind.is_postable() {
        return Err(ChatError::InvalidInput("status messages are system generated"));
    }
    let to = sanitize(to);
    let text = sanitize(text);
    if to.is_empty() {
        return Err(ChatError::InvalidInput("recipient cannot be empty"));
    }
    if text.is_empty() {
        return Err(ChatError::InvalidInput("text cannot be empty"));
    }
    Ok((to, text))
}

/// Shared chat state and the operations the API exposes over it.
#[derive(Debug, Default)]
pub struct Room {
    participants: ParticipantStore,
    messages: MessageLog,
}

impl Room {
    /// Create an empty room.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a display name and announce the join to the room.
    ///
    /// Registration and the announcement are separate steps; if the
    /// notice cannot be appended the participant stays registered and
    /// the gap is logged.
    ///
    /// # Errors
    ///
    /// [`ChatError::InvalidInput`] if the name fails validation,
    /// [`ChatError::NameTaken`] if it is already registered.
    pub fn join(&self, raw_name: &str) -> Result<Participant, ChatError> {
        let name = sanitize(raw_name);
        validate_name(&name)?;

        let participant = self.participants.register(&name)?;
        if let Err(error) = self.messages.append(Message::status(&name, JOIN_NOTICE)) {
            warn!(participant = %name, %error, "joined without a room notice");
        }
        Ok(participant)
    }

    /// Everyone currently in the room, in storage order.
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        self.participants.list()
    }

    /// Number of participants currently in the room.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.participants.count()
    }

    /// Refresh a participant's heartbeat.
    ///
    /// # Errors
    ///
    /// [`ChatError::UnknownParticipant`] if the name is not registered.
    pub fn heartbeat(&self, name: &str) -> Result<(), ChatError> {
        self.participants.touch(name)
    }

    /// Post a message from a registered participant.
    ///
    /// # Errors
    ///
    /// [`ChatError::InvalidInput`] for a bad payload or an unregistered
    /// sender. The sender gate reports a validation failure, not a
    /// lookup miss.
    pub fn post_message(
        &self,
        from: &str,
        to: &str,
        text: &str,
        kind: MessageKind,
    ) -> Result<Message, ChatError> {
        let (to, text) = validate_payload(to, text, kind)?;
        if !self.participants.is_registered(from) {
            return Err(ChatError::InvalidInput("sender is not in the room"));
        }
        self.messages.append(Message::new(from, to, text, kind))
    }

    /// Messages visible to `user`, optionally limited to the most
    /// recent `limit`.
    ///
    /// # Errors
    ///
    /// [`ChatError::Storage`] if the log is unavailable.
    pub fn messages_for(&self, user: &str, limit: Option<usize>) -> Result<Vec<Message>, ChatError> {
        self.messages.visible_to(user, limit)
    }

    /// Replace the recipient, text, and kind of a message owned by `editor`.
    ///
    /// # Errors
    ///
    /// Payload and registration rules as in [`Room::post_message`], then
    /// the log's ownership rules.
    pub fn edit_message(
        &self,
        id: MessageId,
        editor: &str,
        to: &str,
        text: &str,
        kind: MessageKind,
    ) -> Result<Message, ChatError> {
        let (to, text) = validate_payload(to, text, kind)?;
        if !self.participants.is_registered(editor) {
            return Err(ChatError::InvalidInput("sender is not in the room"));
        }
        self.messages.edit_owned(id, editor, to, text, kind)
    }

    /// Delete a message owned by `requester`.
    ///
    /// Ownership is checked against the stored record only; the
    /// requester does not need to still be in the room.
    ///
    /// # Errors
    ///
    /// [`ChatError::UnknownMessage`] or [`ChatError::NotOwner`].
    pub fn delete_message(&self, id: MessageId, requester: &str) -> Result<Message, ChatError> {
        self.messages.delete_owned(id, requester)
    }

    /// Names of participants whose heartbeat is older than `timeout`.
    #[must_use]
    pub fn stale_participants(&self, timeout: Duration) -> Vec<String> {
        self.participants.stale(timeout)
    }

    /// Remove a participant and announce the departure.
    ///
    /// Removal and announcement are one unit per participant but not
    /// atomic with each other; a missing announcement is logged. Returns
    /// `false` if the participant was already gone.
    pub fn evict(&self, name: &str) -> bool {
        if self.participants.remove(name).is_none() {
            return false;
        }
        if let Err(error) = self.messages.append(Message::status(name, LEAVE_NOTICE)) {
            warn!(participant = %name, %error, "evicted without a room notice");
        }
        debug!(participant = %name, "evicted idle participant");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_notices(room: &Room, user: &str, text: &str) -> usize {
        room.messages_for(user, None)
            .unwrap()
            .iter()
            .filter(|m| m.kind == MessageKind::Status && m.from == user && m.text == text)
            .count()
    }

    #[test]
    fn test_join_announces_exactly_once() {
        let room = Room::new();
        room.join("ana").unwrap();

        assert_eq!(status_notices(&room, "ana", JOIN_NOTICE), 1);
        assert_eq!(room.participant_count(), 1);
    }

    #[test]
    fn test_join_rejects_bad_names() {
        let room = Room::new();

        assert!(matches!(room.join(""), Err(ChatError::InvalidInput(_))));
        assert!(matches!(room.join("   "), Err(ChatError::InvalidInput(_))));
        assert!(matches!(
            room.join(BROADCAST_TARGET),
            Err(ChatError::InvalidInput(_))
        ));
        let oversized = "a".repeat(MAX_NAME_LENGTH + 1);
        assert!(matches!(
            room.join(&oversized),
            Err(ChatError::InvalidInput(_))
        ));

        // Nothing was registered or announced.
        assert_eq!(room.participant_count(), 0);
        assert!(room.messages_for("ana", None).unwrap().is_empty());
    }

    #[test]
    fn test_join_sanitizes_name() {
        let room = Room::new();
        room.join("  ana\u{7}  ").unwrap();

        let names: Vec<String> = room.participants().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["ana".to_string()]);
    }

    #[test]
    fn test_duplicate_join_conflicts() {
        let room = Room::new();
        room.join("ana").unwrap();

        assert!(matches!(room.join("ana"), Err(ChatError::NameTaken(_))));
        // Only the first join is announced.
        assert_eq!(status_notices(&room, "ana", JOIN_NOTICE), 1);
    }

    #[test]
    fn test_post_requires_registration() {
        let room = Room::new();

        assert!(matches!(
            room.post_message("ghost", "Todos", "oi", MessageKind::Message),
            Err(ChatError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_post_rejects_status_kind() {
        let room = Room::new();
        room.join("ana").unwrap();

        assert!(matches!(
            room.post_message("ana", "Todos", "oi", MessageKind::Status),
            Err(ChatError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_post_rejects_empty_fields() {
        let room = Room::new();
        room.join("ana").unwrap();

        assert!(matches!(
            room.post_message("ana", "", "oi", MessageKind::Message),
            Err(ChatError::InvalidInput(_))
        ));
        assert!(matches!(
            room.post_message("ana", "Todos", "   ", MessageKind::Message),
            Err(ChatError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_private_message_visibility() {
        let room = Room::new();
        room.join("ana").unwrap();
        room.join("bia").unwrap();
        room.join("carla").unwrap();

        room.post_message("ana", "bia", "segredo", MessageKind::PrivateMessage)
            .unwrap();

        let for_bia = room.messages_for("bia", None).unwrap();
        assert!(for_bia.iter().any(|m| m.text == "segredo"));

        let for_carla = room.messages_for("carla", None).unwrap();
        assert!(!for_carla.iter().any(|m| m.text == "segredo"));
    }

    #[test]
    fn test_edit_requires_registration() {
        let room = Room::new();
        room.join("ana").unwrap();
        let stored = room
            .post_message("ana", "Todos", "oi", MessageKind::Message)
            .unwrap();

        assert!(matches!(
            room.edit_message(stored.id, "ghost", "Todos", "oi!", MessageKind::Message),
            Err(ChatError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_delete_skips_registration_check() {
        let room = Room::new();
        room.join("ana").unwrap();
        let stored = room
            .post_message("ana", "Todos", "oi", MessageKind::Message)
            .unwrap();

        // Evicted senders may still delete what they own.
        assert!(room.evict("ana"));
        assert!(room.delete_message(stored.id, "ana").is_ok());
    }

    #[test]
    fn test_evict_announces_exactly_once() {
        let room = Room::new();
        room.join("ana").unwrap();

        assert!(room.evict("ana"));
        assert!(!room.evict("ana"));

        assert_eq!(status_notices(&room, "ana", LEAVE_NOTICE), 1);
        assert_eq!(room.participant_count(), 0);
    }
}
