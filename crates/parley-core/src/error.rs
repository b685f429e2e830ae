//! Error taxonomy shared across the crate.

use thiserror::Error;

use crate::message::MessageId;

/// Errors produced by room operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Request payload failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Display name is already registered.
    #[error("name already taken: {0}")]
    NameTaken(String),

    /// No participant with this name.
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    /// No message with this id.
    #[error("unknown message: {0}")]
    UnknownMessage(MessageId),

    /// Caller does not own the message.
    #[error("message {0} is not owned by the caller")]
    NotOwner(MessageId),

    /// The backing store is unavailable.
    #[error("storage error: {0}")]
    Storage(String),
}
