//! # parley-core
//!
//! Participant registry, message log, and liveness sweeping for the
//! Parley chat backend.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Participant** - who is in the room and when they were last heard from
//! - **Message** - chat events and the append-only log that stores them
//! - **Room** - the shared service every request handler operates on
//! - **Sweeper** - periodic eviction of idle participants
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌────────┐     ┌──────────────────┐
//! │ Handlers │────▶│  Room  │────▶│ ParticipantStore │
//! └──────────┘     └────────┘     └──────────────────┘
//!                    ▲    │       ┌──────────────────┐
//!                    │    └──────▶│    MessageLog    │
//!               ┌─────────┐      └──────────────────┘
//!               │ Sweeper │
//!               └─────────┘
//! ```

pub mod error;
pub mod message;
pub mod participant;
pub mod room;
pub mod sweeper;

pub use error::ChatError;
pub use message::{Message, MessageId, MessageKind, MessageLog, BROADCAST_TARGET};
pub use participant::{Participant, ParticipantStore};
pub use room::Room;
pub use sweeper::Sweeper;
