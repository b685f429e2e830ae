//! Periodic liveness sweeping.
//!
//! The sweeper runs beside the request handlers with no coordination
//! beyond the shared [`Room`]; a heartbeat racing an eviction resolves
//! as last write wins at the store.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::room::Room;

/// Recurring background task that evicts idle participants.
pub struct Sweeper {
    room: Arc<Room>,
    period: Duration,
    stale_after: Duration,
}

impl Sweeper {
    /// Create a sweeper over `room`.
    ///
    /// `stale_after` is expected to be shorter than `period`; a
    /// participant can then outlive its threshold by up to roughly two
    /// periods depending on phase.
    #[must_use]
    pub fn new(room: Arc<Room>, period: Duration, stale_after: Duration) -> Self {
        Self {
            room,
            period,
            stale_after,
        }
    }

    /// Run sweep cycles forever.
    ///
    /// Failures inside a cycle are logged by the room and never stop the
    /// loop; the next cycle retries on its own, with no backoff.
    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The interval's initial tick completes immediately; consume it
        // so the first sweep lands one full period after startup.
        ticker.tick().await;

        info!(period = ?self.period, stale_after = ?self.stale_after, "liveness sweeper started");

        loop {
            ticker.tick().await;
            let evicted = self.sweep_once();
            if !evicted.is_empty() {
                info!(count = evicted.len(), "evicted idle participants");
            }
        }
    }

    /// Run a single sweep cycle and return the names that were evicted.
    ///
    /// Each eviction is its own remove-plus-notice unit; there is no
    /// ordering guarantee among evictions within a cycle.
    pub fn sweep_once(&self) -> Vec<String> {
        let stale = self.room.stale_participants(self.stale_after);
        if stale.is_empty() {
            debug!("sweep found no stale participants");
            return Vec::new();
        }
        stale
            .into_iter()
            .filter(|name| self.room.evict(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageKind, LEAVE_NOTICE};

    fn leave_notices(room: &Room, user: &str) -> usize {
        room.messages_for(user, None)
            .unwrap()
            .iter()
            .filter(|m| m.kind == MessageKind::Status && m.from == user && m.text == LEAVE_NOTICE)
            .count()
    }

    #[test]
    fn test_sweep_evicts_only_stale_participants() {
        let room = Arc::new(Room::new());
        room.join("ana").unwrap();
        room.join("bia").unwrap();

        std::thread::sleep(Duration::from_millis(100));
        // bia heartbeats in time, ana stays silent.
        room.heartbeat("bia").unwrap();

        let sweeper = Sweeper::new(
            Arc::clone(&room),
            Duration::from_secs(15),
            Duration::from_millis(50),
        );
        let evicted = sweeper.sweep_once();

        assert_eq!(evicted, vec!["ana".to_string()]);
        let names: Vec<String> = room.participants().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["bia".to_string()]);
        assert_eq!(leave_notices(&room, "ana"), 1);
        assert_eq!(leave_notices(&room, "bia"), 0);
    }

    #[test]
    fn test_sweep_within_threshold_touches_nothing() {
        let room = Arc::new(Room::new());
        room.join("ana").unwrap();

        let sweeper = Sweeper::new(
            Arc::clone(&room),
            Duration::from_secs(15),
            Duration::from_secs(3600),
        );
        assert!(sweeper.sweep_once().is_empty());
        assert_eq!(room.participant_count(), 1);
        assert_eq!(leave_notices(&room, "ana"), 0);
    }

    #[test]
    fn test_sweep_on_empty_room() {
        let room = Arc::new(Room::new());
        let sweeper = Sweeper::new(room, Duration::from_secs(15), Duration::from_secs(10));
        assert!(sweeper.sweep_once().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_loop_waits_a_full_period() {
        let room = Arc::new(Room::new());
        room.join("ana").unwrap();

        // Zero threshold: anyone is stale by the time a sweep runs.
        let sweeper = Sweeper::new(Arc::clone(&room), Duration::from_secs(15), Duration::ZERO);
        tokio::spawn(sweeper.run());
        tokio::task::yield_now().await;

        // Nothing happens before the first period elapses.
        assert_eq!(room.participant_count(), 1);

        tokio::time::advance(Duration::from_secs(16)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(room.participant_count(), 0);
        assert_eq!(leave_notices(&room, "ana"), 1);
    }
}
