use std::time::{Duration, Instant};

use log::trace;

/// Lifecycle of a room
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomState {
    Created,
    Active,
    Disposing,
    Disposed,
}

impl RoomState {
    /// Returns true if the room takes new joins
    pub fn is_open(&self) -> bool {
        matches!(self, RoomState::Created | RoomState::Active)
    }
}

/// Tracks how long a room has been empty and when it has to go
#[derive(Debug)]
pub(crate) struct RoomLifecycle {
    state: RoomState,
    empty_since: Option<Instant>,
    grace: Duration,
}

impl RoomLifecycle {
    pub fn new(now: Instant, grace: Duration) -> Self {
        Self {
            state: RoomState::Created,
            empty_since: Some(now),
            grace,
        }
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn on_join(&mut self) {
        if self.state.is_open() {
            self.set(RoomState::Active);
            self.empty_since = None;
        }
    }

    /// Advances the lifecycle given the current number of sessions. Returns
    /// true exactly once, when the room becomes disposed.
    pub fn check(&mut self, now: Instant, sessions: usize) -> bool {
        if sessions > 0 {
            return false;
        }
        match self.state {
            RoomState::Active => {
                self.empty_since = Some(now);
                self.set(RoomState::Disposing);
            }
            RoomState::Created => {
                let since = *self.empty_since.get_or_insert(now);
                if now.saturating_duration_since(since) >= self.grace {
                    self.set(RoomState::Disposing);
                }
            }
            _ => {}
        }
        if self.state != RoomState::Disposing {
            return false;
        }
        let since = *self.empty_since.get_or_insert(now);
        if now.saturating_duration_since(since) < self.grace {
            return false;
        }
        self.set(RoomState::Disposed);
        true
    }

    /// Skips the grace period, as when every handle to the room is gone
    pub fn force_dispose(&mut self) -> bool {
        if self.state == RoomState::Disposed {
            return false;
        }
        self.set(RoomState::Disposed);
        true
    }

    fn set(&mut self, next: RoomState) {
        if self.state != next {
            trace!("Room lifecycle: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
