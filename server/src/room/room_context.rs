use std::time::{Duration, Instant};

use log::warn;
use serde_json::Value;

use crate::{
    config::RoomConfig,
    error::HandlerError,
    session::{AuthClaims, SessionId, SessionRegistry, SessionState},
    state::StateTree,
    transport::Outgoing,
    view::{ViewScopeMut, ViewScopeRef},
};

use super::{Clock, RoomLogic, TimerId};

/// Everything room logic may touch while one of its handlers runs
pub struct RoomContext<'r, L: RoomLogic> {
    room_id: &'r str,
    tree: &'r mut StateTree,
    sessions: &'r mut SessionRegistry,
    clock: &'r mut Clock<L>,
    config: &'r RoomConfig,
    locked: &'r mut bool,
}

impl<'r, L: RoomLogic> RoomContext<'r, L> {
    pub(crate) fn new(
        room_id: &'r str,
        tree: &'r mut StateTree,
        sessions: &'r mut SessionRegistry,
        clock: &'r mut Clock<L>,
        config: &'r RoomConfig,
        locked: &'r mut bool,
    ) -> Self {
        Self {
            room_id,
            tree,
            sessions,
            clock,
            config,
            locked,
        }
    }

    pub fn room_id(&self) -> &str {
        self.room_id
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn config(&self) -> &RoomConfig {
        self.config
    }

    // State

    pub fn state(&self) -> &StateTree {
        &*self.tree
    }

    pub fn state_mut(&mut self) -> &mut StateTree {
        &mut *self.tree
    }

    // Views

    pub fn view(&mut self, session: &SessionId) -> Option<ViewScopeMut<'_>> {
        let session = self.sessions.get_mut(session)?;
        Some(ViewScopeMut::new(&mut session.view, &mut *self.tree))
    }

    pub fn view_ref(&self, session: &SessionId) -> Option<ViewScopeRef<'_>> {
        let session = self.sessions.get(session)?;
        Some(ViewScopeRef::new(&session.view))
    }

    // Sessions

    /// Sessions that have joined, in join order
    pub fn clients(&self) -> Vec<SessionId> {
        self.sessions.joined()
    }

    pub fn claims(&self, session: &SessionId) -> Option<&AuthClaims> {
        self.sessions.get(session).map(|session| session.claims())
    }

    // Messages

    /// Sends a message to one session, ordered with the patches it receives
    pub fn send(&mut self, session: &SessionId, name: &str, payload: Value) -> Result<(), HandlerError> {
        let depth = self.config.outbound_queue_depth;
        let Some(target) = self.sessions.get_mut(session) else {
            return Err(HandlerError::UnknownSession {
                session: session.clone(),
            });
        };
        if !is_reachable(target.state()) {
            warn!("Room {}: not sending '{}' to departing session {}", self.room_id, name, session);
            return Ok(());
        }
        target.deliver(message(name, payload), depth);
        Ok(())
    }

    pub fn broadcast(&mut self, name: &str, payload: Value) {
        self.broadcast_filtered(name, payload, None);
    }

    pub fn broadcast_except(&mut self, except: &SessionId, name: &str, payload: Value) {
        self.broadcast_filtered(name, payload, Some(except));
    }

    fn broadcast_filtered(&mut self, name: &str, payload: Value, except: Option<&SessionId>) {
        let depth = self.config.outbound_queue_depth;
        for id in self.sessions.ids() {
            if Some(&id) == except {
                continue;
            }
            if let Some(session) = self.sessions.get_mut(&id) {
                if is_reachable(session.state()) {
                    session.deliver(message(name, payload.clone()), depth);
                }
            }
        }
    }

    // Deferred work

    pub fn clock(&mut self) -> &mut Clock<L> {
        &mut *self.clock
    }

    /// Runs `task` on this room's lane after `delay`. The task is dropped if
    /// `session` leaves first.
    pub fn after<F>(&mut self, delay: Duration, session: Option<SessionId>, task: F) -> TimerId
    where
        F: FnOnce(&mut L, &mut RoomContext<'_, L>) -> Result<(), HandlerError> + Send + 'static,
    {
        self.clock.after(delay, session, task)
    }

    // Locking

    /// Hides the room from matchmaking; existing sessions are unaffected
    pub fn lock(&mut self) {
        *self.locked = true;
    }

    pub fn unlock(&mut self) {
        *self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        *self.locked
    }
}

fn is_reachable(state: SessionState) -> bool {
    matches!(state, SessionState::Authenticated | SessionState::Joined)
}

fn message(name: &str, payload: Value) -> Outgoing {
    Outgoing::Message {
        name: name.to_string(),
        payload,
    }
}
