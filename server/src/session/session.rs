use std::{collections::VecDeque, fmt};

use log::{trace, warn};

use crate::{
    delta::ScopeState,
    error::RoomError,
    transport::{Outgoing, SendError, Transport},
    view::ViewSet,
};

use super::SessionId;

/// Lifecycle of one client connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticated,
    Joined,
    /// `consented` is false when the client vanished without saying goodbye
    Leaving { consented: bool },
    Left,
}

impl SessionState {
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Connecting, SessionState::Authenticated)
                | (SessionState::Connecting, SessionState::Left)
                | (SessionState::Authenticated, SessionState::Joined)
                | (SessionState::Authenticated, SessionState::Left)
                | (SessionState::Joined, SessionState::Leaving { .. })
                | (SessionState::Leaving { .. }, SessionState::Left)
        )
    }

    pub fn is_joined(&self) -> bool {
        matches!(self, SessionState::Joined)
    }
}

/// Result of the identity check a session passed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthClaims {
    Guest,
    Anonymous,
    Named { name: String },
}

impl AuthClaims {
    pub fn display_name(&self) -> &str {
        match self {
            AuthClaims::Guest => "Guest",
            AuthClaims::Anonymous => "Anonymous",
            AuthClaims::Named { name } => name,
        }
    }
}

/// One connected client: who it is, where it is in its lifecycle, what it
/// may see and what its mirror already holds.
pub struct Session {
    id: SessionId,
    claims: AuthClaims,
    state: SessionState,
    pub(crate) view: ViewSet,
    pub(crate) scope: ScopeState,
    outbound: VecDeque<Outgoing>,
    transport: Box<dyn Transport>,
    fault: Option<RoomError>,
}

impl Session {
    pub(crate) fn new(id: SessionId, claims: AuthClaims, transport: Box<dyn Transport>) -> Self {
        Self {
            view: ViewSet::new(id.clone()),
            id,
            claims,
            state: SessionState::Connecting,
            scope: ScopeState::new(),
            outbound: VecDeque::new(),
            transport,
            fault: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn claims(&self) -> &AuthClaims {
        &self.claims
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn view(&self) -> &ViewSet {
        &self.view
    }

    pub fn scope(&self) -> &ScopeState {
        &self.scope
    }

    /// Number of items waiting for the transport to make room
    pub fn queued(&self) -> usize {
        self.outbound.len()
    }

    /// Returns true once the transport overran or closed; the room drops
    /// such sessions as abrupt disconnects
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    pub(crate) fn set_state(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(&next) {
            warn!(
                "Session {}: invalid transition {:?} -> {:?}",
                self.id, self.state, next
            );
            return false;
        }
        trace!("Session {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
        true
    }

    /// Hands an item to the transport, queueing it behind earlier items the
    /// transport could not take yet. A queue deeper than `max_queued` faults
    /// the session.
    pub(crate) fn deliver(&mut self, item: Outgoing, max_queued: usize) {
        if self.fault.is_some() {
            return;
        }
        self.outbound.push_back(item);
        self.flush_outbound();
        if self.fault.is_none() && self.outbound.len() > max_queued {
            self.fault = Some(RoomError::TransportOverrun {
                session: self.id.clone(),
                queued: self.outbound.len(),
            });
        }
    }

    /// Retries queued items in order until the transport pushes back
    pub(crate) fn flush_outbound(&mut self) {
        while let Some(item) = self.outbound.pop_front() {
            match self.transport.try_send(item) {
                Ok(()) => {}
                Err(SendError::Full(item)) => {
                    self.outbound.push_front(item);
                    return;
                }
                Err(SendError::Closed(_)) => {
                    self.outbound.clear();
                    self.fault = Some(RoomError::TransportClosed {
                        session: self.id.clone(),
                    });
                    return;
                }
            }
        }
    }

    pub(crate) fn take_fault(&mut self) -> Option<RoomError> {
        self.fault.take()
    }

    pub(crate) fn discard_outbound(&mut self) {
        self.outbound.clear();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("claims", &self.claims)
            .field("state", &self.state)
            .field("queued", &self.outbound.len())
            .finish()
    }
}
