use std::collections::HashMap;

use super::{Session, SessionId, SessionState};

/// The sessions of one room, remembered in join order
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    order: Vec<SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// An identifier no current session uses
    pub fn generate_id(&self) -> SessionId {
        loop {
            let id = SessionId::generate();
            if !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }

    pub(crate) fn insert(&mut self, session: Session) {
        let id = session.id().clone();
        if self.sessions.insert(id.clone(), session).is_none() {
            self.order.push(id);
        }
    }

    pub(crate) fn remove(&mut self, id: &SessionId) -> Option<Session> {
        let session = self.sessions.remove(id)?;
        self.order.retain(|other| other != id);
        Some(session)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Every session in join order
    pub fn ids(&self) -> Vec<SessionId> {
        self.order.clone()
    }

    /// Joined sessions in join order
    pub fn joined(&self) -> Vec<SessionId> {
        self.order
            .iter()
            .filter(|id| {
                self.sessions
                    .get(*id)
                    .is_some_and(|session| session.state() == SessionState::Joined)
            })
            .cloned()
            .collect()
    }

    pub fn joined_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|session| session.state() == SessionState::Joined)
            .count()
    }

    /// Sessions whose transport overran or closed
    pub fn faulted(&self) -> Vec<SessionId> {
        self.order
            .iter()
            .filter(|id| self.sessions.get(*id).is_some_and(Session::is_faulted))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
