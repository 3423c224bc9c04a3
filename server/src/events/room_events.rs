use std::{mem, vec::IntoIter};

use crate::{error::RoomError, session::SessionId};

/// What happened in a room since the events were last read
pub struct RoomEvents {
    joins: Vec<SessionId>,
    leaves: Vec<(SessionId, bool)>,
    faults: Vec<RoomError>,
    disposed: bool,
    empty: bool,
}

impl Default for RoomEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomEvents {
    pub(crate) fn new() -> Self {
        Self {
            joins: Vec::new(),
            leaves: Vec::new(),
            faults: Vec::new(),
            disposed: false,
            empty: true,
        }
    }

    // Public

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn read<V: RoomEvent>(&mut self) -> V::Iter {
        V::iter(self)
    }

    pub fn has<V: RoomEvent>(&self) -> bool {
        V::has(self)
    }

    // Crate-public

    pub(crate) fn push_join(&mut self, session: &SessionId) {
        self.joins.push(session.clone());
        self.empty = false;
    }

    pub(crate) fn push_leave(&mut self, session: &SessionId, consented: bool) {
        self.leaves.push((session.clone(), consented));
        self.empty = false;
    }

    pub(crate) fn push_fault(&mut self, error: RoomError) {
        self.faults.push(error);
        self.empty = false;
    }

    pub(crate) fn push_disposal(&mut self) {
        self.disposed = true;
        self.empty = false;
    }

    fn refresh_empty(&mut self) {
        self.empty = self.joins.is_empty()
            && self.leaves.is_empty()
            && self.faults.is_empty()
            && !self.disposed;
    }
}

// Event Trait
pub trait RoomEvent {
    type Iter;

    fn iter(events: &mut RoomEvents) -> Self::Iter;

    fn has(events: &RoomEvents) -> bool;
}

// JoinEvent
pub struct JoinEvent;
impl RoomEvent for JoinEvent {
    type Iter = IntoIter<SessionId>;

    fn iter(events: &mut RoomEvents) -> Self::Iter {
        let list = mem::take(&mut events.joins);
        events.refresh_empty();
        IntoIterator::into_iter(list)
    }

    fn has(events: &RoomEvents) -> bool {
        !events.joins.is_empty()
    }
}

// LeaveEvent
pub struct LeaveEvent;
impl RoomEvent for LeaveEvent {
    type Iter = IntoIter<(SessionId, bool)>;

    fn iter(events: &mut RoomEvents) -> Self::Iter {
        let list = mem::take(&mut events.leaves);
        events.refresh_empty();
        IntoIterator::into_iter(list)
    }

    fn has(events: &RoomEvents) -> bool {
        !events.leaves.is_empty()
    }
}

// FaultEvent
pub struct FaultEvent;
impl RoomEvent for FaultEvent {
    type Iter = IntoIter<RoomError>;

    fn iter(events: &mut RoomEvents) -> Self::Iter {
        let list = mem::take(&mut events.faults);
        events.refresh_empty();
        IntoIterator::into_iter(list)
    }

    fn has(events: &RoomEvents) -> bool {
        !events.faults.is_empty()
    }
}

// DisposeEvent
pub struct DisposeEvent;
impl RoomEvent for DisposeEvent {
    type Iter = IntoIter<()>;

    fn iter(events: &mut RoomEvents) -> Self::Iter {
        let list = if mem::replace(&mut events.disposed, false) {
            vec![()]
        } else {
            Vec::new()
        };
        events.refresh_empty();
        IntoIterator::into_iter(list)
    }

    fn has(events: &RoomEvents) -> bool {
        events.disposed
    }
}
