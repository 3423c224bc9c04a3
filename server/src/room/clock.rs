use std::{
    fmt,
    time::{Duration, Instant},
};

use crate::{error::HandlerError, session::SessionId};

use super::{RoomContext, RoomLogic};

/// Deferred work that re-enters the room lane
pub type Task<L> =
    Box<dyn FnOnce(&mut L, &mut RoomContext<'_, L>) -> Result<(), HandlerError> + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

pub(crate) struct DueTask<L: RoomLogic> {
    pub id: TimerId,
    pub session: Option<SessionId>,
    pub task: Task<L>,
}

struct Timer<L: RoomLogic> {
    id: TimerId,
    deadline: Instant,
    session: Option<SessionId>,
    task: Task<L>,
}

/// Schedules deferred tasks on the owning room's lane. Tasks only run from
/// the room's tick, never on their own.
pub struct Clock<L: RoomLogic> {
    now: Instant,
    next_id: u64,
    timers: Vec<Timer<L>>,
}

impl<L: RoomLogic> Clock<L> {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            now,
            next_id: 0,
            timers: Vec::new(),
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    /// Runs `task` on the room lane once `delay` has elapsed. A task tied to
    /// a session is dropped if that session leaves first.
    pub fn after<F>(&mut self, delay: Duration, session: Option<SessionId>, task: F) -> TimerId
    where
        F: FnOnce(&mut L, &mut RoomContext<'_, L>) -> Result<(), HandlerError> + Send + 'static,
    {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            deadline: self.now + delay,
            session,
            task: Box::new(task),
        });
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|timer| timer.id != id);
        self.timers.len() != before
    }

    /// Drops every task tied to `session`, returning how many were pending
    pub fn cancel_session(&mut self, session: &SessionId) -> usize {
        let before = self.timers.len();
        self.timers
            .retain(|timer| timer.session.as_ref() != Some(session));
        before - self.timers.len()
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|timer| timer.deadline).min()
    }

    pub(crate) fn set_now(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Identity the next scheduled timer will get. Tasks scheduled while
    /// due tasks run are left for a later tick by comparing against this.
    pub(crate) fn horizon(&self) -> TimerId {
        TimerId(self.next_id)
    }

    /// Removes the earliest due task scheduled before `horizon`, deadline
    /// first and then scheduling order
    pub(crate) fn pop_due(&mut self, horizon: TimerId) -> Option<DueTask<L>> {
        let now = self.now;
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.deadline <= now && timer.id < horizon)
            .min_by_key(|(_, timer)| (timer.deadline, timer.id))
            .map(|(index, _)| index)?;
        let timer = self.timers.remove(index);
        Some(DueTask {
            id: timer.id,
            session: timer.session,
            task: timer.task,
        })
    }
}

impl<L: RoomLogic> fmt::Debug for Clock<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("pending", &self.timers.len())
            .finish()
    }
}
