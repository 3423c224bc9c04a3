use std::{collections::BTreeMap, mem, sync::Arc, time::Instant};

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use roomsync_shared::{encode_patch, NodeId, NodeSnapshot};

use crate::{
    config::{RoomConfig, ServerConfig},
    delta::DeltaEngine,
    error::{JoinError, RoomError},
    events::RoomEvents,
    identity::IdentityProvider,
    router::{run_guarded, Dispatched, MessageRouter},
    session::{Session, SessionId, SessionRegistry, SessionState},
    state::StateTree,
    transport::{Outgoing, Transport},
};

use super::{
    lifecycle::{RoomLifecycle, RoomState},
    Clock, RoomContext, RoomLogic,
};

/// Options a client attaches to a join request
pub type JoinOptions = Map<String, Value>;

/// Reads join options into a room's typed options. Keys the type does not
/// declare are ignored; declared keys of the wrong type are refused.
pub fn parse_options<O: DeserializeOwned + Default>(options: &JoinOptions) -> Result<O, JoinError> {
    if options.is_empty() {
        return Ok(O::default());
    }
    serde_json::from_value(Value::Object(options.clone())).map_err(|error| {
        JoinError::InvalidOptions {
            reason: error.to_string(),
        }
    })
}

/// One room: its state, its sessions and the logic that drives both.
///
/// Every entry point runs to completion before the next one starts; a lane
/// owning the room guarantees that by feeding it one command at a time.
pub struct Room<L: RoomLogic> {
    id: String,
    logic: L,
    router: MessageRouter<L>,
    tree: StateTree,
    sessions: SessionRegistry,
    clock: Clock<L>,
    config: RoomConfig,
    identity: Arc<dyn IdentityProvider>,
    lifecycle: RoomLifecycle,
    locked: bool,
    events: RoomEvents,
}

impl<L: RoomLogic> Room<L> {
    pub fn create(
        id: &str,
        logic: L,
        config: &ServerConfig,
        options: &L::Options,
        now: Instant,
    ) -> Result<Self, JoinError> {
        let tree = StateTree::new(L::schema())?;
        let mut router = MessageRouter::new();
        L::register(&mut router);

        let mut room = Self {
            id: id.to_string(),
            logic,
            router,
            tree,
            sessions: SessionRegistry::new(),
            clock: Clock::new(now),
            config: config.room.clone(),
            identity: config.identity.clone(),
            lifecycle: RoomLifecycle::new(now, config.room.idle_dispose_after),
            locked: false,
            events: RoomEvents::new(),
        };

        let outcome = {
            let (logic, _, mut ctx) = room.split();
            run_guarded("onCreate", None, || logic.on_create(&mut ctx, options))
        };
        if let Err(fault) = outcome {
            warn!("Room {}: creation failed: {}", id, fault);
            return Err(JoinError::HandlerFault {
                reason: fault.to_string(),
            });
        }

        info!("Room {}: created", id);
        Ok(room)
    }

    // Public

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lifecycle(&self) -> RoomState {
        self.lifecycle.state()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn logic(&self) -> &L {
        &self.logic
    }

    pub fn state(&self) -> &StateTree {
        &self.tree
    }

    pub fn state_mut(&mut self) -> &mut StateTree {
        &mut self.tree
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn session_state(&self, session: &SessionId) -> Option<SessionState> {
        self.sessions.get(session).map(Session::state)
    }

    /// Joined sessions in join order
    pub fn clients(&self) -> Vec<SessionId> {
        self.sessions.joined()
    }

    pub fn pending_timers(&self) -> usize {
        self.clock.pending()
    }

    /// Returns true if matchmaking may place another client here
    pub fn accepts_joins(&self) -> bool {
        self.lifecycle.state().is_open()
            && !self.locked
            && self.sessions.len() < self.config.max_clients
    }

    pub fn take_events(&mut self) -> RoomEvents {
        mem::replace(&mut self.events, RoomEvents::new())
    }

    /// What a correct mirror for `session` holds right now
    pub fn reachable_snapshot(&self, session: &SessionId) -> Option<BTreeMap<NodeId, NodeSnapshot>> {
        let session = self.sessions.get(session)?;
        let shared = DeltaEngine::shared_reach(&self.tree);
        let reach = DeltaEngine::reach(&self.tree, &shared, session.view());
        Some(DeltaEngine::snapshot(&self.tree, &reach))
    }

    /// Admits a client. On success the session is joined and its first patch
    /// goes out on the next tick.
    pub fn join(
        &mut self,
        token: Option<&str>,
        options: &JoinOptions,
        transport: Box<dyn Transport>,
    ) -> Result<SessionId, JoinError> {
        match self.lifecycle.state() {
            RoomState::Disposing => {
                return Err(JoinError::RoomDisposalRace {
                    room_id: self.id.clone(),
                })
            }
            RoomState::Disposed => {
                return Err(JoinError::RoomDisposed {
                    room_id: self.id.clone(),
                })
            }
            RoomState::Created | RoomState::Active => {}
        }
        if self.locked {
            return Err(JoinError::RoomLocked {
                room_id: self.id.clone(),
            });
        }
        if self.sessions.len() >= self.config.max_clients {
            return Err(JoinError::RoomFull {
                room_id: self.id.clone(),
                max_clients: self.config.max_clients,
            });
        }

        let claims = match self.identity.verify(token) {
            Ok(claims) => claims,
            Err(rejection) => {
                warn!("Room {}: join rejected: {}", self.id, rejection);
                self.events.push_fault(RoomError::AuthRejected {
                    reason: rejection.reason.clone(),
                });
                return Err(JoinError::AuthRejected {
                    reason: rejection.reason,
                });
            }
        };
        let options: L::Options = parse_options(options)?;

        let id = self.sessions.generate_id();
        let mut session = Session::new(id.clone(), claims, transport);
        session.set_state(SessionState::Authenticated);
        self.sessions.insert(session);

        let outcome = {
            let (logic, _, mut ctx) = self.split();
            run_guarded("onJoin", Some(&id), || logic.on_join(&mut ctx, &id, &options))
        };
        if let Err(fault) = outcome {
            warn!("Room {}: join of {} failed: {}", self.id, id, fault);
            self.teardown(&id);
            let reason = fault.to_string();
            self.events.push_fault(fault);
            return Err(JoinError::HandlerFault { reason });
        }

        if let Some(session) = self.sessions.get_mut(&id) {
            session.set_state(SessionState::Joined);
        }
        self.lifecycle.on_join();
        self.events.push_join(&id);
        info!("Room {}: session {} joined", self.id, id);

        self.drop_faulted();
        Ok(id)
    }

    /// Routes one inbound message to its handler
    pub fn dispatch(&mut self, session: &SessionId, name: &str, payload: &Value) {
        let joined = self
            .sessions
            .get(session)
            .is_some_and(|session| session.state().is_joined());
        if !joined {
            warn!(
                "Room {}: dropping '{}' from session {} which is not joined",
                self.id, name, session
            );
            return;
        }

        let outcome = {
            let (logic, router, mut ctx) = self.split();
            router.dispatch(logic, &mut ctx, session, name, payload)
        };
        match outcome {
            Ok(Dispatched::Ignored) => {
                warn!("Room {}: no handler for message '{}'", self.id, name);
            }
            Ok(_) => {}
            Err(fault) => {
                warn!("Room {}: {}", self.id, fault);
                self.events.push_fault(fault);
            }
        }

        self.drop_faulted();
    }

    /// Runs the leave handler and tears the session down. Unknown or
    /// already departing sessions are ignored.
    pub fn leave(&mut self, session: &SessionId, consented: bool) {
        let Some(target) = self.sessions.get_mut(session) else {
            return;
        };
        if !target.set_state(SessionState::Leaving { consented }) {
            return;
        }
        target.discard_outbound();

        let outcome = {
            let (logic, _, mut ctx) = self.split();
            run_guarded("onLeave", Some(session), || {
                logic.on_leave(&mut ctx, session, consented)
            })
        };
        if let Err(fault) = outcome {
            warn!("Room {}: {}", self.id, fault);
            self.events.push_fault(fault);
        }

        self.teardown(session);
        self.events.push_leave(session, consented);
        info!(
            "Room {}: session {} left (consented: {})",
            self.id, session, consented
        );
    }

    /// Makes the next patch for `session` a full resync
    pub fn request_resync(&mut self, session: &SessionId) {
        if let Some(session) = self.sessions.get_mut(session) {
            session.scope.request_resync();
        }
    }

    /// One authoritative cycle: due timers, lifecycle, garbage collection
    /// and a patch for every joined session
    pub fn tick(&mut self, now: Instant) {
        if self.lifecycle.state() == RoomState::Disposed {
            return;
        }
        self.clock.set_now(now);

        self.run_timers();
        self.drop_faulted();

        if self.lifecycle.check(now, self.sessions.len()) {
            self.dispose();
            return;
        }

        self.tree.collect_garbage();
        self.send_patches();
        self.drop_faulted();

        self.tree.advance();
    }

    /// Disposes the room right away, without waiting for the grace period
    pub fn shutdown(&mut self) {
        for session in self.sessions.ids() {
            self.leave(&session, false);
        }
        if self.lifecycle.force_dispose() {
            self.dispose();
        }
    }

    // Private

    fn split(&mut self) -> (&mut L, &mut MessageRouter<L>, RoomContext<'_, L>) {
        let ctx = RoomContext::new(
            &self.id,
            &mut self.tree,
            &mut self.sessions,
            &mut self.clock,
            &self.config,
            &mut self.locked,
        );
        (&mut self.logic, &mut self.router, ctx)
    }

    fn run_timers(&mut self) {
        let horizon = self.clock.horizon();
        while let Some(due) = self.clock.pop_due(horizon) {
            let task = due.task;
            let outcome = {
                let (logic, _, mut ctx) = self.split();
                run_guarded("timer", due.session.as_ref(), || task(logic, &mut ctx))
            };
            if let Err(fault) = outcome {
                warn!("Room {}: timer {:?}: {}", self.id, due.id, fault);
                self.events.push_fault(fault);
            }
        }
    }

    fn send_patches(&mut self) {
        let depth = self.config.outbound_queue_depth;
        let shared = DeltaEngine::shared_reach(&self.tree);
        for id in self.sessions.joined() {
            let Some(session) = self.sessions.get_mut(&id) else {
                continue;
            };
            session.flush_outbound();

            let refreshed = session.view.take_refreshed();
            session.scope.refresh(refreshed);
            let reach = DeltaEngine::reach(&self.tree, &shared, &session.view);
            let patch = DeltaEngine::diff(&self.tree, &reach, &mut session.scope);
            if patch.is_empty() {
                continue;
            }

            match encode_patch(&patch) {
                Ok(bytes) => {
                    debug!(
                        "Room {}: patch {} for {} ({} records, {} bytes)",
                        self.id,
                        patch.version,
                        id,
                        patch.len(),
                        bytes.len()
                    );
                    session.deliver(Outgoing::Patch(bytes), depth);
                }
                Err(error) => {
                    warn!("Room {}: could not encode patch for {}: {}", self.id, id, error);
                    session.scope.request_resync();
                }
            }
        }
    }

    // Forces every session whose transport failed through an abrupt leave
    fn drop_faulted(&mut self) {
        loop {
            let faulted = self.sessions.faulted();
            if faulted.is_empty() {
                return;
            }
            for id in faulted {
                let fault = self
                    .sessions
                    .get_mut(&id)
                    .and_then(|session| session.take_fault());
                if let Some(fault) = fault {
                    warn!("Room {}: {}", self.id, fault);
                    self.events.push_fault(fault);
                }
                let joined = self
                    .sessions
                    .get(&id)
                    .is_some_and(|session| session.state().is_joined());
                if joined {
                    self.leave(&id, false);
                }
            }
        }
    }

    // Releases everything a session holds. The session's player entries,
    // if any, are the leave handler's business.
    fn teardown(&mut self, id: &SessionId) {
        let Some(mut session) = self.sessions.remove(id) else {
            return;
        };
        session.view.clear(&mut self.tree);
        session.discard_outbound();
        let cancelled = self.clock.cancel_session(id);
        if cancelled > 0 {
            debug!("Room {}: dropped {} timer(s) of {}", self.id, cancelled, id);
        }
        session.set_state(SessionState::Left);
    }

    fn dispose(&mut self) {
        let outcome = {
            let (logic, _, mut ctx) = self.split();
            run_guarded("onDispose", None, || {
                logic.on_dispose(&mut ctx);
                Ok(())
            })
        };
        if let Err(fault) = outcome {
            warn!("Room {}: {}", self.id, fault);
            self.events.push_fault(fault);
        }
        self.events.push_disposal();
        info!("Room {}: disposed", self.id);
    }
}
