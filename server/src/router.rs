use std::{
    any::Any,
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
};

use serde_json::Value;

use crate::{
    error::{HandlerError, RoomError},
    room::{RoomContext, RoomLogic},
    session::SessionId,
};

pub type Handler<L> = Box<
    dyn FnMut(&mut L, &mut RoomContext<'_, L>, &SessionId, &Value) -> Result<(), HandlerError>
        + Send,
>;

pub type FallbackHandler<L> = Box<
    dyn FnMut(&mut L, &mut RoomContext<'_, L>, &SessionId, &str, &Value) -> Result<(), HandlerError>
        + Send,
>;

/// How an inbound message was routed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatched {
    Handled,
    Fallback,
    /// No handler matched; the message was dropped
    Ignored,
}

/// Maps inbound message names to the room handlers that process them
pub struct MessageRouter<L: RoomLogic> {
    handlers: HashMap<String, Handler<L>>,
    fallback: Option<FallbackHandler<L>>,
}

impl<L: RoomLogic> Default for MessageRouter<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: RoomLogic> MessageRouter<L> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: None,
        }
    }

    /// Registers the handler for `name`, replacing any earlier one
    pub fn register<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: FnMut(&mut L, &mut RoomContext<'_, L>, &SessionId, &Value) -> Result<(), HandlerError>
            + Send
            + 'static,
    {
        self.handlers.insert(name.to_string(), Box::new(handler));

        self
    }

    /// Handles every message no named handler matches
    pub fn on_any<F>(&mut self, handler: F) -> &mut Self
    where
        F: FnMut(&mut L, &mut RoomContext<'_, L>, &SessionId, &str, &Value) -> Result<(), HandlerError>
            + Send
            + 'static,
    {
        self.fallback = Some(Box::new(handler));

        self
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Runs the handler for `name` to completion. Errors and panics are
    /// caught here and returned as [`RoomError::HandlerFault`].
    pub fn dispatch(
        &mut self,
        logic: &mut L,
        ctx: &mut RoomContext<'_, L>,
        session: &SessionId,
        name: &str,
        payload: &Value,
    ) -> Result<Dispatched, RoomError> {
        if let Some(handler) = self.handlers.get_mut(name) {
            run_guarded(name, Some(session), || handler(logic, ctx, session, payload))?;
            return Ok(Dispatched::Handled);
        }
        if let Some(fallback) = self.fallback.as_mut() {
            run_guarded(name, Some(session), || fallback(logic, ctx, session, name, payload))?;
            return Ok(Dispatched::Fallback);
        }
        Ok(Dispatched::Ignored)
    }
}

/// Runs room logic, turning a returned error or a panic into a fault record
pub(crate) fn run_guarded<F>(
    handler: &str,
    session: Option<&SessionId>,
    body: F,
) -> Result<(), RoomError>
where
    F: FnOnce() -> Result<(), HandlerError>,
{
    let fault = |reason: String| RoomError::HandlerFault {
        handler: handler.to_string(),
        session: session.cloned(),
        reason,
    };
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(fault(error.to_string())),
        Err(panic) => Err(fault(panic_reason(panic.as_ref()))),
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", reason)
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        format!("panicked: {}", reason)
    } else {
        "panicked".to_string()
    }
}
