use serde::de::DeserializeOwned;

use crate::{
    error::HandlerError, router::MessageRouter, session::SessionId, state::Schema,
};

use super::RoomContext;

/// The game-specific part of a room. Every method runs on the room's lane,
/// one at a time.
pub trait RoomLogic: Send + Sized + 'static {
    /// Options clients may pass when creating or joining. Parsed from the
    /// join request; keys the type does not declare are ignored.
    type Options: DeserializeOwned + Default + Send;

    fn schema() -> Schema;

    /// Registers the room's message handlers
    fn register(router: &mut MessageRouter<Self>);

    fn on_create(
        &mut self,
        _ctx: &mut RoomContext<'_, Self>,
        _options: &Self::Options,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    fn on_join(
        &mut self,
        ctx: &mut RoomContext<'_, Self>,
        session: &SessionId,
        options: &Self::Options,
    ) -> Result<(), HandlerError>;

    fn on_leave(
        &mut self,
        _ctx: &mut RoomContext<'_, Self>,
        _session: &SessionId,
        _consented: bool,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    fn on_dispose(&mut self, _ctx: &mut RoomContext<'_, Self>) {}
}
