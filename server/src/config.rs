use std::{default::Default, fmt, sync::Arc, time::Duration};

use crate::identity::{GuestIdentity, IdentityProvider};

/// Contains Config properties which will be used by each Room
#[derive(Clone, Debug)]
pub struct RoomConfig {
    /// Time between authoritative ticks, each of which may send a patch to
    /// every client
    pub tick_interval: Duration,
    /// Joins beyond this many sessions are refused
    pub max_clients: usize,
    /// How long an empty room waits for a new join before it is disposed
    pub idle_dispose_after: Duration,
    /// Outbound items a session may have waiting on a slow transport before
    /// it is dropped
    pub outbound_queue_depth: usize,
    /// Capacity of the per-session channel lanes create for their clients
    pub channel_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            max_clients: 64,
            idle_dispose_after: Duration::from_secs(2),
            outbound_queue_depth: 64,
            channel_capacity: 32,
        }
    }
}

/// Contains Config properties shared by every room a Matchmaker creates.
/// Passed explicitly; nothing here is process-global.
#[derive(Clone)]
pub struct ServerConfig {
    pub room: RoomConfig,
    /// Verifies the token a client presents when joining
    pub identity: Arc<dyn IdentityProvider>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            room: RoomConfig::default(),
            identity: Arc::new(GuestIdentity),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("room", &self.room)
            .finish_non_exhaustive()
    }
}
