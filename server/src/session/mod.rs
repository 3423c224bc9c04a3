mod session;
mod session_id;
mod session_registry;

pub use session::{AuthClaims, Session, SessionState};
pub use session_id::SessionId;
pub use session_registry::SessionRegistry;
