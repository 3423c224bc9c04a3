mod delta_engine;
mod scope_state;

pub use delta_engine::{DeltaEngine, ReachSet};
pub use scope_state::ScopeState;
