mod view_scope;
mod view_set;

pub use view_scope::{ViewScopeMut, ViewScopeRef};
pub use view_set::ViewSet;
