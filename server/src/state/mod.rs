mod node;
mod reference_graph;
mod schema;
mod state_tree;

pub use node::Node;
pub use reference_graph::{Holder, ReferenceGraph};
pub use schema::{FieldDef, FieldType, Initializer, Schema, StructDef, Visibility};
pub use state_tree::{IntoPath, StateTree};
