pub mod helpers;
mod pizza_room;

pub use helpers::*;
pub use pizza_room::{child, player_path, PizzaOptions, PizzaRoom, PIZZA_ROOM};
