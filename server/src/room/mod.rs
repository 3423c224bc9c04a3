mod clock;
mod lifecycle;
mod room;
mod room_context;
mod room_logic;

pub use clock::{Clock, Task, TimerId};
pub use lifecycle::RoomState;
pub use room::{parse_options, JoinOptions, Room};
pub use room_context::RoomContext;
pub use room_logic::RoomLogic;
