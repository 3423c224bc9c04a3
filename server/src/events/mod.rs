mod room_events;

pub use room_events::{DisposeEvent, FaultEvent, JoinEvent, LeaveEvent, RoomEvent, RoomEvents};
