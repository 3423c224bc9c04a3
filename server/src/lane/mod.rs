mod client_session;
mod matchmaker;
mod room_lane;

pub use client_session::{ClientEvent, ClientSession};
pub use matchmaker::Matchmaker;
pub use room_lane::{RoomHandle, RoomLane, RoomStatus};
