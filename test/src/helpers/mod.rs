mod room_harness;
mod test_client;

pub use recording_transport::RecordingTransport;
pub use room_harness::RoomHarness;
pub use test_client::TestClient;
