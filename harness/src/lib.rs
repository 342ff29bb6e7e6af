// Export modules for testing
pub mod config;
pub mod event_stream;
pub mod events;
pub mod harness;
pub mod near_client;
pub mod util;
