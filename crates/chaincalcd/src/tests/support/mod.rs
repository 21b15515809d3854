//! Test harness utilities shared by the server behaviour suites.

mod config_loader;
mod reporter;
mod wire_client;
mod world;

pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use wire_client::{ChunkConnection, ReplyConnection, chunks_for};
pub use world::{TestWorld, world};
