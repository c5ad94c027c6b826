pub mod backend;
pub mod commands;
pub mod engine; // Engine (lifecycle coordinator) lives here
pub mod graph;
pub mod offline;
pub mod sequencer;
pub mod transport;

#[cfg(test)]
mod tests_lifecycle;

// Re-exports
pub use backend::{AudioBackend, BackendError, CancelToken, EffectHandle, NodeHandle, VoiceHandle, VoiceTrigger};
pub use commands::EngineCommand;
pub use engine::{Engine, EngineConfig, EngineError};
pub use graph::{AudioGraph, DisposeError};
pub use offline::OfflineBackend;
pub use transport::{NoteValue, TransportSettings, TransportState};
