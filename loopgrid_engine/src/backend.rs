//! Capability surface of the audio engine that actually makes sound.
//!
//! The loopgrid engine never synthesizes anything itself. It creates voices
//! and effects, wires them, and schedules a repeating tick through these
//! traits. `offline::OfflineBackend` is the in-process implementation.

use crate::transport::NoteValue;
use loopgrid_shared::{EffectKind, EffectParams, InstrumentKind};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectHandle(pub u64);

/// Returned by `schedule_repeating`. The only way to stop that callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CancelToken(pub u64);

/// Anything that can be wired into a signal chain or disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeHandle {
    Voice(VoiceHandle),
    Effect(EffectHandle),
}

impl From<VoiceHandle> for NodeHandle {
    fn from(value: VoiceHandle) -> Self {
        NodeHandle::Voice(value)
    }
}

impl From<EffectHandle> for NodeHandle {
    fn from(value: EffectHandle) -> Self {
        NodeHandle::Effect(value)
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeHandle::Voice(v) => write!(f, "voice#{}", v.0),
            NodeHandle::Effect(e) => write!(f, "effect#{}", e.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// The audio context has not been unlocked by a user gesture yet.
    #[error("audio context is locked; a user gesture is required")]
    ContextLocked,

    #[error("unknown or released handle {0}")]
    UnknownHandle(NodeHandle),

    #[error("audio engine rejected the request: {0}")]
    Rejected(String),
}

/// The part of the backend a tick is allowed to touch.
pub trait VoiceTrigger {
    /// False while a sample-backed voice is still fetching its assets.
    fn is_loaded(&self, voice: VoiceHandle) -> bool;

    /// Sound `pitch` ("D#4") for `duration`, starting exactly at `time`.
    /// Attack and release are scheduled together.
    fn trigger(&mut self, voice: VoiceHandle, pitch: &str, duration: NoteValue, time: f64) -> Result<(), BackendError>;
}

/// Invoked once per scheduled step with the precise step time.
pub type TickCallback = Box<dyn FnMut(f64, &mut dyn VoiceTrigger) + Send>;

pub trait AudioBackend: VoiceTrigger {
    /// Never fails. Callers resolve unknown kinds before asking.
    fn create_voice(&mut self, kind: &InstrumentKind) -> VoiceHandle;

    fn create_effect(&mut self, kind: &EffectKind, params: &EffectParams) -> Result<EffectHandle, BackendError>;

    fn connect(&mut self, from: NodeHandle, to: NodeHandle) -> Result<(), BackendError>;

    fn disconnect_all(&mut self, node: NodeHandle) -> Result<(), BackendError>;

    /// Route a node to the final output sink.
    fn to_output(&mut self, node: NodeHandle) -> Result<(), BackendError>;

    fn set_effect_param(&mut self, effect: EffectHandle, name: &str, value: f64) -> Result<(), BackendError>;

    /// Fire `callback` every `interval`, starting now. Intervals follow the
    /// global tempo, including changes made after scheduling.
    fn schedule_repeating(&mut self, interval: NoteValue, callback: TickCallback) -> Result<CancelToken, BackendError>;

    fn cancel(&mut self, token: CancelToken);

    /// Drop every pending scheduled event.
    fn cancel_all(&mut self);

    fn set_global_tempo(&mut self, bpm: f64);

    /// Idempotent: releasing an already released handle succeeds.
    fn dispose(&mut self, node: NodeHandle) -> Result<(), BackendError>;
}
