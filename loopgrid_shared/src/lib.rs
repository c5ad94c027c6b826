pub mod composition;
pub mod error;
pub mod kinds;
pub mod params;
pub mod pitch;

pub use composition::{Beat, Composition, EffectInstance, Track};
pub use error::ModelError;
pub use kinds::{EffectKind, InstrumentKind, SampleSource};
pub use params::{EffectParams, ParamRange};
pub use pitch::{Pitch, PitchClass};

/// Tempo used when nothing else is configured (beats per minute)
pub const DEFAULT_TEMPO: f64 = 120.0;
/// Practical tempo range accepted by the transport
pub const MIN_TEMPO: f64 = 60.0;
pub const MAX_TEMPO: f64 = 200.0;

/// Loop length used when nothing else is configured
pub const DEFAULT_BEAT_COUNT: usize = 16;
pub const MIN_BEAT_COUNT: usize = 4;
pub const MAX_BEAT_COUNT: usize = 32;

/// Octave of freshly created beats (C4 = middle C)
pub const DEFAULT_OCTAVE: u8 = 4;
pub const MIN_OCTAVE: u8 = 1;
pub const MAX_OCTAVE: u8 = 6;
