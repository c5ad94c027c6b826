//! Transport settings and the snapshot handed to observers
use loopgrid_shared::{DEFAULT_BEAT_COUNT, DEFAULT_TEMPO, MAX_BEAT_COUNT, MAX_TEMPO, MIN_BEAT_COUNT, MIN_TEMPO};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Musical durations, spelled in the audio engine's notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteValue {
    #[serde(rename = "1m")]
    Measure,
    #[serde(rename = "4n")]
    Quarter,
    #[serde(rename = "8n")]
    Eighth,
    #[serde(rename = "16n")]
    Sixteenth,
}

impl NoteValue {
    pub fn notation(&self) -> &'static str {
        match self {
            NoteValue::Measure => "1m",
            NoteValue::Quarter => "4n",
            NoteValue::Eighth => "8n",
            NoteValue::Sixteenth => "16n",
        }
    }

    /// Length in quarter-note beats (4/4)
    pub fn beats(&self) -> f64 {
        match self {
            NoteValue::Measure => 4.0,
            NoteValue::Quarter => 1.0,
            NoteValue::Eighth => 0.5,
            NoteValue::Sixteenth => 0.25,
        }
    }

    pub fn seconds(&self, tempo: f64) -> f64 {
        self.beats() * 60.0 / tempo
    }
}

impl fmt::Display for NoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.notation())
    }
}

/// Tempo and loop length, always inside the practical ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransportSettings {
    tempo: f64,
    beat_count: usize,
}

impl TransportSettings {
    pub fn new(tempo: f64, beat_count: usize) -> Self {
        Self {
            tempo: clamp_tempo(tempo),
            beat_count: clamp_beat_count(beat_count),
        }
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn beat_count(&self) -> usize {
        self.beat_count
    }

    pub fn set_tempo(&mut self, tempo: f64) -> f64 {
        self.tempo = clamp_tempo(tempo);
        self.tempo
    }

    pub fn set_beat_count(&mut self, beat_count: usize) -> usize {
        self.beat_count = clamp_beat_count(beat_count);
        self.beat_count
    }

    /// Seconds between two ticks of `interval`.
    pub fn tick_period(&self, interval: NoteValue) -> f64 {
        interval.seconds(self.tempo)
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPO, DEFAULT_BEAT_COUNT)
    }
}

pub fn clamp_tempo(tempo: f64) -> f64 {
    if tempo.is_nan() {
        return DEFAULT_TEMPO;
    }
    tempo.clamp(MIN_TEMPO, MAX_TEMPO)
}

pub fn clamp_beat_count(beat_count: usize) -> usize {
    beat_count.clamp(MIN_BEAT_COUNT, MAX_BEAT_COUNT)
}

/// Read-only view of the transport for rendering.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TransportState {
    pub is_playing: bool,
    pub tempo: f64,
    pub beat_count: usize,
    /// The step the next tick will play
    pub current_step: usize,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            is_playing: false,
            tempo: DEFAULT_TEMPO,
            beat_count: DEFAULT_BEAT_COUNT,
            current_step: 0,
        }
    }
}
