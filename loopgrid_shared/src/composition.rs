//! The in-memory composition: tracks, their loops and their effect chains.
//!
//! Every update is a pure function from one `Composition` value to a new one.
//! Nothing here mutates a shared instance, so a reader holding the previous
//! value (the transport, mid-tick) always sees a consistent snapshot.

use crate::error::ModelError;
use crate::kinds::{EffectKind, InstrumentKind};
use crate::params::EffectParams;
use crate::pitch::{Pitch, PitchClass};
use crate::DEFAULT_OCTAVE;
use serde::{Deserialize, Serialize};

/// One step-slot of a loop. Pitch fields are kept while inactive so they come
/// back when the beat is switched on again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beat {
    pub active: bool,
    #[serde(rename = "note")]
    pub pitch_class: PitchClass,
    pub octave: u8,
}

impl Beat {
    pub fn new(active: bool, pitch_class: PitchClass, octave: u8) -> Self {
        Self { active, pitch_class, octave }
    }

    pub fn inactive(pitch_class: PitchClass, octave: u8) -> Self {
        Self::new(false, pitch_class, octave)
    }

    pub fn pitch(&self) -> Pitch {
        Pitch::new(self.pitch_class, self.octave)
    }
}

impl Default for Beat {
    fn default() -> Self {
        Self::inactive(PitchClass::C, DEFAULT_OCTAVE)
    }
}

/// A fresh loop of `beat_count` inactive beats.
pub fn create_loop(beat_count: usize, pitch_class: PitchClass, octave: u8) -> Vec<Beat> {
    vec![Beat::inactive(pitch_class, octave); beat_count]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectInstance {
    #[serde(rename = "type")]
    pub kind: EffectKind,
    pub params: EffectParams,
}

impl EffectInstance {
    pub fn new(kind: EffectKind, params: EffectParams) -> Self {
        Self { kind, params }
    }

    /// Instance carrying the kind's default parameters.
    pub fn with_defaults(kind: EffectKind) -> Self {
        let params = kind.default_params();
        Self { kind, params }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(rename = "name")]
    pub instrument: InstrumentKind,
    #[serde(rename = "loop")]
    pub beats: Vec<Beat>,
    /// Signal-chain order: first entry sits next to the voice
    #[serde(default)]
    pub effects: Vec<EffectInstance>,
}

impl Track {
    pub fn new(instrument: InstrumentKind, beats: Vec<Beat>) -> Self {
        Self { instrument, beats, effects: Vec::new() }
    }

    pub fn has_effect(&self, kind: &EffectKind) -> bool {
        self.effects.iter().any(|fx| &fx.kind == kind)
    }
}

/// Structural fingerprint of one track: what the audio graph is built from.
pub type TrackShape = (InstrumentKind, Vec<EffectKind>);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    /// Playback (and display) order. Identity is the index; names may repeat.
    pub tracks: Vec<Track>,
}

impl Composition {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn track(&self, index: usize) -> Result<&Track, ModelError> {
        self.tracks
            .get(index)
            .ok_or(ModelError::TrackOutOfRange { index, len: self.tracks.len() })
    }

    /// Flip the active flag of one beat.
    pub fn toggle_beat(&self, track: usize, beat: usize) -> Result<Self, ModelError> {
        self.with_beat(track, beat, |b| b.active = !b.active)
    }

    pub fn set_beat_pitch(&self, track: usize, beat: usize, pitch_class: PitchClass) -> Result<Self, ModelError> {
        self.with_beat(track, beat, |b| b.pitch_class = pitch_class)
    }

    pub fn set_beat_octave(&self, track: usize, beat: usize, octave: u8) -> Result<Self, ModelError> {
        self.with_beat(track, beat, |b| b.octave = octave)
    }

    /// Append a track whose loop holds `beat_count` inactive beats.
    pub fn add_track(
        &self,
        instrument: InstrumentKind,
        beat_count: usize,
        default_pitch: PitchClass,
        default_octave: u8,
    ) -> Result<Self, ModelError> {
        if beat_count == 0 {
            return Err(ModelError::EmptyLoop);
        }
        let mut next = self.clone();
        next.tracks.push(Track::new(
            instrument,
            create_loop(beat_count, default_pitch, default_octave),
        ));
        Ok(next)
    }

    pub fn remove_track(&self, index: usize) -> Result<Self, ModelError> {
        self.track(index)?;
        let mut next = self.clone();
        next.tracks.remove(index);
        Ok(next)
    }

    /// Move a track from one position to another, keeping the relative order
    /// of everything else. Equal or out-of-range indices leave the value unchanged.
    pub fn reorder_track(&self, from: usize, to: usize) -> Self {
        let len = self.tracks.len();
        if from == to || from >= len || to >= len {
            return self.clone();
        }
        let mut next = self.clone();
        let moved = next.tracks.remove(from);
        next.tracks.insert(to, moved);
        next
    }

    /// Append an effect to a track's chain. A kind already on the track is not
    /// added twice.
    pub fn add_effect(&self, track: usize, kind: EffectKind, default_params: EffectParams) -> Result<Self, ModelError> {
        if self.track(track)?.has_effect(&kind) {
            return Ok(self.clone());
        }
        let mut next = self.clone();
        next.tracks[track].effects.push(EffectInstance::new(kind, default_params));
        Ok(next)
    }

    /// Replace one parameter value. The value is taken as-is; range clamping
    /// belongs to the editing surface.
    pub fn set_effect_param(&self, track: usize, effect: usize, name: &str, value: f64) -> Result<Self, ModelError> {
        let len = self.track(track)?.effects.len();
        if effect >= len {
            return Err(ModelError::EffectOutOfRange { track, index: effect, len });
        }
        let mut next = self.clone();
        next.tracks[track].effects[effect].params.insert(name.to_string(), value);
        Ok(next)
    }

    /// Truncate or pad every loop to `beat_count`. Padding uses inactive
    /// default beats.
    pub fn resize_loop(&self, beat_count: usize) -> Result<Self, ModelError> {
        if beat_count == 0 {
            return Err(ModelError::EmptyLoop);
        }
        let mut next = self.clone();
        for track in next.tracks.iter_mut() {
            track.beats.resize(beat_count, Beat::default());
        }
        Ok(next)
    }

    /// Check that every loop has exactly `beat_count` beats.
    pub fn validate(&self, beat_count: usize) -> Result<(), ModelError> {
        if beat_count == 0 {
            return Err(ModelError::EmptyLoop);
        }
        for (i, track) in self.tracks.iter().enumerate() {
            if track.beats.len() != beat_count {
                return Err(ModelError::LoopLengthMismatch {
                    track: i,
                    expected: beat_count,
                    actual: track.beats.len(),
                });
            }
        }
        Ok(())
    }

    /// Track list, instrument kinds and effect kinds in order. Two
    /// compositions with the same shape produce the same audio graph.
    pub fn shape(&self) -> Vec<TrackShape> {
        self.tracks
            .iter()
            .map(|t| (t.instrument.clone(), t.effects.iter().map(|fx| fx.kind.clone()).collect()))
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn with_beat(&self, track: usize, beat: usize, edit: impl FnOnce(&mut Beat)) -> Result<Self, ModelError> {
        let len = self.track(track)?.beats.len();
        if beat >= len {
            return Err(ModelError::BeatOutOfRange { track, index: beat, len });
        }
        let mut next = self.clone();
        edit(&mut next.tracks[track].beats[beat]);
        Ok(next)
    }
}
