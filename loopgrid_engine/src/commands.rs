use loopgrid_shared::{Composition, EffectKind, InstrumentKind, ModelError, PitchClass};
use serde::{Deserialize, Serialize};

/// Requests from the editor. Model edits go through the pure composition
/// functions; transport requests go to the sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineCommand {
    Play,
    Stop,
    SetTempo(f64),
    SetBeatCount(usize),
    ToggleBeat {
        track_index: usize,
        beat_index: usize,
    },
    SetBeatPitch {
        track_index: usize,
        beat_index: usize,
        pitch: PitchClass,
    },
    SetBeatOctave {
        track_index: usize,
        beat_index: usize,
        octave: u8,
    },
    AddTrack {
        instrument: InstrumentKind,
        pitch: PitchClass,
        octave: u8,
    },
    RemoveTrack {
        track_index: usize,
    },
    ReorderTrack {
        from: usize,
        to: usize,
    },
    /// Added with the kind's default parameters
    AddEffect {
        track_index: usize,
        kind: EffectKind,
    },
    SetEffectParam {
        track_index: usize,
        effect_index: usize,
        name: String,
        value: f64,
    },
    /// Replace the whole composition (loaders, generators)
    LoadComposition(Composition),
}

impl EngineCommand {
    /// Does this change the track list, instrument kinds or effect chains?
    /// Structural changes while playing rebuild the graph. A loaded
    /// composition is judged by its shape instead.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EngineCommand::SetBeatCount(_)
                | EngineCommand::AddTrack { .. }
                | EngineCommand::RemoveTrack { .. }
                | EngineCommand::ReorderTrack { .. }
                | EngineCommand::AddEffect { .. }
        )
    }

    /// Apply a per-track edit to `composition`. `None` for commands that are
    /// not composition edits (transport, loop length, whole replacement).
    pub fn edit(&self, composition: &Composition, beat_count: usize) -> Option<Result<Composition, ModelError>> {
        let result = match self {
            EngineCommand::ToggleBeat { track_index, beat_index } => composition.toggle_beat(*track_index, *beat_index),
            EngineCommand::SetBeatPitch {
                track_index,
                beat_index,
                pitch,
            } => composition.set_beat_pitch(*track_index, *beat_index, *pitch),
            EngineCommand::SetBeatOctave {
                track_index,
                beat_index,
                octave,
            } => composition.set_beat_octave(*track_index, *beat_index, *octave),
            EngineCommand::AddTrack { instrument, pitch, octave } => {
                composition.add_track(instrument.clone(), beat_count, *pitch, *octave)
            }
            EngineCommand::RemoveTrack { track_index } => composition.remove_track(*track_index),
            EngineCommand::ReorderTrack { from, to } => Ok(composition.reorder_track(*from, *to)),
            EngineCommand::AddEffect { track_index, kind } => {
                composition.add_effect(*track_index, kind.clone(), kind.default_params())
            }
            EngineCommand::SetEffectParam {
                track_index,
                effect_index,
                name,
                value,
            } => composition.set_effect_param(*track_index, *effect_index, name, *value),
            EngineCommand::Play
            | EngineCommand::Stop
            | EngineCommand::SetTempo(_)
            | EngineCommand::SetBeatCount(_)
            | EngineCommand::LoadComposition(_) => return None,
        };
        Some(result)
    }
}
