use crate::backend::{AudioBackend, BackendError};
use crate::commands::EngineCommand;
use crate::graph::{AudioGraph, BuildError, DisposeError};
use crate::sequencer::Sequencer;
use crate::transport::{clamp_beat_count, NoteValue, TransportSettings, TransportState};
use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, Receiver};
use loopgrid_shared::composition::create_loop;
use loopgrid_shared::{
    Composition, InstrumentKind, ModelError, PitchClass, Track, DEFAULT_BEAT_COUNT, DEFAULT_OCTAVE, DEFAULT_TEMPO,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Engine tunables. Missing fields in a config file take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Voice used for unrecognized instrument kinds
    pub default_instrument: InstrumentKind,
    /// Spacing of ticks; one tick plays one beat
    pub tick_interval: NoteValue,
    /// Length of every triggered note
    pub note_duration: NoteValue,
    /// Pending step notifications kept for slow observers
    pub step_channel_capacity: usize,
    pub tempo: f64,
    pub beat_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_instrument: InstrumentKind::Synth,
            tick_interval: NoteValue::Quarter,
            note_duration: NoteValue::Eighth,
            step_channel_capacity: 64,
            tempo: DEFAULT_TEMPO,
            beat_count: DEFAULT_BEAT_COUNT,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid composition: {0}")]
    Model(#[from] ModelError),

    /// Playback could not be scheduled; the transport stays Stopped.
    #[error("could not start playback: {0}")]
    Schedule(#[source] BackendError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Dispose(#[from] DisposeError),
}

/// The composition a new session starts with: one default track, all beats off.
pub fn default_composition(config: &EngineConfig) -> Composition {
    let beat_count = clamp_beat_count(config.beat_count);
    Composition::new(vec![Track::new(
        config.default_instrument.clone(),
        create_loop(beat_count, PitchClass::C, DEFAULT_OCTAVE),
    )])
}

/// Owns the composition, the transport settings and the single playback
/// session, and decides when the graph is rebuilt.
///
/// - entering Running always disposes the old graph before building a new one
/// - `stop` tears everything down before returning
/// - structural edits while Running restart; tempo and parameter edits are
///   pushed to the live session
pub struct Engine<B: AudioBackend> {
    backend: B,
    composition: Arc<ArcSwap<Composition>>,
    settings: TransportSettings,
    sequencer: Sequencer,
    step_rx: Receiver<usize>,
    config: EngineConfig,
}

impl<B: AudioBackend> Engine<B> {
    pub fn new(backend: B, config: EngineConfig) -> Self {
        let (step_tx, step_rx) = bounded(config.step_channel_capacity.max(1));
        let sequencer = Sequencer::new(step_tx, config.tick_interval, config.note_duration);
        let settings = TransportSettings::new(config.tempo, config.beat_count);
        let composition = Arc::new(ArcSwap::from_pointee(default_composition(&config)));

        Self {
            backend,
            composition,
            settings,
            sequencer,
            step_rx,
            config,
        }
    }

    pub fn with_composition(backend: B, config: EngineConfig, composition: Composition) -> Result<Self, EngineError> {
        let mut engine = Self::new(backend, config);
        engine.load(composition)?;
        Ok(engine)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend drives the clock, so callers need it mutably to advance time.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn composition(&self) -> Arc<Composition> {
        self.composition.load_full()
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.is_running()
    }

    pub fn transport(&self) -> TransportState {
        TransportState {
            is_playing: self.is_playing(),
            tempo: self.settings.tempo(),
            beat_count: self.settings.beat_count(),
            current_step: self.sequencer.current_step(),
        }
    }

    /// Receives every published step while playing.
    pub fn step_events(&self) -> Receiver<usize> {
        self.step_rx.clone()
    }

    pub fn graph(&self) -> Option<&AudioGraph> {
        self.sequencer.graph()
    }

    /// Start playback from step 0. No-op while already playing.
    pub fn play(&mut self) -> Result<(), EngineError> {
        if self.is_playing() {
            log::debug!("[Engine] Play ignored, already running");
            return Ok(());
        }
        // Model errors must never reach the tick path
        self.composition.load().validate(self.settings.beat_count())?;
        self.sequencer.start(
            &mut self.backend,
            &self.composition,
            self.settings,
            &self.config.default_instrument,
        )?;
        Ok(())
    }

    /// Full teardown. Disposal failures are reported, but the transport is
    /// Stopped either way.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.teardown()?;
        Ok(())
    }

    pub fn apply(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        match command {
            EngineCommand::Play => self.play(),
            EngineCommand::Stop => self.stop(),
            EngineCommand::SetTempo(bpm) => {
                let tempo = self.settings.set_tempo(bpm);
                if self.is_playing() {
                    self.backend.set_global_tempo(tempo);
                }
                log::debug!("[Engine] Tempo {}", tempo);
                Ok(())
            }
            EngineCommand::SetBeatCount(beat_count) => self.set_beat_count(beat_count),
            EngineCommand::LoadComposition(composition) => self.load(composition),
            edit => self.edit(edit),
        }
    }

    /// Drain pending commands without blocking. Returns how many were handled.
    pub fn process_commands(&mut self, rx: &Receiver<EngineCommand>) -> usize {
        let mut handled = 0;
        while let Ok(command) = rx.try_recv() {
            if let Err(e) = self.apply(command) {
                log::error!("[Engine] Command failed: {}", e);
            }
            handled += 1;
        }
        handled
    }

    fn edit(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        let current = self.composition.load_full();
        let Some(result) = command.edit(&current, self.settings.beat_count()) else {
            return Ok(());
        };
        let next = result?;
        if next == *current {
            return Ok(());
        }
        self.composition.store(Arc::new(next));

        if !self.is_playing() {
            return Ok(());
        }
        if command.is_structural() {
            return self.restart();
        }
        if let EngineCommand::SetEffectParam {
            track_index,
            effect_index,
            name,
            value,
        } = &command
        {
            if let Err(e) =
                self.sequencer
                    .set_effect_param(&mut self.backend, *track_index, *effect_index, name, *value)
            {
                log::warn!("[Engine] Live parameter update failed ({}), rebuilding", e);
                return self.restart();
            }
        }
        Ok(())
    }

    fn set_beat_count(&mut self, beat_count: usize) -> Result<(), EngineError> {
        let beat_count = clamp_beat_count(beat_count);
        if beat_count == self.settings.beat_count() {
            return Ok(());
        }
        let resized = self.composition.load().resize_loop(beat_count)?;
        self.composition.store(Arc::new(resized));
        self.settings.set_beat_count(beat_count);
        log::info!("[Engine] Loop length {}", beat_count);

        if self.is_playing() {
            return self.restart();
        }
        Ok(())
    }

    /// Replace the composition. The loop length is taken from its tracks,
    /// which must all agree.
    fn load(&mut self, composition: Composition) -> Result<(), EngineError> {
        let loaded_len = composition
            .tracks
            .first()
            .map(|t| t.beats.len())
            .unwrap_or(self.settings.beat_count());
        composition.validate(loaded_len)?;

        let beat_count = clamp_beat_count(loaded_len);
        let composition = if beat_count != loaded_len {
            log::warn!("[Engine] Loaded loop length {} clamped to {}", loaded_len, beat_count);
            composition.resize_loop(beat_count)?
        } else {
            composition
        };

        let previous = self.composition.load_full();
        let restructured = beat_count != self.settings.beat_count() || previous.shape() != composition.shape();
        log::info!("[Engine] Loaded composition with {} track(s)", composition.len());
        let composition = Arc::new(composition);
        self.composition.store(composition.clone());
        self.settings.set_beat_count(beat_count);

        if !self.is_playing() {
            return Ok(());
        }
        if restructured {
            return self.restart();
        }
        // Same graph shape: beats are read per tick, only parameters need pushing
        if let Err(e) = self.push_changed_params(&previous, &composition) {
            log::warn!("[Engine] Live parameter update failed ({}), rebuilding", e);
            return self.restart();
        }
        Ok(())
    }

    /// Send every effect parameter that differs between two compositions of
    /// the same shape to the running graph.
    fn push_changed_params(&mut self, previous: &Composition, next: &Composition) -> Result<(), BackendError> {
        for (track_index, (old, new)) in previous.tracks.iter().zip(&next.tracks).enumerate() {
            for (effect_index, (old_fx, new_fx)) in old.effects.iter().zip(&new.effects).enumerate() {
                for (name, &value) in &new_fx.params {
                    if old_fx.params.get(name) == Some(&value) {
                        continue;
                    }
                    self.sequencer
                        .set_effect_param(&mut self.backend, track_index, effect_index, name, value)?;
                }
            }
        }
        Ok(())
    }

    // Running -> Stopped -> Running
    fn restart(&mut self) -> Result<(), EngineError> {
        log::info!("[Engine] Structural change while playing, rebuilding");
        if let Err(e) = self.teardown() {
            // Leaked handles must not block the rebuild
            log::error!("[Engine] {}", e);
        }
        self.play()
    }

    // Observers never see steps from a session that has ended
    fn teardown(&mut self) -> Result<(), DisposeError> {
        let result = self.sequencer.stop(&mut self.backend);
        let stale = self.step_rx.try_iter().count();
        if stale > 0 {
            log::debug!("[Engine] Discarded {} pending step(s) of the ended session", stale);
        }
        result
    }
}

impl<B: AudioBackend> Drop for Engine<B> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("[Engine] Teardown on drop: {}", e);
        }
    }
}
