use crate::backend::{AudioBackend, CancelToken, TickCallback, VoiceHandle, VoiceTrigger};
use crate::graph::{AudioGraph, DisposeError};
use crate::transport::{NoteValue, TransportSettings};
use crate::engine::EngineError;
use arc_swap::ArcSwap;
use crossbeam_channel::Sender;
use loopgrid_shared::{Composition, InstrumentKind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Per-session state owned by the repeating callback.
///
/// Reads one composition snapshot per step, triggers every active beat on
/// the matching track voice, publishes the step and advances the shared
/// counter. Never blocks.
pub struct Ticker {
    session: Uuid,
    live: Arc<AtomicBool>,
    composition: Arc<ArcSwap<Composition>>,
    voices: Vec<VoiceHandle>,
    current_step: Arc<AtomicUsize>,
    beat_count: usize,
    note_duration: NoteValue,
    step_tx: Sender<usize>,
}

impl Ticker {
    pub fn tick(&mut self, time: f64, output: &mut dyn VoiceTrigger) {
        // A tick racing with teardown must not touch released voices
        if !self.live.load(Ordering::Acquire) {
            return;
        }

        let step = self.current_step.load(Ordering::Acquire);
        let composition = self.composition.load();

        for (index, track) in composition.tracks.iter().enumerate() {
            let Some(beat) = track.beats.get(step) else {
                continue;
            };
            if !beat.active {
                continue;
            }
            let Some(&voice) = self.voices.get(index) else {
                continue;
            };
            // Sample-backed voices still loading drop this step silently
            if !output.is_loaded(voice) {
                log::trace!("[Sequencer] Track {} not loaded, step {} dropped", index, step);
                continue;
            }
            let pitch = beat.pitch().to_string();
            if let Err(e) = output.trigger(voice, &pitch, self.note_duration, time) {
                log::warn!(
                    "[Sequencer] Session {}: track {} failed to play {} at step {}: {}",
                    self.session,
                    index,
                    pitch,
                    step,
                    e
                );
            }
        }

        // Observers that fall behind miss steps; the tick never waits
        let _ = self.step_tx.try_send(step);
        self.current_step.store((step + 1) % self.beat_count, Ordering::Release);
    }
}

/// A running playback session: exactly one graph and one tick generator.
struct Session {
    id: Uuid,
    token: CancelToken,
    graph: AudioGraph,
    live: Arc<AtomicBool>,
}

/// Drives real-time playback: Stopped -> start -> Running -> stop -> Stopped.
pub struct Sequencer {
    current_step: Arc<AtomicUsize>,
    session: Option<Session>,
    step_tx: Sender<usize>,
    tick_interval: NoteValue,
    note_duration: NoteValue,
}

impl Sequencer {
    pub fn new(step_tx: Sender<usize>, tick_interval: NoteValue, note_duration: NoteValue) -> Self {
        Self {
            current_step: Arc::new(AtomicUsize::new(0)),
            session: None,
            step_tx,
            tick_interval,
            note_duration,
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// The step the next tick will play
    pub fn current_step(&self) -> usize {
        self.current_step.load(Ordering::Acquire)
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn graph(&self) -> Option<&AudioGraph> {
        self.session.as_ref().map(|s| &s.graph)
    }

    /// Build a fresh graph from the current composition and begin ticking.
    /// Any previous session is torn down first. On failure nothing stays
    /// live and the sequencer is Stopped.
    pub fn start<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        composition: &Arc<ArcSwap<Composition>>,
        settings: TransportSettings,
        default_instrument: &InstrumentKind,
    ) -> Result<Uuid, EngineError> {
        if let Err(e) = self.stop(backend) {
            log::error!("[Sequencer] Previous session left handles behind: {}", e);
        }

        // 1. Reset position
        self.current_step.store(0, Ordering::Release);

        // 2. Materialize the graph from one snapshot
        let snapshot = composition.load_full();
        let mut graph = AudioGraph::build(backend, &snapshot, default_instrument)?;

        // 3. Schedule the tick
        let id = Uuid::new_v4();
        let live = Arc::new(AtomicBool::new(true));
        let mut ticker = Ticker {
            session: id,
            live: live.clone(),
            composition: composition.clone(),
            voices: graph.voices(),
            current_step: self.current_step.clone(),
            beat_count: settings.beat_count().max(1),
            note_duration: self.note_duration,
            step_tx: self.step_tx.clone(),
        };
        let callback: TickCallback = Box::new(move |time: f64, output: &mut dyn VoiceTrigger| ticker.tick(time, output));

        backend.set_global_tempo(settings.tempo());
        let token = match backend.schedule_repeating(self.tick_interval, callback) {
            Ok(token) => token,
            Err(e) => {
                live.store(false, Ordering::Release);
                if let Err(dispose_err) = graph.dispose(backend) {
                    log::error!("[Sequencer] Cleanup after failed start: {}", dispose_err);
                }
                log::error!("[Sequencer] Could not schedule playback: {}", e);
                return Err(EngineError::Schedule(e));
            }
        };

        log::info!(
            "[Sequencer] Session {} running: {} track(s), {} bpm ({:.3}s per step), {} steps",
            id,
            graph.voice_count(),
            settings.tempo(),
            settings.tick_period(self.tick_interval),
            settings.beat_count()
        );
        self.session = Some(Session { id, token, graph, live });
        Ok(id)
    }

    /// Cancel the tick, cancel anything else pending, dispose the graph and
    /// reset the position. A no-op when already Stopped.
    pub fn stop<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), DisposeError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        // Order matters: no tick may fire against a disposed voice
        session.live.store(false, Ordering::Release);
        backend.cancel(session.token);
        backend.cancel_all();
        let result = session.graph.dispose(backend);
        self.current_step.store(0, Ordering::Release);

        log::info!("[Sequencer] Session {} stopped", session.id);
        result
    }

    /// Push a parameter change to the running graph. False when nothing is
    /// running or the effect has no live handle.
    pub fn set_effect_param<B: AudioBackend + ?Sized>(
        &self,
        backend: &mut B,
        track: usize,
        effect_index: usize,
        name: &str,
        value: f64,
    ) -> Result<bool, crate::backend::BackendError> {
        match &self.session {
            Some(session) => session.graph.set_effect_param(backend, track, effect_index, name, value),
            None => Ok(false),
        }
    }
}
