//! Deterministic in-process audio backend.
//!
//! Time only moves when `advance_to` is called, and every request is recorded
//! as a `BackendEvent`, which makes it the backend of choice for tests and
//! the headless runner. Faults can be injected to exercise error paths.

use crate::backend::{AudioBackend, BackendError, CancelToken, EffectHandle, NodeHandle, TickCallback, VoiceHandle, VoiceTrigger};
use crate::transport::NoteValue;
use loopgrid_shared::{EffectKind, EffectParams, InstrumentKind, DEFAULT_TEMPO};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    CreateVoice { voice: VoiceHandle, kind: InstrumentKind },
    CreateEffect { effect: EffectHandle, kind: EffectKind },
    Connect { from: NodeHandle, to: NodeHandle },
    ToOutput(NodeHandle),
    DisconnectAll(NodeHandle),
    SetParam { effect: EffectHandle, name: String, value: f64 },
    Schedule { token: CancelToken, interval: NoteValue, start: f64 },
    Cancel(CancelToken),
    CancelAll,
    SetTempo(f64),
    Dispose(NodeHandle),
    Trigger(TriggerRecord),
}

/// One note the backend was asked to play.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRecord {
    pub voice: VoiceHandle,
    pub instrument: InstrumentKind,
    pub pitch: String,
    pub duration: NoteValue,
    pub time: f64,
}

#[derive(Debug, Clone)]
struct VoiceState {
    kind: InstrumentKind,
    ready_at: f64,
    released: bool,
}

#[derive(Debug, Clone)]
struct EffectState {
    kind: EffectKind,
    params: EffectParams,
    released: bool,
}

/// Trigger surface handed to tick callbacks. Kept apart from the schedule
/// list so a callback can borrow it while the backend walks its schedules.
#[derive(Debug, Default)]
pub struct OfflineVoices {
    voices: HashMap<VoiceHandle, VoiceState>,
    now: f64,
    failing_triggers: HashSet<InstrumentKind>,
    events: Vec<BackendEvent>,
}

impl VoiceTrigger for OfflineVoices {
    fn is_loaded(&self, voice: VoiceHandle) -> bool {
        self.voices
            .get(&voice)
            .is_some_and(|v| !v.released && v.ready_at <= self.now)
    }

    fn trigger(&mut self, voice: VoiceHandle, pitch: &str, duration: NoteValue, time: f64) -> Result<(), BackendError> {
        let state = match self.voices.get(&voice) {
            Some(state) if !state.released => state,
            _ => return Err(BackendError::UnknownHandle(voice.into())),
        };
        if self.failing_triggers.contains(&state.kind) {
            return Err(BackendError::Rejected(format!("{} refused to play {}", state.kind, pitch)));
        }
        let record = TriggerRecord {
            voice,
            instrument: state.kind.clone(),
            pitch: pitch.to_string(),
            duration,
            time,
        };
        self.events.push(BackendEvent::Trigger(record));
        Ok(())
    }
}

struct Repeating {
    token: CancelToken,
    interval: NoteValue,
    start: f64,
    last_fired: Option<f64>,
    callback: TickCallback,
}

impl Repeating {
    // Re-derived on every call so tempo changes reach the pending tick
    fn next_fire(&self, tempo: f64) -> f64 {
        match self.last_fired {
            None => self.start,
            Some(t) => t + self.interval.seconds(tempo),
        }
    }
}

pub struct OfflineBackend {
    voices: OfflineVoices,
    effects: HashMap<EffectHandle, EffectState>,
    schedules: Vec<Repeating>,
    tempo: f64,
    next_id: u64,
    sample_load_time: f64,
    context_locked: bool,
    failing_connections: bool,
    failing_voice_disposal: HashSet<InstrumentKind>,
    failing_effect_disposal: HashSet<EffectKind>,
}

impl Default for OfflineBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self {
            voices: OfflineVoices::default(),
            effects: HashMap::new(),
            schedules: Vec::new(),
            tempo: DEFAULT_TEMPO,
            next_id: 1,
            sample_load_time: 0.0,
            context_locked: false,
            failing_connections: false,
            failing_voice_disposal: HashSet::new(),
            failing_effect_disposal: HashSet::new(),
        }
    }

    // --- Fault injection ---

    /// While locked, scheduling fails as it does before a user gesture.
    pub fn lock_context(&mut self, locked: bool) {
        self.context_locked = locked;
    }

    /// Seconds a sample-backed voice needs before it can sound.
    pub fn set_sample_load_time(&mut self, seconds: f64) {
        self.sample_load_time = seconds.max(0.0);
    }

    pub fn fail_connections(&mut self, fail: bool) {
        self.failing_connections = fail;
    }

    pub fn fail_dispose_for_instrument(&mut self, kind: InstrumentKind) {
        self.failing_voice_disposal.insert(kind);
    }

    pub fn fail_dispose_for_effect(&mut self, kind: EffectKind) {
        self.failing_effect_disposal.insert(kind);
    }

    pub fn fail_trigger_for(&mut self, kind: InstrumentKind) {
        self.voices.failing_triggers.insert(kind);
    }

    // --- Clock ---

    pub fn now(&self) -> f64 {
        self.voices.now
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Run every scheduled callback due at or before `time`, in time order,
    /// then leave the clock at `time`.
    pub fn advance_to(&mut self, time: f64) {
        loop {
            let tempo = self.tempo;
            let due = self
                .schedules
                .iter()
                .enumerate()
                .map(|(i, s)| (i, s.next_fire(tempo)))
                .filter(|(_, at)| *at <= time)
                .min_by(|a, b| a.1.total_cmp(&b.1));
            let Some((index, at)) = due else {
                break;
            };

            self.voices.now = at;
            let schedule = &mut self.schedules[index];
            schedule.last_fired = Some(at);
            (schedule.callback)(at, &mut self.voices);
        }
        if time > self.voices.now {
            self.voices.now = time;
        }
    }

    pub fn advance_by(&mut self, seconds: f64) {
        let target = self.voices.now + seconds;
        self.advance_to(target);
    }

    // --- Inspection ---

    pub fn events(&self) -> &[BackendEvent] {
        &self.voices.events
    }

    pub fn clear_events(&mut self) {
        self.voices.events.clear();
    }

    pub fn triggers(&self) -> Vec<&TriggerRecord> {
        self.voices
            .events
            .iter()
            .filter_map(|e| match e {
                BackendEvent::Trigger(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    pub fn count_events(&self, predicate: impl Fn(&BackendEvent) -> bool) -> usize {
        self.voices.events.iter().filter(|e| predicate(e)).count()
    }

    pub fn voice_create_count(&self) -> usize {
        self.count_events(|e| matches!(e, BackendEvent::CreateVoice { .. }))
    }

    pub fn voice_dispose_count(&self) -> usize {
        self.count_events(|e| matches!(e, BackendEvent::Dispose(NodeHandle::Voice(_))))
    }

    pub fn dispose_count(&self) -> usize {
        self.count_events(|e| matches!(e, BackendEvent::Dispose(_)))
    }

    pub fn live_voice_count(&self) -> usize {
        self.voices.voices.values().filter(|v| !v.released).count()
    }

    pub fn live_effect_count(&self) -> usize {
        self.effects.values().filter(|e| !e.released).count()
    }

    pub fn active_schedules(&self) -> usize {
        self.schedules.len()
    }

    pub fn voice_kind(&self, voice: VoiceHandle) -> Option<InstrumentKind> {
        self.voices.voices.get(&voice).map(|v| v.kind.clone())
    }

    pub fn effect_kind(&self, effect: EffectHandle) -> Option<EffectKind> {
        self.effects.get(&effect).map(|e| e.kind.clone())
    }

    pub fn effect_param(&self, effect: EffectHandle, name: &str) -> Option<f64> {
        self.effects.get(&effect).and_then(|e| e.params.get(name).copied())
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_live(&self, node: NodeHandle) -> Result<(), BackendError> {
        let live = match node {
            NodeHandle::Voice(v) => self.voices.voices.get(&v).is_some_and(|s| !s.released),
            NodeHandle::Effect(e) => self.effects.get(&e).is_some_and(|s| !s.released),
        };
        if live {
            Ok(())
        } else {
            Err(BackendError::UnknownHandle(node))
        }
    }
}

impl VoiceTrigger for OfflineBackend {
    fn is_loaded(&self, voice: VoiceHandle) -> bool {
        self.voices.is_loaded(voice)
    }

    fn trigger(&mut self, voice: VoiceHandle, pitch: &str, duration: NoteValue, time: f64) -> Result<(), BackendError> {
        self.voices.trigger(voice, pitch, duration, time)
    }
}

impl AudioBackend for OfflineBackend {
    fn create_voice(&mut self, kind: &InstrumentKind) -> VoiceHandle {
        let voice = VoiceHandle(self.next_id());
        let ready_at = if kind.is_sample_backed() {
            self.voices.now + self.sample_load_time
        } else {
            self.voices.now
        };
        self.voices.voices.insert(
            voice,
            VoiceState {
                kind: kind.clone(),
                ready_at,
                released: false,
            },
        );
        self.voices.events.push(BackendEvent::CreateVoice { voice, kind: kind.clone() });
        voice
    }

    fn create_effect(&mut self, kind: &EffectKind, params: &EffectParams) -> Result<EffectHandle, BackendError> {
        if !kind.is_known() {
            return Err(BackendError::Rejected(format!("no processor named '{}'", kind)));
        }
        let effect = EffectHandle(self.next_id());
        self.effects.insert(
            effect,
            EffectState {
                kind: kind.clone(),
                params: params.clone(),
                released: false,
            },
        );
        self.voices.events.push(BackendEvent::CreateEffect { effect, kind: kind.clone() });
        Ok(effect)
    }

    fn connect(&mut self, from: NodeHandle, to: NodeHandle) -> Result<(), BackendError> {
        if self.failing_connections {
            return Err(BackendError::Rejected(format!("cannot connect {} to {}", from, to)));
        }
        self.check_live(from)?;
        self.check_live(to)?;
        self.voices.events.push(BackendEvent::Connect { from, to });
        Ok(())
    }

    fn disconnect_all(&mut self, node: NodeHandle) -> Result<(), BackendError> {
        self.voices.events.push(BackendEvent::DisconnectAll(node));
        Ok(())
    }

    fn to_output(&mut self, node: NodeHandle) -> Result<(), BackendError> {
        if self.failing_connections {
            return Err(BackendError::Rejected(format!("cannot route {} to output", node)));
        }
        self.check_live(node)?;
        self.voices.events.push(BackendEvent::ToOutput(node));
        Ok(())
    }

    fn set_effect_param(&mut self, effect: EffectHandle, name: &str, value: f64) -> Result<(), BackendError> {
        match self.effects.get_mut(&effect) {
            Some(state) if !state.released => {
                state.params.insert(name.to_string(), value);
            }
            _ => return Err(BackendError::UnknownHandle(effect.into())),
        }
        self.voices.events.push(BackendEvent::SetParam {
            effect,
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn schedule_repeating(&mut self, interval: NoteValue, callback: TickCallback) -> Result<CancelToken, BackendError> {
        if self.context_locked {
            return Err(BackendError::ContextLocked);
        }
        let token = CancelToken(self.next_id());
        let start = self.voices.now;
        self.schedules.push(Repeating {
            token,
            interval,
            start,
            last_fired: None,
            callback,
        });
        self.voices.events.push(BackendEvent::Schedule { token, interval, start });
        Ok(token)
    }

    fn cancel(&mut self, token: CancelToken) {
        self.schedules.retain(|s| s.token != token);
        self.voices.events.push(BackendEvent::Cancel(token));
    }

    fn cancel_all(&mut self) {
        self.schedules.clear();
        self.voices.events.push(BackendEvent::CancelAll);
    }

    fn set_global_tempo(&mut self, bpm: f64) {
        self.tempo = bpm;
        self.voices.events.push(BackendEvent::SetTempo(bpm));
    }

    fn dispose(&mut self, node: NodeHandle) -> Result<(), BackendError> {
        match node {
            NodeHandle::Voice(v) => {
                let Some(state) = self.voices.voices.get_mut(&v) else {
                    return Err(BackendError::UnknownHandle(node));
                };
                if state.released {
                    return Ok(());
                }
                if self.failing_voice_disposal.contains(&state.kind) {
                    return Err(BackendError::Rejected(format!("{} ({}) would not release", node, state.kind)));
                }
                state.released = true;
            }
            NodeHandle::Effect(e) => {
                let Some(state) = self.effects.get_mut(&e) else {
                    return Err(BackendError::UnknownHandle(node));
                };
                if state.released {
                    return Ok(());
                }
                if self.failing_effect_disposal.contains(&state.kind) {
                    return Err(BackendError::Rejected(format!("{} ({}) would not release", node, state.kind)));
                }
                state.released = true;
            }
        }
        self.voices.events.push(BackendEvent::Dispose(node));
        Ok(())
    }
}
