use crate::backend::{AudioBackend, BackendError, EffectHandle, NodeHandle, VoiceHandle};
use loopgrid_shared::{Composition, InstrumentKind, Track};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Topo;
use thiserror::Error;

/// Vertex of the wiring mirror kept next to the live handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphNode {
    Node(NodeHandle),
    Output,
}

/// Live objects for one track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackChain {
    pub voice: VoiceHandle,
    /// Kind the voice was actually built from, after fallback
    pub instrument: InstrumentKind,
    /// (index in the track's effect list, live handle). Skipped effects are absent.
    pub effects: Vec<(usize, EffectHandle)>,
}

#[derive(Debug, Error)]
#[error("failed to wire track {track}: {source}")]
pub struct BuildError {
    pub track: usize,
    #[source]
    pub source: BackendError,
}

/// Every handle that could not be released. Disposal never stops early, so
/// each entry is an individual failure among otherwise released siblings.
#[derive(Debug, Error)]
#[error("{} audio handle(s) failed to release", .failures.len())]
pub struct DisposeError {
    pub failures: Vec<(NodeHandle, BackendError)>,
}

/// The audio objects materialized from one composition: one voice per
/// track, wired voice -> effect 1 -> ... -> output. Immutable once built
/// apart from live parameter updates.
pub struct AudioGraph {
    chains: Vec<TrackChain>,
    topology: DiGraph<GraphNode, ()>,
    output: NodeIndex,
    disposed: bool,
}

impl AudioGraph {
    fn empty() -> Self {
        let mut topology = DiGraph::new();
        let output = topology.add_node(GraphNode::Output);
        Self {
            chains: Vec::new(),
            topology,
            output,
            disposed: false,
        }
    }

    /// Materialize `composition`. Unknown instruments fall back to
    /// `default_instrument`, unknown or rejected effects are left out of the
    /// chain. A wiring failure releases everything created so far.
    pub fn build<B: AudioBackend + ?Sized>(
        backend: &mut B,
        composition: &Composition,
        default_instrument: &InstrumentKind,
    ) -> Result<Self, BuildError> {
        let mut graph = Self::empty();

        for (index, track) in composition.tracks.iter().enumerate() {
            if let Err(source) = graph.build_track(backend, index, track, default_instrument) {
                log::error!("[Graph] Track {} could not be wired: {}", index, source);
                if let Err(e) = graph.dispose(backend) {
                    log::error!("[Graph] Cleanup after failed build: {}", e);
                }
                return Err(BuildError { track: index, source });
            }
        }

        log::info!(
            "[Graph] Built {} voice(s), {} effect(s)",
            graph.voice_count(),
            graph.effect_count()
        );
        Ok(graph)
    }

    fn build_track<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        index: usize,
        track: &Track,
        default_instrument: &InstrumentKind,
    ) -> Result<(), BackendError> {
        let kind = track.instrument.resolve(default_instrument);
        if !track.instrument.is_known() {
            log::warn!(
                "[Graph] Track {}: unknown instrument '{}', using {}",
                index,
                track.instrument,
                kind
            );
        }

        let voice = backend.create_voice(&kind);
        let voice_idx = self.topology.add_node(GraphNode::Node(voice.into()));
        // Registered before wiring so a failed connect still gets disposed
        self.chains.push(TrackChain {
            voice,
            instrument: kind,
            effects: Vec::new(),
        });
        let mut path: Vec<(NodeHandle, NodeIndex)> = vec![(voice.into(), voice_idx)];

        for (fx_index, fx) in track.effects.iter().enumerate() {
            if !fx.kind.is_known() {
                log::warn!("[Graph] Track {}: skipping unknown effect '{}'", index, fx.kind);
                continue;
            }
            match backend.create_effect(&fx.kind, &fx.params) {
                Ok(handle) => {
                    let node_idx = self.topology.add_node(GraphNode::Node(handle.into()));
                    if let Some(chain) = self.chains.last_mut() {
                        chain.effects.push((fx_index, handle));
                    }
                    path.push((handle.into(), node_idx));
                }
                Err(e) => {
                    log::warn!("[Graph] Track {}: skipping {} ({})", index, fx.kind, e);
                }
            }
        }

        for pair in path.windows(2) {
            let (from, from_idx) = pair[0];
            let (to, to_idx) = pair[1];
            backend.connect(from, to)?;
            self.topology.add_edge(from_idx, to_idx, ());
        }
        if let Some(&(last, last_idx)) = path.last() {
            backend.to_output(last)?;
            self.topology.add_edge(last_idx, self.output, ());
        }
        Ok(())
    }

    /// Release every voice and effect. Safe on a partially built graph and
    /// safe to call again; failures are collected, never short-circuited.
    pub fn dispose<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), DisposeError> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        let mut failures = Vec::new();
        let mut released = 0;
        // Sources first: voices go silent before their effects disappear
        let mut topo = Topo::new(&self.topology);
        while let Some(idx) = topo.next(&self.topology) {
            let GraphNode::Node(handle) = self.topology[idx] else {
                continue;
            };
            if let Err(e) = backend.disconnect_all(handle) {
                log::warn!("[Graph] Disconnect {} failed: {}", handle, e);
                failures.push((handle, e));
            }
            match backend.dispose(handle) {
                Ok(()) => released += 1,
                Err(e) => {
                    log::warn!("[Graph] Dispose {} failed: {}", handle, e);
                    failures.push((handle, e));
                }
            }
        }

        self.chains.clear();
        self.topology.clear();
        self.output = self.topology.add_node(GraphNode::Output);

        if failures.is_empty() {
            log::debug!("[Graph] Released {} handle(s)", released);
            Ok(())
        } else {
            let err = DisposeError { failures };
            log::error!("[Graph] {}", err);
            Err(err)
        }
    }

    /// Push a parameter change to a live effect. Returns false when the
    /// effect has no live handle (skipped at build time).
    pub fn set_effect_param<B: AudioBackend + ?Sized>(
        &self,
        backend: &mut B,
        track: usize,
        effect_index: usize,
        name: &str,
        value: f64,
    ) -> Result<bool, BackendError> {
        let handle = self
            .chains
            .get(track)
            .and_then(|chain| chain.effects.iter().find(|(i, _)| *i == effect_index))
            .map(|(_, handle)| *handle);
        match handle {
            Some(handle) => {
                backend.set_effect_param(handle, name, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn chains(&self) -> &[TrackChain] {
        &self.chains
    }

    pub fn chain(&self, track: usize) -> Option<&TrackChain> {
        self.chains.get(track)
    }

    /// Voice per track index
    pub fn voices(&self) -> Vec<VoiceHandle> {
        self.chains.iter().map(|c| c.voice).collect()
    }

    pub fn voice_count(&self) -> usize {
        self.chains.len()
    }

    pub fn effect_count(&self) -> usize {
        self.chains.iter().map(|c| c.effects.len()).sum()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Nodes a track's signal passes through, voice first, ending at the output.
    pub fn signal_path(&self, track: usize) -> Vec<GraphNode> {
        let Some(chain) = self.chains.get(track) else {
            return Vec::new();
        };
        let start = GraphNode::Node(chain.voice.into());
        let mut current = self.topology.node_indices().find(|i| self.topology[*i] == start);
        let mut path = Vec::new();
        while let Some(idx) = current {
            path.push(self.topology[idx]);
            current = self.topology.neighbors(idx).next();
        }
        path
    }
}
