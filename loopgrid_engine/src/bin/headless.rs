use anyhow::Context;
use clap::Parser;
use crossbeam_channel::unbounded;
use loopgrid_engine::{Engine, EngineCommand, EngineConfig, OfflineBackend};
use loopgrid_shared::{Composition, EffectKind, InstrumentKind, PitchClass};
use std::path::PathBuf;

/// Plays a composition against the offline backend and logs what sounds.
#[derive(Parser, Debug)]
#[command(author, about, long_about = None)]
struct Args {
    /// Composition JSON file. A built-in demo pattern is used when omitted.
    composition: Option<PathBuf>,

    /// Engine config JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tempo in beats per minute
    #[arg(short, long)]
    tempo: Option<f64>,

    /// Loop length in steps; the composition is padded or truncated
    #[arg(short, long)]
    beats: Option<usize>,

    /// Seconds of simulated playback
    #[arg(short, long, default_value = "8.0")]
    seconds: f64,

    /// Seconds sample-backed instruments take to load
    #[arg(long, default_value = "0.0")]
    sample_load: f64,
}

fn demo_composition(beat_count: usize) -> anyhow::Result<Composition> {
    let c = Composition::default()
        .add_track(InstrumentKind::Synth, beat_count, PitchClass::C, 4)?
        .toggle_beat(0, 0)?
        .toggle_beat(0, 2)?
        .set_beat_pitch(0, 2, PitchClass::E)?
        .add_track(InstrumentKind::Bass, beat_count, PitchClass::C, 2)?
        .toggle_beat(1, 0)?
        .add_effect(1, EffectKind::Distortion, EffectKind::Distortion.default_params())?
        .add_effect(1, EffectKind::Reverb, EffectKind::Reverb.default_params())?;
    Ok(c)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            EngineConfig::from_json(&json).with_context(|| format!("parsing {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    let composition = match &args.composition {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            Composition::from_json(&json).with_context(|| format!("parsing {}", path.display()))?
        }
        None => demo_composition(4)?,
    };

    let mut backend = OfflineBackend::new();
    backend.set_sample_load_time(args.sample_load);
    let mut engine = Engine::new(backend, config);
    let steps = engine.step_events();

    let (tx, rx) = unbounded();
    tx.send(EngineCommand::LoadComposition(composition))?;
    if let Some(tempo) = args.tempo {
        tx.send(EngineCommand::SetTempo(tempo))?;
    }
    if let Some(beats) = args.beats {
        tx.send(EngineCommand::SetBeatCount(beats))?;
    }
    tx.send(EngineCommand::Play)?;
    engine.process_commands(&rx);
    anyhow::ensure!(engine.is_playing(), "playback did not start");

    let state = engine.transport();
    log::info!(
        "[Headless] Playing {} track(s) at {} bpm, {} steps, for {}s",
        engine.composition().len(),
        state.tempo,
        state.beat_count,
        args.seconds
    );

    engine.backend_mut().advance_to(args.seconds);
    for step in steps.try_iter() {
        log::debug!("[Headless] step {}", step);
    }
    for t in engine.backend().triggers() {
        log::info!("[Headless] {:>7.3}s  {:<14} {} ({})", t.time, t.instrument.name(), t.pitch, t.duration);
    }

    tx.send(EngineCommand::Stop)?;
    engine.process_commands(&rx);
    log::info!(
        "[Headless] Done: {} note(s), {} live voice(s) left",
        engine.backend().triggers().len(),
        engine.backend().live_voice_count()
    );
    Ok(())
}
