#[cfg(test)]
mod tests {
    use crate::offline::{BackendEvent, OfflineBackend};
    use crate::{Engine, EngineCommand, EngineConfig, EngineError, NodeHandle, NoteValue};
    use crossbeam_channel::unbounded;
    use loopgrid_shared::{Composition, EffectKind, InstrumentKind, PitchClass};

    /// One Synth track: C4 on step 0, E4 on step 2, four steps.
    fn two_note_pattern() -> Composition {
        Composition::default()
            .add_track(InstrumentKind::Synth, 4, PitchClass::C, 4)
            .and_then(|c| c.toggle_beat(0, 0))
            .and_then(|c| c.toggle_beat(0, 2))
            .and_then(|c| c.set_beat_pitch(0, 2, PitchClass::E))
            .unwrap()
    }

    fn tracks(kinds: &[&str], beat_count: usize) -> Composition {
        let mut c = Composition::default();
        for kind in kinds {
            c = c
                .add_track(InstrumentKind::from_name(kind), beat_count, PitchClass::C, 4)
                .unwrap();
        }
        c
    }

    fn engine_with(composition: Composition) -> Engine<OfflineBackend> {
        Engine::with_composition(OfflineBackend::new(), EngineConfig::default(), composition).unwrap()
    }

    fn played(engine: &Engine<OfflineBackend>) -> Vec<(String, f64)> {
        engine
            .backend()
            .triggers()
            .iter()
            .map(|t| (t.pitch.clone(), t.time))
            .collect()
    }

    #[test]
    fn test_two_note_pattern_end_to_end() {
        let mut engine = engine_with(two_note_pattern());
        engine.play().unwrap();
        engine.backend_mut().advance_to(3.9);

        assert_eq!(
            played(&engine),
            vec![
                ("C4".to_string(), 0.0),
                ("E4".to_string(), 1.0),
                ("C4".to_string(), 2.0),
                ("E4".to_string(), 3.0),
            ]
        );
        assert!(engine
            .backend()
            .triggers()
            .iter()
            .all(|t| t.duration == NoteValue::Eighth && t.instrument == InstrumentKind::Synth));
    }

    #[test]
    fn test_stop_twice_equals_stop_once() {
        let mut engine = engine_with(two_note_pattern());
        engine.play().unwrap();
        engine.backend_mut().advance_to(1.2);

        engine.stop().unwrap();
        let once = engine.transport();
        let events = engine.backend().events().len();

        engine.stop().unwrap();
        assert_eq!(engine.transport(), once);
        assert_eq!(engine.backend().events().len(), events);
        assert!(!once.is_playing);
        assert_eq!(once.current_step, 0);
        assert_eq!(engine.backend().live_voice_count(), 0);
        assert_eq!(engine.backend().live_effect_count(), 0);
        assert_eq!(engine.backend().active_schedules(), 0);
    }

    #[test]
    fn test_step_wraps_after_full_cycle() {
        let mut engine = engine_with(tracks(&["Synth"], 16));
        let steps = engine.step_events();
        engine.play().unwrap();

        // 16 ticks: 0.0 .. 7.5
        engine.backend_mut().advance_to(7.9);
        assert_eq!(engine.transport().current_step, 0);
        assert_eq!(steps.try_iter().collect::<Vec<_>>(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_add_track_while_playing_rebuilds_once() {
        let mut engine = engine_with(tracks(&["Synth", "Bass"], 8));
        engine.play().unwrap();
        engine.backend_mut().advance_to(0.6);
        engine.backend_mut().clear_events();

        engine
            .apply(EngineCommand::AddTrack {
                instrument: InstrumentKind::Drum,
                pitch: PitchClass::C,
                octave: 2,
            })
            .unwrap();

        let backend = engine.backend();
        assert_eq!(backend.voice_dispose_count(), 2);
        assert_eq!(backend.voice_create_count(), 3);
        assert_eq!(backend.live_voice_count(), 3);
        assert_eq!(backend.active_schedules(), 1);
        assert!(engine.is_playing());
        assert_eq!(engine.transport().current_step, 0);
    }

    #[test]
    fn test_rapid_edits_never_accumulate_voices() {
        let mut engine = engine_with(tracks(&["Synth", "Bass", "Drum"], 4));
        let mut rng = fastrand::Rng::with_seed(11);

        for _ in 0..50 {
            let command = match rng.usize(0..5) {
                0 => EngineCommand::Play,
                1 => EngineCommand::Stop,
                2 => EngineCommand::ReorderTrack {
                    from: rng.usize(0..4),
                    to: rng.usize(0..4),
                },
                3 => EngineCommand::AddEffect {
                    track_index: rng.usize(0..3),
                    kind: EffectKind::ALL[rng.usize(0..6)].clone(),
                },
                _ => EngineCommand::ToggleBeat {
                    track_index: rng.usize(0..3),
                    beat_index: rng.usize(0..4),
                },
            };
            let _ = engine.apply(command);
            engine.backend_mut().advance_by(0.3);

            let backend = engine.backend();
            if engine.is_playing() {
                let composition = engine.composition();
                let effects: usize = composition.tracks.iter().map(|t| t.effects.len()).sum();
                assert_eq!(backend.live_voice_count(), composition.len());
                assert_eq!(backend.live_effect_count(), effects);
                assert_eq!(backend.active_schedules(), 1);
            } else {
                assert_eq!(backend.live_voice_count(), 0);
                assert_eq!(backend.active_schedules(), 0);
            }
        }
    }

    #[test]
    fn test_locked_context_keeps_transport_stopped() {
        let mut engine = engine_with(two_note_pattern());
        engine.backend_mut().lock_context(true);

        let err = engine.play().unwrap_err();
        assert!(matches!(err, EngineError::Schedule(_)));
        assert!(!engine.is_playing());
        assert_eq!(engine.backend().live_voice_count(), 0);

        engine.backend_mut().lock_context(false);
        engine.play().unwrap();
        assert!(engine.is_playing());
    }

    #[test]
    fn test_tempo_change_is_live() {
        let mut engine = engine_with(tracks(&["Synth"], 4));
        engine.play().unwrap();
        engine.backend_mut().advance_to(0.6);
        engine.backend_mut().clear_events();

        engine.apply(EngineCommand::SetTempo(60.0)).unwrap();
        assert!(engine.is_playing());
        assert_eq!(engine.backend().dispose_count(), 0);
        assert_eq!(engine.backend().tempo(), 60.0);
        assert_eq!(engine.transport().tempo, 60.0);

        // Next tick lands one 60 bpm beat after the last one at 0.5
        let steps = engine.step_events();
        assert_eq!(steps.try_iter().collect::<Vec<_>>(), vec![0, 1]);
        engine.backend_mut().advance_to(1.4);
        assert!(steps.try_recv().is_err());
        engine.backend_mut().advance_to(1.5);
        assert_eq!(steps.try_recv(), Ok(2));
    }

    #[test]
    fn test_param_edit_updates_live_effect() {
        let composition = tracks(&["Synth"], 4)
            .add_effect(0, EffectKind::Reverb, EffectKind::Reverb.default_params())
            .unwrap();
        let mut engine = engine_with(composition);
        engine.play().unwrap();
        engine.backend_mut().clear_events();

        engine
            .apply(EngineCommand::SetEffectParam {
                track_index: 0,
                effect_index: 0,
                name: "wet".to_string(),
                value: 0.9,
            })
            .unwrap();

        let reverb = engine.graph().unwrap().chain(0).unwrap().effects[0].1;
        assert_eq!(engine.backend().effect_param(reverb, "wet"), Some(0.9));
        assert_eq!(engine.backend().dispose_count(), 0);
        assert_eq!(engine.backend().voice_create_count(), 0);
        assert_eq!(engine.composition().tracks[0].effects[0].params["wet"], 0.9);
    }

    #[test]
    fn test_beat_edits_heard_without_rebuild() {
        let mut engine = engine_with(tracks(&["Synth"], 4));
        engine.play().unwrap();
        engine.backend_mut().advance_to(0.1);
        assert!(played(&engine).is_empty());

        engine
            .apply(EngineCommand::ToggleBeat {
                track_index: 0,
                beat_index: 1,
            })
            .unwrap();
        engine
            .apply(EngineCommand::SetBeatOctave {
                track_index: 0,
                beat_index: 1,
                octave: 5,
            })
            .unwrap();
        engine.backend_mut().advance_to(0.6);

        assert_eq!(played(&engine), vec![("C5".to_string(), 0.5)]);
        assert_eq!(engine.backend().dispose_count(), 0);
    }

    #[test]
    fn test_loading_samples_drop_triggers() {
        let mut composition = tracks(&["Piano", "Synth"], 4);
        for step in 0..4 {
            composition = composition.toggle_beat(0, step).unwrap();
        }
        let mut backend = OfflineBackend::new();
        backend.set_sample_load_time(1.2);
        let mut engine = Engine::with_composition(backend, EngineConfig::default(), composition).unwrap();
        let steps = engine.step_events();

        engine.play().unwrap();
        engine.backend_mut().advance_to(2.9);

        let times: Vec<f64> = engine.backend().triggers().iter().map(|t| t.time).collect();
        assert_eq!(times, vec![1.5, 2.0, 2.5]);
        assert_eq!(steps.try_iter().count(), 6);
    }

    #[test]
    fn test_failing_track_does_not_silence_others() {
        let mut composition = tracks(&["Bass", "Synth", "Drum"], 4);
        for track in 0..3 {
            composition = composition.toggle_beat(track, 0).unwrap();
        }
        let mut backend = OfflineBackend::new();
        backend.fail_trigger_for(InstrumentKind::Bass);
        let mut engine = Engine::with_composition(backend, EngineConfig::default(), composition).unwrap();

        engine.play().unwrap();
        engine.backend_mut().advance_to(0.1);

        let instruments: Vec<InstrumentKind> = engine
            .backend()
            .triggers()
            .iter()
            .map(|t| t.instrument.clone())
            .collect();
        assert_eq!(instruments, vec![InstrumentKind::Synth, InstrumentKind::Drum]);
        assert_eq!(engine.transport().current_step, 1);
    }

    #[test]
    fn test_no_tick_after_stop() {
        let mut engine = engine_with(two_note_pattern());
        let steps = engine.step_events();
        engine.play().unwrap();
        engine.backend_mut().advance_to(1.1);
        engine.stop().unwrap();
        let heard = played(&engine).len();
        let _ = steps.try_iter().count();

        engine.backend_mut().advance_to(10.0);
        assert_eq!(played(&engine).len(), heard);
        assert!(steps.try_recv().is_err());
    }

    #[test]
    fn test_dispose_failures_reported_and_rebuild_continues() {
        let mut backend = OfflineBackend::new();
        backend.fail_dispose_for_instrument(InstrumentKind::Bass);
        let mut engine = Engine::with_composition(backend, EngineConfig::default(), tracks(&["Bass", "Synth"], 4)).unwrap();

        engine.play().unwrap();
        let err = engine.stop().unwrap_err();
        match err {
            EngineError::Dispose(e) => {
                assert_eq!(e.failures.len(), 1);
                assert!(matches!(e.failures[0].0, NodeHandle::Voice(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!engine.is_playing());
        assert_eq!(engine.backend().live_voice_count(), 1);

        // The stuck voice does not prevent a fresh session
        engine.play().unwrap();
        assert!(engine.is_playing());
        assert_eq!(engine.graph().map(|g| g.voice_count()), Some(2));
    }

    #[test]
    fn test_beat_count_change_restarts_from_zero() {
        let mut engine = engine_with(tracks(&["Synth"], 4));
        engine.play().unwrap();
        engine.backend_mut().advance_to(0.6);
        assert_eq!(engine.transport().current_step, 2);
        let first = engine.graph().map(|g| g.voices());

        engine.apply(EngineCommand::SetBeatCount(8)).unwrap();
        assert!(engine.is_playing());
        assert_eq!(engine.transport().current_step, 0);
        assert_eq!(engine.transport().beat_count, 8);
        assert_eq!(engine.composition().tracks[0].beats.len(), 8);
        assert_ne!(engine.graph().map(|g| g.voices()), first);
    }

    #[test]
    fn test_unchanged_structure_does_not_restart() {
        let composition = tracks(&["Synth"], 4)
            .add_effect(0, EffectKind::Delay, EffectKind::Delay.default_params())
            .unwrap();
        let mut engine = engine_with(composition);
        engine.play().unwrap();
        engine.backend_mut().clear_events();

        // Duplicate kind and same-index reorder leave the composition as is
        engine
            .apply(EngineCommand::AddEffect {
                track_index: 0,
                kind: EffectKind::Delay,
            })
            .unwrap();
        engine.apply(EngineCommand::ReorderTrack { from: 0, to: 0 }).unwrap();
        engine.apply(EngineCommand::Play).unwrap();

        assert_eq!(engine.backend().dispose_count(), 0);
        assert_eq!(engine.backend().active_schedules(), 1);
    }

    #[test]
    fn test_unknown_kinds_still_play() {
        let composition = tracks(&["Theremin"], 4)
            .add_effect(0, EffectKind::from_name("Flanger"), Default::default())
            .and_then(|c| c.add_effect(0, EffectKind::Reverb, EffectKind::Reverb.default_params()))
            .and_then(|c| c.toggle_beat(0, 0))
            .unwrap();
        let mut engine = engine_with(composition);
        engine.play().unwrap();
        engine.backend_mut().advance_to(0.1);

        let triggers = engine.backend().triggers();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].instrument, InstrumentKind::Synth);
        assert_eq!(engine.backend().live_effect_count(), 1);
        assert_eq!(
            engine
                .backend()
                .count_events(|e| matches!(e, BackendEvent::ToOutput(NodeHandle::Effect(_)))),
            1
        );
    }

    #[test]
    fn test_commands_from_channel() {
        let mut engine = engine_with(tracks(&["Synth"], 4));
        let (tx, rx) = unbounded();
        tx.send(EngineCommand::ToggleBeat {
            track_index: 0,
            beat_index: 0,
        })
        .unwrap();
        tx.send(EngineCommand::RemoveTrack { track_index: 9 }).unwrap();
        tx.send(EngineCommand::Play).unwrap();

        assert_eq!(engine.process_commands(&rx), 3);
        assert!(engine.is_playing());
        engine.backend_mut().advance_to(0.1);
        assert_eq!(played(&engine), vec![("C4".to_string(), 0.0)]);
        assert_eq!(engine.process_commands(&rx), 0);
    }

    #[test]
    fn test_load_with_same_shape_keeps_session() {
        let composition = tracks(&["Synth"], 4);
        let mut engine = engine_with(composition.clone());
        engine.play().unwrap();
        engine.backend_mut().advance_to(0.6);
        let session = engine.graph().map(|g| g.voices());
        engine.backend_mut().clear_events();

        engine
            .apply(EngineCommand::LoadComposition(composition.toggle_beat(0, 3).unwrap()))
            .unwrap();
        assert_eq!(engine.backend().dispose_count(), 0);
        assert_eq!(engine.backend().voice_create_count(), 0);
        assert_eq!(engine.graph().map(|g| g.voices()), session);
        assert_eq!(engine.transport().current_step, 2);

        engine.backend_mut().advance_to(1.6);
        assert_eq!(played(&engine), vec![("C4".to_string(), 1.5)]);
    }

    #[test]
    fn test_load_with_new_params_updates_live_effect() {
        let composition = tracks(&["Synth"], 4)
            .add_effect(0, EffectKind::Reverb, EffectKind::Reverb.default_params())
            .unwrap();
        let mut engine = engine_with(composition.clone());
        engine.play().unwrap();
        engine.backend_mut().clear_events();

        let louder = composition.set_effect_param(0, 0, "wet", 0.9).unwrap();
        engine.apply(EngineCommand::LoadComposition(louder)).unwrap();

        let reverb = engine.graph().unwrap().chain(0).unwrap().effects[0].1;
        assert_eq!(engine.backend().effect_param(reverb, "wet"), Some(0.9));
        assert_eq!(engine.backend().dispose_count(), 0);
    }

    #[test]
    fn test_load_with_new_shape_restarts() {
        let mut engine = engine_with(tracks(&["Synth"], 4));
        engine.play().unwrap();
        engine.backend_mut().clear_events();

        engine
            .apply(EngineCommand::LoadComposition(tracks(&["Synth", "Bass"], 4)))
            .unwrap();
        assert!(engine.is_playing());
        assert_eq!(engine.backend().voice_dispose_count(), 1);
        assert_eq!(engine.backend().voice_create_count(), 2);
    }

    #[test]
    fn test_restart_discards_steps_of_ended_session() {
        let mut engine = engine_with(tracks(&["Synth"], 4));
        let steps = engine.step_events();
        engine.play().unwrap();
        engine.backend_mut().advance_to(1.1);

        engine
            .apply(EngineCommand::AddTrack {
                instrument: InstrumentKind::Drum,
                pitch: PitchClass::C,
                octave: 2,
            })
            .unwrap();
        assert!(steps.try_recv().is_err());

        engine.backend_mut().advance_to(1.2);
        assert_eq!(steps.try_iter().collect::<Vec<_>>(), vec![0]);

        engine.stop().unwrap();
        engine.play().unwrap();
        engine.backend_mut().advance_to(1.3);
        assert_eq!(steps.try_iter().collect::<Vec<_>>(), vec![0]);
    }
}
