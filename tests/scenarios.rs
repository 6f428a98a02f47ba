//! End-to-end scenarios (spec §8) exercised through the public crate
//! API only, plus the determinism and monotone-HP properties.

use chordrush::input_bus::{InputEvent, InputSource};
use chordrush::stage::ChordProgressionElement;
use chordrush::transpose::{RepeatRule, TransposeSettings};
use chordrush::{Event, Mode, NullTransport, Outcome, RhythmCore, StageConfig, VecEventSink};

fn base_stage(mode: Mode) -> StageConfig {
    StageConfig {
        mode,
        bpm: 120.0,
        time_signature: 4,
        measure_count: 4,
        count_in_measures: 0,
        allowed_chords: vec![],
        chord_progression: vec![],
        max_hp: 3,
        enemy_hp: 1,
        enemy_gauge_seconds: 5.0,
        enemy_count: 1,
        min_damage: 1,
        max_damage: 1,
        simultaneous_monster_count: 1,
        play_root_on_correct: false,
        transpose: None,
        combined_stage_ids: vec![],
        combined_sections: vec![],
        is_auftakt: false,
        note_interval_beats: None,
        judgement_window_seconds: None,
        time_limit_seconds: None,
    }
}

fn push_pitch(producer: &chordrush::input_bus::InputProducer, midi: u8, ts_ms: f64) {
    producer.push(InputEvent::PitchDown { midi, ts_ms, source: InputSource::Midi });
}

#[test]
fn s1_single_mode_defeats_monster_and_heals_sp() {
    let mut stage = base_stage(Mode::Single);
    stage.allowed_chords = vec!["Cmaj".into()];

    let transport = NullTransport::new();
    let (mut core, producer) = RhythmCore::start(stage, transport, 1).unwrap();
    let mut sink = VecEventSink::new();

    core.transport_mut().set_position(0.0);
    core.tick(0.0, &mut sink);
    assert!(sink.events.iter().any(|e| matches!(e, Event::MonsterSpawned { slot: 0, .. })));

    core.transport_mut().set_position(0.1);
    push_pitch(&producer, 60, 100.0);
    core.tick(0.1, &mut sink);

    core.transport_mut().set_position(0.2);
    push_pitch(&producer, 64, 200.0);
    core.tick(0.1, &mut sink);

    core.transport_mut().set_position(0.3);
    push_pitch(&producer, 67, 300.0);
    core.tick(0.1, &mut sink);

    assert!(sink.events.iter().any(|e| matches!(e, Event::NoteHit { damage: 1, .. })));
    assert!(sink.events.iter().any(|e| matches!(e, Event::MonsterDefeated { .. })));
    assert!(sink.events.iter().any(|e| matches!(e, Event::SpChanged { sp: 1 })));
    assert!(sink.events.iter().any(|e| matches!(e, Event::MonsterSpawned { slot: 0, .. })));
}

#[test]
fn s2_attack_gauge_damages_player_then_ends_run() {
    let mut stage = base_stage(Mode::Single);
    stage.allowed_chords = vec!["Cmaj".into()];

    let transport = NullTransport::new();
    let (mut core, _producer) = RhythmCore::start(stage, transport, 1).unwrap();
    let mut sink = VecEventSink::new();

    let mut t = 0.0;
    core.transport_mut().set_position(t);
    core.tick(0.0, &mut sink);

    let dt = 1.0 / 120.0;
    for _ in 0..(16 * 120) {
        t += dt;
        core.transport_mut().set_position(t);
        core.tick(dt, &mut sink);
        if core.is_finished() {
            break;
        }
    }

    assert!(sink.events.iter().any(|e| matches!(e, Event::MonsterAttacked { damage: 1, .. })));
    assert!(sink.events.iter().any(|e| matches!(e, Event::PlayerHpChanged { hp: 2 })));
    assert!(sink.events.iter().any(|e| matches!(e, Event::RunEnded { outcome: Outcome::GameOver })));
}

fn s3_stage() -> StageConfig {
    let mut stage = base_stage(Mode::ProgressionTiming);
    stage.measure_count = 2;
    stage.count_in_measures = 1;
    stage.max_hp = 5;
    stage.enemy_hp = 10;
    stage.enemy_count = 0;
    stage.chord_progression = vec![
        ChordProgressionElement::Detailed { bar: 1, beat: 1.0, chord: "Cmaj".into(), lyric_display: None },
        ChordProgressionElement::Detailed { bar: 2, beat: 1.0, chord: "Gmaj".into(), lyric_display: None },
    ];
    stage
}

#[test]
fn s3_progression_timing_hits_due_notes_across_loop_boundary() {
    let stage = s3_stage();
    let transport = NullTransport::new();
    let (mut core, producer) = RhythmCore::start(stage, transport, 1).unwrap();
    let mut sink = VecEventSink::new();

    core.transport_mut().set_position(2.0);
    core.tick(0.01, &mut sink);

    core.transport_mut().set_position(2.05);
    push_pitch(&producer, 60, 0.0);
    push_pitch(&producer, 64, 0.0);
    push_pitch(&producer, 67, 0.0);
    core.tick(0.05, &mut sink);

    assert!(sink.events.iter().any(|e| matches!(e, Event::NoteHit { .. })));

    core.transport_mut().set_position(4.05);
    push_pitch(&producer, 67, 0.0);
    push_pitch(&producer, 71, 0.0);
    push_pitch(&producer, 62, 0.0);
    core.tick(0.05, &mut sink);

    let hits = sink.events.iter().filter(|e| matches!(e, Event::NoteHit { .. })).count();
    assert_eq!(hits, 2);

    core.transport_mut().set_position(6.0);
    core.tick(0.01, &mut sink);
    assert!(sink.events.iter().any(|e| matches!(e, Event::LoopBoundaryCrossed { new_cycle: 1, .. })));
}

#[test]
fn s4_per_loop_transpose_rejects_untransposed_chord_then_hits_transposed() {
    let mut stage = s3_stage();
    stage.transpose = Some(TransposeSettings { initial_key_offset: 0, repeat_rule: RepeatRule::PlusOneSemitone });

    let transport = NullTransport::new();
    let (mut core, producer) = RhythmCore::start(stage, transport, 1).unwrap();
    let mut sink = VecEventSink::new();

    core.transport_mut().set_position(2.0);
    core.tick(0.01, &mut sink);

    // Cross into loop cycle 1: Cmaj -> C#maj.
    core.transport_mut().set_position(6.0);
    core.tick(4.0, &mut sink);
    assert!(sink.events.iter().any(|e| matches!(e, Event::LoopBoundaryCrossed { new_cycle: 1, .. })));
    sink.drain();

    // Untransposed C+E+G no longer matches C#maj's target set.
    core.transport_mut().set_position(6.05);
    push_pitch(&producer, 60, 0.0);
    push_pitch(&producer, 64, 1.0);
    push_pitch(&producer, 67, 2.0);
    core.tick(0.05, &mut sink);
    assert!(!sink.events.iter().any(|e| matches!(e, Event::NoteHit { .. })));

    // C#+F+G# matches the transposed target set.
    core.transport_mut().set_position(6.10);
    push_pitch(&producer, 61, 3.0);
    push_pitch(&producer, 65, 4.0);
    push_pitch(&producer, 68, 5.0);
    core.tick(0.05, &mut sink);
    assert_eq!(sink.events.iter().filter(|e| matches!(e, Event::NoteHit { .. })).count(), 1);
}

#[test]
fn s5_multi_monster_lowest_slot_wins_shared_pitch_class() {
    let mut stage = base_stage(Mode::ProgressionOrdered);
    stage.simultaneous_monster_count = 3;
    stage.allowed_chords = vec!["Cmaj".into(), "Fmaj".into(), "Gmaj".into()];
    stage.enemy_hp = 10;
    stage.enemy_count = 0;

    let transport = NullTransport::new();
    let (mut core, producer) = RhythmCore::start(stage, transport, 1).unwrap();
    let mut sink = VecEventSink::new();

    core.transport_mut().set_position(0.0);
    core.tick(0.0, &mut sink);
    let spawned: Vec<(u32, String)> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            Event::MonsterSpawned { slot, chord, .. } => Some((*slot, chord.id.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(spawned.len(), 3);
    assert_eq!(spawned[0], (0, "Cmaj".into()));
    assert_eq!(spawned[1], (1, "Fmaj".into()));
    assert_eq!(spawned[2], (2, "Gmaj".into()));
    sink.drain();

    // F, A, C: F and A only belong to Fmaj; the shared pitch class C
    // goes to the lowest slot whose target set contains it (Cmaj).
    core.transport_mut().set_position(0.5);
    push_pitch(&producer, 65, 0.0); // F
    push_pitch(&producer, 69, 1.0); // A
    push_pitch(&producer, 60, 2.0); // C
    core.tick(0.5, &mut sink);
    assert!(!sink.events.iter().any(|e| matches!(e, Event::NoteHit { .. })));

    // E, G complete Cmaj (C already accepted) without touching Fmaj.
    core.transport_mut().set_position(0.6);
    push_pitch(&producer, 64, 0.0); // E
    push_pitch(&producer, 67, 1.0); // G
    core.tick(0.1, &mut sink);

    let hits: Vec<_> = sink.events.iter().filter(|e| matches!(e, Event::NoteHit { .. })).collect();
    assert_eq!(hits.len(), 1);
}

#[test]
fn s6_timing_combined_section_swap() {
    let mut section0 = base_stage(Mode::ProgressionTiming);
    section0.bpm = 120.0;
    section0.measure_count = 1;
    section0.count_in_measures = 0;
    section0.chord_progression =
        vec![ChordProgressionElement::Detailed { bar: 1, beat: 1.0, chord: "Cmaj".into(), lyric_display: None }];

    let mut section1 = base_stage(Mode::ProgressionTiming);
    section1.bpm = 140.0;
    section1.measure_count = 1;
    section1.count_in_measures = 0;
    section1.chord_progression =
        vec![ChordProgressionElement::Detailed { bar: 1, beat: 1.0, chord: "Gmaj".into(), lyric_display: None }];

    let mut stage = base_stage(Mode::TimingCombined);
    stage.enemy_hp = 10;
    stage.enemy_count = 0;
    stage.combined_sections = vec![section0.clone(), section1.clone()];

    let transport = NullTransport::new();
    let (mut core, producer) = RhythmCore::start(stage, transport, 1).unwrap();
    let mut sink = VecEventSink::new();

    core.transport_mut().set_position(0.0);
    core.tick(0.0, &mut sink);

    // Note 0 (Cmaj) is due at t=0 within section 0.
    push_pitch(&producer, 60, 0.0);
    push_pitch(&producer, 64, 1.0);
    push_pitch(&producer, 67, 2.0);
    core.tick(0.01, &mut sink);
    assert!(sink.events.iter().any(|e| matches!(e, Event::NoteHit { .. })));
    sink.drain();

    // Advance past section 0's duration (2s at 120bpm/4-4) into section 1;
    // the combined loop only wraps (and fires LoopBoundaryCrossed) once the
    // whole concatenated sequence of both sections has elapsed, not at
    // each individual section edge (see DESIGN.md).
    let section0_duration = section0.loop_duration();
    core.transport_mut().set_position(section0_duration + 0.01);
    core.tick(section0_duration, &mut sink);
    assert!(!sink.events.iter().any(|e| matches!(e, Event::LoopBoundaryCrossed { .. })));

    let gmaj_hit_time = section0_duration;
    push_pitch(&producer, 67, 0.0);
    push_pitch(&producer, 71, 1.0);
    push_pitch(&producer, 62, 2.0);
    core.transport_mut().set_position(gmaj_hit_time + 0.02);
    core.tick(0.01, &mut sink);
    assert!(sink.events.iter().any(|e| matches!(e, Event::NoteHit { .. })));

    let total_duration = section0_duration + section1.loop_duration();
    core.transport_mut().set_position(total_duration + 0.01);
    core.tick(section1.loop_duration(), &mut sink);
    assert!(sink.events.iter().any(|e| matches!(e, Event::LoopBoundaryCrossed { new_cycle: 1, .. })));
}

#[test]
fn determinism_same_seed_and_inputs_yield_identical_event_stream() {
    let run = |seed: u64| {
        let mut stage = base_stage(Mode::ProgressionRandom);
        stage.allowed_chords = vec!["Cmaj".into(), "Fmaj".into(), "Gmaj".into()];
        stage.enemy_hp = 2;
        stage.enemy_count = 3;
        stage.note_interval_beats = Some(1.0);

        let transport = NullTransport::new();
        let (mut core, producer) = RhythmCore::start(stage, transport, seed).unwrap();
        let mut sink = VecEventSink::new();

        let mut t = 0.0;
        core.transport_mut().set_position(t);
        core.tick(0.0, &mut sink);

        let dt = 1.0 / 60.0;
        for i in 0..(600) {
            t += dt;
            if i % 37 == 0 {
                push_pitch(&producer, 60, t * 1000.0);
            }
            if i % 53 == 0 {
                push_pitch(&producer, 65, t * 1000.0);
            }
            core.transport_mut().set_position(t);
            core.tick(dt, &mut sink);
            if core.is_finished() {
                break;
            }
        }
        sink.events
    };

    let events_a = run(777);
    let events_b = run(777);
    assert_eq!(events_a, events_b);
}

#[test]
fn monotone_hp_player_never_heals_and_monster_hp_is_non_increasing_until_gone() {
    let mut stage = base_stage(Mode::Single);
    stage.allowed_chords = vec!["Cmaj".into()];
    stage.enemy_hp = 3;
    stage.enemy_count = 5;
    stage.max_hp = 10;

    let transport = NullTransport::new();
    let (mut core, producer) = RhythmCore::start(stage, transport, 1).unwrap();
    let mut sink = VecEventSink::new();

    let mut t = 0.0;
    core.transport_mut().set_position(t);
    core.tick(0.0, &mut sink);

    let mut last_hp = u32::MAX;
    let mut last_monster_hp: Option<u32> = None;
    let dt = 1.0 / 60.0;
    for i in 0..(10 * 60) {
        t += dt;
        if i % 5 == 0 {
            push_pitch(&producer, 60, t * 1000.0);
            push_pitch(&producer, 64, t * 1000.0);
            push_pitch(&producer, 67, t * 1000.0);
        }
        core.transport_mut().set_position(t);
        core.tick(dt, &mut sink);

        for event in sink.drain() {
            match event {
                Event::PlayerHpChanged { hp } => {
                    assert!(hp <= last_hp, "player hp healed from {last_hp} to {hp}");
                    last_hp = hp;
                }
                Event::MonsterHit { hp_after, .. } => {
                    if let Some(prev) = last_monster_hp {
                        assert!(hp_after <= prev, "monster hp healed from {prev} to {hp_after}");
                    }
                    last_monster_hp = Some(hp_after);
                }
                Event::MonsterDefeated { .. } => {
                    last_monster_hp = None;
                }
                _ => {}
            }
        }

        if core.is_finished() {
            break;
        }
    }
}
