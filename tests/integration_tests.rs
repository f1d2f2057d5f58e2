//! Integration tests for the sight-reading pipeline
//!
//! Piece file to MusicXML, MusicXML back to note streams, streams to timing
//! events and a playback schedule.

use sightread::playback::{piece_length, schedule};
use sightread::{
    compile, compile_piece, measure_range, merge_hands, parse_musicxml, score_events, to_musicxml, validate,
    BuildOptions, KeySignature, Note, Piece, Pitch, SightreadError, Step, TimeSignature,
};

/// Deterministic generator for the fuzz pieces
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

const DURATIONS: [f64; 7] = [0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0];

/// One staff of `measures` full measures drawn from the key's scale.
fn random_staff(rng: &mut Lcg, key: &KeySignature, measures: usize, beats: f64, octaves: [i8; 2], chords: bool) -> Vec<Note> {
    let scale = key.scale();
    let mut notes = Vec::new();
    for _ in 0..measures {
        let mut remaining = beats;
        while remaining > 0.0 {
            let fitting: Vec<f64> = DURATIONS.iter().copied().filter(|d| *d <= remaining).collect();
            let duration = fitting[rng.below(fitting.len())];
            remaining -= duration;

            if rng.below(8) == 0 {
                notes.push(Note::rest(duration));
                continue;
            }
            let degree = rng.below(7);
            let octave = octaves[rng.below(2)];
            let (step, alter) = scale[degree];
            let mut note = Note::new(Pitch::new(step, alter, octave), duration);
            if chords && rng.below(3) == 0 {
                let third = scale[(degree + 2) % 7];
                let fifth = scale[(degree + 4) % 7];
                // Chord tones stay above the root
                let lift = |s: Step| if s < step { octave + 1 } else { octave };
                note = note.with_chord([
                    Pitch::new(third.0, third.1, lift(third.0)),
                    Pitch::new(fifth.0, fifth.1, lift(fifth.0)),
                ]);
            }
            notes.push(note);
        }
    }
    notes
}

/// Raise the first sounding note that is not already sharp by a semitone.
fn add_accidental(notes: &mut [Note]) {
    if let Some(pitch) = notes.iter_mut().filter_map(|n| n.pitch.as_mut()).find(|p| p.alter < 1) {
        pitch.alter += 1;
    }
}

fn assert_same_events(a: &[Note], b: &[Note], c: &[Note], d: &[Note]) {
    let expected = merge_hands(a, b);
    let actual = merge_hands(c, d);
    assert_eq!(expected.len(), actual.len());
    for (e, f) in expected.iter().zip(&actual) {
        assert_eq!(e.time, f.time);
        assert_eq!(e.pitches, f.pitches);
    }
}

#[test]
fn test_compile_piece_file() {
    let source = r#"
title: Scale Study
key: D
time-signature: 4/4
tempo: 100
right: ["D4:0.5", "E4:0.5", "F#4:0.5", "G4:0.5", "A4:2", "D5:4"]
left: ["D3+F#3+A3:4", "D2:4"]
"#;
    let xml = compile(source).unwrap();
    assert!(xml.contains("<work-title>Scale Study</work-title>"));
    assert!(xml.contains("<fifths>2</fifths>"));
    // F# is in the key: altered but unmarked
    assert!(xml.contains("<alter>1</alter>"));
    assert!(!xml.contains("<accidental>"));
    assert_eq!(xml.matches("<beam number=\"1\">begin</beam>").count(), 1);
}

#[test]
fn test_round_trip_identity() {
    let source = r#"
key: F
time-signature: 3/4
right: ["A4:1", "Bb4:0.5", "B4:0.5", "C5:1", "F5:1.5", "E5:0.5", "r:1"]
left: ["F3+A3+C4:3", "r:1", "C3:2"]
"#;
    let piece = Piece::from_yaml(source).unwrap();
    let built = compile_piece(&piece).unwrap();
    assert_eq!(built.measure_count, 2);

    let parsed = parse_musicxml(&built.xml).unwrap();
    let streams = parsed.streams();
    assert_eq!(streams.right_hand, piece.right);
    assert_eq!(streams.left_hand, piece.left);
    assert_eq!(parsed.key.fifths, -1);
    assert_eq!(parsed.time_signature, TimeSignature::new(3, 4));
}

#[test]
fn test_fuzz_build_parse_build() {
    let key = KeySignature::from_name("G").unwrap();
    let time_signature = TimeSignature::new(3, 4);
    let options = BuildOptions::new(key.clone(), time_signature);

    for seed in 1..=25u64 {
        let mut rng = Lcg(seed);
        let mut right = random_staff(&mut rng, &key, 8, 3.0, [4, 5], false);
        let left = random_staff(&mut rng, &key, 8, 3.0, [2, 3], true);
        add_accidental(&mut right);

        let first = to_musicxml(&right, &left, &options).unwrap();
        assert_eq!(first.measure_count, 8, "seed {}", seed);
        let parsed = parse_musicxml(&first.xml).unwrap();
        validate(&parsed).unwrap();
        let streams = parsed.streams();
        assert_eq!(streams.right_hand, right, "seed {}", seed);
        assert_eq!(streams.left_hand, left, "seed {}", seed);

        let mut reparsed_options = BuildOptions::new(parsed.key.clone(), parsed.time_signature);
        reparsed_options.divisions = parsed.divisions;
        let second = to_musicxml(&streams.right_hand, &streams.left_hand, &reparsed_options).unwrap();
        assert_eq!(first.xml, second.xml, "seed {}", seed);

        let again = parse_musicxml(&second.xml).unwrap().streams();
        assert_same_events(&right, &left, &again.right_hand, &again.left_hand);
    }
}

#[test]
fn test_note_ids_match_timing_events() {
    let source = r#"
key: C
time-signature: 2/4
right: ["E5:0.5", "D5:0.5", "C5:1"]
left: ["C3:1", "G2:1"]
"#;
    let piece = Piece::from_yaml(source).unwrap();
    let built = compile_piece(&piece).unwrap();
    let events = merge_hands(&piece.right, &piece.left);

    for event in &events {
        let ids = built.note_ids.ids_at(event.time);
        assert!(!ids.is_empty(), "no ids at beat {}", event.time);
    }
    assert_eq!(built.note_ids.ids_at(1.0).len(), 2);
    assert_eq!(built.note_ids.ids_at(0.5).len(), 1);
}

#[test]
fn test_validation_reports_short_measure() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="4.0">
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>1</divisions>
        <key><fifths>0</fifths></key>
        <time><beats>2</beats><beat-type>4</beat-type></time>
        <staves>2</staves>
      </attributes>
      <note><pitch><step>C</step><octave>5</octave></pitch><duration>2</duration><staff>1</staff></note>
      <backup><duration>2</duration></backup>
      <note><pitch><step>C</step><octave>3</octave></pitch><duration>2</duration><staff>2</staff></note>
    </measure>
    <measure number="2">
      <note><pitch><step>D</step><octave>5</octave></pitch><duration>1</duration><staff>1</staff></note>
      <backup><duration>1</duration></backup>
      <note><pitch><step>B</step><octave>2</octave></pitch><duration>2</duration><staff>2</staff></note>
    </measure>
  </part>
</score-partwise>"#;
    let parsed = parse_musicxml(xml).unwrap();
    match validate(&parsed) {
        Err(SightreadError::SemanticError { measure, message }) => {
            assert_eq!(measure, 2);
            assert!(message.starts_with("Staff 1"), "{}", message);
        }
        other => panic!("expected a semantic error, got {:?}", other),
    }
    assert!(score_events(xml).is_err());
}

#[test]
fn test_parsed_events_are_gap_free() {
    let source = r#"
key: Bb
time-signature: 6/8
right: ["F5:1.5", "D5:0.5", "Eb5:0.5", "F5:0.5", "Bb4:3"]
left: ["Bb2:0.5", "F3:0.5", "D3:0.5", "Bb2:1.5", "Bb2+D3+F3:3"]
"#;
    let xml = compile(source).unwrap();
    let (parsed, events) = score_events(&xml).unwrap();
    assert_eq!(parsed.measures.len(), 2);

    assert_eq!(events.first().map(|e| e.time), Some(0.0));
    for pair in events.windows(2) {
        assert!((pair[0].time + pair[0].duration - pair[1].time).abs() < 1e-9);
    }
    assert!((piece_length(&events) - 6.0).abs() < 1e-9);
}

#[test]
fn test_measure_window_schedule() {
    let source = r#"
key: C
time-signature: 4/4
right: ["C5:4", "D5:2", "E5:2", "F5:4"]
left: ["C3:4", "G2:4", "C3:4"]
"#;
    let xml = compile(source).unwrap();
    let parsed = parse_musicxml(&xml).unwrap();
    let window = measure_range(&parsed, 2, 2).unwrap();
    let events = merge_hands(&window.right_hand, &window.left_hand);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].midi_notes(), vec![43, 74]);

    let plan = schedule(&events, parsed.time_signature.beats_per_measure(), 120.0);
    assert_eq!(plan.note_fire_times(), vec![2.0, 3.0]);
    assert_eq!(plan.end_time, 4.0);
    assert_eq!(plan.metronome.len(), 32);

    assert!(matches!(
        measure_range(&parsed, 4, 5),
        Err(SightreadError::InvalidRange { first: 4, last: 5 })
    ));
}

#[test]
fn test_piece_schedule_uses_session() {
    let piece = Piece::from_yaml("key: C\ntime-signature: 3/4\ntempo: 60\nright: [\"C5:3\"]").unwrap();
    let plan = sightread::piece_schedule(&piece);
    assert_eq!(plan.countoff_beats, 3.0);
    assert_eq!(plan.note_fire_times(), vec![3.0]);
    assert_eq!(plan.end_time, 6.0);
}

#[test]
fn test_missing_metadata_is_an_error() {
    assert!(matches!(
        compile("key: C\nright: [\"C5:4\"]"),
        Err(SightreadError::MissingTimeSignature)
    ));
    assert!(matches!(
        compile("time-signature: 4/4\nright: [\"C5:4\"]"),
        Err(SightreadError::MissingKeySignature)
    ));
}
