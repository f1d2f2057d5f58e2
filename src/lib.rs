//! # sightread
//!
//! Core of a two-handed piano sight-reading trainer: build a grand-staff
//! MusicXML score from two note streams, read one back, merge both hands into
//! timing events and schedule them against a metronome.
//!
//! ```rust
//! let piece = r#"
//! key: C
//! time-signature: 4/4
//! right: ["C5:1", "D5:1", "E5:2"]
//! left: ["C3+G3:4"]
//! "#;
//! let xml = sightread::compile(piece).unwrap();
//! let parsed = sightread::parse_musicxml(&xml).unwrap();
//! assert_eq!(parsed.measures.len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod musicxml;
pub mod note;
pub mod playback;
pub mod validate;

pub use config::{BuildOptions, Piece, Session};
pub use error::*;
pub use musicxml::{measure_range, parse_musicxml, to_musicxml, BuiltScore, HandStreams, NoteId, NoteIdMap, ParsedScore};
pub use note::*;
pub use playback::{merge_hands, schedule, Schedule, TimingEvent};
pub use validate::validate;

/// Compile a YAML piece to MusicXML.
/// This is the main entry point for the library.
pub fn compile(source: &str) -> Result<String, SightreadError> {
    let piece = Piece::from_yaml(source)?;
    Ok(compile_piece(&piece)?.xml)
}

/// Build the score for a loaded piece, keeping the note-id map.
pub fn compile_piece(piece: &Piece) -> Result<BuiltScore, SightreadError> {
    to_musicxml(&piece.right, &piece.left, &piece.session.options)
}

/// Parse a score, check every measure adds up, and return its timing events.
pub fn score_events(xml: &str) -> Result<(ParsedScore, Vec<TimingEvent>), SightreadError> {
    let parsed = parse_musicxml(xml)?;
    validate(&parsed)?;
    let streams = parsed.streams();
    let events = merge_hands(&streams.right_hand, &streams.left_hand);
    Ok((parsed, events))
}

/// Playback schedule for a piece at its session tempo and count-off.
pub fn piece_schedule(piece: &Piece) -> Schedule {
    let events = merge_hands(&piece.right, &piece.left);
    schedule(&events, piece.session.countoff(), piece.session.bpm)
}
