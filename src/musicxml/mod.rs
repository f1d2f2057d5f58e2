//! # MusicXML
//!
//! Two-staff piano scores in and out of MusicXML 4.0 (partwise).
//!
//! ## Sub-modules
//! - `builder` - note streams to a document plus the onset-to-id map
//! - `parser` - a document back to note streams, and measure windows
//! - `accidentals` - measure-scoped accidental rules shared by both
//!
//! ## Round Trip
//! For any streams the builder accepts, `parse_musicxml(to_musicxml(r, l))`
//! returns the same notes per staff in the same order, with the exception
//! that a trailing partial measure comes back filled with rests.
//!
//! ## Identity Contract
//! Every `<note>` carries an `id` attribute (`s{staff}m{measure}n{index}`).
//! Highlighting works only if the rendering engine keeps those ids verbatim;
//! this crate records which ids start at each beat but cannot check what the
//! renderer does with them.

mod accidentals;
mod builder;
mod parser;

pub use accidentals::{AccidentalMark, MeasureAccidentals};
pub use builder::{to_musicxml, BuiltScore, NoteId, NoteIdMap};
pub use parser::{measure_range, parse_musicxml, HandStreams, ParsedMeasure, ParsedScore};
