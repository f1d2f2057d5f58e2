//! Score serializer: two note streams to a two-staff MusicXML document.
//!
//! Each stream is grouped into measures by greedy accumulation. Within a
//! measure, staff 1 is written first, a `<backup>` rewinds the cursor by
//! staff 1's length, then staff 2 follows. Every note carries a stable `id`
//! and the builder records which ids begin at which beat, so a renderer that
//! keeps the ids lets playback highlight notes in step with the timing events.

use super::accidentals::{AccidentalMark, MeasureAccidentals};
use crate::config::BuildOptions;
use crate::error::SightreadError;
use crate::note::*;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Stable identity of a written note: staff (1 or 2), 0-based measure, 0-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteId {
    pub staff: u8,
    pub measure: usize,
    pub index: usize,
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}m{}n{}", self.staff, self.measure, self.index)
    }
}

impl FromStr for NoteId {
    type Err = SightreadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SightreadError::InvalidNote(format!("'{}' is not a note id", s));
        let rest = s.strip_prefix('s').ok_or_else(invalid)?;
        let (staff, rest) = rest.split_once('m').ok_or_else(invalid)?;
        let (measure, index) = rest.split_once('n').ok_or_else(invalid)?;
        Ok(Self {
            staff: staff.parse().map_err(|_| invalid())?,
            measure: measure.parse().map_err(|_| invalid())?,
            index: index.parse().map_err(|_| invalid())?,
        })
    }
}

/// Beat time (rounded to 3 decimals) to the ids of the notes beginning there.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteIdMap {
    onsets: BTreeMap<i64, Vec<NoteId>>,
}

impl NoteIdMap {
    pub fn insert(&mut self, beat: f64, id: NoteId) {
        self.onsets.entry(onset_key(beat)).or_default().push(id);
    }

    /// Ids beginning at `beat`; empty when nothing starts there.
    pub fn ids_at(&self, beat: f64) -> &[NoteId] {
        self.onsets
            .get(&onset_key(beat))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Onsets in ascending beat order
    pub fn iter(&self) -> impl Iterator<Item = (f64, &[NoteId])> {
        self.onsets
            .iter()
            .map(|(key, ids)| (onset_beat(*key), ids.as_slice()))
    }

    /// Number of distinct onsets
    pub fn len(&self) -> usize {
        self.onsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.onsets.is_empty()
    }
}

/// The serialized document and its onset-to-id map.
#[derive(Debug, Clone)]
pub struct BuiltScore {
    pub xml: String,
    pub note_ids: NoteIdMap,
    pub measure_count: usize,
}

/// Beam state for a note
#[derive(Clone, Copy, Debug, PartialEq)]
enum BeamState {
    None,
    Begin,
    Continue,
    End,
}

/// Duration as written: integer divisions, a named type and its dots.
#[derive(Debug, Clone, Copy)]
struct Written {
    divisions: u32,
    note_type: NoteType,
    dots: u8,
}

fn written_form(duration: f64, divisions: u32) -> Result<Written, SightreadError> {
    let unrepresentable = || SightreadError::UnrepresentableDuration { duration, divisions };
    let exact = duration * divisions as f64;
    let rounded = exact.round();
    if rounded < 1.0 || (exact - rounded).abs() > 1e-6 {
        return Err(unrepresentable());
    }
    let (note_type, dots) = NoteType::from_beats(duration).ok_or_else(unrepresentable)?;
    Ok(Written {
        divisions: rounded as u32,
        note_type,
        dots,
    })
}

/// Convert two note streams to MusicXML.
///
/// `right` is written on staff 1 (treble), `left` on staff 2 (bass). Both
/// streams are split into measures of the time signature's length; a trailing
/// partial measure is filled with rests and the shorter staff is padded with
/// full-measure rests.
///
/// # Errors
/// - [`SightreadError::MissingTimeSignature`] / [`SightreadError::MissingKeySignature`]
/// - [`SightreadError::MeasureOverflow`] when a note crosses a barline
/// - [`SightreadError::UnrepresentableDuration`] when a duration has no written form
///
/// # Example
/// ```rust
/// use sightread::{to_musicxml, BuildOptions, KeySignature, Note, Pitch, Step, TimeSignature};
///
/// let options = BuildOptions::new(KeySignature::default(), TimeSignature::new(4, 4));
/// let right = vec![Note::new(Pitch::new(Step::C, 0, 5), 4.0)];
/// let left = vec![Note::new(Pitch::new(Step::C, 0, 3), 4.0)];
///
/// let score = to_musicxml(&right, &left, &options).unwrap();
/// assert!(score.xml.contains("<backup>"));
/// assert_eq!(score.note_ids.ids_at(0.0).len(), 2);
/// ```
pub fn to_musicxml(right: &[Note], left: &[Note], options: &BuildOptions) -> Result<BuiltScore, SightreadError> {
    let time_signature = options
        .time_signature
        .ok_or(SightreadError::MissingTimeSignature)?;
    let key = options.key.as_ref().ok_or(SightreadError::MissingKeySignature)?;
    if options.divisions == 0 {
        return Err(SightreadError::InvalidMetadata("divisions must be at least 1".to_string()));
    }

    let measure_beats = time_signature.beats_per_measure();
    let mut right_measures = split_measures(right, measure_beats, 1)?;
    let mut left_measures = split_measures(left, measure_beats, 2)?;
    let measure_count = right_measures.len().max(left_measures.len());
    right_measures.resize_with(measure_count, || fill_rests(measure_beats));
    left_measures.resize_with(measure_count, || fill_rests(measure_beats));

    let mut xml = String::new();

    // XML declaration and doctype
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(r#"<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 4.0 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">"#);
    xml.push('\n');
    xml.push_str(r#"<score-partwise version="4.0">"#);
    xml.push('\n');

    if let Some(title) = &options.title {
        xml.push_str("  <work>\n");
        xml.push_str(&format!("    <work-title>{}</work-title>\n", escape_xml(title)));
        xml.push_str("  </work>\n");
    }

    xml.push_str("  <part-list>\n");
    xml.push_str("    <score-part id=\"P1\">\n");
    xml.push_str("      <part-name>Piano</part-name>\n");
    xml.push_str("    </score-part>\n");
    xml.push_str("  </part-list>\n");
    xml.push_str("  <part id=\"P1\">\n");

    let mut writer = MeasureWriter {
        key,
        options,
        note_ids: NoteIdMap::default(),
        clocks: [0.0, 0.0],
    };

    if measure_count == 0 {
        // An empty piece still declares its attributes
        xml.push_str("    <measure number=\"1\">\n");
        xml.push_str(&attributes_xml(key, &time_signature, options.divisions));
        xml.push_str("    </measure>\n");
    }

    for (index, (right_notes, left_notes)) in right_measures.iter().zip(left_measures.iter()).enumerate() {
        xml.push_str(&format!("    <measure number=\"{}\">\n", index + 1));

        let system_break = options
            .system_break_every
            .map(|every| every > 0 && index > 0 && index % every == 0)
            .unwrap_or(false);
        if system_break {
            xml.push_str("      <print new-system=\"yes\"/>\n");
        }
        if index == 0 {
            xml.push_str(&attributes_xml(key, &time_signature, options.divisions));
        }

        let staff_one = writer.write_staff(&mut xml, right_notes, 1, index)?;
        if staff_one > 0 {
            xml.push_str("      <backup>\n");
            xml.push_str(&format!("        <duration>{}</duration>\n", staff_one));
            xml.push_str("      </backup>\n");
        }
        writer.write_staff(&mut xml, left_notes, 2, index)?;

        xml.push_str("    </measure>\n");
    }

    xml.push_str("  </part>\n");
    xml.push_str("</score-partwise>\n");

    debug!(
        "built score: {} measures, {} onsets, key {} ({} fifths), {}/{}",
        measure_count,
        writer.note_ids.len(),
        key.name,
        key.fifths,
        time_signature.beats,
        time_signature.beat_type
    );

    Ok(BuiltScore {
        xml,
        note_ids: writer.note_ids,
        measure_count,
    })
}

/// Group a stream into measures of `measure_beats`, greedily.
fn split_measures(notes: &[Note], measure_beats: f64, staff: u8) -> Result<Vec<Vec<Note>>, SightreadError> {
    let mut measures = Vec::new();
    let mut current = Vec::new();
    let mut filled = 0.0;

    for note in notes {
        if filled + note.duration > measure_beats + MEASURE_TOLERANCE {
            return Err(SightreadError::MeasureOverflow {
                staff,
                measure: measures.len() + 1,
                beats: note.duration,
            });
        }
        current.push(note.clone());
        filled += note.duration;
        if filled >= measure_beats - MEASURE_TOLERANCE {
            measures.push(std::mem::take(&mut current));
            filled = 0.0;
        }
    }

    if !current.is_empty() {
        trace!("staff {}: padding last measure with {} beats of rest", staff, measure_beats - filled);
        current.extend(fill_rests(measure_beats - filled));
        measures.push(current);
    }

    Ok(measures)
}

/// Rests filling `beats`, longest written values first.
fn fill_rests(beats: f64) -> Vec<Note> {
    const VALUES: [f64; 10] = [4.0, 3.0, 2.0, 1.5, 1.0, 0.75, 0.5, 0.375, 0.25, 0.125];
    let mut rests = Vec::new();
    let mut remaining = beats;
    while let Some(value) = VALUES.iter().find(|v| **v <= remaining + 1e-9) {
        rests.push(Note::rest(*value));
        remaining -= value;
    }
    rests
}

fn attributes_xml(key: &KeySignature, time_signature: &TimeSignature, divisions: u32) -> String {
    let mode = match key.mode {
        Mode::Major => "major",
        Mode::Minor => "minor",
    };

    let mut xml = String::new();
    xml.push_str("      <attributes>\n");
    xml.push_str(&format!("        <divisions>{}</divisions>\n", divisions));
    xml.push_str("        <key>\n");
    xml.push_str(&format!("          <fifths>{}</fifths>\n", key.fifths));
    xml.push_str(&format!("          <mode>{}</mode>\n", mode));
    xml.push_str("        </key>\n");
    xml.push_str("        <time>\n");
    xml.push_str(&format!("          <beats>{}</beats>\n", time_signature.beats));
    xml.push_str(&format!("          <beat-type>{}</beat-type>\n", time_signature.beat_type));
    xml.push_str("        </time>\n");
    xml.push_str("        <staves>2</staves>\n");
    xml.push_str("        <clef number=\"1\">\n");
    xml.push_str("          <sign>G</sign>\n");
    xml.push_str("          <line>2</line>\n");
    xml.push_str("        </clef>\n");
    xml.push_str("        <clef number=\"2\">\n");
    xml.push_str("          <sign>F</sign>\n");
    xml.push_str("          <line>4</line>\n");
    xml.push_str("        </clef>\n");
    xml.push_str("      </attributes>\n");
    xml
}

/// Check if a note joins a beam (eighth or shorter, not a rest)
fn is_beamable(note: &Note) -> bool {
    !note.is_rest() && note.duration <= 0.5 + 1e-9
}

/// Beam runs of two or more consecutive beamable notes within one measure
fn calculate_beam_states(notes: &[Note]) -> Vec<BeamState> {
    let mut states = vec![BeamState::None; notes.len()];
    let mut i = 0;

    while i < notes.len() {
        if !is_beamable(&notes[i]) {
            i += 1;
            continue;
        }

        let start = i;
        while i < notes.len() && is_beamable(&notes[i]) {
            i += 1;
        }
        let end = i;

        if end - start >= 2 {
            states[start] = BeamState::Begin;
            for state in &mut states[start + 1..end - 1] {
                *state = BeamState::Continue;
            }
            states[end - 1] = BeamState::End;
        }
    }

    states
}

/// Per-score state while writing measures: the identity map and each staff's beat clock.
struct MeasureWriter<'a> {
    key: &'a KeySignature,
    options: &'a BuildOptions,
    note_ids: NoteIdMap,
    clocks: [f64; 2],
}

impl MeasureWriter<'_> {
    /// Write one staff's notes for one measure; returns the staff's length in divisions.
    fn write_staff(&mut self, xml: &mut String, notes: &[Note], staff: u8, measure: usize) -> Result<u32, SightreadError> {
        let beam_states = calculate_beam_states(notes);
        let mut accidentals = MeasureAccidentals::new(self.key);
        let mut total = 0;

        for (index, (note, beam)) in notes.iter().zip(beam_states).enumerate() {
            let written = written_form(note.duration, self.options.divisions)?;
            let id = NoteId { staff, measure, index };
            let clock = &mut self.clocks[staff as usize - 1];

            match note.pitch {
                Some(root) => {
                    self.note_ids.insert(*clock, id);
                    let fingering = note.fingering.filter(|_| self.options.fingering);
                    let mark = accidentals.mark_for(&root);
                    xml.push_str(&note_to_xml(&id.to_string(), &root, mark, written, staff, beam, fingering, false));
                    for (tone, pitch) in note.chord.iter().enumerate() {
                        let mark = accidentals.mark_for(pitch);
                        let tone_id = format!("{}c{}", id, tone + 1);
                        xml.push_str(&note_to_xml(&tone_id, pitch, mark, written, staff, BeamState::None, None, true));
                    }
                }
                None => xml.push_str(&rest_to_xml(&id.to_string(), written, staff)),
            }

            *clock += note.duration;
            total += written.divisions;
        }

        Ok(total)
    }
}

#[allow(clippy::too_many_arguments)]
fn note_to_xml(
    id: &str,
    pitch: &Pitch,
    mark: Option<AccidentalMark>,
    written: Written,
    staff: u8,
    beam_state: BeamState,
    fingering: Option<u8>,
    chord: bool,
) -> String {
    let mut xml = String::new();

    xml.push_str(&format!("      <note id=\"{}\">\n", id));
    if chord {
        xml.push_str("        <chord/>\n");
    }

    // Pitch
    xml.push_str("        <pitch>\n");
    xml.push_str(&format!("          <step>{}</step>\n", pitch.step.as_str()));
    if pitch.alter != 0 {
        xml.push_str(&format!("          <alter>{}</alter>\n", pitch.alter));
    }
    xml.push_str(&format!("          <octave>{}</octave>\n", pitch.octave));
    xml.push_str("        </pitch>\n");

    xml.push_str(&format!("        <duration>{}</duration>\n", written.divisions));
    xml.push_str(&format!("        <voice>{}</voice>\n", staff));
    xml.push_str(&format!("        <type>{}</type>\n", written.note_type.musicxml_type()));
    for _ in 0..written.dots {
        xml.push_str("        <dot/>\n");
    }

    // Only shown when the key and earlier marks in the measure don't already imply it
    if let Some(mark) = mark {
        xml.push_str(&format!("        <accidental>{}</accidental>\n", mark.as_str()));
    }

    xml.push_str(&format!("        <staff>{}</staff>\n", staff));

    match beam_state {
        BeamState::Begin => xml.push_str("        <beam number=\"1\">begin</beam>\n"),
        BeamState::Continue => xml.push_str("        <beam number=\"1\">continue</beam>\n"),
        BeamState::End => xml.push_str("        <beam number=\"1\">end</beam>\n"),
        BeamState::None => {}
    }

    if let Some(finger) = fingering {
        xml.push_str("        <notations>\n");
        xml.push_str("          <technical>\n");
        xml.push_str(&format!("            <fingering>{}</fingering>\n", finger));
        xml.push_str("          </technical>\n");
        xml.push_str("        </notations>\n");
    }

    xml.push_str("      </note>\n");
    xml
}

fn rest_to_xml(id: &str, written: Written, staff: u8) -> String {
    let mut xml = String::new();

    xml.push_str(&format!("      <note id=\"{}\">\n", id));
    xml.push_str("        <rest/>\n");
    xml.push_str(&format!("        <duration>{}</duration>\n", written.divisions));
    xml.push_str(&format!("        <voice>{}</voice>\n", staff));
    xml.push_str(&format!("        <type>{}</type>\n", written.note_type.musicxml_type()));
    for _ in 0..written.dots {
        xml.push_str("        <dot/>\n");
    }
    xml.push_str(&format!("        <staff>{}</staff>\n", staff));
    xml.push_str("      </note>\n");
    xml
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
