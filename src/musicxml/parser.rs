//! Score parser: a two-staff MusicXML document back to two note streams.
//!
//! Notes are assigned to streams by their `<staff>` element, so document order
//! between staves does not matter. `<backup>` and `<forward>` move a cursor
//! through the measure; a note that starts after its staff's last note has a
//! rest inserted in front of it. `<chord/>` siblings fold into the preceding
//! note's chord tones.

use super::accidentals::{AccidentalMark, MeasureAccidentals};
use crate::error::SightreadError;
use crate::note::*;
use log::{debug, trace, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One measure of a parsed score
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMeasure {
    /// Measure number as written (1-based)
    pub number: usize,
    pub right: Vec<Note>,
    pub left: Vec<Note>,
}

/// A parsed two-staff score
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScore {
    pub title: Option<String>,
    pub key: KeySignature,
    pub time_signature: TimeSignature,
    pub divisions: u32,
    pub measures: Vec<ParsedMeasure>,
}

/// Both hands flattened over a run of measures
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandStreams {
    pub right_hand: Vec<Note>,
    pub left_hand: Vec<Note>,
}

impl ParsedScore {
    /// Both hands over the whole score
    pub fn streams(&self) -> HandStreams {
        collect_streams(&self.measures)
    }
}

/// Both hands over measures `first..=last` (1-based). `last` past the end is clamped.
///
/// # Example
/// ```rust
/// use sightread::{measure_range, parse_musicxml, to_musicxml, BuildOptions, KeySignature, Note, Pitch, Step, TimeSignature};
///
/// let options = BuildOptions::new(KeySignature::default(), TimeSignature::new(2, 4));
/// let right: Vec<Note> = [Step::C, Step::D, Step::E]
///     .into_iter()
///     .map(|step| Note::new(Pitch::new(step, 0, 5), 2.0))
///     .collect();
/// let built = to_musicxml(&right, &[], &options).unwrap();
/// let parsed = parse_musicxml(&built.xml).unwrap();
///
/// let window = measure_range(&parsed, 2, 3).unwrap();
/// assert_eq!(window.right_hand.len(), 2);
/// assert_eq!(window.right_hand[0].pitch, Some(Pitch::new(Step::D, 0, 5)));
/// ```
pub fn measure_range(parsed: &ParsedScore, first: usize, last: usize) -> Result<HandStreams, SightreadError> {
    if first == 0 || first > last || first > parsed.measures.len() {
        return Err(SightreadError::InvalidRange { first, last });
    }
    let last = last.min(parsed.measures.len());
    Ok(collect_streams(&parsed.measures[first - 1..last]))
}

fn collect_streams(measures: &[ParsedMeasure]) -> HandStreams {
    let mut streams = HandStreams::default();
    for measure in measures {
        streams.right_hand.extend(measure.right.iter().cloned());
        streams.left_hand.extend(measure.left.iter().cloned());
    }
    streams
}

/// Parse a MusicXML document into two staves.
///
/// # Errors
/// - [`SightreadError::MissingKeySignature`] / [`SightreadError::MissingTimeSignature`]
///   when the document never declares them
/// - [`SightreadError::ParseError`] for a note without a pitch or duration, a
///   chord tone without a root, or a staff other than 1 and 2
/// - [`SightreadError::Xml`] for malformed XML
pub fn parse_musicxml(xml: &str) -> Result<ParsedScore, SightreadError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut state = ScoreReader::default();
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = element_name(&e);
                state.open(&name, &e)?;
                state.path.push(name);
                text.clear();
            }
            Event::Empty(e) => {
                let name = element_name(&e);
                state.open(&name, &e)?;
                state.close(&name, "")?;
            }
            Event::Text(t) => {
                text = t.unescape()?.into_owned();
            }
            Event::End(_) => {
                let name = state.path.pop().unwrap_or_default();
                state.close(&name, &text)?;
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    state.finish()
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Everything read from one `<note>` element
#[derive(Debug, Default)]
struct NoteFields {
    rest: bool,
    chord: bool,
    grace: bool,
    step: Option<Step>,
    alter: Option<i8>,
    octave: Option<i8>,
    duration: Option<u32>,
    note_type: Option<NoteType>,
    dots: u8,
    staff: Option<u8>,
    mark: Option<AccidentalMark>,
    fingering: Option<u8>,
}

/// A `<backup>` or `<forward>` being read
#[derive(Debug, Default)]
struct CursorMove {
    forward: bool,
    duration: u32,
    staff: Option<u8>,
}

/// Per-measure state: both staves, their end positions and the shared cursor (in beats)
#[derive(Debug)]
struct MeasureState {
    number: usize,
    staves: [Vec<Note>; 2],
    positions: [f64; 2],
    cursor: f64,
    accidentals: [Option<MeasureAccidentals>; 2],
    /// Staff of the last note read, while a `<chord/>` may still attach to it
    last_root_staff: Option<usize>,
}

/// Cursor positions closer than this are the same instant
const CURSOR_EPSILON: f64 = 1e-6;

#[derive(Debug, Default)]
struct ScoreReader {
    path: Vec<String>,
    title: Option<String>,
    divisions: Option<u32>,
    score_key: Option<KeySignature>,
    active_key: Option<KeySignature>,
    fifths: Option<i8>,
    mode: Mode,
    time_signature: Option<TimeSignature>,
    beats: Option<u8>,
    beat_type: Option<u8>,
    measures: Vec<ParsedMeasure>,
    measure: Option<MeasureState>,
    note: Option<NoteFields>,
    cursor_move: Option<CursorMove>,
}

impl ScoreReader {
    fn error(&self, message: impl Into<String>) -> SightreadError {
        SightreadError::ParseError {
            measure: self.measure.as_ref().map(|m| m.number).unwrap_or(0),
            message: message.into(),
        }
    }

    fn parent(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    fn number<T: std::str::FromStr>(&self, element: &str, text: &str) -> Result<T, SightreadError> {
        text.trim()
            .parse::<T>()
            .map_err(|_| self.error(format!("<{}> has bad value '{}'", element, text)))
    }

    fn open(&mut self, name: &str, e: &BytesStart) -> Result<(), SightreadError> {
        match name {
            "measure" => {
                let number = match e.try_get_attribute("number")? {
                    Some(attr) => attr.unescape_value()?.trim().parse::<usize>().ok(),
                    None => None,
                };
                self.measure = Some(MeasureState {
                    number: number.unwrap_or(self.measures.len() + 1),
                    staves: [Vec::new(), Vec::new()],
                    positions: [0.0, 0.0],
                    cursor: 0.0,
                    accidentals: [None, None],
                    last_root_staff: None,
                });
            }
            "note" => self.note = Some(NoteFields::default()),
            "backup" | "forward" => {
                self.cursor_move = Some(CursorMove {
                    forward: name == "forward",
                    ..CursorMove::default()
                })
            }
            "key" => {
                self.fifths = None;
                self.mode = Mode::Major;
            }
            "time" => {
                self.beats = None;
                self.beat_type = None;
            }
            _ => {}
        }

        if let Some(note) = self.note.as_mut() {
            match name {
                "rest" => note.rest = true,
                "chord" => note.chord = true,
                "grace" => note.grace = true,
                "dot" => note.dots += 1,
                _ => {}
            }
        }
        Ok(())
    }

    fn close(&mut self, name: &str, text: &str) -> Result<(), SightreadError> {
        let parent = self.parent().to_string();
        match (parent.as_str(), name) {
            ("work", "work-title") => self.title = Some(text.to_string()),
            ("attributes", "divisions") => {
                let divisions: u32 = self.number(name, text)?;
                if divisions == 0 {
                    return Err(self.error("<divisions> must be positive"));
                }
                self.divisions = Some(divisions);
            }
            ("key", "fifths") => self.fifths = Some(self.number(name, text)?),
            ("key", "mode") => {
                self.mode = if text.trim() == "minor" { Mode::Minor } else { Mode::Major }
            }
            ("attributes", "key") => {
                let fifths = self.fifths.ok_or_else(|| self.error("<key> without <fifths>"))?;
                let key = KeySignature::from_fifths_and_mode(fifths, self.mode)
                    .ok_or_else(|| self.error(format!("{} fifths is not a key", fifths)))?;
                self.score_key.get_or_insert_with(|| key.clone());
                self.active_key = Some(key);
            }
            ("time", "beats") => self.beats = Some(self.number(name, text)?),
            ("time", "beat-type") => self.beat_type = Some(self.number(name, text)?),
            ("attributes", "time") => {
                let (beats, beat_type) = self
                    .beats
                    .zip(self.beat_type)
                    .ok_or_else(|| self.error("<time> needs <beats> and <beat-type>"))?;
                if beats == 0 || beat_type == 0 {
                    return Err(self.error("<time> must be positive"));
                }
                let time_signature = TimeSignature::new(beats, beat_type);
                self.time_signature.get_or_insert(time_signature);
            }
            ("pitch", "step") => {
                let step = text
                    .trim()
                    .chars()
                    .next()
                    .and_then(Step::from_char)
                    .ok_or_else(|| self.error(format!("bad <step> '{}'", text)))?;
                self.note_fields()?.step = Some(step);
            }
            ("pitch", "alter") => {
                // Microtonal alterations are rounded to the nearest semitone
                let alter: f64 = self.number(name, text)?;
                self.note_fields()?.alter = Some(alter.round() as i8);
            }
            ("pitch", "octave") => {
                let octave = self.number(name, text)?;
                self.note_fields()?.octave = Some(octave);
            }
            ("note", "duration") => {
                let duration = self.number(name, text)?;
                self.note_fields()?.duration = Some(duration);
            }
            ("note", "type") => {
                let note_type = NoteType::from_musicxml(text)
                    .ok_or_else(|| self.error(format!("unknown note type '{}'", text)))?;
                self.note_fields()?.note_type = Some(note_type);
            }
            ("note", "staff") => {
                let staff = self.number(name, text)?;
                self.note_fields()?.staff = Some(staff);
            }
            ("note", "accidental") => {
                let mark = AccidentalMark::from_musicxml(text);
                self.note_fields()?.mark = mark;
            }
            ("technical", "fingering") => {
                if let Some(note) = self.note.as_mut() {
                    note.fingering = text.trim().parse().ok();
                }
            }
            ("backup" | "forward", "duration") => {
                let duration = self.number(name, text)?;
                if let Some(cursor_move) = self.cursor_move.as_mut() {
                    cursor_move.duration = duration;
                }
            }
            ("forward", "staff") => {
                let staff = self.number(name, text)?;
                if let Some(cursor_move) = self.cursor_move.as_mut() {
                    cursor_move.staff = Some(staff);
                }
            }
            (_, "note") => self.finish_note()?,
            (_, "backup" | "forward") => self.finish_cursor_move()?,
            (_, "measure") => self.finish_measure(),
            _ => {}
        }
        Ok(())
    }

    fn note_fields(&mut self) -> Result<&mut NoteFields, SightreadError> {
        if self.note.is_none() {
            return Err(self.error("pitch or duration outside a <note>"));
        }
        Ok(self.note.get_or_insert_with(NoteFields::default))
    }

    fn staff_index(&self, staff: Option<u8>) -> Result<usize, SightreadError> {
        match staff.unwrap_or(1) {
            1 => Ok(0),
            2 => Ok(1),
            other => Err(self.error(format!("staff {} is not supported; expected 1 or 2", other))),
        }
    }

    fn beats_of(&self, divisions: u32) -> Result<f64, SightreadError> {
        let per_beat = self
            .divisions
            .ok_or_else(|| self.error("duration given before <divisions>"))?;
        Ok(divisions as f64 / per_beat as f64)
    }

    /// Reject a single note or cursor move longer than a whole measure.
    fn check_fits_measure(&self, beats: f64) -> Result<(), SightreadError> {
        match self.time_signature {
            Some(ts) if beats > ts.beats_per_measure() + MEASURE_TOLERANCE => {
                Err(self.error(format!("duration of {} beats overflows the measure", beats)))
            }
            _ => Ok(()),
        }
    }

    fn finish_note(&mut self) -> Result<(), SightreadError> {
        let Some(fields) = self.note.take() else {
            return Ok(());
        };
        let Some(measure_number) = self.measure.as_ref().map(|m| m.number) else {
            return Err(self.error("<note> outside a <measure>"));
        };
        if fields.grace {
            warn!("measure {}: skipping grace note", measure_number);
            return Ok(());
        }
        let index = self.staff_index(fields.staff)?;

        // Sounding length: <duration> when present, else the written type and dots
        let beats = match (fields.duration, fields.note_type) {
            (Some(divisions), _) => self.beats_of(divisions)?,
            (None, Some(note_type)) => apply_dots(note_type.beats(), fields.dots),
            (None, None) => return Err(self.error("note has no duration or type")),
        };
        if beats <= 0.0 {
            return Err(self.error("note has zero duration"));
        }
        if !fields.chord {
            self.check_fits_measure(beats)?;
        }

        let written_pitch = if fields.rest {
            None
        } else {
            let step = fields.step.ok_or_else(|| self.error("note has no pitch"))?;
            let octave = fields.octave.ok_or_else(|| self.error("note has no octave"))?;
            Some((step, octave))
        };
        let key = self.active_key.clone().unwrap_or_default();

        let Some(measure) = self.measure.as_mut() else {
            return Ok(());
        };
        let pitch = written_pitch.map(|(step, octave)| {
            let accidentals = measure.accidentals[index].get_or_insert_with(|| MeasureAccidentals::new(&key));
            Pitch::new(step, accidentals.resolve(step, octave, fields.alter, fields.mark), octave)
        });

        if fields.chord {
            let Some(tone) = pitch else {
                trace!("measure {}: ignoring rest marked as chord tone", measure_number);
                return Ok(());
            };
            // The root must be the note just read, on the same staff
            let root = match measure.last_root_staff {
                Some(staff) if staff == index => measure.staves[index].last_mut(),
                _ => None,
            };
            return match root {
                Some(root) if !root.is_rest() => {
                    root.chord.push(tone);
                    Ok(())
                }
                _ => Err(SightreadError::ParseError {
                    measure: measure_number,
                    message: "chord tone without a root note on its staff".to_string(),
                }),
            };
        }

        let position = measure.positions[index];
        if measure.cursor > position + CURSOR_EPSILON {
            // Gap on this staff: the cursor was moved past its last note
            measure.staves[index].push(Note::rest(measure.cursor - position));
        } else if measure.cursor < position - CURSOR_EPSILON {
            warn!(
                "measure {}: staff {} has overlapping voices; appending in document order",
                measure_number,
                index + 1
            );
        }

        measure.staves[index].push(Note {
            pitch,
            duration: beats,
            chord: Vec::new(),
            fingering: fields.fingering,
        });
        measure.cursor += beats;
        measure.positions[index] = measure.cursor.max(position);
        measure.last_root_staff = Some(index);
        Ok(())
    }

    fn finish_cursor_move(&mut self) -> Result<(), SightreadError> {
        let Some(cursor_move) = self.cursor_move.take() else {
            return Ok(());
        };
        let beats = self.beats_of(cursor_move.duration)?;
        self.check_fits_measure(beats)?;
        if !cursor_move.forward {
            if let Some(measure) = self.measure.as_mut() {
                measure.cursor = (measure.cursor - beats).max(0.0);
                measure.last_root_staff = None;
            }
            return Ok(());
        }

        let index = self.staff_index(cursor_move.staff)?;
        if let Some(measure) = self.measure.as_mut() {
            // A forward at the staff's end is an invisible rest on that staff
            if (measure.cursor - measure.positions[index]).abs() < CURSOR_EPSILON && beats > 0.0 {
                measure.staves[index].push(Note::rest(beats));
                measure.positions[index] += beats;
            }
            measure.cursor += beats;
            measure.last_root_staff = None;
        }
        Ok(())
    }

    fn finish_measure(&mut self) {
        if let Some(measure) = self.measure.take() {
            let [right, left] = measure.staves;
            trace!(
                "measure {}: {} right, {} left",
                measure.number,
                right.len(),
                left.len()
            );
            self.measures.push(ParsedMeasure {
                number: measure.number,
                right,
                left,
            });
        }
    }

    fn finish(self) -> Result<ParsedScore, SightreadError> {
        let key = self.score_key.ok_or(SightreadError::MissingKeySignature)?;
        let time_signature = self.time_signature.ok_or(SightreadError::MissingTimeSignature)?;
        debug!(
            "parsed score: {} measures, key {}, {}/{}",
            self.measures.len(),
            key.name,
            time_signature.beats,
            time_signature.beat_type
        );
        Ok(ParsedScore {
            title: self.title,
            key,
            time_signature,
            divisions: self.divisions.unwrap_or(1),
            measures: self.measures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;
    use crate::musicxml::to_musicxml;

    fn note(s: &str, beats: f64) -> Note {
        Note::new(s.parse().unwrap(), beats)
    }

    fn wrap(attributes: &str, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="4.0">
  <part-list><score-part id="P1"><part-name>Piano</part-name></score-part></part-list>
  <part id="P1">
    <measure number="1">
      <attributes>{}</attributes>
      {}
    </measure>
  </part>
</score-partwise>"#,
            attributes, body
        )
    }

    const ATTRS: &str = "<divisions>2</divisions><key><fifths>1</fifths></key><time><beats>2</beats><beat-type>4</beat-type></time><staves>2</staves>";

    #[test]
    fn test_round_trip_simple() {
        let options = BuildOptions::new(KeySignature::from_name("G").unwrap(), "3/4".parse().unwrap());
        let right = vec![note("B4", 1.5), note("A4", 0.5), note("G4", 1.0), note("F#4", 3.0)];
        let left = vec![note("G3", 3.0), Note::rest(1.0), note("D3", 2.0)];
        let built = to_musicxml(&right, &left, &options).unwrap();
        let parsed = parse_musicxml(&built.xml).unwrap();

        assert_eq!(parsed.key.fifths, 1);
        assert_eq!(parsed.time_signature, TimeSignature::new(3, 4));
        assert_eq!(parsed.measures.len(), 2);
        let streams = parsed.streams();
        assert_eq!(streams.right_hand, right);
        assert_eq!(streams.left_hand, left);
    }

    #[test]
    fn test_staff_interleaving_without_backup_order() {
        // Staff 2 written first, then staff 1
        let body = r#"
      <note><pitch><step>C</step><octave>3</octave></pitch><duration>4</duration><type>half</type><staff>2</staff></note>
      <backup><duration>4</duration></backup>
      <note><pitch><step>E</step><octave>5</octave></pitch><duration>2</duration><type>quarter</type><staff>1</staff></note>
      <note><pitch><step>F</step><octave>5</octave></pitch><duration>2</duration><type>quarter</type><staff>1</staff></note>"#;
        let parsed = parse_musicxml(&wrap(ATTRS, body)).unwrap();
        let measure = &parsed.measures[0];
        assert_eq!(measure.left.len(), 1);
        assert_eq!(measure.left[0].duration, 2.0);
        assert_eq!(measure.right.len(), 2);
        // F is sharp in G major
        assert_eq!(measure.right[1].pitch, Some(Pitch::new(Step::F, 1, 5)));
    }

    #[test]
    fn test_forward_becomes_rest() {
        let body = r#"
      <forward><duration>2</duration><staff>1</staff></forward>
      <note><pitch><step>G</step><octave>4</octave></pitch><duration>2</duration><type>quarter</type><staff>1</staff></note>
      <backup><duration>4</duration></backup>
      <note><pitch><step>G</step><octave>2</octave></pitch><duration>4</duration><type>half</type><staff>2</staff></note>"#;
        let parsed = parse_musicxml(&wrap(ATTRS, body)).unwrap();
        let right = &parsed.measures[0].right;
        assert_eq!(right.len(), 2);
        assert!(right[0].is_rest());
        assert_eq!(right[0].duration, 1.0);
        assert_eq!(right[1].duration, 1.0);
    }

    #[test]
    fn test_cursor_gap_filled_with_rest() {
        // Staff 2 note starts one beat in without an explicit rest
        let body = r#"
      <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><type>half</type><staff>1</staff></note>
      <backup><duration>2</duration></backup>
      <note><pitch><step>C</step><octave>3</octave></pitch><duration>2</duration><type>quarter</type><staff>2</staff></note>"#;
        let parsed = parse_musicxml(&wrap(ATTRS, body)).unwrap();
        let left = &parsed.measures[0].left;
        assert_eq!(left.len(), 2);
        assert!(left[0].is_rest());
        assert_eq!(left[0].duration, 1.0);
    }

    #[test]
    fn test_chord_tones_fold_into_root() {
        let body = r#"
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration><type>half</type><staff>1</staff></note>
      <note><chord/><pitch><step>E</step><octave>4</octave></pitch><duration>4</duration><type>half</type><staff>1</staff></note>
      <note><chord/><pitch><step>G</step><octave>4</octave></pitch><duration>4</duration><type>half</type><staff>1</staff></note>"#;
        let parsed = parse_musicxml(&wrap(ATTRS, body)).unwrap();
        let right = &parsed.measures[0].right;
        assert_eq!(right.len(), 1);
        assert_eq!(right[0].chord.len(), 2);
        assert_eq!(right[0].chord[1], Pitch::new(Step::G, 0, 4));
    }

    #[test]
    fn test_orphan_chord_tone_rejected() {
        let body = r#"<note><chord/><pitch><step>E</step><octave>4</octave></pitch><duration>4</duration><staff>1</staff></note>"#;
        let err = parse_musicxml(&wrap(ATTRS, body)).unwrap_err();
        assert!(matches!(err, SightreadError::ParseError { measure: 1, .. }));
    }

    #[test]
    fn test_chord_tone_needs_root_on_same_staff() {
        // The staff 2 chord tone follows a staff 1 note: no root to fold into
        let body = r#"
      <note><pitch><step>C</step><octave>3</octave></pitch><duration>4</duration><type>half</type><staff>2</staff></note>
      <backup><duration>4</duration></backup>
      <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><type>half</type><staff>1</staff></note>
      <note><chord/><pitch><step>E</step><octave>3</octave></pitch><duration>4</duration><type>half</type><staff>2</staff></note>"#;
        let err = parse_musicxml(&wrap(ATTRS, body)).unwrap_err();
        assert!(matches!(err, SightreadError::ParseError { measure: 1, .. }));
    }

    #[test]
    fn test_oversized_duration_rejected() {
        let body = r#"
      <note><pitch><step>C</step><octave>5</octave></pitch><duration>4294967295</duration><staff>1</staff></note>
      <note><pitch><step>D</step><octave>5</octave></pitch><duration>2</duration><staff>1</staff></note>"#;
        let err = parse_musicxml(&wrap(ATTRS, body)).unwrap_err();
        assert!(matches!(err, SightreadError::ParseError { measure: 1, .. }));

        let huge_backup = r#"
      <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><staff>1</staff></note>
      <backup><duration>4294967295</duration></backup>"#;
        assert!(matches!(
            parse_musicxml(&wrap(ATTRS, huge_backup)),
            Err(SightreadError::ParseError { .. })
        ));
    }

    #[test]
    fn test_type_only_notes_finer_than_divisions() {
        // One division per beat cannot express an eighth; the cursor must still land on the beat
        let attrs = "<divisions>1</divisions><key><fifths>0</fifths></key><time><beats>1</beats><beat-type>4</beat-type></time><staves>2</staves>";
        let body = r#"
      <note><pitch><step>E</step><octave>5</octave></pitch><type>eighth</type><staff>1</staff></note>
      <note><pitch><step>D</step><octave>5</octave></pitch><type>eighth</type><staff>1</staff></note>
      <backup><duration>1</duration></backup>
      <note><pitch><step>C</step><octave>3</octave></pitch><duration>1</duration><type>quarter</type><staff>2</staff></note>"#;
        let parsed = parse_musicxml(&wrap(attrs, body)).unwrap();
        let measure = &parsed.measures[0];
        assert_eq!(measure.right.iter().map(|n| n.duration).collect::<Vec<_>>(), vec![0.5, 0.5]);
        assert_eq!(measure.left, vec![note("C3", 1.0)]);
        crate::validate::validate(&parsed).unwrap();
    }

    #[test]
    fn test_explicit_mark_scopes_to_measure() {
        // G major: F natural mark holds for a later unmarked F in the same measure
        let body = r#"
      <note><pitch><step>F</step><octave>4</octave></pitch><duration>1</duration><type>eighth</type><accidental>natural</accidental><staff>1</staff></note>
      <note><pitch><step>F</step><octave>4</octave></pitch><duration>1</duration><type>eighth</type><staff>1</staff></note>
      <note><pitch><step>F</step><octave>5</octave></pitch><duration>2</duration><type>quarter</type><staff>1</staff></note>"#;
        let parsed = parse_musicxml(&wrap(ATTRS, body)).unwrap();
        let alters: Vec<i8> = parsed.measures[0]
            .right
            .iter()
            .map(|n| n.pitch.unwrap().alter)
            .collect();
        assert_eq!(alters, vec![0, 0, 1]);
    }

    #[test]
    fn test_duration_from_type_when_missing() {
        let body = r#"<note><pitch><step>A</step><octave>4</octave></pitch><type>quarter</type><dot/><staff>1</staff></note>"#;
        let parsed = parse_musicxml(&wrap(ATTRS, body)).unwrap();
        assert_eq!(parsed.measures[0].right[0].duration, 1.5);
    }

    #[test]
    fn test_malformed_notes_rejected() {
        let no_pitch = r#"<note><duration>2</duration><staff>1</staff></note>"#;
        assert!(matches!(
            parse_musicxml(&wrap(ATTRS, no_pitch)),
            Err(SightreadError::ParseError { .. })
        ));

        let no_duration = r#"<note><pitch><step>A</step><octave>4</octave></pitch></note>"#;
        assert!(matches!(
            parse_musicxml(&wrap(ATTRS, no_duration)),
            Err(SightreadError::ParseError { .. })
        ));

        let third_staff = r#"<note><rest/><duration>2</duration><staff>3</staff></note>"#;
        assert!(matches!(
            parse_musicxml(&wrap(ATTRS, third_staff)),
            Err(SightreadError::ParseError { .. })
        ));
    }

    #[test]
    fn test_missing_attributes_rejected() {
        let no_key = wrap("<divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time>", "");
        assert!(matches!(parse_musicxml(&no_key), Err(SightreadError::MissingKeySignature)));

        let no_time = wrap("<divisions>1</divisions><key><fifths>0</fifths></key>", "");
        assert!(matches!(parse_musicxml(&no_time), Err(SightreadError::MissingTimeSignature)));
    }

    #[test]
    fn test_malformed_xml_rejected() {
        let broken = "<score-partwise><part><measure></part></score-partwise>";
        assert!(parse_musicxml(broken).is_err());
    }

    #[test]
    fn test_grace_notes_skipped() {
        let body = r#"
      <note><grace/><pitch><step>D</step><octave>5</octave></pitch><type>eighth</type><staff>1</staff></note>
      <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><type>half</type><staff>1</staff></note>"#;
        let parsed = parse_musicxml(&wrap(ATTRS, body)).unwrap();
        assert_eq!(parsed.measures[0].right.len(), 1);
    }

    #[test]
    fn test_minor_key_and_title() {
        let options = BuildOptions {
            title: Some("Etude".to_string()),
            ..BuildOptions::new(KeySignature::from_name("Em").unwrap(), "4/4".parse().unwrap())
        };
        let built = to_musicxml(&[note("E4", 4.0)], &[], &options).unwrap();
        let parsed = parse_musicxml(&built.xml).unwrap();
        assert_eq!(parsed.key.name, "Em");
        assert_eq!(parsed.key.mode, Mode::Minor);
        assert_eq!(parsed.title.as_deref(), Some("Etude"));
    }

    #[test]
    fn test_measure_range_bounds() {
        let options = BuildOptions::new(KeySignature::default(), "4/4".parse().unwrap());
        let right: Vec<Note> = ["C5", "D5", "E5"].iter().map(|p| note(p, 4.0)).collect();
        let left: Vec<Note> = ["C3", "D3", "E3"].iter().map(|p| note(p, 4.0)).collect();
        let parsed = parse_musicxml(&to_musicxml(&right, &left, &options).unwrap().xml).unwrap();

        let middle = measure_range(&parsed, 2, 2).unwrap();
        assert_eq!(middle.right_hand, vec![note("D5", 4.0)]);
        assert_eq!(middle.left_hand, vec![note("D3", 4.0)]);

        let clamped = measure_range(&parsed, 2, 10).unwrap();
        assert_eq!(clamped.right_hand.len(), 2);

        assert!(measure_range(&parsed, 0, 1).is_err());
        assert!(measure_range(&parsed, 3, 2).is_err());
        assert!(measure_range(&parsed, 4, 5).is_err());
    }

    #[test]
    fn test_empty_piece_parses() {
        let options = BuildOptions::new(KeySignature::default(), "4/4".parse().unwrap());
        let parsed = parse_musicxml(&to_musicxml(&[], &[], &options).unwrap().xml).unwrap();
        let streams = parsed.streams();
        assert!(streams.right_hand.is_empty());
        assert!(streams.left_hand.is_empty());
    }
}
