//! # Note Model
//!
//! The canonical in-memory representation shared by the builder, the parser and
//! the playback engine.
//!
//! ## Type Hierarchy
//! ```text
//! Note
//!   ├── pitch: Option<Pitch>   (None = rest)
//!   │     ├── step: Step        (C D E F G A B)
//!   │     ├── alter: i8         (-1, 0, +1)
//!   │     └── octave: i8        (middle C = C4)
//!   ├── duration: f64           (beats, quarter note = 1.0)
//!   ├── chord: Vec<Pitch>       (extra tones sounding with the root)
//!   └── fingering: Option<u8>
//!
//! KeySignature  name + fifths + 7-note scale
//! TimeSignature beats / beat_type
//! ```
//!
//! ## Durations
//! Durations are beats where a quarter note is one beat, regardless of the time
//! signature. Written values are a [`NoteType`] plus dots:
//! - Dotted half = `2.0 * 1.5 = 3.0`
//! - Dotted eighth = `0.5 * 1.5 = 0.75`
//! - Double-dotted half = `2.0 * 1.75 = 3.5`
//!
//! Every value used in practice is dyadic, so `f64` holds it exactly and
//! sums of durations compare exactly.

use crate::error::SightreadError;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Tolerance when comparing a measure's duration sum with its length.
pub const MEASURE_TOLERANCE: f64 = 0.01;

/// Onset bucket for a beat time, rounded to three decimals.
///
/// Floating-point sums of note durations that should coincide land in the same
/// bucket; this is the key of both the note-identity map and the timing merger.
pub fn onset_key(beat: f64) -> i64 {
    (beat * 1000.0).round() as i64
}

/// Beat time of an onset bucket
pub fn onset_beat(key: i64) -> f64 {
    key as f64 / 1000.0
}

/// Multiply a base duration by its dots: each dot adds half of the previous addition.
///
/// ```
/// use sightread::apply_dots;
/// assert_eq!(apply_dots(2.0, 1), 3.0);
/// assert_eq!(apply_dots(2.0, 2), 3.5);
/// assert_eq!(apply_dots(2.0, 3), 3.75);
/// ```
pub fn apply_dots(base: f64, dots: u8) -> f64 {
    let extra: f64 = (1..=dots as i32).map(|k| 0.5f64.powi(k)).sum();
    base * (1.0 + extra)
}

/// Note letters C through B
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub enum Step {
    #[default]
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::C,
        Step::D,
        Step::E,
        Step::F,
        Step::G,
        Step::A,
        Step::B,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::C => "C",
            Step::D => "D",
            Step::E => "E",
            Step::F => "F",
            Step::G => "G",
            Step::A => "A",
            Step::B => "B",
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(Step::C),
            'D' => Some(Step::D),
            'E' => Some(Step::E),
            'F' => Some(Step::F),
            'G' => Some(Step::G),
            'A' => Some(Step::A),
            'B' => Some(Step::B),
            _ => None,
        }
    }

    /// Semitones above C
    pub fn semitone(&self) -> i32 {
        match self {
            Step::C => 0,
            Step::D => 2,
            Step::E => 4,
            Step::F => 5,
            Step::G => 7,
            Step::A => 9,
            Step::B => 11,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// A sounding pitch: letter, alteration and octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Pitch {
    pub step: Step,
    pub alter: i8,
    pub octave: i8,
}

impl Pitch {
    pub fn new(step: Step, alter: i8, octave: i8) -> Self {
        Self { step, alter, octave }
    }

    /// MIDI note number (C4 = 60)
    pub fn midi(&self) -> i32 {
        (self.octave as i32 + 1) * 12 + self.step.semitone() + self.alter as i32
    }
}

// Ordered by sounding height; spelling breaks ties so that B#3 and C4 stay distinct.
impl Ord for Pitch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.midi()
            .cmp(&other.midi())
            .then(self.step.cmp(&other.step))
            .then(self.alter.cmp(&other.alter))
    }
}

impl PartialOrd for Pitch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accidental = match self.alter {
            1 => "#",
            -1 => "b",
            _ => "",
        };
        write!(f, "{}{}{}", self.step.as_str(), accidental, self.octave)
    }
}

impl FromStr for Pitch {
    type Err = SightreadError;

    /// Parse `C4`, `F#3`, `Bb5`, `Cb-1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let step = chars
            .next()
            .and_then(Step::from_char)
            .ok_or_else(|| SightreadError::InvalidNote(format!("'{}' has no note letter", s)))?;
        let rest = chars.as_str();
        let (alter, octave) = match rest.chars().next() {
            Some('#') => (1, &rest[1..]),
            Some('b') => (-1, &rest[1..]),
            _ => (0, rest),
        };
        let octave = octave
            .parse::<i8>()
            .map_err(|_| SightreadError::InvalidNote(format!("'{}' has no octave", s)))?;
        Ok(Self::new(step, alter, octave))
    }
}

/// Written note value, before dots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteType {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl NoteType {
    const ALL: [NoteType; 6] = [
        NoteType::Whole,
        NoteType::Half,
        NoteType::Quarter,
        NoteType::Eighth,
        NoteType::Sixteenth,
        NoteType::ThirtySecond,
    ];

    /// Length in quarter-note beats
    pub fn beats(&self) -> f64 {
        match self {
            NoteType::Whole => 4.0,
            NoteType::Half => 2.0,
            NoteType::Quarter => 1.0,
            NoteType::Eighth => 0.5,
            NoteType::Sixteenth => 0.25,
            NoteType::ThirtySecond => 0.125,
        }
    }

    /// MusicXML type name
    pub fn musicxml_type(&self) -> &'static str {
        match self {
            NoteType::Whole => "whole",
            NoteType::Half => "half",
            NoteType::Quarter => "quarter",
            NoteType::Eighth => "eighth",
            NoteType::Sixteenth => "16th",
            NoteType::ThirtySecond => "32nd",
        }
    }

    pub fn from_musicxml(name: &str) -> Option<Self> {
        match name.trim() {
            "whole" => Some(NoteType::Whole),
            "half" => Some(NoteType::Half),
            "quarter" => Some(NoteType::Quarter),
            "eighth" => Some(NoteType::Eighth),
            "16th" => Some(NoteType::Sixteenth),
            "32nd" => Some(NoteType::ThirtySecond),
            _ => None,
        }
    }

    /// Find the written form of a duration: base type plus up to two dots.
    ///
    /// `1.5` is a dotted quarter, `3.5` a double-dotted half. Returns `None`
    /// for values such as `1.25` that need a tie.
    pub fn from_beats(beats: f64) -> Option<(NoteType, u8)> {
        for dots in 0..=2u8 {
            for note_type in NoteType::ALL {
                if (apply_dots(note_type.beats(), dots) - beats).abs() < 1e-9 {
                    return Some((note_type, dots));
                }
            }
        }
        None
    }
}

/// A note or rest in one staff's stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    /// `None` for a rest
    pub pitch: Option<Pitch>,
    pub duration: f64,
    /// Extra tones sounding with `pitch` for the same duration
    pub chord: Vec<Pitch>,
    pub fingering: Option<u8>,
}

impl Note {
    pub fn new(pitch: Pitch, duration: f64) -> Self {
        Self {
            pitch: Some(pitch),
            duration,
            chord: Vec::new(),
            fingering: None,
        }
    }

    pub fn rest(duration: f64) -> Self {
        Self {
            pitch: None,
            duration,
            chord: Vec::new(),
            fingering: None,
        }
    }

    /// Add chord tones to a sounding note. Rests ignore them.
    pub fn with_chord(mut self, tones: impl IntoIterator<Item = Pitch>) -> Self {
        if self.pitch.is_some() {
            self.chord.extend(tones);
        }
        self
    }

    pub fn with_fingering(mut self, finger: u8) -> Self {
        self.fingering = Some(finger);
        self
    }

    pub fn is_rest(&self) -> bool {
        self.pitch.is_none()
    }

    /// The root followed by its chord tones; empty for a rest, whatever `chord` holds.
    pub fn pitches(&self) -> impl Iterator<Item = Pitch> + '_ {
        let chord: &[Pitch] = if self.pitch.is_some() { &self.chord } else { &[] };
        self.pitch.iter().copied().chain(chord.iter().copied())
    }
}

impl FromStr for Note {
    type Err = SightreadError;

    /// Parse a note token: `C4:1`, `F#4+A4:0.5@2`, `r:2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (body, fingering) = match s.split_once('@') {
            Some((body, finger)) => {
                let finger = finger
                    .parse::<u8>()
                    .map_err(|_| SightreadError::InvalidNote(format!("'{}' has a bad fingering", s)))?;
                (body, Some(finger))
            }
            None => (s, None),
        };
        let (pitches, duration) = body
            .split_once(':')
            .ok_or_else(|| SightreadError::InvalidNote(format!("'{}' needs ':<beats>'", s)))?;
        let duration = duration
            .parse::<f64>()
            .ok()
            .filter(|d| *d > 0.0)
            .ok_or_else(|| SightreadError::InvalidNote(format!("'{}' has no positive duration", s)))?;

        if pitches.eq_ignore_ascii_case("r") {
            return Ok(Note::rest(duration));
        }

        let mut tones = pitches
            .split('+')
            .map(Pitch::from_str)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter();
        let root = tones
            .next()
            .ok_or_else(|| SightreadError::InvalidNote(format!("'{}' has no pitch", s)))?;
        let mut note = Note::new(root, duration).with_chord(tones);
        note.fingering = fingering;
        Ok(note)
    }
}

/// Mode for key signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Major,
    Minor,
}

/// Key signature: display name, number of sharps (positive) or flats (negative)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySignature {
    pub name: String,
    pub fifths: i8,
    pub mode: Mode,
}

impl Default for KeySignature {
    fn default() -> Self {
        Self {
            name: "C".to_string(),
            fifths: 0,
            mode: Mode::Major,
        }
    }
}

const SHARP_ORDER: [Step; 7] = [Step::F, Step::C, Step::G, Step::D, Step::A, Step::E, Step::B];
const FLAT_ORDER: [Step; 7] = [Step::B, Step::E, Step::A, Step::D, Step::G, Step::C, Step::F];

/// Major tonics around the circle of fifths, from 7 flats to 7 sharps
const MAJOR_TONICS: [&str; 15] = [
    "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
];
const MINOR_TONICS: [&str; 15] = [
    "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#", "A#",
];

impl KeySignature {
    /// Parse a key name like "G", "Bb", "F#", or a minor key like "Em", "Bbm".
    pub fn from_name(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        let (tonic, mode, table) = match trimmed.strip_suffix('m') {
            Some(tonic) if !tonic.is_empty() => (tonic, Mode::Minor, &MINOR_TONICS),
            _ => (trimmed, Mode::Major, &MAJOR_TONICS),
        };
        let position = table.iter().position(|t| *t == tonic)?;
        Some(Self {
            name: trimmed.to_string(),
            fifths: position as i8 - 7,
            mode,
        })
    }

    /// The major key with this many fifths (-7..=7).
    pub fn from_fifths(fifths: i8) -> Option<Self> {
        Self::from_fifths_and_mode(fifths, Mode::Major)
    }

    pub fn from_fifths_and_mode(fifths: i8, mode: Mode) -> Option<Self> {
        if !(-7..=7).contains(&fifths) {
            return None;
        }
        let index = (fifths + 7) as usize;
        let name = match mode {
            Mode::Major => MAJOR_TONICS[index].to_string(),
            Mode::Minor => format!("{}m", MINOR_TONICS[index]),
        };
        Some(Self { name, fifths, mode })
    }

    /// Alteration the key applies to a letter.
    /// Order of sharps: F C G D A E B. Order of flats: B E A D G C F.
    pub fn alter_for(&self, step: Step) -> i8 {
        let count = self.fifths.unsigned_abs() as usize;
        if self.fifths > 0 && SHARP_ORDER[..count.min(7)].contains(&step) {
            1
        } else if self.fifths < 0 && FLAT_ORDER[..count.min(7)].contains(&step) {
            -1
        } else {
            0
        }
    }

    /// True when `step` with `alter` needs no accidental in this key.
    pub fn implies(&self, step: Step, alter: i8) -> bool {
        self.alter_for(step) == alter
    }

    /// The seven scale degrees, tonic first, as (step, alter).
    pub fn scale(&self) -> [(Step, i8); 7] {
        let tonics = match self.mode {
            Mode::Major => &MAJOR_TONICS,
            Mode::Minor => &MINOR_TONICS,
        };
        let tonic_name = tonics[(self.fifths.clamp(-7, 7) + 7) as usize];
        let tonic = tonic_name
            .chars()
            .next()
            .and_then(Step::from_char)
            .unwrap_or_default();
        let mut scale = [(Step::C, 0); 7];
        for (degree, slot) in scale.iter_mut().enumerate() {
            let step = Step::ALL[(tonic.index() + degree) % 7];
            *slot = (step, self.alter_for(step));
        }
        scale
    }
}

/// Time signature (e.g., 4/4, 3/4, 6/8)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub beats: u8,
    pub beat_type: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats: 4,
            beat_type: 4,
        }
    }
}

impl TimeSignature {
    pub fn new(beats: u8, beat_type: u8) -> Self {
        Self { beats, beat_type }
    }

    /// Measure length in quarter-note beats: 3/4 is 3, 6/8 is 3, 2/2 is 4.
    pub fn beats_per_measure(&self) -> f64 {
        self.beats as f64 * 4.0 / self.beat_type as f64
    }
}

impl FromStr for TimeSignature {
    type Err = SightreadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SightreadError::InvalidMetadata(format!("time-signature must be in format N/D, got '{}'", s));
        let (beats, beat_type) = s.trim().split_once('/').ok_or_else(invalid)?;
        let beats = beats.trim().parse::<u8>().map_err(|_| invalid())?;
        let beat_type = beat_type.trim().parse::<u8>().map_err(|_| invalid())?;
        if beats == 0 || !matches!(beat_type, 1 | 2 | 4 | 8 | 16) {
            return Err(invalid());
        }
        Ok(Self { beats, beat_type })
    }
}
