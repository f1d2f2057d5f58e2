//! # Configuration
//!
//! All settings travel in explicit values: [`BuildOptions`] for the builder and
//! [`Session`] for a practice run (options plus tempo and count-off). Nothing is
//! read from process-wide state, so every call is a pure function of its
//! arguments.
//!
//! A [`Piece`] is a YAML document with kebab-case keys holding a session and
//! the two hands' note streams:
//!
//! ```yaml
//! title: Minuet
//! key: G
//! time-signature: 3/4
//! tempo: 90
//! right: ["D5:1", "G4:0.5", "A4:0.5", "B4:0.5", "C5:0.5"]
//! left:  ["G3+B3:2", "A3:1"]
//! ```

use crate::error::SightreadError;
use crate::note::{KeySignature, Note, TimeSignature};
use serde::Deserialize;

/// Default MusicXML divisions per quarter note (sixteenth = 1 division)
pub const DEFAULT_DIVISIONS: u32 = 4;

/// Default tempo in quarter-note beats per minute
pub const DEFAULT_BPM: f64 = 80.0;

/// Options for [`crate::to_musicxml`].
///
/// `key` and `time_signature` are optional so that a missing value is reported
/// as an error instead of being silently defaulted.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    pub title: Option<String>,
    pub key: Option<KeySignature>,
    pub time_signature: Option<TimeSignature>,
    /// Divisions per quarter-note beat
    pub divisions: u32,
    /// Write fingering annotations carried by the notes
    pub fingering: bool,
    /// Start a new system every N measures
    pub system_break_every: Option<usize>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            title: None,
            key: None,
            time_signature: None,
            divisions: DEFAULT_DIVISIONS,
            fingering: false,
            system_break_every: None,
        }
    }
}

impl BuildOptions {
    pub fn new(key: KeySignature, time_signature: TimeSignature) -> Self {
        Self {
            key: Some(key),
            time_signature: Some(time_signature),
            ..Self::default()
        }
    }
}

/// A practice session: how to write the piece and how to play it back.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub options: BuildOptions,
    pub bpm: f64,
    /// Lead-in clicks; `None` uses one measure of the time signature
    pub countoff_beats: Option<f64>,
}

impl Session {
    pub fn new(options: BuildOptions, bpm: f64) -> Self {
        Self {
            options,
            bpm,
            countoff_beats: None,
        }
    }

    /// Count-off length in beats
    pub fn countoff(&self) -> f64 {
        self.countoff_beats.unwrap_or_else(|| {
            self.options
                .time_signature
                .map(|ts| ts.beats_per_measure())
                .unwrap_or(0.0)
        })
    }
}

/// Raw piece file for YAML deserialization
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub struct RawPiece {
    pub title: Option<String>,
    pub key: Option<String>,
    pub time_signature: Option<String>,
    pub tempo: Option<f64>,
    pub countoff: Option<f64>,
    pub divisions: Option<u32>,
    #[serde(default)]
    pub fingering: bool,
    pub system_break_every: Option<usize>,
    #[serde(default)]
    pub right: Vec<String>,
    #[serde(default)]
    pub left: Vec<String>,
}

/// A piece ready to build and play: session plus both hands.
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub session: Session,
    pub right: Vec<Note>,
    pub left: Vec<Note>,
}

impl Piece {
    /// Load a piece from YAML. Key and time signature stay `None` when absent;
    /// the builder reports them.
    pub fn from_yaml(source: &str) -> Result<Self, SightreadError> {
        let raw: RawPiece = serde_yaml::from_str(source)?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawPiece) -> Result<Self, SightreadError> {
        let key = raw
            .key
            .as_deref()
            .map(|name| {
                KeySignature::from_name(name)
                    .ok_or_else(|| SightreadError::InvalidMetadata(format!("unknown key '{}'", name)))
            })
            .transpose()?;
        let time_signature = raw
            .time_signature
            .as_deref()
            .map(str::parse::<TimeSignature>)
            .transpose()?;

        let bpm = raw.tempo.unwrap_or(DEFAULT_BPM);
        if !(bpm > 0.0) {
            return Err(SightreadError::InvalidMetadata(format!("tempo must be positive, got {}", bpm)));
        }
        let divisions = raw.divisions.unwrap_or(DEFAULT_DIVISIONS);
        if divisions == 0 {
            return Err(SightreadError::InvalidMetadata("divisions must be at least 1".to_string()));
        }

        let options = BuildOptions {
            title: raw.title,
            key,
            time_signature,
            divisions,
            fingering: raw.fingering,
            system_break_every: raw.system_break_every.filter(|n| *n > 0),
        };

        Ok(Self {
            session: Session {
                options,
                bpm,
                countoff_beats: raw.countoff,
            },
            right: parse_stream(&raw.right)?,
            left: parse_stream(&raw.left)?,
        })
    }
}

fn parse_stream(tokens: &[String]) -> Result<Vec<Note>, SightreadError> {
    tokens.iter().map(|token| token.parse::<Note>()).collect()
}
