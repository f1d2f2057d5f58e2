//! Playback data type definitions
//!
//! Beat-relative timing events and the wall-clock schedule derived from them.

use crate::note::Pitch;
use serde::Serialize;
use std::collections::BTreeSet;

/// One onset of the merged piece.
///
/// # Fields
/// - `time`: Start in beats from the start of the piece
/// - `duration`: Beats until the next event starts (the last event keeps its
///   shortest sounding note), not the length of any note
/// - `pitches`: Everything that starts sounding at `time` in either hand; empty
///   when only rests begin here
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingEvent {
    pub time: f64,
    pub duration: f64,
    pub pitches: BTreeSet<Pitch>,
}

impl TimingEvent {
    /// MIDI note numbers, lowest first
    pub fn midi_notes(&self) -> Vec<i32> {
        self.pitches.iter().map(Pitch::midi).collect()
    }

    pub fn is_silent(&self) -> bool {
        self.pitches.is_empty()
    }
}

/// A timing event placed on the wall clock.
///
/// # Fields
/// - `index`: Position in the timing event list
/// - `beat`: Start in beats from the start of the piece (before the count-off)
/// - `time`: Start in seconds from playback start, count-off included
/// - `duration`: Length in seconds
/// - `pitches`: Pitches to trigger
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledNote {
    pub index: usize,
    pub beat: f64,
    pub time: f64,
    pub duration: f64,
    pub pitches: Vec<Pitch>,
}

/// One metronome click on the sixteenth grid.
///
/// `sub_beat` is 0 on the beat (accented) and 1-3 on the following sixteenths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetronomeTick {
    pub index: usize,
    pub time: f64,
    pub sub_beat: u8,
}

impl MetronomeTick {
    pub fn is_downbeat(&self) -> bool {
        self.sub_beat == 0
    }
}

/// Wall-clock schedule for one playback run.
///
/// # Fields
/// - `bpm`: Quarter-note beats per minute
/// - `countoff_beats`: Click-only lead-in before the first event
/// - `notes`: Timing events in seconds, in order
/// - `metronome`: Sixteenth-note click grid covering count-off and piece
/// - `end_time`: Seconds from start to the end of the piece
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub bpm: f64,
    pub countoff_beats: f64,
    pub notes: Vec<ScheduledNote>,
    pub metronome: Vec<MetronomeTick>,
    pub end_time: f64,
}

impl Schedule {
    /// Start time in seconds of every timing event
    pub fn note_fire_times(&self) -> Vec<f64> {
        self.notes.iter().map(|n| n.time).collect()
    }
}

/// One action for the host's timer loop
#[derive(Debug, Clone, PartialEq)]
pub enum Cue {
    Tick(MetronomeTick),
    Note(ScheduledNote),
    /// The piece is over; stop the clock
    End(f64),
}

impl Cue {
    /// Seconds from playback start
    pub fn time(&self) -> f64 {
        match self {
            Cue::Tick(tick) => tick.time,
            Cue::Note(note) => note.time,
            Cue::End(time) => *time,
        }
    }
}
