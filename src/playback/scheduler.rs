//! Scheduler
//!
//! Turns beat-relative timing events into wall-clock times, lays a sixteenth
//! metronome grid over count-off and piece, and guards the host's timer
//! callbacks against double fires.

use super::types::{Cue, MetronomeTick, Schedule, ScheduledNote, TimingEvent};
use log::debug;
use std::iter::Peekable;
use std::vec::IntoIter;

/// Metronome clicks per quarter-note beat
pub const SUBDIVISIONS_PER_BEAT: u8 = 4;

/// Minimum gap between two cursor advances, whatever the tempo
pub const ADVANCE_FLOOR_MS: f64 = 40.0;

/// Seconds taken by `beats` quarter-note beats at `bpm`
pub fn beats_to_seconds(beats: f64, bpm: f64) -> f64 {
    beats * 60.0 / bpm
}

/// Beats from the first event's start to the last event's end
pub fn piece_length(events: &[TimingEvent]) -> f64 {
    events.last().map(|e| e.time + e.duration).unwrap_or(0.0)
}

/// Schedule timing events for playback.
///
/// Every event fires `countoff_beats` after playback start plus its own beat
/// offset. The metronome grid runs from zero through the end of the piece,
/// one click per sixteenth. An empty event list still gets the count-off.
///
/// # Example
/// ```rust
/// use sightread::playback::{schedule, TimingEvent};
/// use std::collections::BTreeSet;
///
/// let events = vec![
///     TimingEvent { time: 0.0, duration: 1.0, pitches: BTreeSet::new() },
///     TimingEvent { time: 1.0, duration: 1.0, pitches: BTreeSet::new() },
/// ];
/// let s = schedule(&events, 4.0, 60.0);
/// assert_eq!(s.note_fire_times(), vec![4.0, 5.0]);
/// assert_eq!(s.end_time, 6.0);
/// ```
pub fn schedule(events: &[TimingEvent], countoff_beats: f64, bpm: f64) -> Schedule {
    let notes: Vec<ScheduledNote> = events
        .iter()
        .enumerate()
        .map(|(index, event)| ScheduledNote {
            index,
            beat: event.time,
            time: beats_to_seconds(countoff_beats + event.time, bpm),
            duration: beats_to_seconds(event.duration, bpm),
            pitches: event.pitches.iter().copied().collect(),
        })
        .collect();

    let total_beats = countoff_beats + piece_length(events);
    let subdivisions = f64::from(SUBDIVISIONS_PER_BEAT);
    // Tolerate float noise so that 4.5 beats gives 18 ticks, not 19
    let tick_count = ((total_beats * subdivisions) - 1e-9).ceil().max(0.0) as usize;
    let metronome = (0..tick_count)
        .map(|index| MetronomeTick {
            index,
            time: beats_to_seconds(index as f64 / subdivisions, bpm),
            sub_beat: (index % usize::from(SUBDIVISIONS_PER_BEAT)) as u8,
        })
        .collect();

    let end_time = beats_to_seconds(total_beats, bpm);
    debug!(
        "scheduled {} events and {} ticks over {:.3}s at {} BPM",
        notes.len(),
        tick_count,
        end_time,
        bpm
    );

    Schedule {
        bpm,
        countoff_beats,
        notes,
        metronome,
        end_time,
    }
}

/// Minimum milliseconds between two metronome fires at `bpm`: half a sixteenth.
pub fn debounce_interval_ms(bpm: f64) -> f64 {
    (60.0 / bpm / f64::from(SUBDIVISIONS_PER_BEAT)) * 1000.0 * 0.5
}

/// Whether a metronome fire at `now_ms` is far enough from the last accepted one.
pub fn allow_fire(now_ms: f64, last_fire_ms: Option<f64>, bpm: f64) -> bool {
    match last_fire_ms {
        None => true,
        Some(last) => now_ms - last >= debounce_interval_ms(bpm),
    }
}

/// Whether a cursor advance at `now_ms` is far enough from the last accepted one.
pub fn allow_advance(now_ms: f64, last_advance_ms: Option<f64>) -> bool {
    match last_advance_ms {
        None => true,
        Some(last) => now_ms - last >= ADVANCE_FLOOR_MS,
    }
}

/// Last accepted metronome fire and cursor advance for one playback run.
///
/// A fresh guard accepts the first of each. Reset it whenever playback starts
/// or stops.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DebounceGuard {
    last_tick_ms: Option<f64>,
    last_advance_ms: Option<f64>,
}

impl DebounceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Accept or reject a metronome fire. Accepted fires are remembered.
    pub fn try_tick(&mut self, now_ms: f64, bpm: f64) -> bool {
        if !allow_fire(now_ms, self.last_tick_ms, bpm) {
            debug!("metronome fire at {:.1}ms debounced", now_ms);
            return false;
        }
        self.last_tick_ms = Some(now_ms);
        true
    }

    /// Accept or reject a cursor advance. Accepted advances are remembered.
    pub fn try_advance(&mut self, now_ms: f64) -> bool {
        if !allow_advance(now_ms, self.last_advance_ms) {
            debug!("cursor advance at {:.1}ms debounced", now_ms);
            return false;
        }
        self.last_advance_ms = Some(now_ms);
        true
    }
}

/// Cues of one schedule in time order, ending with [`Cue::End`].
///
/// A tick and a note at the same instant come out tick first. The timeline is
/// consumed as it plays; build a new one from the schedule to play again.
#[derive(Debug)]
pub struct Timeline {
    ticks: Peekable<IntoIter<MetronomeTick>>,
    notes: Peekable<IntoIter<ScheduledNote>>,
    end: Option<f64>,
}

impl Timeline {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            ticks: schedule.metronome.into_iter().peekable(),
            notes: schedule.notes.into_iter().peekable(),
            end: Some(schedule.end_time),
        }
    }

    /// Time of the next cue without consuming it
    pub fn next_time(&mut self) -> Option<f64> {
        match (self.ticks.peek(), self.notes.peek()) {
            (Some(tick), Some(note)) => Some(tick.time.min(note.time)),
            (Some(tick), None) => Some(tick.time),
            (None, Some(note)) => Some(note.time),
            (None, None) => self.end,
        }
    }
}

impl Iterator for Timeline {
    type Item = Cue;

    fn next(&mut self) -> Option<Cue> {
        let tick_first = match (self.ticks.peek(), self.notes.peek()) {
            (Some(tick), Some(note)) => tick.time <= note.time,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return self.end.take().map(Cue::End),
        };
        if tick_first {
            self.ticks.next().map(Cue::Tick)
        } else {
            self.notes.next().map(Cue::Note)
        }
    }
}

impl IntoIterator for Schedule {
    type Item = Cue;
    type IntoIter = Timeline;

    fn into_iter(self) -> Timeline {
        Timeline::new(self)
    }
}
