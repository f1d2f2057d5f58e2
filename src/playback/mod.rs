//! # Playback Module
//!
//! Merge both hands into timing events and schedule them against a metronome.
//!
//! ## Sub-modules
//! - `types` - TimingEvent, Schedule, MetronomeTick, Cue type definitions
//! - `merge` - Two-hand timing event merger
//! - `scheduler` - Beat to wall-clock conversion, metronome grid, debounce guards
//! - `transport` - Cursor over a schedule for a host timer loop
//!
//! ## Pipeline
//! ```text
//! right hand ─┐
//!             ├─ merge_hands ─> [TimingEvent] ─ schedule ─> Schedule ─ Transport::poll ─> [Cue]
//! left hand ──┘
//! ```
//!
//! ## Example
//! ```rust
//! use sightread::playback::{merge_hands, schedule};
//! use sightread::Note;
//!
//! let right: Vec<Note> = ["C5:2", "D5:0.5", "E5:0.5", "F5:1"]
//!     .iter()
//!     .map(|t| t.parse().unwrap())
//!     .collect();
//! let events = merge_hands(&right, &[]);
//! let s = schedule(&events, 4.0, 120.0);
//!
//! assert_eq!(s.note_fire_times(), vec![2.0, 3.0, 3.25, 3.5]);
//! assert_eq!(s.metronome.len(), 32);
//! ```
//!
//! ## Timing
//!
//! Timing events are in quarter-note beats from the start of the piece. The
//! schedule adds the count-off and converts to seconds with
//! `seconds = beats * 60 / bpm`. The metronome clicks every sixteenth; the
//! click on the beat has `sub_beat == 0`.
//!
//! ## Debouncing
//!
//! Host timers can call back twice for one scheduled fire. A metronome fire is
//! accepted only if at least half a sixteenth has passed since the last
//! accepted one ([`debounce_interval_ms`]). Cursor advances need 40 ms.

mod merge;
mod scheduler;
mod transport;
mod types;

pub use merge::merge_hands;
pub use scheduler::{
    allow_advance, allow_fire, beats_to_seconds, debounce_interval_ms, piece_length, schedule,
    DebounceGuard, Timeline, ADVANCE_FLOOR_MS, SUBDIVISIONS_PER_BEAT,
};
pub use transport::Transport;
pub use types::{Cue, MetronomeTick, Schedule, ScheduledNote, TimingEvent};

pub use crate::note::apply_dots;
