//! Transport
//!
//! Drives a [`Schedule`] from the host's timer. The host calls [`Transport::poll`]
//! with the elapsed playback time; every cue that has come due is handed back
//! exactly once. A late poll can find several clicks due at once: only the
//! first survives the metronome guard, so a stalled timer never produces a
//! burst of clicks. Notes are always delivered.
//!
//! Separately the transport keeps the practice position: the timing event the
//! player is expected to play next. The host moves it with
//! [`Transport::try_advance`] when the expected pitches arrive; advances closer
//! together than [`crate::playback::ADVANCE_FLOOR_MS`] are dropped.

use super::scheduler::{DebounceGuard, Timeline};
use super::types::{Cue, Schedule};
use log::{debug, info};

#[derive(Debug, Default)]
pub struct Transport {
    timeline: Option<Timeline>,
    guard: DebounceGuard,
    bpm: f64,
    position: usize,
    event_count: usize,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start playing `schedule` from time zero. Any run in progress is dropped.
    pub fn start(&mut self, schedule: Schedule) {
        info!(
            "playback started: {} events at {} BPM, {}-beat count-off",
            schedule.notes.len(),
            schedule.bpm,
            schedule.countoff_beats
        );
        self.bpm = schedule.bpm;
        self.position = 0;
        self.event_count = schedule.notes.len();
        self.guard.reset();
        self.timeline = Some(Timeline::new(schedule));
    }

    /// Stop playback. Pending cues are dropped and the guards forget their history.
    pub fn stop(&mut self) {
        if self.timeline.take().is_some() {
            info!("playback stopped");
        }
        self.guard.reset();
    }

    pub fn is_playing(&self) -> bool {
        self.timeline.is_some()
    }

    /// Cues due at `now` seconds after start, in order.
    ///
    /// Reaching [`Cue::End`] stops the transport.
    pub fn poll(&mut self, now: f64) -> Vec<Cue> {
        let mut due = Vec::new();
        let Some(timeline) = self.timeline.as_mut() else {
            return due;
        };

        let now_ms = now * 1000.0;
        let mut finished = false;
        while timeline.next_time().is_some_and(|time| time <= now) {
            let Some(cue) = timeline.next() else { break };
            match cue {
                Cue::Tick(_) if !self.guard.try_tick(now_ms, self.bpm) => continue,
                Cue::End(_) => finished = true,
                _ => {}
            }
            due.push(cue);
        }

        if finished {
            debug!("reached end of schedule at {:.3}s", now);
            self.stop();
        }
        due
    }

    /// Index of the timing event the player is expected to play next
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the practice position to the next timing event and return it.
    ///
    /// `None` when nothing is playing, the position is already on the last
    /// event, or the last accepted advance was under 40 ms ago.
    pub fn try_advance(&mut self, now_ms: f64) -> Option<usize> {
        if !self.is_playing() || self.position + 1 >= self.event_count {
            return None;
        }
        if !self.guard.try_advance(now_ms) {
            return None;
        }
        self.position += 1;
        debug!("practice position advanced to event {}", self.position);
        Some(self.position)
    }
}
