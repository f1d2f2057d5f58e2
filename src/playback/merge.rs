//! Timing event merger
//!
//! Folds the two hands into one ordered, gap-free list of onsets.

use super::types::TimingEvent;
use crate::note::{onset_beat, onset_key, Note, Pitch};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug)]
struct Onset {
    /// Shortest note or rest starting here
    shortest: f64,
    pitches: BTreeSet<Pitch>,
}

/// Merge two hands into timing events.
///
/// Each hand is walked with its own beat clock. Notes, chord tones and rests
/// starting at the same beat (to three decimals) share one event. The event
/// keeps the shortest duration that starts there, so a quick note in one hand
/// is followed on time even while the other hand holds. After sorting, each
/// duration is replaced by the gap to the next event; the last event keeps
/// its shortest duration.
///
/// Rests move the clock and open an onset but add no pitch.
///
/// # Example
/// ```rust
/// use sightread::{merge_hands, Note, Pitch, Step};
///
/// let right = vec![Note::new(Pitch::new(Step::E, 0, 5), 0.5), Note::new(Pitch::new(Step::D, 0, 5), 0.5)];
/// let left = vec![Note::new(Pitch::new(Step::C, 0, 3), 1.0)];
///
/// let events = merge_hands(&right, &left);
/// assert_eq!(events.len(), 2);
/// assert_eq!(events[0].pitches.len(), 2);
/// assert_eq!(events[0].duration, 0.5);
/// ```
pub fn merge_hands(right: &[Note], left: &[Note]) -> Vec<TimingEvent> {
    let mut onsets: BTreeMap<i64, Onset> = BTreeMap::new();

    for hand in [right, left] {
        let mut clock = 0.0;
        for note in hand {
            let onset = onsets.entry(onset_key(clock)).or_insert_with(|| Onset {
                shortest: note.duration,
                pitches: BTreeSet::new(),
            });
            onset.shortest = onset.shortest.min(note.duration);
            onset.pitches.extend(note.pitches());
            clock += note.duration;
        }
    }

    let keys: Vec<i64> = onsets.keys().copied().collect();
    let events: Vec<TimingEvent> = onsets
        .into_iter()
        .enumerate()
        .map(|(i, (key, onset))| {
            let time = onset_beat(key);
            let duration = match keys.get(i + 1) {
                Some(next) => onset_beat(*next) - time,
                None => onset.shortest,
            };
            TimingEvent {
                time,
                duration,
                pitches: onset.pitches,
            }
        })
        .collect();

    debug!(
        "merged {} right + {} left notes into {} events",
        right.len(),
        left.len(),
        events.len()
    );
    events
}
