//! Measure-scoped accidentals.
//!
//! An accidental mark holds for the same letter and octave until the barline,
//! then the key signature applies again. The builder asks which mark a note
//! needs; the parser asks which alteration an unmarked note carries. Both sides
//! use the same state so that a written score reads back as it was built.

use crate::note::{KeySignature, Pitch, Step};
use std::collections::HashMap;

/// Accidental sign as written on the staff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccidentalMark {
    Sharp,
    Flat,
    Natural,
}

impl AccidentalMark {
    pub fn for_alter(alter: i8) -> Option<Self> {
        match alter {
            1 => Some(AccidentalMark::Sharp),
            -1 => Some(AccidentalMark::Flat),
            0 => Some(AccidentalMark::Natural),
            _ => None,
        }
    }

    pub fn alter(&self) -> i8 {
        match self {
            AccidentalMark::Sharp => 1,
            AccidentalMark::Flat => -1,
            AccidentalMark::Natural => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccidentalMark::Sharp => "sharp",
            AccidentalMark::Flat => "flat",
            AccidentalMark::Natural => "natural",
        }
    }

    pub fn from_musicxml(name: &str) -> Option<Self> {
        match name.trim() {
            "sharp" => Some(AccidentalMark::Sharp),
            "flat" => Some(AccidentalMark::Flat),
            "natural" => Some(AccidentalMark::Natural),
            _ => None,
        }
    }
}

/// Accidentals in force within one measure of one staff.
#[derive(Debug, Clone)]
pub struct MeasureAccidentals {
    key_alters: [i8; 7],
    marked: HashMap<(Step, i8), i8>,
}

impl MeasureAccidentals {
    pub fn new(key: &KeySignature) -> Self {
        Self {
            key_alters: Step::ALL.map(|step| key.alter_for(step)),
            marked: HashMap::new(),
        }
    }

    /// Alteration an unmarked note at this letter and octave carries.
    pub fn implied(&self, step: Step, octave: i8) -> i8 {
        self.marked
            .get(&(step, octave))
            .copied()
            .unwrap_or(self.key_alters[step as usize])
    }

    /// Mark to write before `pitch`, if any. Records the mark for the rest of the measure.
    pub fn mark_for(&mut self, pitch: &Pitch) -> Option<AccidentalMark> {
        if self.implied(pitch.step, pitch.octave) == pitch.alter {
            return None;
        }
        self.marked.insert((pitch.step, pitch.octave), pitch.alter);
        AccidentalMark::for_alter(pitch.alter)
    }

    /// Alteration of a note read from a score. An explicit `<alter>` wins, then
    /// a written mark, then whatever is already in force.
    pub fn resolve(&mut self, step: Step, octave: i8, alter: Option<i8>, mark: Option<AccidentalMark>) -> i8 {
        if let Some(mark) = mark {
            self.marked.insert((step, octave), mark.alter());
        }
        match (alter, mark) {
            (Some(alter), _) => alter,
            (None, Some(mark)) => mark.alter(),
            (None, None) => self.implied(step, octave),
        }
    }
}
