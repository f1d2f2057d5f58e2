//! # Measure Validation
//!
//! A score can parse cleanly and still be rhythmically wrong: a staff whose
//! durations do not add up to the time signature. This module checks every
//! measure of a parsed score, per staff, within [`MEASURE_TOLERANCE`].
//!
//! ## Entry Point
//! `validate(score: &ParsedScore) -> Result<(), SightreadError>`
//!
//! Measures with no notes at all on both staves (an empty piece) pass.

use crate::error::SightreadError;
use crate::musicxml::{ParsedMeasure, ParsedScore};
use crate::note::{Note, TimeSignature, MEASURE_TOLERANCE};

/// Validate that every staff of every measure fills the time signature.
pub fn validate(score: &ParsedScore) -> Result<(), SightreadError> {
    for measure in &score.measures {
        validate_measure(measure, &score.time_signature)?;
    }
    Ok(())
}

fn validate_measure(measure: &ParsedMeasure, time_signature: &TimeSignature) -> Result<(), SightreadError> {
    if measure.right.is_empty() && measure.left.is_empty() {
        return Ok(());
    }

    let expected = time_signature.beats_per_measure();
    for (staff, notes) in [(1, &measure.right), (2, &measure.left)] {
        let actual = total_beats(notes);
        if (actual - expected).abs() > MEASURE_TOLERANCE {
            return Err(SightreadError::SemanticError {
                measure: measure.number,
                message: format!(
                    "Staff {} duration ({} beats) doesn't match time signature ({}/{} = {} beats)",
                    staff, actual, time_signature.beats, time_signature.beat_type, expected
                ),
            });
        }
    }
    Ok(())
}

fn total_beats(notes: &[Note]) -> f64 {
    notes.iter().map(|n| n.duration).sum()
}
