//! # Error Types
//!
//! Every fallible operation in the crate returns [`SightreadError`]. Builders and
//! parsers fail before producing any output, so a caller never sees a partial
//! document or a half-parsed score.
//!
//! ## Usage
//! ```rust
//! use sightread::{to_musicxml, BuildOptions, SightreadError};
//!
//! let options = BuildOptions::default();
//! match to_musicxml(&[], &[], &options) {
//!     Err(SightreadError::MissingTimeSignature) => {}
//!     other => panic!("unexpected: {:?}", other.map(|s| s.xml)),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SightreadError {
    /// The builder or parser was not given a time signature.
    #[error("Missing time signature")]
    MissingTimeSignature,

    /// The builder or parser was not given a key signature.
    #[error("Missing key signature")]
    MissingKeySignature,

    /// Invalid metadata value (key name, time signature, tempo).
    ///
    /// # Example
    /// ```
    /// # use sightread::SightreadError;
    /// let err = SightreadError::InvalidMetadata("time-signature must be in format N/D".to_string());
    /// assert_eq!(err.to_string(), "Invalid metadata: time-signature must be in format N/D");
    /// ```
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// A note token in a piece file could not be read.
    #[error("Invalid note: {0}")]
    InvalidNote(String),

    /// A duration that cannot be written as whole divisions with a named note type.
    #[error("Duration {duration} beats cannot be written with {divisions} divisions per beat")]
    UnrepresentableDuration { duration: f64, divisions: u32 },

    /// A note would cross a barline while notes are grouped into measures.
    #[error("Staff {staff}, measure {measure}: note of {beats} beats crosses the barline")]
    MeasureOverflow {
        staff: u8,
        measure: usize,
        beats: f64,
    },

    /// Malformed score document.
    ///
    /// # Example
    /// ```
    /// # use sightread::SightreadError;
    /// let err = SightreadError::ParseError {
    ///     measure: 3,
    ///     message: "note has no pitch".to_string(),
    /// };
    /// assert_eq!(err.to_string(), "Parse error at measure 3: note has no pitch");
    /// ```
    #[error("Parse error at measure {measure}: {message}")]
    ParseError { measure: usize, message: String },

    /// A parsed measure whose durations do not fill the time signature.
    #[error("Semantic error at measure {measure}: {message}")]
    SemanticError { measure: usize, message: String },

    /// A measure window that is empty or starts before measure 1.
    #[error("Invalid measure range {first}..={last}")]
    InvalidRange { first: usize, last: usize },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
