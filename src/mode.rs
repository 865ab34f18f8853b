//! Processor modes and their human-readable labels.
//!
//! The backend selects its processing pipeline from the `processor_type`
//! form field. Each [`ProcessorMode`] has two spellings: a kebab-case name used
//! on the command line and in logs, and the wire tag the backend expects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label shown for processor tags missing from [`PROCESSOR_LABELS`].
pub const GENERIC_LABEL: &str = "Processing";

/// Fixed lookup table: wire tag → display label.
const PROCESSOR_LABELS: &[(&str, &str)] = &[
    ("word_to_html", "Word to HTML"),
    ("latex_equations", "Equation Extraction (LaTeX)"),
    ("scan_verify", "Scan & Verify"),
    ("full_word", "Complete Word Conversion"),
];

/// The kind of transformation requested for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessorMode {
    /// Word document → standalone HTML page. (default)
    #[default]
    ConvertToHtml,
    /// Pull equations out of the document as LaTeX.
    ExtractEquations,
    /// Structural scan producing a verification report.
    VerifyAndScan,
    /// HTML conversion including images, footnotes and equations.
    CompleteConversion,
}

impl ProcessorMode {
    pub const ALL: [ProcessorMode; 4] = [
        ProcessorMode::ConvertToHtml,
        ProcessorMode::ExtractEquations,
        ProcessorMode::VerifyAndScan,
        ProcessorMode::CompleteConversion,
    ];

    /// Kebab-case name, e.g. `extract-equations`.
    pub fn name(self) -> &'static str {
        match self {
            ProcessorMode::ConvertToHtml => "convert-to-html",
            ProcessorMode::ExtractEquations => "extract-equations",
            ProcessorMode::VerifyAndScan => "verify-and-scan",
            ProcessorMode::CompleteConversion => "complete-conversion",
        }
    }

    /// Value sent as the `processor_type` form field.
    pub fn wire_tag(self) -> &'static str {
        match self {
            ProcessorMode::ConvertToHtml => "word_to_html",
            ProcessorMode::ExtractEquations => "latex_equations",
            ProcessorMode::VerifyAndScan => "scan_verify",
            ProcessorMode::CompleteConversion => "full_word",
        }
    }

    pub fn label(self) -> &'static str {
        processor_label(self.wire_tag())
    }

    /// Resolve either spelling back to a mode.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.wire_tag().eq_ignore_ascii_case(tag) || m.name().eq_ignore_ascii_case(tag))
    }
}

impl fmt::Display for ProcessorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProcessorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| {
            let known: Vec<&str> = Self::ALL.iter().map(|m| m.name()).collect();
            format!("unknown processor mode '{s}' (expected one of: {})", known.join(", "))
        })
    }
}

/// Human-readable label for a processor tag reported by the backend.
///
/// Accepts wire tags and kebab-case names. Anything else maps to
/// [`GENERIC_LABEL`].
pub fn processor_label(tag: &str) -> &'static str {
    let wire = ProcessorMode::from_tag(tag)
        .map(ProcessorMode::wire_tag)
        .unwrap_or(tag);
    PROCESSOR_LABELS
        .iter()
        .find(|(t, _)| *t == wire)
        .map(|(_, label)| *label)
        .unwrap_or(GENERIC_LABEL)
}
