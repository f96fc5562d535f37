//! Define the `Location` and `AnalysisError` types and the process exit codes
//! associated with each failure class.

use std::fmt;

/// Exit code for a failure while lexing the instruction stream.
pub const PARSE_INSTRUCTIONS_FAILED: i32 = 10;
/// Exit code for an unresolved or malformed label.
pub const PARSE_LABELS_FAILED: i32 = 11;
/// Exit code for a malformed control-flow graph.
pub const INCORRECT_BLOCK_CONSTRUCTION: i32 = 12;
/// Exit code for a validator that exists but could not be inlined.
pub const INCLUDE_VALIDATOR_FAILED: i32 = 13;
/// Exit code for exceeding the global analysis deadline.
pub const GLOBAL_TIMEOUT: i32 = 14;

/// The source location of a lexed instruction or a front-end error.
///
/// Line numbers start from 1; location 0 means the error is not tied to a
/// particular source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// Line number in the analyzed TEAL file.
    pub line_number: usize,
}

impl Location {
    pub fn new(line_number: usize) -> Self {
        Self { line_number }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.line_number == 0 {
            write!(f, "<input>")
        } else {
            write!(f, "line {}", self.line_number)
        }
    }
}

/// Errors produced by the analysis pipeline.
///
/// The first three variants are fatal pre-analysis failures and carry the
/// source line they were detected on where one exists.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("{location}: {message}")]
    ParseInstructions { location: Location, message: String },

    #[error("{location}: {message}")]
    ParseLabels { location: Location, message: String },

    #[error("incorrect basic block construction: {0}")]
    BlockConstruction(String),

    #[error("failed to include validator: {0}")]
    IncludeValidator(String),

    #[error("analysis exceeded the global timeout")]
    Timeout,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    /// Build a lexer error at `line`.
    pub fn parse_instructions(line: usize, message: impl Into<String>) -> Self {
        Self::ParseInstructions {
            location: Location::new(line),
            message: message.into(),
        }
    }

    /// Build a label-resolution error at `line`.
    pub fn parse_labels(line: usize, message: impl Into<String>) -> Self {
        Self::ParseLabels {
            location: Location::new(line),
            message: message.into(),
        }
    }

    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ParseInstructions { .. } | Self::Io(_) => PARSE_INSTRUCTIONS_FAILED,
            Self::ParseLabels { .. } => PARSE_LABELS_FAILED,
            Self::BlockConstruction(_) => INCORRECT_BLOCK_CONSTRUCTION,
            Self::IncludeValidator(_) => INCLUDE_VALIDATOR_FAILED,
            Self::Timeout => GLOBAL_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_display() {
        assert_eq!(Location::new(7).to_string(), "line 7");
        assert_eq!(Location::default().to_string(), "<input>");
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            AnalysisError::parse_instructions(1, "x").exit_code(),
            AnalysisError::parse_labels(1, "x").exit_code(),
            AnalysisError::BlockConstruction("x".into()).exit_code(),
            AnalysisError::IncludeValidator("x".into()).exit_code(),
            AnalysisError::Timeout.exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
