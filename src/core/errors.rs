//! Error types for the clone detection engine.
//!
//! This module provides structured error handling for the anti-unification
//! pipeline. Errors fall into two classes: recoverable problems tied to a
//! single input file or statement sequence, which the pipeline logs and
//! skips past, and invariant violations, which indicate a bug in the engine
//! itself and must abort the run. [`CloneError::is_recoverable`] lets
//! callers tell the two apart without matching on message text.

use std::num::ParseIntError;

use thiserror::Error;

/// Main result type for engine operations.
pub type Result<T> = std::result::Result<T, CloneError>;

/// Errors produced by the clone detection engine.
#[derive(Error, Debug)]
pub enum CloneError {
    /// A single input file could not be parsed into an AST. The pipeline
    /// skips the file and continues with the rest of the corpus.
    #[error("parse error in {file}: {message}")]
    Parse {
        /// File the error occurred in.
        file: String,
        /// Error description.
        message: String,
        /// Line number, if known.
        line: Option<usize>,
    },

    /// A statement sequence exceeded `MAX_SEQUENCE_LENGTH` and was dropped
    /// (unless `force` is set).
    #[error("sequence at {file}:{line} has {length} statements, exceeding the size limit")]
    OversizedSequence {
        /// File the sequence starts in.
        file: String,
        /// First covered line of the sequence.
        line: usize,
        /// Length of the dropped sequence.
        length: usize,
    },

    /// The input corpus produced no usable statement sequences.
    #[error("no statement sequences available for clone detection: {message}")]
    EmptyInput {
        /// Error description.
        message: String,
    },

    /// Configuration failed validation before a run started.
    #[error("configuration error: {message}")]
    Config {
        /// Error description.
        message: String,
        /// Configuration field that caused the error.
        field: Option<String>,
    },

    /// An internal invariant was violated. Always fatal: the engine aborts
    /// rather than risk silently producing an incorrect clone report.
    #[error("invariant violated: {message}")]
    Invariant {
        /// Description of the violated invariant.
        message: String,
        /// Additional context, if any.
        context: Option<String>,
    },
}

impl CloneError {
    /// Create a new parse error.
    pub fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
            line: None,
        }
    }

    /// Create a new parse error at a known line.
    pub fn parse_at(file: impl Into<String>, message: impl Into<String>, line: usize) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
            line: Some(line),
        }
    }

    /// Create a new oversized-sequence error.
    pub fn oversized_sequence(file: impl Into<String>, line: usize, length: usize) -> Self {
        Self::OversizedSequence {
            file: file.into(),
            line,
            length,
        }
    }

    /// Create a new empty-input error.
    pub fn empty_input(message: impl Into<String>) -> Self {
        Self::EmptyInput {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new configuration error with field context.
    pub fn config_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new invariant-violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
            context: None,
        }
    }

    /// Add context to an existing error.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        match &mut self {
            Self::Invariant { context: ctx, .. } => {
                *ctx = Some(context.into());
            }
            Self::Config { field, .. } if field.is_none() => {
                *field = Some(context.into());
            }
            _ => {}
        }
        self
    }

    /// Whether this error is a per-input problem the pipeline can log and
    /// continue past (`Parse`, `OversizedSequence`, `EmptyInput`), as
    /// opposed to an `Invariant` violation or bad `Config` that must abort
    /// the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::OversizedSequence { .. } | Self::EmptyInput { .. }
        )
    }
}

impl From<ParseIntError> for CloneError {
    fn from(err: ParseIntError) -> Self {
        Self::config(format!("invalid integer: {err}"))
    }
}

/// Result extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error result.
    fn context(self, msg: &'static str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<CloneError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }

    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| e.into().with_context(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(CloneError::parse("a.py", "unexpected token").is_recoverable());
        assert!(CloneError::oversized_sequence("a.py", 10, 2000).is_recoverable());
        assert!(CloneError::empty_input("no files").is_recoverable());
        assert!(!CloneError::invariant("negative add_cost").is_recoverable());
        assert!(!CloneError::config("bad value").is_recoverable());
    }

    #[test]
    fn config_field_via_with_context() {
        let err = CloneError::config("must be positive").with_context("size_threshold");
        match err {
            CloneError::Config { field, .. } => assert_eq!(field.as_deref(), Some("size_threshold")),
            _ => panic!("expected Config variant"),
        }
    }

    #[test]
    fn invariant_context() {
        let err = CloneError::invariant("negative add_cost").with_context("build_unifiers");
        match err {
            CloneError::Invariant { context, .. } => {
                assert_eq!(context.as_deref(), Some("build_unifiers"))
            }
            _ => panic!("expected Invariant variant"),
        }
    }

    #[test]
    fn result_extension() {
        let result: std::result::Result<i32, ParseIntError> = "x".parse::<i32>();
        let wrapped: Result<i32> = result.context("parsing hashing_depth");
        assert!(wrapped.is_err());
    }
}
