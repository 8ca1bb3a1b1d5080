//! The single error type produced anywhere in the compile/run pipeline.
//!
//! Every phase (lexer, parser, checker, interpreter, file I/O) raises the
//! same [PrescribeError], tagged with one of the seven [ErrorKind]s. This
//! mirrors the spirit of `gdlk`'s `SourceError`/`WithSource` wrapping (a
//! typed error rendered against its originating source line) but collapses
//! to a single flat type, since every phase here ultimately needs to
//! produce exactly one diagnostic line, never a per-phase collection.

use failure::Fail;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};

/// The seven diagnostic categories from the external interface contract.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    SyntaxError,
    NameError,
    TypeError,
    RangeError,
    RuntimeError,
    FileError,
    AccessError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::NameError => "NameError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::RuntimeError => "RuntimeError",
            ErrorKind::FileError => "FileError",
            ErrorKind::AccessError => "AccessError",
        };
        write!(f, "{}", s)
    }
}

/// A single typed diagnostic, carrying the source line it originated from.
/// `Display` produces exactly the line format required by the external
/// interface: `<ErrorKind> at line <N>: <message>`.
#[derive(Debug, Fail, Serialize)]
pub struct PrescribeError {
    pub kind: ErrorKind,
    pub line: usize,
    pub message: String,
}

impl PrescribeError {
    pub fn new(kind: ErrorKind, line: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            message: message.into(),
        }
    }

    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, line, message)
    }

    pub fn name(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NameError, line, message)
    }

    pub fn type_error(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, line, message)
    }

    pub fn range(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RangeError, line, message)
    }

    pub fn runtime(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeError, line, message)
    }

    pub fn file(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FileError, line, message)
    }

    pub fn access(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AccessError, line, message)
    }
}

impl Display for PrescribeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}: {}", self.kind, self.line, self.message)
    }
}

/// Convenience alias used throughout the pipeline.
pub type PrResult<T> = Result<T, PrescribeError>;
