//! Error types for netlist parsing, dependency resolution and circuit alteration.
//!
//! Parse-time and dependency-time failures are recoverable: the parser and the
//! resolver log them, count them and keep going. Transformation failures only
//! abort the scenario being built. Missing input files, broken configuration
//! and an unusable alteration mode abort the whole run.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A statement did not match the shape its kind requires.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A block was closed with the name of a different statement.
    #[error("line {line}: `{found}` closes `{expected}`")]
    StructuralEndMismatch {
        line: usize,
        expected: String,
        found: String,
    },

    /// End of file reached while a block was still open.
    #[error("line {line}: `{opener}` is never closed")]
    UnterminatedBlock { line: usize, opener: String },

    /// A statement could not be located inside a scenario clone.
    #[error("statement `{0}` is missing from the scenario copy")]
    TransformationTargetMissing(String),

    /// A netlist, or a netlist it includes, does not exist.
    #[error("cannot open netlist {path:?}: {source}")]
    MissingInputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The requested alteration mode cannot be carried out with this configuration.
    #[error("unusable alteration mode: {0}")]
    UnresolvableMode(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("invalid vocabulary pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("cannot format netlist text")]
    Format(#[from] std::fmt::Error),
}

impl Error {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }

    /// Structural errors abort the file being parsed in strict mode.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::StructuralEndMismatch { .. } | Error::UnterminatedBlock { .. }
        )
    }

    /// Errors that must stop the whole run regardless of parsing mode.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MissingInputFile { .. } | Error::Config(_) | Error::UnresolvableMode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
