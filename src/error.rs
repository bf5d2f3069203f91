//! Error types for the ingestion pipeline.
//!
//! The enum is `#[non_exhaustive]` so variants can be added without breaking
//! callers; consumers should keep a fallback match arm.
//!
//! # Design Notes
//! - Variants carry the offending path where one exists; messages are
//!   human-readable and not stable for machine parsing.
//! - I/O errors preserve their source so diagnostics stay actionable.
//! - Corrupt gzip is a whole-file failure (`DecompressionFailed`), never a
//!   per-line condition.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors from a single `build` invocation.
///
/// A failed build returns exactly one of these; no partial validator is
/// retained. The orchestrator reports the *first* error observed and drains
/// the remaining pipeline stages before returning.
#[derive(Debug)]
#[non_exhaustive]
pub enum BuildError {
    /// The input path does not exist or is not a directory.
    DirectoryMissing { path: PathBuf },
    /// The directory holds a number of regular files other than three.
    WrongFileCount { path: PathBuf, found: usize },
    /// A reader could not open its input file.
    FileOpenFailed { path: PathBuf, source: io::Error },
    /// The gzip header or stream is invalid or truncated.
    DecompressionFailed { path: PathBuf, source: io::Error },
    /// Mid-stream I/O failure or line-buffer overflow.
    ReadFailed { path: PathBuf, source: io::Error },
    /// An external cancellation signal fired mid-build.
    Cancelled,
    /// A worker or reader thread panicked; the payload message is preserved.
    InternalPanic { message: String },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectoryMissing { path } => {
                write!(f, "input directory missing: {}", path.display())
            }
            Self::WrongFileCount { path, found } => write!(
                f,
                "expected 3 regular files in {}, found {found}",
                path.display()
            ),
            Self::FileOpenFailed { path, source } => {
                write!(f, "failed to open {}: {source}", path.display())
            }
            Self::DecompressionFailed { path, source } => {
                write!(f, "gzip decompression failed for {}: {source}", path.display())
            }
            Self::ReadFailed { path, source } => {
                write!(f, "read failed for {}: {source}", path.display())
            }
            Self::Cancelled => write!(f, "build cancelled"),
            Self::InternalPanic { message } => {
                write!(f, "pipeline thread panicked: {message}")
            }
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FileOpenFailed { source, .. }
            | Self::DecompressionFailed { source, .. }
            | Self::ReadFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn display_includes_path_and_count() {
        let err = BuildError::WrongFileCount {
            path: PathBuf::from("/data/codes"),
            found: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("/data/codes"), "message: {msg}");
        assert!(msg.contains("found 2"), "message: {msg}");
    }

    #[test]
    fn io_variants_expose_source() {
        let err = BuildError::ReadFailed {
            path: PathBuf::from("f1.txt"),
            source: io::Error::new(io::ErrorKind::InvalidData, "line exceeds cap"),
        };
        assert!(err.source().is_some());
        assert!(BuildError::Cancelled.source().is_none());
    }
}
