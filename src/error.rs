// src/error.rs

//! Error types for the cookbook engine
//!
//! Errors map onto the failure taxonomy of a recipe lifecycle:
//! configuration, dependency, build and test assertion errors are fatal to
//! the current cook and are never retried. The remaining variants cover
//! parsing, fetching and filesystem failures.

use std::fmt::Write as _;
use thiserror::Error;

/// Maximum number of captured output bytes carried in an error message
const OUTPUT_EXCERPT_LIMIT: usize = 4096;

/// Errors produced while declaring, building or testing a recipe
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing Settings/Options combination
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A requirement is malformed or cannot be resolved to one version
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// An external generator or compiler invocation failed
    #[error("Build error in {phase} phase: `{command}` exited with {}\n{output}", describe_exit(.exit_code))]
    Build {
        phase: String,
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// An artifact ran but did not behave as the recipe expects
    #[error("Test assertion failed for {artifact}: {reason}\ncommand: `{command}`\n{output}")]
    TestAssertion {
        artifact: String,
        command: String,
        reason: String,
        output: String,
    },

    /// A lifecycle phase was invoked out of order
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Another cook holds the working directory
    #[error("Working directory is locked by another cook: {0}")]
    Locked(String),

    /// Recipe, profile or index could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Filesystem failure with context
    #[error("I/O error: {0}")]
    IoError(String),

    /// A required file or directory does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Downloaded source did not match its recorded checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Source download failed
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Raw I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Name of the lifecycle phase that reports this error
    pub fn phase(&self) -> &str {
        match self {
            Self::Configuration(_) | Self::Dependency(_) => "configure",
            Self::Build { phase, .. } => phase,
            Self::TestAssertion { .. } => "test",
            _ => "cook",
        }
    }

    /// Whether this error belongs to the configuration taxonomy
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Whether this error belongs to the dependency taxonomy
    pub fn is_dependency(&self) -> bool {
        matches!(self, Self::Dependency(_))
    }

    /// Whether this error is a failed external build invocation
    pub fn is_build(&self) -> bool {
        matches!(self, Self::Build { .. })
    }

    /// Whether this error is a failed test assertion
    pub fn is_test_assertion(&self) -> bool {
        matches!(self, Self::TestAssertion { .. })
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (killed or timed out)".to_string(),
    }
}

/// Format captured stdout/stderr for inclusion in an error
///
/// Long output keeps its tail, where compilers and test binaries report the
/// failure.
pub fn output_excerpt(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();
    for (label, text) in [("stdout", stdout), ("stderr", stderr)] {
        let text = text.trim_end();
        if text.is_empty() {
            continue;
        }
        let tail = if text.len() > OUTPUT_EXCERPT_LIMIT {
            let mut start = text.len() - OUTPUT_EXCERPT_LIMIT;
            while !text.is_char_boundary(start) {
                start += 1;
            }
            &text[start..]
        } else {
            text
        };
        let _ = writeln!(out, "--- {} ---\n{}", label, tail);
    }
    out
}

/// Result type for cookbook operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_carries_reproduction_context() {
        let err = Error::Build {
            phase: "build".to_string(),
            command: "cmake --build build".to_string(),
            exit_code: Some(2),
            output: "--- stderr ---\nundefined reference".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("cmake --build build"));
        assert!(message.contains("exit code 2"));
        assert!(message.contains("undefined reference"));
        assert_eq!(err.phase(), "build");
        assert!(err.is_build());
    }

    #[test]
    fn test_output_excerpt_keeps_tail() {
        let long = format!("{}END", "x".repeat(OUTPUT_EXCERPT_LIMIT * 2));
        let excerpt = output_excerpt(&long, "");
        assert!(excerpt.contains("END"));
        assert!(excerpt.len() < OUTPUT_EXCERPT_LIMIT + 64);
        assert!(!excerpt.contains("stderr"));
    }

    #[test]
    fn test_timeout_has_no_exit_code() {
        assert!(describe_exit(&None).contains("timed out"));
    }
}
