use std::error::Error;
use std::fmt;

/// Error taxonomy for the R bridge.
///
/// `Syntax` is raised at command-build time, before any engine round trip,
/// and is meant to be surfaced as a validation message. `Evaluation` carries
/// the engine's own message text for a rejected or failed command.
/// `Classification` means a result object could not be matched to a known
/// result class; it is deterministic given engine state and must not be
/// retried. `ShapeMismatch` is a data-integrity fault between parallel
/// arrays and aborts the operation.
#[derive(Debug)]
pub enum RanovaError {
    Syntax(String),
    Evaluation(String),
    Classification(String),
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },
    Transport(String),
    Io(std::io::Error),
    Serde(serde_json::Error),
}

impl fmt::Display for RanovaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RanovaError::Syntax(msg) => write!(f, "Syntax error: {msg}"),
            RanovaError::Evaluation(msg) => write!(f, "Engine evaluation failed: {msg}"),
            RanovaError::Classification(msg) => write!(f, "Unclassifiable result object: {msg}"),
            RanovaError::ShapeMismatch {
                context,
                expected,
                actual,
            } => write!(
                f,
                "Shape mismatch in {context}: expected {expected} elements, got {actual}"
            ),
            RanovaError::Transport(msg) => write!(f, "Engine transport error: {msg}"),
            RanovaError::Io(err) => write!(f, "I/O error: {err}"),
            RanovaError::Serde(err) => write!(f, "JSON error: {err}"),
        }
    }
}

impl Error for RanovaError {}

impl From<std::io::Error> for RanovaError {
    fn from(err: std::io::Error) -> Self {
        RanovaError::Io(err)
    }
}

impl From<serde_json::Error> for RanovaError {
    fn from(err: serde_json::Error) -> Self {
        RanovaError::Serde(err)
    }
}
