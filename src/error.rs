//! Error types for the synthesis engine
//!
//! Configuration mistakes surface as [`SndError`] at the call that caused
//! them. Failures reported by the native audio backend are [`BackendError`]s;
//! the render path logs those and keeps going rather than propagating them.

use crate::sound_node::NodeId;
use std::fmt;

/// A failed call into the audio backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    /// Backend operation that failed (e.g. "queue buffers")
    pub op: &'static str,
    /// Native error code as reported by the backend
    pub code: i32,
}

impl BackendError {
    pub fn new(op: &'static str, code: i32) -> Self {
        Self { op, code }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed [err={}]", self.op, self.code)
    }
}

impl std::error::Error for BackendError {}

/// Errors returned synchronously to the caller
#[derive(Debug)]
pub enum SndError {
    /// Buffer ring request size must be a non-zero power of two
    InvalidRingSize(usize),
    /// Wave table length must be a non-zero power of two
    InvalidTableLength(usize),
    /// Only mono and stereo PCM-16 are supported
    UnsupportedChannels(usize),
    /// Node block length differs from the graph's frame size
    FrameMismatch { expected: usize, found: usize },
    /// Node sample rate differs from the graph's sample rate
    SampleRateMismatch { expected: f32, found: f32 },
    /// A handle that does not name a node in the graph
    UnknownNode(NodeId),
    /// Node inputs form a cycle; the graph cannot be ordered
    Cycle(NodeId),
    /// Graph has no root node to play
    NoRoot,
    /// Session has no source attached yet
    NoSource,
    /// A source is already attached to this session
    SourceAttached,
    /// A render loop is already running for this session
    AlreadyRunning,
    /// Invalid engine configuration value
    Config(String),
    /// Failure while opening the device or creating the source
    Backend(BackendError),
    /// IO error (config files)
    Io(std::io::Error),
}

impl fmt::Display for SndError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SndError::InvalidRingSize(n) => write!(f, "ring size ({}) not a power of 2", n),
            SndError::InvalidTableLength(n) => {
                write!(f, "wave table length ({}) not a power of 2", n)
            }
            SndError::UnsupportedChannels(n) => {
                write!(f, "can't handle input with channels({})", n)
            }
            SndError::FrameMismatch { expected, found } => write!(
                f,
                "node block length {} does not match frame size {}",
                found, expected
            ),
            SndError::SampleRateMismatch { expected, found } => write!(
                f,
                "node sample rate {} does not match graph sample rate {}",
                found, expected
            ),
            SndError::UnknownNode(id) => write!(f, "unknown node {}", id),
            SndError::Cycle(id) => write!(f, "node {} is part of a modulation cycle", id),
            SndError::NoRoot => write!(f, "graph has no root node"),
            SndError::NoSource => write!(f, "no source attached"),
            SndError::SourceAttached => write!(f, "source already attached"),
            SndError::AlreadyRunning => write!(f, "render loop already running"),
            SndError::Config(msg) => write!(f, "config error: {}", msg),
            SndError::Backend(e) => write!(f, "backend error: {}", e),
            SndError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for SndError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SndError::Backend(e) => Some(e),
            SndError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for SndError {
    fn from(e: BackendError) -> Self {
        SndError::Backend(e)
    }
}

impl From<std::io::Error> for SndError {
    fn from(e: std::io::Error) -> Self {
        SndError::Io(e)
    }
}

/// Result type for engine operations
pub type SndResult<T> = Result<T, SndError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display_names_operation() {
        let err = BackendError::new("unqueue buffers", 40963);
        assert_eq!(err.to_string(), "unqueue buffers failed [err=40963]");
    }

    #[test]
    fn test_backend_error_converts() {
        let err: SndError = BackendError::new("open device", 1).into();
        assert!(matches!(err, SndError::Backend(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
