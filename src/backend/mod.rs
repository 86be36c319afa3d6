//! Audio backend boundary
//!
//! The engine drives playback through a queue of hardware buffers attached to
//! a single playback source, in the style of OpenAL: fill a buffer, queue it,
//! later ask how many queued buffers the device has finished with, unqueue
//! those and fill them again. [`AudioBackend`] is that capability set; the
//! engine treats its implementation as opaque.
//!
//! - [`mock::MockBackend`] - deterministic, scriptable backend for tests
//! - `cpal_device::CpalBackend` - real output device (feature `device`)

#[cfg(feature = "device")]
pub mod cpal_device;
pub mod mock;

#[cfg(feature = "device")]
pub use cpal_device::CpalBackend;
pub use mock::{MockBackend, MockHandle};

use crate::error::BackendError;
use std::fmt;

/// Handle naming one hardware buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Handle naming a playback source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceHandle(pub u32);

/// PCM layout of submitted buffer data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Mono16,
    Stereo16,
}

impl Format {
    /// Format for a node declaring `channels` output channels
    pub fn for_channels(channels: usize) -> Option<Self> {
        match channels {
            1 => Some(Format::Mono16),
            2 => Some(Format::Stereo16),
            _ => None,
        }
    }

    pub fn channels(self) -> usize {
        match self {
            Format::Mono16 => 1,
            Format::Stereo16 => 2,
        }
    }
}

/// Playback state of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Created but never played
    Initial,
    Playing,
    /// Paused from outside the engine; the engine does not resume it
    Paused,
    /// Ran out of queued buffers (or was stopped)
    Stopped,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceState::Initial => "initial",
            SourceState::Playing => "playing",
            SourceState::Paused => "paused",
            SourceState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Native audio API used by the engine
///
/// Every call returns immediately; none of them waits for the device.
pub trait AudioBackend: Send {
    fn open_device(&mut self) -> Result<(), BackendError>;

    fn close_device(&mut self);

    /// Allocate `n` new buffer handles
    fn gen_buffers(&mut self, n: usize) -> Result<Vec<BufferHandle>, BackendError>;

    fn delete_buffers(&mut self, buffers: &[BufferHandle]);

    fn gen_source(&mut self) -> Result<SourceHandle, BackendError>;

    fn delete_source(&mut self, source: SourceHandle);

    /// Queued buffers the source has finished playing and not yet unqueued
    fn buffers_processed(&mut self, source: SourceHandle) -> usize;

    fn queue_buffers(
        &mut self,
        source: SourceHandle,
        buffers: &[BufferHandle],
    ) -> Result<(), BackendError>;

    /// Release processed buffers from the front of the source's queue
    fn unqueue_buffers(
        &mut self,
        source: SourceHandle,
        buffers: &[BufferHandle],
    ) -> Result<(), BackendError>;

    /// Replace the contents of `buffer` with little-endian PCM-16 `data`
    fn buffer_data(
        &mut self,
        buffer: BufferHandle,
        format: Format,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<(), BackendError>;

    fn source_state(&mut self, source: SourceHandle) -> SourceState;

    fn play(&mut self, source: SourceHandle) -> Result<(), BackendError>;

    /// Pending device-level error code, cleared by reading
    fn device_error(&mut self) -> Option<i32>;

    /// Pending error code from the last call, cleared by reading
    fn last_error(&mut self) -> Option<i32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_channels() {
        assert_eq!(Format::for_channels(1), Some(Format::Mono16));
        assert_eq!(Format::for_channels(2), Some(Format::Stereo16));
        assert_eq!(Format::for_channels(0), None);
        assert_eq!(Format::for_channels(6), None);
        assert_eq!(Format::Stereo16.channels(), 2);
    }
}
