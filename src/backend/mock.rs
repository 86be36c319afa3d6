//! Mock Backend for Testing
//!
//! Provides a deterministic backend that never touches audio hardware. The
//! "device" plays nothing; instead a [`MockHandle`] scripts what it reports
//! (processed buffer counts, source states, error codes) and records what the
//! engine asked of it.

use super::{AudioBackend, BufferHandle, Format, SourceHandle, SourceState};
use crate::error::BackendError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Error code the mock reports for misuse (mirrors AL_INVALID_VALUE)
pub const INVALID_VALUE: i32 = 0xA003;

/// How the mock answers `buffers_processed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    /// Device never finishes a buffer
    Never,
    /// Everything queued has already played
    AllQueued,
    /// Always report this many (capped by the queue length)
    Fixed(usize),
}

/// Operations that can be scripted to fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Open,
    GenBuffers,
    GenSource,
    Queue,
    Unqueue,
    BufferData,
    Play,
}

/// Last payload submitted to a buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub format: Format,
    pub data: Vec<u8>,
    pub sample_rate: u32,
}

#[derive(Debug)]
struct MockState {
    open: bool,
    next_id: u32,
    buffers: HashSet<BufferHandle>,
    deleted_buffers: usize,
    source: Option<SourceHandle>,
    source_deleted: bool,
    queue: VecDeque<BufferHandle>,
    processed: Processed,
    state: SourceState,
    scripted_states: VecDeque<SourceState>,
    failures: HashMap<MockOp, i32>,
    /// Cap on the next `gen_buffers` result
    short_gen: Option<usize>,
    device_error: Option<i32>,
    last_error: Option<i32>,
    submissions: HashMap<BufferHandle, Submission>,
    submit_count: usize,
    queued_total: usize,
    unqueued_total: usize,
    plays: usize,
}

impl MockState {
    fn new() -> Self {
        Self {
            open: false,
            next_id: 1,
            buffers: HashSet::new(),
            deleted_buffers: 0,
            source: None,
            source_deleted: false,
            queue: VecDeque::new(),
            processed: Processed::AllQueued,
            state: SourceState::Initial,
            scripted_states: VecDeque::new(),
            failures: HashMap::new(),
            short_gen: None,
            device_error: None,
            last_error: None,
            submissions: HashMap::new(),
            submit_count: 0,
            queued_total: 0,
            unqueued_total: 0,
            plays: 0,
        }
    }

    fn take_failure(&mut self, op: MockOp, name: &'static str) -> Result<(), BackendError> {
        match self.failures.remove(&op) {
            Some(code) => Err(BackendError::new(name, code)),
            None => Ok(()),
        }
    }

    fn check_source(&self, source: SourceHandle, name: &'static str) -> Result<(), BackendError> {
        if self.source == Some(source) {
            Ok(())
        } else {
            Err(BackendError::new(name, INVALID_VALUE))
        }
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Deterministic in-memory backend
///
/// # Example
/// ```
/// use sndgraph::backend::mock::{MockBackend, Processed};
///
/// let backend = MockBackend::new();
/// let handle = backend.handle();
/// handle.set_processed(Processed::Never);
/// // move `backend` into a Session, keep `handle` for assertions
/// assert_eq!(handle.buffers_allocated(), 0);
/// ```
#[derive(Debug)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    /// Scripting and inspection handle sharing this backend's state
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl AudioBackend for MockBackend {
    fn open_device(&mut self) -> Result<(), BackendError> {
        let mut s = lock(&self.state);
        s.take_failure(MockOp::Open, "open device")?;
        s.open = true;
        Ok(())
    }

    fn close_device(&mut self) {
        lock(&self.state).open = false;
    }

    fn gen_buffers(&mut self, n: usize) -> Result<Vec<BufferHandle>, BackendError> {
        let mut s = lock(&self.state);
        s.take_failure(MockOp::GenBuffers, "generate buffers")?;
        let n = s.short_gen.take().map_or(n, |limit| n.min(limit));
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let handle = BufferHandle(s.next_id);
            s.next_id += 1;
            s.buffers.insert(handle);
            out.push(handle);
        }
        Ok(out)
    }

    fn delete_buffers(&mut self, buffers: &[BufferHandle]) {
        let mut s = lock(&self.state);
        for b in buffers {
            if s.buffers.remove(b) {
                s.deleted_buffers += 1;
            }
        }
    }

    fn gen_source(&mut self) -> Result<SourceHandle, BackendError> {
        let mut s = lock(&self.state);
        s.take_failure(MockOp::GenSource, "generate source")?;
        let handle = SourceHandle(s.next_id);
        s.next_id += 1;
        s.source = Some(handle);
        Ok(handle)
    }

    fn delete_source(&mut self, source: SourceHandle) {
        let mut s = lock(&self.state);
        if s.source == Some(source) {
            s.source_deleted = true;
            s.queue.clear();
        }
    }

    fn buffers_processed(&mut self, source: SourceHandle) -> usize {
        let s = lock(&self.state);
        if s.source != Some(source) {
            return 0;
        }
        match s.processed {
            Processed::Never => 0,
            Processed::AllQueued => s.queue.len(),
            Processed::Fixed(n) => n.min(s.queue.len()),
        }
    }

    fn queue_buffers(
        &mut self,
        source: SourceHandle,
        buffers: &[BufferHandle],
    ) -> Result<(), BackendError> {
        let mut s = lock(&self.state);
        s.take_failure(MockOp::Queue, "queue buffers")?;
        s.check_source(source, "queue buffers")?;
        s.queue.extend(buffers.iter().copied());
        s.queued_total += buffers.len();
        Ok(())
    }

    fn unqueue_buffers(
        &mut self,
        source: SourceHandle,
        buffers: &[BufferHandle],
    ) -> Result<(), BackendError> {
        let mut s = lock(&self.state);
        s.take_failure(MockOp::Unqueue, "unqueue buffers")?;
        s.check_source(source, "unqueue buffers")?;
        for b in buffers {
            match s.queue.iter().position(|q| q == b) {
                Some(pos) => {
                    s.queue.remove(pos);
                    s.unqueued_total += 1;
                }
                None => return Err(BackendError::new("unqueue buffers", INVALID_VALUE)),
            }
        }
        Ok(())
    }

    fn buffer_data(
        &mut self,
        buffer: BufferHandle,
        format: Format,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<(), BackendError> {
        let mut s = lock(&self.state);
        s.take_failure(MockOp::BufferData, "buffer data")?;
        if !s.buffers.contains(&buffer) {
            return Err(BackendError::new("buffer data", INVALID_VALUE));
        }
        s.submissions.insert(
            buffer,
            Submission {
                format,
                data: data.to_vec(),
                sample_rate,
            },
        );
        s.submit_count += 1;
        Ok(())
    }

    fn source_state(&mut self, _source: SourceHandle) -> SourceState {
        let mut s = lock(&self.state);
        match s.scripted_states.pop_front() {
            Some(state) => {
                s.state = state;
                state
            }
            None => s.state,
        }
    }

    fn play(&mut self, source: SourceHandle) -> Result<(), BackendError> {
        let mut s = lock(&self.state);
        s.take_failure(MockOp::Play, "play source")?;
        s.check_source(source, "play source")?;
        s.state = SourceState::Playing;
        s.plays += 1;
        Ok(())
    }

    fn device_error(&mut self) -> Option<i32> {
        lock(&self.state).device_error.take()
    }

    fn last_error(&mut self) -> Option<i32> {
        lock(&self.state).last_error.take()
    }
}

/// Shared handle for scripting a [`MockBackend`] and inspecting its calls
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    pub fn set_processed(&self, processed: Processed) {
        lock(&self.state).processed = processed;
    }

    /// Set the state reported until the next `play` or scripted state
    pub fn set_state(&self, state: SourceState) {
        lock(&self.state).state = state;
    }

    /// Queue states to report, one per `source_state` query
    pub fn push_states(&self, states: impl IntoIterator<Item = SourceState>) {
        lock(&self.state).scripted_states.extend(states);
    }

    /// Make the next call of `op` fail with `code`
    pub fn fail(&self, op: MockOp, code: i32) {
        lock(&self.state).failures.insert(op, code);
    }

    /// Make the next `gen_buffers` succeed with at most `n` handles
    pub fn short_gen(&self, n: usize) {
        lock(&self.state).short_gen = Some(n);
    }

    pub fn set_device_error(&self, code: i32) {
        lock(&self.state).device_error = Some(code);
    }

    pub fn set_last_error(&self, code: i32) {
        lock(&self.state).last_error = Some(code);
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    /// Live (not deleted) buffer handles
    pub fn buffers_allocated(&self) -> usize {
        lock(&self.state).buffers.len()
    }

    pub fn buffers_deleted(&self) -> usize {
        lock(&self.state).deleted_buffers
    }

    pub fn source_deleted(&self) -> bool {
        lock(&self.state).source_deleted
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.state).queue.len()
    }

    pub fn queued_total(&self) -> usize {
        lock(&self.state).queued_total
    }

    pub fn unqueued_total(&self) -> usize {
        lock(&self.state).unqueued_total
    }

    pub fn plays(&self) -> usize {
        lock(&self.state).plays
    }

    /// Number of successful `buffer_data` calls
    pub fn submissions(&self) -> usize {
        lock(&self.state).submit_count
    }

    pub fn submission(&self, buffer: BufferHandle) -> Option<Submission> {
        lock(&self.state).submissions.get(&buffer).cloned()
    }

    /// Handles currently queued, front first
    pub fn queued(&self) -> Vec<BufferHandle> {
        lock(&self.state).queue.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_modes() {
        let mut backend = MockBackend::new();
        let handle = backend.handle();
        let src = backend.gen_source().unwrap();
        let bufs = backend.gen_buffers(4).unwrap();
        backend.queue_buffers(src, &bufs).unwrap();

        assert_eq!(backend.buffers_processed(src), 4);
        handle.set_processed(Processed::Fixed(2));
        assert_eq!(backend.buffers_processed(src), 2);
        handle.set_processed(Processed::Fixed(10));
        assert_eq!(backend.buffers_processed(src), 4);
        handle.set_processed(Processed::Never);
        assert_eq!(backend.buffers_processed(src), 0);
    }

    #[test]
    fn test_unqueue_requires_queued_buffer() {
        let mut backend = MockBackend::new();
        let src = backend.gen_source().unwrap();
        let bufs = backend.gen_buffers(2).unwrap();
        backend.queue_buffers(src, &bufs[..1]).unwrap();

        assert!(backend.unqueue_buffers(src, &bufs[..1]).is_ok());
        let err = backend.unqueue_buffers(src, &bufs[1..]).unwrap_err();
        assert_eq!(err.code, INVALID_VALUE);
    }

    #[test]
    fn test_scripted_failure_fires_once() {
        let mut backend = MockBackend::new();
        let handle = backend.handle();
        handle.fail(MockOp::GenBuffers, 7);

        assert_eq!(backend.gen_buffers(1).unwrap_err().code, 7);
        assert_eq!(backend.gen_buffers(1).unwrap().len(), 1);
    }

    #[test]
    fn test_scripted_states_then_sticky() {
        let mut backend = MockBackend::new();
        let handle = backend.handle();
        let src = backend.gen_source().unwrap();
        handle.push_states([SourceState::Stopped]);

        assert_eq!(backend.source_state(src), SourceState::Stopped);
        assert_eq!(backend.source_state(src), SourceState::Stopped);
        backend.play(src).unwrap();
        assert_eq!(backend.source_state(src), SourceState::Playing);
        assert_eq!(handle.plays(), 1);
    }

    #[test]
    fn test_error_polls_clear() {
        let mut backend = MockBackend::new();
        let handle = backend.handle();
        handle.set_device_error(3);
        handle.set_last_error(4);

        assert_eq!(backend.device_error(), Some(3));
        assert_eq!(backend.device_error(), None);
        assert_eq!(backend.last_error(), Some(4));
        assert_eq!(backend.last_error(), None);
    }
}
