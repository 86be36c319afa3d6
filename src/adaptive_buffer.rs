/// Adaptive hardware buffer ring
///
/// The device consumes queued buffers at its own pace. Each tick the engine
/// needs `size` buffers to fill: when the device has finished with at least
/// that many they are unqueued and recycled, otherwise fresh handles are
/// allocated and the ring grows. Neither path waits on the device.
use crate::backend::{AudioBackend, BufferHandle, SourceHandle};
use tracing::{debug, warn};

/// Ring of hardware buffer handles
///
/// # Invariants
/// - `idx < bufs.len()` once the ring is non-empty
/// - `idx` is a multiple of `size`
/// - `bufs` only grows, until [`AdaptiveBuffer::release_all`]
#[derive(Debug)]
pub struct AdaptiveBuffer {
    /// Every handle ever allocated, in queue order
    bufs: Vec<BufferHandle>,

    /// Handles handed out per acquire (power of two)
    size: usize,

    /// Start of the oldest queued group
    idx: usize,

    stats: BufferStats,

    /// Ring length that triggers a one-time warning
    warn_len: usize,
    warned: bool,
}

/// Statistics for ring usage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Acquires that grew the ring
    pub allocations: usize,

    /// Acquires that recycled processed buffers
    pub reuses: usize,

    /// Backend calls that failed during acquire
    pub failures: usize,
}

impl AdaptiveBuffer {
    /// Create an empty ring
    ///
    /// # Arguments
    /// * `size` - Buffers per acquire, already validated as a power of two
    /// * `warn_len` - Ring length past which growth is logged (0 disables)
    pub fn new(size: usize, warn_len: usize) -> Self {
        Self {
            bufs: Vec::new(),
            size,
            idx: 0,
            stats: BufferStats::default(),
            warn_len,
            warned: false,
        }
    }

    /// Handles ready to be filled and queued on `source`
    ///
    /// Returns exactly `size` handles or none. If the backend fails to
    /// allocate, or allocates fewer than `size`, the failure is logged and
    /// nothing is returned for this tick.
    pub fn acquire<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        source: SourceHandle,
    ) -> Vec<BufferHandle> {
        let processed = backend.buffers_processed(source);

        if processed >= self.size {
            if let Some(group) = self.bufs.get(self.idx..self.idx + self.size) {
                let bufs = group.to_vec();
                self.idx = (self.idx + self.size) % self.bufs.len();
                if let Err(e) = backend.unqueue_buffers(source, &bufs) {
                    self.stats.failures += 1;
                    warn!("{}", e);
                }
                self.stats.reuses += 1;
                return bufs;
            }
        }

        match backend.gen_buffers(self.size) {
            Ok(bufs) if bufs.len() != self.size => {
                // a partial group would break the ring's alignment
                self.stats.failures += 1;
                warn!(
                    wanted = self.size,
                    got = bufs.len(),
                    "short buffer allocation; dropping it"
                );
                if !bufs.is_empty() {
                    backend.delete_buffers(&bufs);
                }
                Vec::new()
            }
            Ok(bufs) => {
                self.bufs.extend_from_slice(&bufs);
                self.stats.allocations += 1;
                debug!(ring_len = self.bufs.len(), processed, "buffer ring grew");
                if self.warn_len > 0 && !self.warned && self.bufs.len() > self.warn_len {
                    self.warned = true;
                    warn!(
                        ring_len = self.bufs.len(),
                        warn_len = self.warn_len,
                        "buffer ring keeps growing; device is not consuming buffers"
                    );
                }
                bufs
            }
            Err(e) => {
                self.stats.failures += 1;
                warn!("{}", e);
                Vec::new()
            }
        }
    }

    /// Delete every handle and empty the ring
    pub fn release_all<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) {
        if !self.bufs.is_empty() {
            backend.delete_buffers(&self.bufs);
        }
        self.bufs.clear();
        self.idx = 0;
    }

    /// Total handles in the ring
    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cursor(&self) -> usize {
        self.idx
    }

    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockOp, Processed};

    fn setup(processed: Processed) -> (MockBackend, SourceHandle) {
        let mut backend = MockBackend::new();
        backend.handle().set_processed(processed);
        let source = backend.gen_source().unwrap();
        (backend, source)
    }

    /// Acquire and queue, the way a tick does
    fn cycle(ring: &mut AdaptiveBuffer, backend: &mut MockBackend, src: SourceHandle) -> usize {
        let bufs = ring.acquire(backend, src);
        backend.queue_buffers(src, &bufs).unwrap();
        bufs.len()
    }

    #[test]
    fn test_first_acquire_allocates() {
        let (mut backend, src) = setup(Processed::AllQueued);
        let mut ring = AdaptiveBuffer::new(4, 0);

        assert_eq!(cycle(&mut ring, &mut backend, src), 4);
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.stats().allocations, 1);
        assert_eq!(ring.stats().reuses, 0);
    }

    #[test]
    fn test_recycles_in_ring_order() {
        let (mut backend, src) = setup(Processed::Fixed(2));
        let mut ring = AdaptiveBuffer::new(2, 0);
        let handle = backend.handle();

        // grow to two groups while nothing is processed
        handle.set_processed(Processed::Never);
        let first = ring.acquire(&mut backend, src);
        backend.queue_buffers(src, &first).unwrap();
        let second = ring.acquire(&mut backend, src);
        backend.queue_buffers(src, &second).unwrap();
        assert_eq!(ring.len(), 4);

        handle.set_processed(Processed::Fixed(2));
        assert_eq!(ring.acquire(&mut backend, src), first);
        assert_eq!(ring.cursor(), 2);
        backend.queue_buffers(src, &first).unwrap();
        assert_eq!(ring.acquire(&mut backend, src), second);
        assert_eq!(ring.cursor(), 0);
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_processed_below_size_grows() {
        let (mut backend, src) = setup(Processed::Fixed(1));
        let mut ring = AdaptiveBuffer::new(2, 0);

        cycle(&mut ring, &mut backend, src);
        cycle(&mut ring, &mut backend, src);
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.stats().reuses, 0);
    }

    #[test]
    fn test_gen_failure_returns_nothing() {
        let (mut backend, src) = setup(Processed::Never);
        backend.handle().fail(MockOp::GenBuffers, 40964);
        let mut ring = AdaptiveBuffer::new(4, 0);

        assert!(ring.acquire(&mut backend, src).is_empty());
        assert!(ring.is_empty());
        assert_eq!(ring.stats().failures, 1);

        assert_eq!(ring.acquire(&mut backend, src).len(), 4);
    }

    #[test]
    fn test_short_allocation_keeps_ring_aligned() {
        let (mut backend, src) = setup(Processed::Never);
        let handle = backend.handle();
        let mut ring = AdaptiveBuffer::new(4, 0);
        cycle(&mut ring, &mut backend, src);

        handle.short_gen(3);
        assert!(ring.acquire(&mut backend, src).is_empty());
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.stats().failures, 1);
        assert_eq!(ring.stats().allocations, 1);
        assert_eq!(handle.buffers_deleted(), 3);

        cycle(&mut ring, &mut backend, src);
        assert_eq!(ring.len(), 8);

        // both full groups recycle without running past the end
        handle.set_processed(Processed::AllQueued);
        assert_eq!(ring.acquire(&mut backend, src).len(), 4);
        assert_eq!(ring.cursor(), 4);
        assert_eq!(ring.acquire(&mut backend, src).len(), 4);
        assert_eq!(ring.cursor(), 0);
    }

    #[test]
    fn test_unqueue_failure_still_recycles() {
        let (mut backend, src) = setup(Processed::AllQueued);
        let mut ring = AdaptiveBuffer::new(2, 0);
        cycle(&mut ring, &mut backend, src);

        backend.handle().fail(MockOp::Unqueue, 40963);
        assert_eq!(ring.acquire(&mut backend, src).len(), 2);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.stats().failures, 1);
        assert_eq!(ring.stats().reuses, 1);
    }

    #[test]
    fn test_release_all_deletes_handles() {
        let (mut backend, src) = setup(Processed::Never);
        let handle = backend.handle();
        let mut ring = AdaptiveBuffer::new(2, 0);
        cycle(&mut ring, &mut backend, src);
        cycle(&mut ring, &mut backend, src);

        ring.release_all(&mut backend);
        assert!(ring.is_empty());
        assert_eq!(handle.buffers_deleted(), 4);
        assert_eq!(handle.buffers_allocated(), 0);
    }

    #[test]
    fn test_warn_threshold_only_logs() {
        let (mut backend, src) = setup(Processed::Never);
        let mut ring = AdaptiveBuffer::new(1, 2);
        for _ in 0..5 {
            cycle(&mut ring, &mut backend, src);
        }
        assert!(ring.warned);
        assert_eq!(ring.len(), 5);
    }
}
