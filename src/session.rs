//! Playback session
//!
//! A [`Session`] owns the audio backend, the single playback source, the
//! buffer ring and the running statistics. [`Session::tick`] is the unit of
//! work the render loop repeats: fill every buffer the ring hands out with a
//! freshly rendered block, queue them, and keep the source playing.

use crate::adaptive_buffer::{AdaptiveBuffer, BufferStats};
use crate::backend::{AudioBackend, Format, SourceHandle, SourceState};
use crate::config::EngineConfig;
use crate::error::{SndError, SndResult};
use crate::pcm::encode_pcm16;
use crate::sound_graph::SoundGraph;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Outcome of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Buffers filled and queued
    pub buffers: usize,
    /// Source state observed after queueing
    pub state: SourceState,
    /// The source had stopped and was restarted
    pub underrun: bool,
}

/// One open device driving one source
pub struct Session<B: AudioBackend> {
    backend: B,
    ring: AdaptiveBuffer,
    source: Option<SourceHandle>,
    graph: Option<Arc<Mutex<SoundGraph>>>,
    format: Format,
    sample_rate: f32,
    frames: usize,
    /// PCM scratch, reused every buffer
    out: Vec<u8>,

    underruns: u64,
    tick_time: Duration,
    tick_count: u64,
    /// Logical tick index handed to the graph; one per filled buffer
    tc: u64,

    pub(crate) running: bool,
    open: bool,
}

fn lock_graph(graph: &Mutex<SoundGraph>) -> MutexGuard<'_, SoundGraph> {
    graph.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn silence(out: &mut Vec<u8>, frames: usize) {
    out.clear();
    out.resize(frames * 2, 0);
}

impl<B: AudioBackend> Session<B> {
    /// Open the device with a ring that hands out `ring_size` buffers per tick
    ///
    /// # Errors
    /// - `SndError::InvalidRingSize` unless `ring_size` is a power of two;
    ///   checked before the device is touched
    /// - `SndError::Backend` if the device fails to open
    pub fn open(backend: B, ring_size: usize) -> SndResult<Self> {
        Self::open_ring(backend, ring_size, EngineConfig::default().ring_warn_len)
    }

    /// Open the device using `config`'s ring settings
    pub fn open_with_config(backend: B, config: &EngineConfig) -> SndResult<Self> {
        config.validate()?;
        Self::open_ring(backend, config.ring_size, config.ring_warn_len)
    }

    fn open_ring(mut backend: B, ring_size: usize, warn_len: usize) -> SndResult<Self> {
        if !ring_size.is_power_of_two() {
            return Err(SndError::InvalidRingSize(ring_size));
        }
        backend.open_device()?;
        debug!(ring_size, "audio device opened");

        Ok(Self {
            backend,
            ring: AdaptiveBuffer::new(ring_size, warn_len),
            source: None,
            graph: None,
            format: Format::Mono16,
            sample_rate: 0.0,
            frames: 0,
            out: Vec::new(),
            underruns: 0,
            tick_time: Duration::ZERO,
            tick_count: 0,
            tc: 0,
            running: false,
            open: true,
        })
    }

    /// Attach `graph` as the session's only source
    ///
    /// The root node's channel count selects the PCM format.
    ///
    /// # Errors
    /// - `SndError::SourceAttached` if a graph is already attached
    /// - `SndError::NoRoot` if the graph has no root node
    /// - `SndError::UnsupportedChannels` unless the root is mono or stereo
    /// - `SndError::Cycle` / `SndError::UnknownNode` if the graph cannot be ordered
    /// - `SndError::Backend` if the source cannot be created
    pub fn attach(&mut self, graph: Arc<Mutex<SoundGraph>>) -> SndResult<()> {
        if self.source.is_some() {
            return Err(SndError::SourceAttached);
        }

        let (format, sample_rate, frames) = {
            let mut g = lock_graph(&graph);
            let root = g.root_node().ok_or(SndError::NoRoot)?;
            let channels = root.channels();
            let format =
                Format::for_channels(channels).ok_or(SndError::UnsupportedChannels(channels))?;
            g.validate()?;
            (format, g.sample_rate(), g.frames())
        };

        let source = self.backend.gen_source()?;
        self.source = Some(source);
        self.graph = Some(graph);
        self.format = format;
        self.sample_rate = sample_rate;
        self.frames = frames;
        self.out = Vec::with_capacity(frames * 2);

        if let Some(latency) = self.latency() {
            info!(?latency, ?format, "source attached");
        }
        Ok(())
    }

    /// Run one tick
    ///
    /// Backend failures are logged and do not stop the tick. A graph that
    /// fails to render contributes silence.
    ///
    /// # Errors
    /// `SndError::NoSource` if nothing is attached
    pub fn tick(&mut self) -> SndResult<TickReport> {
        let start = Instant::now();
        let source = self.source.ok_or(SndError::NoSource)?;
        let graph = self.graph.as_ref().ok_or(SndError::NoSource)?;

        if let Some(code) = self.backend.device_error() {
            warn!(code, "unknown device error");
        }
        if let Some(code) = self.backend.last_error() {
            warn!(code, "unknown error");
        }

        let bufs = self.ring.acquire(&mut self.backend, source);

        {
            let mut graph = lock_graph(graph);
            for &buf in &bufs {
                self.tc += 1;
                match graph.render(self.tc) {
                    Ok(()) => match graph.root_samples() {
                        Some(samples) => encode_pcm16(samples, &mut self.out),
                        None => silence(&mut self.out, self.frames),
                    },
                    Err(e) => {
                        error!(tick = self.tc, "render failed: {}", e);
                        silence(&mut self.out, self.frames);
                    }
                }

                if let Err(e) =
                    self.backend
                        .buffer_data(buf, self.format, &self.out, self.sample_rate as u32)
                {
                    warn!("{}", e);
                }
            }
        }

        if !bufs.is_empty() {
            if let Err(e) = self.backend.queue_buffers(source, &bufs) {
                warn!("{}", e);
            }
        }

        let state = self.backend.source_state(source);
        let underrun = match state {
            SourceState::Initial => {
                self.play(source);
                false
            }
            SourceState::Playing | SourceState::Paused => false,
            SourceState::Stopped => {
                self.underruns += 1;
                debug!(underruns = self.underruns, "source stopped; restarting");
                self.play(source);
                true
            }
        };

        self.tick_time += start.elapsed();
        self.tick_count += 1;

        Ok(TickReport {
            buffers: bufs.len(),
            state,
            underrun,
        })
    }

    fn play(&mut self, source: SourceHandle) {
        if let Err(e) = self.backend.play(source) {
            warn!("{}", e);
        }
    }

    /// Queued audio ahead of the device: frames × ring size / sample rate
    ///
    /// `None` until a graph is attached.
    pub fn latency(&self) -> Option<Duration> {
        if self.source.is_none() || self.sample_rate <= 0.0 {
            return None;
        }
        let secs = self.frames as f64 / self.sample_rate as f64 * self.ring.size() as f64;
        Some(Duration::from_secs_f64(secs))
    }

    /// Handles currently in the buffer ring
    pub fn ring_len(&self) -> usize {
        self.ring.len()
    }

    pub fn ring_size(&self) -> usize {
        self.ring.size()
    }

    /// Times the source was found stopped and restarted
    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Mean wall time per tick, zero before the first tick
    pub fn tick_average(&self) -> Duration {
        if self.tick_count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.tick_time.as_nanos() / self.tick_count as u128;
        Duration::from_nanos(nanos as u64)
    }

    pub fn buffer_stats(&self) -> &BufferStats {
        self.ring.stats()
    }

    /// PCM format chosen at attach
    pub fn format(&self) -> Format {
        self.format
    }

    pub fn is_attached(&self) -> bool {
        self.source.is_some()
    }

    /// A render loop currently owns this session's ticks
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Release every buffer and the source, then close the device
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if !self.open {
            return;
        }
        self.ring.release_all(&mut self.backend);
        if let Some(source) = self.source.take() {
            self.backend.delete_source(source);
        }
        self.graph = None;
        self.backend.close_device();
        self.open = false;
        debug!("audio device closed");
    }
}

impl<B: AudioBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}
