//! Real-time output through cpal
//! Works with JACK, ALSA, CoreAudio, WASAPI, etc.
//!
//! cpal pulls samples from a callback instead of accepting queued buffers, so
//! this backend keeps the buffer queue itself. The callback drains queued PCM
//! in order, moves each fully played buffer to the processed list, and stops
//! the source when the queue runs dry.

use super::{AudioBackend, BufferHandle, Format, SourceHandle, SourceState};
use crate::error::BackendError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{bounded, Sender};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Code reported for failures that cpal describes only as text
pub const DEVICE_FAILURE: i32 = -1;
/// Code reported for unknown handles and for buffers still on the queue
pub const INVALID_HANDLE: i32 = 0xA001;

struct PcmBuffer {
    samples: Vec<f32>,
    channels: usize,
}

struct Playback {
    buffers: HashMap<BufferHandle, PcmBuffer>,
    pending: VecDeque<BufferHandle>,
    played: VecDeque<BufferHandle>,
    /// Frame position inside the front pending buffer
    cursor: usize,
    state: SourceState,
    source: Option<SourceHandle>,
    next_id: u32,
    device_error: Option<i32>,
}

impl Playback {
    fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            pending: VecDeque::new(),
            played: VecDeque::new(),
            cursor: 0,
            state: SourceState::Initial,
            source: None,
            next_id: 1,
            device_error: None,
        }
    }

    /// Queued on the source and not yet unqueued
    fn is_queued(&self, buffer: &BufferHandle) -> bool {
        self.pending.contains(buffer) || self.played.contains(buffer)
    }

    fn fill<T>(&mut self, output: &mut [T], channels: usize)
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        for frame in output.chunks_mut(channels) {
            let next = if self.state == SourceState::Playing {
                self.next_frame()
            } else {
                None
            };

            match next {
                Some((handle, position)) => {
                    let Some(buf) = self.buffers.get(&handle) else {
                        frame.fill(T::from_sample(0.0));
                        continue;
                    };
                    for (ch, out) in frame.iter_mut().enumerate() {
                        let src_ch = ch % buf.channels;
                        *out = T::from_sample(buf.samples[position * buf.channels + src_ch]);
                    }
                }
                None => frame.fill(T::from_sample(0.0)),
            }
        }
    }

    /// Advance to the next frame to play, retiring exhausted buffers
    fn next_frame(&mut self) -> Option<(BufferHandle, usize)> {
        loop {
            let Some(&front) = self.pending.front() else {
                self.state = SourceState::Stopped;
                return None;
            };
            let frames = self
                .buffers
                .get(&front)
                .map(|b| b.samples.len() / b.channels)
                .unwrap_or(0);

            if self.cursor < frames {
                let position = self.cursor;
                self.cursor += 1;
                return Some((front, position));
            }

            self.pending.pop_front();
            self.played.push_back(front);
            self.cursor = 0;
        }
    }
}

fn lock(playback: &Mutex<Playback>) -> MutexGuard<'_, Playback> {
    playback.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Output device backend
///
/// The cpal stream lives on its own thread (`sndgraph-device`) so the backend
/// itself can move into the render thread.
pub struct CpalBackend {
    sample_rate: u32,
    playback: Arc<Mutex<Playback>>,
    stop_tx: Option<Sender<()>>,
    device_thread: Option<JoinHandle<()>>,
    last_error: Option<i32>,
}

impl CpalBackend {
    /// Backend for the default output device, opened at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            playback: Arc::new(Mutex::new(Playback::new())),
            stop_tx: None,
            device_thread: None,
            last_error: None,
        }
    }

    fn fail(&mut self, op: &'static str, code: i32) -> BackendError {
        self.last_error = Some(code);
        BackendError::new(op, code)
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        playback: Arc<Mutex<Playback>>,
    ) -> Result<cpal::Stream, cpal::BuildStreamError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels = config.channels as usize;
        let errors = Arc::clone(&playback);
        device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                lock(&playback).fill(data, channels);
            },
            move |err| {
                error!("Audio stream error: {}", err);
                lock(&errors).device_error = Some(DEVICE_FAILURE);
            },
            None,
        )
    }

    fn run_stream(
        sample_rate: u32,
        playback: Arc<Mutex<Playback>>,
    ) -> Result<cpal::Stream, String> {
        let host = cpal::default_host();
        info!("Audio host: {:?}", host.id());

        let device = host
            .default_output_device()
            .ok_or("No audio output device found")?;
        info!("Audio device: {}", device.name().unwrap_or_default());

        let supported = device.default_output_config().map_err(|e| e.to_string())?;
        let format = supported.sample_format();
        let mut config: cpal::StreamConfig = supported.into();
        config.sample_rate = cpal::SampleRate(sample_rate);
        info!("Audio config: {:?}", config);

        let stream = match format {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, playback),
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, playback),
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, playback),
            other => return Err(format!("Unsupported sample format {:?}", other)),
        }
        .map_err(|e| e.to_string())?;

        stream.play().map_err(|e| e.to_string())?;
        Ok(stream)
    }
}

impl AudioBackend for CpalBackend {
    fn open_device(&mut self) -> Result<(), BackendError> {
        if self.device_thread.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let playback = Arc::clone(&self.playback);
        let sample_rate = self.sample_rate;

        let spawned = thread::Builder::new()
            .name("sndgraph-device".to_string())
            .spawn(move || match Self::run_stream(sample_rate, playback) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Hold the stream until close_device drops the sender
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn device thread: {}", e);
                return Err(self.fail("open device", DEVICE_FAILURE));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Audio stream started at {} Hz", sample_rate);
                self.stop_tx = Some(stop_tx);
                self.device_thread = Some(handle);
                Ok(())
            }
            Ok(Err(msg)) => {
                error!("Failed to open audio device: {}", msg);
                let _ = handle.join();
                Err(self.fail("open device", DEVICE_FAILURE))
            }
            Err(_) => {
                let _ = handle.join();
                Err(self.fail("open device", DEVICE_FAILURE))
            }
        }
    }

    fn close_device(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.device_thread.take() {
            if handle.join().is_err() {
                warn!("Device thread panicked during shutdown");
            }
        }
    }

    fn gen_buffers(&mut self, n: usize) -> Result<Vec<BufferHandle>, BackendError> {
        let mut playback = lock(&self.playback);
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let handle = BufferHandle(playback.next_id);
            playback.next_id += 1;
            playback.buffers.insert(
                handle,
                PcmBuffer {
                    samples: Vec::new(),
                    channels: 1,
                },
            );
            out.push(handle);
        }
        Ok(out)
    }

    fn delete_buffers(&mut self, buffers: &[BufferHandle]) {
        let mut playback = lock(&self.playback);
        for b in buffers {
            playback.buffers.remove(b);
            playback.pending.retain(|q| q != b);
            playback.played.retain(|q| q != b);
        }
    }

    fn gen_source(&mut self) -> Result<SourceHandle, BackendError> {
        let mut playback = lock(&self.playback);
        let handle = SourceHandle(playback.next_id);
        playback.next_id += 1;
        playback.source = Some(handle);
        playback.state = SourceState::Initial;
        Ok(handle)
    }

    fn delete_source(&mut self, source: SourceHandle) {
        let mut playback = lock(&self.playback);
        if playback.source == Some(source) {
            playback.source = None;
            playback.pending.clear();
            playback.played.clear();
            playback.cursor = 0;
            playback.state = SourceState::Stopped;
        }
    }

    fn buffers_processed(&mut self, source: SourceHandle) -> usize {
        let playback = lock(&self.playback);
        if playback.source == Some(source) {
            playback.played.len()
        } else {
            0
        }
    }

    fn queue_buffers(
        &mut self,
        source: SourceHandle,
        buffers: &[BufferHandle],
    ) -> Result<(), BackendError> {
        let mut playback = lock(&self.playback);
        let valid = playback.source == Some(source)
            && buffers.iter().enumerate().all(|(i, b)| {
                playback.buffers.contains_key(b)
                    && !playback.is_queued(b)
                    && !buffers[..i].contains(b)
            });
        if !valid {
            drop(playback);
            return Err(self.fail("queue buffers", INVALID_HANDLE));
        }
        playback.pending.extend(buffers.iter().copied());
        Ok(())
    }

    fn unqueue_buffers(
        &mut self,
        source: SourceHandle,
        buffers: &[BufferHandle],
    ) -> Result<(), BackendError> {
        let mut playback = lock(&self.playback);
        let valid = playback.source == Some(source)
            && buffers.iter().all(|b| playback.played.contains(b));
        if !valid {
            drop(playback);
            return Err(self.fail("unqueue buffers", INVALID_HANDLE));
        }
        playback.played.retain(|q| !buffers.contains(q));
        Ok(())
    }

    fn buffer_data(
        &mut self,
        buffer: BufferHandle,
        format: Format,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<(), BackendError> {
        if sample_rate != self.sample_rate {
            warn!(
                expected = self.sample_rate,
                found = sample_rate,
                "buffer sample rate differs from device rate"
            );
        }

        let mut playback = lock(&self.playback);
        if !playback.buffers.contains_key(&buffer) || playback.is_queued(&buffer) {
            drop(playback);
            return Err(self.fail("buffer data", INVALID_HANDLE));
        }
        if let Some(buf) = playback.buffers.get_mut(&buffer) {
            buf.channels = format.channels();
            buf.samples.clear();
            buf.samples.extend(
                data.chunks_exact(2)
                    .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32),
            );
        }
        Ok(())
    }

    fn source_state(&mut self, _source: SourceHandle) -> SourceState {
        lock(&self.playback).state
    }

    fn play(&mut self, source: SourceHandle) -> Result<(), BackendError> {
        let mut playback = lock(&self.playback);
        if playback.source != Some(source) {
            drop(playback);
            return Err(self.fail("play source", INVALID_HANDLE));
        }
        playback.state = SourceState::Playing;
        Ok(())
    }

    fn device_error(&mut self) -> Option<i32> {
        lock(&self.playback).device_error.take()
    }

    fn last_error(&mut self) -> Option<i32> {
        self.last_error.take()
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close_device();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(frames: &[&[f32]]) -> (Playback, Vec<BufferHandle>) {
        let mut playback = Playback::new();
        let mut handles = Vec::new();
        for (i, samples) in frames.iter().enumerate() {
            let handle = BufferHandle(i as u32 + 1);
            playback.buffers.insert(
                handle,
                PcmBuffer {
                    samples: samples.to_vec(),
                    channels: 1,
                },
            );
            playback.pending.push_back(handle);
            handles.push(handle);
        }
        playback.state = SourceState::Playing;
        (playback, handles)
    }

    #[test]
    fn test_callback_drains_queue_in_order() {
        let (mut playback, handles) = queued(&[&[0.5, 0.25], &[-0.5]]);
        let mut out = [0.0f32; 6];
        playback.fill(&mut out, 2);

        assert_eq!(out, [0.5, 0.5, 0.25, 0.25, -0.5, -0.5]);
        assert_eq!(playback.played.len(), 1);
        assert_eq!(playback.played[0], handles[0]);
    }

    #[test]
    fn test_underrun_stops_source() {
        let (mut playback, _) = queued(&[&[1.0]]);
        let mut out = [9.0f32; 3];
        playback.fill(&mut out, 1);

        assert_eq!(out, [1.0, 0.0, 0.0]);
        assert_eq!(playback.state, SourceState::Stopped);
        assert_eq!(playback.played.len(), 1);
    }

    #[test]
    fn test_silent_until_played() {
        let (mut playback, _) = queued(&[&[1.0]]);
        playback.state = SourceState::Initial;
        let mut out = [9.0f32; 2];
        playback.fill(&mut out, 1);

        assert_eq!(out, [0.0, 0.0]);
        assert!(playback.played.is_empty());
    }

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_queue_rejects_buffer_already_queued() {
        let mut backend = CpalBackend::new(44100);
        let source = backend.gen_source().unwrap();
        let bufs = backend.gen_buffers(2).unwrap();
        backend.queue_buffers(source, &bufs[..1]).unwrap();

        let err = backend.queue_buffers(source, &bufs).unwrap_err();
        assert_eq!(err.code, INVALID_HANDLE);
        assert_eq!(backend.last_error(), Some(INVALID_HANDLE));
        assert_eq!(lock(&backend.playback).pending.len(), 1);

        // the same handle twice in one call
        assert!(backend.queue_buffers(source, &[bufs[1], bufs[1]]).is_err());
        backend.queue_buffers(source, &bufs[1..]).unwrap();
        assert_eq!(lock(&backend.playback).pending.len(), 2);
    }

    #[test]
    fn test_queue_rejects_unknown_buffer() {
        let mut backend = CpalBackend::new(44100);
        let source = backend.gen_source().unwrap();
        let err = backend
            .queue_buffers(source, &[BufferHandle(99)])
            .unwrap_err();
        assert_eq!(err.code, INVALID_HANDLE);
        assert!(lock(&backend.playback).pending.is_empty());
    }

    #[test]
    fn test_buffer_data_rejects_queued_buffer() {
        let mut backend = CpalBackend::new(44100);
        let source = backend.gen_source().unwrap();
        let bufs = backend.gen_buffers(1).unwrap();
        backend
            .buffer_data(bufs[0], Format::Mono16, &pcm(&[i16::MAX]), 44100)
            .unwrap();
        backend.queue_buffers(source, &bufs).unwrap();

        let err = backend
            .buffer_data(bufs[0], Format::Mono16, &pcm(&[0, 0]), 44100)
            .unwrap_err();
        assert_eq!(err.code, INVALID_HANDLE);
        assert_eq!(lock(&backend.playback).buffers[&bufs[0]].samples, vec![1.0]);

        // still rejected once played, until unqueued
        {
            let mut playback = lock(&backend.playback);
            playback.state = SourceState::Playing;
            let mut out = [0.0f32; 2];
            playback.fill(&mut out, 1);
            assert_eq!(playback.played.len(), 1);
        }
        assert!(backend
            .buffer_data(bufs[0], Format::Mono16, &pcm(&[0]), 44100)
            .is_err());
        backend.unqueue_buffers(source, &bufs).unwrap();
        backend
            .buffer_data(bufs[0], Format::Mono16, &pcm(&[0]), 44100)
            .unwrap();
    }
}
