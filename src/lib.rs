//! # sndgraph - Real-time Audio Synthesis Engine
//!
//! A small graph of sample-generating nodes driven by a periodic render loop
//! that fills and queues hardware playback buffers.
//!
//! ## Core Features
//!
//! - **Wave Tables**: Shared, power-of-two single-cycle tables
//! - **Sound Nodes**: Table-lookup oscillators with frequency, amplitude and
//!   phase modulation; gain stages
//! - **Adaptive Buffering**: Recycles buffers the device has finished with,
//!   grows the ring instead of waiting when it has not
//! - **Render Scheduler**: Dedicated thread ticking at half the queue latency,
//!   restarting the source after underruns
//!
//! ## Quick Start
//!
//! ```rust
//! use sndgraph::backend::MockBackend;
//! use sndgraph::session::Session;
//! use sndgraph::sound_graph::SoundGraph;
//! use sndgraph::wave_table::WaveTable;
//! use std::sync::{Arc, Mutex};
//!
//! let mut graph = SoundGraph::new(44100.0, 256);
//! let lfo = graph.oscillator(WaveTable::sine(256)?, 2.0, None)?;
//! let carrier = graph.oscillator(WaveTable::sine(1024)?, 440.0, Some(lfo))?;
//! let out = graph.gain(0.5, carrier)?;
//! graph.set_root(out)?;
//!
//! let mut session = Session::open(MockBackend::new(), 4)?;
//! session.attach(Arc::new(Mutex::new(graph)))?;
//! session.tick()?;
//! assert_eq!(session.ring_len(), 4);
//! # Ok::<(), sndgraph::error::SndError>(())
//! ```
//!
//! For real output, enable the `device` feature and use
//! `backend::CpalBackend`, then hand the session to
//! [`scheduler::RenderLoop::start`].
//!
//! ## Module Organization
//!
//! - [`wave_table`]: Immutable sample tables and standard generators
//! - [`sound_node`]: The `SoundNode` trait and shared node state
//! - [`nodes`]: Oscillator and gain nodes
//! - [`sound_graph`]: Node arena rendered in dependency order
//! - [`adaptive_buffer`]: Hardware buffer ring
//! - [`session`]: Device, source and per-tick work
//! - [`scheduler`]: Timer-driven render thread
//! - [`backend`]: Native audio boundary, mock and cpal implementations
//! - [`config`]: Engine settings from files and environment
//!
//! The crate logs through `tracing` and never installs a subscriber.

pub mod adaptive_buffer;
pub mod backend;
pub mod config;
pub mod dependency_graph;
pub mod error;
pub mod nodes;
pub mod pcm;
pub mod scheduler;
pub mod session;
pub mod sound_graph;
pub mod sound_node;
pub mod wave_table;

pub use error::{BackendError, SndError, SndResult};
pub use sound_node::{NodeId, SoundNode};
