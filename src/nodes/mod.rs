//! Sound node implementations
//!
//! # Source Nodes (no inputs)
//! - [`oscillator::OscillatorNode`] - Wave table oscillator; its frequency,
//!   amplitude and phase inputs are optional modulators
//!
//! ## Processing Nodes
//! - [`gain::GainNode`] - Scale one upstream node by a multiplier
pub mod gain;
pub mod oscillator;

pub use gain::GainNode;
pub use oscillator::{OscillatorNode, DEFAULT_AMPLITUDE};
