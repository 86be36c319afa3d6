//! Gain node - scales one upstream node by a fixed multiplier
//!
//! Output[i] = Input[i] * multiplier for all samples.

use crate::sound_node::{NodeId, SoundCore, SoundNode, Upstream};
use std::any::Any;

/// Gain node: out = input * multiplier
///
/// The graph renders the input before this node, so `render` only reads the
/// input's current block.
///
/// # Example
/// ```ignore
/// let osc = graph.oscillator(WaveTable::sine(256)?, 440.0, None)?;  // NodeId 0
/// let quiet = graph.gain(0.5, osc)?;                                 // NodeId 1
/// graph.set_root(quiet)?;
/// ```
pub struct GainNode {
    core: SoundCore,
    input: NodeId,
    multiplier: f32,
}

impl GainNode {
    /// Gain - multiplies `input` by `multiplier`
    ///
    /// # Parameters
    /// - `multiplier`: scalar applied to every sample (negative inverts)
    /// - `input`: NodeId providing the signal to scale
    pub fn new(multiplier: f32, input: NodeId, sample_rate: f32, frames: usize) -> Self {
        Self {
            core: SoundCore::mono(sample_rate, frames),
            input,
            multiplier,
        }
    }

    /// Get the input node ID
    pub fn input(&self) -> NodeId {
        self.input
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    pub fn set_multiplier(&mut self, multiplier: f32) {
        self.multiplier = multiplier;
    }
}

impl SoundNode for GainNode {
    fn core(&self) -> &SoundCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SoundCore {
        &mut self.core
    }

    fn render(&mut self, _tick: u64, upstream: &Upstream<'_>) {
        let muted = self.core.is_muted();
        let multiplier = self.multiplier;
        let input = upstream.samples(self.input);
        let out = self.core.samples_mut();

        match input {
            Some(signal) if !muted => {
                debug_assert_eq!(signal.len(), out.len(), "Signal input length mismatch");
                for (o, &x) in out.iter_mut().zip(signal) {
                    *o = x * multiplier;
                }
            }
            // muted, or upstream missing
            _ => out.fill(0.0),
        }
    }

    fn inputs(&self) -> Vec<NodeId> {
        vec![self.input]
    }

    fn name(&self) -> &str {
        "GainNode"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
