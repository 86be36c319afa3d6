/*!
Table-lookup oscillator node

Reads a [`WaveTable`] through a phase accumulator. Frequency, amplitude and
phase can each be modulated by another node's output.

The accumulator counts table positions and is never wrapped explicitly:
reads mask it with `table_len - 1`, which is why tables are a power of two
long. It also carries over from one tick to the next, so consecutive blocks
join without a phase jump.
*/

use crate::sound_node::{NodeId, SoundCore, SoundNode, Upstream};
use crate::wave_table::WaveTable;
use std::any::Any;

/// Amplitude multiplier for newly created oscillators
pub const DEFAULT_AMPLITUDE: f64 = 1.0;

/// Wave table oscillator with optional modulation sources
///
/// # Example
/// ```
/// use sndgraph::nodes::OscillatorNode;
/// use sndgraph::sound_node::{SoundNode, Upstream};
/// use sndgraph::wave_table::WaveTable;
///
/// let table = WaveTable::new(vec![1.0, 0.0, -1.0, 0.0]).unwrap();
/// // 1 Hz at a 4 Hz sample rate steps one table position per sample
/// let mut osc = OscillatorNode::new(table, 1.0, None, 4.0, 8);
/// osc.render(1, &Upstream::empty());
/// assert_eq!(osc.samples(), &[1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0, 0.0]);
/// ```
pub struct OscillatorNode {
    core: SoundCore,
    table: WaveTable,
    idx: f64,

    freq: f64,
    freq_mod: Option<NodeId>,

    amp: f64,
    amp_mod: Option<NodeId>,

    phase: f64,
    phase_mod: Option<NodeId>,
}

impl OscillatorNode {
    /// Create an oscillator reading `table` at `freq` Hz
    ///
    /// # Parameters
    /// - `table`: shared wave table
    /// - `freq`: base frequency in Hz (zero or negative is allowed)
    /// - `freq_mod`: optional node whose samples multiply the frequency
    /// - `sample_rate`: sample rate in Hz
    /// - `frames`: block length in samples
    pub fn new(
        table: WaveTable,
        freq: f64,
        freq_mod: Option<NodeId>,
        sample_rate: f32,
        frames: usize,
    ) -> Self {
        Self {
            core: SoundCore::mono(sample_rate, frames),
            table,
            idx: 0.0,
            freq,
            freq_mod,
            amp: DEFAULT_AMPLITUDE,
            amp_mod: None,
            phase: 0.0,
            phase_mod: None,
        }
    }

    /// Effective frequency at block position `i`
    pub fn frequency_at(&self, i: usize, upstream: &Upstream<'_>) -> f64 {
        match self.freq_mod {
            Some(id) => self.freq * upstream.sample(id, i) as f64,
            None => self.freq,
        }
    }

    pub fn set_frequency(&mut self, hz: f64, modulator: Option<NodeId>) {
        self.freq = hz;
        self.freq_mod = modulator;
    }

    /// Effective amplitude at block position `i`
    pub fn amplitude_at(&self, i: usize, upstream: &Upstream<'_>) -> f64 {
        match self.amp_mod {
            Some(id) => self.amp * upstream.sample(id, i) as f64,
            None => self.amp,
        }
    }

    pub fn set_amplitude(&mut self, mult: f64, modulator: Option<NodeId>) {
        self.amp = mult;
        self.amp_mod = modulator;
    }

    /// Read offset, in table positions, at block position `i`
    ///
    /// The modulator's sample is scaled by the table length. Without a
    /// modulator the offset is 0 whatever the base phase is set to.
    pub fn phase_offset_at(&self, i: usize, upstream: &Upstream<'_>) -> f64 {
        match self.phase_mod {
            Some(id) => self.table.len() as f64 * upstream.sample(id, i) as f64,
            None => 0.0,
        }
    }

    pub fn set_phase(&mut self, amount: f64, modulator: Option<NodeId>) {
        self.phase = amount;
        self.phase_mod = modulator;
    }

    pub fn frequency(&self) -> f64 {
        self.freq
    }

    pub fn amplitude(&self) -> f64 {
        self.amp
    }

    /// Base phase as last set; it only takes effect through a phase modulator
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Current accumulator position in table samples
    pub fn accumulator(&self) -> f64 {
        self.idx
    }

    pub fn table(&self) -> &WaveTable {
        &self.table
    }
}

impl SoundNode for OscillatorNode {
    fn core(&self) -> &SoundCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SoundCore {
        &mut self.core
    }

    fn render(&mut self, _tick: u64, upstream: &Upstream<'_>) {
        let len = self.table.len() as f64;
        let mask = self.table.mask() as i64;
        let step = len / self.core.sample_rate() as f64;

        for i in 0..self.core.frames() {
            if self.core.is_muted() {
                self.core.samples_mut()[i] = 0.0;
                continue;
            }

            let freq = self.frequency_at(i, upstream);
            let amp = self.amplitude_at(i, upstream);
            let pos = self.idx + self.phase_offset_at(i, upstream);
            // i64 masking keeps negative positions inside the table
            let index = (pos.floor() as i64 & mask) as usize;

            self.core.samples_mut()[i] = (amp * self.table[index] as f64) as f32;
            self.idx += freq * step;
        }
    }

    fn inputs(&self) -> Vec<NodeId> {
        [self.freq_mod, self.amp_mod, self.phase_mod]
            .into_iter()
            .flatten()
            .collect()
    }

    fn name(&self) -> &str {
        "OscillatorNode"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quarter_table() -> WaveTable {
        WaveTable::new(vec![1.0, 0.0, -1.0, 0.0]).unwrap()
    }

    /// Constant source: a one-sample table reads the same value forever
    fn constant(value: f32, frames: usize) -> Box<dyn SoundNode> {
        let table = WaveTable::new(vec![value]).unwrap();
        let mut node = OscillatorNode::new(table, 0.0, None, 4.0, frames);
        node.render(0, &Upstream::empty());
        Box::new(node)
    }

    #[test]
    fn test_unit_step_walks_table() {
        let mut osc = OscillatorNode::new(quarter_table(), 1.0, None, 4.0, 8);
        osc.render(1, &Upstream::empty());

        assert_eq!(osc.samples(), &[1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0, 0.0]);
        assert_eq!(osc.accumulator(), 8.0);
    }

    #[test]
    fn test_phase_continues_across_ticks() {
        let table = WaveTable::sine(256).unwrap();
        let mut split = OscillatorNode::new(table.clone(), 441.0, None, 44100.0, 64);
        let mut whole = OscillatorNode::new(table, 441.0, None, 44100.0, 128);

        let mut joined = Vec::new();
        split.render(1, &Upstream::empty());
        joined.extend_from_slice(split.samples());
        split.render(2, &Upstream::empty());
        joined.extend_from_slice(split.samples());

        whole.render(1, &Upstream::empty());
        assert_eq!(joined.as_slice(), whole.samples());
    }

    #[test]
    fn test_muted_renders_silence_and_holds_phase() {
        let mut osc = OscillatorNode::new(quarter_table(), 1.0, None, 4.0, 4);
        osc.set_muted(true);
        osc.render(1, &Upstream::empty());

        assert!(osc.samples().iter().all(|&x| x == 0.0));
        assert_eq!(osc.accumulator(), 0.0);
    }

    #[test]
    fn test_single_sample_table_is_constant() {
        let table = WaveTable::new(vec![0.5]).unwrap();
        let mut osc = OscillatorNode::new(table, 1234.5, None, 44100.0, 16);
        osc.render(1, &Upstream::empty());
        assert!(osc.samples().iter().all(|&x| x == 0.5));
    }

    #[test]
    fn test_zero_frequency_halts() {
        let mut osc = OscillatorNode::new(quarter_table(), 0.0, None, 4.0, 4);
        osc.render(1, &Upstream::empty());
        assert_eq!(osc.samples(), &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_negative_frequency_reverses() {
        let mut osc = OscillatorNode::new(quarter_table(), -1.0, None, 4.0, 4);
        osc.render(1, &Upstream::empty());
        // 0, -1, -2, -3 masked into 0, 3, 2, 1
        assert_eq!(osc.samples(), &[1.0, 0.0, -1.0, 0.0]);
        assert_eq!(osc.accumulator(), -4.0);
    }

    #[test]
    fn test_amplitude_scales_output() {
        let mut osc = OscillatorNode::new(quarter_table(), 1.0, None, 4.0, 4);
        osc.set_amplitude(0.25, None);
        osc.render(1, &Upstream::empty());
        assert_eq!(osc.samples(), &[0.25, 0.0, -0.25, 0.0]);
    }

    #[test]
    fn test_frequency_modulation_multiplies_base() {
        let nodes = vec![Some(constant(2.0, 4))];
        let upstream = Upstream::new(&nodes);

        let mut osc = OscillatorNode::new(quarter_table(), 1.0, Some(0), 4.0, 4);
        assert_eq!(osc.frequency_at(0, &upstream), 2.0);

        osc.render(1, &upstream);
        // doubled frequency skips every other table entry
        assert_eq!(osc.samples(), &[1.0, -1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_amplitude_modulation_multiplies_base() {
        let nodes = vec![Some(constant(0.5, 4))];
        let upstream = Upstream::new(&nodes);

        let mut osc = OscillatorNode::new(quarter_table(), 1.0, None, 4.0, 4);
        osc.set_amplitude(0.5, Some(0));
        assert_eq!(osc.amplitude_at(2, &upstream), 0.25);

        osc.render(1, &upstream);
        assert_eq!(osc.samples(), &[0.25, 0.0, -0.25, 0.0]);
    }

    #[test]
    fn test_phase_modulation_scales_by_table_length() {
        let nodes = vec![Some(constant(0.25, 4))];
        let upstream = Upstream::new(&nodes);

        let mut osc = OscillatorNode::new(quarter_table(), 1.0, None, 4.0, 4);
        osc.set_phase(0.9, Some(0));
        assert_eq!(osc.phase_offset_at(0, &upstream), 1.0);

        osc.render(1, &upstream);
        // quarter cycle ahead
        assert_eq!(osc.samples(), &[0.0, -1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_base_phase_without_modulator_has_no_offset() {
        let mut osc = OscillatorNode::new(quarter_table(), 1.0, None, 4.0, 4);
        osc.set_phase(0.5, None);
        assert_eq!(osc.phase_offset_at(0, &Upstream::empty()), 0.0);

        osc.render(1, &Upstream::empty());
        assert_eq!(osc.samples(), &[1.0, 0.0, -1.0, 0.0]);
    }

    #[test]
    fn test_inputs_lists_set_modulators() {
        let mut osc = OscillatorNode::new(quarter_table(), 1.0, Some(3), 4.0, 4);
        assert_eq!(osc.inputs(), vec![3]);

        osc.set_amplitude(1.0, Some(5));
        osc.set_phase(0.0, Some(3));
        assert_eq!(osc.inputs(), vec![3, 5, 3]);

        osc.set_frequency(2.0, None);
        assert_eq!(osc.inputs(), vec![5, 3]);
    }
}
