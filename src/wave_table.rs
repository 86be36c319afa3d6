//! Wave tables for table-lookup oscillators
//!
//! A table is a single cycle of a waveform. Lengths are restricted to powers
//! of two so oscillators can wrap their phase with a mask instead of a modulo.
//!
//! # Common Table Sizes
//! - 64 samples: Lo-fi/retro sound
//! - 256 samples: Good for most uses
//! - 4096 samples: High quality

use crate::error::{SndError, SndResult};
use std::f32::consts::PI;
use std::ops::Index;
use std::sync::Arc;

/// Immutable, cheaply clonable wave table
///
/// Clones share the same sample storage, so any number of oscillators can
/// read one table without copying it.
///
/// # Example
/// ```
/// use sndgraph::wave_table::WaveTable;
///
/// let table = WaveTable::new(vec![1.0, 0.0, -1.0, 0.0]).unwrap();
/// assert_eq!(table.len(), 4);
/// assert_eq!(table.mask(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct WaveTable {
    samples: Arc<[f32]>,
}

impl WaveTable {
    /// Build a table from one cycle of samples
    ///
    /// # Errors
    /// `SndError::InvalidTableLength` if the length is zero or not a power of two
    pub fn new(samples: Vec<f32>) -> SndResult<Self> {
        if !samples.len().is_power_of_two() {
            return Err(SndError::InvalidTableLength(samples.len()));
        }
        Ok(Self {
            samples: samples.into(),
        })
    }

    /// Sine wave, one full period over `size` samples
    pub fn sine(size: usize) -> SndResult<Self> {
        Self::generate(size, |phase| (phase * 2.0 * PI).sin())
    }

    /// Rising sawtooth from -1.0 to just below 1.0
    pub fn sawtooth(size: usize) -> SndResult<Self> {
        Self::generate(size, |phase| 2.0 * phase - 1.0)
    }

    /// Square wave, high for the first half of the cycle
    pub fn square(size: usize) -> SndResult<Self> {
        Self::generate(size, |phase| if phase < 0.5 { 1.0 } else { -1.0 })
    }

    /// Triangle wave starting at -1.0, peaking at the half cycle
    pub fn triangle(size: usize) -> SndResult<Self> {
        Self::generate(size, |phase| {
            if phase < 0.5 {
                4.0 * phase - 1.0
            } else {
                -4.0 * phase + 3.0
            }
        })
    }

    fn generate(size: usize, f: impl Fn(f32) -> f32) -> SndResult<Self> {
        let table = (0..size).map(|i| f(i as f32 / size as f32)).collect();
        Self::new(table)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; construction rejects empty tables
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mask for wrapping an index into the table (`len - 1`)
    pub fn mask(&self) -> usize {
        self.samples.len() - 1
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    /// True when both handles point at the same storage
    pub fn shares_storage(&self, other: &WaveTable) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

impl Index<usize> for WaveTable {
    type Output = f32;

    fn index(&self, index: usize) -> &f32 {
        &self.samples[index]
    }
}
