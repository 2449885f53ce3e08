use crate::waveform::{Harmonics, LinearShape, Wavetable, SINE};

/// The waveform a voice plays. Tables are held by value, so the audio core
/// never reads memory the control side can still change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    /// An arbitrary precomputed table.
    Table(Wavetable),
    /// A piecewise-linear shape evaluated on the fly.
    Linear(LinearShape),
    /// A sum of sine harmonics evaluated on the fly.
    Harmonic(Harmonics),
}

impl Default for Waveform {
    fn default() -> Self {
        Waveform::Table(SINE)
    }
}

/// A 32-bit phase accumulator driving a waveform.
#[derive(Clone, Copy, Debug, Default)]
pub struct Oscillator {
    phase: u32,
    increment: u32,
    waveform: Waveform,
}

impl Oscillator {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the phase step added every sample.
    pub fn set_increment(&mut self, increment: u32) {
        self.increment = increment;
    }

    pub fn increment(&self) -> u32 {
        self.increment
    }

    pub fn phase(&self) -> u32 {
        self.phase
    }

    pub fn waveform(&self) -> &Waveform {
        &self.waveform
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Copies `table` into the oscillator's own storage.
    pub fn load_table(&mut self, table: &Wavetable) {
        match &mut self.waveform {
            Waveform::Table(resident) => resident.copy_from_slice(table),
            other => *other = Waveform::Table(*table),
        }
    }

    /// Advances the phase by one sample and returns the waveform value there.
    #[inline]
    pub fn process(&mut self) -> i8 {
        self.phase = self.phase.wrapping_add(self.increment);
        self.sample_at(self.phase)
    }

    /// Evaluates the waveform at an arbitrary phase.
    #[inline]
    pub fn sample_at(&self, phase: u32) -> i8 {
        let index = (phase >> 24) as u8;
        match &self.waveform {
            Waveform::Table(table) => table[index as usize],
            Waveform::Linear(shape) => shape.sample(index),
            Waveform::Harmonic(harmonics) => harmonics.sample(phase),
        }
    }
}
