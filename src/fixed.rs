//! Fixed-point helpers shared by the envelope, oscillator and mixer.
//!
//! Everything called once per sample is integer-only. The conversions that
//! need floating point (`frequency_to_increment` and friends) run on the
//! control side when parameters change.

/// Number of fractional bits used by envelope ramp rates.
pub const RAMP_SHIFT: u32 = 24;

/// Number of fractional bits of a full phase-accumulator turn.
const PHASE_BITS: i32 = 32;

/// Microseconds per second.
const MICROS: f64 = 1_000_000.0;

/// Precomputes the per-sample slope of a ramp covering `span` levels in `samples` samples.
/// A zero-length ramp has a rate of 0, and callers skip the stage instead of dividing.
pub const fn ramp_rate(span: u8, samples: u32) -> u32 {
    if samples == 0 {
        return 0;
    }
    (((span as u64) << RAMP_SHIFT) / samples as u64) as u32
}

/// Distance travelled along a ramp after `counter` samples, in envelope levels.
#[inline]
pub const fn ramp_step(counter: u32, rate: u32) -> u32 {
    ((counter as u64 * rate as u64) >> RAMP_SHIFT) as u32
}

/// Reciprocal of `sum` in Q16, or 0 when `sum` is 0.
pub const fn reciprocal_q16(sum: u32) -> u32 {
    if sum == 0 {
        0
    } else {
        (1 << 16) / sum
    }
}

/// Multiplies two 8-bit levels, treating 255 as unity.
pub const fn scale_u8(a: u8, b: u8) -> u8 {
    ((a as u32 * b as u32 + 127) / 255) as u8
}

/// Converts a frequency in Hz to the phase increment added every sample period.
///
/// The increment is `frequency * interval / 1s` as a 32-bit binary fraction of
/// one cycle. Frequencies at or beyond the sample rate saturate.
pub fn frequency_to_increment(frequency_hz: f64, sample_interval_us: u32) -> u32 {
    cycles_to_increment(frequency_hz.max(0.0) * sample_interval_us as f64 / MICROS)
}

/// Like [`frequency_to_increment`], for a sample rate that is not a whole
/// number of microseconds per sample.
pub fn frequency_to_increment_at_rate(frequency_hz: f64, sample_rate_hz: u32) -> u32 {
    if sample_rate_hz == 0 {
        return u32::MAX;
    }
    cycles_to_increment(frequency_hz.max(0.0) / sample_rate_hz as f64)
}

fn cycles_to_increment(cycles_per_sample: f64) -> u32 {
    // Float-to-int `as` saturates, so anything over one cycle per sample pins at u32::MAX.
    (cycles_per_sample * 2f64.powi(PHASE_BITS)).round() as u32
}

/// Inverse of [`frequency_to_increment`].
pub fn increment_to_frequency(increment: u32, sample_interval_us: u32) -> f64 {
    if sample_interval_us == 0 {
        return 0.0;
    }
    increment as f64 / 2f64.powi(PHASE_BITS) * MICROS / sample_interval_us as f64
}

/// Sample rate implied by a sample interval in microseconds.
pub fn sample_rate_hz(sample_interval_us: u32) -> f64 {
    MICROS / sample_interval_us.max(1) as f64
}
