//! Where mixed samples go: PWM pins and the sinks that stand in for them.

pub use self::cpal::{CpalOutput, OutputError};
pub use self::wav::{RenderError, WavOutput};
use crate::config::GPIO_PIN_COUNT;

mod cpal;
mod wav;

/// A set of PWM outputs, written once per sample period.
pub trait PwmOutput {
    /// Sets the duty-cycle level of `pin` for the current sample period.
    fn set_level(&mut self, pin: u8, level: u16);
}

impl<T: PwmOutput + ?Sized> PwmOutput for &mut T {
    fn set_level(&mut self, pin: u8, level: u16) {
        (**self).set_level(pin, level)
    }
}

/// What a pin outputs while no voice is audible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdleLevel {
    /// Half scale, the resting point of a line output.
    Neutral,
    /// Zero, so a piezo carries no DC while silent.
    Ground,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutputPin {
    pub gpio: u8,
    pub idle: IdleLevel,
}

impl OutputPin {
    pub const fn new(gpio: u8, idle: IdleLevel) -> Self {
        Self { gpio, idle }
    }
}

#[derive(Clone, Copy, Debug)]
struct PinState {
    idle: IdleLevel,
    enabled: bool,
}

/// The enable state of every pin the mixer drives.
#[derive(Clone, Debug)]
pub(crate) struct PinBank {
    pins: [Option<PinState>; GPIO_PIN_COUNT],
}

impl PinBank {
    /// Registers `pins`, all enabled.
    pub fn new(pins: &[OutputPin]) -> Self {
        let mut bank = Self {
            pins: [None; GPIO_PIN_COUNT],
        };
        for pin in pins {
            if let Some(slot) = bank.pins.get_mut(pin.gpio as usize) {
                *slot = Some(PinState {
                    idle: pin.idle,
                    enabled: true,
                });
            }
        }
        bank
    }

    /// Turns output on or off. A pin that was never registered is added
    /// with a neutral idle level. Out-of-range pins are ignored.
    pub fn set_enabled(&mut self, gpio: u8, enabled: bool) {
        if let Some(slot) = self.pins.get_mut(gpio as usize) {
            let state = slot.get_or_insert(PinState {
                idle: IdleLevel::Neutral,
                enabled,
            });
            state.enabled = enabled;
        }
    }

    pub fn is_enabled(&self, gpio: u8) -> bool {
        matches!(self.pins.get(gpio as usize), Some(Some(PinState { enabled: true, .. })))
    }

    /// Writes one sample period to every registered pin. Disabled pins get 0;
    /// enabled pins get `level`, or their idle level when it is `None`.
    pub fn write(&self, output: &mut impl PwmOutput, level: Option<u16>, neutral: u16) {
        for (gpio, state) in self.pins.iter().enumerate() {
            let Some(state) = state else {
                continue;
            };
            let duty = match (state.enabled, level, state.idle) {
                (false, ..) => 0,
                (true, Some(level), _) => level,
                (true, None, IdleLevel::Neutral) => neutral,
                (true, None, IdleLevel::Ground) => 0,
            };
            output.set_level(gpio as u8, duty);
        }
    }
}

/// Remembers the last level written to each pin. Useful when no hardware is attached.
#[derive(Clone, Debug)]
pub struct PinLevels {
    levels: [Option<u16>; GPIO_PIN_COUNT],
}

impl PinLevels {
    pub fn new() -> Self {
        Self {
            levels: [None; GPIO_PIN_COUNT],
        }
    }

    /// The last level written to `gpio`, or `None` if it was never written.
    pub fn get(&self, gpio: u8) -> Option<u16> {
        self.levels.get(gpio as usize).copied().flatten()
    }
}

impl Default for PinLevels {
    fn default() -> Self {
        Self::new()
    }
}

impl PwmOutput for PinLevels {
    fn set_level(&mut self, pin: u8, level: u16) {
        if let Some(slot) = self.levels.get_mut(pin as usize) {
            *slot = Some(level);
        }
    }
}
