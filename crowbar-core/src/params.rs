//! Glitch parameter model.
//!
//! Parameters are mutated only while disarmed (the controller enforces
//! this); the values stored here are always the user-requested cycle counts.
//! Overhead compensation happens once, when the pulse FIFO words are
//! derived.

use crate::timing::{GAP_OVERHEAD_CYCLES, WIDTH_OVERHEAD_CYCLES};

/// Edge polarity for the GPIO trigger.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Edge {
    Rising,
    Falling,
}

/// Trigger condition selected for the next arming.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum TriggerSource {
    /// Only the manual `GLITCH` command fires.
    #[default]
    None,
    /// One-shot debounced edge on the trigger input pin.
    GpioEdge(Edge),
    /// Byte decoded from the target-RX line matches the stored value.
    UartByte(u8),
}

impl TriggerSource {
    /// Returns `true` when a PIO trigger program must be resident.
    pub const fn needs_program(self) -> bool {
        !matches!(self, TriggerSource::None)
    }
}

/// User-writable glitch configuration, all durations in system-clock cycles.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GlitchParams {
    pub pause_cycles: u32,
    pub width_cycles: u32,
    pub gap_cycles: u32,
    pub count: u32,
    pub trigger: TriggerSource,
}

/// Parameter selected by `SET`/`GET`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParamField {
    Pause,
    Width,
    Gap,
    Count,
}

impl ParamField {
    /// Canonical keyword, used in replies.
    pub const fn name(self) -> &'static str {
        match self {
            ParamField::Pause => "PAUSE",
            ParamField::Width => "WIDTH",
            ParamField::Gap => "GAP",
            ParamField::Count => "COUNT",
        }
    }

    /// Whether the field is a duration (reported with a µs conversion).
    pub const fn is_duration(self) -> bool {
        !matches!(self, ParamField::Count)
    }
}

/// Rejected parameter writes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParamError {
    /// Width and count must be at least 1.
    MustBePositive(ParamField),
}

/// The four words preloaded into the pulse engine FIFO, in drain order.
///
/// `width` and `gap` are already overhead-compensated; `count` is the
/// down-counter seed (`count - 1`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PulseWords {
    pub pause: u32,
    pub count_minus_1: u32,
    pub width: u32,
    pub gap: u32,
}

impl PulseWords {
    /// FIFO load order: pause, count−1, width, gap.
    pub const fn as_fifo(&self) -> [u32; 4] {
        [self.pause, self.count_minus_1, self.width, self.gap]
    }
}

impl Default for GlitchParams {
    fn default() -> Self {
        Self {
            pause_cycles: 0,
            width_cycles: 100,
            gap_cycles: 100,
            count: 1,
            trigger: TriggerSource::None,
        }
    }
}

impl GlitchParams {
    /// Writes one field, validating range.
    pub fn set(&mut self, field: ParamField, value: u32) -> Result<(), ParamError> {
        match field {
            ParamField::Pause => self.pause_cycles = value,
            ParamField::Gap => self.gap_cycles = value,
            ParamField::Width => {
                if value == 0 {
                    return Err(ParamError::MustBePositive(field));
                }
                self.width_cycles = value;
            }
            ParamField::Count => {
                if value == 0 {
                    return Err(ParamError::MustBePositive(field));
                }
                self.count = value;
            }
        }
        Ok(())
    }

    /// Reads one field.
    pub const fn get(&self, field: ParamField) -> u32 {
        match field {
            ParamField::Pause => self.pause_cycles,
            ParamField::Width => self.width_cycles,
            ParamField::Gap => self.gap_cycles,
            ParamField::Count => self.count,
        }
    }

    /// Derives the pulse FIFO words, applying the documented loop-overhead
    /// compensation. Sub-floor widths and gaps saturate to the floor rather
    /// than going negative.
    pub fn pulse_words(&self) -> PulseWords {
        PulseWords {
            pause: self.pause_cycles,
            count_minus_1: self.count.saturating_sub(1),
            width: self.width_cycles.saturating_sub(WIDTH_OVERHEAD_CYCLES),
            gap: self.gap_cycles.saturating_sub(GAP_OVERHEAD_CYCLES),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_boot_configuration() {
        let params = GlitchParams::default();
        assert_eq!(params.pause_cycles, 0);
        assert_eq!(params.width_cycles, 100);
        assert_eq!(params.gap_cycles, 100);
        assert_eq!(params.count, 1);
        assert_eq!(params.trigger, TriggerSource::None);
    }

    #[test]
    fn fifo_words_apply_overhead_compensation() {
        let mut params = GlitchParams::default();
        params.set(ParamField::Pause, 1_500).unwrap();
        params.set(ParamField::Width, 150).unwrap();
        params.set(ParamField::Gap, 1_500).unwrap();
        params.set(ParamField::Count, 3).unwrap();

        let words = params.pulse_words();
        assert_eq!(
            words.as_fifo(),
            [
                1_500,
                2,
                150 - WIDTH_OVERHEAD_CYCLES,
                1_500 - GAP_OVERHEAD_CYCLES
            ]
        );
    }

    #[test]
    fn sub_floor_durations_saturate_to_zero() {
        let mut params = GlitchParams::default();
        params.set(ParamField::Width, 2).unwrap();
        params.set(ParamField::Gap, 1).unwrap();

        let words = params.pulse_words();
        assert_eq!(words.width, 0);
        assert_eq!(words.gap, 0);
    }

    #[test]
    fn zero_width_and_count_are_rejected() {
        let mut params = GlitchParams::default();
        assert_eq!(
            params.set(ParamField::Width, 0),
            Err(ParamError::MustBePositive(ParamField::Width))
        );
        assert_eq!(
            params.set(ParamField::Count, 0),
            Err(ParamError::MustBePositive(ParamField::Count))
        );
        // Pause and gap may be zero.
        params.set(ParamField::Pause, 0).unwrap();
        params.set(ParamField::Gap, 0).unwrap();
    }

    #[test]
    fn single_pulse_seeds_zero_down_counter() {
        let params = GlitchParams::default();
        assert_eq!(params.pulse_words().count_minus_1, 0);
    }
}
