//! # Clock Configuration and Frequency Quantization
//!
//! ## Overview
//! The timer block counts in high-resolution steps: the input clock is
//! multiplied by a fixed oversampling factor of 32 before it reaches the
//! counters, and each unit divides it back down with a power-of-two
//! prescaler (0..=7). [`ClockConfig`] captures the input clock and a global
//! minimum-frequency floor; the floor fixes the system-wide prescaler so a
//! later runtime frequency change never has to re-derive it.
//!
//! [`ClockConfig::quantize`] maps a requested switching frequency to a
//! `(period, prescaler)` pair honoring the hardware period bounds and
//! reports the realized frequency, so callers can detect rounding.

use fugit::HertzU32;

/// Target frequency could not be realized within the hardware period and
/// prescaler bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrequencyError;

/// High-resolution steps per input clock cycle.
const HIGH_RES_STEPS: u32 = 32;

/// Largest representable clock prescaler.
pub const MAX_PRESCALER: u8 = 7;

/// Result of quantizing a requested frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QuantizedPeriod {
    /// Counter period register value.
    pub period: u16,
    /// Clock prescaler the period is expressed in.
    pub prescaler: u8,
    /// Frequency actually realized by the integer period.
    pub frequency: HertzU32,
}

/// Input clock of the timer block plus the minimum-frequency floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockConfig {
    frequency: HertzU32,
    min_frequency: HertzU32,
    base_prescaler: u8,
}

impl ClockConfig {
    /// Capture the timer input clock and the lowest switching frequency the
    /// application will ever request.
    ///
    /// The floor determines the system-wide prescaler: the most significant
    /// bit of the high-resolution period at the floor, beyond the 16-bit
    /// counter width, directly gives the divider needed to fit it.
    pub fn new(frequency: HertzU32, min_frequency: HertzU32) -> Result<Self, FrequencyError> {
        if min_frequency.raw() == 0 || min_frequency > frequency {
            return Err(FrequencyError);
        }
        // the split multiplication below only preserves accuracy while the
        // oversampled period fits in 32 bits
        if frequency.raw() / min_frequency.raw() > u32::MAX / HIGH_RES_STEPS {
            return Err(FrequencyError);
        }

        let period = ideal_period(frequency.raw(), min_frequency.raw());
        let msb = msb(period);
        let base_prescaler = if msb > 15 { (msb - 15) as u8 } else { 0 };
        if base_prescaler > MAX_PRESCALER {
            return Err(FrequencyError);
        }

        Ok(ClockConfig {
            frequency,
            min_frequency,
            base_prescaler,
        })
    }

    /// The timer input clock.
    pub fn frequency(&self) -> HertzU32 {
        self.frequency
    }

    /// The minimum-frequency floor.
    pub fn min_frequency(&self) -> HertzU32 {
        self.min_frequency
    }

    /// Prescaler derived from the floor; every synchronized unit shares it.
    pub fn base_prescaler(&self) -> u8 {
        self.base_prescaler
    }

    /// Quantize a requested frequency at the floor-derived prescaler.
    ///
    /// If the period overruns the maximum for the current prescaler the
    /// prescaler is incremented and the period halved, once; a request that
    /// still falls outside the bounds is rejected before any register is
    /// written.
    pub fn quantize(&self, target: HertzU32) -> Result<QuantizedPeriod, FrequencyError> {
        if target < self.min_frequency {
            return Err(FrequencyError);
        }

        let raw = ideal_period(self.frequency.raw(), target.raw());
        let mut prescaler = self.base_prescaler;
        let mut period = raw >> prescaler;

        if period > u32::from(max_period(prescaler)) {
            prescaler += 1;
            period /= 2;
        }
        self.bounded(period, prescaler)
    }

    /// Quantize at a fixed prescaler, without adjustment.
    ///
    /// Used for slave units that must reuse the master's prescaler, and for
    /// runtime frequency changes where the prescaler is frozen.
    pub fn quantize_at(
        &self,
        target: HertzU32,
        prescaler: u8,
    ) -> Result<QuantizedPeriod, FrequencyError> {
        if target.raw() == 0 {
            return Err(FrequencyError);
        }
        let raw = ideal_period(self.frequency.raw(), target.raw());
        self.bounded(raw >> prescaler, prescaler)
    }

    fn bounded(&self, period: u32, prescaler: u8) -> Result<QuantizedPeriod, FrequencyError> {
        if prescaler > MAX_PRESCALER
            || period < u32::from(min_period(prescaler))
            || period > u32::from(max_period(prescaler))
        {
            return Err(FrequencyError);
        }
        Ok(QuantizedPeriod {
            period: period as u16,
            prescaler,
            frequency: HertzU32::from_raw(realized(self.frequency.raw(), period, prescaler)),
        })
    }
}

/// Whether a period register value is representable at a prescaler.
///
/// Used by the runtime frequency changer, which derives slave periods from
/// the master's instead of re-quantizing them.
pub(crate) fn period_in_bounds(period: u32, prescaler: u8) -> bool {
    prescaler <= MAX_PRESCALER
        && period >= u32::from(min_period(prescaler))
        && period <= u32::from(max_period(prescaler))
}

/// High-resolution period for a requested frequency.
///
/// The oversampled clock does not fit an u32 for low frequencies, so the
/// division is split and the remainder folded back in to preserve precision.
fn ideal_period(f_clk: u32, freq: u32) -> u32 {
    (f_clk / freq) * HIGH_RES_STEPS + (f_clk % freq) * HIGH_RES_STEPS / freq
}

/// Frequency realized by an integer period at a given prescaler.
fn realized(f_clk: u32, period: u32, prescaler: u8) -> u32 {
    ((f_clk / period) * HIGH_RES_STEPS + (f_clk % period) * HIGH_RES_STEPS / period)
        / (1 << prescaler)
}

fn msb(v: u32) -> u32 {
    31 - v.leading_zeros()
}

/// The period must cover at least 3 input clock cycles.
fn min_period(prescaler: u8) -> u16 {
    if prescaler < 5 {
        96 >> prescaler
    } else {
        0x3
    }
}

/// The period must stay one input clock cycle short of the counter width.
fn max_period(prescaler: u8) -> u16 {
    if prescaler < 4 {
        0xFFFF - (32 >> prescaler)
    } else {
        0xFFFD
    }
}

#[cfg(test)]
mod tests {
    use fugit::RateExtU32;

    use super::*;

    fn clock() -> ClockConfig {
        ClockConfig::new(170.MHz(), 100.kHz()).unwrap()
    }

    #[test]
    fn nominal_request_is_exact() {
        // 170 MHz * 32 / 200 kHz = 27200, no prescaling needed above the
        // 100 kHz floor
        let q = clock().quantize(200.kHz()).unwrap();
        assert_eq!(q.period, 27200);
        assert_eq!(q.prescaler, 0);
        assert_eq!(q.frequency, 200.kHz::<1_000, 1>());
    }

    #[test]
    fn realized_frequency_stays_within_one_step() {
        let clock = clock();
        for target in [100_000u32, 123_456, 150_000, 200_000, 333_333, 1_000_000] {
            let q = clock.quantize(HertzU32::from_raw(target)).unwrap();
            assert!(q.period >= min_period(q.prescaler));
            assert!(q.period <= max_period(q.prescaler));
            // one quantization step at this period
            let step = q.frequency.raw() / u32::from(q.period) + 1;
            let diff = q.frequency.raw().abs_diff(target);
            assert!(diff <= step, "target {target}: off by {diff} (step {step})");
        }
    }

    #[test]
    fn floor_selects_the_system_prescaler() {
        // 10 kHz floor: msb(544000) = 19, four bits over the counter width
        let clock = ClockConfig::new(170.MHz(), 10.kHz()).unwrap();
        assert_eq!(clock.base_prescaler(), 4);

        let q = clock.quantize(200.kHz()).unwrap();
        assert_eq!(q.prescaler, 4);
        assert_eq!(q.period, 27200 >> 4);
        assert_eq!(q.frequency, 200.kHz::<1_000, 1>());
    }

    #[test]
    fn below_floor_is_rejected() {
        assert_eq!(clock().quantize(50.kHz()), Err(FrequencyError));
    }

    #[test]
    fn unreachable_floor_is_rejected() {
        // the oversampled period would overflow the split division
        assert_eq!(ClockConfig::new(170.MHz(), 1.Hz()), Err(FrequencyError));
    }

    #[test]
    fn too_fast_request_is_rejected() {
        // period would drop under 3 input clock cycles
        assert_eq!(clock().quantize(100.MHz()), Err(FrequencyError));
    }

    #[test]
    fn shared_prescaler_quantization_matches_master() {
        let clock = clock();
        let master = clock.quantize(200.kHz()).unwrap();
        // center-aligned slave counts twice per period
        let slave = clock.quantize_at(400.kHz(), master.prescaler).unwrap();
        assert_eq!(slave.prescaler, master.prescaler);
        assert_eq!(u32::from(slave.period), u32::from(master.period) / 2);
    }
}
