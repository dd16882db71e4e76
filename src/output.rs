//! # Output Event Routing
//!
//! ## Overview
//! Each timing unit drives two complementary outputs. The hardware asserts
//! and deasserts them on selectable events: the unit's own period, its
//! compare registers, or an external event line. [`EventSource`] collects
//! those event codes; [`OutputWiring`] holds the four set/reset words of a
//! unit and encodes the switching convention: whatever sets the high side
//! resets the low side and vice versa, so the pair is always an exact
//! mirror image.
//!
//! A separate swap flag lets the same register wiring represent either
//! polarity convention without touching the event codes; the base
//! convention is "no swap".

use crate::block::{ExternalEvent, HrtimBlock, OutputSide};
use crate::unit::{Modulation, TimerId};

/// A set of hardware events driving an output transition.
///
/// Combine sources with [`EventSource::with`]; the empty set leaves the
/// output untouched by that transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventSource(u32);

impl EventSource {
    /// No event; the transition never fires.
    pub const NONE: Self = Self(0);
    /// The unit's period event.
    pub const PERIOD: Self = Self(1 << 0);
    /// Compare-1 event.
    pub const CMP1: Self = Self(1 << 1);
    /// Compare-2 event.
    pub const CMP2: Self = Self(1 << 2);
    /// Compare-3 event.
    pub const CMP3: Self = Self(1 << 3);
    /// Compare-4 event.
    pub const CMP4: Self = Self(1 << 4);

    /// An external event line.
    pub const fn external(event: ExternalEvent) -> Self {
        let bit = match event {
            ExternalEvent::Eev1 => 8,
            ExternalEvent::Eev2 => 9,
            ExternalEvent::Eev3 => 10,
            ExternalEvent::Eev4 => 11,
            ExternalEvent::Eev5 => 12,
        };
        Self(1 << bit)
    }

    /// Union of two event sets.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every event in `other` is part of this set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Polarity convention of a leg's complementary pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SwitchConvention {
    /// `true` when the controlled switch is the high side (buck-style leg),
    /// `false` when it is the low side (boost-style leg).
    pub upper: bool,
    /// Swap the two outputs without rewiring their event codes.
    pub swapped: bool,
}

impl SwitchConvention {
    /// Convention for the given controlled switch, no swap.
    pub const fn new(upper: bool) -> Self {
        SwitchConvention {
            upper,
            swapped: false,
        }
    }

    /// Same event wiring with the outputs swapped.
    #[must_use]
    pub const fn with_swapped(self, swapped: bool) -> Self {
        SwitchConvention { swapped, ..self }
    }
}

impl Default for SwitchConvention {
    fn default() -> Self {
        SwitchConvention::new(true)
    }
}

/// The four set/reset event words of a unit's output pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputWiring {
    /// Events asserting the high-side output.
    pub set_high: EventSource,
    /// Events deasserting the high-side output.
    pub reset_high: EventSource,
    /// Events asserting the low-side output.
    pub set_low: EventSource,
    /// Events deasserting the low-side output.
    pub reset_low: EventSource,
}

impl OutputWiring {
    /// Software-controlled duty cycle: the pulse opens on the period (or at
    /// the crest, center-aligned) and closes on compare-1.
    ///
    /// Center-aligned counting passes compare-1 on both slopes, so period
    /// events play no role there.
    pub fn voltage_mode(modulation: Modulation, convention: SwitchConvention) -> Self {
        let wiring = match modulation {
            Modulation::LeftAligned => OutputWiring {
                set_high: EventSource::PERIOD,
                reset_high: EventSource::CMP1,
                set_low: EventSource::CMP1,
                reset_low: EventSource::PERIOD,
            },
            Modulation::CenterAligned => OutputWiring {
                set_high: EventSource::NONE,
                reset_high: EventSource::CMP1,
                set_low: EventSource::CMP1,
                reset_low: EventSource::NONE,
            },
        };
        wiring.oriented(convention)
    }

    /// Comparator-terminated duty cycle: the pulse opens on the minimum
    /// on-time guard (compare-4) and closes on the duty ceiling (compare-1)
    /// or the comparator trip delivered on the external event line.
    pub fn current_mode(event: ExternalEvent, convention: SwitchConvention) -> Self {
        let trip = EventSource::CMP1.with(EventSource::external(event));
        OutputWiring {
            set_high: EventSource::CMP4,
            reset_high: trip,
            set_low: trip,
            reset_low: EventSource::CMP4,
        }
        .oriented(convention)
    }

    /// High and low sides exchanged; used when the controlled switch is the
    /// low side.
    #[must_use]
    fn mirrored(self) -> Self {
        OutputWiring {
            set_high: self.set_low,
            reset_high: self.reset_low,
            set_low: self.set_high,
            reset_low: self.reset_high,
        }
    }

    fn oriented(self, convention: SwitchConvention) -> Self {
        if convention.upper {
            self
        } else {
            self.mirrored()
        }
    }
}

/// Program a unit's output pair.
pub(crate) fn apply<B: HrtimBlock>(
    block: &mut B,
    unit: TimerId,
    wiring: OutputWiring,
    convention: SwitchConvention,
) {
    block.set_output_set_events(unit, OutputSide::High, wiring.set_high);
    block.set_output_reset_events(unit, OutputSide::High, wiring.reset_high);
    block.set_output_set_events(unit, OutputSide::Low, wiring.set_low);
    block.set_output_reset_events(unit, OutputSide::Low, wiring.reset_low);
    block.set_output_swap(unit, convention.swapped);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complementary_outputs_mirror_each_other() {
        for modulation in [Modulation::LeftAligned, Modulation::CenterAligned] {
            for upper in [true, false] {
                let w = OutputWiring::voltage_mode(modulation, SwitchConvention::new(upper));
                assert_eq!(w.set_high, w.reset_low);
                assert_eq!(w.reset_high, w.set_low);
            }
        }
        let w = OutputWiring::current_mode(ExternalEvent::Eev4, SwitchConvention::new(true));
        assert_eq!(w.set_high, w.reset_low);
        assert_eq!(w.reset_high, w.set_low);
    }

    #[test]
    fn lower_convention_inverts_the_pair() {
        let upper = OutputWiring::voltage_mode(Modulation::LeftAligned, SwitchConvention::new(true));
        let lower =
            OutputWiring::voltage_mode(Modulation::LeftAligned, SwitchConvention::new(false));
        assert_eq!(upper.set_high, lower.set_low);
        assert_eq!(upper.reset_high, lower.reset_low);
    }

    #[test]
    fn comparator_trip_is_combined_with_the_duty_ceiling() {
        let w = OutputWiring::current_mode(ExternalEvent::Eev5, SwitchConvention::new(true));
        assert!(w.reset_high.contains(EventSource::CMP1));
        assert!(w
            .reset_high
            .contains(EventSource::external(ExternalEvent::Eev5)));
        assert_eq!(w.set_high, EventSource::CMP4);
    }
}
