//! # Phase-Shift Synchronization
//!
//! ## Overview
//! A slave unit is phase-positioned by resetting its counter on a compare
//! event of a reference timer instead of the master period. Writing the
//! shift into the reference compare register and pointing the unit's
//! reset-trigger word at that event yields an arbitrary sub-period offset.
//!
//! Exactly one reset-trigger source is active for a unit at any time. The
//! trigger word is always rewritten in a single register write that drops
//! the previous source and installs the new one, so the counter never
//! briefly resets on two incompatible events.

use crate::{
    block::HrtimBlock,
    unit::{Modulation, Purpose, TimerId},
    Error,
    HrPwm,
};

/// Counter-reset trigger word of a timing unit.
///
/// Individual sources combine with [`ResetTrigger::with`] /
/// [`ResetTrigger::without`]; the engine keeps at most one source active
/// per unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetTrigger(u32);

impl ResetTrigger {
    /// No reset source.
    pub const NONE: Self = Self(0);
    /// Master timer period event.
    pub const MASTER_PERIOD: Self = Self(1 << 0);
    /// Master compare-1 event.
    pub const MASTER_CMP1: Self = Self(1 << 1);
    /// Master compare-2 event.
    pub const MASTER_CMP2: Self = Self(1 << 2);
    /// Master compare-3 event.
    pub const MASTER_CMP3: Self = Self(1 << 3);
    /// Master compare-4 event.
    pub const MASTER_CMP4: Self = Self(1 << 4);
    /// Compare-2 event of timing unit A.
    pub const TIMER_A_CMP2: Self = Self(1 << 5);

    /// Union of two trigger sets.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Remove the given sources.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Whether every source in `other` is part of this word.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl<B: HrtimBlock> HrPwm<B> {
    /// Position a slave unit `ticks` after the master's counter reset.
    ///
    /// Three cases:
    /// - nonzero shift: the shift value goes into the unit's reference
    ///   compare register and the reset trigger moves from the master period
    ///   to that compare event. If the reference compare is already
    ///   committed elsewhere, or the reference sibling does not count
    ///   left-aligned, the unit keeps master-period synchronization instead
    ///   of colliding with the committed register.
    /// - zero shift while the unit runs at the master's period and prescaler
    ///   (exactly, or at exactly half when center-aligned): reset directly
    ///   on the master period event.
    /// - zero shift in a foreign frequency domain: the master binding is
    ///   removed entirely; phase positioning is undefined across domains.
    pub fn set_phase_shift(&mut self, unit: TimerId, ticks: u16) -> Result<(), Error> {
        if unit.slave_index().is_none() {
            return Err(Error::UnsupportedUnit);
        }
        if !self.registry.unit(unit).is_active() {
            return Err(Error::NotConfigured);
        }

        let slot = self.registry.unit(unit).phase_shift.slot;
        let current = self.block.reset_triggers(unit);

        if ticks != 0 {
            // the reference leg is what everything else is positioned
            // against; it cannot be shifted itself
            let Some(slot) = slot else {
                return Err(Error::UnsupportedUnit);
            };

            let reference = self.registry.unit(slot.reference);
            let usable = reference.compare_slots.is_free(slot.compare)
                || reference.compare_slots.get(slot.compare)
                    == crate::unit::CompareSlot::Reserved(Purpose::PhaseShift);
            let usable = usable
                && (slot.reference == TimerId::Master
                    || reference.modulation == Modulation::LeftAligned);

            if usable {
                self.block.set_compare(slot.reference, slot.compare, ticks);
                let _ = self
                    .registry
                    .unit_mut(slot.reference)
                    .compare_slots
                    .reserve(slot.compare, Purpose::PhaseShift);
                self.block.set_reset_triggers(
                    unit,
                    current
                        .without(ResetTrigger::MASTER_PERIOD)
                        .with(slot.trigger),
                );
            } else {
                warn!("reference compare already committed, keeping master-period sync");
                self.block.set_reset_triggers(
                    unit,
                    current.without(slot.trigger).with(ResetTrigger::MASTER_PERIOD),
                );
            }
        } else {
            let master = self.registry.master();
            let descriptor = self.registry.unit(unit);
            let same_domain = master.prescaler == descriptor.prescaler
                && (master.period == descriptor.period
                    || u32::from(master.period) == 2 * u32::from(descriptor.period));

            if same_domain {
                let mut next = current.with(ResetTrigger::MASTER_PERIOD);
                if let Some(slot) = slot {
                    next = next.without(slot.trigger);
                    // only give the reference compare back if the shift owned
                    // it; after a conflict fallback it belongs to someone else
                    let reference = self.registry.unit_mut(slot.reference);
                    if reference.compare_slots.get(slot.compare)
                        == crate::unit::CompareSlot::Reserved(Purpose::PhaseShift)
                    {
                        reference.compare_slots.release(slot.compare);
                    }
                }
                self.block.set_reset_triggers(unit, next);
            } else {
                // phase positioning is undefined across frequency domains;
                // cross-domain coordination is the caller's responsibility
                self.block
                    .set_reset_triggers(unit, current.without(ResetTrigger::MASTER_PERIOD));
            }
        }

        self.registry.unit_mut(unit).phase_shift.value = ticks;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fugit::RateExtU32;

    use super::*;
    use crate::{
        block::CompareReg,
        clock::ClockConfig,
        sim::SimBlock,
        topology::{ConverterConfig, Topology},
        unit::CompareSlot,
    };

    fn pwm() -> HrPwm<SimBlock> {
        let clock = ClockConfig::new(170.MHz(), 100.kHz()).unwrap();
        HrPwm::new(SimBlock::new(), clock)
    }

    #[test]
    fn trigger_word_set_operations() {
        let word = ResetTrigger::MASTER_PERIOD.with(ResetTrigger::MASTER_CMP2);
        assert!(word.contains(ResetTrigger::MASTER_PERIOD));
        assert!(word.contains(ResetTrigger::MASTER_CMP2));
        let word = word.without(ResetTrigger::MASTER_PERIOD);
        assert!(!word.contains(ResetTrigger::MASTER_PERIOD));
        assert_eq!(word.without(ResetTrigger::MASTER_CMP2), ResetTrigger::NONE);
    }

    #[test]
    fn unit_b_borrows_its_siblings_compare() {
        let mut pwm = pwm();
        pwm.configure(
            ConverterConfig::new(Topology::InterleavedBuck, 200.kHz())
                .with_legs(TimerId::TimA, TimerId::TimB),
        )
        .unwrap();

        assert!(pwm
            .block()
            .reset_triggers(TimerId::TimB)
            .contains(ResetTrigger::TIMER_A_CMP2));
        assert_eq!(pwm.block().compare(TimerId::TimA, CompareReg::Cmp2), 13600);
        assert_eq!(
            pwm.unit(TimerId::TimA).compare_slots.get(CompareReg::Cmp2),
            CompareSlot::Reserved(Purpose::PhaseShift)
        );
    }

    #[test]
    fn committed_reference_compare_falls_back_to_master_sync() {
        let mut pwm = pwm();
        // current mode on A claims its compare 2 for the reference ramp
        pwm.configure(
            ConverterConfig::new(Topology::PeakCurrentMode, 200.kHz())
                .with_legs(TimerId::TimA, TimerId::TimC),
        )
        .unwrap();
        let ramp_step = pwm.block().compare(TimerId::TimA, CompareReg::Cmp2);

        // bring B up as a voltage-mode leg alongside
        pwm.configure(
            ConverterConfig::new(
                Topology::Independent {
                    leg1_buck: true,
                    leg2_buck: true,
                },
                200.kHz(),
            )
            .with_legs(TimerId::TimB, TimerId::TimD),
        )
        .unwrap();

        // B cannot claim A's compare 2; degraded but safe: master period
        pwm.set_phase_shift(TimerId::TimB, 1000).unwrap();
        assert_eq!(
            pwm.block().reset_triggers(TimerId::TimB),
            ResetTrigger::MASTER_PERIOD
        );
        // the committed register is untouched
        assert_eq!(
            pwm.block().compare(TimerId::TimA, CompareReg::Cmp2),
            ramp_step
        );
    }

    #[test]
    fn center_aligned_sibling_cannot_position_unit_b() {
        let mut pwm = pwm();
        pwm.configure(
            ConverterConfig::new(Topology::InterleavedBuck, 200.kHz())
                .with_legs(TimerId::TimA, TimerId::TimB)
                .with_modulation(Modulation::CenterAligned),
        )
        .unwrap();

        // leg 2 got its interleaving offset, but through the master period
        // fallback: the sibling counts up-down and its compare fires twice
        assert_eq!(
            pwm.block().reset_triggers(TimerId::TimB),
            ResetTrigger::MASTER_PERIOD
        );
    }

    #[test]
    fn zero_shift_in_foreign_domain_unbinds_the_master() {
        let mut pwm = pwm();
        pwm.configure(
            ConverterConfig::new(Topology::InterleavedBuck, 200.kHz())
                .with_legs(TimerId::TimA, TimerId::TimC),
        )
        .unwrap();

        // push C into its own frequency domain behind the engine's back
        self_service_period(&mut pwm, TimerId::TimC, 10_000);

        pwm.set_phase_shift(TimerId::TimC, 0).unwrap();
        assert!(!pwm
            .block()
            .reset_triggers(TimerId::TimC)
            .contains(ResetTrigger::MASTER_PERIOD));
    }

    #[test]
    fn the_reference_leg_cannot_be_shifted() {
        let mut pwm = pwm();
        pwm.configure(
            ConverterConfig::new(Topology::InterleavedBuck, 200.kHz())
                .with_legs(TimerId::TimA, TimerId::TimC),
        )
        .unwrap();

        assert_eq!(
            pwm.set_phase_shift(TimerId::TimA, 500),
            Err(Error::UnsupportedUnit)
        );
        // still bound to the master period
        assert_eq!(
            pwm.block().reset_triggers(TimerId::TimA),
            ResetTrigger::MASTER_PERIOD
        );
    }

    fn self_service_period(pwm: &mut HrPwm<SimBlock>, unit: TimerId, period: u16) {
        pwm.registry.unit_mut(unit).period = period;
    }
}
