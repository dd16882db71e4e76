//! # Converter Topologies
//!
//! ## Overview
//! The topology configurator is the single entry point that turns two
//! timing units into a named converter operating mode: interleaved
//! buck/boost, full-bridge buck, independent legs or peak current mode. For
//! every unit it runs the same fixed sequence: outputs off, frequency
//! quantization at the master's prescaler, counter setup, dead-time
//! insertion, counter enable, reset-trigger normalization and output event
//! routing; current mode adds its comparator wiring on top.
//!
//! The converter modes differ only in which switch convention each leg
//! gets, the default interleaving phase offset, and one narrow
//! compatibility shim: a specific board revision has the second leg
//! mounted inverted, selected by [`BoardRevision`].
//!
//! Configuration is deterministic and idempotent: the same call twice
//! produces identical register state, and nothing is written when a request
//! is rejected.

use fugit::HertzU32;

use crate::{
    block::{HrtimBlock, OutputSide},
    clock,
    current_mode,
    dead_time::{DeadTime, DeadTimeCfg},
    output::{self, OutputWiring, SwitchConvention},
    phase::ResetTrigger,
    unit::{CompareSlots, Modulation, PwmMode, Status, TimerId},
    Error,
    HrPwm,
};

/// Named converter operating modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Topology {
    /// Two buck legs sharing one output, interleaved half a period apart.
    InterleavedBuck,
    /// Two boost legs sharing one output, interleaved half a period apart.
    InterleavedBoost,
    /// Four-switch bridge driven as a buck converter.
    FullBridgeBuck {
        /// Drive both legs in antiphase duty rather than interleaved
        /// carriers. Only meaningful with center-aligned modulation;
        /// left-aligned bridges always run unipolar.
        bipolar: bool,
    },
    /// Two legs controlled independently, each as buck or boost.
    Independent {
        /// First leg controls the high-side switch (buck) or low-side
        /// (boost).
        leg1_buck: bool,
        /// Second leg, same meaning.
        leg2_buck: bool,
    },
    /// Peak-current-mode control: duty termination by comparator feedback.
    /// Left-aligned only.
    PeakCurrentMode,
}

/// Board revision selector.
///
/// One hardware revision has the second leg's half-bridge mounted inverted;
/// its full-bridge wiring drives that leg with the opposite convention.
/// This is a narrow compatibility shim for that revision, not a general
/// polarity feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BoardRevision {
    /// Both legs mounted normally.
    #[default]
    Standard,
    /// Second leg mounted inverted.
    InvertedLeg2,
}

/// Everything a topology configuration call needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConverterConfig {
    /// Converter operating mode.
    pub topology: Topology,
    /// Counter alignment of both legs.
    pub modulation: Modulation,
    /// Requested switching frequency.
    pub frequency: HertzU32,
    /// Dead time inserted between the complementary switches of each leg.
    pub dead_time: DeadTime,
    /// Board revision, see [`BoardRevision`].
    pub revision: BoardRevision,
    /// The two timing units acting as leg 1 and leg 2.
    pub legs: (TimerId, TimerId),
}

impl ConverterConfig {
    /// Configuration with the customary defaults: left-aligned counting,
    /// 100 ns dead time, standard board, legs on units A and B.
    pub fn new(topology: Topology, frequency: HertzU32) -> Self {
        ConverterConfig {
            topology,
            modulation: Modulation::LeftAligned,
            frequency,
            dead_time: DeadTime::default(),
            revision: BoardRevision::default(),
            legs: (TimerId::TimA, TimerId::TimB),
        }
    }

    /// Select the counter alignment.
    #[must_use]
    pub fn with_modulation(self, modulation: Modulation) -> Self {
        ConverterConfig { modulation, ..self }
    }

    /// Select the dead time of both legs.
    #[must_use]
    pub fn with_dead_time(self, dead_time: DeadTime) -> Self {
        ConverterConfig { dead_time, ..self }
    }

    /// Select the board revision.
    #[must_use]
    pub fn with_revision(self, revision: BoardRevision) -> Self {
        ConverterConfig { revision, ..self }
    }

    /// Select which timing units drive the two legs.
    #[must_use]
    pub fn with_legs(self, leg1: TimerId, leg2: TimerId) -> Self {
        ConverterConfig {
            legs: (leg1, leg2),
            ..self
        }
    }
}

impl<B: HrtimBlock> HrPwm<B> {
    /// Configure a converter topology.
    ///
    /// Programs the master timer and both legs in a fixed order, applies the
    /// topology's default phase offsets and wires the ADC trigger of leg 1.
    /// Returns the realized master period; the realized frequency is
    /// available from the unit descriptors afterwards.
    ///
    /// Rejected requests (unrealizable frequency, center-aligned current
    /// mode, master or duplicate legs) leave all registers untouched.
    pub fn configure(&mut self, config: ConverterConfig) -> Result<u16, Error> {
        let (leg1, leg2) = config.legs;
        if leg1.slave_index().is_none() || leg2.slave_index().is_none() || leg1 == leg2 {
            return Err(Error::UnsupportedUnit);
        }

        let mode = match config.topology {
            Topology::PeakCurrentMode => PwmMode::CurrentMode,
            _ => PwmMode::VoltageMode,
        };
        if mode == PwmMode::CurrentMode && config.modulation == Modulation::CenterAligned {
            return Err(Error::IncompatibleMode);
        }

        let (upper1, mut upper2) = match config.topology {
            Topology::InterleavedBuck => (true, true),
            Topology::InterleavedBoost => (false, false),
            Topology::FullBridgeBuck { .. } => (true, true),
            Topology::Independent {
                leg1_buck,
                leg2_buck,
            } => (leg1_buck, leg2_buck),
            Topology::PeakCurrentMode => (true, true),
        };
        if matches!(config.topology, Topology::FullBridgeBuck { .. })
            && config.revision == BoardRevision::InvertedLeg2
        {
            upper2 = !upper2;
        }

        // quantize everything up front so a range error writes nothing
        let master_q = self.clock.quantize(config.frequency)?;
        let leg_frequency = match config.modulation {
            Modulation::LeftAligned => config.frequency,
            // a center-aligned count spans the period twice
            Modulation::CenterAligned => HertzU32::from_raw(config.frequency.raw() * 2),
        };
        let leg_q = self.clock.quantize_at(leg_frequency, master_q.prescaler)?;

        info!(
            "configuring converter, master period {} at prescaler {}",
            master_q.period, master_q.prescaler
        );

        self.block.wait_dll_ready();

        // the prescaler must be initialized before the compare and period
        // registers are written
        self.block.set_prescaler(TimerId::Master, master_q.prescaler);
        self.block.set_continuous_preload(TimerId::Master);
        self.block.set_period(TimerId::Master, master_q.period);
        self.block.enable_counter(TimerId::Master);

        let master = self.registry.master_mut();
        master.frequency = master_q.frequency;
        master.period = master_q.period;
        master.prescaler = master_q.prescaler;
        master.compare_slots = CompareSlots::default();
        master.status = Status::Configured;

        for (leg, upper) in [(leg1, upper1), (leg2, upper2)] {
            self.init_leg(leg, leg_q, &config, mode, upper)?;
        }

        // default interleaving: 180 degrees in master ticks, except for a
        // bipolar bridge where both legs share the carrier
        let shift = match config.topology {
            Topology::FullBridgeBuck { bipolar: true }
                if config.modulation == Modulation::CenterAligned =>
            {
                0
            }
            _ => master_q.period / 2,
        };
        self.set_phase_shift(leg2, shift)?;

        // conversion start for the acquisition subsystem, armed at the
        // beginning of the period until control code places it
        self.enable_adc_trigger(leg1)?;
        self.set_adc_trigger_instant(leg1, 1)?;

        Ok(master_q.period)
    }

    fn init_leg(
        &mut self,
        unit: TimerId,
        q: clock::QuantizedPeriod,
        config: &ConverterConfig,
        mode: PwmMode,
        upper: bool,
    ) -> Result<(), Error> {
        let center = config.modulation == Modulation::CenterAligned;
        let convention = SwitchConvention::new(upper);

        self.block.disable_output(unit, OutputSide::High);
        self.block.disable_output(unit, OutputSide::Low);

        self.block.set_prescaler(unit, q.prescaler);
        self.block.set_continuous_preload(unit);
        self.block.set_center_aligned(unit, center);
        self.block.set_period(unit, q.period);

        // dead time must be in place before the counter first runs
        let dt = DeadTimeCfg::from_ns(&self.clock, config.dead_time);
        self.block
            .set_dead_time(unit, dt.prescaler(), dt.rising(), dt.falling());
        self.block.enable_dead_time(unit);

        self.block.connect_output_pins(unit);
        self.block.enable_counter(unit);

        {
            let descriptor = self.registry.unit_mut(unit);
            descriptor.frequency = q.frequency;
            descriptor.period = q.period;
            descriptor.prescaler = q.prescaler;
            descriptor.duty_cycle = 0;
            descriptor.dead_time = config.dead_time;
            descriptor.dead_time_cfg = dt;
            descriptor.modulation = config.modulation;
            descriptor.pwm_mode = mode;
            descriptor.convention = convention;
            descriptor.compare_slots = CompareSlots::default();
            descriptor.status = Status::Configured;
        }

        // default reset wiring, then let the synchronizer normalize it to
        // exactly one active source
        let default_trigger = self
            .registry
            .unit(unit)
            .phase_shift
            .slot
            .map(|slot| slot.trigger)
            .unwrap_or(ResetTrigger::MASTER_PERIOD);
        self.block.set_reset_triggers(unit, default_trigger);
        self.set_phase_shift(unit, 0)?;

        let wiring = match mode {
            PwmMode::VoltageMode => OutputWiring::voltage_mode(config.modulation, convention),
            PwmMode::CurrentMode => {
                OutputWiring::current_mode(self.registry.unit(unit).external_event, convention)
            }
        };
        output::apply(&mut self.block, unit, wiring, convention);

        if mode == PwmMode::CurrentMode {
            current_mode::wire(self, unit);
        }

        Ok(())
    }

    /// Change the switching frequency of the whole converter at runtime.
    ///
    /// The master is re-quantized at its existing prescaler; every active
    /// slave gets its period derived from the master's and its duty cycle
    /// and phase shift scaled so the relative timing survives the step.
    /// Requests below the minimum-frequency floor are rejected.
    pub fn change_frequency(&mut self, frequency: HertzU32) -> Result<(), Error> {
        if frequency < self.clock.min_frequency() {
            return Err(Error::Frequency);
        }
        if self.registry.master().status == Status::Uninitialized {
            return Err(Error::NotConfigured);
        }

        // the prescaler is frozen at runtime, only periods change
        let prescaler = self.registry.master().prescaler;
        let master_q = self.clock.quantize_at(frequency, prescaler)?;

        // verify every derived slave period before touching any register
        for id in TimerId::SLAVES {
            let descriptor = self.registry.unit(id);
            if !descriptor.is_active() {
                continue;
            }
            let period = match descriptor.modulation {
                Modulation::LeftAligned => u32::from(master_q.period),
                Modulation::CenterAligned => u32::from(master_q.period) / 2,
            };
            if !clock::period_in_bounds(period, prescaler) {
                return Err(Error::Frequency);
            }
        }

        debug!(
            "frequency step to {} Hz, master period {}",
            master_q.frequency.raw(),
            master_q.period
        );

        self.block.set_period(TimerId::Master, master_q.period);
        let master = self.registry.master_mut();
        master.frequency = master_q.frequency;
        master.period = master_q.period;

        for id in TimerId::SLAVES {
            let descriptor = *self.registry.unit(id);
            if !descriptor.is_active() {
                continue;
            }

            let old_period = u32::from(descriptor.period);
            let (new_period, frequency_scale) = match descriptor.modulation {
                Modulation::LeftAligned => (u32::from(master_q.period), 1),
                Modulation::CenterAligned => (u32::from(master_q.period) / 2, 2),
            };

            self.block.set_period(id, new_period as u16);
            {
                let state = self.registry.unit_mut(id);
                state.period = new_period as u16;
                state.frequency =
                    HertzU32::from_raw(master_q.frequency.raw() * frequency_scale);
            }

            match descriptor.pwm_mode {
                PwmMode::VoltageMode => {
                    let duty = (u32::from(descriptor.duty_cycle) * new_period / old_period) as u16;
                    self.set_duty_cycle(id, duty)?;
                }
                // the duty ceiling and ramp step are period-derived and
                // must follow it
                PwmMode::CurrentMode => current_mode::wire(self, id),
            }

            let shift =
                (u32::from(descriptor.phase_shift.value) * new_period / old_period) as u16;
            self.set_phase_shift(id, shift)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fugit::RateExtU32;

    use super::*;
    use crate::{
        block::{AdcTrigger, CompareReg, ExternalEvent},
        clock::ClockConfig,
        output::EventSource,
        sim::SimBlock,
        unit::Purpose,
    };

    fn pwm() -> HrPwm<SimBlock> {
        let clock = ClockConfig::new(170.MHz(), 100.kHz()).unwrap();
        HrPwm::new(SimBlock::new(), clock)
    }

    fn interleaved() -> ConverterConfig {
        ConverterConfig::new(Topology::InterleavedBuck, 200.kHz())
            .with_legs(TimerId::TimA, TimerId::TimC)
    }

    #[test]
    fn interleaved_legs_sit_half_a_period_apart() {
        let mut pwm = pwm();
        let period = pwm.configure(interleaved()).unwrap();
        assert_eq!(period, 27200);

        // leg 1 is the reference and resets on the master period
        assert_eq!(
            pwm.block().reset_triggers(TimerId::TimA),
            ResetTrigger::MASTER_PERIOD
        );

        // leg 2 resets on its master compare, loaded with half a period
        let triggers = pwm.block().reset_triggers(TimerId::TimC);
        assert!(triggers.contains(ResetTrigger::MASTER_CMP2));
        assert!(!triggers.contains(ResetTrigger::MASTER_PERIOD));
        assert_eq!(
            pwm.block().compare(TimerId::Master, CompareReg::Cmp2),
            period / 2
        );
    }

    #[test]
    fn slave_prescalers_always_match_the_master() {
        for modulation in [Modulation::LeftAligned, Modulation::CenterAligned] {
            let mut pwm = pwm();
            pwm.configure(interleaved().with_modulation(modulation))
                .unwrap();

            let master = pwm.unit(TimerId::Master).prescaler;
            for id in TimerId::SLAVES {
                let unit = pwm.unit(id);
                if unit.is_active() {
                    assert_eq!(unit.prescaler, master);
                }
            }
        }
    }

    #[test]
    fn center_aligned_legs_count_half_the_master_period() {
        let mut pwm = pwm();
        let period = pwm
            .configure(interleaved().with_modulation(Modulation::CenterAligned))
            .unwrap();
        assert_eq!(pwm.unit(TimerId::TimA).period, period / 2);
        assert!(pwm.block().center_aligned(TimerId::TimA));
        assert!(!pwm.block().center_aligned(TimerId::Master));
    }

    #[test]
    fn configuring_twice_yields_identical_state() {
        let mut pwm = pwm();
        pwm.configure(interleaved()).unwrap();
        let first = pwm.block().clone();

        pwm.configure(interleaved()).unwrap();
        assert_eq!(*pwm.block(), first);
    }

    #[test]
    fn rejected_requests_write_nothing() {
        let mut pwm = pwm();
        let pristine = pwm.block().clone();

        // center-aligned current mode is a configuration error
        let err = pwm.configure(
            ConverterConfig::new(Topology::PeakCurrentMode, 200.kHz())
                .with_modulation(Modulation::CenterAligned),
        );
        assert_eq!(err, Err(Error::IncompatibleMode));
        assert_eq!(*pwm.block(), pristine);

        // so is a frequency under the floor
        let err = pwm.configure(ConverterConfig::new(Topology::InterleavedBuck, 50.kHz()));
        assert_eq!(err, Err(Error::Frequency));
        assert_eq!(*pwm.block(), pristine);

        // and the master cannot be a leg
        let err = pwm.configure(
            ConverterConfig::new(Topology::InterleavedBuck, 200.kHz())
                .with_legs(TimerId::Master, TimerId::TimB),
        );
        assert_eq!(err, Err(Error::UnsupportedUnit));
        assert_eq!(*pwm.block(), pristine);
    }

    #[test]
    fn revision_patch_inverts_only_leg_two_of_the_bridge() {
        let mut standard = pwm();
        standard
            .configure(
                ConverterConfig::new(Topology::FullBridgeBuck { bipolar: false }, 200.kHz())
                    .with_legs(TimerId::TimA, TimerId::TimC),
            )
            .unwrap();

        let mut patched = pwm();
        patched
            .configure(
                ConverterConfig::new(Topology::FullBridgeBuck { bipolar: false }, 200.kHz())
                    .with_legs(TimerId::TimA, TimerId::TimC)
                    .with_revision(BoardRevision::InvertedLeg2),
            )
            .unwrap();

        // leg 1 identical on both revisions
        assert_eq!(
            standard
                .block()
                .output_set_events(TimerId::TimA, OutputSide::High),
            patched
                .block()
                .output_set_events(TimerId::TimA, OutputSide::High),
        );
        // leg 2 swaps its pair on the patched revision
        assert_eq!(
            standard
                .block()
                .output_set_events(TimerId::TimC, OutputSide::High),
            patched
                .block()
                .output_set_events(TimerId::TimC, OutputSide::Low),
        );
    }

    #[test]
    fn current_mode_claims_its_compare_registers() {
        let mut pwm = pwm();
        let period = pwm
            .configure(
                ConverterConfig::new(Topology::PeakCurrentMode, 200.kHz())
                    .with_legs(TimerId::TimA, TimerId::TimC),
            )
            .unwrap();

        // duty ceiling, ramp step and on-time guard
        assert_eq!(
            u32::from(pwm.block().compare(TimerId::TimA, CompareReg::Cmp1)),
            u32::from(period) * 9 / 10
        );
        assert_eq!(
            pwm.block().compare(TimerId::TimA, CompareReg::Cmp2),
            period / 100
        );
        assert_eq!(
            pwm.block().compare(TimerId::TimA, CompareReg::Cmp4),
            current_mode::MIN_ON_TIME_TICKS
        );
        assert!(pwm.block().dual_dac_enabled(TimerId::TimA));

        // comparator feedback is part of the reset sources
        let reset = pwm
            .block()
            .output_reset_events(TimerId::TimA, OutputSide::High);
        assert!(reset.contains(EventSource::external(ExternalEvent::Eev4)));
        assert!(reset.contains(EventSource::CMP1));

        // software duty writes are refused from here on
        assert_eq!(
            pwm.set_duty_cycle(TimerId::TimA, 100),
            Err(Error::DutyNotSoftwareControlled)
        );
        assert_eq!(
            pwm.unit(TimerId::TimA).compare_slots.get(CompareReg::Cmp1),
            crate::unit::CompareSlot::Reserved(Purpose::CurrentMode)
        );
    }

    #[test]
    fn frequency_step_preserves_duty_and_phase_ratios() {
        let clock = ClockConfig::new(170.MHz(), 50.kHz()).unwrap();
        let mut pwm = HrPwm::new(SimBlock::new(), clock);

        let period = pwm
            .configure(
                ConverterConfig::new(Topology::InterleavedBuck, 100.kHz())
                    .with_legs(TimerId::TimA, TimerId::TimC),
            )
            .unwrap();

        // 30 % duty on both legs, leg 2 moved to a quarter period
        let duty = (u32::from(period) * 3 / 10) as u16;
        pwm.set_duty_cycle(TimerId::TimA, duty).unwrap();
        pwm.set_duty_cycle(TimerId::TimC, duty).unwrap();
        pwm.set_phase_shift(TimerId::TimC, period / 4).unwrap();

        let old_period = u32::from(pwm.unit(TimerId::TimA).period);
        let old_duty = u32::from(pwm.unit(TimerId::TimA).duty_cycle);
        let old_shift = u32::from(pwm.unit(TimerId::TimC).phase_shift.value);

        pwm.change_frequency(150.kHz()).unwrap();

        let new_period = u32::from(pwm.unit(TimerId::TimA).period);
        let new_duty = u32::from(pwm.unit(TimerId::TimA).duty_cycle);
        let new_shift = u32::from(pwm.unit(TimerId::TimC).phase_shift.value);

        assert_ne!(new_period, old_period);
        // ratios survive up to integer rounding
        assert!((new_duty * old_period).abs_diff(old_duty * new_period) <= old_period);
        assert!((new_shift * old_period).abs_diff(old_shift * new_period) <= old_period);

        // the reset compare follows the scaled shift, not a stale count
        assert_eq!(
            u32::from(pwm.block().compare(TimerId::Master, CompareReg::Cmp2)),
            new_shift
        );
        // prescaler untouched by the runtime step
        assert_eq!(
            pwm.unit(TimerId::TimA).prescaler,
            pwm.unit(TimerId::Master).prescaler
        );
    }

    #[test]
    fn below_floor_frequency_step_is_rejected() {
        let mut pwm = pwm();
        pwm.configure(interleaved()).unwrap();
        assert_eq!(pwm.change_frequency(80.kHz()), Err(Error::Frequency));
    }

    #[test]
    fn stopped_legs_restart_without_reconfiguration() {
        let mut pwm = pwm();
        pwm.configure(interleaved()).unwrap();

        pwm.start(TimerId::TimA).unwrap();
        assert_eq!(pwm.unit(TimerId::TimA).status, Status::Running);
        assert!(pwm.block().output_enabled(TimerId::TimA, OutputSide::High));

        pwm.stop(TimerId::TimA).unwrap();
        assert_eq!(pwm.unit(TimerId::TimA).status, Status::Stopped);
        assert!(!pwm.block().output_enabled(TimerId::TimA, OutputSide::High));
        assert!(!pwm.block().output_enabled(TimerId::TimA, OutputSide::Low));

        pwm.start(TimerId::TimA).unwrap();
        assert_eq!(pwm.unit(TimerId::TimA).status, Status::Running);
    }

    #[test]
    fn adc_trigger_follows_leg_one() {
        let mut pwm = pwm();
        pwm.configure(interleaved()).unwrap();

        // unit A drives trigger channel 3 from its compare 3
        assert_eq!(
            pwm.block().adc_source(AdcTrigger::Trig3),
            Some((TimerId::TimA, CompareReg::Cmp3))
        );
        assert_eq!(pwm.block().compare(TimerId::TimA, CompareReg::Cmp3), 1);

        // control code then places the sampling instant
        pwm.set_adc_trigger_instant(TimerId::TimA, 1234).unwrap();
        assert_eq!(pwm.block().compare(TimerId::TimA, CompareReg::Cmp3), 1234);
    }
}
