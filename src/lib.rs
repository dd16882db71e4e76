//! # PWM Timing Engine for High-Resolution-Timer Power Converters
//!
//! ## Overview
//!
//! This crate drives the switching waveforms of a dual/multi-leg power
//! converter built on a high-resolution hardware timer block with one
//! master timer and up to six slave timing units, each producing a
//! complementary PWM pair. It covers the timing side of the converter:
//! - quantizing a requested switching frequency into period/prescaler
//!   register values under the hardware bounds,
//! - synchronizing all units to a common phase reference with arbitrary
//!   sub-period phase offsets,
//! - dead-time insertion between the complementary switches,
//! - composing units into named converter topologies (interleaved
//!   buck/boost, full-bridge, independent legs, peak current mode),
//! - runtime frequency changes that preserve duty-cycle and phase ratios,
//! - ADC trigger placement and inter-board synchronization pulses.
//!
//! The converter's electrical behavior and the closed-loop controller are
//! out of scope; duty cycles come from higher-level control code.
//!
//! ## Configuration
//!
//! All hardware access goes through the [`block::HrtimBlock`] trait, so the
//! engine runs unchanged against a memory-mapped register block or the
//! [software backend](crate::sim) used for host-side testing.
//!
//! ## Examples
//!
//! ### A 200 kHz interleaved buck converter
//!
//! ```rust, no_run
//! use fugit::RateExtU32;
//! use hrpwm_hal::{
//!     clock::ClockConfig,
//!     topology::{ConverterConfig, Topology},
//!     unit::TimerId,
//!     HrPwm, HrtimBlock,
//! };
//!
//! fn bring_up<B: HrtimBlock>(block: B) {
//!     // 170 MHz timer clock, never switching below 100 kHz
//!     let clock = ClockConfig::new(170.MHz(), 100.kHz()).unwrap();
//!     let mut pwm = HrPwm::new(block, clock);
//!
//!     pwm.configure(ConverterConfig::new(Topology::InterleavedBuck, 200.kHz()))
//!         .unwrap();
//!
//!     pwm.set_duty_ratio(TimerId::TimA, 0.5).unwrap();
//!     pwm.set_duty_ratio(TimerId::TimB, 0.5).unwrap();
//!     pwm.start(TimerId::TimA).unwrap();
//!     pwm.start(TimerId::TimB).unwrap();
//! }
//! ```
//!
//! ## Concurrency
//!
//! Configuration calls execute synchronously on the caller's context and
//! mutate the shared registers and the unit registry directly; callers
//! serialize them. The one asynchronous element is the periodic event
//! callback, which runs in interrupt context (see [`sync`]).
//!
//! ## Feature Flags
#![doc = document_features::document_features!()]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs, rust_2018_idioms)]
#![no_std]

// MUST be the first module
mod fmt;

pub mod block;
pub mod clock;
pub mod current_mode;
pub mod dead_time;
pub mod output;
pub mod phase;
#[cfg(any(test, feature = "sim"))]
#[cfg_attr(docsrs, doc(cfg(feature = "sim")))]
pub mod sim;
pub mod sync;
pub mod topology;
pub mod unit;

use crate::{
    block::{CompareReg, OutputSide},
    clock::{ClockConfig, FrequencyError},
    dead_time::{DeadTime, DeadTimeCfg},
    unit::{Modulation, Purpose, PwmMode, Registry, Status, TimerId, TimingUnit},
};

pub use crate::block::HrtimBlock;

/// Engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The requested frequency cannot be realized within the hardware
    /// bounds, or lies below the minimum-frequency floor.
    Frequency,
    /// The unit has not been configured by a topology call yet.
    NotConfigured,
    /// The requested mode combination is not supported (center-aligned
    /// current mode).
    IncompatibleMode,
    /// The operation does not apply to this timing unit.
    UnsupportedUnit,
    /// Duty cycle is governed by the comparator in current mode and cannot
    /// be set by software.
    DutyNotSoftwareControlled,
}

impl From<FrequencyError> for Error {
    fn from(_: FrequencyError) -> Self {
        Error::Frequency
    }
}

/// The PWM timing engine.
///
/// Owns the register block and the timing-unit registry. The topology
/// configurator ([`HrPwm::configure`]) is the entry point that brings units
/// to life; the remaining methods operate on the configured registry.
pub struct HrPwm<B> {
    pub(crate) block: B,
    pub(crate) clock: ClockConfig,
    pub(crate) registry: Registry,
}

impl<B: HrtimBlock> HrPwm<B> {
    /// Take ownership of a register block.
    ///
    /// Nothing is programmed until a topology is configured.
    pub fn new(block: B, clock: ClockConfig) -> Self {
        HrPwm {
            block,
            clock,
            registry: Registry::new(),
        }
    }

    /// The clock configuration the engine quantizes against.
    pub fn clock(&self) -> &ClockConfig {
        &self.clock
    }

    /// Read-only access to the register block.
    pub fn block(&self) -> &B {
        &self.block
    }

    /// Descriptor of a timing unit.
    pub fn unit(&self, id: TimerId) -> &TimingUnit {
        self.registry.unit(id)
    }

    /// Realized period of the master timer.
    pub fn master_period(&self) -> u16 {
        self.registry.master().period
    }

    /// Realized period of a timing unit.
    pub fn period(&self, unit: TimerId) -> u16 {
        self.registry.unit(unit).period
    }

    /// Set the duty cycle of a leg, in counter ticks.
    ///
    /// Values beyond the period are clamped to it. Rejected in current
    /// mode, where the comparator terminates the pulse.
    pub fn set_duty_cycle(&mut self, unit: TimerId, ticks: u16) -> Result<(), Error> {
        if unit.slave_index().is_none() {
            return Err(Error::UnsupportedUnit);
        }
        let descriptor = self.registry.unit(unit);
        if !descriptor.is_active() {
            return Err(Error::NotConfigured);
        }
        if descriptor.pwm_mode == PwmMode::CurrentMode {
            return Err(Error::DutyNotSoftwareControlled);
        }

        let ticks = ticks.min(descriptor.period);
        if ticks == descriptor.duty_cycle {
            return Ok(());
        }

        self.block.set_compare(unit, CompareReg::Cmp1, ticks);
        let state = self.registry.unit_mut(unit);
        let _ = state.compare_slots.reserve(CompareReg::Cmp1, Purpose::DutyCycle);
        state.duty_cycle = ticks;
        Ok(())
    }

    /// Set the duty cycle of a leg as a ratio in `[0, 1]`.
    pub fn set_duty_ratio(&mut self, unit: TimerId, ratio: f32) -> Result<(), Error> {
        let period = self.registry.unit(unit).period;
        let ratio = ratio.clamp(0.0, 1.0);
        self.set_duty_cycle(unit, (ratio * f32::from(period)) as u16)
    }

    /// Enable both outputs of a leg; the waveform starts driving the pins.
    pub fn start(&mut self, unit: TimerId) -> Result<(), Error> {
        if unit.slave_index().is_none() {
            return Err(Error::UnsupportedUnit);
        }
        if !self.registry.unit(unit).is_active() {
            return Err(Error::NotConfigured);
        }
        self.block.enable_output(unit, OutputSide::High);
        self.block.enable_output(unit, OutputSide::Low);
        self.registry.unit_mut(unit).status = Status::Running;
        Ok(())
    }

    /// Force both outputs of a leg to their idle level immediately.
    ///
    /// The counter keeps running; [`HrPwm::start`] resumes without
    /// reconfiguration.
    pub fn stop(&mut self, unit: TimerId) -> Result<(), Error> {
        if unit.slave_index().is_none() {
            return Err(Error::UnsupportedUnit);
        }
        if !self.registry.unit(unit).is_active() {
            return Err(Error::NotConfigured);
        }
        self.block.disable_output(unit, OutputSide::High);
        self.block.disable_output(unit, OutputSide::Low);
        let state = self.registry.unit_mut(unit);
        if state.status == Status::Running {
            state.status = Status::Stopped;
        }
        Ok(())
    }

    /// Enable a single output of a leg.
    pub fn enable_output(&mut self, unit: TimerId, side: OutputSide) -> Result<(), Error> {
        if unit.slave_index().is_none() {
            return Err(Error::UnsupportedUnit);
        }
        if !self.registry.unit(unit).is_active() {
            return Err(Error::NotConfigured);
        }
        self.block.enable_output(unit, side);
        Ok(())
    }

    /// Disable a single output of a leg.
    pub fn disable_output(&mut self, unit: TimerId, side: OutputSide) -> Result<(), Error> {
        if unit.slave_index().is_none() {
            return Err(Error::UnsupportedUnit);
        }
        if !self.registry.unit(unit).is_active() {
            return Err(Error::NotConfigured);
        }
        self.block.disable_output(unit, side);
        Ok(())
    }

    /// Adjust the dead time of a running leg.
    ///
    /// The edge values are re-expressed at the prescaler derived during
    /// configuration; the counter is bounced around the register write, as
    /// the generator cannot be reprogrammed while it runs.
    pub fn set_dead_time(&mut self, unit: TimerId, dead_time: DeadTime) -> Result<(), Error> {
        if unit.slave_index().is_none() {
            return Err(Error::UnsupportedUnit);
        }
        if !self.registry.unit(unit).is_active() {
            return Err(Error::NotConfigured);
        }

        let prescaler = self.registry.unit(unit).dead_time_cfg.prescaler();
        let cfg = DeadTimeCfg::at_prescaler(&self.clock, dead_time, prescaler);

        self.block.disable_counter(unit);
        self.block
            .set_dead_time(unit, cfg.prescaler(), cfg.rising(), cfg.falling());
        self.block.enable_counter(unit);

        let state = self.registry.unit_mut(unit);
        state.dead_time = dead_time;
        state.dead_time_cfg = cfg;
        Ok(())
    }

    /// Route a unit's compare-3 event to its ADC trigger channel.
    pub fn enable_adc_trigger(&mut self, unit: TimerId) -> Result<(), Error> {
        if unit.slave_index().is_none() {
            return Err(Error::UnsupportedUnit);
        }
        let descriptor = *self.registry.unit(unit);
        if !descriptor.is_active() {
            return Err(Error::NotConfigured);
        }

        self.block
            .set_adc_trigger_source(descriptor.adc.trigger, unit, descriptor.adc.source);
        self.block.set_adc_trigger_update(descriptor.adc.trigger, unit);
        if descriptor.modulation == Modulation::CenterAligned {
            self.block.set_adc_rollover(unit, descriptor.adc.rollover);
        }
        Ok(())
    }

    /// Detach a unit's ADC trigger channel.
    pub fn disable_adc_trigger(&mut self, unit: TimerId) -> Result<(), Error> {
        if unit.slave_index().is_none() {
            return Err(Error::UnsupportedUnit);
        }
        self.block
            .clear_adc_trigger_source(self.registry.unit(unit).adc.trigger);
        Ok(())
    }

    /// Place the conversion start, in counter ticks of the unit.
    pub fn set_adc_trigger_instant(&mut self, unit: TimerId, ticks: u16) -> Result<(), Error> {
        if unit.slave_index().is_none() {
            return Err(Error::UnsupportedUnit);
        }
        if !self.registry.unit(unit).is_active() {
            return Err(Error::NotConfigured);
        }
        self.block.set_compare(unit, CompareReg::Cmp3, ticks);
        let _ = self
            .registry
            .unit_mut(unit)
            .compare_slots
            .reserve(CompareReg::Cmp3, Purpose::AdcTrigger);
        Ok(())
    }

    /// Place the conversion start three quarters into the on-time, clear of
    /// both switching edges. Left-aligned counting only.
    pub fn set_adc_trigger_for_pulse(
        &mut self,
        unit: TimerId,
        pulse_width: u16,
    ) -> Result<(), Error> {
        self.set_adc_trigger_instant(unit, (pulse_width >> 1) + (pulse_width >> 2))
    }

    /// Divide the ADC trigger rate; `decimation` is clamped to `1..=32`.
    pub fn set_adc_decimation(&mut self, unit: TimerId, decimation: u8) {
        let decimation = decimation.clamp(1, 32);
        self.block
            .set_adc_postscaler(self.registry.unit(unit).adc.trigger, decimation - 1);
    }

    /// Select the sampling edge used with center-aligned counting.
    pub fn set_adc_rollover(&mut self, unit: TimerId, edge: block::RolloverEdge) {
        self.registry.unit_mut(unit).adc.rollover = edge;
        if self.registry.unit(unit).is_active()
            && self.registry.unit(unit).modulation == Modulation::CenterAligned
        {
            self.block.set_adc_rollover(unit, edge);
        }
    }

    /// Borrow one leg as a standalone duty-cycle handle.
    pub fn leg(&mut self, unit: TimerId) -> PwmLeg<'_, B> {
        PwmLeg { pwm: self, unit }
    }
}

/// A single leg borrowed from the engine, usable as a plain PWM channel.
pub struct PwmLeg<'d, B> {
    pwm: &'d mut HrPwm<B>,
    unit: TimerId,
}

impl<B: HrtimBlock> PwmLeg<'_, B> {
    /// The timing unit behind this leg.
    pub fn unit(&self) -> TimerId {
        self.unit
    }

    /// The leg's counter period, the maximum duty value.
    pub fn period(&self) -> u16 {
        self.pwm.registry.unit(self.unit).period
    }

    /// Set the duty cycle in counter ticks.
    pub fn set_duty_cycle(&mut self, ticks: u16) -> Result<(), Error> {
        self.pwm.set_duty_cycle(self.unit, ticks)
    }
}

#[cfg(feature = "embedded-hal")]
impl embedded_hal::pwm::Error for Error {
    fn kind(&self) -> embedded_hal::pwm::ErrorKind {
        embedded_hal::pwm::ErrorKind::Other
    }
}

#[cfg(feature = "embedded-hal")]
impl<B: HrtimBlock> embedded_hal::pwm::ErrorType for PwmLeg<'_, B> {
    type Error = Error;
}

#[cfg(feature = "embedded-hal")]
impl<B: HrtimBlock> embedded_hal::pwm::SetDutyCycle for PwmLeg<'_, B> {
    fn max_duty_cycle(&self) -> u16 {
        self.period()
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        PwmLeg::set_duty_cycle(self, duty)
    }
}
