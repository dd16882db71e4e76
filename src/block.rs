//! # Register Block Interface
//!
//! ## Overview
//! The engine never touches hardware registers directly; every write goes
//! through [`HrtimBlock`]. The trait mirrors the register-level operations of
//! a high-resolution timer block (per-unit period/prescaler/compare
//! programming, counter-reset trigger word, output event sources, dead-time
//! registers, repetition counter, ADC trigger routing, inter-board
//! synchronization), so a PAC-backed implementation is a thin mapping while
//! the [simulated block](crate::sim) makes the whole engine host-testable.
//!
//! Hardware-handshake waits (clock DLL lock) are bounded by hardware and
//! exposed as a single named blocking primitive, [`HrtimBlock::wait_dll_ready`],
//! which a software backend implements as an immediate return.

use crate::{
    output::EventSource,
    phase::ResetTrigger,
    unit::TimerId,
};

/// Compare registers of a timing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CompareReg {
    /// Compare 1, the duty-cycle register in voltage mode
    Cmp1,
    /// Compare 2
    Cmp2,
    /// Compare 3, conventionally the ADC trigger instant
    Cmp3,
    /// Compare 4
    Cmp4,
}

impl CompareReg {
    pub(crate) fn index(self) -> usize {
        match self {
            CompareReg::Cmp1 => 0,
            CompareReg::Cmp2 => 1,
            CompareReg::Cmp3 => 2,
            CompareReg::Cmp4 => 3,
        }
    }
}

/// One of the two complementary outputs of a timing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputSide {
    /// High-side switch output
    High,
    /// Low-side switch output
    Low,
}

impl OutputSide {
    pub(crate) fn index(self) -> usize {
        match self {
            OutputSide::High => 0,
            OutputSide::Low => 1,
        }
    }
}

/// ADC trigger channels of the timer block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcTrigger {
    /// Trigger channel 1
    Trig1,
    /// Trigger channel 2
    Trig2,
    /// Trigger channel 3
    Trig3,
    /// Trigger channel 4
    Trig4,
}

impl AdcTrigger {
    pub(crate) fn index(self) -> usize {
        match self {
            AdcTrigger::Trig1 => 0,
            AdcTrigger::Trig2 => 1,
            AdcTrigger::Trig3 => 2,
            AdcTrigger::Trig4 => 3,
        }
    }
}

/// External event lines usable as output set/reset sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExternalEvent {
    /// External event 1
    Eev1,
    /// External event 2
    Eev2,
    /// External event 3
    Eev3,
    /// External event 4
    Eev4,
    /// External event 5
    Eev5,
}

impl ExternalEvent {
    pub(crate) fn index(self) -> usize {
        match self {
            ExternalEvent::Eev1 => 0,
            ExternalEvent::Eev2 => 1,
            ExternalEvent::Eev3 => 2,
            ExternalEvent::Eev4 => 3,
            ExternalEvent::Eev5 => 4,
        }
    }
}

/// On-chip comparators that can feed an external event line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Comparator {
    /// Comparator 1
    Comp1,
    /// Comparator 2
    Comp2,
    /// Comparator 3
    Comp3,
}

/// Sampling edge selection for the ADC trigger when counting center-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RolloverEdge {
    /// Trigger while counting up
    #[default]
    Up,
    /// Trigger while counting down
    Down,
    /// Trigger on both slopes
    Both,
}

/// Synchronization input source of the timer block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncInSource {
    /// No synchronization input, the block free-runs.
    #[default]
    None,
    /// An external event pin restarts the master timer in phase with the
    /// received pulse.
    ExternalEvent,
}

/// Synchronization output mode of the timer block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncOutMode {
    /// No synchronization output.
    #[default]
    Off,
    /// A positive pulse is generated on the dedicated pin when the reference
    /// leg starts its period.
    PositivePulse,
}

/// Register-programming interface of the timer block.
///
/// All configuration calls execute synchronously on the caller's context;
/// implementations do not block except in [`wait_dll_ready`], which polls a
/// hardware-ready flag with hardware-guaranteed bounded completion.
///
/// [`wait_dll_ready`]: HrtimBlock::wait_dll_ready
pub trait HrtimBlock {
    /// Enable the block clock and wait for the clock DLL calibration to
    /// complete. Bounded busy-poll on hardware; immediate return in software
    /// backends.
    fn wait_dll_ready(&mut self);

    /// Program the clock prescaler of a unit. Must be written before the
    /// period and compare registers at start-up.
    fn set_prescaler(&mut self, unit: TimerId, prescaler: u8);
    /// Read back the programmed prescaler of a unit.
    fn prescaler(&self, unit: TimerId) -> u8;
    /// Program the counter period of a unit.
    fn set_period(&mut self, unit: TimerId, period: u16);
    /// Read back the programmed period of a unit.
    fn period(&self, unit: TimerId) -> u16;
    /// Program a compare register of a unit.
    fn set_compare(&mut self, unit: TimerId, reg: CompareReg, value: u16);
    /// Read back a compare register of a unit.
    fn compare(&self, unit: TimerId, reg: CompareReg) -> u16;

    /// Put the counter in continuous mode with register preload on the
    /// repetition event.
    fn set_continuous_preload(&mut self, unit: TimerId);
    /// Select up-down (center-aligned) or up (left-aligned) counting.
    fn set_center_aligned(&mut self, unit: TimerId, center: bool);
    /// Enable the counter of a unit.
    fn enable_counter(&mut self, unit: TimerId);
    /// Disable the counter of a unit.
    fn disable_counter(&mut self, unit: TimerId);

    /// Replace the whole counter-reset trigger word of a unit.
    fn set_reset_triggers(&mut self, unit: TimerId, triggers: ResetTrigger);
    /// Read the counter-reset trigger word of a unit.
    fn reset_triggers(&self, unit: TimerId) -> ResetTrigger;

    /// Program the events that assert an output.
    fn set_output_set_events(&mut self, unit: TimerId, side: OutputSide, events: EventSource);
    /// Program the events that deassert an output.
    fn set_output_reset_events(&mut self, unit: TimerId, side: OutputSide, events: EventSource);
    /// Swap the two outputs of a unit without rewiring their event sources.
    fn set_output_swap(&mut self, unit: TimerId, swapped: bool);
    /// Enable an output driver; the pin follows the set/reset events.
    fn enable_output(&mut self, unit: TimerId, side: OutputSide);
    /// Disable an output driver; the pin falls to its idle level immediately.
    fn disable_output(&mut self, unit: TimerId, side: OutputSide);
    /// Route the unit's output pair to its GPIO pins.
    fn connect_output_pins(&mut self, unit: TimerId);

    /// Program the dead-time generator registers of a unit. The prescaler
    /// cannot be changed while the counter runs.
    fn set_dead_time(&mut self, unit: TimerId, prescaler: u8, rising: u16, falling: u16);
    /// Insert the programmed dead time between the complementary outputs.
    fn enable_dead_time(&mut self, unit: TimerId);

    /// Program the repetition counter of a unit (events divided by
    /// `repetition + 1`).
    fn set_repetition(&mut self, unit: TimerId, repetition: u8);
    /// Read back the repetition counter of a unit.
    fn repetition(&self, unit: TimerId) -> u8;
    /// Enable the repetition-event interrupt of a unit.
    fn enable_repetition_interrupt(&mut self, unit: TimerId);
    /// Disable the repetition-event interrupt of a unit.
    fn disable_repetition_interrupt(&mut self, unit: TimerId);
    /// Acknowledge a pending repetition event.
    fn acknowledge_repetition(&mut self, unit: TimerId);
    /// Enable the synchronization-input interrupt.
    fn enable_sync_interrupt(&mut self);
    /// Acknowledge a pending synchronization-input event.
    fn acknowledge_sync(&mut self);

    /// Route a unit compare event to an ADC trigger channel.
    fn set_adc_trigger_source(&mut self, trigger: AdcTrigger, unit: TimerId, reg: CompareReg);
    /// Remove the source of an ADC trigger channel.
    fn clear_adc_trigger_source(&mut self, trigger: AdcTrigger);
    /// Select which unit's update event latches the trigger registers.
    fn set_adc_trigger_update(&mut self, trigger: AdcTrigger, unit: TimerId);
    /// Divide the trigger rate (`ratio` of 0 passes every event).
    fn set_adc_postscaler(&mut self, trigger: AdcTrigger, ratio: u8);
    /// Select the sampling edge used when the source unit counts
    /// center-aligned.
    fn set_adc_rollover(&mut self, unit: TimerId, edge: RolloverEdge);

    /// Bind a comparator output to an external event line (high polarity,
    /// level sensitive).
    fn bind_comparator_event(&mut self, event: ExternalEvent, comparator: Comparator);
    /// Drive the unit's DAC synchronization trigger: reset on counter reset,
    /// step on the compare-2 event. Generates the current-mode reference
    /// ramp.
    fn enable_dual_dac_trigger(&mut self, unit: TimerId);

    /// Configure the synchronization output.
    fn set_sync_out(&mut self, mode: SyncOutMode);
    /// Read the synchronization output mode.
    fn sync_out(&self) -> SyncOutMode;
    /// Configure the synchronization input.
    fn set_sync_in(&mut self, source: SyncInSource);
    /// Read the synchronization input source.
    fn sync_in(&self) -> SyncInSource;
    /// Restart a timer in phase with the received synchronization pulse.
    fn enable_reset_on_sync(&mut self, unit: TimerId);
    /// Emit one synchronization pulse on the dedicated pin.
    fn pulse_sync_out_pin(&mut self);
}
