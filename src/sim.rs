//! # Software Register Block
//!
//! ## Overview
//! [`SimBlock`] implements [`HrtimBlock`](crate::block::HrtimBlock) on plain
//! arrays: every register write lands in memory and can be read back, and
//! the hardware-handshake wait returns immediately. The crate's own tests
//! drive the complete engine against it; host-side harnesses can do the
//! same through the `sim` feature.

use crate::{
    block::{
        AdcTrigger,
        Comparator,
        CompareReg,
        ExternalEvent,
        HrtimBlock,
        OutputSide,
        RolloverEdge,
        SyncInSource,
        SyncOutMode,
    },
    output::EventSource,
    phase::ResetTrigger,
    unit::TimerId,
};

const UNITS: usize = 7;

fn idx(unit: TimerId) -> usize {
    match unit {
        TimerId::Master => 0,
        TimerId::TimA => 1,
        TimerId::TimB => 2,
        TimerId::TimC => 3,
        TimerId::TimD => 4,
        TimerId::TimE => 5,
        TimerId::TimF => 6,
    }
}

/// Array-backed register block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimBlock {
    prescaler: [u8; UNITS],
    period: [u16; UNITS],
    compare: [[u16; 4]; UNITS],
    continuous_preload: [bool; UNITS],
    center_aligned: [bool; UNITS],
    counter_enabled: [bool; UNITS],
    reset_triggers: [ResetTrigger; UNITS],
    output_set: [[EventSource; 2]; UNITS],
    output_reset: [[EventSource; 2]; UNITS],
    output_enabled: [[bool; 2]; UNITS],
    output_swapped: [bool; UNITS],
    pins_connected: [bool; UNITS],
    dead_time: [(u8, u16, u16); UNITS],
    dead_time_enabled: [bool; UNITS],
    repetition: [u8; UNITS],
    repetition_irq: [bool; UNITS],
    sync_irq: bool,
    repetition_acks: u32,
    sync_acks: u32,
    adc_source: [Option<(TimerId, CompareReg)>; 4],
    adc_update: [Option<TimerId>; 4],
    adc_postscaler: [u8; 4],
    adc_rollover: [RolloverEdge; UNITS],
    comparator_events: [Option<Comparator>; 5],
    dual_dac: [bool; UNITS],
    sync_out: SyncOutMode,
    sync_in: SyncInSource,
    reset_on_sync: [bool; UNITS],
    sync_pulses: u32,
}

impl SimBlock {
    /// A block with every register zeroed.
    pub fn new() -> Self {
        SimBlock::default()
    }

    /// Set-event word of an output.
    pub fn output_set_events(&self, unit: TimerId, side: OutputSide) -> EventSource {
        self.output_set[idx(unit)][side.index()]
    }

    /// Reset-event word of an output.
    pub fn output_reset_events(&self, unit: TimerId, side: OutputSide) -> EventSource {
        self.output_reset[idx(unit)][side.index()]
    }

    /// Whether an output driver is enabled.
    pub fn output_enabled(&self, unit: TimerId, side: OutputSide) -> bool {
        self.output_enabled[idx(unit)][side.index()]
    }

    /// Whether a unit's outputs are swapped.
    pub fn output_swapped(&self, unit: TimerId) -> bool {
        self.output_swapped[idx(unit)]
    }

    /// Whether a unit counts center-aligned.
    pub fn center_aligned(&self, unit: TimerId) -> bool {
        self.center_aligned[idx(unit)]
    }

    /// Whether a unit's counter is running.
    pub fn counter_enabled(&self, unit: TimerId) -> bool {
        self.counter_enabled[idx(unit)]
    }

    /// Dead-time registers of a unit: prescaler, rising, falling.
    pub fn dead_time(&self, unit: TimerId) -> (u8, u16, u16) {
        self.dead_time[idx(unit)]
    }

    /// Whether dead-time insertion is enabled on a unit.
    pub fn dead_time_enabled(&self, unit: TimerId) -> bool {
        self.dead_time_enabled[idx(unit)]
    }

    /// Whether a unit's pins are routed.
    pub fn pins_connected(&self, unit: TimerId) -> bool {
        self.pins_connected[idx(unit)]
    }

    /// Source of an ADC trigger channel.
    pub fn adc_source(&self, trigger: AdcTrigger) -> Option<(TimerId, CompareReg)> {
        self.adc_source[trigger.index()]
    }

    /// Postscaler of an ADC trigger channel.
    pub fn adc_postscaler(&self, trigger: AdcTrigger) -> u8 {
        self.adc_postscaler[trigger.index()]
    }

    /// Comparator bound to an external event line.
    pub fn comparator_event(&self, event: ExternalEvent) -> Option<Comparator> {
        self.comparator_events[event.index()]
    }

    /// Whether the DAC ramp trigger of a unit is enabled.
    pub fn dual_dac_enabled(&self, unit: TimerId) -> bool {
        self.dual_dac[idx(unit)]
    }

    /// Whether a unit restarts on the synchronization input.
    pub fn reset_on_sync(&self, unit: TimerId) -> bool {
        self.reset_on_sync[idx(unit)]
    }

    /// Number of pulses emitted on the synchronization output pin.
    pub fn sync_pulses(&self) -> u32 {
        self.sync_pulses
    }

    /// Number of acknowledged repetition events.
    pub fn repetition_acks(&self) -> u32 {
        self.repetition_acks
    }

    /// Number of acknowledged synchronization events.
    pub fn sync_acks(&self) -> u32 {
        self.sync_acks
    }
}

impl HrtimBlock for SimBlock {
    fn wait_dll_ready(&mut self) {
        // immediate-return stand-in for the bounded hardware handshake
    }

    fn set_prescaler(&mut self, unit: TimerId, prescaler: u8) {
        self.prescaler[idx(unit)] = prescaler;
    }

    fn prescaler(&self, unit: TimerId) -> u8 {
        self.prescaler[idx(unit)]
    }

    fn set_period(&mut self, unit: TimerId, period: u16) {
        self.period[idx(unit)] = period;
    }

    fn period(&self, unit: TimerId) -> u16 {
        self.period[idx(unit)]
    }

    fn set_compare(&mut self, unit: TimerId, reg: CompareReg, value: u16) {
        self.compare[idx(unit)][reg.index()] = value;
    }

    fn compare(&self, unit: TimerId, reg: CompareReg) -> u16 {
        self.compare[idx(unit)][reg.index()]
    }

    fn set_continuous_preload(&mut self, unit: TimerId) {
        self.continuous_preload[idx(unit)] = true;
    }

    fn set_center_aligned(&mut self, unit: TimerId, center: bool) {
        self.center_aligned[idx(unit)] = center;
    }

    fn enable_counter(&mut self, unit: TimerId) {
        self.counter_enabled[idx(unit)] = true;
    }

    fn disable_counter(&mut self, unit: TimerId) {
        self.counter_enabled[idx(unit)] = false;
    }

    fn set_reset_triggers(&mut self, unit: TimerId, triggers: ResetTrigger) {
        self.reset_triggers[idx(unit)] = triggers;
    }

    fn reset_triggers(&self, unit: TimerId) -> ResetTrigger {
        self.reset_triggers[idx(unit)]
    }

    fn set_output_set_events(&mut self, unit: TimerId, side: OutputSide, events: EventSource) {
        self.output_set[idx(unit)][side.index()] = events;
    }

    fn set_output_reset_events(&mut self, unit: TimerId, side: OutputSide, events: EventSource) {
        self.output_reset[idx(unit)][side.index()] = events;
    }

    fn set_output_swap(&mut self, unit: TimerId, swapped: bool) {
        self.output_swapped[idx(unit)] = swapped;
    }

    fn enable_output(&mut self, unit: TimerId, side: OutputSide) {
        self.output_enabled[idx(unit)][side.index()] = true;
    }

    fn disable_output(&mut self, unit: TimerId, side: OutputSide) {
        self.output_enabled[idx(unit)][side.index()] = false;
    }

    fn connect_output_pins(&mut self, unit: TimerId) {
        self.pins_connected[idx(unit)] = true;
    }

    fn set_dead_time(&mut self, unit: TimerId, prescaler: u8, rising: u16, falling: u16) {
        self.dead_time[idx(unit)] = (prescaler, rising, falling);
    }

    fn enable_dead_time(&mut self, unit: TimerId) {
        self.dead_time_enabled[idx(unit)] = true;
    }

    fn set_repetition(&mut self, unit: TimerId, repetition: u8) {
        self.repetition[idx(unit)] = repetition;
    }

    fn repetition(&self, unit: TimerId) -> u8 {
        self.repetition[idx(unit)]
    }

    fn enable_repetition_interrupt(&mut self, unit: TimerId) {
        self.repetition_irq[idx(unit)] = true;
    }

    fn disable_repetition_interrupt(&mut self, unit: TimerId) {
        self.repetition_irq[idx(unit)] = false;
    }

    fn acknowledge_repetition(&mut self, _unit: TimerId) {
        self.repetition_acks += 1;
    }

    fn enable_sync_interrupt(&mut self) {
        self.sync_irq = true;
    }

    fn acknowledge_sync(&mut self) {
        self.sync_acks += 1;
    }

    fn set_adc_trigger_source(&mut self, trigger: AdcTrigger, unit: TimerId, reg: CompareReg) {
        self.adc_source[trigger.index()] = Some((unit, reg));
    }

    fn clear_adc_trigger_source(&mut self, trigger: AdcTrigger) {
        self.adc_source[trigger.index()] = None;
    }

    fn set_adc_trigger_update(&mut self, trigger: AdcTrigger, unit: TimerId) {
        self.adc_update[trigger.index()] = Some(unit);
    }

    fn set_adc_postscaler(&mut self, trigger: AdcTrigger, ratio: u8) {
        self.adc_postscaler[trigger.index()] = ratio;
    }

    fn set_adc_rollover(&mut self, unit: TimerId, edge: RolloverEdge) {
        self.adc_rollover[idx(unit)] = edge;
    }

    fn bind_comparator_event(&mut self, event: ExternalEvent, comparator: Comparator) {
        self.comparator_events[event.index()] = Some(comparator);
    }

    fn enable_dual_dac_trigger(&mut self, unit: TimerId) {
        self.dual_dac[idx(unit)] = true;
    }

    fn set_sync_out(&mut self, mode: SyncOutMode) {
        self.sync_out = mode;
    }

    fn sync_out(&self) -> SyncOutMode {
        self.sync_out
    }

    fn set_sync_in(&mut self, source: SyncInSource) {
        self.sync_in = source;
    }

    fn sync_in(&self) -> SyncInSource {
        self.sync_in
    }

    fn enable_reset_on_sync(&mut self, unit: TimerId) {
        self.reset_on_sync[idx(unit)] = true;
    }

    fn pulse_sync_out_pin(&mut self) {
        self.sync_pulses += 1;
    }
}
