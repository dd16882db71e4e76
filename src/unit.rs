//! # Timing Unit Registry
//!
//! ## Overview
//! The timer block exposes one master timer and six slave timing units, each
//! producing a complementary pair of PWM outputs. This module holds the
//! driver-side descriptor for every unit: realized period and prescaler,
//! duty cycle, dead time, modulation, phase-shift wiring, switch convention,
//! compare-register reservations and the ADC trigger binding.
//!
//! The descriptors are populated once with hardware-derived defaults (reset
//! trigger routing, ADC trigger channels, external event bindings) and then
//! mutated by the topology configurator and the runtime setters.

use fugit::HertzU32;

use crate::{
    block::{AdcTrigger, Comparator, CompareReg, ExternalEvent, RolloverEdge},
    dead_time::{DeadTime, DeadTimeCfg},
    output::SwitchConvention,
    phase::ResetTrigger,
};

/// Number of slave timing units in the timer block.
pub const SLAVE_COUNT: usize = 6;

/// Identity of a timing unit.
///
/// The master never drives outputs itself; it is the common phase reference
/// every slave synchronizes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    /// The master timer
    Master,
    /// Timing unit A
    TimA,
    /// Timing unit B
    TimB,
    /// Timing unit C
    TimC,
    /// Timing unit D
    TimD,
    /// Timing unit E
    TimE,
    /// Timing unit F
    TimF,
}

impl TimerId {
    /// All slave units, in hardware order.
    pub const SLAVES: [TimerId; SLAVE_COUNT] = [
        TimerId::TimA,
        TimerId::TimB,
        TimerId::TimC,
        TimerId::TimD,
        TimerId::TimE,
        TimerId::TimF,
    ];

    /// Index of a slave unit into the registry table, `None` for the master.
    pub(crate) fn slave_index(self) -> Option<usize> {
        match self {
            TimerId::Master => None,
            TimerId::TimA => Some(0),
            TimerId::TimB => Some(1),
            TimerId::TimC => Some(2),
            TimerId::TimD => Some(3),
            TimerId::TimE => Some(4),
            TimerId::TimF => Some(5),
        }
    }
}

/// Counter alignment of a timing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Modulation {
    /// Counter counts up from zero to the period, left-aligned pulses.
    #[default]
    LeftAligned,
    /// Counter counts up to the period and back down, center-aligned pulses.
    /// The counting period spans the PWM period twice.
    CenterAligned,
}

/// Duty-cycle control scheme of a timing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmMode {
    /// Duty cycle is set by software through compare register 1.
    #[default]
    VoltageMode,
    /// Duty-cycle termination is governed by an external comparator against
    /// a ramping reference. Compare registers 1, 2 and 4 are claimed by the
    /// engine and software duty-cycle writes are rejected.
    CurrentMode,
}

/// Lifecycle state of a timing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// Descriptor holds defaults only, no register has been programmed.
    #[default]
    Uninitialized,
    /// Registers are programmed and the counter runs, outputs disabled.
    Configured,
    /// Outputs are enabled and the unit drives its pins.
    Running,
    /// Outputs were forced low after running; restarting needs no
    /// reconfiguration.
    Stopped,
}

/// What a compare register has been committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Purpose {
    /// Software duty-cycle control
    DutyCycle,
    /// Phase-shift reset trigger of another unit
    PhaseShift,
    /// Peak-current-mode wiring (duty ceiling, ramp step, on-time guard)
    CurrentMode,
    /// ADC conversion trigger instant
    AdcTrigger,
}

/// Reservation state of one compare register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CompareSlot {
    /// Register is available.
    #[default]
    Free,
    /// Register is committed to the given purpose and must not be reused.
    Reserved(Purpose),
}

/// Per-unit tracking of the four compare registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompareSlots([CompareSlot; 4]);

impl CompareSlots {
    /// Current state of a compare register.
    pub fn get(&self, reg: CompareReg) -> CompareSlot {
        self.0[reg.index()]
    }

    /// Whether a compare register is still unclaimed.
    pub fn is_free(&self, reg: CompareReg) -> bool {
        self.get(reg) == CompareSlot::Free
    }

    /// Claim a register. Re-claiming for the same purpose is allowed so that
    /// reconfiguration stays idempotent; a different purpose is a conflict.
    pub(crate) fn reserve(&mut self, reg: CompareReg, purpose: Purpose) -> Result<(), Purpose> {
        match self.get(reg) {
            CompareSlot::Free => {
                self.0[reg.index()] = CompareSlot::Reserved(purpose);
                Ok(())
            }
            CompareSlot::Reserved(p) if p == purpose => Ok(()),
            CompareSlot::Reserved(p) => Err(p),
        }
    }

    pub(crate) fn release(&mut self, reg: CompareReg) {
        self.0[reg.index()] = CompareSlot::Free;
    }
}

/// How a slave unit is phase-positioned against its reference.
///
/// `slot` names the compare register of the reference unit that receives the
/// shift value and the reset-trigger event selecting it. The unit without a
/// dedicated master compare slot borrows a sibling compare instead; the
/// reference leg itself has no slot and always resets on the master period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhaseShift {
    /// Current shift, in period ticks of the reference timer.
    pub value: u16,
    /// Reset wiring used when the shift is nonzero.
    pub slot: Option<ShiftSlot>,
}

/// Reset wiring of a phase-shifted unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ShiftSlot {
    /// Unit whose compare event resets this unit's counter.
    pub reference: TimerId,
    /// Compare register of the reference that holds the shift value.
    pub compare: CompareReg,
    /// Reset-trigger event selecting that compare.
    pub trigger: ResetTrigger,
}

/// ADC trigger binding of a timing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcWiring {
    /// Hardware trigger channel signalling "start conversion".
    pub trigger: AdcTrigger,
    /// Compare register whose event produces the trigger edge.
    pub source: CompareReg,
    /// Sampling edge for center-aligned counting.
    pub rollover: RolloverEdge,
}

/// Driver-side descriptor of one timing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingUnit {
    /// Unit identity.
    pub id: TimerId,
    /// Realized switching frequency after quantization.
    pub frequency: HertzU32,
    /// Counter period register value.
    pub period: u16,
    /// Clock prescaler (0..=7), equal to the master's for every active slave.
    pub prescaler: u8,
    /// Current compare-1 value, always `0..=period`.
    pub duty_cycle: u16,
    /// Requested dead time. Fixed once the counter is enabled; the runtime
    /// setter bounces the counter to change it.
    pub dead_time: DeadTime,
    /// Register values derived from the request. The prescaler in here is
    /// programmed once and reused by runtime adjustments.
    pub dead_time_cfg: DeadTimeCfg,
    /// Counter alignment.
    pub modulation: Modulation,
    /// Duty-cycle control scheme.
    pub pwm_mode: PwmMode,
    /// Phase positioning against the master.
    pub phase_shift: PhaseShift,
    /// Which events assert/deassert the two complementary outputs.
    pub convention: SwitchConvention,
    /// Compare-register reservations.
    pub compare_slots: CompareSlots,
    /// ADC trigger binding.
    pub adc: AdcWiring,
    /// External event carrying the comparator feedback in current mode.
    pub external_event: ExternalEvent,
    /// Lifecycle state.
    pub status: Status,
}

impl TimingUnit {
    fn with_defaults(id: TimerId) -> Self {
        TimingUnit {
            id,
            frequency: HertzU32::from_raw(0),
            period: 0,
            prescaler: 0,
            duty_cycle: 0,
            dead_time: DeadTime::default(),
            dead_time_cfg: DeadTimeCfg::default(),
            modulation: Modulation::default(),
            pwm_mode: PwmMode::default(),
            phase_shift: PhaseShift {
                value: 0,
                slot: default_shift_slot(id),
            },
            convention: SwitchConvention::default(),
            compare_slots: CompareSlots::default(),
            adc: default_adc_wiring(id),
            external_event: default_external_event(id),
            status: Status::default(),
        }
    }

    /// Whether the unit takes part in topology-wide operations such as a
    /// runtime frequency change.
    pub fn is_active(&self) -> bool {
        self.status != Status::Uninitialized
    }
}

/// Default reset wiring per unit.
///
/// The master compare registers 2..=4 position units C, D and E; master
/// compare 1 positions unit F. Unit B has no master slot left and borrows
/// compare 2 of its sibling A. Unit A is the phase reference and cannot be
/// shifted.
fn default_shift_slot(id: TimerId) -> Option<ShiftSlot> {
    let (reference, compare, trigger) = match id {
        TimerId::Master | TimerId::TimA => return None,
        TimerId::TimB => (TimerId::TimA, CompareReg::Cmp2, ResetTrigger::TIMER_A_CMP2),
        TimerId::TimC => (TimerId::Master, CompareReg::Cmp2, ResetTrigger::MASTER_CMP2),
        TimerId::TimD => (TimerId::Master, CompareReg::Cmp3, ResetTrigger::MASTER_CMP3),
        TimerId::TimE => (TimerId::Master, CompareReg::Cmp4, ResetTrigger::MASTER_CMP4),
        TimerId::TimF => (TimerId::Master, CompareReg::Cmp1, ResetTrigger::MASTER_CMP1),
    };
    Some(ShiftSlot {
        reference,
        compare,
        trigger,
    })
}

fn default_adc_wiring(id: TimerId) -> AdcWiring {
    let trigger = match id {
        TimerId::TimA => AdcTrigger::Trig3,
        TimerId::TimC => AdcTrigger::Trig1,
        _ => AdcTrigger::Trig2,
    };
    AdcWiring {
        trigger,
        source: CompareReg::Cmp3,
        rollover: RolloverEdge::Up,
    }
}

fn default_external_event(id: TimerId) -> ExternalEvent {
    match id {
        TimerId::TimA => ExternalEvent::Eev4,
        TimerId::TimC => ExternalEvent::Eev5,
        _ => ExternalEvent::Eev1,
    }
}

/// Comparator feeding an external event in current mode, if any.
pub(crate) fn comparator_for(event: ExternalEvent) -> Option<Comparator> {
    match event {
        ExternalEvent::Eev4 => Some(Comparator::Comp1),
        ExternalEvent::Eev5 => Some(Comparator::Comp3),
        _ => None,
    }
}

/// The single table of timing-unit descriptors: one master plus six slaves.
///
/// All engine components take the registry by reference; there is no global
/// state. Callers serialize access themselves (see the crate-level
/// concurrency notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Registry {
    master: TimingUnit,
    slaves: [TimingUnit; SLAVE_COUNT],
}

impl Registry {
    pub(crate) fn new() -> Self {
        Registry {
            master: TimingUnit::with_defaults(TimerId::Master),
            slaves: TimerId::SLAVES.map(TimingUnit::with_defaults),
        }
    }

    /// Descriptor of a unit.
    pub fn unit(&self, id: TimerId) -> &TimingUnit {
        match id.slave_index() {
            None => &self.master,
            Some(i) => &self.slaves[i],
        }
    }

    pub(crate) fn unit_mut(&mut self, id: TimerId) -> &mut TimingUnit {
        match id.slave_index() {
            None => &mut self.master,
            Some(i) => &mut self.slaves[i],
        }
    }

    /// The master descriptor.
    pub fn master(&self) -> &TimingUnit {
        &self.master
    }

    pub(crate) fn master_mut(&mut self) -> &mut TimingUnit {
        &mut self.master
    }

    /// Iterator over the slave descriptors.
    pub fn slaves(&self) -> impl Iterator<Item = &TimingUnit> {
        self.slaves.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_reservation_conflicts_are_typed() {
        let mut slots = CompareSlots::default();
        assert!(slots.reserve(CompareReg::Cmp2, Purpose::PhaseShift).is_ok());
        // same purpose again is fine, reconfiguration stays idempotent
        assert!(slots.reserve(CompareReg::Cmp2, Purpose::PhaseShift).is_ok());
        assert_eq!(
            slots.reserve(CompareReg::Cmp2, Purpose::CurrentMode),
            Err(Purpose::PhaseShift)
        );
        slots.release(CompareReg::Cmp2);
        assert!(slots.is_free(CompareReg::Cmp2));
    }

    #[test]
    fn every_shiftable_slave_has_a_distinct_slot() {
        let registry = Registry::new();
        // A is the reference leg and has no slot
        assert!(registry.unit(TimerId::TimA).phase_shift.slot.is_none());
        // B borrows its sibling, the rest use dedicated master compares
        let b = registry.unit(TimerId::TimB).phase_shift.slot.unwrap();
        assert_eq!(b.reference, TimerId::TimA);
        for id in [TimerId::TimC, TimerId::TimD, TimerId::TimE, TimerId::TimF] {
            let slot = registry.unit(id).phase_shift.slot.unwrap();
            assert_eq!(slot.reference, TimerId::Master);
        }
        // no two units share a reference compare register
        let mut seen = [false; 8];
        for id in TimerId::SLAVES {
            if let Some(slot) = registry.unit(id).phase_shift.slot {
                let key = match slot.reference {
                    TimerId::Master => slot.compare.index(),
                    _ => 4 + slot.compare.index(),
                };
                assert!(!seen[key]);
                seen[key] = true;
            }
        }
    }
}
