//! # Peak-Current-Mode Wiring
//!
//! ## Overview
//! In current mode the pulse is terminated by an on-chip comparator tripping
//! against a ramping DAC reference instead of a software compare value. The
//! engine claims three compare registers of the unit:
//!
//! - compare 1 caps the duty cycle at 90 % of the period in case the
//!   comparator never trips,
//! - compare 2 paces the reference ramp at a hundred steps per period,
//! - compare 4 delays the pulse start by a short guard so a pending
//!   comparator trip is cleared before the output can be set again.
//!
//! The comparator output arrives on the unit's external event line and is
//! combined with the compare-1 ceiling in the output reset sources. A
//! secondary DAC trigger (reset on counter reset, step on compare 2)
//! generates the reference ramp. After this wiring, software duty-cycle
//! writes on the unit are rejected.

use crate::{
    block::{CompareReg, HrtimBlock},
    unit::{comparator_for, Purpose, TimerId},
    HrPwm,
};

/// Pulse-start guard in counter ticks, about 200 ns at the hardware's
/// 184 ps resolution. The comparator trip event must be cleared before one
/// of the set sources can drive the output high again.
pub const MIN_ON_TIME_TICKS: u16 = 1088;

/// Ramp steps per switching period.
const RAMP_STEPS: u32 = 100;

pub(crate) fn wire<B: HrtimBlock>(pwm: &mut HrPwm<B>, unit: TimerId) {
    let descriptor = *pwm.registry.unit(unit);

    if let Some(comparator) = comparator_for(descriptor.external_event) {
        pwm.block
            .bind_comparator_event(descriptor.external_event, comparator);
    }

    // reference ramp: reset with the counter, step on compare 2
    pwm.block.enable_dual_dac_trigger(unit);

    let period = u32::from(descriptor.period);
    let ceiling = (period * 9 / 10) as u16;
    pwm.block.set_compare(unit, CompareReg::Cmp1, ceiling);

    let ramp_step = (period / RAMP_STEPS) as u16;
    pwm.block.set_compare(unit, CompareReg::Cmp2, ramp_step);

    pwm.block
        .set_compare(unit, CompareReg::Cmp4, MIN_ON_TIME_TICKS);

    let slots = &mut pwm.registry.unit_mut(unit).compare_slots;
    let _ = slots.reserve(CompareReg::Cmp1, Purpose::CurrentMode);
    let _ = slots.reserve(CompareReg::Cmp2, Purpose::CurrentMode);
    let _ = slots.reserve(CompareReg::Cmp4, Purpose::CurrentMode);

    debug!("current-mode wiring on, duty ceiling {}", ceiling);
}
