//! # Periodic Events and Inter-Board Synchronization
//!
//! ## Overview
//! The real-time control task is paced by a repetition-divided interrupt:
//! the repetition counter fires once every configured number of switching
//! periods and invokes a single user-supplied callback. The callback runs
//! in interrupt context and is expected to do no more than hand off to the
//! control task.
//!
//! Converters on separate boards can lock their control periods together.
//! A master board emits one pulse per repetition event on a dedicated pin;
//! a slave board routes that pulse into its synchronization input and
//! restarts its master timer in phase with it. No payload is exchanged,
//! this is a pure timing edge.

use core::cell::Cell;

use critical_section::Mutex;

use crate::{
    block::{HrtimBlock, SyncInSource, SyncOutMode},
    unit::TimerId,
    HrPwm,
};

/// Callback invoked once per repetition event, in interrupt context.
pub type PeriodicCallback = fn();

static PERIODIC_CALLBACK: Mutex<Cell<Option<PeriodicCallback>>> = Mutex::new(Cell::new(None));

impl<B: HrtimBlock> HrPwm<B> {
    /// Register the periodic callback and the repetition divisor.
    ///
    /// The callback fires once every `repetition` switching periods of the
    /// given unit (a divisor of zero is treated as one).
    pub fn configure_periodic_event(
        &mut self,
        unit: TimerId,
        repetition: u8,
        callback: PeriodicCallback,
    ) {
        critical_section::with(|cs| PERIODIC_CALLBACK.borrow(cs).set(Some(callback)));
        // the hardware counts repetition + 1 periods per event
        self.block.set_repetition(unit, repetition.max(1) - 1);
    }

    /// Start delivering periodic events.
    ///
    /// A board synchronized to an external pulse is paced by the
    /// synchronization interrupt instead of its own repetition counter.
    pub fn enable_periodic_event(&mut self, unit: TimerId) {
        match self.block.sync_in() {
            SyncInSource::None => self.block.enable_repetition_interrupt(unit),
            SyncInSource::ExternalEvent => self.block.enable_sync_interrupt(),
        }
    }

    /// Stop delivering periodic events.
    pub fn disable_periodic_event(&mut self, unit: TimerId) {
        self.block.disable_repetition_interrupt(unit);
    }

    /// Change the repetition divisor of an already configured event.
    pub fn set_repetition(&mut self, unit: TimerId, repetition: u8) {
        self.block.set_repetition(unit, repetition.max(1) - 1);
    }

    /// The configured repetition divisor.
    pub fn repetition(&self, unit: TimerId) -> u8 {
        self.block.repetition(unit) + 1
    }

    /// Interrupt service body for the periodic event.
    ///
    /// Call this from the timer interrupt handler. It acknowledges the
    /// pending event, emits the inter-board pulse when this board is the
    /// sync master, and invokes the registered callback.
    pub fn handle_periodic_event(&mut self) {
        match self.block.sync_in() {
            SyncInSource::None => self.block.acknowledge_repetition(TimerId::Master),
            SyncInSource::ExternalEvent => self.block.acknowledge_sync(),
        }

        if self.block.sync_out() == SyncOutMode::PositivePulse {
            // master communication mode: one pulse per control period keeps
            // the slave board's control task in phase with ours
            self.block.pulse_sync_out_pin();
        }

        if let Some(callback) = critical_section::with(|cs| PERIODIC_CALLBACK.borrow(cs).get()) {
            callback();
        }
    }

    /// Make this board the synchronization master.
    ///
    /// The reference leg is briefly stopped while the pulse output is
    /// wired to its period start.
    pub fn init_sync_master(&mut self) {
        self.block.disable_counter(TimerId::TimA);
        self.block.set_sync_out(SyncOutMode::PositivePulse);
        self.block.enable_counter(TimerId::TimA);
        info!("inter-board sync master enabled");
    }

    /// Make this board a synchronization slave.
    ///
    /// The master timer restarts in phase with every received pulse.
    pub fn init_sync_slave(&mut self) {
        self.block.disable_counter(TimerId::Master);
        self.block.set_sync_in(SyncInSource::ExternalEvent);
        self.block.enable_reset_on_sync(TimerId::Master);
        self.block.enable_counter(TimerId::Master);
        info!("inter-board sync slave enabled");
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use fugit::RateExtU32;

    use super::*;
    use crate::{clock::ClockConfig, sim::SimBlock};

    static FIRED: AtomicUsize = AtomicUsize::new(0);

    fn tick() {
        FIRED.fetch_add(1, Ordering::Relaxed);
    }

    fn pwm() -> HrPwm<SimBlock> {
        let clock = ClockConfig::new(170.MHz(), 100.kHz()).unwrap();
        HrPwm::new(SimBlock::new(), clock)
    }

    #[test]
    fn repetition_divisor_round_trips() {
        let mut pwm = pwm();
        pwm.configure_periodic_event(TimerId::Master, 10, tick);
        assert_eq!(pwm.repetition(TimerId::Master), 10);
        pwm.set_repetition(TimerId::Master, 4);
        assert_eq!(pwm.repetition(TimerId::Master), 4);
        // zero is not a meaningful divisor
        pwm.set_repetition(TimerId::Master, 0);
        assert_eq!(pwm.repetition(TimerId::Master), 1);
    }

    #[test]
    fn isr_body_acknowledges_and_calls_back() {
        let mut pwm = pwm();
        pwm.configure_periodic_event(TimerId::Master, 1, tick);
        pwm.enable_periodic_event(TimerId::Master);

        let before = FIRED.load(Ordering::Relaxed);
        pwm.handle_periodic_event();
        // other tests share the callback cell, so only a lower bound holds
        assert!(FIRED.load(Ordering::Relaxed) > before);
        assert_eq!(pwm.block().repetition_acks(), 1);
        // free-running board emits no pulse
        assert_eq!(pwm.block().sync_pulses(), 0);
    }

    #[test]
    fn sync_master_pulses_once_per_event() {
        let mut pwm = pwm();
        pwm.configure_periodic_event(TimerId::Master, 1, tick);
        pwm.init_sync_master();
        pwm.handle_periodic_event();
        assert_eq!(pwm.block().sync_pulses(), 1);
    }

    #[test]
    fn sync_slave_restarts_on_the_received_pulse() {
        let mut pwm = pwm();
        pwm.init_sync_slave();
        assert_eq!(pwm.block().sync_in(), SyncInSource::ExternalEvent);
        assert!(pwm.block().reset_on_sync(TimerId::Master));

        // paced by the sync interrupt, not the repetition counter
        pwm.configure_periodic_event(TimerId::Master, 1, tick);
        pwm.handle_periodic_event();
        assert_eq!(pwm.block().sync_acks(), 1);
        assert_eq!(pwm.block().repetition_acks(), 0);
    }
}
