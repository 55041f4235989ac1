//! Programmable interval timer (PIT channel 0).
//!
//! The PIT drives the preemption tick: once programmed it raises IRQ0 at a
//! fixed rate and every firing is one scheduling opportunity.

use spin::Mutex;

use crate::error::{HardwareError, KernelResult};
use crate::hal::Hardware;
use crate::kerror;

/// The PIT's input oscillator frequency in Hz.
pub const PIT_BASE_HZ: u32 = 1_193_180;

/// Tick rate the kernel runs at (one preemption every 10 ms).
pub const TICK_HZ: u32 = 100;

/// Mode/command register.
const PIT_COMMAND: u16 = 0x43;
/// Channel 0 data port.
const PIT_CHANNEL0: u16 = 0x40;
/// Channel 0, lobyte/hibyte access, square wave, binary counting.
const CMD_CH0_SQUARE: u8 = 0x36;

static TICK_COUNTER: Mutex<u64> = Mutex::new(0);

/// Program channel 0 to fire at approximately `frequency_hz`.
///
/// The resulting rate is `PIT_BASE_HZ / (PIT_BASE_HZ / frequency_hz)`, i.e.
/// exact only when the divisor divides evenly. The divisor must be loaded
/// low byte first; the chip latches the reload value on the high byte.
///
/// Frequencies of zero (division by zero) or above the input oscillator
/// (divisor zero, which the chip reads as 65536) are rejected before any
/// port is written.
pub fn configure<B: Hardware>(bus: &mut B, frequency_hz: u32) -> KernelResult<()> {
    if frequency_hz == 0 || frequency_hz > PIT_BASE_HZ {
        return kerror!(HardwareError::InvalidFrequency);
    }

    let divisor = PIT_BASE_HZ / frequency_hz;

    bus.write_port8(PIT_COMMAND, CMD_CH0_SQUARE);
    bus.write_port8(PIT_CHANNEL0, (divisor & 0xFF) as u8);
    bus.write_port8(PIT_CHANNEL0, ((divisor >> 8) & 0xFF) as u8);

    Ok(())
}

/// Count one tick. Called from the timer interrupt handler; returns the new
/// total.
pub fn record_tick() -> u64 {
    let mut counter = TICK_COUNTER.lock();
    *counter = counter.wrapping_add(1);
    *counter
}

/// Ticks observed since boot.
pub fn ticks() -> u64 {
    *TICK_COUNTER.lock()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::recording::Recorder;

    #[test]
    fn configure_100hz_writes_mode_then_divisor_low_then_high() {
        let mut bus = Recorder::new();
        configure(&mut bus, 100).unwrap();

        // 1193180 / 100 = 11931 = 0x2E9B
        assert_eq!(
            bus.port_writes(),
            vec![
                (PIT_COMMAND, 0x36),
                (PIT_CHANNEL0, 0x9B),
                (PIT_CHANNEL0, 0x2E),
            ]
        );
    }

    #[test]
    fn divisor_uses_integer_division() {
        let mut bus = Recorder::new();
        configure(&mut bus, 60).unwrap();

        // 1193180 / 60 = 19886 = 0x4DAE
        assert_eq!(
            bus.port_writes(),
            vec![
                (PIT_COMMAND, 0x36),
                (PIT_CHANNEL0, 0xAE),
                (PIT_CHANNEL0, 0x4D),
            ]
        );
    }

    #[test]
    fn zero_frequency_is_rejected_before_any_port_write() {
        let mut bus = Recorder::new();
        assert!(configure(&mut bus, 0).is_err());
        assert!(bus.events.is_empty());
    }

    #[test]
    fn frequencies_above_the_oscillator_are_rejected() {
        let mut bus = Recorder::new();
        assert!(configure(&mut bus, PIT_BASE_HZ + 1).is_err());
        assert!(bus.events.is_empty());
    }

    #[test]
    fn tick_counter_is_monotonic() {
        let before = ticks();
        let after = record_tick();
        assert!(after > before);
    }
}
