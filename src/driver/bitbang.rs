//! Bitbanging (GPIO-driven) SWD implementation.
//!
//! Drives SWCLK and the bidirectional SWDIO line directly, one clock edge at
//! a time. There is no SWD peripheral involved; the transaction engine below
//! is the wire protocol, bit for bit.

use core::num::NonZeroU32;

use crate::swd::{self, APnDP, RnW};

pub use embedded_hal::delay::DelayNs;

/// Clock cycle with data output
macro_rules! clock_out {
    ($self:expr, $bit:expr) => {
        $self.swdio.set_high($bit);
        $self.swclk.set_high(false);
        $self.wait();
        $self.swclk.set_high(true);
        $self.wait();
    };
}

/// Clock cycle with data input
macro_rules! clock_in {
    ($self:expr, $var:ident, $bit:expr) => {
        $self.swclk.set_high(false);
        $self.wait();
        $var |= ($self.swdio.is_high() as u32) << $bit;
        $self.swclk.set_high(true);
        $self.wait();
    };
}

/// Clock cycle without data capture (for turnaround)
macro_rules! clock_only {
    ($self:expr) => {
        $self.swclk.set_high(false);
        $self.wait();
        $self.swclk.set_high(true);
        $self.wait();
    };
}

/// A trait for a pin that can be used as an input or output.
pub trait InputOutputPin {
    /// Configure the pin as a push-pull output.
    fn set_as_output(&mut self);
    /// Drive the output level.
    fn set_high(&mut self, high: bool);

    /// Configure the pin as a floating input.
    fn set_as_input(&mut self);
    /// Sample the pin.
    fn is_high(&mut self) -> bool;
}

/// A trait for a delay implementation that can be used to delay for a number
/// of CPU cycles.
///
/// A test double may make `delay_cycles` a no-op, which turns every shift
/// into a pure pin-state exercise.
pub trait DelayCycles: DelayNs {
    /// The CPU clock the cycle delays are relative to, in Hz.
    fn cpu_clock(&self) -> u32;
    /// Spin for `cycles` CPU cycles.
    fn delay_cycles(&mut self, cycles: u32);
}

/// GPIO bit-bang implementation of [`swd::Swd`].
///
/// Owns the three target-facing lines. SWDIO direction is managed here and
/// only here: every shift is preceded by the matching direction switch, and
/// each transaction ends with SWDIO released to input so the bus can float
/// between transactions.
pub struct BitbangAdapter<IO, D>
where
    IO: InputOutputPin,
    D: DelayCycles,
{
    nreset: IO,
    swdio: IO,
    swclk: IO,
    delay: D,
    bit_cycles: u32,
}

impl<IO, D> BitbangAdapter<IO, D>
where
    IO: InputOutputPin,
    D: DelayCycles,
{
    /// Create the adapter and put the pins in their SWD idle state:
    /// SWCLK driven low, SWDIO released high-ish (input), nRESET driven low.
    pub fn new(nreset: IO, swdio: IO, swclk: IO, delay: D) -> Self {
        let mut this = Self {
            nreset,
            swdio,
            swclk,
            delay,
            bit_cycles: 1,
        };

        this.swclk.set_high(false);
        this.swclk.set_as_output();

        this.swdio.set_high(true);
        this.swdio.set_as_input();

        this.nreset.set_high(false);
        this.nreset.set_as_output();

        this
    }

    /// Set the maximum SWCLK frequency, return `true` if it is valid.
    pub fn set_clock(&mut self, max_frequency: u32) -> bool {
        debug!("set frequency({})", max_frequency);
        match NonZeroU32::new(max_frequency) {
            Some(frequency) => {
                self.bit_cycles = (self.delay.cpu_clock() / 2)
                    .div_ceil(frequency.get())
                    .max(1);
                true
            }
            None => false,
        }
    }

    #[inline(always)]
    fn wait(&mut self) {
        self.delay.delay_cycles(self.bit_cycles);
    }

    #[inline(always)]
    fn shift_out(&mut self, val: u32, num_bits: usize) {
        self.swdio.set_as_output();
        for i in 0..num_bits {
            clock_out!(self, val & (1 << i) != 0);
        }
    }

    #[inline(always)]
    fn shift_in(&mut self, num_bits: usize) -> u32 {
        self.swdio.set_as_input();
        let mut val = 0;
        for i in 0..num_bits {
            clock_in!(self, val, i);
        }
        val
    }

    /// Output the 8-bit request header for `a` (the A\[3:2\] field).
    #[inline(always)]
    fn req(&mut self, port: APnDP, dir: RnW, a: u8) {
        let val = swd::make_request(port, dir, a);
        self.shift_out(val as u32, 8);
    }

    /// Read the turnaround cycle plus the 3 ack bits.
    #[inline(always)]
    fn ack(&mut self) -> u8 {
        self.swdio.set_as_input();
        clock_only!(self);

        let mut ack = 0;
        clock_in!(self, ack, 0);
        clock_in!(self, ack, 1);
        clock_in!(self, ack, 2);
        ack as u8
    }

    /// Consume a full data+parity+turnaround phase after a malformed ack.
    ///
    /// A target that did not drive a recognizable ack may be mid data phase;
    /// clocking through it keeps the line state machine synchronized.
    fn back_off(&mut self) {
        self.shift_in(32);
        clock_only!(self);
        clock_only!(self);
    }

    fn read_transaction(&mut self, port: APnDP, a: u8) -> swd::Result<u32> {
        self.req(port, RnW::R, a);

        let ack = self.ack();
        match swd::Ack::try_ok(ack) {
            Ok(()) => {}
            Err(e @ (swd::Error::AckWait | swd::Error::AckFault)) => {
                clock_only!(self); // turnaround cycle
                self.line_release();
                return Err(e);
            }
            Err(e) => {
                self.back_off();
                self.line_release();
                return Err(e);
            }
        }

        let mut data = 0;
        for i in 0..32 {
            clock_in!(self, data, i);
        }

        let mut parity = 0;
        clock_in!(self, parity, 0);
        clock_only!(self); // turnaround cycle
        self.line_release();

        if parity != data.count_ones() % 2 {
            warn!("read parity error, data {:x} parity {}", data, parity);
            return Err(swd::Error::BadParity);
        }

        Ok(data)
    }

    fn write_transaction(&mut self, port: APnDP, a: u8, data: u32) -> swd::Result<()> {
        self.req(port, RnW::W, a);

        let ack = self.ack();
        match swd::Ack::try_ok(ack) {
            Ok(()) => {}
            Err(e @ (swd::Error::AckWait | swd::Error::AckFault)) => {
                clock_only!(self); // turnaround cycle
                self.line_release();
                return Err(e);
            }
            Err(e) => {
                self.back_off();
                self.line_release();
                return Err(e);
            }
        }

        clock_only!(self); // turnaround cycle
        self.swdio.set_as_output();
        for i in 0..32 {
            clock_out!(self, data & (1 << i) != 0);
        }
        clock_out!(self, data.count_ones() % 2 != 0); // parity

        self.line_release();
        Ok(())
    }

    /// Release SWDIO to the target between transactions.
    #[inline(always)]
    fn line_release(&mut self) {
        self.swdio.set_high(true);
        self.swdio.set_as_input();
    }
}

impl<IO, D> swd::Swd for BitbangAdapter<IO, D>
where
    IO: InputOutputPin,
    D: DelayCycles,
{
    fn read_inner(&mut self, apndp: APnDP, a: u8) -> swd::Result<u32> {
        trace!("read_inner({:?}, {})", apndp, a);
        self.read_transaction(apndp, a)
    }

    fn write_inner(&mut self, apndp: APnDP, a: u8, data: u32) -> swd::Result<()> {
        trace!("write_inner({:?}, {}, {:x})", apndp, a, data);
        self.write_transaction(apndp, a, data)
    }

    fn write_sequence(&mut self, mut num_bits: usize, data: &[u8]) {
        trace!("write_sequence({})", num_bits);
        self.swdio.set_as_output();
        for b in data.iter().copied() {
            if num_bits == 0 {
                break;
            }
            let bits = num_bits.min(8);
            self.shift_out(b as u32, bits);
            num_bits -= bits;
        }
    }

    fn set_nreset(&mut self, high: bool) {
        self.nreset.set_high(high);
    }

    fn release(&mut self) {
        self.line_release();
    }
}
