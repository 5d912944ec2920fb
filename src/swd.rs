//! SWD wire-level vocabulary and the raw transaction seam.
//!
//! A single SWD transaction is an 8-bit request header, a turnaround cycle,
//! a 3-bit acknowledgement and (on OK) a 32-bit data phase with parity. This
//! module defines the types that describe such a transaction and the [`Swd`]
//! trait that hardware drivers implement; everything above it (recovery,
//! memory access, the session lifecycle) is generic over [`Swd`].

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Number of times a transaction is repeated while the target answers WAIT.
pub const MAX_WAIT_RETRIES: usize = 25;

/// The available errors for SWD.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Parity error over the 32 data bits of a read.
    BadParity,
    /// Ack not yet ready.
    AckWait,
    /// A sticky fault.
    AckFault,
    /// Protocol error: the target did not drive the line (all-ones ack).
    AckProtocol,
    /// Unknown ack pattern.
    AckUnknown(u8),
}

/// The definition of SWD results.
pub type Result<T> = core::result::Result<T, Error>;

/// Available DP registers.
#[repr(u8)]
#[derive(PartialEq, Eq, Copy, Clone, Debug, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum DPRegister {
    DPIDR = 0,
    CTRLSTAT = 1,
    SELECT = 2,
    RDBUFF = 3,
}

/// Available AP registers (bank 0; IDR shares the DRW address in bank 0xF).
#[repr(u8)]
#[derive(PartialEq, Eq, Copy, Clone, Debug, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum APRegister {
    CSW = 0,
    TAR = 1,
    DRW = 3,
}

/// Encode if a transaction is for AP or DP.
#[repr(u8)]
#[derive(PartialEq, Eq, Copy, Clone, Debug, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum APnDP {
    /// For DP.
    DP = 0,
    /// For AP.
    AP = 1,
}

/// Encode if an SWD transaction is a read or a write.
#[repr(u8)]
#[derive(PartialEq, Eq, Copy, Clone, Debug, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RnW {
    /// Write flag.
    W = 0,
    /// Read flag.
    R = 1,
}

/// The different kinds of SWD ack.
#[repr(u8)]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Ack {
    Ok = 0b001,
    Wait = 0b010,
    Fault = 0b100,
    Protocol = 0b111,
}

impl Ack {
    /// Helper for transaction engines to decode a raw 3-bit ack.
    pub fn try_ok(ack: u8) -> Result<()> {
        match ack {
            v if v == (Ack::Ok as u8) => Ok(()),
            v if v == (Ack::Wait as u8) => Err(Error::AckWait),
            v if v == (Ack::Fault as u8) => Err(Error::AckFault),
            v if v == (Ack::Protocol as u8) => Err(Error::AckProtocol),
            _ => Err(Error::AckUnknown(ack)),
        }
    }
}

/// Definition of SWD communication.
///
/// `read_inner`/`write_inner` run exactly one transaction; the provided
/// `read`/`write` wrappers add the WAIT-retry loop (always at least one
/// attempt). FAULT, parity and protocol errors are never retried here;
/// they surface to the caller for explicit recovery.
pub trait Swd {
    /// Here the actual hardware implementation for an SWD read is made.
    ///
    /// `a` is the 2-bit register address field A\[3:2\].
    fn read_inner(&mut self, apndp: APnDP, a: u8) -> Result<u32>;

    /// Here the actual hardware implementation for an SWD write is made.
    fn write_inner(&mut self, apndp: APnDP, a: u8, data: u32) -> Result<()>;

    /// Drive a raw bit sequence on the data line, LSB-first per byte.
    ///
    /// Used for line resets and the JTAG/SWD port-select sequences.
    fn write_sequence(&mut self, num_bits: usize, data: &[u8]);

    /// Drive the dedicated nRESET line.
    fn set_nreset(&mut self, high: bool);

    /// Stop driving the data line, leaving the bus released to the target.
    fn release(&mut self);

    /// Helper method over `read_inner` to retry during `AckWait`.
    fn read(&mut self, wait_retries: usize, apndp: APnDP, a: u8) -> Result<u32> {
        let mut retries = wait_retries;
        loop {
            match self.read_inner(apndp, a) {
                Err(Error::AckWait) if retries > 0 => retries -= 1,
                x => return x,
            }
        }
    }

    /// Helper method over `write_inner` to retry during `AckWait`.
    fn write(&mut self, wait_retries: usize, apndp: APnDP, a: u8, data: u32) -> Result<()> {
        let mut retries = wait_retries;
        loop {
            match self.write_inner(apndp, a, data) {
                Err(Error::AckWait) if retries > 0 => retries -= 1,
                x => return x,
            }
        }
    }

    /// Shorthand helper to read DP registers.
    fn read_dp(&mut self, wait_retries: usize, reg: DPRegister) -> Result<u32> {
        self.read(wait_retries, APnDP::DP, reg as u8)
    }

    /// Shorthand helper to write DP registers.
    fn write_dp(&mut self, wait_retries: usize, reg: DPRegister, data: u32) -> Result<()> {
        self.write(wait_retries, APnDP::DP, reg as u8, data)
    }

    /// Shorthand helper to read AP registers.
    fn read_ap(&mut self, wait_retries: usize, reg: APRegister) -> Result<u32> {
        self.read(wait_retries, APnDP::AP, reg as u8)
    }

    /// Shorthand helper to write AP registers.
    fn write_ap(&mut self, wait_retries: usize, reg: APRegister, data: u32) -> Result<()> {
        self.write(wait_retries, APnDP::AP, reg as u8, data)
    }
}

/// Helper used by transaction engines to make the request byte.
pub fn make_request(apndp: APnDP, rnw: RnW, a: u8) -> u8 {
    let req = 1 | ((apndp as u8) << 1) | ((rnw as u8) << 2) | ((a & 3) << 3) | (1 << 7);
    let parity = (req.count_ones() & 1) as u8;
    req | (parity << 5)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_codes_match_documented_values() {
        // The 11 legal request bytes of the register model.
        let table: &[(APnDP, RnW, u8, u8)] = &[
            (APnDP::DP, RnW::R, DPRegister::DPIDR as u8, 0xA5),
            (APnDP::DP, RnW::W, 0, 0x81), // ABORT
            (APnDP::DP, RnW::R, DPRegister::CTRLSTAT as u8, 0x8D),
            (APnDP::DP, RnW::W, DPRegister::CTRLSTAT as u8, 0xA9),
            (APnDP::DP, RnW::W, DPRegister::SELECT as u8, 0xB1),
            (APnDP::DP, RnW::R, DPRegister::RDBUFF as u8, 0xBD),
            (APnDP::AP, RnW::R, APRegister::CSW as u8, 0x87),
            (APnDP::AP, RnW::W, APRegister::CSW as u8, 0xA3),
            (APnDP::AP, RnW::W, APRegister::TAR as u8, 0x8B),
            (APnDP::AP, RnW::R, APRegister::DRW as u8, 0x9F), // also IDR in bank 0xF
            (APnDP::AP, RnW::W, APRegister::DRW as u8, 0xBB),
        ];
        for &(apndp, rnw, a, expected) in table {
            assert_eq!(make_request(apndp, rnw, a), expected);
        }
    }

    #[test]
    fn request_parity_is_even_over_payload_bits() {
        for a in 0..4 {
            for &(apndp, rnw) in &[
                (APnDP::DP, RnW::R),
                (APnDP::DP, RnW::W),
                (APnDP::AP, RnW::R),
                (APnDP::AP, RnW::W),
            ] {
                let req = make_request(apndp, rnw, a);
                // Bits 1..=4 plus the parity bit must have even population.
                let payload = (req >> 1) & 0xF;
                let parity = (req >> 5) & 1;
                assert_eq!(payload.count_ones() % 2, parity as u32);
                // Start and park bits always set, stop bit always clear.
                assert_eq!(req & 1, 1);
                assert_eq!(req & (1 << 6), 0);
                assert_eq!(req & (1 << 7), 1 << 7);
            }
        }
    }

    #[test]
    fn wait_is_retried_until_ok() {
        use crate::mock_device::MockRawSwd;
        use mockall::Sequence;

        let mut swd = MockRawSwd::new();
        let mut seq = Sequence::new();
        swd.expect_read_inner()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(Error::AckWait));
        swd.expect_read_inner()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(7));
        assert_eq!(swd.read(5, APnDP::DP, 0), Ok(7));
    }

    #[test]
    fn wait_retry_budget_is_bounded() {
        use crate::mock_device::MockRawSwd;

        // 5 retries = at most 6 attempts, then the WAIT surfaces.
        let mut swd = MockRawSwd::new();
        swd.expect_read_inner()
            .times(6)
            .returning(|_, _| Err(Error::AckWait));
        assert_eq!(swd.read(5, APnDP::DP, 0), Err(Error::AckWait));
    }

    #[test]
    fn zero_retries_still_makes_one_attempt() {
        use crate::mock_device::MockRawSwd;

        let mut swd = MockRawSwd::new();
        swd.expect_write_inner()
            .times(1)
            .returning(|_, _, _| Err(Error::AckWait));
        assert_eq!(swd.write(0, APnDP::DP, 1, 0), Err(Error::AckWait));
    }

    #[test]
    fn fault_and_parity_errors_are_not_retried() {
        use crate::mock_device::MockRawSwd;

        let mut swd = MockRawSwd::new();
        swd.expect_read_inner()
            .times(1)
            .returning(|_, _| Err(Error::AckFault));
        assert_eq!(swd.read(5, APnDP::AP, 3), Err(Error::AckFault));

        let mut swd = MockRawSwd::new();
        swd.expect_read_inner()
            .times(1)
            .returning(|_, _| Err(Error::BadParity));
        assert_eq!(swd.read(5, APnDP::AP, 3), Err(Error::BadParity));
    }

    #[test]
    fn ack_decode() {
        assert!(Ack::try_ok(0b001).is_ok());
        assert_eq!(Ack::try_ok(0b010), Err(Error::AckWait));
        assert_eq!(Ack::try_ok(0b100), Err(Error::AckFault));
        assert_eq!(Ack::try_ok(0b111), Err(Error::AckProtocol));
        assert_eq!(Ack::try_ok(0b101), Err(Error::AckUnknown(0b101)));
    }
}
