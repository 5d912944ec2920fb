//! Debug-session lifecycle and Cortex-M core-register access.
//!
//! [`DebugInterface`] owns the connect/power-up/enable and
//! disable/disconnect sequences and the connected-core identifier, and
//! reaches the CPU registers through the memory-mapped debug register
//! window (DCRSR/DHCSR/DCRDR) built on the memory access layer.

use embedded_hal::delay::DelayNs;

use crate::interface::{AccessError, SwdInterface};
use crate::registers::{
    Abort, CtrlStat, C_DEBUGEN, CSW_CANONICAL, CSW_SIZE32, DBGKEY, DCRDR, DCRSR, DHCSR, REGWNR,
    SELECT_AP_ID_BANK, SELECT_BANK0, S_REGRDY, TRNNORMAL,
};
use crate::swd::{APRegister, DPRegister, Swd};

/// Power-up acknowledge poll attempts, 1 ms apart.
const POWER_UP_POLLS: u32 = 10;
/// Core-register ready poll attempts (each one a full DHCSR word read).
const REG_READY_POLLS: u32 = 20;

/// Session-level failures.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A checked transaction failed.
    Access(AccessError),
    /// The target did not answer the IDCODE read that ends the connect
    /// sequence.
    ConnectFailed,
    /// The power-up acknowledge bits never appeared in CTRL/STAT.
    PowerUpTimeout,
    /// The access port identification register read back as zero.
    NoAccessPort,
    /// The core never flagged the register transfer complete.
    RegisterTimeout,
}

impl From<AccessError> for Error {
    fn from(e: AccessError) -> Self {
        Error::Access(e)
    }
}

/// How to drive the dedicated nRESET line.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NresetDrive {
    /// Drive the line high.
    High,
    /// Drive the line low.
    Low,
    /// Pulse high for a millisecond, then low.
    Pulse,
}

/// Debug session over a raw [`Swd`] driver.
///
/// At most one session is open at a time; the connected-core identifier is
/// valid only while open and reads zero otherwise.
pub struct DebugInterface<SWD, WAIT> {
    iface: SwdInterface<SWD>,
    wait: WAIT,
    core_id: u32,
}

impl<SWD: Swd, WAIT: DelayNs> DebugInterface<SWD, WAIT> {
    /// Create a closed session around a raw driver and a delay provider.
    pub fn new(swd: SWD, wait: WAIT) -> Self {
        DebugInterface {
            iface: SwdInterface::new(swd),
            wait,
            core_id: 0,
        }
    }

    /// The identifier read from the connected core, zero while closed.
    pub fn core_id(&self) -> u32 {
        self.core_id
    }

    /// Access the checked-transaction and memory layer.
    pub fn interface_mut(&mut self) -> &mut SwdInterface<SWD> {
        &mut self.iface
    }

    /// Open a debug session.
    ///
    /// Connect sequence and IDCODE, sticky-error clear, DP bank select,
    /// system+debug power-up with acknowledge poll, transfer-mode setup,
    /// AP identification probe, canonical CSW, debug enable. Any failing
    /// step aborts the open.
    pub fn open(&mut self) -> Result<(), Error> {
        let idcode = self.iface.connect().map_err(|_| Error::ConnectFailed)?;
        self.core_id = idcode;
        info!("connected, IDCODE {:x}", idcode);

        self.iface.write_abort(Abort::STICKY_CLEARS)?;
        self.iface.write_dp(DPRegister::SELECT, SELECT_BANK0)?;

        self.iface
            .write_dp(DPRegister::CTRLSTAT, CtrlStat::PWRUP_REQ.bits())?;
        let mut tries = POWER_UP_POLLS;
        loop {
            let status = self.iface.read_dp(DPRegister::CTRLSTAT)?;
            if status & CtrlStat::PWRUP_MASK == CtrlStat::PWRUP_MASK {
                break;
            }
            if tries == 0 {
                warn!("power up failed, CTRL/STAT {:x}", status);
                return Err(Error::PowerUpTimeout);
            }
            tries -= 1;
            self.wait.delay_ms(1);
        }

        self.iface.write_dp(
            DPRegister::CTRLSTAT,
            CtrlStat::PWRUP_REQ.bits() | TRNNORMAL | CtrlStat::MASKLANE.bits(),
        )?;

        // The IDR lives in the identification bank at the DRW address; AP
        // reads are posted, so prime once and collect through RDBUFF.
        self.iface.write_dp(DPRegister::SELECT, SELECT_AP_ID_BANK)?;
        self.iface.read_ap(APRegister::DRW)?;
        let idr = self.iface.read_dp(DPRegister::RDBUFF)?;
        if idr == 0 {
            return Err(Error::NoAccessPort);
        }
        debug!("AP IDR {:x}", idr);

        self.iface.write_dp(DPRegister::SELECT, SELECT_BANK0)?;
        self.iface
            .write_ap(APRegister::CSW, CSW_CANONICAL | CSW_SIZE32)?;

        self.iface.write_word(DHCSR, DBGKEY | C_DEBUGEN)?;
        Ok(())
    }

    /// Close the session, best effort: release debug mode, power the port
    /// down and run the disconnect sequence. Never blocks shutdown.
    pub fn close(&mut self) {
        self.core_id = 0;
        let _ = self.iface.write_word(DHCSR, DBGKEY);
        let _ = self
            .iface
            .swd_mut()
            .write_dp(0, DPRegister::CTRLSTAT, 0);
        self.iface.disconnect();
    }

    /// Read a core register through the debug register window.
    pub fn read_core_reg(&mut self, index: u8) -> Result<u32, Error> {
        self.iface.write_word(DCRSR, index as u32)?;
        for _ in 0..REG_READY_POLLS {
            if self.iface.read_word(DHCSR)? & S_REGRDY != 0 {
                return Ok(self.iface.read_word(DCRDR)?);
            }
        }
        Err(Error::RegisterTimeout)
    }

    /// Write a core register through the debug register window.
    pub fn write_core_reg(&mut self, index: u8, value: u32) -> Result<(), Error> {
        self.iface.write_word(DCRDR, value)?;
        self.iface.write_word(DCRSR, index as u32 | REGWNR)?;
        for _ in 0..REG_READY_POLLS {
            if self.iface.read_word(DHCSR)? & S_REGRDY != 0 {
                return Ok(());
            }
        }
        Err(Error::RegisterTimeout)
    }

    /// Drive the nRESET line.
    pub fn drive_nreset(&mut self, drive: NresetDrive) {
        match drive {
            NresetDrive::High => self.iface.swd_mut().set_nreset(true),
            NresetDrive::Low => self.iface.swd_mut().set_nreset(false),
            NresetDrive::Pulse => {
                self.iface.swd_mut().set_nreset(true);
                self.wait.delay_ms(1);
                self.iface.swd_mut().set_nreset(false);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mock_device::{NoDelay, SimTarget};

    fn debug() -> DebugInterface<SimTarget, NoDelay> {
        DebugInterface::new(SimTarget::new(), NoDelay)
    }

    #[test]
    fn open_runs_the_full_bring_up() {
        let mut dbg = debug();
        dbg.open().unwrap();

        assert_eq!(dbg.core_id(), SimTarget::IDCODE);
        let sim = dbg.interface_mut().swd_mut();
        assert_eq!(sim.connects, 1);
        // Sticky clears, then power-up request, then debug enable.
        assert_eq!(sim.abort_writes.first(), Some(&0x1E));
        assert_eq!(sim.ctrl_stat & CtrlStat::PWRUP_REQ.bits(), CtrlStat::PWRUP_REQ.bits());
        assert_eq!(sim.select_writes.clone(), vec![0, 0xF0, 0]);
        assert_eq!(sim.csw, CSW_CANONICAL | CSW_SIZE32);
        assert_eq!(sim.peek_word(DHCSR), DBGKEY | C_DEBUGEN);
    }

    #[test]
    fn open_fails_when_power_up_never_acks() {
        let mut dbg = debug();
        dbg.interface_mut().swd_mut().refuse_power_up();
        assert_eq!(dbg.open(), Err(Error::PowerUpTimeout));
    }

    #[test]
    fn open_fails_without_an_access_port() {
        let mut dbg = debug();
        dbg.interface_mut().swd_mut().idr = 0;
        assert_eq!(dbg.open(), Err(Error::NoAccessPort));
    }

    #[test]
    fn close_releases_the_target() {
        let mut dbg = debug();
        dbg.open().unwrap();
        dbg.close();

        assert_eq!(dbg.core_id(), 0);
        let sim = dbg.interface_mut().swd_mut();
        // Debug mode released without C_DEBUGEN, port powered down.
        assert_eq!(sim.peek_word(DHCSR), DBGKEY);
        assert_eq!(sim.ctrl_stat, 0);
        assert_eq!(sim.disconnects, 1);
    }

    #[test]
    fn core_register_round_trip() {
        let mut dbg = debug();
        dbg.open().unwrap();
        dbg.write_core_reg(2, 0x1234_5678).unwrap();
        assert_eq!(dbg.read_core_reg(2).unwrap(), 0x1234_5678);
    }

    #[test]
    fn core_register_read_polls_until_ready() {
        let mut dbg = debug();
        dbg.open().unwrap();
        let sim = dbg.interface_mut().swd_mut();
        sim.core_regs[15] = 0x0800_0100;
        sim.reg_ready_delay = 3;
        assert_eq!(dbg.read_core_reg(15).unwrap(), 0x0800_0100);
    }

    #[test]
    fn core_register_access_times_out() {
        let mut dbg = debug();
        dbg.open().unwrap();
        dbg.interface_mut().swd_mut().reg_ready_delay = u32::MAX;
        assert_eq!(dbg.read_core_reg(0), Err(Error::RegisterTimeout));
        assert_eq!(dbg.write_core_reg(0, 1), Err(Error::RegisterTimeout));
    }

    #[test]
    fn nreset_pulse_drives_high_then_low() {
        let mut dbg = debug();
        dbg.drive_nreset(NresetDrive::Pulse);
        let sim = dbg.interface_mut().swd_mut();
        assert_eq!(sim.nreset_levels.clone(), vec![true, false]);
    }
}
