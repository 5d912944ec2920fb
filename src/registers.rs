//! ADIv5 register bit definitions and the Cortex-M debug register window.
//!
//! Values match the ARM Debug Interface v5 architecture and the ARMv7-M
//! debug system; only the bits this probe actually touches are named.

use bitflags::bitflags;

bitflags! {
    /// DP ABORT register (write-only, shares address 0 with DPIDR).
    pub struct Abort: u32 {
        /// Abort the current AP transaction.
        const DAPABORT = 1 << 0;
        /// Clear the STICKYCMP flag.
        const STKCMPCLR = 1 << 1;
        /// Clear the STICKYERR flag.
        const STKERRCLR = 1 << 2;
        /// Clear the WDATAERR flag.
        const WDERRCLR = 1 << 3;
        /// Clear the STICKYORUN flag.
        const ORUNERRCLR = 1 << 4;
    }
}

impl Abort {
    /// All four sticky-clear bits, as written by error recovery.
    pub const STICKY_CLEARS: Abort = Abort::from_bits_truncate(
        Abort::STKCMPCLR.bits()
            | Abort::STKERRCLR.bits()
            | Abort::WDERRCLR.bits()
            | Abort::ORUNERRCLR.bits(),
    );
}

bitflags! {
    /// DP CTRL/STAT register.
    pub struct CtrlStat: u32 {
        /// Sticky overrun flag.
        const STICKYORUN = 1 << 1;
        /// Sticky compare flag.
        const STICKYCMP = 1 << 4;
        /// Sticky error flag.
        const STICKYERR = 1 << 5;
        /// Write data error flag.
        const WDATAERR = 1 << 7;
        /// Byte-lane mask for pushed-compare operation.
        const MASKLANE = 0xF << 8;
        /// Debug power-up request.
        const CDBGPWRUPREQ = 1 << 28;
        /// Debug power-up acknowledge.
        const CDBGPWRUPACK = 1 << 29;
        /// System power-up request.
        const CSYSPWRUPREQ = 1 << 30;
        /// System power-up acknowledge.
        const CSYSPWRUPACK = 1 << 31;
    }
}

impl CtrlStat {
    /// Both power-up request bits.
    pub const PWRUP_REQ: CtrlStat = CtrlStat::from_bits_truncate(
        CtrlStat::CDBGPWRUPREQ.bits() | CtrlStat::CSYSPWRUPREQ.bits(),
    );

    /// Both request bits plus both acknowledge bits; a powered-up port
    /// reads back with all four set.
    pub const PWRUP_MASK: u32 = 0xF000_0000;
}

/// Transfer mode field value for normal operation (no pushed compare).
pub const TRNNORMAL: u32 = 0;

bitflags! {
    /// AP CSW register, bank 0.
    pub struct Csw: u32 {
        /// Single auto-increment of TAR after each DRW access.
        const SADDRINC = 1 << 4;
        /// Debug status enable.
        const DBGSTAT = 1 << 6;
        /// Reserved bit that reads/writes as one on this port.
        const RESERVED = 1 << 24;
        /// HPROT data-access protection.
        const HPROT = 1 << 25;
        /// Master is the debugger.
        const MSTRDBG = 1 << 29;
    }
}

/// CSW size field: 8-bit transfers.
pub const CSW_SIZE8: u32 = 0;
/// CSW size field: 32-bit transfers.
pub const CSW_SIZE32: u32 = 2;

/// Canonical CSW configuration without the size field. Every operation
/// restores `CSW_CANONICAL | CSW_SIZE32` when it is done.
pub const CSW_CANONICAL: u32 = Csw::RESERVED.bits()
    | Csw::MSTRDBG.bits()
    | Csw::HPROT.bits()
    | Csw::DBGSTAT.bits()
    | Csw::SADDRINC.bits();

/// SELECT value for the AP identification bank (IDR at address 0xFC).
pub const SELECT_AP_ID_BANK: u32 = 0xF0;
/// SELECT value for AP bank 0 (CSW/TAR/DRW) with APSEL 0.
pub const SELECT_BANK0: u32 = 0;

/// TAR auto-increment is only architecturally guaranteed within this span.
pub const AUTO_INCREMENT_PAGE_SIZE: u32 = 1024;

/// Debug Halting Control and Status Register.
pub const DHCSR: u32 = 0xE000_EDF0;
/// Debug Core Register Selector Register.
pub const DCRSR: u32 = 0xE000_EDF4;
/// Debug Core Register Data Register.
pub const DCRDR: u32 = 0xE000_EDF8;

/// Key that must accompany every DHCSR write.
pub const DBGKEY: u32 = 0xA05F_0000;
/// DHCSR: enable halting debug.
pub const C_DEBUGEN: u32 = 1 << 0;
/// DHCSR: core register transfer complete.
pub const S_REGRDY: u32 = 1 << 16;
/// DCRSR: transfer direction is write.
pub const REGWNR: u32 = 1 << 16;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn canonical_csw_value() {
        // 32-bit auto-incrementing debug-master configuration.
        assert_eq!(CSW_CANONICAL | CSW_SIZE32, 0x2300_0052);
    }

    #[test]
    fn sticky_clears_value() {
        assert_eq!(Abort::STICKY_CLEARS.bits(), 0x1E);
    }
}
