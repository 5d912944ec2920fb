//! ST-Link V2 wire vocabulary: command bytes, status codes, probe modes.
//!
//! The numeric values are the historical ST-Link USB protocol as consumed
//! by OpenOCD and friends; they are not negotiable.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// First byte of a command packet: the command group.
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommandGroup {
    /// Report probe version and USB identifiers.
    GetVersion = 0xF1,
    /// Debug-operation group; byte 1 selects the operation.
    DebugCommand = 0xF2,
    /// DFU-mode group (not supported, acknowledged silently).
    DfuCommand = 0xF3,
    /// SWIM group (not supported).
    SwimCommand = 0xF4,
    /// Report the current probe mode.
    GetCurrentMode = 0xF5,
    /// Report the measured target supply voltage.
    GetTargetVoltage = 0xF7,
}

/// Second byte of a debug-group packet: the debug operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DebugCommand {
    /// Enter JTAG debug mode (unsupported, answers FAULT).
    EnterJtag = 0x00,
    /// Probe status query.
    GetStatus = 0x01,
    /// Force the core into debug state (unsupported).
    ForceDebug = 0x02,
    /// System reset, API v1 (unsupported).
    ResetSys = 0x03,
    /// Register dump, API v1 (unsupported).
    ReadAllRegs = 0x04,
    /// Register read, API v1 (unsupported).
    ReadReg = 0x05,
    /// Register write, API v1 (unsupported).
    WriteReg = 0x06,
    /// 32-bit memory read.
    ReadMem32 = 0x07,
    /// 32-bit memory write.
    WriteMem32 = 0x08,
    /// Resume the core (unsupported).
    RunCore = 0x09,
    /// Single-step the core (unsupported).
    StepCore = 0x0A,
    /// Set flash patch breakpoint, API v1 (unsupported).
    SetFp = 0x0B,
    /// 8-bit memory read.
    ReadMem8 = 0x0C,
    /// 8-bit memory write.
    WriteMem8 = 0x0D,
    /// Clear flash patch breakpoint, API v1 (unsupported).
    ClearFp = 0x0E,
    /// Debug-register write, API v1 (unsupported).
    WriteDebugRegV1 = 0x0F,
    /// Set watchpoint, API v1 (unsupported).
    SetWatchPoint = 0x10,
    /// Enter debug mode, API v1 (unsupported).
    EnterV1 = 0x20,
    /// Leave debug mode and release the target. No response packet.
    Exit = 0x21,
    /// Report the connected core identifier.
    ReadCoreId = 0x22,
    /// Enter SWD debug mode, API v2.
    EnterV2 = 0x30,
    /// Read boundary scan idcodes (unsupported).
    ReadIdCodes = 0x31,
    /// SWD line reset, API v2.
    ResetSysV2 = 0x32,
    /// Core-register read, API v2.
    ReadRegV2 = 0x33,
    /// Core-register write, API v2.
    WriteRegV2 = 0x34,
    /// Single 32-bit debug-address write, API v2.
    WriteDebugReg = 0x35,
    /// Single 32-bit debug-address read, API v2.
    ReadDebugReg = 0x36,
    /// Dump all 21 core registers, API v2.
    ReadAllRegsV2 = 0x3A,
    /// Report the last memory-operation status latch.
    GetLastRwStatus = 0x3B,
    /// Drive the nRESET line.
    DriveNrst = 0x3C,
    /// Start SWO trace reception (unsupported).
    StartTraceRx = 0x40,
    /// Stop SWO trace reception (unsupported).
    StopTraceRx = 0x41,
    /// Query SWO trace byte count (unsupported).
    GetTraceCount = 0x42,
    /// Set the SWD clock divisor (accepted, ignored).
    SwdSetFreq = 0x43,
    /// Enter SWD, legacy encoding (unsupported).
    EnterSwd = 0xA3,
}

/// Probe operating mode, as reported by `GetCurrentMode`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    /// No mode entered since power-up or since the last exit.
    Unknown = 0,
    /// Device firmware update mode.
    Dfu = 1,
    /// Mass-storage mode.
    Mass = 2,
    /// JTAG debug session.
    DebugJtag = 3,
    /// SWD debug session.
    DebugSwd = 4,
    /// SWIM debug session.
    DebugSwim = 5,
}

/// Two-byte operation status returned to the host.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    /// Operation completed.
    Ok = 0x80,
    /// Operation faulted.
    Fault = 0x81,
}

const VERSION_JTAG: u16 = 13;
const VERSION_STLINK: u16 = 2;
const VERSION_SWIM: u16 = 0;

/// Probe version word, byte-swapped on the wire per the historical layout.
pub const VERSION: u16 =
    ((VERSION_JTAG << 6) | (VERSION_STLINK << 12) | VERSION_SWIM).swap_bytes();

/// USB vendor id reported by `GetVersion`.
pub const USB_VID: u16 = 0x0483;
/// USB product id reported by `GetVersion`.
pub const USB_PID: u16 = 0x5744;
