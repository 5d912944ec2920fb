//! Test doubles for the SWD stack.
//!
//! [`SimTarget`] is a behavioural model of an attached Cortex-M target:
//! DP/AP register file, word memory with byte lanes and TAR auto-increment,
//! the one-deep AP read pipeline, the core-register window with its ready
//! flag, and knobs to inject WAIT/FAULT/silence at chosen points.
//! [`MockRawSwd`] is an expectation-style mock of the raw transaction seam.

use std::collections::HashMap;

use crate::registers::{CtrlStat, CSW_CANONICAL, CSW_SIZE32, DCRDR, DCRSR, DHCSR, REGWNR, S_REGRDY};
use crate::swd::{self, APnDP, Swd};

/// Raw transaction seam, mirrored for `mockall`.
#[mockall::automock]
pub trait RawSwd {
    /// See [`Swd::read_inner`].
    fn read_inner(&mut self, apndp: APnDP, a: u8) -> swd::Result<u32>;
    /// See [`Swd::write_inner`].
    fn write_inner(&mut self, apndp: APnDP, a: u8, data: u32) -> swd::Result<()>;
    /// See [`Swd::write_sequence`].
    fn write_sequence(&mut self, num_bits: usize, data: &[u8]);
    /// See [`Swd::set_nreset`].
    fn set_nreset(&mut self, high: bool);
    /// See [`Swd::release`].
    fn release(&mut self);
}

impl Swd for MockRawSwd {
    fn read_inner(&mut self, apndp: APnDP, a: u8) -> swd::Result<u32> {
        RawSwd::read_inner(self, apndp, a)
    }

    fn write_inner(&mut self, apndp: APnDP, a: u8, data: u32) -> swd::Result<()> {
        RawSwd::write_inner(self, apndp, a, data)
    }

    fn write_sequence(&mut self, num_bits: usize, data: &[u8]) {
        RawSwd::write_sequence(self, num_bits, data)
    }

    fn set_nreset(&mut self, high: bool) {
        RawSwd::set_nreset(self, high)
    }

    fn release(&mut self) {
        RawSwd::release(self)
    }
}

/// A no-op delay for host tests.
pub struct NoDelay;

impl embedded_hal::delay::DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Behavioural simulated target.
pub struct SimTarget {
    /// Word-addressed target memory.
    mem: HashMap<u32, u32>,

    // DP/AP register file.
    pub csw: u32,
    pub tar: u32,
    pub select: u32,
    rdbuff: u32,
    pub ctrl_stat: u32,
    pub idr: u32,

    // Core-register window.
    pub core_regs: [u32; 21],
    dcrdr: u32,
    /// DHCSR reads to swallow before S_REGRDY appears after a DCRSR write.
    pub reg_ready_delay: u32,
    reg_ready_countdown: u32,

    // Failure injection.
    wait_budget: usize,
    drw_write_faults: usize,
    ctrl_stat_silence: usize,
    wedged: bool,
    refuse_power_up: bool,

    // Instrumentation.
    pub csw_writes: Vec<u32>,
    pub tar_writes: Vec<u32>,
    pub select_writes: Vec<u32>,
    pub abort_writes: Vec<u32>,
    pub nreset_levels: Vec<bool>,
    pub drw_reads: usize,
    pub rdbuff_reads: usize,
    pub connects: usize,
    pub disconnects: usize,
    pub line_resets: usize,
}

impl SimTarget {
    /// IDCODE reported by the simulated core.
    pub const IDCODE: u32 = 0x2BA0_1477;
    /// AHB-AP identification register value.
    pub const IDR: u32 = 0x2477_0011;

    pub fn new() -> Self {
        SimTarget {
            mem: HashMap::new(),
            csw: CSW_CANONICAL | CSW_SIZE32,
            tar: 0,
            select: 0,
            rdbuff: 0,
            ctrl_stat: 0,
            idr: Self::IDR,
            core_regs: [0; 21],
            dcrdr: 0,
            reg_ready_delay: 0,
            reg_ready_countdown: 0,
            wait_budget: 0,
            drw_write_faults: 0,
            ctrl_stat_silence: 0,
            wedged: false,
            refuse_power_up: false,
            csw_writes: Vec::new(),
            tar_writes: Vec::new(),
            select_writes: Vec::new(),
            abort_writes: Vec::new(),
            nreset_levels: Vec::new(),
            drw_reads: 0,
            rdbuff_reads: 0,
            connects: 0,
            disconnects: 0,
            line_resets: 0,
        }
    }

    /// Answer the next `n` transactions with WAIT.
    pub fn wait_responses(&mut self, n: usize) {
        self.wait_budget = n;
    }

    /// Answer the next `n` DRW writes with FAULT.
    pub fn fault_drw_writes(&mut self, n: usize) {
        self.drw_write_faults = n;
    }

    /// Leave the next `n` CTRL/STAT reads undriven (protocol error).
    pub fn silence_ctrl_stat_reads(&mut self, n: usize) {
        self.ctrl_stat_silence = n;
    }

    /// Refuse all ABORT writes, making recovery a hard failure.
    pub fn wedge(&mut self) {
        self.wedged = true;
    }

    /// Never acknowledge a power-up request.
    pub fn refuse_power_up(&mut self) {
        self.refuse_power_up = true;
    }

    /// Directly set a word of target memory.
    pub fn poke_word(&mut self, address: u32, value: u32) {
        self.mem.insert(address & !3, value);
    }

    /// Directly read a word of target memory.
    pub fn peek_word(&self, address: u32) -> u32 {
        self.mem.get(&(address & !3)).copied().unwrap_or(0)
    }

    fn csw_size_bytes(&self) -> u32 {
        match self.csw & 0x7 {
            0 => 1,
            1 => 2,
            _ => 4,
        }
    }

    fn auto_increment(&mut self) {
        if self.csw & 0x10 != 0 {
            self.tar = self.tar.wrapping_add(self.csw_size_bytes());
        }
    }

    fn bus_read(&mut self) -> u32 {
        let addr = self.tar;
        let value = match addr {
            DHCSR => {
                if self.reg_ready_countdown > 0 {
                    self.reg_ready_countdown -= 1;
                    0
                } else {
                    S_REGRDY
                }
            }
            DCRDR => self.dcrdr,
            _ => self.peek_word(addr),
        };
        self.auto_increment();
        value
    }

    fn bus_write(&mut self, value: u32) {
        let addr = self.tar;
        match addr {
            DCRSR => {
                self.poke_word(addr, value);
                let index = (value & 0x7F) as usize % self.core_regs.len();
                if value & REGWNR != 0 {
                    self.core_regs[index] = self.dcrdr;
                } else {
                    self.dcrdr = self.core_regs[index];
                }
                self.reg_ready_countdown = self.reg_ready_delay;
            }
            DCRDR => {
                self.dcrdr = value;
                self.poke_word(addr, value);
            }
            _ => {
                if self.csw_size_bytes() == 1 {
                    let lane = (addr & 3) * 8;
                    let byte = (value >> lane) & 0xFF;
                    let word = (self.peek_word(addr) & !(0xFF << lane)) | (byte << lane);
                    self.poke_word(addr, word);
                } else {
                    self.poke_word(addr, value);
                }
            }
        }
        self.auto_increment();
    }
}

impl Swd for SimTarget {
    fn read_inner(&mut self, apndp: APnDP, a: u8) -> swd::Result<u32> {
        if self.wait_budget > 0 {
            self.wait_budget -= 1;
            return Err(swd::Error::AckWait);
        }

        match apndp {
            APnDP::DP => match a {
                0 => Ok(Self::IDCODE),
                1 => {
                    if self.ctrl_stat_silence > 0 {
                        self.ctrl_stat_silence -= 1;
                        return Err(swd::Error::AckProtocol);
                    }
                    let mut status = self.ctrl_stat;
                    if !self.refuse_power_up {
                        if status & CtrlStat::CDBGPWRUPREQ.bits() != 0 {
                            status |= CtrlStat::CDBGPWRUPACK.bits();
                        }
                        if status & CtrlStat::CSYSPWRUPREQ.bits() != 0 {
                            status |= CtrlStat::CSYSPWRUPACK.bits();
                        }
                    }
                    Ok(status)
                }
                3 => {
                    self.rdbuff_reads += 1;
                    Ok(self.rdbuff)
                }
                _ => Ok(0),
            },
            APnDP::AP => {
                // AP reads are posted: this transaction returns the previous
                // result and latches the new one into RDBUFF.
                let previous = self.rdbuff;
                self.rdbuff = match (self.select & 0xF0, a) {
                    (0xF0, 3) => self.idr,
                    (0, 0) => self.csw,
                    (0, 3) => {
                        self.drw_reads += 1;
                        self.bus_read()
                    }
                    _ => 0,
                };
                Ok(previous)
            }
        }
    }

    fn write_inner(&mut self, apndp: APnDP, a: u8, data: u32) -> swd::Result<()> {
        if self.wait_budget > 0 {
            self.wait_budget -= 1;
            return Err(swd::Error::AckWait);
        }

        match apndp {
            APnDP::DP => match a {
                0 => {
                    if self.wedged {
                        return Err(swd::Error::AckFault);
                    }
                    self.abort_writes.push(data);
                    Ok(())
                }
                1 => {
                    self.ctrl_stat = data;
                    Ok(())
                }
                2 => {
                    self.select = data;
                    self.select_writes.push(data);
                    Ok(())
                }
                _ => Ok(()),
            },
            APnDP::AP => match a {
                0 => {
                    self.csw = data;
                    self.csw_writes.push(data);
                    Ok(())
                }
                1 => {
                    self.tar = data;
                    self.tar_writes.push(data);
                    Ok(())
                }
                3 => {
                    if self.drw_write_faults > 0 {
                        self.drw_write_faults -= 1;
                        return Err(swd::Error::AckFault);
                    }
                    self.bus_write(data);
                    Ok(())
                }
                _ => Ok(()),
            },
        }
    }

    fn write_sequence(&mut self, num_bits: usize, data: &[u8]) {
        match (num_bits, data) {
            (16, [0x9E, 0xE7]) => self.connects += 1,
            (16, [0x3C, 0xE7]) => self.disconnects += 1,
            (8, [0x00]) => self.line_resets += 1,
            _ => {}
        }
    }

    fn set_nreset(&mut self, high: bool) {
        self.nreset_levels.push(high);
    }

    fn release(&mut self) {}
}
