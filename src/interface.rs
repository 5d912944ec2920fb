//! Checked SWD access: error recovery and the memory access layer.
//!
//! [`SwdInterface`] wraps a raw [`Swd`] implementation and gives every
//! transaction the ARM-mandated failure handling: full WAIT-retry budget,
//! then sticky-error clearing and CSW restoration on anything else. Memory
//! access is built on top of the checked transactions, honoring the TAR
//! auto-increment page limit and the one-transaction AP read pipeline.

use crate::registers::{
    Abort, AUTO_INCREMENT_PAGE_SIZE, CSW_CANONICAL, CSW_SIZE32, CSW_SIZE8,
};
use crate::swd::{self, APRegister, APnDP, DPRegister, Swd, MAX_WAIT_RETRIES};

/// Failure of a checked transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccessError {
    /// The transaction failed; sticky state was cleared and the canonical
    /// CSW restored, so the bus is healthy again. The operation itself must
    /// still be treated as failed.
    Faulted,
    /// Recovery itself failed: the ABORT write or the CSW restore did not
    /// go through. Only a fresh session open will resynchronize the target.
    Wedged,
}

/// The definition of checked-access results.
pub type Result<T> = core::result::Result<T, AccessError>;

/// Checked SWD access over a raw [`Swd`] driver.
pub struct SwdInterface<SWD> {
    swd: SWD,
}

impl<SWD: Swd> SwdInterface<SWD> {
    /// Wrap a raw SWD driver.
    pub fn new(swd: SWD) -> Self {
        SwdInterface { swd }
    }

    /// Access the underlying driver.
    pub fn swd_mut(&mut self) -> &mut SWD {
        &mut self.swd
    }

    /// Clear the error condition left behind by a failed transaction.
    ///
    /// Parity and protocol errors have nothing to clear on the target.
    /// Everything else gets the full treatment: probe CTRL/STAT (a failure
    /// there means the target stopped responding and only a line reset will
    /// bring it back), clear all sticky flags through ABORT, restore the
    /// canonical CSW.
    fn recover(&mut self, err: swd::Error) -> AccessError {
        match err {
            swd::Error::BadParity => AccessError::Faulted,
            swd::Error::AckProtocol => {
                warn!("target did not drive an ack");
                AccessError::Faulted
            }
            _ => {
                if self.swd.read_dp(0, DPRegister::CTRLSTAT).is_err() {
                    warn!("CTRL/STAT unreadable, forcing line reset");
                    let _ = self.line_reset();
                }

                // A=0 is ABORT on a DP write. If this fails we are wedged.
                if self
                    .swd
                    .write(0, APnDP::DP, 0, Abort::STICKY_CLEARS.bits())
                    .is_err()
                {
                    warn!("sticky clear failed");
                    return AccessError::Wedged;
                }

                if self
                    .swd
                    .write_ap(MAX_WAIT_RETRIES, APRegister::CSW, CSW_CANONICAL | CSW_SIZE32)
                    .is_err()
                {
                    return AccessError::Wedged;
                }

                AccessError::Faulted
            }
        }
    }

    /// Read a DP register with full retry and recovery.
    pub fn read_dp(&mut self, reg: DPRegister) -> Result<u32> {
        self.swd
            .read_dp(MAX_WAIT_RETRIES, reg)
            .map_err(|e| self.recover(e))
    }

    /// Write a DP register with full retry and recovery.
    pub fn write_dp(&mut self, reg: DPRegister, data: u32) -> Result<()> {
        self.swd
            .write_dp(MAX_WAIT_RETRIES, reg, data)
            .map_err(|e| self.recover(e))
    }

    /// Read an AP register with full retry and recovery.
    pub fn read_ap(&mut self, reg: APRegister) -> Result<u32> {
        self.swd
            .read_ap(MAX_WAIT_RETRIES, reg)
            .map_err(|e| self.recover(e))
    }

    /// Write an AP register with full retry and recovery.
    pub fn write_ap(&mut self, reg: APRegister, data: u32) -> Result<()> {
        self.swd
            .write_ap(MAX_WAIT_RETRIES, reg, data)
            .map_err(|e| self.recover(e))
    }

    /// Write the ABORT register with full retry and recovery.
    pub fn write_abort(&mut self, bits: Abort) -> Result<()> {
        self.swd
            .write(MAX_WAIT_RETRIES, APnDP::DP, 0, bits.bits())
            .map_err(|e| self.recover(e))
    }

    /// 56 clock cycles with the data line high.
    fn shift_reset(&mut self) {
        self.swd.write_sequence(56, &[0xFF; 7]);
    }

    /// SWD line reset: 56 ones, 8 zeros, then read IDCODE.
    ///
    /// The IDCODE read completes the reset; the protocol defines it as never
    /// waiting or faulting, so it runs without a retry budget.
    pub fn line_reset(&mut self) -> swd::Result<u32> {
        self.shift_reset();
        self.swd.write_sequence(8, &[0x00]);
        self.swd.read(0, APnDP::DP, DPRegister::DPIDR as u8)
    }

    /// Switch the target from its JTAG default onto the SWD port and finish
    /// with a line reset. Returns the IDCODE.
    pub fn connect(&mut self) -> swd::Result<u32> {
        self.shift_reset();
        self.swd.write_sequence(16, &0xE79Eu16.to_le_bytes());
        self.line_reset()
    }

    /// Switch the target back to its JTAG port and release the data line.
    pub fn disconnect(&mut self) {
        self.shift_reset();
        self.swd.write_sequence(16, &0xE73Cu16.to_le_bytes());
        self.shift_reset();
        self.swd.release();
    }

    /// Write one auto-increment page worth of words.
    ///
    /// CSW(32-bit autoinc), TAR, one DRW write per word, then a RDBUFF read
    /// to flush the pipeline and observe a trailing fault.
    fn write_mem32_chunk(&mut self, address: u32, data: &[u8]) -> Result<()> {
        self.write_ap(APRegister::CSW, CSW_CANONICAL | CSW_SIZE32)?;
        self.write_ap(APRegister::TAR, address)?;
        for word in data.chunks_exact(4) {
            let word = u32::from_le_bytes(word.try_into().unwrap_or([0; 4]));
            self.write_ap(APRegister::DRW, word)?;
        }
        self.read_dp(DPRegister::RDBUFF)?;
        Ok(())
    }

    /// Read one auto-increment page worth of words.
    ///
    /// The first DRW read only primes the pipeline and its result is
    /// discarded; each following DRW read returns the previous word, and
    /// the last word is collected from RDBUFF so no extra bus access is
    /// issued past the end of the range.
    fn read_mem32_chunk(&mut self, address: u32, data: &mut [u8]) -> Result<()> {
        self.write_ap(APRegister::CSW, CSW_CANONICAL | CSW_SIZE32)?;
        self.write_ap(APRegister::TAR, address)?;
        self.read_ap(APRegister::DRW)?;

        let words = data.len() / 4;
        for (i, out) in data.chunks_exact_mut(4).enumerate() {
            let value = if i + 1 < words {
                self.read_ap(APRegister::DRW)?
            } else {
                self.read_dp(DPRegister::RDBUFF)?
            };
            out.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    /// Write 32-bit memory. `address` must be word aligned and `data.len()`
    /// a multiple of four.
    ///
    /// The range is split at auto-increment page boundaries; a failed chunk
    /// is retried once with identical parameters before the error is
    /// propagated. Words already transferred stay written.
    pub fn write_mem32(&mut self, mut address: u32, mut data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len() % 4, 0);
        while !data.is_empty() {
            let len = chunk_len(address, data.len());
            let (chunk, rest) = data.split_at(len);
            if self.write_mem32_chunk(address, chunk).is_err() {
                self.write_mem32_chunk(address, chunk)?;
            }
            address += len as u32;
            data = rest;
        }
        Ok(())
    }

    /// Read 32-bit memory. Same alignment and chunking rules as
    /// [`Self::write_mem32`].
    pub fn read_mem32(&mut self, mut address: u32, mut data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len() % 4, 0);
        while !data.is_empty() {
            let len = chunk_len(address, data.len());
            let (chunk, rest) = core::mem::take(&mut data).split_at_mut(len);
            if self.read_mem32_chunk(address, chunk).is_err() {
                self.read_mem32_chunk(address, chunk)?;
            }
            address += len as u32;
            data = rest;
        }
        Ok(())
    }

    fn write_byte(&mut self, address: u32, data: u8) -> Result<()> {
        self.write_ap(APRegister::TAR, address)?;
        self.write_ap(APRegister::DRW, (data as u32) << ((address & 3) * 8))?;
        Ok(())
    }

    fn read_byte(&mut self, address: u32) -> Result<u8> {
        self.write_ap(APRegister::TAR, address)?;
        self.read_ap(APRegister::DRW)?;
        let word = self.read_dp(DPRegister::RDBUFF)?;
        Ok((word >> ((address & 3) * 8)) as u8)
    }

    fn write_mem8_inner(&mut self, address: u32, data: &[u8]) -> Result<()> {
        self.write_ap(APRegister::CSW, CSW_CANONICAL | CSW_SIZE8)?;
        for (i, &byte) in data.iter().enumerate() {
            let addr = address + i as u32;
            if self.write_byte(addr, byte).is_err() {
                self.write_byte(addr, byte)?;
            }
        }
        Ok(())
    }

    fn read_mem8_inner(&mut self, address: u32, data: &mut [u8]) -> Result<()> {
        self.write_ap(APRegister::CSW, CSW_CANONICAL | CSW_SIZE8)?;
        for (i, out) in data.iter_mut().enumerate() {
            let addr = address + i as u32;
            *out = match self.read_byte(addr) {
                Ok(b) => b,
                Err(_) => self.read_byte(addr)?,
            };
        }
        Ok(())
    }

    /// Write 8-bit memory, one byte-lane transaction per byte, with a single
    /// retry per byte. The canonical 32-bit CSW is restored afterwards no
    /// matter how the transfer went; width state never leaks out of here.
    pub fn write_mem8(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let result = self.write_mem8_inner(address, data);
        let restore = self.write_ap(APRegister::CSW, CSW_CANONICAL | CSW_SIZE32);
        result.and(restore)
    }

    /// Read 8-bit memory. Same lane addressing, retry and CSW restore rules
    /// as [`Self::write_mem8`].
    pub fn read_mem8(&mut self, address: u32, data: &mut [u8]) -> Result<()> {
        let result = self.read_mem8_inner(address, data);
        let restore = self.write_ap(APRegister::CSW, CSW_CANONICAL | CSW_SIZE32);
        result.and(restore)
    }

    /// Write a single 32-bit word.
    pub fn write_word(&mut self, address: u32, data: u32) -> Result<()> {
        self.write_mem32_chunk(address, &data.to_le_bytes())
    }

    /// Read a single 32-bit word.
    pub fn read_word(&mut self, address: u32) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_mem32_chunk(address, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}

/// Length of the next chunk: clipped to the end of the current
/// auto-increment page.
fn chunk_len(address: u32, remaining: usize) -> usize {
    let page_left = AUTO_INCREMENT_PAGE_SIZE - (address & (AUTO_INCREMENT_PAGE_SIZE - 1));
    remaining.min(page_left as usize)
}
