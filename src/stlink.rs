//! ST-Link command protocol adapter.
//!
//! Decodes fixed 16-byte command packets, drives the debug session and the
//! memory/register layers, and serializes responses to the transport. Memory
//! range commands stream through a fixed-size buffer, interleaving target
//! access with bulk transfers.
//!
//! Fault policy: a failed sub-chunk latches the last-R/W-status and the
//! adapter silently reopens the debug session. The host never sees a fatal
//! error, only the status latch it can query afterwards.

use embedded_hal::delay::DelayNs;

use crate::debug::{DebugInterface, NresetDrive};
use crate::swd::Swd;
use crate::usb::{Transport, DATA_BUFFER_SIZE, TX_BUFFER_SIZE};

mod command;
mod request;
mod response;

pub use command::*;
pub use request::*;
pub use response::*;

/// Supply-voltage measurement collaborator (fed by the background ADC task).
pub trait VoltageSense {
    /// Returns the ADC reference factor and the latest supply sample, the
    /// two words reported verbatim by `GetTargetVoltage`.
    fn sample(&mut self) -> (u32, u32);
}

/// Failures reported to the command loop; the host has already received its
/// response (or deliberately none) by the time one of these is returned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Short packet, unknown command group or unsupported operation.
    Unsupported,
}

/// ST-Link command handler.
///
/// One instance per probe: owns the probe mode, the last-R/W-status latch
/// and the transfer buffers, so multiple simulated probes can coexist in
/// tests.
pub struct StLink<SWD, WAIT, TRANSPORT, VOLT> {
    debug: DebugInterface<SWD, WAIT>,
    transport: TRANSPORT,
    voltage: VOLT,
    mode: Mode,
    last_rw_status: Status,
    txbuf: [u8; TX_BUFFER_SIZE],
    databuf: [u8; DATA_BUFFER_SIZE],
}

impl<SWD, WAIT, TRANSPORT, VOLT> StLink<SWD, WAIT, TRANSPORT, VOLT>
where
    SWD: Swd,
    WAIT: DelayNs,
    TRANSPORT: Transport,
    VOLT: VoltageSense,
{
    /// Create a handler in `Unknown` mode with a closed session.
    pub fn new(swd: SWD, wait: WAIT, transport: TRANSPORT, voltage: VOLT) -> Self {
        StLink {
            debug: DebugInterface::new(swd, wait),
            transport,
            voltage,
            mode: Mode::Unknown,
            last_rw_status: Status::Ok,
            txbuf: [0; TX_BUFFER_SIZE],
            databuf: [0; DATA_BUFFER_SIZE],
        }
    }

    /// Access the debug session underneath the adapter.
    pub fn debug_mut(&mut self) -> &mut DebugInterface<SWD, WAIT> {
        &mut self.debug
    }

    /// Process one host command packet.
    pub fn process_packet(&mut self, packet: &[u8]) -> Result<(), CommandError> {
        let mut req = Request::from_packet(packet).ok_or(CommandError::Unsupported)?;

        match req.group {
            CommandGroup::GetVersion => {
                let mut w = ResponseWriter::new(&mut self.txbuf);
                w.write_u16(VERSION);
                w.write_u16(USB_VID);
                w.write_u16(USB_PID);
                let len = w.len();
                self.transmit_response(len);
                Ok(())
            }
            CommandGroup::DebugCommand => self.process_debug(&mut req),
            CommandGroup::DfuCommand => Ok(()),
            CommandGroup::SwimCommand => Err(CommandError::Unsupported),
            CommandGroup::GetCurrentMode => {
                let mode = self.mode;
                let mut w = ResponseWriter::new(&mut self.txbuf);
                w.write_u16(mode as u8 as u16);
                let len = w.len();
                self.transmit_response(len);
                Ok(())
            }
            CommandGroup::GetTargetVoltage => {
                let (reference, sample) = self.voltage.sample();
                let mut w = ResponseWriter::new(&mut self.txbuf);
                w.write_u32(reference);
                w.write_u32(sample);
                let len = w.len();
                self.transmit_response(len);
                Ok(())
            }
        }
    }

    fn process_debug(&mut self, req: &mut Request<'_>) -> Result<(), CommandError> {
        let sub = match DebugCommand::try_from(req.next_u8()) {
            Ok(sub) => sub,
            Err(e) => {
                warn!("unknown debug command {:x}", e.number);
                self.send_status(Status::Fault);
                return Err(CommandError::Unsupported);
            }
        };

        trace!("debug command: {:?}", sub);

        match sub {
            DebugCommand::GetStatus => {
                self.send_status(Status::Ok);
                Ok(())
            }
            DebugCommand::ReadMem32 => self.cmd_read_mem(req, MemWidth::Word),
            DebugCommand::WriteMem32 => self.cmd_write_mem(req, MemWidth::Word),
            DebugCommand::ReadMem8 => self.cmd_read_mem(req, MemWidth::Byte),
            DebugCommand::WriteMem8 => self.cmd_write_mem(req, MemWidth::Byte),
            DebugCommand::Exit => {
                self.mode = Mode::Unknown;
                debug!("debug exit");
                self.debug.close();
                // No response packet for exit.
                Ok(())
            }
            DebugCommand::ReadCoreId => {
                let core_id = self.debug.core_id();
                let mut w = ResponseWriter::new(&mut self.txbuf);
                w.write_u32(core_id);
                let len = w.len();
                self.transmit_response(len);
                Ok(())
            }
            DebugCommand::EnterV2 => {
                match self.debug.open() {
                    Ok(()) => {
                        self.mode = Mode::DebugSwd;
                        self.send_status(Status::Ok);
                    }
                    Err(e) => {
                        warn!("swd open failed: {:?}", e);
                        self.mode = Mode::Unknown;
                        self.send_status(Status::Fault);
                    }
                }
                Ok(())
            }
            DebugCommand::ReadRegV2 => self.cmd_read_reg(req),
            DebugCommand::WriteRegV2 => self.cmd_write_reg(req),
            DebugCommand::WriteDebugReg => self.cmd_write_debug_reg(req),
            DebugCommand::ReadDebugReg => self.cmd_read_debug_reg(req),
            DebugCommand::ReadAllRegsV2 => self.cmd_read_all_regs(),
            DebugCommand::GetLastRwStatus => {
                let status = self.last_rw_status;
                self.send_status(status);
                Ok(())
            }
            DebugCommand::DriveNrst => {
                match req.next_u8() {
                    0 => self.debug.drive_nreset(NresetDrive::High),
                    1 => self.debug.drive_nreset(NresetDrive::Low),
                    2 => self.debug.drive_nreset(NresetDrive::Pulse),
                    other => warn!("unexpected nrst drive operand {}", other),
                }
                self.send_status(Status::Ok);
                Ok(())
            }
            DebugCommand::ResetSysV2 => {
                let _ = self.debug.interface_mut().line_reset();
                self.send_status(Status::Ok);
                Ok(())
            }
            DebugCommand::SwdSetFreq => {
                // Clock divisor accepted and ignored; the bit-banged PHY
                // runs at its configured rate.
                self.send_status(Status::Ok);
                Ok(())
            }
            DebugCommand::EnterJtag
            | DebugCommand::ForceDebug
            | DebugCommand::ResetSys
            | DebugCommand::ReadAllRegs
            | DebugCommand::ReadReg
            | DebugCommand::WriteReg
            | DebugCommand::RunCore
            | DebugCommand::StepCore
            | DebugCommand::SetFp
            | DebugCommand::ClearFp
            | DebugCommand::WriteDebugRegV1
            | DebugCommand::SetWatchPoint
            | DebugCommand::EnterV1
            | DebugCommand::ReadIdCodes
            | DebugCommand::StartTraceRx
            | DebugCommand::StopTraceRx
            | DebugCommand::GetTraceCount
            | DebugCommand::EnterSwd => {
                warn!("unsupported command {:?}", sub);
                self.send_status(Status::Fault);
                Err(CommandError::Unsupported)
            }
        }
    }

    fn cmd_read_mem(&mut self, req: &mut Request<'_>, width: MemWidth) -> Result<(), CommandError> {
        let mut address = req.next_u32();
        let mut remaining = req.next_u16() as usize;

        while remaining > 0 {
            let len = remaining.min(DATA_BUFFER_SIZE);
            remaining -= len;
            let result = match width {
                MemWidth::Word => self
                    .debug
                    .interface_mut()
                    .read_mem32(address, &mut self.databuf[..len]),
                MemWidth::Byte => self
                    .debug
                    .interface_mut()
                    .read_mem8(address, &mut self.databuf[..len]),
            };
            address = address.wrapping_add(len as u32);
            if result.is_err() {
                self.last_rw_status = Status::Fault;
                warn!("memory read failed near {:x}, reopening session", address);
                let _ = self.debug.open();
                break;
            }
            self.last_rw_status = Status::Ok;
            if self.transport.transmit(&self.databuf[..len]) == 0 {
                self.last_rw_status = Status::Fault;
                break;
            }
        }
        Ok(())
    }

    fn cmd_write_mem(&mut self, req: &mut Request<'_>, width: MemWidth) -> Result<(), CommandError> {
        let mut address = req.next_u32();
        let mut remaining = req.next_u16() as usize;

        let mut swd_failed = false;
        self.last_rw_status = Status::Ok;
        while remaining > 0 {
            let len = remaining.min(DATA_BUFFER_SIZE);
            remaining -= len;
            let received = self.transport.receive(&mut self.databuf[..len]);
            if received != len {
                warn!("received {} bytes, expected {}", received, len);
                self.last_rw_status = Status::Fault;
                break;
            }
            // Keep draining host data after a target fault so the bulk pipe
            // stays in sync with the command stream.
            if !swd_failed {
                swd_failed = match width {
                    MemWidth::Word => self
                        .debug
                        .interface_mut()
                        .write_mem32(address, &self.databuf[..len])
                        .is_err(),
                    MemWidth::Byte => self
                        .debug
                        .interface_mut()
                        .write_mem8(address, &self.databuf[..len])
                        .is_err(),
                };
            }
            address = address.wrapping_add(len as u32);
        }
        if swd_failed {
            self.last_rw_status = Status::Fault;
            warn!("memory write failed, reopening session");
            let _ = self.debug.open();
        }
        Ok(())
    }

    fn cmd_read_reg(&mut self, req: &mut Request<'_>) -> Result<(), CommandError> {
        let index = req.next_u8();
        let mut result = self.debug.read_core_reg(index);
        if result.is_err() {
            result = self.debug.read_core_reg(index);
        }
        let status = if result.is_ok() { Status::Ok } else { Status::Fault };

        let mut w = ResponseWriter::new(&mut self.txbuf);
        w.write_status(status);
        w.pad(2);
        w.write_u32(result.unwrap_or(0));
        let len = w.len();
                self.transmit_response(len);
        Ok(())
    }

    fn cmd_write_reg(&mut self, req: &mut Request<'_>) -> Result<(), CommandError> {
        let index = req.next_u8();
        let value = req.next_u32();
        let status = match self.debug.write_core_reg(index, value) {
            Ok(()) => Status::Ok,
            Err(e) => {
                warn!("core register {} write failed: {:?}", index, e);
                Status::Fault
            }
        };
        self.send_status(status);
        Ok(())
    }

    fn cmd_write_debug_reg(&mut self, req: &mut Request<'_>) -> Result<(), CommandError> {
        let address = req.next_u32();
        let value = req.next_u32();
        let status = match self.debug.interface_mut().write_word(address, value) {
            Ok(()) => Status::Ok,
            Err(_) => Status::Fault,
        };
        self.send_status(status);
        Ok(())
    }

    fn cmd_read_debug_reg(&mut self, req: &mut Request<'_>) -> Result<(), CommandError> {
        let address = req.next_u32();
        let result = self.debug.interface_mut().read_word(address);
        let status = if result.is_ok() { Status::Ok } else { Status::Fault };

        let mut w = ResponseWriter::new(&mut self.txbuf);
        w.write_status(status);
        w.pad(2);
        w.write_u32(result.unwrap_or(0));
        let len = w.len();
                self.transmit_response(len);
        Ok(())
    }

    fn cmd_read_all_regs(&mut self) -> Result<(), CommandError> {
        self.last_rw_status = Status::Ok;
        let mut w = ResponseWriter::new(&mut self.txbuf);
        for index in 0..21u8 {
            match self.debug.read_core_reg(index) {
                Ok(value) => w.write_u32(value),
                Err(_) => {
                    self.last_rw_status = Status::Fault;
                    break;
                }
            }
        }
        // The dump is always 84 bytes; an aborted read zero-fills the rest.
        let missing = 84 - w.len();
        w.pad(missing);
        let len = w.len();
                self.transmit_response(len);
        Ok(())
    }

    fn send_status(&mut self, status: Status) {
        let mut w = ResponseWriter::new(&mut self.txbuf);
        w.write_status(status);
        let len = w.len();
                self.transmit_response(len);
    }

    fn transmit_response(&mut self, len: usize) {
        let _ = self.transport.transmit(&self.txbuf[..len]);
    }
}

/// Transfer width of a memory-range command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MemWidth {
    Word,
    Byte,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mock_device::{NoDelay, SimTarget};
    use std::collections::VecDeque;

    struct FakeTransport {
        sent: Vec<Vec<u8>>,
        rx: VecDeque<Vec<u8>>,
        fail_tx: bool,
    }

    impl FakeTransport {
        fn new() -> Self {
            FakeTransport {
                sent: Vec::new(),
                rx: VecDeque::new(),
                fail_tx: false,
            }
        }
    }

    impl Transport for FakeTransport {
        fn transmit(&mut self, data: &[u8]) -> usize {
            if self.fail_tx {
                return 0;
            }
            self.sent.push(data.to_vec());
            data.len()
        }

        fn receive(&mut self, buf: &mut [u8]) -> usize {
            match self.rx.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    n
                }
                None => 0,
            }
        }
    }

    struct FixedVoltage;
    impl VoltageSense for FixedVoltage {
        fn sample(&mut self) -> (u32, u32) {
            (240, 330)
        }
    }

    type TestLink = StLink<SimTarget, NoDelay, FakeTransport, FixedVoltage>;

    fn link() -> TestLink {
        StLink::new(SimTarget::new(), NoDelay, FakeTransport::new(), FixedVoltage)
    }

    fn packet(bytes: &[u8]) -> [u8; 16] {
        let mut p = [0u8; 16];
        p[..bytes.len()].copy_from_slice(bytes);
        p
    }

    fn mem_packet(sub: u8, address: u32, len: u16) -> [u8; 16] {
        let mut p = packet(&[0xF2, sub]);
        p[2..6].copy_from_slice(&address.to_le_bytes());
        p[6..8].copy_from_slice(&len.to_le_bytes());
        p
    }

    fn open(link: &mut TestLink) {
        link.process_packet(&packet(&[0xF2, 0x30])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x80, 0x00]);
    }

    #[test]
    fn get_version_reports_protocol_and_usb_ids() {
        let mut link = link();
        link.process_packet(&packet(&[0xF1])).unwrap();
        assert_eq!(
            link.transport.sent.pop().unwrap(),
            vec![0x23, 0x40, 0x83, 0x04, 0x44, 0x57]
        );
    }

    #[test]
    fn mode_tracks_session_state() {
        let mut link = link();
        link.process_packet(&packet(&[0xF5])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0, 0]);

        open(&mut link);
        link.process_packet(&packet(&[0xF5])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![4, 0]);

        // Exit sends no response and drops back to unknown mode.
        link.process_packet(&packet(&[0xF2, 0x21])).unwrap();
        assert!(link.transport.sent.is_empty());
        link.process_packet(&packet(&[0xF5])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0, 0]);
        assert_eq!(link.debug.interface_mut().swd_mut().disconnects, 1);
    }

    #[test]
    fn target_voltage_reports_two_words() {
        let mut link = link();
        link.process_packet(&packet(&[0xF7])).unwrap();
        let mut expected = 240u32.to_le_bytes().to_vec();
        expected.extend_from_slice(&330u32.to_le_bytes());
        assert_eq!(link.transport.sent.pop().unwrap(), expected);
    }

    #[test]
    fn read_mem32_end_to_end() {
        let mut link = link();
        open(&mut link);
        link.debug.interface_mut().swd_mut().poke_word(0x2000_0000, 0x0403_0201);
        link.debug.interface_mut().swd_mut().poke_word(0x2000_0004, 0x0807_0605);

        link.process_packet(&mem_packet(0x07, 0x2000_0000, 8)).unwrap();
        assert_eq!(
            link.transport.sent.pop().unwrap(),
            vec![1, 2, 3, 4, 5, 6, 7, 8]
        );

        link.process_packet(&packet(&[0xF2, 0x3B])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x80, 0x00]);
    }

    #[test]
    fn write_mem32_streams_from_host() {
        let mut link = link();
        open(&mut link);
        link.transport.rx.push_back(vec![1, 2, 3, 4, 5, 6, 7, 8]);

        link.process_packet(&mem_packet(0x08, 0x2000_0100, 8)).unwrap();
        // Writes produce no response packet, only the status latch.
        assert!(link.transport.sent.is_empty());
        assert_eq!(
            link.debug.interface_mut().swd_mut().peek_word(0x2000_0100),
            0x0403_0201
        );
        link.process_packet(&packet(&[0xF2, 0x3B])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x80, 0x00]);
    }

    #[test]
    fn mem8_round_trip_through_commands() {
        let mut link = link();
        open(&mut link);
        link.transport.rx.push_back(vec![0xAB]);
        link.process_packet(&mem_packet(0x0D, 0x1003, 1)).unwrap();
        assert_eq!(
            link.debug.interface_mut().swd_mut().peek_word(0x1000) >> 24,
            0xAB
        );

        link.process_packet(&mem_packet(0x0C, 0x1003, 1)).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0xAB]);
    }

    #[test]
    fn short_reception_latches_fault() {
        let mut link = link();
        open(&mut link);
        link.transport.rx.push_back(vec![1, 2, 3]);
        link.process_packet(&mem_packet(0x08, 0x2000_0000, 8)).unwrap();
        link.process_packet(&packet(&[0xF2, 0x3B])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x81, 0x00]);
    }

    #[test]
    fn faulted_write_reopens_session_and_latches_fault() {
        let mut link = link();
        open(&mut link);
        assert_eq!(link.debug.interface_mut().swd_mut().connects, 1);

        // Chunk attempt and its single retry both fault, the command-level
        // policy kicks in: no data to the host, silent reopen.
        link.debug.interface_mut().swd_mut().fault_drw_writes(2);
        link.transport.rx.push_back(vec![0u8; 8]);
        link.process_packet(&mem_packet(0x08, 0x2000_0000, 8)).unwrap();

        assert!(link.transport.sent.is_empty());
        assert_eq!(link.debug.interface_mut().swd_mut().connects, 2);
        link.process_packet(&packet(&[0xF2, 0x3B])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x81, 0x00]);

        // The reopened session keeps serving commands.
        link.debug.interface_mut().swd_mut().poke_word(0x2000_0000, 0xAA55_AA55);
        link.process_packet(&mem_packet(0x07, 0x2000_0000, 4)).unwrap();
        assert_eq!(
            link.transport.sent.pop().unwrap(),
            0xAA55_AA55u32.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn unclearable_fault_still_reopens_without_crashing() {
        let mut link = link();
        open(&mut link);

        // FAULT that recovery cannot clear: ABORT writes are refused, so
        // the recovery controller reports a hard failure.
        link.debug.interface_mut().swd_mut().wedge();
        link.debug.interface_mut().swd_mut().fault_drw_writes(2);
        link.transport.rx.push_back(vec![0u8; 4]);
        link.process_packet(&mem_packet(0x08, 0x2000_0000, 4)).unwrap();

        // The adapter attempted the reopen (connect ran again) and the
        // status latch reflects the failure.
        assert_eq!(link.debug.interface_mut().swd_mut().connects, 2);
        link.process_packet(&packet(&[0xF2, 0x3B])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x81, 0x00]);
    }

    #[test]
    fn read_core_id_reports_stored_identifier() {
        let mut link = link();
        link.process_packet(&packet(&[0xF2, 0x22])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0, 0, 0, 0]);

        open(&mut link);
        link.process_packet(&packet(&[0xF2, 0x22])).unwrap();
        assert_eq!(
            link.transport.sent.pop().unwrap(),
            SimTarget::IDCODE.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn core_register_commands_round_trip() {
        let mut link = link();
        open(&mut link);

        let mut p = packet(&[0xF2, 0x34, 7]);
        p[3..7].copy_from_slice(&0xCAFE_F00Du32.to_le_bytes());
        link.process_packet(&p).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x80, 0x00]);

        link.process_packet(&packet(&[0xF2, 0x33, 7])).unwrap();
        let mut expected = vec![0x80, 0x00, 0x00, 0x00];
        expected.extend_from_slice(&0xCAFE_F00Du32.to_le_bytes());
        assert_eq!(link.transport.sent.pop().unwrap(), expected);
    }

    #[test]
    fn read_all_regs_dumps_21_words() {
        let mut link = link();
        open(&mut link);
        for i in 0..21 {
            link.debug.interface_mut().swd_mut().core_regs[i] = i as u32 * 3;
        }
        link.process_packet(&packet(&[0xF2, 0x3A])).unwrap();
        let dump = link.transport.sent.pop().unwrap();
        assert_eq!(dump.len(), 84);
        for i in 0..21 {
            let word = u32::from_le_bytes(dump[i * 4..i * 4 + 4].try_into().unwrap());
            assert_eq!(word, i as u32 * 3);
        }
        link.process_packet(&packet(&[0xF2, 0x3B])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x80, 0x00]);
    }

    #[test]
    fn debug_register_commands() {
        let mut link = link();
        open(&mut link);

        let mut p = packet(&[0xF2, 0x35]);
        p[2..6].copy_from_slice(&0x2000_0200u32.to_le_bytes());
        p[6..10].copy_from_slice(&0x1122_3344u32.to_le_bytes());
        link.process_packet(&p).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x80, 0x00]);

        let mut p = packet(&[0xF2, 0x36]);
        p[2..6].copy_from_slice(&0x2000_0200u32.to_le_bytes());
        link.process_packet(&p).unwrap();
        let mut expected = vec![0x80, 0x00, 0x00, 0x00];
        expected.extend_from_slice(&0x1122_3344u32.to_le_bytes());
        assert_eq!(link.transport.sent.pop().unwrap(), expected);
    }

    #[test]
    fn drive_nrst_pulses_reset_line() {
        let mut link = link();
        link.process_packet(&packet(&[0xF2, 0x3C, 2])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x80, 0x00]);
        assert_eq!(
            link.debug.interface_mut().swd_mut().nreset_levels.clone(),
            vec![true, false]
        );
    }

    #[test]
    fn unsupported_operations_answer_fault() {
        let mut link = link();
        for sub in [0x00u8, 0x02, 0x03, 0x09, 0x0A, 0xA3] {
            assert_eq!(
                link.process_packet(&packet(&[0xF2, sub])),
                Err(CommandError::Unsupported)
            );
            assert_eq!(link.transport.sent.pop().unwrap(), vec![0x81, 0x00]);
        }
        // Unknown sub-command byte gets the same answer.
        assert_eq!(
            link.process_packet(&packet(&[0xF2, 0x77])),
            Err(CommandError::Unsupported)
        );
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x81, 0x00]);
    }

    #[test]
    fn unknown_group_gets_no_response() {
        let mut link = link();
        assert_eq!(
            link.process_packet(&packet(&[0x42])),
            Err(CommandError::Unsupported)
        );
        assert!(link.transport.sent.is_empty());
    }

    #[test]
    fn failed_open_leaves_mode_unknown() {
        let mut link = link();
        link.debug.interface_mut().swd_mut().refuse_power_up();
        link.process_packet(&packet(&[0xF2, 0x30])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x81, 0x00]);
        link.process_packet(&packet(&[0xF5])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0, 0]);
    }

    #[test]
    fn reset_sys_runs_a_line_reset() {
        let mut link = link();
        open(&mut link);
        let before = link.debug.interface_mut().swd_mut().line_resets;
        link.process_packet(&packet(&[0xF2, 0x32])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x80, 0x00]);
        assert_eq!(link.debug.interface_mut().swd_mut().line_resets, before + 1);
    }

    #[test]
    fn failed_transmit_latches_fault() {
        let mut link = link();
        open(&mut link);
        link.transport.fail_tx = true;
        link.process_packet(&mem_packet(0x07, 0x2000_0000, 4)).unwrap();
        link.transport.fail_tx = false;
        link.process_packet(&packet(&[0xF2, 0x3B])).unwrap();
        assert_eq!(link.transport.sent.pop().unwrap(), vec![0x81, 0x00]);
    }
}
