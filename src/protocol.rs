//! Binary scripting protocol.
//!
//! The host sends one opcode byte at a time.  The upper nibble selects the command class, the
//! lower nibble carries an immediate operand:
//!
//! | Opcode | Command | Reply |
//! | --- | --- | --- |
//! | `0x00` | leave binary mode | - |
//! | `0x01` | identify | `I2C1` |
//! | `0x02` | start condition | status |
//! | `0x03` | stop condition | status |
//! | `0x04` | read one byte | the byte |
//! | `0x06` / `0x07` | send ACK / NACK | status |
//! | `0x08` | write-then-read | status, read bytes |
//! | `0x09` | auxiliary pin sub-command | status, result |
//! | `0x0f` | sniff (machine-readable) | sniffer output, status |
//! | `0x1n` | write `n + 1` bytes | status, one ack bit per byte |
//! | `0x4n` | configure peripherals | status |
//! | `0x5n` | pull-up / ADC control | collaborator's reply |
//! | `0x6n` | bus speed (`n & 3`) | status |
//!
//! A status byte is `0x01` on success and `0x00` on failure.  Failures never end the session;
//! only a broken control channel does.
use crate::edge::EdgeQueue;
use crate::sniffer::{OutputMode, SniffError};
use crate::{Ack, Backend, Engine, Error, ResultStatus, Speed};
use embedded_io::{Read, ReadExactError, ReadReady, Write, WriteReady};

/// Reply to the identify command.
pub const IDENTIFIER: &[u8] = b"I2C1";

/// Buffer size for write-then-read transfers.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Level to put the auxiliary line in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxState {
    Low,
    High,
    HighImpedance,
}

/// Which physical line serves as the auxiliary pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxLine {
    Aux,
    ChipSelect,
}

/// Power, pull-up and auxiliary pin control, provided by the rest of the device.
pub trait Peripherals {
    /// Apply the `0100wxyz` bit field: w = power, x = pull-ups, y = AUX, z = CS.
    fn configure(&mut self, bits: u8);

    /// Handle a `0101xxxx` opcode and return the reply byte.
    ///
    /// Only some hardware variants have this; the default reports it as unsupported.
    fn pullup_control(&mut self, command: u8) -> Option<u8> {
        let _ = command;
        None
    }

    fn set_aux(&mut self, state: AuxState);

    fn read_aux(&mut self) -> bool;

    fn assign_aux(&mut self, line: AuxLine);
}

/// Decoded opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    Identify,
    Start,
    Stop,
    Read,
    Ack,
    Nack,
    WriteThenRead,
    Aux,
    Sniff,
    /// Number of bytes, 1..=16.
    BulkWrite(u8),
    Peripherals(u8),
    PullUp(u8),
    Speed(Speed),
    Unknown(u8),
}

impl From<u8> for Command {
    fn from(opcode: u8) -> Self {
        match opcode >> 4 {
            0x0 => match opcode {
                0x00 => Command::Reset,
                0x01 => Command::Identify,
                0x02 => Command::Start,
                0x03 => Command::Stop,
                0x04 => Command::Read,
                0x06 => Command::Ack,
                0x07 => Command::Nack,
                0x08 => Command::WriteThenRead,
                0x09 => Command::Aux,
                0x0f => Command::Sniff,
                _ => Command::Unknown(opcode),
            },
            0x1 => Command::BulkWrite((opcode & 0x0f) + 1),
            0x4 => Command::Peripherals(opcode),
            0x5 => Command::PullUp(opcode),
            0x6 => Command::Speed(Speed::from_bits(opcode)),
            _ => Command::Unknown(opcode),
        }
    }
}

type ChannelError<C> = ReadExactError<<C as embedded_io::ErrorType>::Error>;

fn read_byte<C: Read>(channel: &mut C) -> Result<u8, ChannelError<C>> {
    let mut byte = [0u8];
    channel.read_exact(&mut byte)?;
    Ok(byte[0])
}

fn read_u16<C: Read>(channel: &mut C) -> Result<u16, ChannelError<C>> {
    let mut bytes = [0u8; 2];
    channel.read_exact(&mut bytes)?;
    Ok(u16::from_be_bytes(bytes))
}

fn send<C: Write>(channel: &mut C, bytes: &[u8]) -> Result<(), ChannelError<C>> {
    channel.write_all(bytes).map_err(ReadExactError::Other)
}

fn report<C: Write>(channel: &mut C, status: ResultStatus) -> Result<(), ChannelError<C>> {
    send(channel, &[status.report_byte()])
}

fn success(ok: bool) -> ResultStatus {
    if ok {
        ResultStatus {
            success: true,
            acknowledged: false,
        }
    } else {
        ResultStatus::FAILURE
    }
}

/// Interpreter of the binary protocol.
///
/// Owns the engine for the duration of the session, plus the peripheral collaborator and the
/// edge queue the sniffer reads from.
pub struct Dispatcher<B, P, Q, const BUF: usize = DEFAULT_BUFFER_SIZE> {
    engine: Engine<B>,
    peripherals: P,
    edges: Q,
    buffer: [u8; BUF],
}

impl<B, P, Q, const BUF: usize> Dispatcher<B, P, Q, BUF>
where
    B: Backend,
    P: Peripherals,
    Q: EdgeQueue,
{
    pub fn new(engine: Engine<B>, peripherals: P, edges: Q) -> Self {
        Self {
            engine,
            peripherals,
            edges,
            buffer: [0; BUF],
        }
    }

    pub fn engine(&self) -> &Engine<B> {
        &self.engine
    }

    pub fn peripherals(&self) -> &P {
        &self.peripherals
    }

    pub fn free(self) -> (Engine<B>, P, Q) {
        (self.engine, self.peripherals, self.edges)
    }

    /// Announce the protocol and process commands until the host sends `0x00`.
    pub fn run<C>(&mut self, channel: &mut C) -> Result<(), ChannelError<C>>
    where
        C: Read + ReadReady + Write + WriteReady,
    {
        if let Err(e) = self.engine.setup() {
            log::warn!("binary mode setup failed: {}", e);
        }
        send(channel, IDENTIFIER)?;

        loop {
            let opcode = read_byte(channel)?;
            if !self.dispatch(opcode, channel)? {
                log::debug!("leaving binary mode");
                return Ok(());
            }
        }
    }

    /// Execute one opcode.  Returns `false` when the session should end.
    pub fn dispatch<C>(&mut self, opcode: u8, channel: &mut C) -> Result<bool, ChannelError<C>>
    where
        C: Read + ReadReady + Write + WriteReady,
    {
        match Command::from(opcode) {
            Command::Reset => return Ok(false),
            Command::Identify => send(channel, IDENTIFIER)?,
            Command::Start => {
                let result = self.engine.start();
                if let Err(e) = &result {
                    log::debug!("start: {}", e);
                }
                report(channel, success(result.is_ok()))?;
            }
            Command::Stop => {
                let result = self.engine.stop();
                report(channel, success(result.is_ok()))?;
            }
            Command::Read => {
                let byte = self.engine.read().unwrap_or_else(|e| {
                    log::debug!("read: {}", e);
                    0x00
                });
                send(channel, &[byte])?;
            }
            Command::Ack => {
                let result = self.engine.send_ack(Ack::Ack);
                report(channel, success(result.is_ok()))?;
            }
            Command::Nack => {
                let result = self.engine.send_ack(Ack::Nack);
                report(channel, success(result.is_ok()))?;
            }
            Command::WriteThenRead => self.write_then_read(channel)?,
            Command::Aux => self.aux(channel)?,
            Command::Sniff => self.sniff(channel)?,
            Command::BulkWrite(count) => self.bulk_write(count, channel)?,
            Command::Peripherals(bits) => {
                self.peripherals.configure(bits);
                report(channel, success(true))?;
            }
            Command::PullUp(command) => match self.peripherals.pullup_control(command) {
                Some(reply) => send(channel, &[reply])?,
                None => report(channel, ResultStatus::FAILURE)?,
            },
            Command::Speed(speed) => {
                let result = self.engine.set_speed(speed);
                report(channel, success(result.is_ok()))?;
            }
            Command::Unknown(opcode) => {
                log::warn!("{}", Error::<B::Error>::UnknownCommand(opcode));
                report(channel, ResultStatus::FAILURE)?;
            }
        }
        Ok(true)
    }

    fn bulk_write<C: Read + Write>(
        &mut self,
        count: u8,
        channel: &mut C,
    ) -> Result<(), ChannelError<C>> {
        report(channel, success(true))?;
        for _ in 0..count {
            let byte = read_byte(channel)?;
            let ack = match self.engine.write(byte) {
                Ok(status) if status.acknowledged => Ack::Ack,
                Ok(_) => Ack::Nack,
                Err(e) => {
                    log::debug!("bulk write: {}", e);
                    Ack::Nack
                }
            };
            send(channel, &[ack.bit()])?;
        }
        Ok(())
    }

    fn check_capacity(write_count: usize, read_count: usize) -> Result<(), Error<B::Error>> {
        let requested = write_count.max(read_count);
        if requested > BUF {
            return Err(Error::BufferOverflow {
                requested,
                capacity: BUF,
            });
        }
        Ok(())
    }

    fn write_then_read<C: Read + Write>(&mut self, channel: &mut C) -> Result<(), ChannelError<C>> {
        let write_count = read_u16(channel)? as usize;
        let read_count = read_u16(channel)? as usize;

        if let Err(e) = Self::check_capacity(write_count, read_count) {
            log::warn!("write-then-read: {}", e);
            return report(channel, ResultStatus::FAILURE);
        }

        channel.read_exact(&mut self.buffer[..write_count])?;

        match self.transfer(write_count, read_count) {
            Ok(()) => {
                report(channel, success(true))?;
                send(channel, &self.buffer[..read_count])
            }
            Err(e) => {
                // TODO: decide whether a NACK abort should release the bus with a stop
                log::debug!("write-then-read aborted: {}", e);
                report(channel, ResultStatus::FAILURE)
            }
        }
    }

    /// Bus part of write-then-read.  Read bytes replace the written ones in the buffer.
    fn transfer(&mut self, write_count: usize, read_count: usize) -> Result<(), Error<B::Error>> {
        self.engine.start()?;

        for i in 0..write_count {
            if !self.engine.write(self.buffer[i])?.acknowledged {
                return Err(Error::Nack);
            }
        }

        for i in 0..read_count {
            self.buffer[i] = self.engine.read()?;
            let ack = if i + 1 < read_count { Ack::Ack } else { Ack::Nack };
            self.engine.send_ack(ack)?;
        }

        self.engine.stop()
    }

    fn aux<C: Read + Write>(&mut self, channel: &mut C) -> Result<(), ChannelError<C>> {
        report(channel, success(true))?;

        let reply = match read_byte(channel)? {
            0x00 => {
                self.peripherals.set_aux(AuxState::Low);
                0x01
            }
            0x01 => {
                self.peripherals.set_aux(AuxState::High);
                0x01
            }
            0x02 => {
                self.peripherals.set_aux(AuxState::HighImpedance);
                0x01
            }
            0x03 => self.peripherals.read_aux() as u8,
            0x10 => {
                self.peripherals.assign_aux(AuxLine::Aux);
                0x01
            }
            0x20 => {
                self.peripherals.assign_aux(AuxLine::ChipSelect);
                0x01
            }
            other => {
                log::warn!("unknown aux sub-command {:#04x}", other);
                0x01
            }
        };
        send(channel, &[reply])
    }

    fn sniff<C>(&mut self, channel: &mut C) -> Result<(), ChannelError<C>>
    where
        C: Read + ReadReady + Write + WriteReady,
    {
        match self.engine.sniff(OutputMode::Machine, &self.edges, channel) {
            Ok(_) => report(channel, success(true)),
            Err(SniffError::Bus(e)) => {
                log::warn!("sniffer: cannot release bus: {}", e);
                report(channel, ResultStatus::FAILURE)
            }
            Err(SniffError::Channel(e)) => Err(ReadExactError::Other(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuxLine, AuxState, Command, Dispatcher, IDENTIFIER};
    use crate::mock::{Call, MockBackend, Pipe, RecordingPeripherals};
    use crate::{Ack, Engine, Lines, Speed};
    use core::cell::RefCell;
    use heapless::Deque;

    type Edges = RefCell<Deque<Lines, 256>>;
    type TestDispatcher<const BUF: usize> =
        Dispatcher<MockBackend, RecordingPeripherals, Edges, BUF>;

    fn dispatcher<const BUF: usize>(backend: MockBackend) -> TestDispatcher<BUF> {
        Dispatcher::new(
            Engine::new(backend),
            RecordingPeripherals::default(),
            RefCell::new(Deque::new()),
        )
    }

    /// Run a session and return everything sent after the greeting.
    fn session<const BUF: usize>(d: &mut TestDispatcher<BUF>, input: &[u8]) -> Vec<u8> {
        let mut pipe = Pipe::new(input);
        d.run(&mut pipe).unwrap();
        assert_eq!(&pipe.output[..4], IDENTIFIER);
        pipe.output.split_off(4)
    }

    #[test]
    fn decode_opcodes() {
        assert_eq!(Command::from(0x00), Command::Reset);
        assert_eq!(Command::from(0x10), Command::BulkWrite(1));
        assert_eq!(Command::from(0x1f), Command::BulkWrite(16));
        assert_eq!(Command::from(0x4c), Command::Peripherals(0x4c));
        assert_eq!(Command::from(0x63), Command::Speed(Speed::Khz400));
        assert_eq!(Command::from(0x05), Command::Unknown(0x05));
        assert_eq!(Command::from(0x0a), Command::Unknown(0x0a));
        assert_eq!(Command::from(0x20), Command::Unknown(0x20));
    }

    #[test]
    fn identify_start_stop() {
        let mut d = dispatcher::<16>(MockBackend::new());
        let reply = session(&mut d, &[0x01, 0x02, 0x03, 0x00]);
        assert_eq!(reply, b"I2C1\x01\x01");
        assert_eq!(d.engine().backend().bus_calls(), vec![Call::Start, Call::Stop]);
    }

    #[test]
    fn start_fault_reports_failure_and_continues() {
        let mut d = dispatcher::<16>(MockBackend::new().faulty());
        let reply = session(&mut d, &[0x02, 0x01, 0x00]);
        assert_eq!(reply, b"\x00I2C1");
    }

    #[test]
    fn read_ack_nack() {
        let mut d = dispatcher::<16>(MockBackend::new().with_reads(&[0x99, 0x77]));
        let reply = session(&mut d, &[0x04, 0x06, 0x04, 0x07, 0x00]);
        assert_eq!(reply, vec![0x99, 0x01, 0x77, 0x01]);
        assert_eq!(
            d.engine().backend().bus_calls(),
            vec![
                Call::Read,
                Call::SendAck(Ack::Ack),
                Call::Read,
                Call::SendAck(Ack::Nack)
            ]
        );
    }

    #[test]
    fn bulk_write_echoes_ack_bits() {
        let backend = MockBackend::new().with_acks(&[Ack::Ack, Ack::Ack, Ack::Nack]);
        let mut d = dispatcher::<16>(backend);
        let reply = session(&mut d, &[0x12, 0xa0, 0x00, 0x55, 0x00]);
        assert_eq!(reply, vec![0x01, 0x00, 0x00, 0x01]);
        assert_eq!(
            d.engine().backend().bus_calls(),
            vec![Call::Write(0xa0), Call::Write(0x00), Call::Write(0x55)]
        );
    }

    #[test]
    fn write_then_read() {
        let backend = MockBackend::new().acking().with_reads(&[0x11, 0x22, 0x33]);
        let mut d = dispatcher::<16>(backend);
        let reply = session(
            &mut d,
            &[0x08, 0x00, 0x02, 0x00, 0x03, 0xa0, 0x04, 0x00],
        );
        assert_eq!(reply, vec![0x01, 0x11, 0x22, 0x33]);
        assert_eq!(
            d.engine().backend().bus_calls(),
            vec![
                Call::Start,
                Call::Write(0xa0),
                Call::Write(0x04),
                Call::Read,
                Call::SendAck(Ack::Ack),
                Call::Read,
                Call::SendAck(Ack::Ack),
                Call::Read,
                Call::SendAck(Ack::Nack),
                Call::Stop,
            ]
        );
        assert!(!d.engine().ack_pending());
    }

    #[test]
    fn write_then_read_oversize_touches_nothing() {
        let mut d = dispatcher::<16>(MockBackend::new().acking());
        // 17 bytes to write, 1 to read; the payload is never consumed
        let reply = session(&mut d, &[0x08, 0x00, 0x11, 0x00, 0x01, 0x00]);
        assert_eq!(reply, vec![0x00]);
        assert!(d.engine().backend().bus_calls().is_empty());

        let mut d = dispatcher::<16>(MockBackend::new().acking());
        let reply = session(&mut d, &[0x08, 0x00, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(reply, vec![0x00]);
        assert!(d.engine().backend().bus_calls().is_empty());
    }

    #[test]
    fn write_then_read_fills_whole_buffer() {
        let mut d = dispatcher::<4>(MockBackend::new().acking().with_reads(&[9, 8, 7, 6]));
        let reply = session(
            &mut d,
            &[0x08, 0x00, 0x04, 0x00, 0x04, 0xa0, 0x01, 0x02, 0x03, 0x00],
        );
        assert_eq!(reply, vec![0x01, 9, 8, 7, 6]);
        let backend = d.engine().backend();
        assert_eq!(backend.count(Call::Start), 1);
        assert_eq!(backend.count(Call::Write(0x03)), 1);
        assert_eq!(backend.count(Call::Read), 4);
        assert_eq!(backend.count(Call::Stop), 1);
    }

    #[test]
    fn write_then_read_without_reads() {
        let mut d = dispatcher::<16>(MockBackend::new().acking());
        let reply = session(&mut d, &[0x08, 0x00, 0x02, 0x00, 0x00, 0xa0, 0x10, 0x00]);
        assert_eq!(reply, vec![0x01]);
        assert_eq!(
            d.engine().backend().bus_calls(),
            vec![Call::Start, Call::Write(0xa0), Call::Write(0x10), Call::Stop]
        );
    }

    #[test]
    fn write_then_read_without_writes() {
        let mut d = dispatcher::<16>(MockBackend::new().with_reads(&[0x5a, 0xa5]));
        let reply = session(&mut d, &[0x08, 0x00, 0x00, 0x00, 0x02, 0x00]);
        assert_eq!(reply, vec![0x01, 0x5a, 0xa5]);
        assert_eq!(
            d.engine().backend().bus_calls(),
            vec![
                Call::Start,
                Call::Read,
                Call::SendAck(Ack::Ack),
                Call::Read,
                Call::SendAck(Ack::Nack),
                Call::Stop,
            ]
        );
    }

    #[test]
    fn write_then_read_aborts_on_nack() {
        let backend = MockBackend::new().with_acks(&[Ack::Ack, Ack::Nack]);
        let mut d = dispatcher::<16>(backend);
        let reply = session(
            &mut d,
            &[0x08, 0x00, 0x03, 0x00, 0x02, 0xa0, 0x01, 0x02, 0x00],
        );
        assert_eq!(reply, vec![0x00]);
        // no third write, no reads, no forced stop
        assert_eq!(
            d.engine().backend().bus_calls(),
            vec![Call::Start, Call::Write(0xa0), Call::Write(0x01)]
        );
    }

    #[test]
    fn aux_sub_commands() {
        let mut d = dispatcher::<16>(MockBackend::new());
        let reply = session(
            &mut d,
            &[0x09, 0x00, 0x09, 0x02, 0x09, 0x03, 0x09, 0x20, 0x09, 0x7f, 0x00],
        );
        assert_eq!(
            reply,
            vec![0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x01, 0x01, 0x01, 0x01]
        );
        let peripherals = d.peripherals();
        assert_eq!(peripherals.aux, vec![AuxState::Low, AuxState::HighImpedance]);
        assert_eq!(peripherals.aux_line, Some(AuxLine::ChipSelect));
    }

    #[test]
    fn peripherals_pullups_and_speed() {
        let mut d = dispatcher::<16>(MockBackend::new());
        let reply = session(&mut d, &[0x4c, 0x51, 0x63, 0x00]);
        // no pull-up/ADC control on this variant
        assert_eq!(reply, vec![0x01, 0x00, 0x01]);
        assert_eq!(d.peripherals().configured, vec![0x4c]);
        assert_eq!(d.engine().backend().speed, Speed::Khz400);
        assert!(d.engine().backend().calls.contains(&Call::Speed(Speed::Khz400)));

        let (engine, mut peripherals, edges) = d.free();
        peripherals.pullup = Some(0x40);
        let mut d: Dispatcher<_, _, _, 16> = Dispatcher::new(engine, peripherals, edges);
        let reply = session(&mut d, &[0x53, 0x00]);
        assert_eq!(reply, vec![0x43]);
    }

    #[test]
    fn unknown_opcodes_do_not_end_session() {
        let mut d = dispatcher::<16>(MockBackend::new());
        let reply = session(&mut d, &[0x05, 0xf0, 0x2a, 0x01, 0x00]);
        assert_eq!(reply, b"\x00\x00\x00I2C1");
    }

    #[test]
    fn sniff_discards_stale_edges_and_restores_bus() {
        let queue: Edges = RefCell::new(Deque::new());
        // a complete frame captured before sniffing was requested
        for (sda, scl) in [(false, true), (true, true)] {
            queue.borrow_mut().push_back(Lines::new(sda, scl)).unwrap();
        }
        let engine = Engine::new(MockBackend::new());
        let mut d: Dispatcher<_, _, _, 16> =
            Dispatcher::new(engine, RecordingPeripherals::default(), &queue);

        let mut pipe = Pipe::new(&[0x0f, 0xff, 0x00]);
        d.run(&mut pipe).unwrap();
        assert_eq!(pipe.output, b"I2C1\x01");
        assert!(queue.borrow().is_empty());
        assert_eq!(
            d.engine().backend().calls,
            vec![Call::Setup, Call::Release, Call::Setup]
        );
    }
}
