//! Test doubles shared by the unit tests.
use crate::protocol::{AuxLine, AuxState, Peripherals};
use crate::{Ack, Backend, Error, Lines, Speed, TransportMode};
use core::convert::Infallible;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Setup,
    Release,
    Speed(Speed),
    Start,
    Stop,
    Write(u8),
    Read,
    SendAck(Ack),
}

impl Call {
    pub fn is_bus(&self) -> bool {
        !matches!(self, Call::Setup | Call::Release | Call::Speed(_))
    }
}

/// Backend recording every primitive, answering from scripted acks and bytes.
pub struct MockBackend {
    pub calls: Vec<Call>,
    pub speed: Speed,
    pub lines: Lines,
    mode: TransportMode,
    acks: VecDeque<Ack>,
    default_ack: Ack,
    reads: VecDeque<u8>,
    fault_on_start: bool,
    fail_release: bool,
}

impl MockBackend {
    /// Nobody on the bus: every write is NACKed, reads return 0xff.
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            speed: Speed::default(),
            lines: Lines::IDLE,
            mode: TransportMode::Software,
            acks: VecDeque::new(),
            default_ack: Ack::Nack,
            reads: VecDeque::new(),
            fault_on_start: false,
            fail_release: false,
        }
    }

    /// Every write without a scripted answer is ACKed.
    pub fn acking(mut self) -> Self {
        self.default_ack = Ack::Ack;
        self
    }

    pub fn with_acks(mut self, acks: &[Ack]) -> Self {
        self.acks.extend(acks.iter().copied());
        self
    }

    pub fn with_reads(mut self, bytes: &[u8]) -> Self {
        self.reads.extend(bytes.iter().copied());
        self
    }

    pub fn with_mode(mut self, mode: TransportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_lines(mut self, lines: Lines) -> Self {
        self.lines = lines;
        self
    }

    pub fn faulty(mut self) -> Self {
        self.fault_on_start = true;
        self
    }

    /// `release()` fails with [`Error::Unsupported`].
    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub fn bus_calls(&self) -> Vec<Call> {
        self.calls.iter().copied().filter(Call::is_bus).collect()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }
}

impl Backend for MockBackend {
    type Error = Infallible;

    fn mode(&self) -> TransportMode {
        self.mode
    }

    fn setup(&mut self) -> Result<(), Error<Infallible>> {
        self.calls.push(Call::Setup);
        Ok(())
    }

    fn release(&mut self) -> Result<Lines, Error<Infallible>> {
        self.calls.push(Call::Release);
        if self.fail_release {
            return Err(Error::Unsupported);
        }
        Ok(self.lines)
    }

    fn set_speed(&mut self, speed: Speed) -> Result<(), Error<Infallible>> {
        self.calls.push(Call::Speed(speed));
        self.speed = speed;
        Ok(())
    }

    fn start(&mut self) -> Result<(), Error<Infallible>> {
        self.calls.push(Call::Start);
        if self.fault_on_start {
            return Err(Error::BusFault);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Error<Infallible>> {
        self.calls.push(Call::Stop);
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> Result<Ack, Error<Infallible>> {
        self.calls.push(Call::Write(byte));
        Ok(self.acks.pop_front().unwrap_or(self.default_ack))
    }

    fn read_byte(&mut self) -> Result<u8, Error<Infallible>> {
        self.calls.push(Call::Read);
        Ok(self.reads.pop_front().unwrap_or(0xff))
    }

    fn send_ack(&mut self, ack: Ack) -> Result<(), Error<Infallible>> {
        self.calls.push(Call::SendAck(ack));
        Ok(())
    }
}

/// In-memory serial link.
#[derive(Default)]
pub struct Pipe {
    pub input: VecDeque<u8>,
    pub output: Vec<u8>,
}

impl Pipe {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            output: Vec::new(),
        }
    }
}

impl embedded_io::ErrorType for Pipe {
    type Error = Infallible;
}

impl embedded_io::Read for Pipe {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;
        for slot in buf.iter_mut() {
            match self.input.pop_front() {
                Some(byte) => *slot = byte,
                None => break,
            }
            n += 1;
        }
        Ok(n)
    }
}

impl embedded_io::ReadReady for Pipe {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.input.is_empty())
    }
}

impl embedded_io::Write for Pipe {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl embedded_io::WriteReady for Pipe {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Peripheral collaborator remembering what it was asked to do.
#[derive(Default)]
pub struct RecordingPeripherals {
    pub configured: Vec<u8>,
    pub pullup: Option<u8>,
    pub aux: Vec<AuxState>,
    pub aux_line: Option<AuxLine>,
    pub aux_level: bool,
}

impl Peripherals for RecordingPeripherals {
    fn configure(&mut self, bits: u8) {
        self.configured.push(bits);
    }

    fn pullup_control(&mut self, command: u8) -> Option<u8> {
        self.pullup.map(|reply| reply ^ (command & 0x0f))
    }

    fn set_aux(&mut self, state: AuxState) {
        self.aux.push(state);
    }

    fn read_aux(&mut self) -> bool {
        self.aux_level
    }

    fn assign_aux(&mut self, line: AuxLine) {
        self.aux_line = Some(line);
    }
}
