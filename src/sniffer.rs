//! Passive bus sniffer.
//!
//! The sniffer never drives the bus.  It reconstructs traffic purely from the sequence of line
//! levels sampled on every pin change:
//!
//! - SDA falling while SCL stays high opens a frame (`[`), SDA rising while SCL stays high
//!   closes it (`]`).
//! - Inside a frame, every rising SCL edge samples one data bit, MSB first.  The ninth rising
//!   edge samples the acknowledgment bit and emits the byte followed by `+` (ACK) or `-`
//!   (NACK).
//!
//! Bytes are rendered as two uppercase hex characters ([`OutputMode::Human`]) or as an escape
//! byte followed by the raw value ([`OutputMode::Machine`]).
use crate::edge::EdgeQueue;
use crate::{Ack, Backend, Engine, Error, Lines};
use embedded_io::{Read, ReadReady, Write, WriteReady};
use heapless::Deque;

/// Prefix of a raw byte value in machine-readable output.
pub const ESCAPE: u8 = b'\\';

const HEX: &[u8; 16] = b"0123456789ABCDEF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Two hex characters per byte.
    Human,
    /// [`ESCAPE`] followed by the raw byte.
    Machine,
}

/// Something the sniffer saw on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    FrameStart,
    FrameEnd,
    Byte { value: u8, ack: Ack },
}

/// Rendered form of one [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoded {
    buf: [u8; 3],
    len: usize,
}

impl Encoded {
    fn one(byte: u8) -> Self {
        Self {
            buf: [byte, 0, 0],
            len: 1,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Event {
    pub fn encode(self, mode: OutputMode) -> Encoded {
        match self {
            Event::FrameStart => Encoded::one(b'['),
            Event::FrameEnd => Encoded::one(b']'),
            Event::Byte { value, ack } => {
                let marker = if ack.is_ack() { b'+' } else { b'-' };
                let buf = match mode {
                    OutputMode::Human => [
                        HEX[(value >> 4) as usize],
                        HEX[(value & 0x0f) as usize],
                        marker,
                    ],
                    OutputMode::Machine => [ESCAPE, value, marker],
                };
                Encoded { buf, len: 3 }
            }
        }
    }
}

/// Edge-triggered byte reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffState {
    previous: Lines,
    in_frame: bool,
    bit_count: u8,
    byte_acc: u8,
}

impl SniffState {
    /// Start tracking from the levels the lines currently sit at.
    pub fn new(initial: Lines) -> Self {
        Self {
            previous: initial,
            in_frame: false,
            bit_count: 0,
            byte_acc: 0,
        }
    }

    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Data bits collected for the current byte.
    pub fn bit_count(&self) -> u8 {
        self.bit_count
    }

    /// Feed the line levels sampled after a pin change.
    pub fn on_edge(&mut self, now: Lines) -> Option<Event> {
        let before = core::mem::replace(&mut self.previous, now);

        if self.in_frame && !before.scl && now.scl {
            if self.bit_count < 8 {
                self.byte_acc = (self.byte_acc << 1) | now.sda as u8;
                self.bit_count += 1;
                return None;
            }
            let value = self.byte_acc;
            self.byte_acc = 0;
            self.bit_count = 0;
            return Some(Event::Byte {
                value,
                ack: Ack::from_level(now.sda),
            });
        }

        if before.scl && now.scl {
            if before.sda && !now.sda {
                self.in_frame = true;
                self.bit_count = 0;
                self.byte_acc = 0;
                return Some(Event::FrameStart);
            }
            if !before.sda && now.sda {
                self.in_frame = false;
                self.bit_count = 0;
                self.byte_acc = 0;
                return Some(Event::FrameEnd);
            }
        }

        None
    }
}

/// Sniffer session: the state machine plus an output ring of `OUT` bytes.
///
/// When the ring cannot take the next event, [`run()`][Sniffer::run] blocks until enough of it
/// has been written to the channel.  Edges arriving meanwhile wait in the [`EdgeQueue`].
pub struct Sniffer<const OUT: usize = 256> {
    state: SniffState,
    mode: OutputMode,
    ring: Deque<u8, OUT>,
}

impl<const OUT: usize> Sniffer<OUT> {
    pub fn new(mode: OutputMode, initial: Lines) -> Self {
        Self {
            state: SniffState::new(initial),
            mode,
            ring: Deque::new(),
        }
    }

    pub fn state(&self) -> &SniffState {
        &self.state
    }

    /// Process edges and stream the output until a byte arrives on `channel`.
    ///
    /// The terminating byte is consumed and returned.  All output produced so far is written
    /// out before returning.
    pub fn run<Q, C>(&mut self, edges: &Q, channel: &mut C) -> Result<u8, C::Error>
    where
        Q: EdgeQueue,
        C: Read + ReadReady + Write + WriteReady,
    {
        loop {
            while let Some(lines) = edges.pop() {
                if let Some(event) = self.state.on_edge(lines) {
                    self.emit(event, channel)?;
                }
            }

            self.drain(channel)?;

            if channel.read_ready()? {
                let mut byte = [0u8];
                if channel.read(&mut byte)? == 1 {
                    self.flush(channel)?;
                    return Ok(byte[0]);
                }
            }
        }
    }

    fn emit<C: Write>(&mut self, event: Event, channel: &mut C) -> Result<(), C::Error> {
        let encoded = event.encode(self.mode);
        let bytes = encoded.as_bytes();
        while self.ring.capacity() - self.ring.len() < bytes.len() {
            if self.ring.is_empty() {
                // ring smaller than one event
                return channel.write_all(bytes);
            }
            self.write_some(channel)?;
        }
        for &byte in bytes {
            // room was made above
            let _ = self.ring.push_back(byte);
        }
        Ok(())
    }

    fn write_some<C: Write>(&mut self, channel: &mut C) -> Result<usize, C::Error> {
        let (front, _) = self.ring.as_slices();
        if front.is_empty() {
            return Ok(0);
        }
        let written = channel.write(front)?;
        for _ in 0..written {
            self.ring.pop_front();
        }
        Ok(written)
    }

    /// Write out as much as the channel takes without blocking.
    fn drain<C: Write + WriteReady>(&mut self, channel: &mut C) -> Result<(), C::Error> {
        while !self.ring.is_empty() && channel.write_ready()? {
            self.write_some(channel)?;
        }
        Ok(())
    }

    fn flush<C: Write>(&mut self, channel: &mut C) -> Result<(), C::Error> {
        while !self.ring.is_empty() {
            self.write_some(channel)?;
        }
        channel.flush()
    }
}

/// Failure of [`Engine::sniff()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffError<B, C> {
    /// The bus could not be released; nothing was sniffed.
    Bus(Error<B>),
    Channel(C),
}

impl<B: Backend> Engine<B> {
    /// Release the bus, sniff it until a byte arrives on `channel`, then set the backend up
    /// again.
    ///
    /// Edges queued before the release are discarded.  Returns the terminating byte.
    pub fn sniff<Q, C>(
        &mut self,
        mode: OutputMode,
        edges: &Q,
        channel: &mut C,
    ) -> Result<u8, SniffError<B::Error, C::Error>>
    where
        Q: EdgeQueue,
        C: Read + ReadReady + Write + WriteReady,
    {
        let initial = self.release().map_err(SniffError::Bus)?;
        while edges.pop().is_some() {}

        let mut sniffer: Sniffer = Sniffer::new(mode, initial);
        let terminator = sniffer.run(edges, channel).map_err(SniffError::Channel)?;

        if let Err(e) = self.setup() {
            log::warn!("setup after sniffing failed: {}", e);
        }
        Ok(terminator)
    }
}
