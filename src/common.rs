use crate::Error;

/// Primitive bus operations every transport has to provide.
///
/// All primitives block until the backend's own completion condition is met.  Implementations
/// must not be driven concurrently; the [`Engine`][crate::Engine] owning a backend is the only
/// caller.
pub trait Backend {
    /// Error of the underlying lines or registers.
    type Error: core::fmt::Debug;

    /// Which kind of transport this is.
    fn mode(&self) -> TransportMode;

    /// (Re)initialise the backend so that the next [`start()`][Backend::start] can drive the
    /// bus.
    fn setup(&mut self) -> Result<(), Error<Self::Error>>;

    /// Let go of both lines and report the levels they settle at.
    ///
    /// The hardware backend disables its controller here.  After a release, only
    /// [`setup()`][Backend::setup] brings the backend back into a usable state.
    fn release(&mut self) -> Result<Lines, Error<Self::Error>>;

    /// Reconfigure the bus clock.
    fn set_speed(&mut self, speed: Speed) -> Result<(), Error<Self::Error>>;

    /// Issue a start (or repeated start) condition.
    ///
    /// Fails with [`Error::BusFault`] when the lines cannot be released high.
    fn start(&mut self) -> Result<(), Error<Self::Error>>;

    /// Issue a stop condition.
    fn stop(&mut self) -> Result<(), Error<Self::Error>>;

    /// Clock out one byte MSB first and sample the receiver's acknowledgment bit.
    fn write_byte(&mut self, byte: u8) -> Result<Ack, Error<Self::Error>>;

    /// Clock in one byte MSB first.  The acknowledgment bit is left to
    /// [`send_ack()`][Backend::send_ack].
    fn read_byte(&mut self) -> Result<u8, Error<Self::Error>>;

    /// Drive the acknowledgment bit after a received byte.
    fn send_ack(&mut self, ack: Ack) -> Result<(), Error<Self::Error>>;

    /// Currently addressed controller, for backends which have more than one.
    fn target(&self) -> Option<Target> {
        None
    }

    /// Switch to another controller.
    fn select_target(&mut self, target: Target) -> Result<(), Error<Self::Error>> {
        let _ = target;
        Err(Error::Unsupported)
    }
}

impl<B: Backend + ?Sized> Backend for &mut B {
    type Error = B::Error;

    fn mode(&self) -> TransportMode {
        (**self).mode()
    }
    fn setup(&mut self) -> Result<(), Error<Self::Error>> {
        (**self).setup()
    }
    fn release(&mut self) -> Result<Lines, Error<Self::Error>> {
        (**self).release()
    }
    fn set_speed(&mut self, speed: Speed) -> Result<(), Error<Self::Error>> {
        (**self).set_speed(speed)
    }
    fn start(&mut self) -> Result<(), Error<Self::Error>> {
        (**self).start()
    }
    fn stop(&mut self) -> Result<(), Error<Self::Error>> {
        (**self).stop()
    }
    fn write_byte(&mut self, byte: u8) -> Result<Ack, Error<Self::Error>> {
        (**self).write_byte(byte)
    }
    fn read_byte(&mut self) -> Result<u8, Error<Self::Error>> {
        (**self).read_byte()
    }
    fn send_ack(&mut self, ack: Ack) -> Result<(), Error<Self::Error>> {
        (**self).send_ack(ack)
    }
    fn target(&self) -> Option<Target> {
        (**self).target()
    }
    fn select_target(&mut self, target: Target) -> Result<(), Error<Self::Error>> {
        (**self).select_target(target)
    }
}

/// The bit a receiver drives on SDA during the ninth clock of a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// SDA pulled low: byte accepted, continue.
    Ack,
    /// SDA left high: byte rejected or end of read.
    Nack,
}

impl Ack {
    /// Decode from the sampled SDA level.
    pub fn from_level(sda_high: bool) -> Self {
        if sda_high {
            Ack::Nack
        } else {
            Ack::Ack
        }
    }

    /// SDA level which encodes this bit.
    pub fn level(self) -> bool {
        self == Ack::Nack
    }

    /// Raw bit value: 0 for ACK, 1 for NACK.
    pub fn bit(self) -> u8 {
        self.level() as u8
    }

    pub fn is_ack(self) -> bool {
        self == Ack::Ack
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Lines toggled in software.
    #[default]
    Software,
    /// Dedicated bus controller.
    Hardware,
}

/// Controller selection on hardware with more than one bus controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Controller wired to the user-facing SDA/SCL pins.
    #[default]
    External,
    /// Controller wired to on-board peripherals (e.g. an EEPROM).
    Onboard,
}

/// One of the four bus speed selectors.
///
/// The names describe the software transport.  The hardware backend treats the selector as an
/// opaque index into its own timing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Speed {
    /// ~5 kHz
    Khz5,
    /// ~50 kHz
    Khz50,
    /// ~100 kHz
    #[default]
    Khz100,
    /// ~400 kHz
    Khz400,
}

impl Speed {
    /// Decode from the two least significant bits of `bits`.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Speed::Khz5,
            1 => Speed::Khz50,
            2 => Speed::Khz100,
            _ => Speed::Khz400,
        }
    }

    /// Selector index, `0..=3`.
    pub fn selector(self) -> u8 {
        self as u8
    }
}

/// Sampled levels of both bus lines, `true` meaning high.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lines {
    pub sda: bool,
    pub scl: bool,
}

impl Lines {
    /// Both lines released and pulled up.
    pub const IDLE: Lines = Lines {
        sda: true,
        scl: true,
    };

    pub fn new(sda: bool, scl: bool) -> Self {
        Self { sda, scl }
    }

    pub fn is_idle(self) -> bool {
        self.sda && self.scl
    }
}

/// Outcome of a bus-facing operation, as reported to callers and over the binary protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultStatus {
    pub success: bool,
    pub acknowledged: bool,
}

impl ResultStatus {
    pub const FAILURE: ResultStatus = ResultStatus {
        success: false,
        acknowledged: false,
    };

    pub fn acknowledged(ack: Ack) -> Self {
        Self {
            success: true,
            acknowledged: ack.is_ack(),
        }
    }

    /// The single status byte of the binary protocol: `0x01` success, `0x00` failure.
    pub fn report_byte(self) -> u8 {
        self.success as u8
    }
}

/// Transfer direction encoded in the least significant bit of an address byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Write,
    Read,
}
