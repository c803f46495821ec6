use core::fmt;

/// Errors of the engine and its backends.
///
/// `E` is the error of the underlying lines (GPIO pins, register bus, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// The bus lines could not be released to their idle-high state.  Usually a short or
    /// missing pull-ups.
    BusFault,
    /// A bounded wait for the hardware controller ran out.
    Timeout,
    /// The addressed device did not acknowledge a byte.
    Nack,
    /// A transfer asked for more bytes than the buffer holds.
    BufferOverflow { requested: usize, capacity: usize },
    /// An opcode which is not part of the binary protocol.
    UnknownCommand(u8),
    /// The backend does not implement this operation.
    Unsupported,
    /// Error of the underlying lines.
    Line(E),
}

impl<E> Error<E> {
    /// Convert the line error, leaving every other variant untouched.
    pub fn map_line<F, M: FnOnce(E) -> F>(self, f: M) -> Error<F> {
        match self {
            Error::BusFault => Error::BusFault,
            Error::Timeout => Error::Timeout,
            Error::Nack => Error::Nack,
            Error::BufferOverflow {
                requested,
                capacity,
            } => Error::BufferOverflow {
                requested,
                capacity,
            },
            Error::UnknownCommand(op) => Error::UnknownCommand(op),
            Error::Unsupported => Error::Unsupported,
            Error::Line(e) => Error::Line(f(e)),
        }
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BusFault => f.write_str("bus lines stuck low (short or no pull-ups)"),
            Error::Timeout => f.write_str("bus controller did not complete in time"),
            Error::Nack => f.write_str("device did not acknowledge"),
            Error::BufferOverflow {
                requested,
                capacity,
            } => write!(
                f,
                "transfer of {} bytes exceeds buffer of {} bytes",
                requested, capacity
            ),
            Error::UnknownCommand(op) => write!(f, "unknown command {:#04x}", op),
            Error::Unsupported => f.write_str("operation not supported by this transport"),
            Error::Line(e) => write!(f, "line error: {:?}", e),
        }
    }
}

impl<E: fmt::Debug> embedded_hal::i2c::Error for Error<E> {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

        match self {
            Error::BusFault => ErrorKind::Bus,
            Error::Nack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            Error::BufferOverflow { .. } => ErrorKind::Overrun,
            Error::Line(_) => ErrorKind::Bus,
            Error::Timeout | Error::UnknownCommand(_) | Error::Unsupported => ErrorKind::Other,
        }
    }
}
