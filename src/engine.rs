//! Transaction-level I2C master on top of a [`Backend`].
//!
//! The engine keeps track of the acknowledgment bit belonging to the last transferred byte.
//! After a [`read()`][Engine::read] the master still owes the slave an ACK or NACK; after a
//! [`write()`][Engine::write] the slave's bit has been received but not yet looked at by the
//! next operation.  Both count as "pending".  Whichever operation comes next consumes it, and
//! only an owed bit is actually clocked onto the bus:
//!
//! | next operation | owed bit is flushed as |
//! | --- | --- |
//! | `start()` / `stop()` | NACK |
//! | `write()` / `read()` | ACK |
//! | `send_ack(x)` | `x` |
use crate::{Ack, Backend, Direction, Error, Lines, ResultStatus, Speed, Target, TransportMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    /// Slave's bit after a write, nothing to clock out.
    Received,
    /// Master's bit after a read, not yet clocked out.
    Owed,
}

/// Snapshot of the engine's session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineState {
    pub mode: TransportMode,
    pub ack_pending: bool,
    pub target_variant: Option<Target>,
}

/// A device which answered during an [`address scan`][Engine::scan].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Found {
    /// 7-bit address.
    pub address: u8,
    pub direction: Direction,
}

impl Found {
    fn from_value(value: u8) -> Self {
        Self {
            address: value >> 1,
            direction: if value & 1 == 0 {
                Direction::Write
            } else {
                Direction::Read
            },
        }
    }

    /// The combined address byte that was acknowledged.
    pub fn value(&self) -> u8 {
        (self.address << 1) | (self.direction == Direction::Read) as u8
    }
}

/// I2C master engine.
pub struct Engine<B> {
    backend: B,
    pending: Pending,
}

impl<B: Backend> Engine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            pending: Pending::None,
        }
    }

    /// Destroy the engine and hand back the backend.
    pub fn free(self) -> B {
        self.backend
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn mode(&self) -> TransportMode {
        self.backend.mode()
    }

    pub fn ack_pending(&self) -> bool {
        self.pending != Pending::None
    }

    pub fn state(&self) -> EngineState {
        EngineState {
            mode: self.backend.mode(),
            ack_pending: self.ack_pending(),
            target_variant: self.backend.target(),
        }
    }

    /// Bring the backend into a usable state and forget any pending acknowledgment.
    pub fn setup(&mut self) -> Result<(), Error<B::Error>> {
        self.pending = Pending::None;
        self.backend.setup()
    }

    /// Float both lines, e.g. before sniffing, and return their levels.
    pub fn release(&mut self) -> Result<Lines, Error<B::Error>> {
        self.pending = Pending::None;
        self.backend.release()
    }

    pub fn set_speed(&mut self, speed: Speed) -> Result<(), Error<B::Error>> {
        self.backend.set_speed(speed)
    }

    pub fn select_target(&mut self, target: Target) -> Result<(), Error<B::Error>> {
        self.pending = Pending::None;
        self.backend.select_target(target)
    }

    fn flush(&mut self, ack: Ack) -> Result<(), Error<B::Error>> {
        let pending = core::mem::replace(&mut self.pending, Pending::None);
        if pending == Pending::Owed {
            self.backend.send_ack(ack)?;
        }
        Ok(())
    }

    /// Issue a start condition, terminating an unfinished read with a NACK first.
    pub fn start(&mut self) -> Result<(), Error<B::Error>> {
        self.flush(Ack::Nack)?;
        self.backend.start()
    }

    /// Issue a stop condition, terminating an unfinished read with a NACK first.
    pub fn stop(&mut self) -> Result<(), Error<B::Error>> {
        self.flush(Ack::Nack)?;
        self.backend.stop()
    }

    /// Transmit one byte and report whether the slave acknowledged it.
    pub fn write(&mut self, byte: u8) -> Result<ResultStatus, Error<B::Error>> {
        self.flush(Ack::Ack)?;
        let ack = self.backend.write_byte(byte)?;
        self.pending = Pending::Received;
        Ok(ResultStatus::acknowledged(ack))
    }

    /// Receive one byte.
    ///
    /// The acknowledgment is left pending: either call [`send_ack()`][Engine::send_ack]
    /// explicitly or let the next operation flush it.
    pub fn read(&mut self) -> Result<u8, Error<B::Error>> {
        self.flush(Ack::Ack)?;
        let byte = self.backend.read_byte()?;
        self.pending = Pending::Owed;
        Ok(byte)
    }

    /// Clock out an explicit ACK or NACK, consuming whatever was pending.
    pub fn send_ack(&mut self, ack: Ack) -> Result<(), Error<B::Error>> {
        self.pending = Pending::None;
        self.backend.send_ack(ack)
    }

    /// Probe all 256 address bytes and call `on_found` for each one that is acknowledged.
    ///
    /// Read addresses which answer get one dummy read terminated by a NACK so the device
    /// lets go of SDA before the stop.  Before probing, both lines have to idle high;
    /// otherwise the scan is aborted with [`Error::BusFault`] without touching the bus.
    /// A bus error during probing issues a stop and ends the scan with that error.
    ///
    /// Returns the number of acknowledged address bytes.
    pub fn scan<F>(&mut self, mut on_found: F) -> Result<usize, Error<B::Error>>
    where
        F: FnMut(Found),
    {
        let lines = self.release()?;
        if !lines.is_idle() {
            log::warn!(
                "scan aborted: SDA {} SCL {}",
                lines.sda as u8,
                lines.scl as u8
            );
            return Err(Error::BusFault);
        }
        self.setup()?;

        let mut hits = 0;
        for value in 0..=u8::MAX {
            let found = match self.probe(value) {
                Ok(found) => found,
                Err(e) => {
                    log::debug!("scan aborted at {:#04x}: {}", value, e);
                    // best effort, the probe's error is what gets reported
                    let _ = self.stop();
                    return Err(e);
                }
            };
            if let Some(found) = found {
                log::debug!("scan: {:#04x} answered ({:?})", found.address, found.direction);
                on_found(found);
                hits += 1;
            }
            self.stop()?;
        }
        Ok(hits)
    }

    /// Address one value of the scan, leaving the transaction open.
    fn probe(&mut self, value: u8) -> Result<Option<Found>, Error<B::Error>> {
        self.start()?;
        if !self.write(value)?.acknowledged {
            return Ok(None);
        }
        let found = Found::from_value(value);
        if found.direction == Direction::Read {
            self.read()?;
            self.send_ack(Ack::Nack)?;
        }
        Ok(Some(found))
    }
}
