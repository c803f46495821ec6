use crate::{Ack, Backend, Config, Error, Lines, Speed, Target, TransportMode};

/// One of two backends, chosen once from a [`Config`].
pub enum Transport<S, H> {
    Software(S),
    Hardware(H),
}

/// Line error of either backend inside a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError<S, H> {
    Software(S),
    Hardware(H),
}

impl<S, H> Transport<S, H>
where
    S: Backend,
    H: Backend,
{
    /// Build only the backend `config` asks for.
    pub fn from_config<FS, FH>(config: &Config, software: FS, hardware: FH) -> Self
    where
        FS: FnOnce(Speed) -> S,
        FH: FnOnce(Speed) -> H,
    {
        match config.mode {
            TransportMode::Software => Transport::Software(software(config.speed)),
            TransportMode::Hardware => Transport::Hardware(hardware(config.speed)),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $b:ident => $e:expr) => {
        match $self {
            Transport::Software($b) => $e.map_err(|e| e.map_line(TransportError::Software)),
            Transport::Hardware($b) => $e.map_err(|e| e.map_line(TransportError::Hardware)),
        }
    };
}

impl<S, H> Backend for Transport<S, H>
where
    S: Backend,
    H: Backend,
{
    type Error = TransportError<S::Error, H::Error>;

    fn mode(&self) -> TransportMode {
        match self {
            Transport::Software(b) => b.mode(),
            Transport::Hardware(b) => b.mode(),
        }
    }

    fn setup(&mut self) -> Result<(), Error<Self::Error>> {
        dispatch!(self, b => b.setup())
    }

    fn release(&mut self) -> Result<Lines, Error<Self::Error>> {
        dispatch!(self, b => b.release())
    }

    fn set_speed(&mut self, speed: Speed) -> Result<(), Error<Self::Error>> {
        dispatch!(self, b => b.set_speed(speed))
    }

    fn start(&mut self) -> Result<(), Error<Self::Error>> {
        dispatch!(self, b => b.start())
    }

    fn stop(&mut self) -> Result<(), Error<Self::Error>> {
        dispatch!(self, b => b.stop())
    }

    fn write_byte(&mut self, byte: u8) -> Result<Ack, Error<Self::Error>> {
        dispatch!(self, b => b.write_byte(byte))
    }

    fn read_byte(&mut self) -> Result<u8, Error<Self::Error>> {
        dispatch!(self, b => b.read_byte())
    }

    fn send_ack(&mut self, ack: Ack) -> Result<(), Error<Self::Error>> {
        dispatch!(self, b => b.send_ack(ack))
    }

    fn target(&self) -> Option<Target> {
        match self {
            Transport::Software(b) => b.target(),
            Transport::Hardware(b) => b.target(),
        }
    }

    fn select_target(&mut self, target: Target) -> Result<(), Error<Self::Error>> {
        dispatch!(self, b => b.select_target(target))
    }
}
