//! Transport on top of a dedicated I2C master controller.
//!
//! The controller is abstracted as its request/busy flags: the backend requests a sequence
//! (start, stop, acknowledge, receive), then polls until the controller clears the request
//! again.  By default these polls are unbounded.  A spin limit turns every poll into a bounded
//! wait which fails with [`Error::Timeout`].
use crate::{Ack, Backend, Error, Lines, Speed, Target, TransportMode};
use core::convert::Infallible;

/// A bus sequence the controller runs on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Start,
    Stop,
    /// Drive the given acknowledgment bit.
    Acknowledge(Ack),
    /// Clock in one byte.
    Receive,
}

/// Register-level view of an I2C master controller.
pub trait Controller {
    /// Program the baud rate generator for `speed` and enable the controller.
    ///
    /// `speed` is an opaque selector; mapping it to register values is device specific.
    fn enable(&mut self, speed: Speed);

    /// Disable the controller and float SDA/SCL.
    fn disable(&mut self);

    /// Kick off a sequence.
    fn request(&mut self, request: Request);

    /// Whether the sequence kicked off by `request` is still running.
    fn is_busy(&mut self, request: Request) -> bool;

    /// Load the transmit register, which starts shifting the byte out.
    fn transmit(&mut self, byte: u8);

    /// Whether a transmission is still in progress.
    fn is_transmitting(&mut self) -> bool;

    /// Acknowledgment bit received for the last transmitted byte.
    fn ack_status(&mut self) -> Ack;

    /// Contents of the receive register.
    fn received(&mut self) -> u8;

    /// Whether the controller flagged a bus collision.
    fn collision(&mut self) -> bool;

    /// Current pin levels, read as plain inputs.
    fn lines(&mut self) -> Lines;
}

/// I2C master transport backed by one or two [`Controller`]s.
pub struct HardwareBackend<C> {
    external: C,
    onboard: Option<C>,
    target: Target,
    speed: Speed,
    spin_limit: Option<u32>,
}

impl<C: Controller> HardwareBackend<C> {
    pub fn new(external: C, speed: Speed) -> Self {
        Self {
            external,
            onboard: None,
            target: Target::External,
            speed,
            spin_limit: None,
        }
    }

    /// Add a second controller which can be selected with
    /// [`select_target(Target::Onboard)`][Backend::select_target].
    pub fn with_onboard(mut self, onboard: C) -> Self {
        self.onboard = Some(onboard);
        self
    }

    /// Bound every wait on the controller to `spins` polls.
    pub fn with_spin_limit(mut self, spins: u32) -> Self {
        self.spin_limit = Some(spins);
        self
    }

    pub fn free(self) -> (C, Option<C>) {
        (self.external, self.onboard)
    }

    fn active(&mut self) -> &mut C {
        match (self.target, self.onboard.as_mut()) {
            (Target::Onboard, Some(onboard)) => onboard,
            _ => &mut self.external,
        }
    }

    fn wait_while<F>(&mut self, mut busy: F) -> Result<(), Error<Infallible>>
    where
        F: FnMut(&mut C) -> bool,
    {
        let limit = self.spin_limit;
        let controller = self.active();
        let mut spins = 0u32;
        while busy(controller) {
            if let Some(limit) = limit {
                if spins >= limit {
                    log::warn!("controller still busy after {} polls", spins);
                    return Err(Error::Timeout);
                }
                spins += 1;
            }
        }
        Ok(())
    }

    fn run(&mut self, request: Request) -> Result<(), Error<Infallible>> {
        self.active().request(request);
        self.wait_while(|c| c.is_busy(request))
    }
}

impl<C: Controller> Backend for HardwareBackend<C> {
    type Error = Infallible;

    fn mode(&self) -> TransportMode {
        TransportMode::Hardware
    }

    fn setup(&mut self) -> Result<(), Error<Infallible>> {
        let speed = self.speed;
        self.active().enable(speed);
        Ok(())
    }

    fn release(&mut self) -> Result<Lines, Error<Infallible>> {
        let controller = self.active();
        controller.disable();
        Ok(controller.lines())
    }

    fn set_speed(&mut self, speed: Speed) -> Result<(), Error<Infallible>> {
        self.speed = speed;
        self.setup()
    }

    fn start(&mut self) -> Result<(), Error<Infallible>> {
        self.run(Request::Start)?;
        if self.active().collision() {
            log::debug!("start: bus collision");
            return Err(Error::BusFault);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Error<Infallible>> {
        self.run(Request::Stop)
    }

    fn write_byte(&mut self, byte: u8) -> Result<Ack, Error<Infallible>> {
        self.active().transmit(byte);
        self.wait_while(|c| c.is_transmitting())?;
        Ok(self.active().ack_status())
    }

    fn read_byte(&mut self) -> Result<u8, Error<Infallible>> {
        self.run(Request::Receive)?;
        Ok(self.active().received())
    }

    fn send_ack(&mut self, ack: Ack) -> Result<(), Error<Infallible>> {
        self.run(Request::Acknowledge(ack))
    }

    fn target(&self) -> Option<Target> {
        Some(self.target)
    }

    fn select_target(&mut self, target: Target) -> Result<(), Error<Infallible>> {
        let speed = self.speed;
        match (target, self.onboard.as_mut()) {
            (Target::External, onboard) => {
                if let Some(onboard) = onboard {
                    onboard.disable();
                }
                self.external.enable(speed);
            }
            (Target::Onboard, Some(onboard)) => {
                onboard.enable(speed);
                self.external.disable();
            }
            (Target::Onboard, None) => return Err(Error::Unsupported),
        }
        self.target = target;
        Ok(())
    }
}
