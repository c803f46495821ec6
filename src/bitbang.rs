//! Software transport which toggles SDA and SCL directly.
//!
//! Both lines must be configured as open-drain outputs with pull-ups, so that setting a line
//! "high" releases it and reading it returns the actual bus level.  No clock stretching is
//! supported.
use crate::{Ack, Backend, Error, Lines, Speed, TransportMode};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

/// Bit-banged I2C master transport.
pub struct BitBang<SDA, SCL, D> {
    sda: SDA,
    scl: SCL,
    delay: D,
    half_period_us: u32,
}

impl<SDA, SCL, D> BitBang<SDA, SCL, D> {
    pub fn new(sda: SDA, scl: SCL, delay: D, speed: Speed) -> Self {
        Self {
            sda,
            scl,
            delay,
            half_period_us: half_period_us(speed),
        }
    }

    /// Give back the lines and the delay provider.
    pub fn free(self) -> (SDA, SCL, D) {
        (self.sda, self.scl, self.delay)
    }
}

fn half_period_us(speed: Speed) -> u32 {
    match speed {
        Speed::Khz5 => 100,
        Speed::Khz50 => 10,
        Speed::Khz100 => 5,
        Speed::Khz400 => 1,
    }
}

impl<SDA, SCL, D, E> BitBang<SDA, SCL, D>
where
    SDA: InputPin<Error = E> + OutputPin<Error = E>,
    SCL: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayNs,
    E: core::fmt::Debug,
{
    #[inline]
    fn set_sda(&mut self, high: bool) -> Result<(), Error<E>> {
        if high {
            self.sda.set_high().map_err(Error::Line)
        } else {
            self.sda.set_low().map_err(Error::Line)
        }
    }

    #[inline]
    fn set_scl(&mut self, high: bool) -> Result<(), Error<E>> {
        if high {
            self.scl.set_high().map_err(Error::Line)
        } else {
            self.scl.set_low().map_err(Error::Line)
        }
    }

    #[inline]
    fn wait(&mut self) {
        self.delay.delay_us(self.half_period_us);
    }

    fn sample(&mut self) -> Result<Lines, Error<E>> {
        let sda = self.sda.is_high().map_err(Error::Line)?;
        let scl = self.scl.is_high().map_err(Error::Line)?;
        Ok(Lines::new(sda, scl))
    }

    fn write_bit(&mut self, high: bool) -> Result<(), Error<E>> {
        self.set_sda(high)?;
        self.wait();
        self.set_scl(true)?;
        self.wait();
        self.set_scl(false)?;
        self.wait();
        Ok(())
    }

    fn read_bit(&mut self) -> Result<bool, Error<E>> {
        self.set_sda(true)?;
        self.wait();
        self.set_scl(true)?;
        self.wait();
        let level = self.sda.is_high().map_err(Error::Line)?;
        self.set_scl(false)?;
        self.wait();
        Ok(level)
    }
}

impl<SDA, SCL, D, E> Backend for BitBang<SDA, SCL, D>
where
    SDA: InputPin<Error = E> + OutputPin<Error = E>,
    SCL: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayNs,
    E: core::fmt::Debug,
{
    type Error = E;

    fn mode(&self) -> TransportMode {
        TransportMode::Software
    }

    fn setup(&mut self) -> Result<(), Error<E>> {
        self.set_sda(true)?;
        self.set_scl(true)
    }

    fn release(&mut self) -> Result<Lines, Error<E>> {
        self.setup()?;
        self.wait();
        self.sample()
    }

    fn set_speed(&mut self, speed: Speed) -> Result<(), Error<E>> {
        self.half_period_us = half_period_us(speed);
        Ok(())
    }

    fn start(&mut self) -> Result<(), Error<E>> {
        self.set_sda(true)?;
        self.set_scl(true)?;
        self.wait();

        let lines = self.sample()?;
        if !lines.sda && !lines.scl {
            log::debug!("start: SDA and SCL stuck low");
            return Err(Error::BusFault);
        }

        self.set_sda(false)?;
        self.wait();
        self.set_scl(false)?;
        self.wait();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Error<E>> {
        self.set_scl(false)?;
        self.set_sda(false)?;
        self.wait();
        self.set_scl(true)?;
        self.wait();
        self.set_sda(true)?;
        self.wait();
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> Result<Ack, Error<E>> {
        for bit in (0..8).rev() {
            self.write_bit(byte & (1 << bit) != 0)?;
        }
        Ok(Ack::from_level(self.read_bit()?))
    }

    fn read_byte(&mut self) -> Result<u8, Error<E>> {
        let mut byte = 0u8;
        for _ in 0..8 {
            byte = (byte << 1) | self.read_bit()? as u8;
        }
        Ok(byte)
    }

    fn send_ack(&mut self, ack: Ack) -> Result<(), Error<E>> {
        self.write_bit(ack.level())
    }
}
