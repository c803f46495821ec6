//! [`embedded_hal::i2c::I2c`] on top of the [`Engine`], so regular device drivers can share the
//! same session.
use crate::{Ack, Backend, Engine, Error};
use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

impl<B: Backend> ErrorType for Engine<B> {
    type Error = Error<B::Error>;
}

impl<B: Backend> Engine<B> {
    fn write_or_stop(&mut self, byte: u8) -> Result<(), Error<B::Error>> {
        if self.write(byte)?.acknowledged {
            return Ok(());
        }
        self.stop()?;
        Err(Error::Nack)
    }
}

impl<B: Backend> I2c<SevenBitAddress> for Engine<B> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut previous_read = None;
        for i in 0..operations.len() {
            let is_read = matches!(operations[i], Operation::Read(_));
            let next_read = operations
                .get(i + 1)
                .map(|op| matches!(op, Operation::Read(_)));

            // adjacent operations of the same kind are merged into one transfer
            if previous_read != Some(is_read) {
                self.start()?;
                self.write_or_stop((address << 1) | is_read as u8)?;
            }
            previous_read = Some(is_read);

            match &mut operations[i] {
                Operation::Write(bytes) => {
                    for byte in bytes.iter() {
                        self.write_or_stop(*byte)?;
                    }
                }
                Operation::Read(buffer) => {
                    let len = buffer.len();
                    for (j, slot) in buffer.iter_mut().enumerate() {
                        *slot = self.read()?;
                        let last = j + 1 == len && next_read != Some(true);
                        self.send_ack(if last { Ack::Nack } else { Ack::Ack })?;
                    }
                }
            }
        }
        self.stop()
    }
}
