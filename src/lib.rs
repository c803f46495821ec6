//! I2C master engine, passive bus sniffer and binary scripting protocol for bus-interfacing
//! tools.
//!
//! - [`Engine`] drives transactions on a [`Backend`], either [`BitBang`] on two GPIOs or a
//!   [`HardwareBackend`] wrapping the MCU's I2C controller.
//! - [`Sniffer`] reconstructs traffic from pin-change samples delivered through an
//!   [`EdgeQueue`].
//! - [`Dispatcher`] speaks the binary protocol over any `embedded-io` channel.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod bitbang;
mod bus;
mod common;
mod config;
mod edge;
mod engine;
mod error;
mod hardware;
pub mod protocol;
pub mod sniffer;
mod transport;

#[cfg(test)]
mod mock;

pub use bitbang::BitBang;
pub use common::{Ack, Backend, Direction, Lines, ResultStatus, Speed, Target, TransportMode};
pub use config::Config;
pub use edge::{EdgeCapture, EdgeQueue};
pub use engine::{Engine, EngineState, Found};
pub use error::Error;
pub use hardware::{Controller, HardwareBackend, Request};
pub use protocol::{AuxLine, AuxState, Command, Dispatcher, Peripherals};
pub use sniffer::{Event, OutputMode, SniffError, SniffState, Sniffer};
pub use transport::{Transport, TransportError};
