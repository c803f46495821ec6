use crate::{Speed, TransportMode};

/// Session settings handed over by the interactive setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    pub mode: TransportMode,
    pub speed: Speed,
}

impl Config {
    /// Build a config from the 1-based menu numbers of the setup dialog.
    ///
    /// `mode` is 1 (software) or 2 (hardware).  The software transport offers four speeds
    /// (1..=4), the hardware controller three (1..=3).  Anything else yields `None`.
    pub fn from_selection(mode: u8, speed: u8) -> Option<Self> {
        let (mode, speeds) = match mode {
            1 => (TransportMode::Software, 4),
            2 => (TransportMode::Hardware, 3),
            _ => return None,
        };
        if speed == 0 || speed > speeds {
            return None;
        }
        Some(Self {
            mode,
            speed: Speed::from_bits(speed - 1),
        })
    }
}
