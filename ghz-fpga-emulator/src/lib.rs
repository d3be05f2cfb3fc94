//! Emulators of GHz FPGA DAC/ADC boards.
//!
//! The emulators decode the same packets the driver builds and answer with readback,
//! timing, average and demodulator packets.

pub mod adc;
pub mod dac;
pub mod error;

pub use adc::AdcEmulator;
pub use dac::DacEmulator;
pub use error::EmulatorError;

use ghz_fpga_core::{
    board::{BoardId, BoardType},
    link::MacAddress,
};
use ghz_fpga_driver::firmware::{build::Build, register::DaisyRole};

/// A start or idle register packet as decoded by a board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartRecord {
    pub role: DaisyRole,
    pub reps: u16,
    pub delay: u16,
    pub page: u8,
}

/// Any emulated board.
#[derive(Clone, Debug)]
pub enum BoardEmulator {
    Dac(DacEmulator),
    Adc(AdcEmulator),
}

impl BoardEmulator {
    pub fn new(id: BoardId, build: u32) -> Result<Self, EmulatorError> {
        let build = Build::find(id.board_type(), build)?;
        Ok(match id.board_type() {
            BoardType::Dac => Self::Dac(DacEmulator::new(id, build)),
            BoardType::Adc => Self::Adc(AdcEmulator::new(id, build)?),
        })
    }

    #[must_use]
    pub const fn id(&self) -> BoardId {
        match self {
            Self::Dac(dac) => dac.id(),
            Self::Adc(adc) => adc.id(),
        }
    }

    #[must_use]
    pub const fn mac(&self) -> MacAddress {
        self.id().mac()
    }

    #[must_use]
    pub const fn executions(&self) -> u16 {
        match self {
            Self::Dac(dac) => dac.executions(),
            Self::Adc(adc) => adc.executions(),
        }
    }

    #[must_use]
    pub const fn last_start(&self) -> Option<StartRecord> {
        match self {
            Self::Dac(dac) => dac.last_start(),
            Self::Adc(adc) => adc.last_start(),
        }
    }

    #[must_use]
    pub fn armed(&self) -> Option<DaisyRole> {
        match self {
            Self::Dac(dac) => dac.armed(),
            Self::Adc(adc) => adc.armed(),
        }
    }

    pub fn receive(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>, EmulatorError> {
        match self {
            Self::Dac(dac) => dac.receive(data),
            Self::Adc(adc) => adc.receive(data),
        }
    }

    pub fn fire(&mut self) -> Vec<Vec<u8>> {
        match self {
            Self::Dac(dac) => dac.fire(),
            Self::Adc(adc) => adc.fire(),
        }
    }

    pub const fn break_down(&mut self) {
        match self {
            Self::Dac(dac) => dac.break_down(),
            Self::Adc(adc) => adc.break_down(),
        }
    }

    pub const fn repair(&mut self) {
        match self {
            Self::Dac(dac) => dac.repair(),
            Self::Adc(adc) => adc.repair(),
        }
    }

    #[must_use]
    pub const fn is_broken(&self) -> bool {
        match self {
            Self::Dac(dac) => dac.is_broken(),
            Self::Adc(adc) => adc.is_broken(),
        }
    }
}
