mod adc;
mod dac_jump_table;
mod dac_memory;
mod readback;

pub use adc::{AdcMode, AdcRegisters};
pub use dac_jump_table::DacJumpTableRegisters;
pub use dac_memory::DacMemoryRegisters;
pub use readback::{AdcClockMonitor, AdcReadback, DacReadback, Readback};

use ghz_fpga_core::board::BoardType;
use zerocopy::IntoBytes;

use super::build::{Build, BuildParams};
use crate::error::FpgaDriverError;

/// Position of a board in the daisy chain for one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DaisyRole {
    /// Starts the chain.
    Master,
    /// Waits for the chain.
    Slave,
    /// Only passes the chain pulse through.
    Idle,
}

/// Length of the register packet of `build`.
#[must_use]
pub const fn register_len(build: &Build) -> usize {
    match build.params() {
        BuildParams::DacMemory(_) => DacMemoryRegisters::LEN,
        BuildParams::DacJumpTable(_) => DacJumpTableRegisters::LEN,
        BuildParams::Adc(_) => AdcRegisters::LEN,
    }
}

/// Length of the register readback of `build`.
#[must_use]
pub const fn readback_len(build: &Build) -> usize {
    match build.params() {
        BuildParams::DacMemory(_) | BuildParams::DacJumpTable(_) => DacReadback::LEN,
        BuildParams::Adc(_) => AdcReadback::LEN,
    }
}

/// Register packet requesting a readback without starting the board.
#[must_use]
pub fn ping(build: &Build) -> Vec<u8> {
    match build.params() {
        BuildParams::DacMemory(_) => DacMemoryRegisters::ping().as_bytes().to_vec(),
        BuildParams::DacJumpTable(p) => DacJumpTableRegisters::ping(p).as_bytes().to_vec(),
        BuildParams::Adc(_) => AdcRegisters::ping().as_bytes().to_vec(),
    }
}

/// Decodes the register readback of `build`.
pub fn decode_readback(build: &Build, data: &[u8]) -> Result<Readback, FpgaDriverError> {
    Ok(match build.params() {
        BuildParams::DacMemory(_) | BuildParams::DacJumpTable(_) => {
            readback::decode::<DacReadback>(data, DacReadback::LEN)?.into()
        }
        BuildParams::Adc(_) => readback::decode::<AdcReadback>(data, AdcReadback::LEN)?.into(),
    })
}

/// Decodes the full register readback of an ADC.
pub fn decode_adc_readback(data: &[u8]) -> Result<AdcReadback, FpgaDriverError> {
    readback::decode::<AdcReadback>(data, AdcReadback::LEN)
}

/// Register packet answered by every build of `board_type`, used before the build is known.
#[must_use]
pub fn detect_ping(board_type: BoardType) -> Vec<u8> {
    match board_type {
        BoardType::Dac => DacMemoryRegisters::ping().as_bytes().to_vec(),
        BoardType::Adc => AdcRegisters::ping().as_bytes().to_vec(),
    }
}

/// Length of the readback answering [`detect_ping`].
#[must_use]
pub const fn detect_readback_len(board_type: BoardType) -> usize {
    match board_type {
        BoardType::Dac => DacReadback::LEN,
        BoardType::Adc => AdcReadback::LEN,
    }
}

/// Build number carried by a readback of any build of `board_type`.
pub fn readback_build(board_type: BoardType, data: &[u8]) -> Result<u32, FpgaDriverError> {
    Ok(match board_type {
        BoardType::Dac => readback::decode::<DacReadback>(data, DacReadback::LEN)?.build(),
        BoardType::Adc => readback::decode::<AdcReadback>(data, AdcReadback::LEN)?.build(),
    } as u32)
}
