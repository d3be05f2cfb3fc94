use ghz_fpga_core::board::BoardId;
use ghz_fpga_driver::error::FpgaDriverError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum EmulatorError {
    #[error("{0} cannot interpret a packet of {1} bytes")]
    UnknownPacket(BoardId, usize),
    #[error("Build {1} does not belong to {0}")]
    BuildMismatch(BoardId, u32),
    #[error("{0}")]
    Driver(#[from] FpgaDriverError),
}
