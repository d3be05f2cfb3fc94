mod adc;
mod dac;

pub use adc::{AdcRunMode, AdcRunner, AverageData, DemodData, DemodRange};
pub use dac::{DacProgram, DacRunner};

use std::{fmt, time::Duration};

use ghz_fpga_core::link::{ContextId, RawPacket, Request};
use zerocopy::IntoBytes;

use crate::{
    board::FpgaBoard,
    error::FpgaDriverError,
    firmware::{
        build::BuildParams,
        register::{DacJumpTableRegisters, DacMemoryRegisters, DaisyRole},
    },
};

/// Data extracted from the packets returned by one board.
#[derive(Clone, Debug, PartialEq)]
pub enum BoardData {
    /// DAC timing results.
    Timing(Vec<u32>),
    /// ADC average-mode waveform.
    Average(AverageData),
    /// ADC demodulator results.
    Demod(DemodData),
}

/// Runs one sequence on one board.
///
/// A runner is created for every sequence execution and is never shared between runs.
pub trait BoardRunner: Send + Sync + fmt::Debug {
    /// The board.
    fn board(&self) -> &FpgaBoard;

    /// Number of repetitions.
    fn reps(&self) -> u32;

    /// Number of packets returned by the board.
    fn packet_count(&self) -> usize;

    /// Conservative estimate of the execution time.
    fn sequence_time(&self) -> Duration;

    /// Whether the sequence fits into a single page.
    fn pageable(&self) -> bool;

    /// Request uploading the sequence into `page`.
    ///
    /// Loading as master may change the sequence and thus [`Self::sequence_time`].
    fn load(&mut self, page: usize, is_master: bool) -> Result<Option<Request>, FpgaDriverError>;

    /// Request applying state that cannot be pipelined, with a canonical descriptor of that state.
    fn setup(&self) -> Result<Option<(Request, String)>, FpgaDriverError>;

    /// Register packet starting the board.
    fn run_packet(
        &self,
        page: usize,
        role: DaisyRole,
        delay: u32,
        sync: u8,
    ) -> Result<Vec<u8>, FpgaDriverError>;

    /// Request waiting for every result packet, then triggering `trigger`.
    fn collect(&self, timeout: Duration, trigger: ContextId) -> Request {
        self.board()
            .collect(self.packet_count(), timeout, Some(trigger))
    }

    /// Request sending a trigger into `trigger`.
    fn trigger(&self, trigger: ContextId) -> Request {
        self.board().trigger(trigger)
    }

    /// Whether the results of this board are requested by `timing_order`.
    fn keeps(&self, timing_order: &[String]) -> bool {
        timing_order.iter().any(|s| self.board().is_named_by(s))
    }

    /// Request reading the collected packets, or discarding them if not requested.
    fn read(&self, timing_order: &[String]) -> Request {
        if self.keeps(timing_order) {
            self.board().read(self.packet_count())
        } else {
            self.board().discard(self.packet_count())
        }
    }

    /// Interprets the packets returned by the read request.
    fn extract(&self, packets: &[RawPacket]) -> Result<BoardData, FpgaDriverError>;
}

/// Register packet letting a board that does not run pass the daisy chain pulse through.
pub fn idle_packet(board: &FpgaBoard, delay: u32) -> Result<Vec<u8>, FpgaDriverError> {
    match board.build().params() {
        BuildParams::DacMemory(_) => Ok(DacMemoryRegisters::idle(delay)?.as_bytes().to_vec()),
        BuildParams::DacJumpTable(p) => {
            Ok(DacJumpTableRegisters::idle(p, delay)?.as_bytes().to_vec())
        }
        BuildParams::Adc(_) => Err(board.not_supported("idle mode")),
    }
}

pub(crate) fn check_len(data: &[u8], expected: usize) -> Result<(), FpgaDriverError> {
    if data.len() < expected {
        return Err(FpgaDriverError::PacketTooShort {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}
