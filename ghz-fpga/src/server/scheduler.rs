use std::collections::BTreeMap;

use ghz_fpga_core::{board::BoardType, defined::TIMING_PACKET_LEN};
use ghz_fpga_driver::{
    board::FpgaBoard,
    error::FpgaDriverError,
    firmware::{adc::AdcSetup, build::BuildParams, jump_table::JumpTable, sram::SramData},
    runner::{AdcRunner, AverageData, BoardData, BoardRunner, DacProgram, DacRunner},
};
use ndarray::{Array2, Array3, Axis};

use crate::{context::RunConfig, error::FpgaError};

/// Data of one timing order entry.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelData {
    /// Timing values of a DAC.
    Timing(Vec<u32>),
    /// Averaged waveform of an ADC.
    Average(AverageData),
    /// Demodulated values of one ADC channel, indexed by stat, trigger and I (0) or Q (1).
    Demod(Array3<i32>),
}

/// Results of a sequence run, in timing order.
#[derive(Clone, Debug, PartialEq)]
pub enum SequenceResult {
    /// Timing data of DACs that all returned the same number of values, one row per DAC.
    Matrix(Array2<u32>),
    /// Anything else.
    Tuple(Vec<ChannelData>),
}

/// Timing order of one run, or `None` when no data is requested.
pub(crate) fn timing_order(
    config: &RunConfig,
    get_timing_data: bool,
) -> Result<Option<Vec<String>>, FpgaError> {
    if !get_timing_data {
        return Ok(None);
    }
    match (&config.timing_order, config.daisy_chain.is_empty()) {
        (Some(order), _) => Ok(Some(order.clone())),
        (None, false) => Err(FpgaError::TimingOrderRequired),
        (None, true) => config
            .selected
            .clone()
            .map(|name| Some(vec![name]))
            .ok_or(FpgaError::NoDeviceSelected),
    }
}

/// Rounds `reps` up to whole timing packets if any DAC returns timing data.
pub(crate) fn round_reps(reps: u32, timing_order: &[String]) -> Result<u32, FpgaError> {
    if !timing_order.iter().any(|entry| entry.contains("DAC")) {
        return Ok(reps);
    }
    reps.checked_next_multiple_of(TIMING_PACKET_LEN).ok_or_else(|| {
        FpgaDriverError::RegisterFieldOutOfRange {
            field: "reps",
            value: reps as u64,
            max: u16::MAX as u64,
        }
        .into()
    })
}

fn split_entry(entry: &str) -> (&str, Option<&str>) {
    match entry.split_once("::") {
        Some((name, channel)) => (name, Some(channel)),
        None => (entry, None),
    }
}

/// Checks that every entry names a running board that can return the requested data.
pub(crate) fn check_timing_order(
    timing_order: &[String],
    boards: &[FpgaBoard],
) -> Result<(), FpgaError> {
    timing_order.iter().try_for_each(|entry| {
        let (name, channel) = split_entry(entry);
        let board = boards
            .iter()
            .find(|b| b.name() == name)
            .ok_or_else(|| FpgaError::NotInDaisyChain(entry.clone()))?;
        match (board.board_type(), channel) {
            (BoardType::Dac, None) if board.has_jump_table() => {
                Err(FpgaError::NoTimingData(board.name().to_owned()))
            }
            (BoardType::Dac, None) => Ok(()),
            (BoardType::Adc, None) => Ok(()),
            (BoardType::Adc, Some(ch)) if ch.parse::<usize>().is_ok() => Ok(()),
            _ => Err(FpgaError::InvalidTimingOrderEntry(entry.clone())),
        }
    })
}

fn missing(board: &FpgaBoard, what: &'static str) -> FpgaDriverError {
    FpgaDriverError::MissingSequenceData {
        board: board.name().to_owned(),
        what,
    }
}

/// Builds fresh runners for one attempt.
pub(crate) fn build_runners(
    boards: &[FpgaBoard],
    config: &RunConfig,
    reps: u32,
) -> Result<Vec<Box<dyn BoardRunner>>, FpgaError> {
    boards
        .iter()
        .map(|board| -> Result<Box<dyn BoardRunner>, FpgaError> {
            let settings = config.board(board.name());
            let runner: Box<dyn BoardRunner> = match board.build().params() {
                BuildParams::DacMemory(_) => {
                    let program = DacProgram::Memory {
                        memory: settings
                            .memory
                            .ok_or_else(|| missing(board, "memory sequence"))?,
                        sram: settings.sram.ok_or_else(|| missing(board, "SRAM"))?,
                    };
                    Box::new(DacRunner::new(
                        board.clone(),
                        reps,
                        settings.start_delay,
                        program,
                    )?)
                }
                BuildParams::DacJumpTable(build) => {
                    let sram = match settings.sram {
                        Some(SramData::Single(words)) => words,
                        Some(SramData::DualBlock(_)) => {
                            return Err(FpgaDriverError::NotSupported {
                                board: board.name().to_owned(),
                                feature: "dual-block SRAM",
                            }
                            .into())
                        }
                        None => return Err(missing(board, "SRAM").into()),
                    };
                    if settings.jump_table.is_empty() {
                        return Err(missing(board, "jump table").into());
                    }
                    let table =
                        JumpTable::new(build, settings.jump_table, &settings.counters, 0)?;
                    Box::new(DacRunner::new(
                        board.clone(),
                        reps,
                        settings.start_delay,
                        DacProgram::JumpTable {
                            table,
                            sram,
                            loop_delay: settings.loop_delay,
                        },
                    )?)
                }
                BuildParams::Adc(_) => {
                    let triggers = settings
                        .trigger_table
                        .ok_or_else(|| missing(board, "trigger table"))?;
                    Box::new(AdcRunner::new(
                        board.clone(),
                        reps,
                        settings.run_mode,
                        settings.start_delay,
                        AdcSetup::new(triggers, settings.mixers),
                        settings.monitors,
                    )?)
                }
            };
            Ok(runner)
        })
        .collect()
}

/// Arranges the data of each board in timing order.
pub(crate) fn aggregate(
    timing_order: &[String],
    data: &BTreeMap<String, BoardData>,
) -> Result<SequenceResult, FpgaError> {
    let channels = timing_order
        .iter()
        .map(|entry| {
            let (name, channel) = split_entry(entry);
            let board_data = data
                .get(name)
                .ok_or_else(|| FpgaError::MissingData(name.to_owned()))?;
            match (board_data, channel) {
                (BoardData::Timing(timing), None) => Ok(ChannelData::Timing(timing.clone())),
                (BoardData::Average(average), None) => Ok(ChannelData::Average(average.clone())),
                (BoardData::Demod(demod), Some(channel)) => {
                    let ch = channel
                        .parse::<usize>()
                        .ok()
                        .filter(|&ch| ch < demod.iq.len_of(Axis(0)))
                        .ok_or_else(|| FpgaError::InvalidTimingOrderEntry(entry.clone()))?;
                    Ok(ChannelData::Demod(demod.iq.index_axis(Axis(0), ch).to_owned()))
                }
                _ => Err(FpgaError::RunModeMismatch(entry.clone())),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let rows = channels
        .iter()
        .map(|c| match c {
            ChannelData::Timing(t) => Some(t),
            _ => None,
        })
        .collect::<Option<Vec<_>>>();
    match rows {
        Some(rows) if !rows.is_empty() && rows.iter().all(|r| r.len() == rows[0].len()) => Ok(
            SequenceResult::Matrix(Array2::from_shape_fn((rows.len(), rows[0].len()), |(i, j)| {
                rows[i][j]
            })),
        ),
        _ => Ok(SequenceResult::Tuple(channels)),
    }
}
