use std::time::Duration;

use ghz_fpga_core::link::{RawPacket, Request};
use ndarray::Array4;
use zerocopy::IntoBytes;

use super::{check_len, BoardData, BoardRunner};
use crate::{
    board::FpgaBoard,
    error::FpgaDriverError,
    firmware::{
        adc::{AdcSetup, TriggerTable},
        build::{AdcBuild, BuildParams},
        register::{AdcMode, AdcRegisters, DaisyRole},
    },
};

const DEMOD_DATA_LEN: usize = 44;
const READBACK_COUNTER: usize = 44;
const PACKET_COUNTER: usize = 46;

/// Acquisition mode of an ADC run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdcRunMode {
    /// Return the averaged waveform.
    Average,
    /// Return demodulated I/Q values.
    #[default]
    Demodulate,
}

/// Average-mode waveform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AverageData {
    /// In-phase samples.
    pub i: Vec<i32>,
    /// Quadrature samples.
    pub q: Vec<i32>,
}

/// Extremes of the demodulated values, used to detect clipping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DemodRange {
    /// Minimum and maximum of I.
    pub i: (i32, i32),
    /// Minimum and maximum of Q.
    pub q: (i32, i32),
}

/// Demodulator results.
#[derive(Clone, Debug, PartialEq)]
pub struct DemodData {
    /// Values indexed by channel, stat, trigger and I (0) or Q (1).
    pub iq: Array4<i32>,
    /// Packet counter of every packet.
    pub packet_counters: Vec<u8>,
    /// Readback counter of every packet.
    pub readback_counters: Vec<u16>,
    /// Extremes of I and Q.
    pub range: DemodRange,
}

/// Runs one sequence on an ADC.
#[derive(Clone, Debug)]
pub struct AdcRunner {
    board: FpgaBoard,
    build: AdcBuild,
    reps: u32,
    mode: AdcRunMode,
    start_delay: u32,
    setup: AdcSetup,
    monitors: (u8, u8),
    packets: usize,
}

impl AdcRunner {
    /// Creates a runner.
    pub fn new(
        board: FpgaBoard,
        reps: u32,
        mode: AdcRunMode,
        start_delay: u32,
        setup: AdcSetup,
        monitors: (u8, u8),
    ) -> Result<Self, FpgaDriverError> {
        let BuildParams::Adc(build) = *board.build().params() else {
            return Err(board.not_supported("ADC sequences"));
        };
        let packets = match mode {
            AdcRunMode::Average => build.average_packets,
            AdcRunMode::Demodulate => {
                // every trigger row must use the same channel count
                setup.triggers().channels()?;
                reps as usize
                    * setup
                        .triggers()
                        .iq_pairs()
                        .div_ceil(build.channels_per_packet)
            }
        };
        Ok(Self {
            board,
            build,
            reps,
            mode,
            start_delay,
            setup,
            monitors,
            packets,
        })
    }

    /// The acquisition mode.
    #[must_use]
    pub const fn mode(&self) -> AdcRunMode {
        self.mode
    }

    const fn register_mode(&self) -> AdcMode {
        match self.mode {
            AdcRunMode::Average => AdcMode::AverageDaisy,
            AdcRunMode::Demodulate => AdcMode::DemodDaisy,
        }
    }
}

impl BoardRunner for AdcRunner {
    fn board(&self) -> &FpgaBoard {
        &self.board
    }

    fn reps(&self) -> u32 {
        self.reps
    }

    fn packet_count(&self) -> usize {
        self.packets
    }

    fn sequence_time(&self) -> Duration {
        self.setup.triggers().stat_time() * self.reps
    }

    fn pageable(&self) -> bool {
        true
    }

    fn load(&mut self, _page: usize, is_master: bool) -> Result<Option<Request>, FpgaDriverError> {
        if is_master {
            return Err(FpgaDriverError::AdcAsMaster(self.board.name().to_owned()));
        }
        Ok(None)
    }

    fn setup(&self) -> Result<Option<(Request, String)>, FpgaDriverError> {
        let req = self
            .setup
            .packets(&self.build)?
            .into_iter()
            .fold(Request::new(), |req, pkt| req.write(pkt));
        Ok(Some((req, self.setup.descriptor())))
    }

    fn run_packet(
        &self,
        _page: usize,
        _role: DaisyRole,
        delay: u32,
        _sync: u8,
    ) -> Result<Vec<u8>, FpgaDriverError> {
        Ok(AdcRegisters::run(
            self.register_mode(),
            self.reps,
            self.start_delay + delay,
            self.monitors,
        )?
        .as_bytes()
        .to_vec())
    }

    fn extract(&self, packets: &[RawPacket]) -> Result<BoardData, FpgaDriverError> {
        match self.mode {
            AdcRunMode::Average => Ok(BoardData::Average(extract_average(packets))),
            AdcRunMode::Demodulate => Ok(BoardData::Demod(extract_demod(
                &self.build,
                packets,
                self.setup.triggers(),
            )?)),
        }
    }
}

fn i16s(data: &[u8]) -> impl Iterator<Item = i32> + '_ {
    data.chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as i32)
}

/// Splits average-mode packets into interleaved I and Q samples.
#[must_use]
pub fn extract_average(packets: &[RawPacket]) -> AverageData {
    let values = packets
        .iter()
        .flat_map(|p| p.data().to_vec())
        .collect::<Vec<_>>();
    let (i, q): (Vec<_>, Vec<_>) = i16s(&values)
        .collect::<Vec<_>>()
        .chunks_exact(2)
        .map(|c| (c[0], c[1]))
        .unzip();
    AverageData { i, q }
}

/// Reshapes demodulator packets into `(channel, stat, trigger, I/Q)`.
pub fn extract_demod(
    build: &AdcBuild,
    packets: &[RawPacket],
    triggers: &TriggerTable,
) -> Result<DemodData, FpgaDriverError> {
    let channels = triggers.channels()? as usize;
    let total_triggers = triggers.total_triggers();
    let per_stat = (total_triggers * channels).div_ceil(build.channels_per_packet);
    if per_stat == 0 || packets.len() % per_stat != 0 {
        return Err(FpgaDriverError::PacketCountMismatch(packets.len(), per_stat));
    }
    packets
        .iter()
        .try_for_each(|p| check_len(p.data(), PACKET_COUNTER + 1))?;

    let stats = packets.len() / per_stat;
    let values_per_stat = 2 * channels * total_triggers;
    let values = packets
        .chunks(per_stat)
        .flat_map(|stat| {
            stat.iter()
                .flat_map(|p| i16s(&p.data()[..DEMOD_DATA_LEN]))
                .take(values_per_stat)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let range = values
        .chunks_exact(2)
        .fold(None, |acc: Option<DemodRange>, c| {
            let (i, q) = (c[0], c[1]);
            Some(match acc {
                None => DemodRange {
                    i: (i, i),
                    q: (q, q),
                },
                Some(r) => DemodRange {
                    i: (r.i.0.min(i), r.i.1.max(i)),
                    q: (r.q.0.min(q), r.q.1.max(q)),
                },
            })
        })
        .unwrap_or_default();

    // (stat, trigger, channel, iq) -> (channel, stat, trigger, iq)
    let stacked = Array4::from_shape_vec((stats, total_triggers, channels, 2), values)
        .map_err(|_| FpgaDriverError::PacketCountMismatch(packets.len(), per_stat))?;
    let iq = stacked.permuted_axes([2, 0, 1, 3]).as_standard_layout().to_owned();

    Ok(DemodData {
        iq,
        packet_counters: packets.iter().map(|p| p.data()[PACKET_COUNTER]).collect(),
        readback_counters: packets
            .iter()
            .map(|p| {
                u16::from_le_bytes([p.data()[READBACK_COUNTER], p.data()[READBACK_COUNTER + 1]])
            })
            .collect(),
        range,
    })
}
