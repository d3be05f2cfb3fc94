use std::collections::BTreeMap;

use ghz_fpga_core::board::BoardId;
use ghz_fpga_driver::firmware::{
    adc::{MixerTable, TriggerRow, TriggerTable},
    build::{AdcBuild, Build, BuildParams},
    register::{AdcMode, AdcReadback, AdcRegisters, DaisyRole},
};
use itertools::Itertools;
use zerocopy::IntoBytes;

use crate::{error::EmulatorError, StartRecord};

const READBACK_COUNTER: usize = 44;
const PACKET_COUNTER: usize = 46;

#[derive(Clone, Copy, Debug)]
struct Armed {
    mode: AdcMode,
    reps: u16,
}

/// Emulates an ADC board.
#[derive(Clone, Debug)]
pub struct AdcEmulator {
    id: BoardId,
    build: &'static Build,
    params: AdcBuild,
    executions: u16,
    pll_locked: bool,
    recalibrations: usize,
    triggers: Vec<TriggerRow>,
    mixers: BTreeMap<usize, MixerTable>,
    armed: Option<Armed>,
    last_start: Option<StartRecord>,
    broken: bool,
}

impl AdcEmulator {
    pub fn new(id: BoardId, build: &'static Build) -> Result<Self, EmulatorError> {
        let BuildParams::Adc(params) = *build.params() else {
            return Err(EmulatorError::BuildMismatch(id, build.number()));
        };
        Ok(Self {
            id,
            build,
            params,
            executions: 0,
            pll_locked: true,
            recalibrations: 0,
            triggers: Vec::new(),
            mixers: BTreeMap::new(),
            armed: None,
            last_start: None,
            broken: false,
        })
    }

    pub const fn break_down(&mut self) {
        self.broken = true;
    }

    pub const fn repair(&mut self) {
        self.broken = false;
    }

    #[must_use]
    pub const fn is_broken(&self) -> bool {
        self.broken
    }

    #[must_use]
    pub const fn id(&self) -> BoardId {
        self.id
    }

    #[must_use]
    pub const fn build(&self) -> &'static Build {
        self.build
    }

    #[must_use]
    pub const fn executions(&self) -> u16 {
        self.executions
    }

    #[must_use]
    pub const fn pll_locked(&self) -> bool {
        self.pll_locked
    }

    pub const fn unlock_pll(&mut self) {
        self.pll_locked = false;
    }

    #[must_use]
    pub const fn recalibrations(&self) -> usize {
        self.recalibrations
    }

    #[must_use]
    pub fn triggers(&self) -> &[TriggerRow] {
        &self.triggers
    }

    #[must_use]
    pub const fn mixers(&self) -> &BTreeMap<usize, MixerTable> {
        &self.mixers
    }

    #[must_use]
    pub const fn last_start(&self) -> Option<StartRecord> {
        self.last_start
    }

    /// Role of the pending run, if any.
    ///
    /// Runs started by the daisy chain wait as slaves; the others start by themselves.
    #[must_use]
    pub fn armed(&self) -> Option<DaisyRole> {
        self.armed.map(|a| {
            if a.mode.is_daisy() {
                DaisyRole::Slave
            } else {
                DaisyRole::Master
            }
        })
    }

    /// Handles a packet written to the board, returning the immediate reply.
    pub fn receive(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>, EmulatorError> {
        match data.len() {
            AdcRegisters::LEN => self.registers(data),
            len if len == self.params.retrigger_pkt_len => {
                match MixerTable::decode(data) {
                    Some((channel, table)) => {
                        self.mixers.insert(channel, table);
                    }
                    None => self.triggers = TriggerTable::decode(data),
                }
                Ok(None)
            }
            len => Err(EmulatorError::UnknownPacket(self.id, len)),
        }
    }

    fn registers(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>, EmulatorError> {
        let regs = AdcRegisters::decode(data)?;
        match regs.mode() {
            AdcMode::Readback => {
                return Ok(Some(
                    AdcReadback::new(self.build.number() as u8, self.executions, self.pll_locked, 0)
                        .as_bytes()
                        .to_vec(),
                ))
            }
            AdcMode::PllSerial => self.pll_locked = true,
            AdcMode::Recalibrate => self.recalibrations += 1,
            AdcMode::Off => {}
            mode => {
                let armed = Armed {
                    mode,
                    reps: regs.reps(),
                };
                self.armed = Some(armed);
                self.last_start = Some(StartRecord {
                    role: self.armed().unwrap_or(DaisyRole::Slave),
                    reps: armed.reps,
                    delay: regs.start_delay(),
                    page: 0,
                });
            }
        }
        Ok(None)
    }

    /// Executes the pending run and returns the acquired packets.
    pub fn fire(&mut self) -> Vec<Vec<u8>> {
        let Some(armed) = self.armed.take() else {
            return Vec::new();
        };
        if self.broken {
            self.executions = 0;
            return Vec::new();
        }
        self.executions = armed.reps;
        match armed.mode {
            AdcMode::AverageAuto | AdcMode::AverageDaisy => self.average_packets(),
            _ => self.demod_packets(armed.reps),
        }
    }

    fn average_packets(&self) -> Vec<Vec<u8>> {
        let samples = self.params.average_packet_len / 4;
        (0..self.params.average_packets)
            .map(|p| {
                (0..samples)
                    .flat_map(|s| {
                        let i = average_sample(p * samples + s);
                        [i.to_le_bytes(), (-i).to_le_bytes()]
                    })
                    .flatten()
                    .collect()
            })
            .collect()
    }

    fn demod_packets(&self, reps: u16) -> Vec<Vec<u8>> {
        let pairs = self
            .triggers
            .iter()
            .enumerate()
            .flat_map(|(row, r)| {
                (0..r.count).flat_map(move |_| (0..r.channels).map(move |ch| demod_value(row, ch)))
            })
            .collect::<Vec<_>>();
        (0..reps)
            .flat_map(|rep| {
                pairs
                    .chunks(self.params.channels_per_packet)
                    .enumerate()
                    .map(move |(n, chunk)| {
                        let mut pkt = vec![0u8; self.params.demod_packet_len];
                        chunk.iter().enumerate().for_each(|(k, (i, q))| {
                            pkt[4 * k..4 * k + 2].copy_from_slice(&i.to_le_bytes());
                            pkt[4 * k + 2..4 * k + 4].copy_from_slice(&q.to_le_bytes());
                        });
                        pkt[READBACK_COUNTER..READBACK_COUNTER + 2]
                            .copy_from_slice(&rep.to_le_bytes());
                        pkt[PACKET_COUNTER] = n as u8;
                        pkt
                    })
                    .collect_vec()
            })
            .collect()
    }
}

fn average_sample(n: usize) -> i16 {
    (n % 256) as i16 - 128
}

/// Demodulated value reported for `channel` of trigger row `row`.
#[must_use]
pub fn demod_value(row: usize, channel: u8) -> (i16, i16) {
    let i = 100 * (channel as i16 + 1) + row as i16;
    (i, -i)
}
