use std::time::Duration;

use ghz_fpga_core::{
    defined::{MASTER_SRAM_DELAY, TIMING_PACKET_LEN},
    link::{RawPacket, Request},
};
use zerocopy::IntoBytes;

use super::{check_len, BoardData, BoardRunner};
use crate::{
    board::FpgaBoard,
    error::FpgaDriverError,
    firmware::{
        build::{BuildParams, JumpTableBuild, MemoryBuild},
        jump_table::JumpTable,
        memory::MemorySequence,
        register::{DacJumpTableRegisters, DacMemoryRegisters, DaisyRole},
        sram::{memory_write_packet, sram_write_packets, SramData},
    },
};

const TIMING_DATA: std::ops::Range<usize> = 3..63;
const JUMP_TABLE_REP_TIME: Duration = Duration::from_micros(100);

/// What a DAC plays in one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DacProgram {
    /// A memory sequence calling into SRAM.
    Memory {
        /// Memory commands.
        memory: MemorySequence,
        /// SRAM contents.
        sram: SramData,
    },
    /// A jump table controlling SRAM playback.
    JumpTable {
        /// The table.
        table: JumpTable,
        /// SRAM words.
        sram: Vec<u32>,
        /// Delay between repetitions in µs.
        loop_delay: u32,
    },
}

#[derive(Clone, Debug)]
enum Program {
    Memory {
        build: MemoryBuild,
        memory: MemorySequence,
        sram: Vec<u32>,
        block_delay: Option<u32>,
        memory_time: Duration,
    },
    JumpTable {
        build: JumpTableBuild,
        table: JumpTable,
        sram: Vec<u32>,
        loop_delay: u32,
    },
}

/// Runs one sequence on a DAC.
#[derive(Clone, Debug)]
pub struct DacRunner {
    board: FpgaBoard,
    reps: u32,
    start_delay: u32,
    program: Program,
    packets: usize,
    pageable: bool,
}

impl DacRunner {
    /// Creates a runner for `program`, which must match the build of `board`.
    pub fn new(
        board: FpgaBoard,
        reps: u32,
        start_delay: u32,
        program: DacProgram,
    ) -> Result<Self, FpgaDriverError> {
        match (*board.build().params(), program) {
            (BuildParams::DacMemory(build), DacProgram::Memory { memory, sram }) => {
                let (memory, mut sram, block_delay) = match sram {
                    SramData::Single(words) => (memory, words, None),
                    SramData::DualBlock(dual) => (
                        memory.fix_dual_block_addresses(
                            dual.block0().len(),
                            dual.block1().len(),
                            dual.delay_blocks(),
                            build.sram_block0_len,
                            build.sram_delay_len,
                        )?,
                        dual.layout(&build)?,
                        Some(dual.delay_blocks() as u32),
                    ),
                };
                let pageable = memory.max_sram_address() as usize <= build.sram_page_len;
                if pageable {
                    sram.truncate(build.sram_page_len);
                }
                let packets = reps as usize * memory.timer_count() / TIMING_PACKET_LEN as usize;
                let memory_time = memory.sequence_time()?;
                Ok(Self {
                    board,
                    reps,
                    start_delay,
                    program: Program::Memory {
                        build,
                        memory,
                        sram,
                        block_delay,
                        memory_time,
                    },
                    packets,
                    pageable,
                })
            }
            (
                BuildParams::DacJumpTable(build),
                DacProgram::JumpTable {
                    table,
                    sram,
                    loop_delay,
                },
            ) => Ok(Self {
                board,
                reps,
                start_delay,
                program: Program::JumpTable {
                    build,
                    table,
                    sram,
                    loop_delay,
                },
                packets: 0,
                pageable: false,
            }),
            (BuildParams::DacMemory(_), _) => Err(FpgaDriverError::MissingSequenceData {
                board: board.name().to_owned(),
                what: "memory sequence",
            }),
            (BuildParams::DacJumpTable(_), _) => Err(FpgaDriverError::MissingSequenceData {
                board: board.name().to_owned(),
                what: "jump table",
            }),
            (BuildParams::Adc(_), _) => Err(board.not_supported("DAC sequences")),
        }
    }

    /// Start delay, including the master delay once loaded as master on a jump table build.
    #[must_use]
    pub const fn start_delay(&self) -> u32 {
        self.start_delay
    }

    /// Whether this board streams timing packets.
    #[must_use]
    pub const fn streams_timing(&self) -> bool {
        matches!(self.program, Program::Memory { .. })
    }
}

impl BoardRunner for DacRunner {
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
        match &self.program {
            Program::Memory { memory_time, .. } => *memory_time * self.reps,
            // TODO: derive from the jump table once IDLE and CYCLE timing is modelled.
            Program::JumpTable { .. } => JUMP_TABLE_REP_TIME * self.reps,
        }
    }

    fn pageable(&self) -> bool {
        self.pageable
    }

    fn load(&mut self, page: usize, is_master: bool) -> Result<Option<Request>, FpgaDriverError> {
        let writes = match &mut self.program {
            Program::Memory {
                build,
                memory,
                sram,
                memory_time,
                ..
            } => {
                if is_master {
                    *memory = memory.add_master_delay();
                    *memory_time = memory.sequence_time()?;
                    tracing::debug!("master delay added, sequence time {:?}", memory_time);
                }
                let shifted = memory.shift_sram(page, build.sram_page_len);
                std::iter::once(memory_write_packet(build, page, &shifted)?)
                    .chain(sram_write_packets(
                        build.sram_len,
                        page * build.sram_page_len,
                        sram,
                    )?)
                    .collect::<Vec<_>>()
            }
            Program::JumpTable {
                build, table, sram, ..
            } => {
                if is_master {
                    self.start_delay += MASTER_SRAM_DELAY.as_micros() as u32;
                }
                std::iter::once(table.to_bytes(build)?)
                    .chain(sram_write_packets(build.sram_len, 0, sram)?)
                    .collect()
            }
        };
        Ok(Some(
            writes
                .into_iter()
                .fold(Request::new(), |req, pkt| req.write(pkt)),
        ))
    }

    fn setup(&self) -> Result<Option<(Request, String)>, FpgaDriverError> {
        Ok(None)
    }

    fn run_packet(
        &self,
        page: usize,
        role: DaisyRole,
        delay: u32,
        sync: u8,
    ) -> Result<Vec<u8>, FpgaDriverError> {
        let delay = self.start_delay + delay;
        Ok(match &self.program {
            Program::Memory { block_delay, .. } => {
                DacMemoryRegisters::run(self.reps, page, role, delay, *block_delay, sync)?
                    .as_bytes()
                    .to_vec()
            }
            Program::JumpTable {
                build, loop_delay, ..
            } => DacJumpTableRegisters::run(
                build,
                self.reps,
                page,
                role,
                delay,
                None,
                sync,
                *loop_delay,
                false,
            )?
            .as_bytes()
            .to_vec(),
        })
    }

    fn extract(&self, packets: &[RawPacket]) -> Result<BoardData, FpgaDriverError> {
        packets
            .iter()
            .map(|p| {
                check_len(p.data(), TIMING_DATA.end)?;
                Ok(p.data()[TIMING_DATA]
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
                    .collect::<Vec<_>>())
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|v| BoardData::Timing(v.concat()))
    }
}
