use ghz_fpga_core::{
    board::BoardId,
    defined::{NUM_PAGES, TIMING_PACKET_LEN},
};
use ghz_fpga_driver::firmware::{
    build::{Build, BuildParams, SRAM_WRITE_PKT_LEN},
    jump_table::JumpTable,
    memory::MemorySequence,
    register::{register_len, DacJumpTableRegisters, DacMemoryRegisters, DacReadback, DaisyRole},
    sram::{decode_memory_write, decode_sram_write, MEMORY_PACKET_LEN, SRAM_PACKET_LEN},
};
use zerocopy::IntoBytes;

use crate::{error::EmulatorError, StartRecord};

/// Length of a timing packet streamed by a DAC.
pub const TIMING_PACKET_BYTES: usize = 64;
const TIMING_DATA_OFFSET: usize = 3;

#[derive(Clone, Copy, Debug)]
struct Armed {
    start: StartRecord,
    streams: bool,
}

/// Emulates a DAC board.
#[derive(Clone, Debug)]
pub struct DacEmulator {
    id: BoardId,
    build: &'static Build,
    executions: u16,
    pll_locked: bool,
    memory: [Vec<u32>; NUM_PAGES],
    sram: Vec<u32>,
    jump_table: Option<JumpTable>,
    armed: Option<Armed>,
    last_start: Option<StartRecord>,
    broken: bool,
}

impl DacEmulator {
    #[must_use]
    pub fn new(id: BoardId, build: &'static Build) -> Self {
        let sram_len = match build.params() {
            BuildParams::DacMemory(p) => p.sram_len,
            BuildParams::DacJumpTable(p) => p.sram_len,
            BuildParams::Adc(_) => 0,
        };
        Self {
            id,
            build,
            executions: 0,
            pll_locked: true,
            memory: Default::default(),
            sram: vec![0; sram_len],
            jump_table: None,
            armed: None,
            last_start: None,
            broken: false,
        }
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
    pub fn memory(&self, page: usize) -> &[u32] {
        self.memory.get(page).map_or(&[], |m| m.as_slice())
    }

    #[must_use]
    pub fn sram(&self) -> &[u32] {
        &self.sram
    }

    #[must_use]
    pub const fn jump_table(&self) -> Option<&JumpTable> {
        self.jump_table.as_ref()
    }

    /// The last start or idle register packet received.
    #[must_use]
    pub const fn last_start(&self) -> Option<StartRecord> {
        self.last_start
    }

    /// Role of the pending run, if any.
    #[must_use]
    pub fn armed(&self) -> Option<DaisyRole> {
        self.armed.map(|a| a.start.role)
    }

    /// Handles a packet written to the board, returning the immediate reply.
    pub fn receive(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>, EmulatorError> {
        match (self.build.params(), data.len()) {
            (_, len) if len == register_len(self.build) => self.registers(data),
            (_, SRAM_PACKET_LEN) => {
                let (derp, words) = decode_sram_write(data)?;
                let start = derp as usize * SRAM_WRITE_PKT_LEN;
                self.sram
                    .iter_mut()
                    .skip(start)
                    .zip(words)
                    .for_each(|(dst, w)| *dst = w);
                Ok(None)
            }
            (BuildParams::DacMemory(_), MEMORY_PACKET_LEN) => {
                let (page, commands) = decode_memory_write(data)?;
                if let Some(mem) = self.memory.get_mut(page as usize) {
                    *mem = commands;
                }
                Ok(None)
            }
            (BuildParams::DacJumpTable(p), len) if len == p.table_len => {
                self.jump_table = Some(JumpTable::decode(p, data)?);
                Ok(None)
            }
            (_, len) => Err(EmulatorError::UnknownPacket(self.id, len)),
        }
    }

    fn registers(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>, EmulatorError> {
        let wants_readback = match self.build.params() {
            BuildParams::DacJumpTable(_) => {
                let regs = DacJumpTableRegisters::decode(data)?;
                if regs.resets_pll() {
                    self.pll_locked = true;
                }
                let start = StartRecord {
                    role: regs.role(),
                    reps: regs.reps(),
                    delay: regs.delay(),
                    page: 0,
                };
                match start.role {
                    DaisyRole::Idle => self.idle(start),
                    // a ping is a master start without repetitions
                    _ if start.reps > 0 => self.arm(start, false),
                    _ => {}
                }
                regs.wants_readback()
            }
            _ => {
                let regs = DacMemoryRegisters::decode(data)?;
                if regs.resets_pll() {
                    self.pll_locked = true;
                }
                if let Some(page) = regs.run_page() {
                    let start = StartRecord {
                        role: regs.role(),
                        reps: regs.reps(),
                        delay: regs.delay(),
                        page,
                    };
                    self.arm(start, regs.streams_timing());
                } else if regs.role() == DaisyRole::Idle {
                    self.idle(StartRecord {
                        role: DaisyRole::Idle,
                        reps: 0,
                        delay: regs.delay(),
                        page: 0,
                    });
                }
                regs.wants_readback()
            }
        };
        Ok(wants_readback.then(|| {
            DacReadback::new(self.build.number() as u8, self.executions, self.pll_locked)
                .as_bytes()
                .to_vec()
        }))
    }

    fn arm(&mut self, start: StartRecord, streams: bool) {
        self.last_start = Some(start);
        self.armed = Some(Armed { start, streams });
    }

    fn idle(&mut self, start: StartRecord) {
        self.last_start = Some(start);
        self.armed = None;
    }

    /// Executes the pending run and returns the streamed timing packets.
    pub fn fire(&mut self) -> Vec<Vec<u8>> {
        let Some(armed) = self.armed.take() else {
            return Vec::new();
        };
        if self.broken {
            self.executions = 0;
            return Vec::new();
        }
        self.executions = armed.start.reps;
        if !armed.streams {
            return Vec::new();
        }
        let timers = MemorySequence::from(self.memory(armed.start.page as usize).to_vec()).timer_count();
        let values = (0..armed.start.reps as usize * timers)
            .map(|k| k as u16)
            .collect::<Vec<_>>();
        values
            .chunks(TIMING_PACKET_LEN as usize)
            .map(timing_packet)
            .collect()
    }
}

fn timing_packet(values: &[u16]) -> Vec<u8> {
    let mut pkt = vec![0u8; TIMING_PACKET_BYTES];
    values.iter().enumerate().for_each(|(i, v)| {
        let at = TIMING_DATA_OFFSET + 2 * i;
        pkt[at..at + 2].copy_from_slice(&v.to_le_bytes());
    });
    pkt
}
