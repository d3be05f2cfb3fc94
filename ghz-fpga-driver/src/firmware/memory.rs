use std::time::Duration;

use derive_more::{Deref, Display};
use ghz_fpga_core::defined::{MASTER_SRAM_DELAY, MEMORY_CYCLE};

use crate::error::FpgaDriverError;

/// Memory opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[repr(u32)]
pub enum MemoryOpcode {
    /// No operation.
    #[display("NOP")]
    Nop = 0x0,
    /// Fiber 0 output.
    #[display("FO0")]
    FiberOut0 = 0x1,
    /// Fiber 1 output.
    #[display("FO1")]
    FiberOut1 = 0x2,
    /// Delay by `address + 1` cycles.
    #[display("DELAY")]
    Delay = 0x3,
    /// Start or stop the timer.
    #[display("TIMER")]
    Timer = 0x4,
    /// Set the SRAM start address.
    #[display("SRAM_START")]
    SramStart = 0x8,
    /// Set the SRAM end address.
    #[display("SRAM_END")]
    SramEnd = 0xA,
    /// Call SRAM.
    #[display("CALL_SRAM")]
    CallSram = 0xC,
    /// Branch back to the start of the sequence.
    #[display("BRANCH")]
    BranchToStart = 0xF,
}

/// Largest address or delay of a memory command.
pub const MAX_MEMORY_ADDRESS: u32 = 0xF_FFFF;

const STOP_TIMER: u32 = 0x400001;
const SRAM_CALL_CYCLES: u64 = 25 * 12;

/// Opcode of a memory command.
#[must_use]
pub const fn opcode(cmd: u32) -> u32 {
    (cmd & 0xF0_0000) >> 20
}

/// Address or payload of a memory command.
#[must_use]
pub const fn address(cmd: u32) -> u32 {
    cmd & MAX_MEMORY_ADDRESS
}

const fn command(op: MemoryOpcode, addr: u32) -> u32 {
    ((op as u32) << 20) + (addr & MAX_MEMORY_ADDRESS)
}

/// A memory sequence of 24-bit commands.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deref)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemorySequence(Vec<u32>);

impl From<Vec<u32>> for MemorySequence {
    fn from(cmds: Vec<u32>) -> Self {
        Self(cmds)
    }
}

impl From<MemorySequence> for Vec<u32> {
    fn from(seq: MemorySequence) -> Self {
        seq.0
    }
}

impl MemorySequence {
    /// An empty sequence.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    fn push(mut self, cmd: u32) -> Self {
        self.0.push(cmd);
        self
    }

    /// No operation.
    #[must_use]
    pub fn nop(self) -> Self {
        self.push(command(MemoryOpcode::Nop, 0))
    }

    /// Delay by `cycles + 1` memory cycles.
    pub fn delay_cycles(self, cycles: u32) -> Result<Self, FpgaDriverError> {
        if cycles > MAX_MEMORY_ADDRESS {
            return Err(FpgaDriverError::DelayTooLong(cycles as u64));
        }
        Ok(self.push(command(MemoryOpcode::Delay, cycles)))
    }

    /// Send `data` to fiber `channel` (0 or 1).
    pub fn fiber_out(self, channel: u8, data: u32) -> Result<Self, FpgaDriverError> {
        let op = match channel {
            0 => MemoryOpcode::FiberOut0,
            1 => MemoryOpcode::FiberOut1,
            _ => {
                return Err(FpgaDriverError::RegisterFieldOutOfRange {
                    field: "fiber",
                    value: channel as u64,
                    max: 1,
                })
            }
        };
        Ok(self.push(command(op, data)))
    }

    /// Set the SRAM start address.
    #[must_use]
    pub fn sram_start_address(self, addr: u32) -> Self {
        self.push(command(MemoryOpcode::SramStart, addr))
    }

    /// Set the SRAM end address.
    #[must_use]
    pub fn sram_end_address(self, addr: u32) -> Self {
        self.push(command(MemoryOpcode::SramEnd, addr))
    }

    /// Call SRAM.
    #[must_use]
    pub fn call_sram(self) -> Self {
        self.push(command(MemoryOpcode::CallSram, 0))
    }

    /// Start the timer.
    #[must_use]
    pub fn start_timer(self) -> Self {
        self.push(command(MemoryOpcode::Timer, 0))
    }

    /// Stop the timer.
    #[must_use]
    pub fn stop_timer(self) -> Self {
        self.push(STOP_TIMER)
    }

    /// Branch back to the start.
    #[must_use]
    pub fn branch_to_start(self) -> Self {
        self.push(command(MemoryOpcode::BranchToStart, 0))
    }

    /// Number of timer stops, i.e. timing results per repetition.
    #[must_use]
    pub fn timer_count(&self) -> usize {
        self.0.iter().filter(|&&c| c == STOP_TIMER).count()
    }

    /// Number of SRAM calls.
    #[must_use]
    pub fn sram_calls(&self) -> usize {
        self.0
            .iter()
            .filter(|&&c| opcode(c) == MemoryOpcode::CallSram as u32)
            .count()
    }

    /// Largest SRAM address set by a start or end command.
    #[must_use]
    pub fn max_sram_address(&self) -> u32 {
        self.0
            .iter()
            .filter(|&&c| is_sram_address(c))
            .map(|&c| address(c))
            .max()
            .unwrap_or(0)
    }

    /// Conservative estimate of the execution time of one repetition.
    pub fn sequence_time(&self) -> Result<Duration, FpgaDriverError> {
        let cycles = self
            .0
            .iter()
            .map(|&c| command_cycles(c))
            .sum::<Result<u64, _>>()?;
        Ok(MEMORY_CYCLE * cycles as u32)
    }

    /// Inserts a delay before every SRAM call, for the master board.
    #[must_use]
    pub fn add_master_delay(&self) -> Self {
        let delay = command(
            MemoryOpcode::Delay,
            (MASTER_SRAM_DELAY.as_nanos() / MEMORY_CYCLE.as_nanos()) as u32,
        );
        Self(
            self.0
                .iter()
                .flat_map(|&c| {
                    (opcode(c) == MemoryOpcode::CallSram as u32)
                        .then_some(delay)
                        .into_iter()
                        .chain(std::iter::once(c))
                })
                .collect(),
        )
    }

    /// Moves SRAM addresses into `page`.
    #[must_use]
    pub fn shift_sram(&self, page: usize, page_len: usize) -> Self {
        let offset = (page * page_len) as u32;
        Self(
            self.0
                .iter()
                .map(|&c| if is_sram_address(c) { c + offset } else { c })
                .collect(),
        )
    }

    /// Rewrites SRAM addresses for a dual-block SRAM.
    ///
    /// `block0_len` and `block1_len` are the used lengths of each block in words.
    pub fn fix_dual_block_addresses(
        &self,
        block0_len: usize,
        block1_len: usize,
        delay_blocks: usize,
        physical_block0_len: usize,
        delay_len: usize,
    ) -> Result<Self, FpgaDriverError> {
        let calls = self.sram_calls();
        if calls > 1 {
            return Err(FpgaDriverError::MultipleSramCalls(calls));
        }
        let start = physical_block0_len.saturating_sub(block0_len) as u32;
        let end = (physical_block0_len + block1_len + delay_len * delay_blocks)
            .saturating_sub(1) as u32;
        Ok(Self(
            self.0
                .iter()
                .map(|&c| match opcode(c) {
                    0x8 => command(MemoryOpcode::SramStart, start),
                    0xA => command(MemoryOpcode::SramEnd, end),
                    _ => c,
                })
                .collect(),
        ))
    }
}

const fn is_sram_address(cmd: u32) -> bool {
    matches!(opcode(cmd), 0x8 | 0xA)
}

fn command_cycles(cmd: u32) -> Result<u64, FpgaDriverError> {
    match opcode(cmd) {
        0x0 | 0x1 | 0x2 | 0x4 | 0x8 | 0xA => Ok(1),
        0xF => Ok(2),
        0x3 => Ok(address(cmd) as u64 + 1),
        0xC => Ok(SRAM_CALL_CYCLES),
        op => Err(FpgaDriverError::UnknownMemoryOpcode(op, cmd)),
    }
}
