mod command;
mod entry;
mod operation;

pub use command::{
    convert_end_address, convert_from_address, convert_idle_duration, convert_index,
    convert_to_address, JumpCommand, JumpCommandKind,
};
pub use entry::JumpEntry;
pub use operation::{Operation, MAX_JUMP_INDEX};

use entry::RawJumpEntry;
use itertools::Itertools;
use zerocopy::{FromBytes, IntoBytes};

use super::build::JumpTableBuild;
use crate::error::FpgaDriverError;

const COUNTERS_OFFSET: usize = 0;
const START_ADDR_OFFSET: usize = 16;
const NOP_OFFSET: usize = 22;
const ENTRIES_OFFSET: usize = 24;
const ENTRY_SIZE: usize = 8;

/// A jump table: counters, a start address and an ordered list of entries.
///
/// Entry 0 on the hardware is always a NOP placeholder, so user entries start at index 1.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JumpTable {
    start_addr: u32,
    entries: Vec<JumpEntry>,
    counters: Vec<u32>,
}

impl JumpTable {
    /// Creates a jump table starting at `start_ns`.
    ///
    /// Missing counters are zero.
    pub fn new(
        build: &JumpTableBuild,
        entries: Vec<JumpEntry>,
        counters: &[u32],
        start_ns: u32,
    ) -> Result<Self, FpgaDriverError> {
        if counters.len() > build.num_counters {
            return Err(FpgaDriverError::TooManyCounters(
                counters.len(),
                build.num_counters,
            ));
        }
        let max_entries = build.entry_capacity() - 1;
        if entries.len() > max_entries {
            return Err(FpgaDriverError::TooManyJumpEntries(
                entries.len(),
                max_entries,
            ));
        }
        if let Some(((i, a), (j, b))) = entries
            .iter()
            .enumerate()
            .tuple_combinations()
            .find(|((_, a), (_, b))| a.from_addr().abs_diff(b.from_addr()) < build.min_from_spacing)
        {
            return Err(FpgaDriverError::JumpEntriesTooClose(
                i,
                a.operation().to_string(),
                j,
                b.operation().to_string(),
            ));
        }
        let mut counters = counters.to_vec();
        counters.resize(build.num_counters, 0);
        Ok(Self {
            start_addr: convert_to_address(build, start_ns)?,
            entries,
            counters,
        })
    }

    /// A table that plays SRAM from `start_ns` to `end_ns`, either once or in a loop.
    pub fn run_sram(
        build: &JumpTableBuild,
        start_ns: u32,
        end_ns: u32,
        looping: bool,
    ) -> Result<Self, FpgaDriverError> {
        let entry = if looping {
            JumpEntry::new(
                convert_from_address(build, end_ns)?,
                convert_to_address(build, start_ns)?,
                Operation::Jump { index: 1 },
            )?
        } else {
            JumpEntry::new(convert_end_address(build, end_ns)?, 0, Operation::End)?
        };
        Self::new(build, vec![entry], &[], start_ns)
    }

    /// SRAM start address in cells.
    #[must_use]
    pub const fn start_addr(&self) -> u32 {
        self.start_addr
    }

    /// User entries.
    #[must_use]
    pub fn entries(&self) -> &[JumpEntry] {
        &self.entries
    }

    /// Counter values.
    #[must_use]
    pub fn counters(&self) -> &[u32] {
        &self.counters
    }

    /// Serializes into the jump table write packet.
    pub fn to_bytes(&self, build: &JumpTableBuild) -> Result<Vec<u8>, FpgaDriverError> {
        let mut data = vec![0u8; build.table_len];
        self.counters.iter().enumerate().for_each(|(i, c)| {
            let ofs = COUNTERS_OFFSET + i * 4;
            data[ofs..ofs + 4].copy_from_slice(&c.to_le_bytes());
        });
        let start = &self.start_addr.to_le_bytes()[..3];
        data[START_ADDR_OFFSET..START_ADDR_OFFSET + 3].copy_from_slice(start);
        data[START_ADDR_OFFSET + 3..START_ADDR_OFFSET + 6].copy_from_slice(start);
        data[NOP_OFFSET..NOP_OFFSET + 2].copy_from_slice(
            &Operation::Nop
                .opcode(build.idle_bits)?
                .to_le_bytes(),
        );
        self.entries.iter().enumerate().try_for_each(|(i, e)| {
            let ofs = ENTRIES_OFFSET + i * ENTRY_SIZE;
            data[ofs..ofs + ENTRY_SIZE].copy_from_slice(e.encode(build.idle_bits)?.as_bytes());
            Ok::<_, FpgaDriverError>(())
        })?;
        Ok(data)
    }

    /// Parses a jump table write packet.
    ///
    /// Trailing all-zero entries are treated as unused.
    pub fn decode(build: &JumpTableBuild, data: &[u8]) -> Result<Self, FpgaDriverError> {
        if data.len() < build.table_len {
            return Err(FpgaDriverError::PacketTooShort {
                expected: build.table_len,
                actual: data.len(),
            });
        }
        let counters = data[COUNTERS_OFFSET..COUNTERS_OFFSET + build.num_counters * 4]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let start_addr = u32::from_le_bytes([
            data[START_ADDR_OFFSET],
            data[START_ADDR_OFFSET + 1],
            data[START_ADDR_OFFSET + 2],
            0,
        ]);
        let raw = data[ENTRIES_OFFSET..build.table_len]
            .chunks_exact(ENTRY_SIZE)
            .map(|c| RawJumpEntry::read_from_bytes(c).unwrap_or_default())
            .collect::<Vec<_>>();
        let used = raw
            .iter()
            .rposition(|r| r.into_bits() != 0)
            .map_or(0, |p| p + 1);
        let entries = raw[..used]
            .iter()
            .map(|&r| JumpEntry::decode(r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            start_addr,
            entries,
            counters,
        })
    }
}
