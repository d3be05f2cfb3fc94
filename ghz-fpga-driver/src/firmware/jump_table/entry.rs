use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::Operation;
use crate::{error::FpgaDriverError, firmware::check_field};

const MAX_ADDR: u64 = 0xFF_FFFF;

#[bitfield_struct::bitfield(u64)]
#[derive(IntoBytes, FromBytes, Immutable, KnownLayout)]
pub(crate) struct RawJumpEntry {
    #[bits(24)]
    pub from_addr: u32,
    #[bits(24)]
    pub to_addr: u32,
    #[bits(16)]
    pub opcode: u16,
}

/// A single jump table entry in SRAM units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JumpEntry {
    from_addr: u32,
    to_addr: u32,
    operation: Operation,
}

impl JumpEntry {
    /// Creates an entry firing at `from_addr` and continuing at `to_addr` (0 if unused).
    pub fn new(from_addr: u32, to_addr: u32, operation: Operation) -> Result<Self, FpgaDriverError> {
        check_field("from_addr", from_addr as u64, MAX_ADDR)?;
        check_field("to_addr", to_addr as u64, MAX_ADDR)?;
        if from_addr.abs_diff(to_addr) == 1 {
            return Err(FpgaDriverError::JumpEntryAddressesTooClose(from_addr, to_addr));
        }
        Ok(Self {
            from_addr,
            to_addr,
            operation,
        })
    }

    /// SRAM cell at which this entry fires.
    #[must_use]
    pub const fn from_addr(&self) -> u32 {
        self.from_addr
    }

    /// SRAM cell at which the sequence continues.
    #[must_use]
    pub const fn to_addr(&self) -> u32 {
        self.to_addr
    }

    /// Operation performed.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    pub(crate) fn encode(&self, idle_bits: u32) -> Result<RawJumpEntry, FpgaDriverError> {
        Ok(RawJumpEntry::new()
            .with_from_addr(self.from_addr)
            .with_to_addr(self.to_addr)
            .with_opcode(self.operation.opcode(idle_bits)?))
    }

    pub(crate) fn decode(raw: RawJumpEntry) -> Result<Self, FpgaDriverError> {
        Ok(Self {
            from_addr: raw.from_addr(),
            to_addr: raw.to_addr(),
            operation: Operation::from_opcode(raw.opcode())?,
        })
    }
}
