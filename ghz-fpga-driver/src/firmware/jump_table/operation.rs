use derive_more::Display;

use crate::error::FpgaDriverError;

const OP_NOP: u16 = 0b0101;
const OP_END: u16 = 0b0111;
const OP_JUMP: u16 = 0b1101;
const OP_CYCLE: u16 = 0b011;

/// Largest jump index encodable in an opcode.
pub const MAX_JUMP_INDEX: u32 = 0x3F;

/// Operation performed by a jump table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operation {
    /// Idle for a number of FPGA cycles.
    #[display("IDLE {cycles} cycles")]
    Idle {
        /// Number of cycles.
        cycles: u32,
    },
    /// Do nothing.
    #[display("NOP")]
    Nop,
    /// Jump to the to address and activate entry `index`.
    #[display("JUMP -> {index}")]
    Jump {
        /// Entry activated after the jump.
        index: u32,
    },
    /// Cycle back to the to address until `counter` expires, then activate entry `index`.
    #[display("CYCLE counter={counter} -> {index}")]
    Cycle {
        /// Counter incremented on each cycle.
        counter: u32,
        /// Entry activated while the cycle is not done.
        index: u32,
    },
    /// Stop the sequence.
    #[display("END")]
    End,
}

impl Operation {
    /// Encodes the 16-bit opcode.
    ///
    /// ```text
    /// IDLE   dddddddd ddddddd0
    /// NOP    xxxxxxxx xxxx0101
    /// JUMP   xxjjjjjj xxxx1101
    /// CYCLE  xxjjjjjj xxccx011
    /// END    xxxxxxxx xxxxx111
    /// ```
    pub fn opcode(&self, idle_bits: u32) -> Result<u16, FpgaDriverError> {
        match *self {
            Self::Idle { cycles } => {
                if cycles >= 1 << idle_bits {
                    return Err(FpgaDriverError::IdleCyclesOutOfRange(cycles));
                }
                Ok((cycles << 1) as u16)
            }
            Self::Nop => Ok(OP_NOP),
            Self::Jump { index } => {
                Self::check_index(index)?;
                Ok(((index << 8) as u16) + OP_JUMP)
            }
            Self::Cycle { counter, index } => {
                Self::check_index(index)?;
                if counter > 3 {
                    return Err(FpgaDriverError::CounterIndexOutOfRange(counter, 4));
                }
                Ok(((index << 8) as u16) + ((counter << 4) as u16) + OP_CYCLE)
            }
            Self::End => Ok(OP_END),
        }
    }

    fn check_index(index: u32) -> Result<(), FpgaDriverError> {
        if index > MAX_JUMP_INDEX {
            return Err(FpgaDriverError::JumpIndexOutOfRange(index, MAX_JUMP_INDEX));
        }
        Ok(())
    }

    /// Decodes a 16-bit opcode.
    pub fn from_opcode(op: u16) -> Result<Self, FpgaDriverError> {
        if op & 1 == 0 {
            return Ok(Self::Idle {
                cycles: (op >> 1) as u32,
            });
        }
        let index = ((op >> 8) & 0x3F) as u32;
        match op & 0b1111 {
            OP_NOP => return Ok(Self::Nop),
            OP_JUMP => return Ok(Self::Jump { index }),
            _ => {}
        }
        match op & 0b111 {
            OP_END => Ok(Self::End),
            OP_CYCLE => Ok(Self::Cycle {
                counter: ((op >> 4) & 0b11) as u32,
                index,
            }),
            _ => Err(FpgaDriverError::InvalidOpcode(op)),
        }
    }
}
