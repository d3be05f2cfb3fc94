use ghz_fpga_core::{board::BoardType, link::TransportError};
use thiserror::Error;

/// An interface for error handling in ghz-fpga-driver.
#[derive(Error, Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum FpgaDriverError {
    /// No build parameters are known for the board.
    #[error("Unknown build {1} for {0} boards")]
    UnknownBuild(BoardType, u32),
    /// The board does not support the requested feature.
    #[error("{board} does not support {feature}")]
    NotSupported {
        /// Board name.
        board: String,
        /// Requested feature.
        feature: &'static str,
    },
    /// A required piece of sequence data has not been set.
    #[error("No {what} set for board {board}")]
    MissingSequenceData {
        /// Board name.
        board: String,
        /// Missing data.
        what: &'static str,
    },

    /// A register field does not fit into its byte range.
    #[error("Register field {field} ({value}) is out of range ([0, {max}])")]
    RegisterFieldOutOfRange {
        /// Field name.
        field: &'static str,
        /// Requested value.
        value: u64,
        /// Largest encodable value.
        max: u64,
    },
    /// A packet is shorter than its layout.
    #[error("Packet is too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort {
        /// Required length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// A jump table address is not a multiple of the clock period.
    #[error("Jump table {1} address ({0} ns) must be a multiple of 4 ns")]
    JumpAddressNotAligned(u32, &'static str),
    /// A jump table address or duration is outside the legal window.
    #[error("Jump table {kind} ({value} ns) is out of range ([{min}, {max}] ns)")]
    JumpAddressOutOfRange {
        /// Address kind.
        kind: &'static str,
        /// Requested value in ns.
        value: u32,
        /// Lower bound in ns.
        min: u32,
        /// Upper bound in ns.
        max: u32,
    },
    /// The from and to addresses of an entry are adjacent.
    #[error("from_addr ({0}) and to_addr ({1}) are too close")]
    JumpEntryAddressesTooClose(u32, u32),
    /// Two entries fire within the minimum spacing.
    #[error("Entries {0} ({1}) and {2} ({3}) have from addresses too close together")]
    JumpEntriesTooClose(usize, String, usize, String),
    /// Too many jump table entries.
    #[error("Jump table has {0} entries, but at most {1} are allowed")]
    TooManyJumpEntries(usize, usize),
    /// Too many counters.
    #[error("Jump table has {0} counters, but at most {1} are allowed")]
    TooManyCounters(usize, usize),
    /// Counter index out of range.
    #[error("Cannot use counter {0} (there are {1} counters)")]
    CounterIndexOutOfRange(u32, usize),
    /// Jump index out of range.
    #[error("Jump index ({0}) is out of range ([0, {1}])")]
    JumpIndexOutOfRange(u32, u32),
    /// Idle duration does not fit into the opcode.
    #[error("IDLE cycles ({0}) must fit in 15 bits")]
    IdleCyclesOutOfRange(u32),
    /// Unknown jump table command name.
    #[error("'{0}' is not a valid jump table command")]
    UnknownJumpCommand(String),
    /// Jump table command known to the hardware but not supported.
    #[error("{0} is not implemented")]
    UnsupportedJumpCommand(String),
    /// Wrong number of arguments for a jump table command.
    #[error("{name} takes {expected} arguments, but {actual} were given")]
    InvalidJumpArguments {
        /// Command name.
        name: &'static str,
        /// Expected argument count.
        expected: usize,
        /// Actual argument count.
        actual: usize,
    },
    /// Opcode word not understood by the decoder.
    #[error("Invalid jump table opcode: {0:#06X}")]
    InvalidOpcode(u16),

    /// Unknown memory command.
    #[error("Unknown memory opcode: {0:#X} (command {1:#08X})")]
    UnknownMemoryOpcode(u32, u32),
    /// Memory sequence longer than one page.
    #[error("Memory length {0} exceeds maximum length {1} (one page)")]
    MemoryTooLong(usize, usize),
    /// SRAM data longer than the SRAM.
    #[error("SRAM length {0} exceeds maximum length {1}")]
    SramTooLong(usize, usize),
    /// Dual-block sequences can call SRAM only once.
    #[error("Only one SRAM call allowed in multi-block sequences, found {0}")]
    MultipleSramCalls(usize),
    /// Delay does not fit into a memory delay command.
    #[error("Delay of {0} cycles does not fit into a memory command")]
    DelayTooLong(u64),

    /// Trigger table is empty.
    #[error("Trigger table is empty")]
    TriggerTableEmpty,
    /// Trigger table has too many rows.
    #[error("Trigger table max len = {1}, got {0}")]
    TriggerTableTooLong(usize, usize),
    /// First row has no delay.
    #[error("Trigger table row0 rdelay is 0")]
    TriggerRowZeroDelay,
    /// A trigger row field does not fit into the table.
    #[error("Trigger table row {row}: {field} ({value}) is out of range ([{min}, {max}])")]
    TriggerRowOutOfRange {
        /// Row index.
        row: usize,
        /// Field name.
        field: &'static str,
        /// Requested value.
        value: u32,
        /// Lower bound.
        min: u32,
        /// Upper bound.
        max: u32,
    },
    /// Trigger rows closer than the FIFO can handle.
    #[error("rdelay < 50 clock cycles (200 ns) can cause FIFO backup (row {0})")]
    TriggerFifoBackup(usize),
    /// Demod channel out of range.
    #[error("Demod channel ({0}) is out of range ([0, {1}))")]
    DemodChannelOutOfRange(usize, usize),
    /// Mixer table too long.
    #[error("Mixer table has {0} entries, but at most {1} are allowed")]
    MixerTableTooLong(usize, usize),
    /// Trigger rows request different channel counts.
    #[error("Unequal rchans: {0:?} not supported")]
    UnequalChannelCounts(Vec<u8>),
    /// Demod packet count does not match the trigger table.
    #[error("Wrong number of packets: {0} not a multiple of pkt_per_stat: {1}")]
    PacketCountMismatch(usize, usize),
    /// The ADC cannot start the daisy chain.
    #[error("Cannot use ADC board '{0}' as master")]
    AdcAsMaster(String),

    /// Error in the transport.
    #[error("{0}")]
    Transport(#[from] TransportError),
}
