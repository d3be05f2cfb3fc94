use ghz_fpga_core::board::BoardType;

use crate::error::FpgaDriverError;

/// Number of SRAM words written by one SRAM write packet.
pub const SRAM_WRITE_PKT_LEN: usize = 256;

/// Constants of the DAC builds driven by a memory sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryBuild {
    /// SRAM length in words.
    pub sram_len: usize,
    /// SRAM page length in words.
    pub sram_page_len: usize,
    /// Length of one inter-block delay in words.
    pub sram_delay_len: usize,
    /// Physical length of block 0 in words.
    pub sram_block0_len: usize,
    /// Physical length of block 1 in words.
    pub sram_block1_len: usize,
    /// Memory length in words.
    pub mem_len: usize,
    /// Memory page length in words.
    pub mem_page_len: usize,
}

/// Constants of the DAC builds driven by a jump table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JumpTableBuild {
    /// SRAM length in words.
    pub sram_len: usize,
    /// Jump table packet length in bytes.
    pub table_len: usize,
    /// Number of counters.
    pub num_counters: usize,
    /// Minimum distance between the from addresses of two entries.
    pub min_from_spacing: u32,
    /// Offset applied to from addresses.
    pub from_offset: i64,
    /// Offset applied to the from address of END entries.
    pub end_offset: i64,
    /// Offset applied to IDLE durations.
    pub idle_offset: i64,
    /// Offset applied to jump indices (the leading NOP occupies index 0).
    pub idx_offset: u32,
    /// Number of bits of an IDLE duration.
    pub idle_bits: u32,
    /// Default monitor 0 selector.
    pub monitor_0: u8,
    /// Default monitor 1 selector.
    pub monitor_1: u8,
}

impl JumpTableBuild {
    /// Number of 8-byte entries (including the leading NOP) that fit into the table.
    #[must_use]
    pub const fn entry_capacity(&self) -> usize {
        (self.table_len - self.num_counters * 4) / 8
    }
}

/// Constants of the ADC builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdcBuild {
    /// Number of demodulator channels.
    pub demod_channels: usize,
    /// Number of I/Q pairs carried by a demod packet.
    pub channels_per_packet: usize,
    /// Demod packet length in bytes.
    pub demod_packet_len: usize,
    /// Number of packets returned by an average-mode run.
    pub average_packets: usize,
    /// Average packet length in bytes.
    pub average_packet_len: usize,
    /// Retrigger table packet length in bytes.
    pub retrigger_pkt_len: usize,
    /// Mixer table packet length in bytes.
    pub mixer_pkt_len: usize,
    /// Maximum number of trigger table rows.
    pub max_trigger_rows: usize,
    /// Maximum number of mixer table entries.
    pub mixer_table_len: usize,
}

/// Build-specific constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildParams {
    /// DAC driven by a memory sequence.
    DacMemory(MemoryBuild),
    /// DAC driven by a jump table.
    DacJumpTable(JumpTableBuild),
    /// ADC with trigger and mixer tables.
    Adc(AdcBuild),
}

/// An entry of the build table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Build {
    board_type: BoardType,
    number: u32,
    params: BuildParams,
}

impl Build {
    /// The board type.
    #[must_use]
    pub const fn board_type(&self) -> BoardType {
        self.board_type
    }

    /// The build number.
    #[must_use]
    pub const fn number(&self) -> u32 {
        self.number
    }

    /// The build constants.
    #[must_use]
    pub const fn params(&self) -> &BuildParams {
        &self.params
    }

    /// Looks up the build table.
    pub fn find(board_type: BoardType, number: u32) -> Result<&'static Build, FpgaDriverError> {
        BUILDS
            .iter()
            .find(|b| b.board_type == board_type && b.number == number)
            .ok_or(FpgaDriverError::UnknownBuild(board_type, number))
    }
}

const MEMORY_SMALL: MemoryBuild = MemoryBuild {
    sram_len: 10240,
    sram_page_len: 5120,
    sram_delay_len: 1024,
    sram_block0_len: 8192,
    sram_block1_len: 2048,
    mem_len: 512,
    mem_page_len: 256,
};

const MEMORY_LARGE: MemoryBuild = MemoryBuild {
    sram_len: 18432,
    sram_page_len: 9216,
    sram_block0_len: 16384,
    ..MEMORY_SMALL
};

const JUMP_TABLE: JumpTableBuild = JumpTableBuild {
    sram_len: 18432,
    table_len: 528,
    num_counters: 4,
    min_from_spacing: 2,
    from_offset: -2,
    end_offset: -3,
    idle_offset: 0,
    idx_offset: 1,
    idle_bits: 15,
    monitor_0: 5,
    monitor_1: 10,
};

const ADC_BRANCH2: AdcBuild = AdcBuild {
    demod_channels: 12,
    channels_per_packet: 11,
    demod_packet_len: 48,
    average_packets: 16,
    average_packet_len: 1024,
    retrigger_pkt_len: 1026,
    mixer_pkt_len: 1026,
    max_trigger_rows: 128,
    mixer_table_len: 512,
};

static BUILDS: [Build; 6] = [
    Build {
        board_type: BoardType::Dac,
        number: 7,
        params: BuildParams::DacMemory(MEMORY_SMALL),
    },
    Build {
        board_type: BoardType::Dac,
        number: 8,
        params: BuildParams::DacMemory(MEMORY_LARGE),
    },
    Build {
        board_type: BoardType::Dac,
        number: 11,
        params: BuildParams::DacMemory(MEMORY_SMALL),
    },
    Build {
        board_type: BoardType::Dac,
        number: 12,
        params: BuildParams::DacMemory(MEMORY_LARGE),
    },
    Build {
        board_type: BoardType::Dac,
        number: 15,
        params: BuildParams::DacJumpTable(JUMP_TABLE),
    },
    Build {
        board_type: BoardType::Adc,
        number: 7,
        params: BuildParams::Adc(ADC_BRANCH2),
    },
];
