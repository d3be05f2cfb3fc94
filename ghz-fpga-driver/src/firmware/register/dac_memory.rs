use ghz_fpga_core::defined::NUM_PAGES;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use super::DaisyRole;
use crate::{
    error::FpgaDriverError,
    firmware::{build::MemoryBuild, check_field},
};

const START_NONE: u8 = 0;
const START_RUN: u8 = 1;
const START_SRAM_LOOP: u8 = 3;
const START_SRAM_ONCE: u8 = 4;

const READBACK_NONE: u8 = 0;
const READBACK_AFTER_2US: u8 = 1;
const READBACK_STREAM_TIMING: u8 = 3;

const PLL_RESET: u8 = 0x80;

/// Register packet of the DAC builds driven by a memory sequence.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct DacMemoryRegisters {
    start: u8,
    readback: u8,
    _reserved0: [u8; 11],
    sequence: [u8; 6],
    block_delay: u8,
    _reserved1: [u8; 23],
    daisy: u8,
    delay_low: u8,
    sync: u8,
    clock: u8,
    serial_op: u8,
    serial_data: [u8; 3],
    delay_high: u8,
    _reserved2: [u8; 4],
}

impl DacMemoryRegisters {
    /// Packet length in bytes.
    pub const LEN: usize = 56;

    fn zeroed() -> Self {
        Self::new_zeroed()
    }

    /// Run the memory sequence stored in `page`.
    pub fn run(
        reps: u32,
        page: usize,
        role: DaisyRole,
        delay: u32,
        block_delay: Option<u32>,
        sync: u8,
    ) -> Result<Self, FpgaDriverError> {
        check_field("reps", reps as u64, u16::MAX as u64)?;
        check_field("page", page as u64, (NUM_PAGES - 1) as u64)?;
        check_field("delay", delay as u64, u16::MAX as u64)?;
        if let Some(block_delay) = block_delay {
            check_field("block_delay", block_delay as u64, u8::MAX as u64)?;
        }
        let mut regs = Self::zeroed();
        regs.start = START_RUN + ((page as u8) << 7);
        regs.readback = READBACK_STREAM_TIMING;
        regs.sequence[0..2].copy_from_slice(&(reps as u16).to_le_bytes());
        regs.block_delay = block_delay.unwrap_or(0) as u8;
        regs.daisy = match role {
            DaisyRole::Master => 0,
            DaisyRole::Slave => 1,
            DaisyRole::Idle => 3,
        };
        let [low, high] = (delay as u16).to_le_bytes();
        regs.delay_low = low;
        regs.delay_high = high;
        regs.sync = sync;
        Ok(regs)
    }

    /// Do not start, only pass the daisy chain pulse through.
    pub fn idle(delay: u32) -> Result<Self, FpgaDriverError> {
        check_field("delay", delay as u64, u8::MAX as u64)?;
        let mut regs = Self::zeroed();
        regs.start = START_NONE;
        regs.readback = READBACK_NONE;
        regs.daisy = 3;
        regs.delay_low = delay as u8;
        Ok(regs)
    }

    /// Request a readback without starting.
    #[must_use]
    pub fn ping() -> Self {
        let mut regs = Self::zeroed();
        regs.readback = READBACK_AFTER_2US;
        regs
    }

    /// Send a word through the serial interface.
    pub fn serial(op: u8, data: u32) -> Result<Self, FpgaDriverError> {
        check_field("serial data", data as u64, 0xFF_FFFF)?;
        let mut regs = Self::ping();
        regs.serial_op = op;
        regs.serial_data.copy_from_slice(&data.to_le_bytes()[..3]);
        Ok(regs)
    }

    /// Reset the 1 GHz PLL.
    #[must_use]
    pub fn pll_reset() -> Self {
        let mut regs = Self::ping();
        regs.clock = PLL_RESET;
        regs
    }

    /// Run SRAM directly between `start` and `end` without a memory sequence.
    pub fn run_sram(
        build: &MemoryBuild,
        start: u32,
        end: u32,
        looping: bool,
        block_delay: u32,
        sync: u8,
    ) -> Result<Self, FpgaDriverError> {
        check_field("block_delay", block_delay as u64, u8::MAX as u64)?;
        let end = (end as u64 + (build.sram_delay_len as u64) * block_delay as u64)
            .checked_sub(1)
            .unwrap_or_default();
        check_field("SRAM start address", start as u64, 0xFF_FFFF)?;
        check_field("SRAM end address", end, 0xFF_FFFF)?;
        let mut regs = Self::zeroed();
        regs.start = if looping {
            START_SRAM_LOOP
        } else {
            START_SRAM_ONCE
        };
        regs.readback = READBACK_NONE;
        regs.sequence[0..3].copy_from_slice(&start.to_le_bytes()[..3]);
        regs.sequence[3..6].copy_from_slice(&(end as u32).to_le_bytes()[..3]);
        regs.block_delay = block_delay as u8;
        regs.sync = sync;
        Ok(regs)
    }

    /// Decodes a register packet.
    pub fn decode(data: &[u8]) -> Result<Self, FpgaDriverError> {
        Self::read_from_prefix(data)
            .map(|(regs, _)| regs)
            .map_err(|_| FpgaDriverError::PacketTooShort {
                expected: Self::LEN,
                actual: data.len(),
            })
    }

    /// Whether this packet starts a memory sequence, and on which page.
    #[must_use]
    pub const fn run_page(&self) -> Option<u8> {
        if self.start & 0x7F == START_RUN {
            Some(self.start >> 7)
        } else {
            None
        }
    }

    /// Whether this packet requests a readback.
    #[must_use]
    pub const fn wants_readback(&self) -> bool {
        self.readback == READBACK_AFTER_2US
    }

    /// Whether timing data is streamed back.
    #[must_use]
    pub const fn streams_timing(&self) -> bool {
        self.readback == READBACK_STREAM_TIMING
    }

    /// Repetition count.
    #[must_use]
    pub fn reps(&self) -> u16 {
        u16::from_le_bytes([self.sequence[0], self.sequence[1]])
    }

    /// Role in the daisy chain.
    #[must_use]
    pub const fn role(&self) -> DaisyRole {
        match self.daisy {
            0 => DaisyRole::Master,
            1 => DaisyRole::Slave,
            _ => DaisyRole::Idle,
        }
    }

    /// Start delay.
    #[must_use]
    pub const fn delay(&self) -> u16 {
        u16::from_le_bytes([self.delay_low, self.delay_high])
    }

    /// Number of delay blocks between SRAM block 0 and block 1.
    #[must_use]
    pub const fn block_delay(&self) -> u8 {
        self.block_delay
    }

    /// Master sync value.
    #[must_use]
    pub const fn sync(&self) -> u8 {
        self.sync
    }

    /// Whether this packet resets the PLL.
    #[must_use]
    pub const fn resets_pll(&self) -> bool {
        self.clock & PLL_RESET != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size() {
        assert_eq!(DacMemoryRegisters::LEN, size_of::<DacMemoryRegisters>());
        assert_eq!(13, std::mem::offset_of!(DacMemoryRegisters, sequence));
        assert_eq!(19, std::mem::offset_of!(DacMemoryRegisters, block_delay));
        assert_eq!(43, std::mem::offset_of!(DacMemoryRegisters, daisy));
        assert_eq!(44, std::mem::offset_of!(DacMemoryRegisters, delay_low));
        assert_eq!(45, std::mem::offset_of!(DacMemoryRegisters, sync));
        assert_eq!(46, std::mem::offset_of!(DacMemoryRegisters, clock));
        assert_eq!(47, std::mem::offset_of!(DacMemoryRegisters, serial_op));
        assert_eq!(51, std::mem::offset_of!(DacMemoryRegisters, delay_high));
    }

    #[rstest::rstest]
    #[test]
    #[case(0x01, 0, DaisyRole::Master, 0x00)]
    #[case(0x81, 1, DaisyRole::Slave, 0x01)]
    #[case(0x01, 0, DaisyRole::Idle, 0x03)]
    fn run(
        #[case] expect_start: u8,
        #[case] page: usize,
        #[case] role: DaisyRole,
        #[case] expect_daisy: u8,
    ) -> anyhow::Result<()> {
        let regs = DacMemoryRegisters::run(30, page, role, 0x1234, Some(2), 249)?;
        let bytes = regs.as_bytes();
        assert_eq!(expect_start, bytes[0]);
        assert_eq!(3, bytes[1]);
        assert_eq!([30, 0], bytes[13..15]);
        assert_eq!(2, bytes[19]);
        assert_eq!(expect_daisy, bytes[43]);
        assert_eq!(0x34, bytes[44]);
        assert_eq!(249, bytes[45]);
        assert_eq!(0x12, bytes[51]);
        assert_eq!(regs, DacMemoryRegisters::decode(bytes)?);
        assert_eq!(Some(page as u8), regs.run_page());
        assert_eq!(role, regs.role());
        assert_eq!(0x1234, regs.delay());
        Ok(())
    }

    #[rstest::rstest]
    #[test]
    #[case(65535, true)]
    #[case(65536, false)]
    #[case(65550, false)]
    fn reps_field(#[case] reps: u32, #[case] ok: bool) {
        let r = DacMemoryRegisters::run(reps, 0, DaisyRole::Master, 0, None, 249);
        if ok {
            assert_eq!(reps as u16, r.unwrap().reps());
        } else {
            assert_eq!(
                Err(FpgaDriverError::RegisterFieldOutOfRange {
                    field: "reps",
                    value: reps as u64,
                    max: 65535
                }),
                r
            );
        }
    }

    #[test]
    fn out_of_range() {
        assert!(DacMemoryRegisters::run(1, 2, DaisyRole::Master, 0, None, 249).is_err());
        assert!(DacMemoryRegisters::run(1, 0, DaisyRole::Master, 0x10000, None, 249).is_err());
        assert!(DacMemoryRegisters::run(1, 0, DaisyRole::Master, 0, Some(256), 249).is_err());
        assert!(DacMemoryRegisters::idle(256).is_err());
        assert!(DacMemoryRegisters::serial(1, 0x100_0000).is_err());
    }

    #[test]
    fn idle() -> anyhow::Result<()> {
        let regs = DacMemoryRegisters::idle(7)?;
        let bytes = regs.as_bytes();
        assert_eq!(0, bytes[0]);
        assert_eq!(0, bytes[1]);
        assert_eq!(3, bytes[43]);
        assert_eq!(7, bytes[44]);
        assert_eq!(None, regs.run_page());
        Ok(())
    }

    #[test]
    fn ping_serial_pll() -> anyhow::Result<()> {
        let ping = DacMemoryRegisters::ping();
        assert_eq!(1, ping.as_bytes()[1]);
        assert!(ping.wants_readback());
        assert_eq!(None, ping.run_page());

        let serial = DacMemoryRegisters::serial(2, 0x1FC093)?;
        assert_eq!(2, serial.as_bytes()[47]);
        assert_eq!([0x93, 0xC0, 0x1F], serial.as_bytes()[48..51]);

        let reset = DacMemoryRegisters::pll_reset();
        assert_eq!(0x80, reset.as_bytes()[46]);
        assert!(reset.resets_pll());
        Ok(())
    }

    #[test]
    fn run_sram() -> anyhow::Result<()> {
        let build = MemoryBuild {
            sram_len: 10240,
            sram_page_len: 5120,
            sram_delay_len: 1024,
            sram_block0_len: 8192,
            sram_block1_len: 2048,
            mem_len: 512,
            mem_page_len: 256,
        };
        let regs = DacMemoryRegisters::run_sram(&build, 0, 100, true, 1, 249)?;
        let bytes = regs.as_bytes();
        assert_eq!(3, bytes[0]);
        assert_eq!([0, 0, 0], bytes[13..16]);
        assert_eq!((99u32 + 1024).to_le_bytes()[..3], bytes[16..19]);
        assert_eq!(1, bytes[19]);

        let once = DacMemoryRegisters::run_sram(&build, 0, 100, false, 0, 249)?;
        assert_eq!(4, once.as_bytes()[0]);
        Ok(())
    }

    #[test]
    fn decode_short() {
        assert_eq!(
            Err(FpgaDriverError::PacketTooShort {
                expected: 56,
                actual: 10
            }),
            DacMemoryRegisters::decode(&[0; 10])
        );
    }
}
