use ghz_fpga_core::defined::DEFAULT_MASTER_SYNC;
use zerocopy::{little_endian::U16, FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use super::DaisyRole;
use crate::{
    error::FpgaDriverError,
    firmware::{build::JumpTableBuild, check_field},
};

/// Register packet of the DAC builds driven by a jump table.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct DacJumpTableRegisters {
    start: u8,
    readback: u8,
    _reserved0: [u8; 11],
    reps: U16,
    loop_delay: U16,
    counter_select: u8,
    _reserved1: [u8; 25],
    delay: U16,
    sync: u8,
    clock: u8,
    serial_op: u8,
    serial_data: [u8; 3],
    monitor_0: u8,
    monitor_1: u8,
    _reserved2: [u8; 3],
}

impl DacJumpTableRegisters {
    /// Packet length in bytes.
    pub const LEN: usize = 56;

    fn with_monitors(build: &JumpTableBuild) -> Self {
        let mut regs = Self::new_zeroed();
        regs.monitor_0 = build.monitor_0;
        regs.monitor_1 = build.monitor_1;
        regs
    }

    /// Run the jump table.
    ///
    /// The jump table boards have a single page and no block delay.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        build: &JumpTableBuild,
        reps: u32,
        page: usize,
        role: DaisyRole,
        delay: u32,
        block_delay: Option<u32>,
        sync: u8,
        loop_delay: u32,
        readback: bool,
    ) -> Result<Self, FpgaDriverError> {
        if let Some(block_delay) = block_delay {
            return Err(FpgaDriverError::RegisterFieldOutOfRange {
                field: "block_delay",
                value: block_delay as u64,
                max: 0,
            });
        }
        check_field("page", page as u64, 0)?;
        check_field("reps", reps as u64, u16::MAX as u64)?;
        check_field("delay", delay as u64, u16::MAX as u64)?;
        check_field("loop_delay", loop_delay as u64, u16::MAX as u64)?;
        let mut regs = Self::with_monitors(build);
        regs.start = match role {
            DaisyRole::Master => 1,
            DaisyRole::Slave => 3,
            DaisyRole::Idle => 0,
        };
        regs.readback = readback as u8;
        regs.reps = U16::new(reps as u16);
        regs.loop_delay = U16::new(loop_delay as u16);
        regs.counter_select = 0;
        regs.delay = U16::new(delay as u16);
        regs.sync = sync;
        Ok(regs)
    }

    /// Run once as master, reading back the registers.
    pub fn run_simple(build: &JumpTableBuild, readback: bool) -> Result<Self, FpgaDriverError> {
        Self::run(
            build,
            1,
            0,
            DaisyRole::Master,
            0,
            None,
            DEFAULT_MASTER_SYNC,
            0,
            readback,
        )
    }

    /// Do not start, only pass the daisy chain pulse through.
    pub fn idle(build: &JumpTableBuild, delay: u32) -> Result<Self, FpgaDriverError> {
        check_field("delay", delay as u64, u16::MAX as u64)?;
        let mut regs = Self::with_monitors(build);
        regs.delay = U16::new(delay as u16);
        Ok(regs)
    }

    /// Request a readback without starting.
    ///
    /// Start is set to master mode so that the board does not pass daisy chain pulses through.
    #[must_use]
    pub fn ping(build: &JumpTableBuild) -> Self {
        let mut regs = Self::with_monitors(build);
        regs.start = 1;
        regs.readback = 1;
        regs
    }

    /// Send a word through the serial interface.
    pub fn serial(build: &JumpTableBuild, op: u8, data: u32) -> Result<Self, FpgaDriverError> {
        check_field("serial data", data as u64, 0xFF_FFFF)?;
        let mut regs = Self::ping(build);
        regs.serial_op = op;
        regs.serial_data.copy_from_slice(&data.to_le_bytes()[..3]);
        Ok(regs)
    }

    /// Reset the 1 GHz PLL.
    #[must_use]
    pub fn pll_reset(build: &JumpTableBuild) -> Self {
        let mut regs = Self::ping(build);
        regs.clock = 0x80;
        regs
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

    /// Role in the daisy chain.
    #[must_use]
    pub const fn role(&self) -> DaisyRole {
        match self.start {
            1 => DaisyRole::Master,
            3 => DaisyRole::Slave,
            _ => DaisyRole::Idle,
        }
    }

    /// Whether this packet requests a readback.
    #[must_use]
    pub const fn wants_readback(&self) -> bool {
        self.readback != 0
    }

    /// Repetition count.
    #[must_use]
    pub fn reps(&self) -> u16 {
        self.reps.get()
    }

    /// Start delay.
    #[must_use]
    pub fn delay(&self) -> u16 {
        self.delay.get()
    }

    /// Delay between loops.
    #[must_use]
    pub fn loop_delay(&self) -> u16 {
        self.loop_delay.get()
    }

    /// Monitor selectors.
    #[must_use]
    pub const fn monitors(&self) -> (u8, u8) {
        (self.monitor_0, self.monitor_1)
    }

    /// Whether this packet resets the PLL.
    #[must_use]
    pub const fn resets_pll(&self) -> bool {
        self.clock & 0x80 != 0
    }
}
