use zerocopy::{little_endian::U16, FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::{error::FpgaDriverError, firmware::check_field};

/// Command written to the start register of an ADC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum AdcMode {
    /// Do nothing.
    Off = 0,
    /// Read back the registers.
    Readback = 1,
    /// Average mode, started immediately.
    AverageAuto = 2,
    /// Average mode, started by the daisy chain.
    AverageDaisy = 3,
    /// Demodulator mode, started immediately.
    DemodAuto = 4,
    /// Demodulator mode, started by the daisy chain.
    DemodDaisy = 5,
    /// Write the PLL through the serial interface.
    PllSerial = 6,
    /// Recalibrate the AD converters.
    Recalibrate = 7,
}

impl AdcMode {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Readback,
            2 => Self::AverageAuto,
            3 => Self::AverageDaisy,
            4 => Self::DemodAuto,
            5 => Self::DemodDaisy,
            6 => Self::PllSerial,
            7 => Self::Recalibrate,
            _ => Self::Off,
        }
    }

    /// Whether the board waits for a daisy chain pulse before acquiring.
    #[must_use]
    pub const fn is_daisy(&self) -> bool {
        matches!(self, Self::AverageDaisy | Self::DemodDaisy)
    }
}

/// Register packet of the ADC builds.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct AdcRegisters {
    mode: u8,
    start_delay: U16,
    serial: [u8; 3],
    _reserved0: u8,
    reps: U16,
    bitflip: u8,
    monitor_0: u8,
    monitor_1: u8,
    _reserved1: [u8; 47],
}

impl AdcRegisters {
    /// Packet length in bytes.
    pub const LEN: usize = 59;

    /// Run in `mode`.
    pub fn run(
        mode: AdcMode,
        reps: u32,
        start_delay: u32,
        monitors: (u8, u8),
    ) -> Result<Self, FpgaDriverError> {
        check_field("reps", reps as u64, u16::MAX as u64)?;
        check_field("delay", start_delay as u64, u16::MAX as u64)?;
        let mut regs = Self::new_zeroed();
        regs.mode = mode as u8;
        regs.start_delay = U16::new(start_delay as u16);
        regs.reps = U16::new(reps as u16);
        regs.bitflip = 0;
        regs.monitor_0 = monitors.0;
        regs.monitor_1 = monitors.1;
        Ok(regs)
    }

    /// Request a readback.
    #[must_use]
    pub fn ping() -> Self {
        let mut regs = Self::new_zeroed();
        regs.mode = AdcMode::Readback as u8;
        regs
    }

    /// Write `bits` to the PLL.
    pub fn serial(bits: u32) -> Result<Self, FpgaDriverError> {
        check_field("serial data", bits as u64, 0xFF_FFFF)?;
        let mut regs = Self::new_zeroed();
        regs.mode = AdcMode::PllSerial as u8;
        regs.serial.copy_from_slice(&bits.to_le_bytes()[..3]);
        Ok(regs)
    }

    /// Recalibrate the AD converters.
    #[must_use]
    pub fn recalibrate() -> Self {
        let mut regs = Self::new_zeroed();
        regs.mode = AdcMode::Recalibrate as u8;
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

    /// The start command.
    #[must_use]
    pub fn mode(&self) -> AdcMode {
        AdcMode::from_u8(self.mode)
    }

    /// Repetition count.
    #[must_use]
    pub fn reps(&self) -> u16 {
        self.reps.get()
    }

    /// Start delay after the daisy chain pulse.
    #[must_use]
    pub fn start_delay(&self) -> u16 {
        self.start_delay.get()
    }

    /// Serial word.
    #[must_use]
    pub fn serial_bits(&self) -> u32 {
        u32::from_le_bytes([self.serial[0], self.serial[1], self.serial[2], 0])
    }
}
