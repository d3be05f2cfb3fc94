use bitflags::bitflags;
use zerocopy::{little_endian::U16, FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::error::FpgaDriverError;

/// Register readback of a DAC.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct DacReadback {
    _reserved0: [u8; 51],
    build: u8,
    executions: U16,
    _reserved1: [u8; 2],
    serial: u8,
    _reserved2: u8,
    clock: u8,
    _reserved3: [u8; 11],
}

impl DacReadback {
    /// Packet length in bytes.
    pub const LEN: usize = 70;

    const PLL_UNLOCKED: u8 = 0x80;

    /// Builds a readback packet.
    #[must_use]
    pub fn new(build: u8, executions: u16, pll_locked: bool) -> Self {
        let mut rb = Self::new_zeroed();
        rb.build = build;
        rb.executions = U16::new(executions);
        if !pll_locked {
            rb.clock = Self::PLL_UNLOCKED;
        }
        rb
    }

    /// Firmware build number.
    #[must_use]
    pub const fn build(&self) -> u8 {
        self.build
    }

    /// Number of executions since the last start.
    #[must_use]
    pub fn executions(&self) -> u16 {
        self.executions.get()
    }

    /// Last word read from the serial interface.
    #[must_use]
    pub const fn serial(&self) -> u8 {
        self.serial
    }

    /// Whether the 1 GHz PLL has lost lock.
    #[must_use]
    pub const fn pll_unlocked(&self) -> bool {
        self.clock & Self::PLL_UNLOCKED != 0
    }
}

bitflags! {
    /// Clock monitor bits of an ADC readback.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct AdcClockMonitor: u8 {
        /// No PLL in the external 1 GHz clock.
        const PLL_UNLOCKED = 1 << 0;
        /// dclkA output.
        const DCLK_A = 1 << 1;
        /// dclkA delayed by 1 ns.
        const DCLK_A_DELAYED = 1 << 2;
        /// dclkB output.
        const DCLK_B = 1 << 3;
        /// dclkB delayed by 1 ns.
        const DCLK_B_DELAYED = 1 << 4;
    }
}

/// Register readback of an ADC.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct AdcReadback {
    build: u8,
    clock_monitor: u8,
    executions: U16,
    packets: u8,
    bad_packets: u8,
    _reserved: [u8; 40],
}

impl AdcReadback {
    /// Packet length in bytes.
    pub const LEN: usize = 46;

    /// Builds a readback packet.
    #[must_use]
    pub fn new(build: u8, executions: u16, pll_locked: bool, packets: u8) -> Self {
        let mut rb = Self::new_zeroed();
        rb.build = build;
        rb.executions = U16::new(executions);
        rb.packets = packets;
        if !pll_locked {
            rb.clock_monitor = AdcClockMonitor::PLL_UNLOCKED.bits();
        }
        rb
    }

    /// Firmware build number.
    #[must_use]
    pub const fn build(&self) -> u8 {
        self.build
    }

    /// Clock monitor bits.
    #[must_use]
    pub const fn clock_monitor(&self) -> AdcClockMonitor {
        AdcClockMonitor::from_bits_retain(self.clock_monitor)
    }

    /// Number of triggers since the last start.
    #[must_use]
    pub fn executions(&self) -> u16 {
        self.executions.get()
    }

    /// Number of packets received.
    #[must_use]
    pub const fn packets(&self) -> u8 {
        self.packets
    }

    /// Number of packets received with a bad CRC.
    #[must_use]
    pub const fn bad_packets(&self) -> u8 {
        self.bad_packets
    }
}

/// Decoded register readback of any board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Readback {
    /// Firmware build number.
    pub build: u8,
    /// Number of executions since the last start.
    pub executions: u16,
    /// Whether the 1 GHz PLL has lost lock.
    pub pll_unlocked: bool,
}

impl From<DacReadback> for Readback {
    fn from(rb: DacReadback) -> Self {
        Self {
            build: rb.build(),
            executions: rb.executions(),
            pll_unlocked: rb.pll_unlocked(),
        }
    }
}

impl From<AdcReadback> for Readback {
    fn from(rb: AdcReadback) -> Self {
        Self {
            build: rb.build(),
            executions: rb.executions(),
            pll_unlocked: rb.clock_monitor().contains(AdcClockMonitor::PLL_UNLOCKED),
        }
    }
}

pub(crate) fn decode<T: FromBytes + KnownLayout + Immutable>(
    data: &[u8],
    expected: usize,
) -> Result<T, FpgaDriverError> {
    T::read_from_prefix(data)
        .map(|(v, _)| v)
        .map_err(|_| FpgaDriverError::PacketTooShort {
            expected,
            actual: data.len(),
        })
}
