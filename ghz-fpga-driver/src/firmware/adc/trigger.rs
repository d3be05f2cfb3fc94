use std::{fmt, time::Duration};

use ghz_fpga_core::defined::CLOCK_PERIOD;

use crate::{error::FpgaDriverError, firmware::build::AdcBuild};

const ROW_OFFSET: usize = 2;
const ROW_LEN: usize = 8;
const FIFO_MIN_DELAY: u32 = 50;

/// One row of the retrigger table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TriggerRow {
    /// Number of triggers.
    pub count: u32,
    /// Clock cycles before each trigger.
    pub delay: u32,
    /// Clock cycles the demodulator is on.
    pub length: u32,
    /// Number of channels read out, starting from channel 0.
    pub channels: u8,
}

impl TriggerRow {
    /// Creates a row.
    #[must_use]
    pub const fn new(count: u32, delay: u32, length: u32, channels: u8) -> Self {
        Self {
            count,
            delay,
            length,
            channels,
        }
    }

    fn check(&self, row: usize, channels: usize) -> Result<(), FpgaDriverError> {
        let field = |field, value: u32, min: u32, max: u32| {
            if (min..=max).contains(&value) {
                Ok(())
            } else {
                Err(FpgaDriverError::TriggerRowOutOfRange {
                    row,
                    field,
                    value,
                    min,
                    max,
                })
            }
        };
        field("count", self.count, 1, 0x1_0000)?;
        field("delay", self.delay, 4, 0xFFFF + 4)?;
        field("length", self.length, 1, 0x100)?;
        field("channels", self.channels as u32, 1, channels as u32)
    }

    fn encode(&self, dst: &mut [u8]) {
        dst[0..2].copy_from_slice(&((self.count - 1) as u16).to_le_bytes());
        dst[2..4].copy_from_slice(&((self.delay - 4) as u16).to_le_bytes());
        dst[4] = (self.length - 1) as u8;
        dst[5] = self.channels;
    }

    fn decode(src: &[u8]) -> Self {
        Self {
            count: u16::from_le_bytes([src[0], src[1]]) as u32 + 1,
            delay: u16::from_le_bytes([src[2], src[3]]) as u32 + 4,
            length: src[4] as u32 + 1,
            channels: src[5],
        }
    }
}

impl fmt::Display for TriggerRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.count, self.delay, self.length, self.channels
        )
    }
}

/// The retrigger table of an ADC.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TriggerTable {
    rows: Vec<TriggerRow>,
}

impl TriggerTable {
    /// Creates a table, checking every row against the hardware limits.
    pub fn new(build: &AdcBuild, rows: Vec<TriggerRow>) -> Result<Self, FpgaDriverError> {
        let first = rows.first().ok_or(FpgaDriverError::TriggerTableEmpty)?;
        if rows.len() > build.max_trigger_rows {
            return Err(FpgaDriverError::TriggerTableTooLong(
                rows.len(),
                build.max_trigger_rows,
            ));
        }
        if first.delay < 1 {
            return Err(FpgaDriverError::TriggerRowZeroDelay);
        }
        rows.iter()
            .enumerate()
            .try_for_each(|(i, r)| r.check(i, build.demod_channels))?;

        // Closely spaced demodulations back up the FIFO. A short delay is
        // allowed only as the start delay of a single first trigger.
        if let Some(i) = rows.iter().position(|r| r.delay < FIFO_MIN_DELAY) {
            let start_only = i == 0
                && first.count == 1
                && rows[1..].iter().all(|r| r.delay >= FIFO_MIN_DELAY);
            if !start_only {
                let i = rows
                    .iter()
                    .skip(1)
                    .position(|r| r.delay < FIFO_MIN_DELAY)
                    .map_or(i, |p| p + 1);
                return Err(FpgaDriverError::TriggerFifoBackup(i));
            }
        }
        Ok(Self { rows })
    }

    /// The rows.
    #[must_use]
    pub fn rows(&self) -> &[TriggerRow] {
        &self.rows
    }

    /// The common channel count of all rows.
    pub fn channels(&self) -> Result<u8, FpgaDriverError> {
        let first = self.rows[0].channels;
        if self.rows.iter().any(|r| r.channels != first) {
            return Err(FpgaDriverError::UnequalChannelCounts(
                self.rows.iter().map(|r| r.channels).collect(),
            ));
        }
        Ok(first)
    }

    /// Total number of triggers per repetition.
    #[must_use]
    pub fn total_triggers(&self) -> usize {
        self.rows.iter().map(|r| r.count as usize).sum()
    }

    /// Number of I/Q pairs produced per repetition.
    #[must_use]
    pub fn iq_pairs(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.count as usize * r.channels as usize)
            .sum()
    }

    /// Acquisition time of one repetition.
    #[must_use]
    pub fn stat_time(&self) -> Duration {
        let cycles: u64 = self
            .rows
            .iter()
            .map(|r| r.count as u64 * (r.delay as u64 + r.length as u64))
            .sum();
        Duration::from_nanos(CLOCK_PERIOD.as_nanos() as u64 * cycles)
    }

    /// The retrigger table write packet.
    #[must_use]
    pub fn packet(&self, build: &AdcBuild) -> Vec<u8> {
        let mut pkt = vec![0u8; build.retrigger_pkt_len];
        self.rows.iter().enumerate().for_each(|(i, r)| {
            let ofs = ROW_OFFSET + i * ROW_LEN;
            r.encode(&mut pkt[ofs..ofs + ROW_LEN]);
        });
        pkt
    }

    /// Parses a retrigger table write packet.
    ///
    /// Rows after the first all-zero row are ignored.
    #[must_use]
    pub fn decode(data: &[u8]) -> Vec<TriggerRow> {
        data.get(ROW_OFFSET..)
            .unwrap_or_default()
            .chunks_exact(ROW_LEN)
            .take_while(|c| c.iter().any(|&b| b != 0))
            .map(TriggerRow::decode)
            .collect()
    }

    /// Canonical description used to detect changed setups.
    #[must_use]
    pub fn descriptor(&self) -> String {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, r)| format!("triggerTable{}={}", i, r))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
