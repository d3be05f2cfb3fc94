use super::build::{MemoryBuild, SRAM_WRITE_PKT_LEN};
use crate::error::FpgaDriverError;

/// Length of an SRAM write packet in bytes.
pub const SRAM_PACKET_LEN: usize = 2 + SRAM_WRITE_PKT_LEN * 4;

/// Length of a memory write packet in bytes.
pub const MEMORY_PACKET_LEN: usize = 1 + 256 * 3;

/// SRAM contents of one DAC.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SramData {
    /// A single block of words.
    Single(Vec<u32>),
    /// Two blocks separated by a delay.
    DualBlock(DualBlock),
}

impl From<Vec<u32>> for SramData {
    fn from(words: Vec<u32>) -> Self {
        Self::Single(words)
    }
}

/// Two SRAM blocks separated by a delay.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DualBlock {
    block0: Vec<u32>,
    block1: Vec<u32>,
    delay_blocks: usize,
}

impl DualBlock {
    /// Splits `delay_ns` into whole delay blocks and a padding prepended to `block1`.
    ///
    /// The padding repeats the last word of `block0`; `block1` is then padded with its own
    /// last word to a multiple of 4 words.
    #[must_use]
    pub fn new(block0: Vec<u32>, block1: Vec<u32>, delay_ns: usize, delay_len: usize) -> Self {
        let pad = delay_ns % delay_len;
        let delay_blocks = delay_ns / delay_len;
        let last0 = block0.last().copied().unwrap_or_default();
        let mut padded = std::iter::repeat_n(last0, pad)
            .chain(block1)
            .collect::<Vec<_>>();
        let rem = padded.len() % 4;
        if rem != 0 {
            let last1 = padded.last().copied().unwrap_or_default();
            padded.extend(std::iter::repeat_n(last1, 4 - rem));
        }
        Self {
            block0,
            block1: padded,
            delay_blocks,
        }
    }

    /// First block.
    #[must_use]
    pub fn block0(&self) -> &[u32] {
        &self.block0
    }

    /// Second block including the delay padding.
    #[must_use]
    pub fn block1(&self) -> &[u32] {
        &self.block1
    }

    /// Number of whole delay blocks between the two blocks.
    #[must_use]
    pub const fn delay_blocks(&self) -> usize {
        self.delay_blocks
    }

    /// Physical SRAM image: block 0 right-aligned into physical block 0, then block 1.
    pub fn layout(&self, build: &MemoryBuild) -> Result<Vec<u32>, FpgaDriverError> {
        if self.block0.len() > build.sram_block0_len {
            return Err(FpgaDriverError::SramTooLong(
                self.block0.len(),
                build.sram_block0_len,
            ));
        }
        if self.block1.len() > build.sram_block1_len {
            return Err(FpgaDriverError::SramTooLong(
                self.block1.len(),
                build.sram_block1_len,
            ));
        }
        Ok(std::iter::repeat_n(0, build.sram_block0_len - self.block0.len())
            .chain(self.block0.iter().copied())
            .chain(self.block1.iter().copied())
            .collect())
    }
}

/// SRAM write packets for `words`, starting at the beginning of `page`.
pub fn sram_write_packets(
    sram_len: usize,
    page_start: usize,
    words: &[u32],
) -> Result<Vec<Vec<u8>>, FpgaDriverError> {
    let max_derps = sram_len / SRAM_WRITE_PKT_LEN;
    let first = page_start / SRAM_WRITE_PKT_LEN;
    if first + words.len().div_ceil(SRAM_WRITE_PKT_LEN) > max_derps {
        return Err(FpgaDriverError::SramTooLong(page_start + words.len(), sram_len));
    }
    Ok(words
        .chunks(SRAM_WRITE_PKT_LEN)
        .enumerate()
        .map(|(i, chunk)| sram_write_packet((first + i) as u16, chunk))
        .collect())
}

fn sram_write_packet(derp: u16, chunk: &[u32]) -> Vec<u8> {
    let mut pkt = vec![0u8; SRAM_PACKET_LEN];
    pkt[0..2].copy_from_slice(&derp.to_le_bytes());
    chunk.iter().enumerate().for_each(|(i, w)| {
        pkt[2 + i * 4..2 + (i + 1) * 4].copy_from_slice(&w.to_le_bytes());
    });
    pkt
}

/// Parses an SRAM write packet into its derp and words.
pub fn decode_sram_write(data: &[u8]) -> Result<(u16, Vec<u32>), FpgaDriverError> {
    if data.len() < SRAM_PACKET_LEN {
        return Err(FpgaDriverError::PacketTooShort {
            expected: SRAM_PACKET_LEN,
            actual: data.len(),
        });
    }
    let derp = u16::from_le_bytes([data[0], data[1]]);
    let words = data[2..SRAM_PACKET_LEN]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok((derp, words))
}

/// Memory write packet for `page`.
pub fn memory_write_packet(
    build: &MemoryBuild,
    page: usize,
    commands: &[u32],
) -> Result<Vec<u8>, FpgaDriverError> {
    if commands.len() > build.mem_page_len {
        return Err(FpgaDriverError::MemoryTooLong(
            commands.len(),
            build.mem_page_len,
        ));
    }
    let mut pkt = vec![0u8; MEMORY_PACKET_LEN];
    pkt[0] = page as u8;
    commands.iter().enumerate().for_each(|(i, c)| {
        pkt[1 + i * 3..1 + (i + 1) * 3].copy_from_slice(&c.to_le_bytes()[..3]);
    });
    Ok(pkt)
}

/// Parses a memory write packet into its page and commands.
pub fn decode_memory_write(data: &[u8]) -> Result<(u8, Vec<u32>), FpgaDriverError> {
    if data.len() < MEMORY_PACKET_LEN {
        return Err(FpgaDriverError::PacketTooShort {
            expected: MEMORY_PACKET_LEN,
            actual: data.len(),
        });
    }
    let commands = data[1..MEMORY_PACKET_LEN]
        .chunks_exact(3)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], 0]))
        .collect();
    Ok((data[0], commands))
}
