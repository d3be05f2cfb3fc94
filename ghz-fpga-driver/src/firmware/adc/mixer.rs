use std::fmt;

use crate::{error::FpgaDriverError, firmware::build::AdcBuild};

const PAGE_OFFSET: usize = 2;

/// Demodulator reference table of one channel: `(I, Q)` pairs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MixerTable {
    pairs: Vec<(i8, i8)>,
}

impl MixerTable {
    /// Creates a table.
    pub fn new(build: &AdcBuild, pairs: Vec<(i8, i8)>) -> Result<Self, FpgaDriverError> {
        if pairs.len() > build.mixer_table_len {
            return Err(FpgaDriverError::MixerTableTooLong(
                pairs.len(),
                build.mixer_table_len,
            ));
        }
        Ok(Self { pairs })
    }

    /// The `(I, Q)` pairs.
    #[must_use]
    pub fn pairs(&self) -> &[(i8, i8)] {
        &self.pairs
    }

    /// Mixer write packet for demodulator `channel`.
    pub fn packet(&self, build: &AdcBuild, channel: usize) -> Result<Vec<u8>, FpgaDriverError> {
        if channel >= build.demod_channels {
            return Err(FpgaDriverError::DemodChannelOutOfRange(
                channel,
                build.demod_channels,
            ));
        }
        let mut pkt = vec![0u8; build.mixer_pkt_len];
        pkt[0..PAGE_OFFSET].copy_from_slice(&((channel + 1) as u16).to_le_bytes());
        self.pairs.iter().enumerate().for_each(|(i, &(c, s))| {
            pkt[PAGE_OFFSET + 2 * i] = c as u8;
            pkt[PAGE_OFFSET + 2 * i + 1] = s as u8;
        });
        Ok(pkt)
    }

    /// Parses a mixer write packet into its channel and table.
    ///
    /// Returns `None` if the page does not address a mixer.
    #[must_use]
    pub fn decode(data: &[u8]) -> Option<(usize, Self)> {
        let page = u16::from_le_bytes([*data.first()?, *data.get(1)?]) as usize;
        let channel = page.checked_sub(1)?;
        let pairs = data[PAGE_OFFSET..]
            .chunks_exact(2)
            .map(|c| (c[0] as i8, c[1] as i8))
            .collect();
        Some((channel, Self { pairs }))
    }
}

impl fmt::Display for MixerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (c, s)) in self.pairs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({c}, {s})")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUILD: AdcBuild = AdcBuild {
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

    #[test]
    fn packet() -> anyhow::Result<()> {
        let table = MixerTable::new(&BUILD, vec![(127, 0), (-128, -1)])?;
        let pkt = table.packet(&BUILD, 3)?;
        assert_eq!(1026, pkt.len());
        assert_eq!([4, 0, 127, 0, 0x80, 0xFF, 0], pkt[0..7]);

        let (channel, decoded) = MixerTable::decode(&pkt).unwrap();
        assert_eq!(3, channel);
        assert_eq!(&table.pairs()[..], &decoded.pairs()[..2]);
        assert_eq!("[(127, 0), (-128, -1)]", table.to_string());
        Ok(())
    }

    #[test]
    fn limits() -> anyhow::Result<()> {
        assert_eq!(
            Err(FpgaDriverError::MixerTableTooLong(513, 512)),
            MixerTable::new(&BUILD, vec![(0, 0); 513])
        );
        assert_eq!(
            Err(FpgaDriverError::DemodChannelOutOfRange(12, 12)),
            MixerTable::new(&BUILD, vec![])?.packet(&BUILD, 12)
        );
        assert_eq!(None, MixerTable::decode(&[0; 1026]));
        Ok(())
    }
}
