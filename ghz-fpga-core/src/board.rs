use std::str::FromStr;

use derive_more::Display;
use thiserror::Error;

use crate::link::MacAddress;

const MAC_BASE: [u8; 4] = [0x00, 0x01, 0xCA, 0xAA];

/// The kind of a board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BoardType {
    /// A GHz DAC board.
    #[display("DAC")]
    Dac,
    /// An ADC board.
    #[display("ADC")]
    Adc,
}

impl BoardType {
    #[must_use]
    const fn mac_tag(self) -> u8 {
        match self {
            BoardType::Dac => 0x00,
            BoardType::Adc => 0x01,
        }
    }
}

/// Identity of a board inside a board group.
///
/// The MAC address of a board is derived from its type and number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[display("{board_type} {number}")]
pub struct BoardId {
    board_type: BoardType,
    number: u8,
}

impl BoardId {
    /// Creates a new [`BoardId`].
    #[must_use]
    pub const fn new(board_type: BoardType, number: u8) -> Self {
        Self { board_type, number }
    }

    /// Shorthand for a DAC board.
    #[must_use]
    pub const fn dac(number: u8) -> Self {
        Self::new(BoardType::Dac, number)
    }

    /// Shorthand for an ADC board.
    #[must_use]
    pub const fn adc(number: u8) -> Self {
        Self::new(BoardType::Adc, number)
    }

    /// The board type.
    #[must_use]
    pub const fn board_type(&self) -> BoardType {
        self.board_type
    }

    /// The board number set by the DIP switches.
    #[must_use]
    pub const fn number(&self) -> u8 {
        self.number
    }

    /// The MAC address of the board.
    #[must_use]
    pub const fn mac(&self) -> MacAddress {
        MacAddress::new([
            MAC_BASE[0],
            MAC_BASE[1],
            MAC_BASE[2],
            MAC_BASE[3],
            self.board_type.mac_tag(),
            self.number,
        ])
    }

    /// Recovers the board identity from a MAC address.
    #[must_use]
    pub fn from_mac(mac: &MacAddress) -> Option<Self> {
        let bytes = mac.octets();
        if bytes[..4] != MAC_BASE {
            return None;
        }
        let board_type = match bytes[4] {
            0x00 => BoardType::Dac,
            0x01 => BoardType::Adc,
            _ => return None,
        };
        Some(Self::new(board_type, bytes[5]))
    }

    /// The full device name of the board in the given group, e.g. `"Vince DAC 3"`.
    #[must_use]
    pub fn device_name(&self, group: &str) -> String {
        format!("{} {}", group, self)
    }
}

/// An error produced when parsing a [`BoardId`].
#[derive(Error, Debug, PartialEq, Clone)]
#[error("Invalid board identity: {0:?}")]
pub struct BoardIdParseError(pub String);

impl FromStr for BoardId {
    type Err = BoardIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || BoardIdParseError(s.to_owned());
        let mut it = s.split_whitespace();
        let board_type = match it.next() {
            Some("DAC") => BoardType::Dac,
            Some("ADC") => BoardType::Adc,
            _ => return Err(err()),
        };
        let number = it.next().and_then(|n| n.parse().ok()).ok_or_else(err)?;
        if it.next().is_some() {
            return Err(err());
        }
        Ok(Self::new(board_type, number))
    }
}
