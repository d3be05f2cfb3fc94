use std::{fmt, str::FromStr};

use thiserror::Error;

/// A 48-bit ethernet MAC address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Creates a new [`MacAddress`].
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Returns the six octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    // GRCOV_EXCL_START
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
    // GRCOV_EXCL_STOP
}

/// An error produced when parsing a [`MacAddress`].
#[derive(Error, Debug, PartialEq, Clone)]
#[error("Invalid MAC address: {0:?}")]
pub struct MacAddressParseError(pub String);

impl FromStr for MacAddress {
    type Err = MacAddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            *octet = parts
                .next()
                .filter(|p| p.len() == 2)
                .and_then(|p| u8::from_str_radix(p, 16).ok())
                .ok_or_else(|| MacAddressParseError(s.to_owned()))?;
        }
        if parts.next().is_some() {
            return Err(MacAddressParseError(s.to_owned()));
        }
        Ok(Self(octets))
    }
}
