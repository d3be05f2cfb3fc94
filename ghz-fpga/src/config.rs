use std::time::Duration;

use ghz_fpga_core::defined::{DEFAULT_RETRIES, DEFAULT_TIMEOUT_FACTOR, DETECT_TIMEOUT, READBACK_TIMEOUT};

/// Configuration of one board group.
///
/// `boards` lists the daisy chain, master first, as `(board name, delay)` where the board
/// name is e.g. `"DAC 1"` and the delay compensates the chain propagation in clock cycles.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoardGroupConfig {
    /// Group name, used as the prefix of device names.
    pub name: String,
    /// Ethernet adapter hosting the group.
    pub port: u32,
    /// Daisy chain order and delays.
    pub boards: Vec<(String, u32)>,
}

impl BoardGroupConfig {
    /// Creates a configuration.
    pub fn new(name: impl Into<String>, port: u32, boards: impl IntoIterator<Item = (String, u32)>) -> Self {
        Self {
            name: name.into(),
            port,
            boards: boards.into_iter().collect(),
        }
    }

    /// Full device names in daisy chain order with their delays.
    #[must_use]
    pub fn board_order(&self) -> Vec<(String, u32)> {
        self.boards
            .iter()
            .map(|(board, delay)| (format!("{} {}", self.name, board), *delay))
            .collect()
    }
}

/// Server-wide settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerConfig {
    /// Attempts of a sequence that timed out.
    pub retries: usize,
    /// Multiplier applied to sequence time estimates.
    pub timeout_factor: u32,
    /// Timeout of register readbacks.
    pub readback_timeout: Duration,
    /// Timeout of board detection.
    pub detect_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout_factor: DEFAULT_TIMEOUT_FACTOR,
            readback_timeout: READBACK_TIMEOUT,
            detect_timeout: DETECT_TIMEOUT,
        }
    }
}
