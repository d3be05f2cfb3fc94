use derive_more::Display;
use ghz_fpga_core::link::TransportError;
use ghz_fpga_driver::error::FpgaDriverError;
use thiserror::Error;

/// Result of one board in a run that timed out.
#[derive(Clone, Debug, PartialEq, Eq, Display)]
#[display(
    "{name}: {}. Executions: expected={expected}, actual={}",
    if *ok { "OK" } else { "timeout!" },
    actual.map_or_else(|| "unknown".to_owned(), |n| n.to_string())
)]
pub struct BoardOutcome {
    /// Device name.
    pub name: String,
    /// Whether every expected packet was collected.
    pub ok: bool,
    /// Repetitions the board was asked to execute.
    pub expected: u32,
    /// Execution counter read back after the timeout.
    pub actual: Option<u16>,
}

/// Per-board diagnostics of a run that timed out.
#[derive(Clone, PartialEq, Eq, Display)]
#[display(
    "Some boards failed:{}",
    _0.iter().map(|b| format!("\n{b}")).collect::<String>()
)]
pub struct TimeoutReport(pub Vec<BoardOutcome>);

impl TimeoutReport {
    /// Names of the boards whose collection failed.
    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|b| !b.ok).map(|b| b.name.as_str())
    }
}

impl std::fmt::Debug for TimeoutReport {
    // GRCOV_EXCL_START
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
    // GRCOV_EXCL_STOP
}

/// An interface for error handling in ghz-fpga.
#[derive(Error, Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum FpgaError {
    /// Collection timed out on at least one board.
    #[error("{0}")]
    Timeout(TimeoutReport),
    /// Sending the requests of one pipeline stage failed.
    #[error("Error(s) occurred during {stage}:\n{details}")]
    StageFailed {
        /// Pipeline stage.
        stage: &'static str,
        /// One line per failed board.
        details: String,
    },
    /// An external setup action failed.
    #[error("Setup failed: {0}")]
    SetupFailed(String),
    /// A spawned transport task panicked or was cancelled.
    #[error("Transport task failed: {0}")]
    TaskFailed(String),

    /// No device with this name is known.
    #[error("Device '{0}' not found")]
    BoardNotFound(String),
    /// No board group with this name is known.
    #[error("Board group '{0}' not found")]
    BoardGroupNotFound(String),
    /// A board group with this name or adapter already exists.
    #[error("Board group '{0}' already exists")]
    BoardGroupExists(String),
    /// The boards of one sequence live in different board groups.
    #[error("Can only run multiboard sequence if all boards are in the same board group")]
    BoardGroupMismatch,
    /// A runner names a board absent from the daisy chain of its group.
    #[error("{0} is not configured in the daisy chain of its board group")]
    NotInBoardOrder(String),
    /// No board is selected and no daisy chain is set.
    #[error("No device selected")]
    NoDeviceSelected,
    /// The selected device has the wrong type for the setting.
    #[error("{0} is not a {1}")]
    WrongDeviceType(String, &'static str),

    /// Data was requested from several boards without a timing order.
    #[error("You must specify a timing order to get data back from multiple boards")]
    TimingOrderRequired,
    /// A timing order entry does not name a board of the daisy chain.
    #[error("Timing order entry '{0}' does not name a board in the daisy chain")]
    NotInDaisyChain(String),
    /// A timing order entry cannot be parsed.
    #[error("Timing order entry '{0}' is not understood")]
    InvalidTimingOrderEntry(String),
    /// Data was requested from a DAC that streams no timing packets.
    #[error("{0} is driven by a jump table and returns no timing data")]
    NoTimingData(String),
    /// The data of a board does not have the shape the timing order entry asks for.
    #[error("Timing order entry '{0}' does not match the run mode of its board")]
    RunModeMismatch(String),
    /// Results of a board are missing after a successful read.
    #[error("No data returned by {0}")]
    MissingData(String),
    /// No demodulator run has been executed for the board yet.
    #[error("No demodulator range available for {0}")]
    NoDemodRange(String),
    /// SRAM data is too short for a direct SRAM run.
    #[error("SRAM run needs at least {1} words, got {0}")]
    SramTooShort(usize, usize),

    /// Error in the driver.
    #[error("{0}")]
    Driver(#[from] FpgaDriverError),
    /// Error in the transport.
    #[error("{0}")]
    Transport(#[from] TransportError),
}

impl FpgaError {
    /// Whether the error may go away by running the sequence again.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
