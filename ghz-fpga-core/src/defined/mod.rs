use std::time::Duration;

/// The number of SRAM/memory pages used for double buffering.
pub const NUM_PAGES: usize = 2;

/// The default multiplier applied to a sequence time estimate to get the collect timeout.
pub const DEFAULT_TIMEOUT_FACTOR: u32 = 10;

/// The default number of retries of a sequence that timed out.
pub const DEFAULT_RETRIES: usize = 5;

/// The default master sync value written into the run register.
pub const DEFAULT_MASTER_SYNC: u8 = 249;

/// Extra delay inserted on the master board before each SRAM call.
pub const MASTER_SRAM_DELAY: Duration = Duration::from_micros(2);

/// Timeout used when pinging a single board.
pub const READBACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeout used when detecting the boards of a group.
pub const DETECT_TIMEOUT: Duration = Duration::from_secs(1);

/// The FPGA clock period.
pub const CLOCK_PERIOD: Duration = Duration::from_nanos(4);

/// The duration of one memory-sequence cycle.
pub const MEMORY_CYCLE: Duration = Duration::from_nanos(40);

/// The number of timing values carried by a DAC timing packet.
///
/// Repetition counts of runs returning DAC timing data are rounded up to a multiple of this.
pub const TIMING_PACKET_LEN: u32 = 30;

/// Number of performance samples kept per lock.
pub const PERFORMANCE_HISTORY_LEN: usize = 100;
