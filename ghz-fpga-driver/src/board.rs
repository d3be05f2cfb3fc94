use std::time::Duration;

use getset::CopyGetters;
use ghz_fpga_core::{
    board::{BoardId, BoardType},
    link::{ContextId, Request},
};
use zerocopy::IntoBytes;

use crate::{
    error::FpgaDriverError,
    firmware::{
        build::{Build, BuildParams},
        register::{self, AdcRegisters, DacJumpTableRegisters, DacMemoryRegisters, Readback},
    },
};

/// A board of a board group.
///
/// The board knows how to address itself on the transport but does not own a
/// transport context: every request it builds is sent by the group.
#[derive(Clone, Debug, PartialEq, Eq, CopyGetters)]
pub struct FpgaBoard {
    name: String,
    /// The board identity.
    #[getset(get_copy = "pub")]
    id: BoardId,
    /// The firmware build.
    #[getset(get_copy = "pub")]
    build: &'static Build,
}

impl FpgaBoard {
    /// Creates a board, resolving its build parameters.
    pub fn new(name: impl Into<String>, id: BoardId, build: u32) -> Result<Self, FpgaDriverError> {
        Ok(Self {
            name: name.into(),
            id,
            build: Build::find(id.board_type(), build)?,
        })
    }

    /// The device name, e.g. `"Vince DAC 3"`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The board type.
    #[must_use]
    pub const fn board_type(&self) -> BoardType {
        self.id.board_type()
    }

    /// Whether this is a DAC driven by a jump table.
    #[must_use]
    pub const fn has_jump_table(&self) -> bool {
        matches!(self.build.params(), BuildParams::DacJumpTable(_))
    }

    /// Whether a timing order entry refers to this board.
    ///
    /// An entry names the board itself, or one of its channels as `"<name>::<channel>"`.
    #[must_use]
    pub fn is_named_by(&self, entry: &str) -> bool {
        entry
            .strip_prefix(self.name.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    }

    /// Initializes a freshly opened context for this board.
    #[must_use]
    pub fn connect(&self, port: u32) -> Request {
        let mac = self.id.mac();
        Request::new()
            .connect(port)
            .destination_mac(mac)
            .require_source_mac(mac)
            .listen()
    }

    /// Waits for `packets` packets, then triggers `trigger`.
    ///
    /// If collection times out the trigger is not sent.
    #[must_use]
    pub fn collect(&self, packets: usize, timeout: Duration, trigger: Option<ContextId>) -> Request {
        let req = Request::new().timeout(timeout).collect(packets);
        match trigger {
            Some(ctx) => req.send_trigger(ctx),
            None => req,
        }
    }

    /// Sends a trigger into `ctx`.
    #[must_use]
    pub fn trigger(&self, ctx: ContextId) -> Request {
        Request::new().send_trigger(ctx)
    }

    /// Reads `packets` buffered packets.
    #[must_use]
    pub fn read(&self, packets: usize) -> Request {
        Request::new().read(packets)
    }

    /// Drops `packets` buffered packets.
    #[must_use]
    pub fn discard(&self, packets: usize) -> Request {
        Request::new().discard(packets)
    }

    /// Drops every buffered packet, then optionally triggers `trigger`.
    #[must_use]
    pub fn clear(&self, trigger: Option<ContextId>) -> Request {
        let req = Request::new().clear();
        match trigger {
            Some(ctx) => req.send_trigger(ctx),
            None => req,
        }
    }

    /// Writes a register packet, reading back one packet if `timeout` is given.
    #[must_use]
    pub fn registers(&self, regs: impl Into<Vec<u8>>, readback: Option<Duration>) -> Request {
        let req = Request::new().write(regs);
        match readback {
            Some(timeout) => req.timeout(timeout).read(1),
            None => req,
        }
    }

    /// Pings the register, reading back one packet.
    #[must_use]
    pub fn ping(&self, timeout: Duration) -> Request {
        self.registers(register::ping(self.build), Some(timeout))
    }

    /// Decodes a register readback.
    pub fn process_readback(&self, data: &[u8]) -> Result<Readback, FpgaDriverError> {
        register::decode_readback(self.build, data)
    }

    /// Register packet asking for the PLL lock state.
    #[must_use]
    pub fn pll_query(&self) -> Vec<u8> {
        register::ping(self.build)
    }

    /// Register packets initializing the PLL.
    pub fn pll_init(&self) -> Result<Vec<Vec<u8>>, FpgaDriverError> {
        match self.build.params() {
            BuildParams::DacMemory(_) => Ok(vec![
                DacMemoryRegisters::serial(1, 0x1FC093)?.as_bytes().to_vec(),
                DacMemoryRegisters::serial(1, 0x1FC092)?.as_bytes().to_vec(),
                DacMemoryRegisters::serial(1, 0x100004)?.as_bytes().to_vec(),
                DacMemoryRegisters::serial(1, 0x000C11)?.as_bytes().to_vec(),
            ]),
            BuildParams::DacJumpTable(p) => Ok(vec![
                DacJumpTableRegisters::serial(p, 1, 0x1FC093)?.as_bytes().to_vec(),
                DacJumpTableRegisters::serial(p, 1, 0x1FC092)?.as_bytes().to_vec(),
                DacJumpTableRegisters::serial(p, 1, 0x100004)?.as_bytes().to_vec(),
                DacJumpTableRegisters::serial(p, 1, 0x000C11)?.as_bytes().to_vec(),
            ]),
            BuildParams::Adc(_) => [0x1FC093, 0x1FC092, 0x100004, 0x000C11]
                .into_iter()
                .map(|bits| Ok(AdcRegisters::serial(bits)?.as_bytes().to_vec()))
                .collect(),
        }
    }

    /// Register packet resetting the PLL.
    pub fn pll_reset(&self) -> Result<Vec<u8>, FpgaDriverError> {
        match self.build.params() {
            BuildParams::DacMemory(_) => Ok(DacMemoryRegisters::pll_reset().as_bytes().to_vec()),
            BuildParams::DacJumpTable(p) => {
                Ok(DacJumpTableRegisters::pll_reset(p).as_bytes().to_vec())
            }
            BuildParams::Adc(_) => Err(self.not_supported("PLL reset")),
        }
    }

    /// Register packet recalibrating the AD converters.
    pub fn adc_recalibrate(&self) -> Result<Vec<u8>, FpgaDriverError> {
        match self.build.params() {
            BuildParams::Adc(_) => Ok(AdcRegisters::recalibrate().as_bytes().to_vec()),
            _ => Err(self.not_supported("ADC recalibration")),
        }
    }

    pub(crate) fn not_supported(&self, feature: &'static str) -> FpgaDriverError {
        FpgaDriverError::NotSupported {
            board: self.name.clone(),
            feature,
        }
    }
}
