use std::collections::BTreeMap;

use ghz_fpga_core::{board::BoardType, defined::DEFAULT_MASTER_SYNC};
use ghz_fpga_driver::{
    board::FpgaBoard,
    firmware::{
        adc::{MixerTable, TriggerRow, TriggerTable},
        build::{AdcBuild, BuildParams, JumpTableBuild, MemoryBuild},
        jump_table::{JumpCommand, JumpEntry},
        memory::MemorySequence,
        sram::{DualBlock, SramData},
    },
    runner::{AdcRunMode, DemodRange},
};

use crate::error::FpgaError;

/// Sequence settings of one board.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoardConfig {
    /// SRAM contents of a DAC.
    pub sram: Option<SramData>,
    /// Memory sequence of a memory-sequence DAC.
    pub memory: Option<MemorySequence>,
    /// Start delay in clock cycles.
    pub start_delay: u32,
    /// Delay between repetitions of a jump-table DAC in µs.
    pub loop_delay: u32,
    /// Jump table entries of a jump-table DAC.
    pub jump_table: Vec<JumpEntry>,
    /// Jump table counters of a jump-table DAC.
    pub counters: Vec<u32>,
    /// Acquisition mode of an ADC.
    pub run_mode: AdcRunMode,
    /// Trigger table of an ADC.
    pub trigger_table: Option<TriggerTable>,
    /// Mixer tables of an ADC by demodulator channel.
    pub mixers: BTreeMap<usize, MixerTable>,
    /// Monitor output selectors of an ADC.
    pub monitors: (u8, u8),
}

/// Everything one sequence run needs, snapshotted from a [`SequenceContext`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// Selected device, run alone when the daisy chain is empty.
    pub selected: Option<String>,
    /// Settings by device name.
    pub boards: BTreeMap<String, BoardConfig>,
    /// Boards to run. Their order is taken from the board group.
    pub daisy_chain: Vec<String>,
    /// Boards and channels whose data is returned, in that order.
    pub timing_order: Option<Vec<String>>,
    /// Master sync counter.
    pub master_sync: u8,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            selected: None,
            boards: BTreeMap::new(),
            daisy_chain: Vec::new(),
            timing_order: None,
            master_sync: DEFAULT_MASTER_SYNC,
        }
    }
}

impl RunConfig {
    /// Settings of `name`, or the defaults if nothing was set.
    #[must_use]
    pub fn board(&self, name: &str) -> BoardConfig {
        self.boards.get(name).cloned().unwrap_or_default()
    }
}

/// Per-client state that sequence settings are accumulated into.
///
/// Settings apply to the selected device. Jump table entries are not cleared by
/// running a sequence and must be cleared explicitly.
#[derive(Clone, Debug, Default)]
pub struct SequenceContext {
    selected: Option<FpgaBoard>,
    config: RunConfig,
    ranges: BTreeMap<String, DemodRange>,
}

impl SequenceContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the device that subsequent settings apply to.
    pub fn select_device(&mut self, board: FpgaBoard) -> &mut Self {
        self.config.selected = Some(board.name().to_owned());
        self.selected = Some(board);
        self
    }

    /// The selected device.
    pub fn selected(&self) -> Result<&FpgaBoard, FpgaError> {
        self.selected.as_ref().ok_or(FpgaError::NoDeviceSelected)
    }

    fn selected_of(&self, board_type: BoardType) -> Result<&FpgaBoard, FpgaError> {
        let board = self.selected()?;
        if board.board_type() != board_type {
            return Err(FpgaError::WrongDeviceType(
                board.name().to_owned(),
                match board_type {
                    BoardType::Dac => "DAC",
                    BoardType::Adc => "ADC",
                },
            ));
        }
        Ok(board)
    }

    fn memory_dac(&self) -> Result<(String, MemoryBuild), FpgaError> {
        let board = self.selected_of(BoardType::Dac)?;
        match board.build().params() {
            BuildParams::DacMemory(p) => Ok((board.name().to_owned(), *p)),
            _ => Err(FpgaError::WrongDeviceType(
                board.name().to_owned(),
                "memory-sequence DAC",
            )),
        }
    }

    fn jump_table_dac(&self) -> Result<(String, JumpTableBuild), FpgaError> {
        let board = self.selected_of(BoardType::Dac)?;
        match board.build().params() {
            BuildParams::DacJumpTable(p) => Ok((board.name().to_owned(), *p)),
            _ => Err(FpgaError::WrongDeviceType(
                board.name().to_owned(),
                "jump-table DAC",
            )),
        }
    }

    fn adc(&self) -> Result<(String, AdcBuild), FpgaError> {
        let board = self.selected_of(BoardType::Adc)?;
        match board.build().params() {
            BuildParams::Adc(p) => Ok((board.name().to_owned(), *p)),
            _ => Err(FpgaError::WrongDeviceType(board.name().to_owned(), "ADC")),
        }
    }

    fn board_mut(&mut self, name: String) -> &mut BoardConfig {
        self.config.boards.entry(name).or_default()
    }

    /// Sets the SRAM contents of the selected DAC.
    pub fn sram(&mut self, data: Vec<u32>) -> Result<&mut Self, FpgaError> {
        let name = self.selected_of(BoardType::Dac)?.name().to_owned();
        self.board_mut(name).sram = Some(SramData::Single(data));
        Ok(self)
    }

    /// Sets two SRAM blocks separated by `delay_ns` on the selected memory-sequence DAC.
    pub fn sram_dual_block(
        &mut self,
        block0: Vec<u32>,
        block1: Vec<u32>,
        delay_ns: usize,
    ) -> Result<&mut Self, FpgaError> {
        let (name, build) = self.memory_dac()?;
        self.board_mut(name).sram = Some(SramData::DualBlock(DualBlock::new(
            block0,
            block1,
            delay_ns,
            build.sram_delay_len,
        )));
        Ok(self)
    }

    /// Sets the memory sequence of the selected memory-sequence DAC.
    pub fn memory(&mut self, memory: MemorySequence) -> Result<&mut Self, FpgaError> {
        let (name, build) = self.memory_dac()?;
        if memory.len() > build.mem_page_len {
            return Err(
                ghz_fpga_driver::error::FpgaDriverError::MemoryTooLong(memory.len(), build.mem_page_len)
                    .into(),
            );
        }
        self.board_mut(name).memory = Some(memory);
        Ok(self)
    }

    /// Sets the start delay of the selected device.
    pub fn start_delay(&mut self, delay: u32) -> Result<&mut Self, FpgaError> {
        let name = self.selected()?.name().to_owned();
        self.board_mut(name).start_delay = delay;
        Ok(self)
    }

    /// Sets the delay between repetitions of the selected jump-table DAC.
    pub fn loop_delay(&mut self, delay: u32) -> Result<&mut Self, FpgaError> {
        let (name, _) = self.jump_table_dac()?;
        self.board_mut(name).loop_delay = delay;
        Ok(self)
    }

    /// Appends a jump table entry, e.g. `("END", &[256])` or `("IDLE", &[100, 2000])`.
    pub fn jump_table_add_entry(&mut self, command: &str, args: &[u32]) -> Result<&mut Self, FpgaError> {
        let (name, build) = self.jump_table_dac()?;
        let entry = JumpCommand::parse(command, args)?.to_entry(&build)?;
        self.board_mut(name).jump_table.push(entry);
        Ok(self)
    }

    /// Removes every jump table entry and counter of the selected jump-table DAC.
    pub fn jump_table_clear(&mut self) -> Result<&mut Self, FpgaError> {
        let (name, _) = self.jump_table_dac()?;
        let board = self.board_mut(name);
        board.jump_table.clear();
        board.counters.clear();
        Ok(self)
    }

    /// Sets the jump table counters of the selected jump-table DAC.
    pub fn jump_table_set_counters(&mut self, counters: Vec<u32>) -> Result<&mut Self, FpgaError> {
        let (name, build) = self.jump_table_dac()?;
        if counters.len() > build.num_counters {
            return Err(ghz_fpga_driver::error::FpgaDriverError::TooManyCounters(
                counters.len(),
                build.num_counters,
            )
            .into());
        }
        self.board_mut(name).counters = counters;
        Ok(self)
    }

    /// Sets the acquisition mode of the selected ADC.
    pub fn adc_run_mode(&mut self, mode: AdcRunMode) -> Result<&mut Self, FpgaError> {
        let (name, _) = self.adc()?;
        self.board_mut(name).run_mode = mode;
        Ok(self)
    }

    /// Sets the trigger table of the selected ADC.
    pub fn adc_trigger_table(&mut self, rows: Vec<TriggerRow>) -> Result<&mut Self, FpgaError> {
        let (name, build) = self.adc()?;
        let table = TriggerTable::new(&build, rows)?;
        self.board_mut(name).trigger_table = Some(table);
        Ok(self)
    }

    /// Sets the mixer table of one demodulator channel of the selected ADC.
    pub fn adc_mixer_table(
        &mut self,
        channel: usize,
        pairs: Vec<(i8, i8)>,
    ) -> Result<&mut Self, FpgaError> {
        let (name, build) = self.adc()?;
        if channel >= build.demod_channels {
            return Err(ghz_fpga_driver::error::FpgaDriverError::DemodChannelOutOfRange(
                channel,
                build.demod_channels,
            )
            .into());
        }
        let table = MixerTable::new(&build, pairs)?;
        self.board_mut(name).mixers.insert(channel, table);
        Ok(self)
    }

    /// Sets the monitor output selectors of the selected ADC.
    pub fn adc_monitor_outputs(&mut self, mon0: u8, mon1: u8) -> Result<&mut Self, FpgaError> {
        let (name, _) = self.adc()?;
        self.board_mut(name).monitors = (mon0, mon1);
        Ok(self)
    }

    /// Sets the boards to run. An empty list runs the selected DAC alone.
    pub fn daisy_chain(&mut self, boards: Vec<String>) -> &mut Self {
        self.config.daisy_chain = boards;
        self
    }

    /// Sets the boards and channels whose data is returned.
    ///
    /// Entries are device names, or `"<device>::<channel>"` for one demodulator channel.
    pub fn timing_order(&mut self, entries: Vec<String>) -> &mut Self {
        self.config.timing_order = Some(entries);
        self
    }

    /// Sets the master sync counter.
    pub fn master_sync(&mut self, sync: u8) -> &mut Self {
        self.config.master_sync = sync;
        self
    }

    /// Demodulator ranges of the selected ADC from the last run of this context.
    pub fn adc_demod_range(&self) -> Result<DemodRange, FpgaError> {
        let (name, _) = self.adc()?;
        self.ranges
            .get(&name)
            .copied()
            .ok_or(FpgaError::NoDemodRange(name))
    }

    pub(crate) fn set_demod_range(&mut self, name: String, range: DemodRange) {
        self.ranges.insert(name, range);
    }

    /// Snapshot of the settings for one run.
    #[must_use]
    pub fn run_config(&self) -> RunConfig {
        self.config.clone()
    }
}
