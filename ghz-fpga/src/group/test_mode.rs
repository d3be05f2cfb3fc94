use ghz_fpga_core::{
    board::BoardType,
    defined::{DEFAULT_MASTER_SYNC, NUM_PAGES},
    link::{Request, Response, Transport},
};
use ghz_fpga_driver::firmware::{
    build::BuildParams,
    jump_table::JumpTable,
    register::{decode_adc_readback, AdcReadback, DacJumpTableRegisters, DacMemoryRegisters, Readback},
    sram::sram_write_packets,
};
use tokio::sync::{MutexGuard, SemaphorePermit};
use zerocopy::IntoBytes;

use super::{BoardGroup, GroupDevice, RunState};
use crate::error::FpgaError;

const MIN_SRAM_RUN: usize = 20;

/// Exclusive access to a board group for operations outside of the run pipeline.
///
/// Holding a `TestMode` waits for every run in flight to finish and keeps new runs out
/// until it is dropped.
pub struct TestMode<'a, T: Transport + 'static> {
    group: &'a BoardGroup<T>,
    _pipe: SemaphorePermit<'a>,
    _pages: Vec<MutexGuard<'a, ()>>,
    _run: MutexGuard<'a, RunState>,
    _read: MutexGuard<'a, ()>,
}

impl<T: Transport + 'static> BoardGroup<T> {
    /// Enters test mode.
    pub async fn test_mode(&self) -> Result<TestMode<'_, T>, FpgaError> {
        let pipe = self
            .pipe
            .acquire_many(NUM_PAGES as u32)
            .await
            .map_err(|e| FpgaError::TaskFailed(e.to_string()))?;
        let mut pages = Vec::with_capacity(NUM_PAGES);
        for lock in &self.page_locks {
            pages.push(lock.lock().await);
        }
        let run = self.run_lock.lock().await;
        let read = self.read_lock.lock().await;
        tracing::debug!("{} entered test mode", self.name);
        Ok(TestMode {
            group: self,
            _pipe: pipe,
            _pages: pages,
            _run: run,
            _read: read,
        })
    }
}

impl<T: Transport + 'static> TestMode<'_, T> {
    async fn send(&self, dev: &GroupDevice, request: Request) -> Result<Response, FpgaError> {
        Ok(self.group.transport.send(dev.ctx, request).await?)
    }

    async fn readback(&self, name: &str) -> Result<Readback, FpgaError> {
        let dev = self.group.group_device(name).await?;
        self.registers_readback(&dev, dev.board.pll_query()).await
    }

    async fn registers_readback(
        &self,
        dev: &GroupDevice,
        regs: Vec<u8>,
    ) -> Result<Readback, FpgaError> {
        let data = self.raw_readback(dev, regs).await?;
        Ok(dev.board.process_readback(&data)?)
    }

    async fn raw_readback(&self, dev: &GroupDevice, regs: Vec<u8>) -> Result<Vec<u8>, FpgaError> {
        let response = self
            .send(
                dev,
                dev.board
                    .registers(regs, Some(self.group.config.readback_timeout)),
            )
            .await?;
        response
            .into_read()
            .into_iter()
            .next()
            .map(|p| p.into_data())
            .ok_or_else(|| FpgaError::MissingData(dev.board.name().to_owned()))
    }

    /// Writes register packets, reading back the replies of DACs.
    async fn write_registers(
        &self,
        dev: &GroupDevice,
        packets: Vec<Vec<u8>>,
    ) -> Result<(), FpgaError> {
        let readback = (dev.board.board_type() == BoardType::Dac)
            .then_some(self.group.config.readback_timeout);
        let request = packets.into_iter().fold(Request::new(), |req, regs| {
            req.chain(dev.board.registers(regs, readback))
        });
        self.send(dev, request).await.map(|_| ())
    }

    /// Firmware build number reported by the board.
    pub async fn build_number(&self, name: &str) -> Result<u32, FpgaError> {
        Ok(self.readback(name).await?.build as u32)
    }

    /// Executions of the last run, as counted by the board.
    pub async fn execution_count(&self, name: &str) -> Result<u16, FpgaError> {
        Ok(self.readback(name).await?.executions)
    }

    /// Whether the 1 GHz PLL of the board has lost lock.
    pub async fn pll_query(&self, name: &str) -> Result<bool, FpgaError> {
        Ok(self.readback(name).await?.pll_unlocked)
    }

    /// Initializes the PLL.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn pll_init(&self, name: &str) -> Result<(), FpgaError> {
        let dev = self.group.group_device(name).await?;
        let packets = dev.board.pll_init()?;
        self.write_registers(&dev, packets).await
    }

    /// Resets the PLL of a DAC.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn pll_reset(&self, name: &str) -> Result<(), FpgaError> {
        let dev = self.group.group_device(name).await?;
        let packet = dev.board.pll_reset()?;
        self.write_registers(&dev, vec![packet]).await
    }

    /// Recalibrates the AD converters of an ADC.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn adc_recalibrate(&self, name: &str) -> Result<(), FpgaError> {
        let dev = self.group.group_device(name).await?;
        let packet = dev.board.adc_recalibrate()?;
        self.write_registers(&dev, vec![packet]).await
    }

    /// Full register readback of an ADC.
    pub async fn adc_register_readback(&self, name: &str) -> Result<AdcReadback, FpgaError> {
        let dev = self.group.group_device(name).await?;
        if dev.board.board_type() != BoardType::Adc {
            return Err(FpgaError::WrongDeviceType(name.to_owned(), "ADC"));
        }
        let data = self.raw_readback(&dev, dev.board.pll_query()).await?;
        Ok(decode_adc_readback(&data)?)
    }

    /// Plays `data` directly from SRAM, once or in a loop, without a sequence.
    #[tracing::instrument(level = "debug", skip(self, data))]
    pub async fn dac_run_sram(
        &self,
        name: &str,
        data: &[u32],
        looping: bool,
        block_delay: u32,
    ) -> Result<(), FpgaError> {
        if data.len() < MIN_SRAM_RUN {
            return Err(FpgaError::SramTooShort(data.len(), MIN_SRAM_RUN));
        }
        let dev = self.group.group_device(name).await?;
        let board = &dev.board;
        let len = data.len() as u32;
        match board.build().params() {
            BuildParams::DacMemory(p) => {
                self.registers_readback(&dev, board.pll_query()).await?;
                let request = sram_write_packets(p.sram_len, 0, data)?
                    .into_iter()
                    .fold(Request::new(), |req, pkt| req.write(pkt))
                    .write(
                        DacMemoryRegisters::run_sram(
                            p,
                            0,
                            len,
                            looping,
                            block_delay,
                            DEFAULT_MASTER_SYNC,
                        )?
                        .as_bytes(),
                    );
                self.send(&dev, request).await?;
            }
            BuildParams::DacJumpTable(p) => {
                let request = sram_write_packets(p.sram_len, 0, data)?
                    .into_iter()
                    .fold(Request::new(), |req, pkt| req.write(pkt))
                    .write(JumpTable::run_sram(p, 0, len, looping)?.to_bytes(p)?);
                self.send(&dev, request).await?;
                self.registers_readback(
                    &dev,
                    DacJumpTableRegisters::run_simple(p, true)?.as_bytes().to_vec(),
                )
                .await?;
            }
            BuildParams::Adc(_) => {
                return Err(FpgaError::WrongDeviceType(name.to_owned(), "DAC"));
            }
        }
        Ok(())
    }
}
