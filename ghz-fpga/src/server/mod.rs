mod scheduler;

pub use scheduler::{ChannelData, SequenceResult};

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use ghz_fpga_core::{board::BoardType, link::Transport};
use ghz_fpga_driver::{board::FpgaBoard, runner::BoardData};
use tokio::sync::RwLock;

use crate::{
    config::{BoardGroupConfig, ServerConfig},
    context::SequenceContext,
    error::FpgaError,
    group::{BoardGroup, PerformanceData, RunOptions},
    setup::SetupAction,
};

/// The board groups of one host and the entry point for running sequences.
pub struct FpgaServer<T: Transport + 'static> {
    transport: Arc<T>,
    config: ServerConfig,
    groups: RwLock<BTreeMap<String, Arc<BoardGroup<T>>>>,
}

impl<T: Transport + 'static> FpgaServer<T> {
    /// Creates a server without board groups.
    pub fn new(transport: T, config: ServerConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            groups: RwLock::new(BTreeMap::new()),
        }
    }

    /// The transport shared by every board group.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Opens a board group and detects its boards.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn add_board_group(
        &self,
        config: BoardGroupConfig,
    ) -> Result<Vec<FpgaBoard>, FpgaError> {
        check_free(&*self.groups.read().await, &config)?;

        // detect without holding the registry lock
        let group = Arc::new(BoardGroup::new(&config, self.transport.clone(), self.config).await?);
        let boards = match group.refresh().await {
            Ok(boards) => boards,
            Err(e) => {
                close(&group).await;
                return Err(e);
            }
        };

        let mut groups = self.groups.write().await;
        if let Err(e) = check_free(&groups, &config) {
            drop(groups);
            close(&group).await;
            return Err(e);
        }
        groups.insert(config.name, group);
        Ok(boards)
    }

    /// Closes a board group.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn remove_board_group(&self, name: &str) -> Result<(), FpgaError> {
        let group = self
            .groups
            .write()
            .await
            .remove(name)
            .ok_or_else(|| FpgaError::BoardGroupNotFound(name.to_owned()))?;
        group.shutdown().await
    }

    /// Board group names with their adapters.
    pub async fn list_board_groups(&self) -> Vec<(String, u32)> {
        self.groups
            .read()
            .await
            .iter()
            .map(|(name, g)| (name.clone(), g.port()))
            .collect()
    }

    /// The board group named `name`.
    pub async fn board_group(&self, name: &str) -> Result<Arc<BoardGroup<T>>, FpgaError> {
        self.groups
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| FpgaError::BoardGroupNotFound(name.to_owned()))
    }

    /// Every registered board.
    pub async fn list_devices(&self) -> Vec<FpgaBoard> {
        let groups = self.groups.read().await.values().cloned().collect::<Vec<_>>();
        let mut boards = Vec::new();
        for group in groups {
            boards.extend(group.devices().await);
        }
        boards
    }

    /// Every registered DAC.
    pub async fn list_dacs(&self) -> Vec<FpgaBoard> {
        self.list_type(BoardType::Dac).await
    }

    /// Every registered ADC.
    pub async fn list_adcs(&self) -> Vec<FpgaBoard> {
        self.list_type(BoardType::Adc).await
    }

    async fn list_type(&self, board_type: BoardType) -> Vec<FpgaBoard> {
        self.list_devices()
            .await
            .into_iter()
            .filter(|b| b.board_type() == board_type)
            .collect()
    }

    /// The board named `name`.
    pub async fn device(&self, name: &str) -> Result<FpgaBoard, FpgaError> {
        self.locate(name).await.map(|(_, board)| board)
    }

    async fn locate(&self, name: &str) -> Result<(Arc<BoardGroup<T>>, FpgaBoard), FpgaError> {
        let groups = self.groups.read().await.values().cloned().collect::<Vec<_>>();
        for group in groups {
            if let Some(board) = group.device(name).await {
                return Ok((group, board));
            }
        }
        Err(FpgaError::BoardNotFound(name.to_owned()))
    }

    /// Lock wait times of every board group.
    pub async fn performance_data(&self) -> Vec<(String, PerformanceData)> {
        let groups = self
            .groups
            .read()
            .await
            .iter()
            .map(|(name, g)| (name.clone(), g.clone()))
            .collect::<Vec<_>>();
        let mut data = Vec::with_capacity(groups.len());
        for (name, group) in groups {
            data.push((name, group.performance_data().await));
        }
        data
    }

    /// Runs the sequence configured in `ctx`.
    ///
    /// `reps` is rounded up to whole timing packets when DAC timing data is returned.
    /// Runs that time out are retried up to [`ServerConfig::retries`] attempts in total.
    /// Returns `None` unless `get_timing_data` is set.
    #[tracing::instrument(level = "debug", skip(self, ctx, setup))]
    pub async fn run_sequence(
        &self,
        ctx: &mut SequenceContext,
        reps: u32,
        get_timing_data: bool,
        setup: Vec<Arc<dyn SetupAction>>,
        setup_state: BTreeSet<String>,
    ) -> Result<Option<SequenceResult>, FpgaError> {
        let config = ctx.run_config();
        let timing_order = scheduler::timing_order(&config, get_timing_data)?;
        let reps = scheduler::round_reps(reps, timing_order.as_deref().unwrap_or_default())?;

        let names = if config.daisy_chain.is_empty() {
            vec![config
                .selected
                .clone()
                .ok_or(FpgaError::NoDeviceSelected)?]
        } else {
            config.daisy_chain.clone()
        };
        let mut group: Option<Arc<BoardGroup<T>>> = None;
        let mut boards = Vec::with_capacity(names.len());
        for name in &names {
            let (g, board) = self.locate(name).await?;
            match &group {
                Some(first) if !Arc::ptr_eq(first, &g) => {
                    return Err(FpgaError::BoardGroupMismatch)
                }
                Some(_) => {}
                None => group = Some(g),
            }
            boards.push(board);
        }
        let Some(group) = group else {
            return Err(FpgaError::NoDeviceSelected);
        };
        if config.daisy_chain.is_empty() && boards[0].board_type() != BoardType::Dac {
            return Err(FpgaError::WrongDeviceType(boards[0].name().to_owned(), "DAC"));
        }
        if let Some(order) = &timing_order {
            scheduler::check_timing_order(order, &boards)?;
        }

        let options = RunOptions {
            setup,
            setup_state,
            sync: config.master_sync,
            timing_order: timing_order.clone(),
        };
        let attempts = self.config.retries.max(1);
        let mut attempt = 1;
        let data = loop {
            let runners = scheduler::build_runners(&boards, &config, reps)?;
            match group.run(runners, options.clone()).await {
                Ok(data) => break data,
                Err(e) if e.is_timeout() && attempt < attempts => {
                    tracing::info!("attempt {} - error: {}", attempt, e);
                    tracing::info!("retrying...");
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_timeout() {
                        tracing::error!("attempt {} - error: {}", attempt, e);
                    }
                    return Err(e);
                }
            }
        };

        let (Some(order), Some(data)) = (timing_order, data) else {
            return Ok(None);
        };
        data.iter()
            .filter_map(|(name, d)| match d {
                BoardData::Demod(demod) => Some((name, demod.range)),
                _ => None,
            })
            .for_each(|(name, range)| ctx.set_demod_range(name.clone(), range));
        scheduler::aggregate(&order, &data).map(Some)
    }
}

fn check_free<T: Transport + 'static>(
    groups: &BTreeMap<String, Arc<BoardGroup<T>>>,
    config: &BoardGroupConfig,
) -> Result<(), FpgaError> {
    if groups.contains_key(&config.name) || groups.values().any(|g| g.port() == config.port) {
        return Err(FpgaError::BoardGroupExists(config.name.clone()));
    }
    Ok(())
}

async fn close<T: Transport + 'static>(group: &BoardGroup<T>) {
    if let Err(e) = group.shutdown().await {
        tracing::warn!("Closing board group {} failed: {}", group.name(), e);
    }
}
