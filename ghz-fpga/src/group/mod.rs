mod detect;
mod lock;
mod packets;
mod recovery;
mod test_mode;

pub use lock::PerformanceData;
pub use test_mode::TestMode;

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use getset::{CopyGetters, Getters};
use ghz_fpga_core::{
    board::BoardId,
    defined::{DEFAULT_MASTER_SYNC, NUM_PAGES},
    link::{ContextId, Request, Response, Transport, TransportError},
};
use ghz_fpga_driver::{
    board::FpgaBoard,
    runner::{BoardData, BoardRunner},
};
use itertools::Itertools;
use tokio::{
    sync::{RwLock, Semaphore},
    task::JoinHandle,
};

use crate::{
    config::{BoardGroupConfig, ServerConfig},
    error::FpgaError,
    setup::SetupAction,
};
use lock::{TimedMutex, WaitHistory};
use packets::{Chain, Packet, RunPackets};

/// A detected board and the transport context addressing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct GroupDevice {
    pub board: FpgaBoard,
    pub ctx: ContextId,
}

/// State that only the holder of the run lock may touch.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    prev_triggers: u32,
    setup_state: BTreeSet<String>,
}

/// Options of one [`BoardGroup::run`].
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// External setup applied together with the ADC setup tables.
    pub setup: Vec<Arc<dyn SetupAction>>,
    /// Descriptors of the external setup.
    pub setup_state: BTreeSet<String>,
    /// Master sync counter.
    pub sync: u8,
    /// Boards and channels whose results are returned, or `None` to return nothing.
    pub timing_order: Option<Vec<String>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            setup: Vec::new(),
            setup_state: BTreeSet::new(),
            sync: DEFAULT_MASTER_SYNC,
            timing_order: None,
        }
    }
}

/// Boards daisy-chained behind one ethernet adapter.
///
/// Runs are pipelined: the sequence of the next run is uploaded into one page while the
/// previous run executes from the other. A run goes through four stages, each guarded by
/// its own lock:
///
/// 1. load, under the lock of the page(s) it writes,
/// 2. run, under the run lock, waiting for the triggers of the previous run,
/// 3. collect, under the read lock; the run lock is released as soon as the collect
///    requests are issued,
/// 4. read.
///
/// At most [`NUM_PAGES`] runs are in flight at once.
#[derive(Getters, CopyGetters)]
pub struct BoardGroup<T: Transport + 'static> {
    /// Group name.
    #[getset(get = "pub")]
    name: String,
    /// Ethernet adapter.
    #[getset(get_copy = "pub")]
    port: u32,
    /// Context into which run triggers are sent.
    #[getset(get_copy = "pub")]
    ctx: ContextId,
    transport: Arc<T>,
    config: ServerConfig,
    board_order: RwLock<Vec<(String, u32)>>,
    devices: RwLock<BTreeMap<String, GroupDevice>>,
    pipe: Semaphore,
    next_page: AtomicUsize,
    page_locks: [TimedMutex<()>; NUM_PAGES],
    run_lock: TimedMutex<RunState>,
    read_lock: TimedMutex<()>,
    trigger_waits: WaitHistory,
}

impl<T: Transport + 'static> BoardGroup<T> {
    /// Opens the run context of the group on `transport`.
    pub async fn new(
        config: &BoardGroupConfig,
        transport: Arc<T>,
        server: ServerConfig,
    ) -> Result<Self, FpgaError> {
        let ctx = transport.new_context().await?;
        transport
            .send(ctx, Request::new().connect(config.port))
            .await?;
        tracing::info!("Board group {} opened on port {}", config.name, config.port);
        Ok(Self {
            name: config.name.clone(),
            port: config.port,
            ctx,
            transport,
            config: server,
            board_order: RwLock::new(config.board_order()),
            devices: RwLock::new(BTreeMap::new()),
            pipe: Semaphore::new(NUM_PAGES),
            next_page: AtomicUsize::new(0),
            page_locks: std::array::from_fn(|_| TimedMutex::new(())),
            run_lock: TimedMutex::new(RunState::default()),
            read_lock: TimedMutex::new(()),
            trigger_waits: WaitHistory::default(),
        })
    }

    /// Expires every context opened by the group.
    #[tracing::instrument(level = "debug", skip(self), fields(group = %self.name))]
    pub async fn shutdown(&self) -> Result<(), FpgaError> {
        let devices = std::mem::take(&mut *self.devices.write().await);
        for dev in devices.into_values() {
            self.transport.expire_context(dev.ctx).await?;
        }
        self.transport.expire_context(self.ctx).await?;
        Ok(())
    }

    /// Replaces the daisy chain order and delays.
    pub async fn configure(&self, config: &BoardGroupConfig) {
        *self.board_order.write().await = config.board_order();
    }

    /// Daisy chain order with delays, as full device names.
    pub async fn board_order(&self) -> Vec<(String, u32)> {
        self.board_order.read().await.clone()
    }

    /// Registers a board, opening its own transport context.
    pub async fn add_device(&self, id: BoardId, build: u32) -> Result<FpgaBoard, FpgaError> {
        let board = FpgaBoard::new(id.device_name(&self.name), id, build)?;
        let ctx = self.transport.new_context().await?;
        self.transport.send(ctx, board.connect(self.port)).await?;
        tracing::debug!("{} (build {}) registered in {}", board.name(), build, ctx);
        let old = self.devices.write().await.insert(
            board.name().to_owned(),
            GroupDevice {
                board: board.clone(),
                ctx,
            },
        );
        if let Some(old) = old {
            self.transport.expire_context(old.ctx).await?;
        }
        Ok(board)
    }

    /// Detects the boards of the group and registers them, dropping boards that no
    /// longer answer.
    pub async fn refresh(&self) -> Result<Vec<FpgaBoard>, FpgaError> {
        let found = self.detect_boards().await?;
        let stale = {
            let devices = self.devices.read().await;
            devices
                .keys()
                .filter(|name| !found.iter().any(|(n, _, _)| n == *name))
                .cloned()
                .collect::<Vec<_>>()
        };
        for name in stale {
            if let Some(dev) = self.devices.write().await.remove(&name) {
                tracing::info!("{} disappeared", name);
                self.transport.expire_context(dev.ctx).await?;
            }
        }
        let mut boards = Vec::with_capacity(found.len());
        for (_, id, build) in found {
            boards.push(self.add_device(id, build).await?);
        }
        Ok(boards)
    }

    /// Registered boards, ordered by name.
    pub async fn devices(&self) -> Vec<FpgaBoard> {
        self.devices
            .read()
            .await
            .values()
            .map(|d| d.board.clone())
            .collect()
    }

    /// The registered board named `name`.
    pub async fn device(&self, name: &str) -> Option<FpgaBoard> {
        self.devices.read().await.get(name).map(|d| d.board.clone())
    }

    pub(crate) async fn group_device(&self, name: &str) -> Result<GroupDevice, FpgaError> {
        self.devices
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| FpgaError::BoardNotFound(name.to_owned()))
    }

    /// Wait times of the pipeline locks.
    pub async fn performance_data(&self) -> PerformanceData {
        let mut page = Vec::with_capacity(NUM_PAGES);
        for lock in &self.page_locks {
            page.push(lock.waits().await);
        }
        PerformanceData {
            page,
            run: self.run_lock.waits().await,
            run_trigger: self.trigger_waits.snapshot().await,
            read: self.read_lock.waits().await,
        }
    }

    /// Runs one sequence on the boards of `runners`.
    ///
    /// Every runner must belong to a board of this group. The first runner in daisy
    /// chain order is the master. Returns the extracted data of the boards named by
    /// the timing order, keyed by device name.
    #[tracing::instrument(level = "debug", skip_all, fields(group = %self.name))]
    pub async fn run(
        &self,
        mut runners: Vec<Box<dyn BoardRunner>>,
        options: RunOptions,
    ) -> Result<Option<BTreeMap<String, BoardData>>, FpgaError> {
        if runners.is_empty() {
            return Ok(options.timing_order.map(|_| BTreeMap::new()));
        }

        let pages = if runners.iter().all(|r| r.pageable()) {
            vec![self.next_page.fetch_add(1, Ordering::Relaxed) % NUM_PAGES]
        } else {
            tracing::warn!(
                "Paging off: SRAM too long on {}",
                runners
                    .iter()
                    .filter(|r| !r.pageable())
                    .map(|r| r.board().name())
                    .join(", ")
            );
            (0..NUM_PAGES).collect()
        };

        let timing_order = options.timing_order.clone().unwrap_or_default();
        let RunPackets {
            load,
            setup,
            setup_state: board_setup_state,
            run,
            collect,
            read,
        } = {
            let order = self.board_order.read().await;
            let devices = self.devices.read().await;
            Chain {
                order: &order,
                devices: &devices,
                run_ctx: self.ctx,
            }
            .packets(
                &mut runners,
                pages[0],
                options.sync,
                self.config.timeout_factor,
                &timing_order,
            )?
        };
        let mut setup_state = options.setup_state;
        setup_state.extend(board_setup_state);

        let _permit = self
            .pipe
            .acquire()
            .await
            .map_err(|e| FpgaError::TaskFailed(e.to_string()))?;
        tracing::debug!("pipe semaphore acquired");

        // stage 1: load
        let mut page_guards = Vec::with_capacity(pages.len());
        for &page in &pages {
            page_guards.push(self.page_locks[page].lock().await);
        }
        tracing::debug!("page locks {:?} acquired", pages);

        // stage 2: run
        let (loaded, mut state) = tokio::join!(self.send_all("Load", load), self.run_lock.lock());
        loaded?;
        tracing::debug!(
            "run lock acquired, waiting for {} previous triggers",
            state.prev_triggers
        );

        let need_setup = setup_state.is_empty()
            || state.setup_state.is_empty()
            || !setup_state.is_subset(&state.setup_state);
        let response = if need_setup {
            tracing::debug!("setup required");
            let response = self
                .transport
                .send(
                    self.ctx,
                    Request::new().wait_for_trigger(state.prev_triggers),
                )
                .await?;
            state.prev_triggers = 0;
            if let Err(e) = self.apply_setup(&options.setup, setup).await {
                tracing::error!("Setup failed: {}", e);
                state.setup_state.clear();
                return Err(e);
            }
            state.setup_state = setup_state;
            state.prev_triggers = runners.len() as u32;
            self.transport.send(self.ctx, run).await?;
            response
        } else {
            let wait = std::mem::replace(&mut state.prev_triggers, runners.len() as u32);
            self.transport
                .send(self.ctx, Request::new().wait_for_trigger(wait).chain(run))
                .await?
        };
        if let Some(wait) = response.trigger_wait() {
            self.trigger_waits.record(*wait).await;
        }
        tracing::info!("{} boards started", runners.len());

        // stage 3: collect
        let read_guard = self.read_lock.lock().await;
        tracing::debug!("read lock acquired");
        let contexts = collect.iter().map(|p| p.ctx).collect::<Vec<_>>();
        let collecting = self.spawn_all(collect);
        drop(state);
        tracing::debug!("run lock released");
        let collected = collecting.join().await;
        drop(page_guards);
        tracing::debug!("page locks released");

        if collected.iter().any(Result::is_err) {
            runners
                .iter()
                .zip(&collected)
                .filter_map(|(r, res)| res.as_ref().err().map(|e| (r, e)))
                .for_each(|(r, e)| tracing::error!("{}: {}", r.board().name(), e));
            let ok = collected.iter().map(Result::is_ok).collect::<Vec<_>>();
            let report = self.recover(&runners, &contexts, &ok).await;
            drop(read_guard);
            return Err(FpgaError::Timeout(report));
        }

        // stage 4: read
        let reading = self.spawn_all(read);
        drop(read_guard);
        let names = runners
            .iter()
            .map(|r| r.board().name().to_owned())
            .collect::<Vec<_>>();
        let responses = check_all("Read", &names, reading.join().await)?;

        let Some(timing_order) = options.timing_order else {
            return Ok(None);
        };
        runners
            .iter()
            .zip(responses)
            .filter(|(r, _)| r.keeps(&timing_order))
            .map(|(r, response)| -> Result<_, FpgaError> {
                Ok((r.board().name().to_owned(), r.extract(response.read())?))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Some)
    }

    async fn apply_setup(
        &self,
        actions: &[Arc<dyn SetupAction>],
        packets: Vec<Packet>,
    ) -> Result<(), FpgaError> {
        let external = async {
            for action in actions {
                action.apply().await?;
            }
            Ok::<_, FpgaError>(())
        };
        let (boards, external) = tokio::join!(self.send_all("Setup", packets), external);
        boards?;
        external
    }

    async fn send_all(
        &self,
        stage: &'static str,
        packets: Vec<Packet>,
    ) -> Result<Vec<Response>, FpgaError> {
        let names = packets.iter().map(|p| p.board.clone()).collect::<Vec<_>>();
        check_all(stage, &names, self.spawn_all(packets).join().await)
    }

    fn spawn_all(&self, packets: Vec<Packet>) -> InFlight {
        InFlight(
            packets
                .into_iter()
                .map(|p| {
                    let transport = self.transport.clone();
                    tokio::spawn(async move { transport.send(p.ctx, p.request).await })
                })
                .collect(),
        )
    }
}

struct InFlight(Vec<JoinHandle<Result<Response, TransportError>>>);

impl InFlight {
    async fn join(self) -> Vec<Result<Response, TransportError>> {
        let mut results = Vec::with_capacity(self.0.len());
        for handle in self.0 {
            results.push(
                handle
                    .await
                    .unwrap_or_else(|e| Err(TransportError::new(e.to_string()))),
            );
        }
        results
    }
}

fn check_all(
    stage: &'static str,
    names: &[String],
    results: Vec<Result<Response, TransportError>>,
) -> Result<Vec<Response>, FpgaError> {
    if results.iter().all(Result::is_ok) {
        return Ok(results.into_iter().flatten().collect());
    }
    let details = names
        .iter()
        .zip(&results)
        .map(|(name, res)| match res {
            Ok(_) => format!("{} : OK", name),
            Err(e) => format!("{} : error! {}", name, e),
        })
        .join("\n");
    Err(FpgaError::StageFailed { stage, details })
}
