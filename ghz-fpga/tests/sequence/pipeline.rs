use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use ghz_fpga::{
    link::{Audit, AuditEvent},
    prelude::*,
};
use ghz_fpga_core::link::{ContextId, Record, Request, Response, Transport, TransportError};
use ghz_fpga_driver::firmware::sram::MEMORY_PACKET_LEN;
use tokio::{
    sync::{Notify, Semaphore},
    task::JoinHandle,
};

use crate::{audit, memory_dac, server_config, GROUP, PORT};

/// Counts runs between their load and the end of their read.
struct Counting {
    inner: Audit,
    in_flight: AtomicUsize,
    max: AtomicUsize,
}

#[async_trait::async_trait]
impl Transport for Counting {
    async fn new_context(&self) -> Result<ContextId, TransportError> {
        self.inner.new_context().await
    }

    async fn send(&self, ctx: ContextId, request: Request) -> Result<Response, TransportError> {
        if request.writes().any(|w| w.len() == MEMORY_PACKET_LEN) {
            let n = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(n, Ordering::SeqCst);
        }
        let reads = request
            .records()
            .iter()
            .any(|r| matches!(r, Record::Read(_) | Record::Discard(_)));
        tokio::task::yield_now().await;
        let response = self.inner.send(ctx, request).await;
        if reads {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        response
    }

    async fn expire_context(&self, ctx: ContextId) -> Result<(), TransportError> {
        self.inner.expire_context(ctx).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_two_runs_in_flight() -> anyhow::Result<()> {
    let transport = Counting {
        inner: audit(&[(BoardId::dac(1), 7)])?,
        in_flight: AtomicUsize::new(0),
        max: AtomicUsize::new(0),
    };
    let server = Arc::new(FpgaServer::new(transport, server_config()));
    server
        .add_board_group(BoardGroupConfig::new(
            GROUP,
            PORT,
            [("DAC 1".to_owned(), 0)],
        ))
        .await?;

    let mut ctx = SequenceContext::new();
    memory_dac(&*server, &mut ctx, "DAC 1").await?;

    let handles = (0..6)
        .map(|_| {
            let server = server.clone();
            let mut ctx = ctx.clone();
            tokio::spawn(async move {
                server
                    .run_sequence(&mut ctx, 30, true, vec![], BTreeSet::new())
                    .await
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        let result = handle.await??;
        assert!(matches!(result, Some(SequenceResult::Matrix(_))));
    }

    let transport = server.transport();
    assert_eq!(0, transport.in_flight.load(Ordering::SeqCst));
    assert!(transport.max.load(Ordering::SeqCst) <= 2);
    assert_eq!(
        6,
        transport
            .inner
            .events()
            .iter()
            .filter(|e| matches!(e, AuditEvent::Run { .. }))
            .count()
    );
    Ok(())
}

/// Holds the first collect or run request until released.
struct Gate {
    inner: Audit,
    run_ctx: Mutex<Option<ContextId>>,
    hold_collect: AtomicBool,
    hold_run: AtomicBool,
    held: Notify,
    release: Semaphore,
    collected: AtomicBool,
    /// Trigger count of every wait, and whether the same request starts the boards.
    waits: Mutex<Vec<(u32, bool)>>,
}

impl Gate {
    fn new(inner: Audit) -> Self {
        Self {
            inner,
            run_ctx: Mutex::new(None),
            hold_collect: AtomicBool::new(false),
            hold_run: AtomicBool::new(false),
            held: Notify::new(),
            release: Semaphore::new(0),
            collected: AtomicBool::new(false),
            waits: Mutex::new(Vec::new()),
        }
    }

    async fn wait_recorded(&self, expected: (u32, bool)) -> anyhow::Result<()> {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !self.waits.lock().unwrap().contains(&expected) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for Gate {
    async fn new_context(&self) -> Result<ContextId, TransportError> {
        self.inner.new_context().await
    }

    async fn send(&self, ctx: ContextId, request: Request) -> Result<Response, TransportError> {
        let starts = request.writes().next().is_some();
        let is_run = starts && *self.run_ctx.lock().unwrap() == Some(ctx);
        self.waits
            .lock()
            .unwrap()
            .extend(request.records().iter().filter_map(|r| match r {
                Record::WaitForTrigger(n) => Some((*n, starts)),
                _ => None,
            }));

        let collect = request
            .records()
            .iter()
            .any(|r| matches!(r, Record::Collect(_)));
        let held_collect = collect && self.hold_collect.swap(false, Ordering::SeqCst);
        let held_run = is_run && self.hold_run.swap(false, Ordering::SeqCst);
        if held_collect || held_run {
            self.held.notify_one();
            let _open = self
                .release
                .acquire()
                .await
                .map_err(|e| TransportError::new(e.to_string()))?;
        }

        let response = self.inner.send(ctx, request).await;
        if held_collect {
            self.collected.store(true, Ordering::SeqCst);
        }
        response
    }

    async fn expire_context(&self, ctx: ContextId) -> Result<(), TransportError> {
        self.inner.expire_context(ctx).await
    }
}

async fn gated_server() -> anyhow::Result<(Arc<FpgaServer<Gate>>, SequenceContext)> {
    let server = Arc::new(FpgaServer::new(
        Gate::new(audit(&[(BoardId::dac(1), 7)])?),
        server_config(),
    ));
    server
        .add_board_group(BoardGroupConfig::new(
            GROUP,
            PORT,
            [("DAC 1".to_owned(), 0)],
        ))
        .await?;
    let group = server.board_group(GROUP).await?;
    *server.transport().run_ctx.lock().unwrap() = Some(group.ctx());

    let mut ctx = SequenceContext::new();
    memory_dac(&*server, &mut ctx, "DAC 1").await?;
    Ok((server, ctx))
}

fn spawn_run(
    server: &Arc<FpgaServer<Gate>>,
    ctx: &SequenceContext,
    setup_state: &[&str],
) -> JoinHandle<Result<Option<SequenceResult>, FpgaError>> {
    let server = server.clone();
    let mut ctx = ctx.clone();
    let setup_state = setup_state.iter().map(|s| (*s).to_owned()).collect();
    tokio::spawn(async move {
        server
            .run_sequence(&mut ctx, 30, false, vec![], setup_state)
            .await
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn next_run_starts_while_previous_collects() -> anyhow::Result<()> {
    let (server, ctx) = gated_server().await?;
    let transport = server.transport();
    transport.hold_collect.store(true, Ordering::SeqCst);

    let first = spawn_run(&server, &ctx, &["6 GHz"]);
    transport.held.notified().await;
    let second = spawn_run(&server, &ctx, &["6 GHz"]);

    // unchanged setup: one request waits for the first board and starts the next run
    transport.wait_recorded((1, true)).await?;
    assert!(!transport.collected.load(Ordering::SeqCst));

    transport.release.add_permits(1);
    assert_eq!(None, first.await??);
    assert_eq!(None, second.await??);
    assert!(transport.collected.load(Ordering::SeqCst));
    assert_eq!(
        2,
        transport
            .inner
            .events()
            .iter()
            .filter(|e| matches!(e, AuditEvent::Run { .. }))
            .count()
    );
    Ok(())
}

#[tokio::test]
async fn cancelled_run_counts_its_triggers() -> anyhow::Result<()> {
    let (server, ctx) = gated_server().await?;
    let transport = server.transport();
    transport.hold_run.store(true, Ordering::SeqCst);

    let first = spawn_run(&server, &ctx, &[]);
    transport.held.notified().await;
    first.abort();
    assert!(first.await.is_err_and(|e| e.is_cancelled()));
    transport.waits.lock().unwrap().clear();

    // the run packet may already be on the wire, so the next run waits for its board
    let second = spawn_run(&server, &ctx, &[]);
    let waited = transport.wait_recorded((1, false)).await;
    second.abort();
    waited?;
    assert_eq!(vec![(1, false)], *transport.waits.lock().unwrap());
    Ok(())
}
