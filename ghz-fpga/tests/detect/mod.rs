use std::{collections::BTreeSet, sync::Arc, time::Duration};

use ghz_fpga::{link::Audit, prelude::*};
use ghz_fpga_core::link::{ContextId, Record, Request, Response, Transport, TransportError};
use ghz_fpga_emulator::BoardEmulator;
use tokio::sync::{Notify, Semaphore};

use super::{audit, memory_dac, name, open, server_config, GROUP, PORT};

#[tokio::test]
async fn boards_are_registered() -> anyhow::Result<()> {
    let server = open(
        &[(BoardId::dac(1), 7), (BoardId::dac(4), 15), (BoardId::adc(2), 7)],
        &[("DAC 1", 0), ("ADC 2", 0), ("DAC 4", 0)],
        server_config(),
    )
    .await?;

    assert_eq!(vec![(GROUP.to_owned(), PORT)], server.list_board_groups().await);
    assert_eq!(
        vec![name("ADC 2"), name("DAC 1"), name("DAC 4")],
        server
            .list_devices()
            .await
            .iter()
            .map(|b| b.name().to_owned())
            .collect::<Vec<_>>()
    );
    assert_eq!(
        vec![name("DAC 1"), name("DAC 4")],
        server
            .list_dacs()
            .await
            .iter()
            .map(|b| b.name().to_owned())
            .collect::<Vec<_>>()
    );
    let adcs = server.list_adcs().await;
    assert_eq!(1, adcs.len());
    assert_eq!(BoardId::adc(2), adcs[0].id());
    assert_eq!(7, adcs[0].build().number());

    let dac = server.device(&name("DAC 4")).await?;
    assert!(dac.has_jump_table());
    assert_eq!(
        Err(FpgaError::BoardNotFound(name("DAC 9"))),
        server.device(&name("DAC 9")).await
    );
    Ok(())
}

#[tokio::test]
async fn duplicate_groups_are_rejected() -> anyhow::Result<()> {
    let server = open(&[(BoardId::dac(1), 7)], &[("DAC 1", 0)], server_config()).await?;

    assert_eq!(
        Err(FpgaError::BoardGroupExists(GROUP.to_owned())),
        server
            .add_board_group(BoardGroupConfig::new(GROUP, PORT + 1, []))
            .await
    );
    assert_eq!(
        Err(FpgaError::BoardGroupExists("Other".to_owned())),
        server
            .add_board_group(BoardGroupConfig::new("Other", PORT, []))
            .await
    );
    assert_eq!(1, server.list_board_groups().await.len());
    Ok(())
}

#[tokio::test]
async fn empty_adapter() -> anyhow::Result<()> {
    let server = FpgaServer::new(audit(&[(BoardId::dac(1), 7)])?, server_config());
    let boards = server
        .add_board_group(BoardGroupConfig::new(GROUP, PORT, [("DAC 1".to_owned(), 0)]))
        .await?;
    assert_eq!(1, boards.len());

    // an empty adapter has no boards
    let boards = server
        .add_board_group(BoardGroupConfig::new("Empty", PORT + 1, []))
        .await?;
    assert!(boards.is_empty());
    assert_eq!(1, server.list_devices().await.len());
    Ok(())
}

#[tokio::test]
async fn remove_board_group() -> anyhow::Result<()> {
    let server = open(
        &[(BoardId::dac(1), 7), (BoardId::adc(1), 7)],
        &[("DAC 1", 0), ("ADC 1", 0)],
        server_config(),
    )
    .await?;
    assert!(server.transport().open_contexts() > 0);

    server.remove_board_group(GROUP).await?;
    assert_eq!(0, server.transport().open_contexts());
    assert!(server.list_devices().await.is_empty());
    assert!(matches!(
        server.board_group(GROUP).await,
        Err(FpgaError::BoardGroupNotFound(_))
    ));
    assert_eq!(
        Err(FpgaError::BoardGroupNotFound(GROUP.to_owned())),
        server.remove_board_group(GROUP).await
    );
    Ok(())
}

#[tokio::test]
async fn refresh_drops_missing_boards() -> anyhow::Result<()> {
    let server = open(
        &[(BoardId::dac(1), 7), (BoardId::dac(2), 8)],
        &[("DAC 1", 0), ("DAC 2", 0)],
        server_config(),
    )
    .await?;
    let group = server.board_group(GROUP).await?;
    assert_eq!(2, group.devices().await.len());

    server
        .transport()
        .boards(PORT, |boards| boards.retain(|b| b.id() != BoardId::dac(2)));
    let found = group.refresh().await?;
    assert_eq!(vec![BoardId::dac(1)], found.iter().map(|b| b.id()).collect::<Vec<_>>());
    assert_eq!(
        vec![name("DAC 1")],
        group
            .devices()
            .await
            .iter()
            .map(|b| b.name().to_owned())
            .collect::<Vec<_>>()
    );
    Ok(())
}

/// Stalls every request that connects to `port` until released.
struct SlowAdapter {
    inner: Audit,
    port: u32,
    entered: Notify,
    release: Semaphore,
}

#[async_trait::async_trait]
impl Transport for SlowAdapter {
    async fn new_context(&self) -> Result<ContextId, TransportError> {
        self.inner.new_context().await
    }

    async fn send(&self, ctx: ContextId, request: Request) -> Result<Response, TransportError> {
        if request
            .records()
            .iter()
            .any(|r| matches!(r, Record::Connect(p) if *p == self.port))
        {
            self.entered.notify_one();
            let _open = self
                .release
                .acquire()
                .await
                .map_err(|e| TransportError::new(e.to_string()))?;
        }
        self.inner.send(ctx, request).await
    }

    async fn expire_context(&self, ctx: ContextId) -> Result<(), TransportError> {
        self.inner.expire_context(ctx).await
    }
}

#[tokio::test]
async fn adding_a_group_does_not_block_others() -> anyhow::Result<()> {
    let inner = Audit::new(
        Default::default(),
        [
            (PORT, BoardEmulator::new(BoardId::dac(1), 7)?),
            (PORT + 1, BoardEmulator::new(BoardId::dac(2), 7)?),
        ],
    );
    let server = Arc::new(FpgaServer::new(
        SlowAdapter {
            inner,
            port: PORT + 1,
            entered: Notify::new(),
            release: Semaphore::new(0),
        },
        server_config(),
    ));
    server
        .add_board_group(BoardGroupConfig::new(GROUP, PORT, [("DAC 1".to_owned(), 0)]))
        .await?;
    let mut ctx = SequenceContext::new();
    memory_dac(&*server, &mut ctx, "DAC 1").await?;

    let adding = tokio::spawn({
        let server = server.clone();
        async move {
            server
                .add_board_group(BoardGroupConfig::new(
                    "Other",
                    PORT + 1,
                    [("DAC 2".to_owned(), 0)],
                ))
                .await
        }
    });
    server.transport().entered.notified().await;

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        server.run_sequence(&mut ctx, 30, false, vec![], BTreeSet::new()),
    )
    .await?;
    assert_eq!(None, result?);
    assert_eq!(1, server.list_devices().await.len());
    assert!(!adding.is_finished());

    server.transport().release.add_permits(1);
    let boards = adding.await??;
    assert_eq!(vec![BoardId::dac(2)], boards.iter().map(|b| b.id()).collect::<Vec<_>>());
    assert_eq!(
        vec![("Other".to_owned(), PORT + 1), (GROUP.to_owned(), PORT)],
        server.list_board_groups().await
    );
    Ok(())
}

#[tokio::test]
async fn racing_groups_on_one_adapter() -> anyhow::Result<()> {
    let server = Arc::new(FpgaServer::new(audit(&[(BoardId::dac(1), 7)])?, server_config()));
    let add = |group: &'static str| {
        let server = server.clone();
        tokio::spawn(async move {
            server
                .add_board_group(BoardGroupConfig::new(group, PORT, [("DAC 1".to_owned(), 0)]))
                .await
        })
    };
    let (a, b) = (add("A"), add("B"));
    let results = [a.await?, b.await?];

    assert_eq!(1, results.iter().filter(|r| r.is_ok()).count());
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(FpgaError::BoardGroupExists(_)))));
    assert_eq!(1, server.list_board_groups().await.len());
    assert_eq!(1, server.list_devices().await.len());
    Ok(())
}
