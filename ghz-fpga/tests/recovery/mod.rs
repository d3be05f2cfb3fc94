use std::collections::BTreeSet;

use ghz_fpga::{
    link::{Audit, AuditEvent},
    prelude::*,
};

use super::{audit, memory_dac, name, server_config, GROUP, PORT};

const BOARDS: [(&str, u32); 3] = [("DAC 1", 7), ("DAC 2", 7), ("DAC 3", 7)];

async fn chain(retries: usize) -> anyhow::Result<(FpgaServer<Audit>, SequenceContext)> {
    let ids = [BoardId::dac(1), BoardId::dac(2), BoardId::dac(3)];
    let server = FpgaServer::new(
        audit(&ids.map(|id| (id, 7)))?,
        ServerConfig {
            retries,
            ..server_config()
        },
    );
    server
        .add_board_group(BoardGroupConfig::new(
            GROUP,
            PORT,
            BOARDS.iter().map(|&(n, _)| (n.to_owned(), 0)),
        ))
        .await?;
    let mut ctx = SequenceContext::new();
    for (board, _) in BOARDS {
        memory_dac(&server, &mut ctx, board).await?;
    }
    ctx.daisy_chain(BOARDS.iter().map(|&(n, _)| name(n)).collect());
    server
        .transport()
        .board(PORT, BoardId::dac(2), |b| b.break_down());
    Ok((server, ctx))
}

fn runs(audit: &Audit) -> usize {
    audit
        .events()
        .iter()
        .filter(|e| matches!(e, AuditEvent::Run { .. }))
        .count()
}

#[tokio::test(start_paused = true)]
async fn timeout_reports_failed_boards() -> anyhow::Result<()> {
    let (server, mut ctx) = chain(1).await?;
    let group = server.board_group(GROUP).await?;
    server.transport().clear_events();

    let Err(FpgaError::Timeout(report)) = server
        .run_sequence(&mut ctx, 30, false, vec![], BTreeSet::new())
        .await
    else {
        anyhow::bail!("a broken board times out");
    };
    assert_eq!(vec![name("DAC 2")], report.failed().collect::<Vec<_>>());
    assert_eq!(
        vec![Some(30), Some(0), Some(30)],
        report.0.iter().map(|b| b.actual).collect::<Vec<_>>()
    );
    assert!(report.0.iter().all(|b| b.expected == 30));

    // every board sends exactly one trigger so the next run waits for the right count
    let events = server.transport().events();
    let board_ctx = |id: BoardId| {
        events.iter().find_map(|e| match e {
            AuditEvent::Write { ctx, dst, .. } if *dst == id.mac() => Some(*ctx),
            _ => None,
        })
    };
    let sources = events
        .iter()
        .filter_map(|e| match e {
            AuditEvent::Trigger { from, to } if *to == group.ctx() => Some(Some(*from)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(3, sources.len());
    assert!(sources[..2].contains(&board_ctx(BoardId::dac(1))));
    assert!(sources[..2].contains(&board_ctx(BoardId::dac(3))));
    // the failed board triggers last, during recovery
    let failed = board_ctx(BoardId::dac(2));
    assert!(failed.is_some());
    assert_eq!(failed, sources[2]);
    assert!(events
        .iter()
        .any(|e| matches!(e, AuditEvent::Clear(ctx) if Some(*ctx) == failed)));

    server
        .transport()
        .board(PORT, BoardId::dac(2), |b| b.repair());
    assert_eq!(
        None,
        server
            .run_sequence(&mut ctx, 30, false, vec![], BTreeSet::new())
            .await?
    );
    assert_eq!(
        Some(30),
        server
            .transport()
            .board(PORT, BoardId::dac(2), |b| b.executions())
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retries_count_attempts() -> anyhow::Result<()> {
    let (server, mut ctx) = chain(3).await?;
    server.transport().clear_events();

    let result = server
        .run_sequence(&mut ctx, 30, false, vec![], BTreeSet::new())
        .await;
    assert!(matches!(result, Err(FpgaError::Timeout(_))));
    assert_eq!(3, runs(server.transport()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retry_succeeds_after_repair() -> anyhow::Result<()> {
    let (server, mut ctx) = chain(2).await?;
    server.transport().clear_events();

    let repair = async {
        // first attempt times out after one second plus the sequence time
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        server
            .transport()
            .board(PORT, BoardId::dac(2), |b| b.repair());
    };
    let (result, ()) = tokio::join!(
        server.run_sequence(&mut ctx, 30, false, vec![], BTreeSet::new()),
        repair
    );
    assert_eq!(None, result?);
    assert_eq!(2, runs(server.transport()));
    Ok(())
}
