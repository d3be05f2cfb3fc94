use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use ghz_fpga::{
    link::{Audit, AuditEvent},
    prelude::*,
};
use ghz_fpga_driver::firmware::{
    build::BuildParams,
    jump_table::{JumpEntry, JumpTable, Operation},
    register::{DacJumpTableRegisters, DaisyRole},
    sram::sram_write_packets,
};
use ghz_fpga_emulator::{BoardEmulator, StartRecord};
use ndarray::Array2;

use super::{memory_dac, name, open, server_config, PORT};

mod pipeline;

#[tokio::test]
async fn single_jump_table_dac() -> anyhow::Result<()> {
    let server = open(&[(BoardId::dac(1), 15)], &[("DAC 1", 0)], server_config()).await?;
    let board = server.device(&name("DAC 1")).await?;
    let mut ctx = SequenceContext::new();
    ctx.select_device(board.clone());
    ctx.sram(vec![0x0ABC; 64])?
        .jump_table_add_entry("END", &[256])?;
    server.transport().clear_events();

    assert_eq!(
        None,
        server
            .run_sequence(&mut ctx, 30, false, vec![], BTreeSet::new())
            .await?
    );

    let BuildParams::DacJumpTable(build) = *board.build().params() else {
        anyhow::bail!("build 15 is a jump table build");
    };
    let end = JumpEntry::new(256 / 4 - 3, 0, Operation::End)?;
    let writes = server
        .transport()
        .events()
        .into_iter()
        .filter_map(|e| match e {
            AuditEvent::Write { dst, data, .. } if dst == board.id().mac() => Some(data),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(3, writes.len());
    assert_eq!(JumpTable::new(&build, vec![end], &[], 0)?.to_bytes(&build)?, writes[0]);
    assert_eq!(
        sram_write_packets(build.sram_len, 0, &[0x0ABC; 64])?,
        writes[1..2].to_vec()
    );
    let run = DacJumpTableRegisters::decode(&writes[2])?;
    assert_eq!(DaisyRole::Master, run.role());
    assert_eq!(30, run.reps());

    server.transport().board(PORT, BoardId::dac(1), |b| {
        assert_eq!(30, b.executions());
        let BoardEmulator::Dac(dac) = b else {
            panic!("DAC 1 is a DAC");
        };
        assert_eq!(Some(&[end][..]), dac.jump_table().map(|t| t.entries()));
        assert!(dac.sram()[..64].iter().all(|&w| w == 0x0ABC));
    });

    // jump table entries survive the run
    assert_eq!(1, ctx.run_config().board(board.name()).jump_table.len());
    Ok(())
}

#[tokio::test]
async fn daisy_chain_delays() -> anyhow::Result<()> {
    let server = open(
        &[(BoardId::dac(1), 7), (BoardId::dac(2), 7), (BoardId::dac(3), 8)],
        &[("DAC 1", 0), ("DAC 2", 3), ("DAC 3", 6)],
        server_config(),
    )
    .await?;
    let mut ctx = SequenceContext::new();
    for board in ["DAC 1", "DAC 2", "DAC 3"] {
        memory_dac(&server, &mut ctx, board).await?;
    }
    ctx.start_delay(10)?;
    // the chain order comes from the board group, not from this list
    ctx.daisy_chain(vec![name("DAC 3"), name("DAC 2"), name("DAC 1")])
        .timing_order(vec![name("DAC 3"), name("DAC 1")]);

    let result = server
        .run_sequence(&mut ctx, 25, true, vec![], BTreeSet::new())
        .await?;
    let expected = Array2::from_shape_fn((2, 30), |(_, j)| j as u32);
    assert_eq!(Some(SequenceResult::Matrix(expected)), result);

    let start = |id| {
        server
            .transport()
            .board(PORT, id, |b: &mut BoardEmulator| b.last_start())
            .flatten()
    };
    assert_eq!(
        Some(StartRecord {
            role: DaisyRole::Master,
            reps: 30,
            delay: 0,
            page: 0
        }),
        start(BoardId::dac(1))
    );
    assert_eq!(
        Some(StartRecord {
            role: DaisyRole::Slave,
            reps: 30,
            delay: 3,
            page: 0
        }),
        start(BoardId::dac(2))
    );
    assert_eq!(
        Some(StartRecord {
            role: DaisyRole::Slave,
            reps: 30,
            delay: 16,
            page: 0
        }),
        start(BoardId::dac(3))
    );

    // only the master waits for the SRAM of the slaves
    let master_delays = |id| {
        server.transport().board(PORT, id, |b: &mut BoardEmulator| match b {
            BoardEmulator::Dac(dac) => dac.memory(0).iter().filter(|&&w| w == 0x30_0000 + 50).count(),
            BoardEmulator::Adc(_) => 0,
        })
    };
    assert_eq!(Some(1), master_delays(BoardId::dac(1)));
    assert_eq!(Some(0), master_delays(BoardId::dac(2)));

    // the next run uses the other page
    server
        .run_sequence(&mut ctx, 30, false, vec![], BTreeSet::new())
        .await?;
    assert_eq!(Some(1), start(BoardId::dac(2)).map(|s| s.page));
    Ok(())
}

#[tokio::test]
async fn boards_after_master_idle() -> anyhow::Result<()> {
    let server = open(
        &[(BoardId::dac(1), 7), (BoardId::dac(2), 7), (BoardId::dac(3), 7), (BoardId::adc(4), 7)],
        &[("DAC 1", 0), ("DAC 2", 3), ("ADC 4", 5), ("DAC 3", 6)],
        server_config(),
    )
    .await?;
    let mut ctx = SequenceContext::new();
    memory_dac(&server, &mut ctx, "DAC 2").await?;
    ctx.daisy_chain(vec![name("DAC 2")]);
    server
        .run_sequence(&mut ctx, 30, false, vec![], BTreeSet::new())
        .await?;

    let start = |id| {
        server
            .transport()
            .board(PORT, id, |b: &mut BoardEmulator| b.last_start())
            .flatten()
    };
    assert_eq!(None, start(BoardId::dac(1)));
    assert_eq!(Some(DaisyRole::Master), start(BoardId::dac(2)).map(|s| s.role));
    assert_eq!(
        Some(StartRecord {
            role: DaisyRole::Idle,
            reps: 0,
            delay: 6,
            page: 0
        }),
        start(BoardId::dac(3))
    );
    assert_eq!(None, start(BoardId::adc(4)));
    Ok(())
}

async fn demod_server() -> anyhow::Result<(FpgaServer<Audit>, SequenceContext)> {
    let server = open(
        &[(BoardId::dac(1), 7), (BoardId::adc(2), 7)],
        &[("DAC 1", 0), ("ADC 2", 4)],
        server_config(),
    )
    .await?;
    let mut ctx = SequenceContext::new();
    memory_dac(&server, &mut ctx, "DAC 1").await?;
    ctx.select_device(server.device(&name("ADC 2")).await?);
    ctx.adc_trigger_table(vec![TriggerRow::new(1, 100, 10, 4); 3])?
        .adc_mixer_table(0, vec![(1, 0), (0, 1)])?;
    ctx.daisy_chain(vec![name("DAC 1"), name("ADC 2")])
        .timing_order(vec![name("ADC 2::0"), name("ADC 2::3")]);
    Ok((server, ctx))
}

#[tokio::test]
async fn adc_demodulation() -> anyhow::Result<()> {
    let (server, mut ctx) = demod_server().await?;
    assert_eq!(
        Err(FpgaError::NoDemodRange(name("ADC 2"))),
        ctx.adc_demod_range()
    );

    let Some(SequenceResult::Tuple(channels)) = server
        .run_sequence(&mut ctx, 30, true, vec![], BTreeSet::new())
        .await?
    else {
        anyhow::bail!("demodulated data is returned as a tuple");
    };
    assert_eq!(2, channels.len());
    for (data, channel) in channels.iter().zip([0, 3]) {
        let ChannelData::Demod(iq) = data else {
            anyhow::bail!("channel {} is not demodulated", channel);
        };
        assert_eq!(&[30, 3, 2], iq.shape());
        for row in 0..3 {
            let i = 100 * (channel + 1) + row as i32;
            assert_eq!(i, iq[[0, row, 0]]);
            assert_eq!(-i, iq[[29, row, 1]]);
        }
    }

    assert_eq!(
        Ok(DemodRange {
            i: (100, 402),
            q: (-402, -100)
        }),
        ctx.adc_demod_range()
    );
    assert_eq!(
        Some(StartRecord {
            role: DaisyRole::Slave,
            reps: 30,
            delay: 4,
            page: 0
        }),
        server
            .transport()
            .board(PORT, BoardId::adc(2), |b| b.last_start())
            .flatten()
    );
    Ok(())
}

#[derive(Debug, Default)]
struct CountingSetup(AtomicUsize);

#[async_trait::async_trait]
impl SetupAction for CountingSetup {
    async fn apply(&self) -> Result<(), FpgaError> {
        self.0.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

async fn run_with_setup(
    server: &FpgaServer<Audit>,
    ctx: &mut SequenceContext,
    action: &Arc<CountingSetup>,
    setup_state: BTreeSet<String>,
) -> Result<Option<SequenceResult>, FpgaError> {
    let setup: Vec<Arc<dyn SetupAction>> = vec![action.clone()];
    server.run_sequence(ctx, 30, false, setup, setup_state).await
}

/// Setup writes to ADC 2 since the last call.
fn adc_setup_writes(audit: &Audit) -> usize {
    let adc = BoardId::adc(2).mac();
    let n = audit
        .events()
        .iter()
        .filter(|e| matches!(e, AuditEvent::Write { dst, data, .. } if *dst == adc && data.len() == 1026))
        .count();
    audit.clear_events();
    n
}

#[tokio::test]
async fn setup_only_when_changed() -> anyhow::Result<()> {
    let (server, mut ctx) = demod_server().await?;
    let setup_writes = || adc_setup_writes(server.transport());
    let action = Arc::new(CountingSetup::default());
    let state = |s: &str| BTreeSet::from([s.to_owned()]);

    server.transport().clear_events();
    run_with_setup(&server, &mut ctx, &action, state("6 GHz")).await?;
    // trigger table and one mixer table
    assert_eq!(2, setup_writes());
    assert_eq!(1, action.0.load(Ordering::Relaxed));

    run_with_setup(&server, &mut ctx, &action, state("6 GHz")).await?;
    assert_eq!(0, setup_writes());
    assert_eq!(1, action.0.load(Ordering::Relaxed));

    run_with_setup(&server, &mut ctx, &action, state("7 GHz")).await?;
    assert_eq!(2, setup_writes());
    assert_eq!(2, action.0.load(Ordering::Relaxed));

    ctx.adc_trigger_table(vec![TriggerRow::new(2, 100, 10, 4)])?;
    run_with_setup(&server, &mut ctx, &action, state("7 GHz")).await?;
    assert_eq!(2, setup_writes());
    assert_eq!(3, action.0.load(Ordering::Relaxed));

    // a subset of the previous setup needs no setup
    run_with_setup(&server, &mut ctx, &action, BTreeSet::new()).await?;
    assert_eq!(0, setup_writes());
    assert_eq!(3, action.0.load(Ordering::Relaxed));
    Ok(())
}

/// Fails the first time it is applied.
#[derive(Debug, Default)]
struct UnlockedSource(AtomicUsize);

#[async_trait::async_trait]
impl SetupAction for UnlockedSource {
    async fn apply(&self) -> Result<(), FpgaError> {
        if self.0.fetch_add(1, Ordering::Relaxed) == 0 {
            return Err(FpgaError::SetupFailed("source not locked".to_owned()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn failed_setup_is_applied_again() -> anyhow::Result<()> {
    let (server, mut ctx) = demod_server().await?;
    let action = Arc::new(UnlockedSource::default());
    let setup = || -> Vec<Arc<dyn SetupAction>> { vec![action.clone()] };
    let state = BTreeSet::from(["6 GHz".to_owned()]);
    let runs = || {
        server
            .transport()
            .events()
            .iter()
            .filter(|e| matches!(e, AuditEvent::Run { .. }))
            .count()
    };
    server.transport().clear_events();

    assert_eq!(
        Err(FpgaError::SetupFailed("source not locked".to_owned())),
        server
            .run_sequence(&mut ctx, 30, false, setup(), state.clone())
            .await
    );
    assert_eq!(0, runs());
    assert_eq!(2, adc_setup_writes(server.transport()));

    // same setup state, but nothing was applied
    server
        .run_sequence(&mut ctx, 30, false, setup(), state.clone())
        .await?;
    assert_eq!(1, runs());
    assert_eq!(2, adc_setup_writes(server.transport()));
    assert_eq!(2, action.0.load(Ordering::Relaxed));

    server
        .run_sequence(&mut ctx, 30, false, setup(), state)
        .await?;
    assert_eq!(0, adc_setup_writes(server.transport()));
    assert_eq!(2, action.0.load(Ordering::Relaxed));
    Ok(())
}

async fn run(
    server: &FpgaServer<Audit>,
    ctx: &mut SequenceContext,
    get_timing_data: bool,
) -> Result<Option<SequenceResult>, FpgaError> {
    server
        .run_sequence(ctx, 30, get_timing_data, vec![], BTreeSet::new())
        .await
}

#[tokio::test]
async fn configuration_errors() -> anyhow::Result<()> {
    let server = open(
        &[(BoardId::dac(1), 7), (BoardId::dac(2), 15), (BoardId::adc(3), 7)],
        &[("DAC 1", 0), ("DAC 2", 0), ("ADC 3", 0)],
        server_config(),
    )
    .await?;
    let mut ctx = SequenceContext::new();
    assert_eq!(Err(FpgaError::NoDeviceSelected), run(&server, &mut ctx, false).await);

    ctx.select_device(server.device(&name("ADC 3")).await?);
    assert_eq!(
        Err(FpgaError::WrongDeviceType(name("ADC 3"), "DAC")),
        run(&server, &mut ctx, false).await
    );

    ctx.select_device(server.device(&name("DAC 2")).await?);
    ctx.sram(vec![0; 64])?;
    assert_eq!(
        Err(FpgaError::Driver(ghz_fpga_driver::error::FpgaDriverError::MissingSequenceData {
            board: name("DAC 2"),
            what: "jump table"
        })),
        run(&server, &mut ctx, false).await
    );
    ctx.jump_table_add_entry("END", &[256])?;
    assert_eq!(Err(FpgaError::NoTimingData(name("DAC 2"))), run(&server, &mut ctx, true).await);

    ctx.daisy_chain(vec![name("DAC 2"), name("DAC 1")]);
    assert_eq!(Err(FpgaError::TimingOrderRequired), run(&server, &mut ctx, true).await);

    ctx.timing_order(vec![name("DAC 4")]);
    assert_eq!(
        Err(FpgaError::NotInDaisyChain(name("DAC 4"))),
        run(&server, &mut ctx, true).await
    );

    ctx.daisy_chain(vec![name("DAC 5")]);
    assert_eq!(
        Err(FpgaError::BoardNotFound(name("DAC 5"))),
        run(&server, &mut ctx, false).await
    );

    // an ADC cannot start the chain
    ctx.select_device(server.device(&name("ADC 3")).await?);
    ctx.adc_trigger_table(vec![TriggerRow::new(1, 100, 10, 1)])?;
    ctx.daisy_chain(vec![name("ADC 3")]);
    assert_eq!(
        Err(FpgaError::Driver(ghz_fpga_driver::error::FpgaDriverError::AdcAsMaster(name(
            "ADC 3"
        )))),
        run(&server, &mut ctx, false).await
    );
    Ok(())
}

#[tokio::test]
async fn boards_from_different_groups() -> anyhow::Result<()> {
    let server = FpgaServer::new(
        Audit::new(
            Default::default(),
            [
                (1, BoardEmulator::new(BoardId::dac(1), 7)?),
                (2, BoardEmulator::new(BoardId::dac(1), 7)?),
            ],
        ),
        server_config(),
    );
    server
        .add_board_group(BoardGroupConfig::new("A", 1, [("DAC 1".to_owned(), 0)]))
        .await?;
    server
        .add_board_group(BoardGroupConfig::new("B", 2, [("DAC 1".to_owned(), 0)]))
        .await?;

    let mut ctx = SequenceContext::new();
    for board in ["A DAC 1", "B DAC 1"] {
        ctx.select_device(server.device(board).await?);
        ctx.memory(super::timing_memory())?.sram(vec![0; 64])?;
    }
    ctx.daisy_chain(vec!["A DAC 1".to_owned(), "B DAC 1".to_owned()]);
    assert_eq!(
        Err(FpgaError::BoardGroupMismatch),
        server
            .run_sequence(&mut ctx, 30, false, vec![], BTreeSet::new())
            .await
    );

    ctx.daisy_chain(vec!["B DAC 1".to_owned()]);
    assert_eq!(
        Ok(None),
        server
            .run_sequence(&mut ctx, 30, false, vec![], BTreeSet::new())
            .await
    );
    assert_eq!(
        Some(30),
        server
            .transport()
            .boards(2, |boards| boards.first().map(BoardEmulator::executions))
    );
    Ok(())
}
