use std::collections::BTreeSet;

use ghz_fpga::{link::Audit, prelude::*};
use ghz_fpga_driver::firmware::{build::BuildParams, jump_table::JumpTable, register::DaisyRole};
use ghz_fpga_emulator::BoardEmulator;

use super::{memory_dac, name, open, server_config, GROUP, PORT};

async fn server() -> anyhow::Result<FpgaServer<Audit>> {
    open(
        &[(BoardId::dac(1), 7), (BoardId::dac(2), 15), (BoardId::adc(1), 7)],
        &[("DAC 1", 0), ("DAC 2", 0), ("ADC 1", 0)],
        server_config(),
    )
    .await
}

#[tokio::test]
async fn readback() -> anyhow::Result<()> {
    let server = server().await?;
    let mut ctx = SequenceContext::new();
    memory_dac(&server, &mut ctx, "DAC 1").await?;
    server
        .run_sequence(&mut ctx, 60, false, vec![], BTreeSet::new())
        .await?;

    let group = server.board_group(GROUP).await?;
    let test = group.test_mode().await?;
    assert_eq!(7, test.build_number(&name("DAC 1")).await?);
    assert_eq!(15, test.build_number(&name("DAC 2")).await?);
    assert_eq!(7, test.build_number(&name("ADC 1")).await?);
    assert_eq!(60, test.execution_count(&name("DAC 1")).await?);
    assert!(!test.pll_query(&name("DAC 1")).await?);
    assert_eq!(
        Err(FpgaError::BoardNotFound(name("DAC 3"))),
        test.build_number(&name("DAC 3")).await
    );
    Ok(())
}

#[tokio::test]
async fn pll() -> anyhow::Result<()> {
    let server = server().await?;
    server.transport().board(PORT, BoardId::dac(1), |b| {
        if let BoardEmulator::Dac(dac) = b {
            dac.unlock_pll();
        }
    });

    let group = server.board_group(GROUP).await?;
    let test = group.test_mode().await?;
    assert!(test.pll_query(&name("DAC 1")).await?);
    test.pll_reset(&name("DAC 1")).await?;
    assert!(!test.pll_query(&name("DAC 1")).await?);

    test.adc_recalibrate(&name("ADC 1")).await?;
    assert_eq!(
        Some(1),
        server.transport().board(PORT, BoardId::adc(1), |b| match b {
            BoardEmulator::Adc(adc) => adc.recalibrations(),
            BoardEmulator::Dac(_) => 0,
        })
    );
    Ok(())
}

#[tokio::test]
async fn adc_register_readback() -> anyhow::Result<()> {
    let server = server().await?;
    let group = server.board_group(GROUP).await?;
    let test = group.test_mode().await?;

    let rb = test.adc_register_readback(&name("ADC 1")).await?;
    assert_eq!(7, rb.build());
    assert_eq!(0, rb.executions());
    assert_eq!(
        Err(FpgaError::WrongDeviceType(name("DAC 1"), "ADC")),
        test.adc_register_readback(&name("DAC 1")).await.map(|_| ())
    );
    Ok(())
}

#[tokio::test]
async fn dac_run_sram() -> anyhow::Result<()> {
    let server = server().await?;
    let group = server.board_group(GROUP).await?;
    let data = (0..100).collect::<Vec<u32>>();
    {
        let test = group.test_mode().await?;
        assert_eq!(
            Err(FpgaError::SramTooShort(10, 20)),
            test.dac_run_sram(&name("DAC 1"), &data[..10], false, 0).await
        );
        assert_eq!(
            Err(FpgaError::WrongDeviceType(name("ADC 1"), "DAC")),
            test.dac_run_sram(&name("ADC 1"), &data, false, 0).await
        );
        test.dac_run_sram(&name("DAC 1"), &data, true, 0).await?;
        test.dac_run_sram(&name("DAC 2"), &data, false, 0).await?;
    }

    server.transport().board(PORT, BoardId::dac(1), |b| {
        let BoardEmulator::Dac(dac) = b else {
            panic!("DAC 1 is a DAC");
        };
        assert_eq!(&data[..], &dac.sram()[..100]);
    });

    let board = server.device(&name("DAC 2")).await?;
    let BuildParams::DacJumpTable(build) = *board.build().params() else {
        anyhow::bail!("build 15 is a jump table build");
    };
    let expected = JumpTable::run_sram(&build, 0, 100, false)?;
    server.transport().board(PORT, BoardId::dac(2), |b| {
        let BoardEmulator::Dac(dac) = b else {
            panic!("DAC 2 is a DAC");
        };
        assert_eq!(&data[..], &dac.sram()[..100]);
        assert_eq!(
            Some(expected.entries()),
            dac.jump_table().map(|t| t.entries())
        );
        let start = dac.last_start().expect("started");
        assert_eq!(DaisyRole::Master, start.role);
        assert_eq!(1, start.reps);
    });
    Ok(())
}
