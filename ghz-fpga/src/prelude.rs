pub use crate::{
    config::{BoardGroupConfig, ServerConfig},
    context::{BoardConfig, RunConfig, SequenceContext},
    error::{BoardOutcome, FpgaError, TimeoutReport},
    group::{BoardGroup, PerformanceData, RunOptions, TestMode},
    server::{ChannelData, FpgaServer, SequenceResult},
    setup::SetupAction,
};

pub use ghz_fpga_driver::{
    board::FpgaBoard,
    core::{
        board::{BoardId, BoardType},
        link::{ContextId, Request, Response, Transport, TransportError},
    },
    firmware::{
        adc::TriggerRow,
        memory::MemorySequence,
        sram::SramData,
    },
    runner::{AdcRunMode, AverageData, BoardData, DemodRange},
};
