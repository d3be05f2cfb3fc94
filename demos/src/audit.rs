mod tests;

use anyhow::Result;

use ghz_fpga::{link::Audit, prelude::*};
use ghz_fpga_emulator::BoardEmulator;

const PORT: u32 = 1;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let boards = [(BoardId::dac(1), 7), (BoardId::dac(2), 15), (BoardId::adc(1), 7)]
        .into_iter()
        .map(|(id, build)| Ok((PORT, BoardEmulator::new(id, build)?)))
        .collect::<Result<Vec<_>>>()?;
    let server = FpgaServer::new(Audit::new(Default::default(), boards), ServerConfig::default());
    server
        .add_board_group(BoardGroupConfig::new(
            "Demo",
            PORT,
            [("DAC 1", 0), ("DAC 2", 0), ("ADC 1", 4)].map(|(n, d)| (n.to_owned(), d)),
        ))
        .await?;

    tests::run(server).await
}
