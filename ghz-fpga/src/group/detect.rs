use std::time::Instant;

use ghz_fpga_core::{
    board::{BoardId, BoardType},
    link::{ContextId, Request, Transport},
};
use ghz_fpga_driver::firmware::register::{detect_ping, detect_readback_len, readback_build};

use super::BoardGroup;
use crate::error::FpgaError;

impl<T: Transport + 'static> BoardGroup<T> {
    /// Pings every possible board address on the adapter of the group.
    ///
    /// Returns the device name, identity and build number of every board that answered.
    /// Detection runs in test mode so it never interferes with running sequences.
    #[tracing::instrument(level = "debug", skip(self), fields(group = %self.name))]
    pub async fn detect_boards(&self) -> Result<Vec<(String, BoardId, u32)>, FpgaError> {
        let _exclusive = self.test_mode().await?;

        let (dacs, adcs) = tokio::join!(
            self.detect_type(BoardType::Dac),
            self.detect_type(BoardType::Adc)
        );
        let mut found = Vec::new();
        for result in [dacs, adcs] {
            match result {
                Ok(boards) => found.extend(boards),
                Err(e) => tracing::error!("autodetect error: {}", e),
            }
        }

        // detection replies may have been buffered in the device contexts
        for dev in self.devices.read().await.values() {
            if let Err(e) = self.transport.send(dev.ctx, dev.board.clear(None)).await {
                tracing::warn!("{}: clear failed: {}", dev.board.name(), e);
            }
        }

        tracing::info!("{} boards found in {}", found.len(), self.name);
        Ok(found)
    }

    async fn detect_type(
        &self,
        board_type: BoardType,
    ) -> Result<Vec<(String, BoardId, u32)>, FpgaError> {
        let ctx = self.transport.new_context().await?;
        let found = self.detect_in(ctx, board_type).await;
        self.transport.expire_context(ctx).await?;
        found
    }

    async fn detect_in(
        &self,
        ctx: ContextId,
        board_type: BoardType,
    ) -> Result<Vec<(String, BoardId, u32)>, FpgaError> {
        let timeout = self.config.detect_timeout;
        let ids = (0..=u8::MAX)
            .map(|n| BoardId::new(board_type, n))
            .collect::<Vec<_>>();
        let ping = detect_ping(board_type);
        let request = ids.iter().fold(
            Request::new()
                .connect(self.port)
                .require_length(detect_readback_len(board_type))
                .timeout(timeout)
                .listen(),
            |req, id| req.destination_mac(id.mac()).write(ping.clone()),
        );
        self.transport.send(ctx, request).await?;

        let start = Instant::now();
        let mut found: Vec<(String, BoardId, u32)> = Vec::new();
        while found.len() < ids.len() && start.elapsed() < timeout {
            let response = match self.transport.send(ctx, Request::new().read(1)).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!("{} detection finished: {}", board_type, e);
                    break;
                }
            };
            for packet in response.into_read() {
                let Some(id) =
                    BoardId::from_mac(packet.src()).filter(|id| id.board_type() == board_type)
                else {
                    continue;
                };
                if found.iter().any(|(_, known, _)| *known == id) {
                    continue;
                }
                match readback_build(board_type, packet.data()) {
                    Ok(build) => {
                        tracing::debug!("found {} (build {})", id, build);
                        found.push((id.device_name(&self.name), id, build));
                    }
                    Err(e) => tracing::warn!("{}: bad readback: {}", id, e),
                }
            }
        }
        Ok(found)
    }
}
