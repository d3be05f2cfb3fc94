use ghz_fpga_core::link::{ContextId, Transport};
use ghz_fpga_driver::runner::BoardRunner;

use super::BoardGroup;
use crate::error::{BoardOutcome, TimeoutReport};

impl<T: Transport + 'static> BoardGroup<T> {
    /// Brings the boards of a failed run back into a known state.
    ///
    /// Every board is cleared and pinged for its execution counter. Boards that did not
    /// finish collecting have not sent their trigger yet, so the trigger is sent here to
    /// keep the trigger count of the next run intact.
    pub(crate) async fn recover(
        &self,
        runners: &[Box<dyn BoardRunner>],
        contexts: &[ContextId],
        ok: &[bool],
    ) -> TimeoutReport {
        let mut executions = Vec::with_capacity(runners.len());
        for (runner, &ctx) in runners.iter().zip(contexts) {
            let board = runner.board();
            let request = board
                .clear(None)
                .chain(board.ping(self.config.readback_timeout));
            let count = match self.transport.send(ctx, request).await {
                Ok(response) => match response.read().first() {
                    Some(packet) => match board.process_readback(packet.data()) {
                        Ok(readback) => Some(readback.executions),
                        Err(e) => {
                            tracing::error!("{}: {}", board.name(), e);
                            None
                        }
                    },
                    None => None,
                },
                Err(e) => {
                    tracing::error!("{}: readback failed: {}", board.name(), e);
                    None
                }
            };
            executions.push(count);
        }

        for ((runner, &ctx), &ok) in runners.iter().zip(contexts).zip(ok) {
            let board = runner.board();
            let trigger = (!ok).then_some(self.ctx);
            if let Err(e) = self.transport.send(ctx, board.clear(trigger)).await {
                tracing::error!("{}: clear failed: {}", board.name(), e);
            }
        }

        TimeoutReport(
            runners
                .iter()
                .zip(ok)
                .zip(executions)
                .map(|((runner, &ok), actual)| BoardOutcome {
                    name: runner.board().name().to_owned(),
                    ok,
                    expected: runner.reps(),
                    actual,
                })
                .collect(),
        )
    }
}
