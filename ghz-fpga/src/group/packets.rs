use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use ghz_fpga_core::{
    board::BoardType,
    link::{ContextId, MacAddress, Request},
};
use ghz_fpga_driver::{
    firmware::register::DaisyRole,
    runner::{idle_packet, BoardRunner},
};

use super::GroupDevice;
use crate::error::FpgaError;

const COLLECT_MARGIN: Duration = Duration::from_secs(1);

/// A request addressed to the context of one board.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Packet {
    pub board: String,
    pub ctx: ContextId,
    pub request: Request,
}

/// Requests of every stage of one run, prepared before entering the pipeline.
#[derive(Debug)]
pub(crate) struct RunPackets {
    pub load: Vec<Packet>,
    pub setup: Vec<Packet>,
    pub setup_state: BTreeSet<String>,
    /// Start packets for the run context, slaves first and the master last.
    pub run: Request,
    pub collect: Vec<Packet>,
    pub read: Vec<Packet>,
}

/// The daisy chain of a group at the time a run is prepared.
pub(crate) struct Chain<'a> {
    pub order: &'a [(String, u32)],
    pub devices: &'a BTreeMap<String, GroupDevice>,
    pub run_ctx: ContextId,
}

impl Chain<'_> {
    fn ctx(&self, name: &str) -> Result<ContextId, FpgaError> {
        self.devices
            .get(name)
            .map(|d| d.ctx)
            .ok_or_else(|| FpgaError::BoardNotFound(name.to_owned()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|(n, _)| n == name)
    }

    pub fn packets(
        &self,
        runners: &mut [Box<dyn BoardRunner>],
        page: usize,
        sync: u8,
        timeout_factor: u32,
        timing_order: &[String],
    ) -> Result<RunPackets, FpgaError> {
        let contexts = runners
            .iter()
            .map(|r| {
                let name = r.board().name();
                self.position(name)
                    .ok_or_else(|| FpgaError::NotInBoardOrder(name.to_owned()))?;
                self.ctx(name)
            })
            .collect::<Result<Vec<_>, _>>()?;

        // runner indices in daisy chain order
        let chained = {
            let mut idx = (0..runners.len()).collect::<Vec<_>>();
            idx.sort_by_key(|&i| self.position(runners[i].board().name()));
            idx
        };

        let mut load = Vec::new();
        for (n, &i) in chained.iter().enumerate() {
            if let Some(request) = runners[i].load(page, n == 0)? {
                load.push(Packet {
                    board: runners[i].board().name().to_owned(),
                    ctx: contexts[i],
                    request,
                });
            }
        }

        let mut setup = Vec::new();
        let mut setup_state = BTreeSet::new();
        for &i in &chained {
            if let Some((request, state)) = runners[i].setup()? {
                setup.push(Packet {
                    board: runners[i].board().name().to_owned(),
                    ctx: contexts[i],
                    request,
                });
                setup_state.insert(state);
            }
        }

        let run = self.run_request(runners, page, sync)?;

        let timeout = runners
            .iter()
            .map(|r| r.sequence_time())
            .max()
            .unwrap_or_default()
            * timeout_factor
            + COLLECT_MARGIN;
        let (collect, read) = runners
            .iter()
            .zip(&contexts)
            .map(|(r, &ctx)| {
                let board = r.board().name().to_owned();
                (
                    Packet {
                        board: board.clone(),
                        ctx,
                        request: r.collect(timeout, self.run_ctx),
                    },
                    Packet {
                        board,
                        ctx,
                        request: r.read(timing_order),
                    },
                )
            })
            .unzip();

        Ok(RunPackets {
            load,
            setup,
            setup_state,
            run,
            collect,
            read,
        })
    }

    fn run_request(
        &self,
        runners: &[Box<dyn BoardRunner>],
        page: usize,
        sync: u8,
    ) -> Result<Request, FpgaError> {
        let mut starts: Vec<(MacAddress, Vec<u8>)> = Vec::new();
        for (name, delay) in self.order {
            match runners.iter().find(|r| r.board().name() == name) {
                Some(runner) => {
                    let role = if starts.is_empty() {
                        DaisyRole::Master
                    } else {
                        DaisyRole::Slave
                    };
                    starts.push((
                        runner.board().id().mac(),
                        runner.run_packet(page, role, *delay, sync)?,
                    ));
                }
                None if starts.is_empty() => {}
                None => match self.devices.get(name) {
                    Some(dev) if dev.board.board_type() == BoardType::Dac => {
                        starts.push((dev.board.id().mac(), idle_packet(&dev.board, *delay)?));
                    }
                    // ADCs always pass the chain pulse through
                    Some(_) => {}
                    None => tracing::warn!("{} is not detected and cannot be set to idle", name),
                },
            }
        }
        starts.rotate_left(1);
        Ok(starts
            .into_iter()
            .fold(Request::new(), |req, (mac, regs)| {
                req.destination_mac(mac).write(regs)
            }))
    }
}
