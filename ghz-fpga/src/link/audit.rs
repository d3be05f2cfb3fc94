use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use ghz_fpga_core::{
    board::BoardId,
    defined::READBACK_TIMEOUT,
    link::{ContextId, MacAddress, RawPacket, Record, Request, Response, Transport, TransportError},
};
use ghz_fpga_driver::firmware::register::DaisyRole;
use ghz_fpga_emulator::BoardEmulator;
use tokio::{sync::Notify, time::Instant};

/// Address of the host adapter.
pub const HOST_MAC: MacAddress = MacAddress::new([0x00, 0x01, 0xCA, 0xAA, 0x00, 0x00]);

#[derive(Default, Clone, Copy)]
#[doc(hidden)]
pub struct AuditOption {
    pub broken: bool,
}

/// Something that happened on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
#[doc(hidden)]
pub enum AuditEvent {
    Write {
        ctx: ContextId,
        port: u32,
        dst: MacAddress,
        data: Vec<u8>,
    },
    Run {
        port: u32,
        boards: Vec<BoardId>,
    },
    Trigger {
        from: ContextId,
        to: ContextId,
    },
    Clear(ContextId),
}

#[derive(Debug, Default)]
struct Context {
    port: Option<u32>,
    dst: Option<MacAddress>,
    src: Option<MacAddress>,
    len: Option<usize>,
    timeout: Option<Duration>,
    listening: bool,
    buffer: VecDeque<RawPacket>,
    triggers: u32,
}

impl Context {
    fn accepts(&self, port: u32, packet: &RawPacket) -> bool {
        self.listening
            && self.port == Some(port)
            && self.src.is_none_or(|src| src == *packet.src())
            && self.len.is_none_or(|len| len == packet.data().len())
    }
}

#[derive(Default)]
struct State {
    next_ctx: u64,
    contexts: BTreeMap<ContextId, Context>,
    boards: BTreeMap<u32, Vec<BoardEmulator>>,
    events: Vec<AuditEvent>,
    broken: bool,
}

impl State {
    fn context(&mut self, ctx: ContextId) -> Result<&mut Context, TransportError> {
        self.contexts
            .get_mut(&ctx)
            .ok_or_else(|| TransportError::new(format!("{} is not open", ctx)))
    }

    fn deliver(&mut self, port: u32, packet: RawPacket) {
        self.contexts
            .values_mut()
            .filter(|c| c.accepts(port, &packet))
            .for_each(|c| c.buffer.push_back(packet.clone()));
    }

    fn write(&mut self, ctx: ContextId, data: Vec<u8>) -> Result<(), TransportError> {
        let (port, dst) = {
            let c = self.context(ctx)?;
            match (c.port, c.dst) {
                (Some(port), Some(dst)) => (port, dst),
                _ => {
                    return Err(TransportError::new(format!(
                        "{} has no port or destination",
                        ctx
                    )))
                }
            }
        };
        self.events.push(AuditEvent::Write {
            ctx,
            port,
            dst,
            data: data.clone(),
        });

        let Some(board) = self
            .boards
            .get_mut(&port)
            .and_then(|boards| boards.iter_mut().find(|b| b.mac() == dst))
        else {
            return Ok(());
        };
        let reply = board
            .receive(&data)
            .map_err(|e| TransportError::new(e.to_string()))?;
        let master = board.armed() == Some(DaisyRole::Master);
        if let Some(reply) = reply {
            self.deliver(port, RawPacket::new(dst, HOST_MAC, reply));
        }
        if master {
            self.fire(port);
        }
        Ok(())
    }

    fn fire(&mut self, port: u32) {
        let Some(boards) = self.boards.get_mut(&port) else {
            return;
        };
        let mut fired = Vec::new();
        let mut packets = Vec::new();
        for board in boards.iter_mut().filter(|b| b.armed().is_some()) {
            fired.push(board.id());
            let mac = board.mac();
            packets.extend(
                board
                    .fire()
                    .into_iter()
                    .map(|data| RawPacket::new(mac, HOST_MAC, data)),
            );
        }
        self.events.push(AuditEvent::Run {
            port,
            boards: fired,
        });
        packets
            .into_iter()
            .for_each(|packet| self.deliver(port, packet));
    }
}

/// An in-memory transport connecting board groups to emulated boards.
#[doc(hidden)]
pub struct Audit {
    state: Mutex<State>,
    notify: Notify,
}

impl Audit {
    /// Creates a transport with `boards` attached to their ports.
    pub fn new(option: AuditOption, boards: impl IntoIterator<Item = (u32, BoardEmulator)>) -> Self {
        let mut state = State {
            broken: option.broken,
            ..Default::default()
        };
        boards
            .into_iter()
            .for_each(|(port, board)| state.boards.entry(port).or_default().push(board));
        Self {
            state: Mutex::new(state),
            notify: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn break_down(&self) {
        self.state().broken = true;
    }

    pub fn repair(&self) {
        self.state().broken = false;
    }

    /// Accesses the boards attached to `port`.
    pub fn boards<R>(&self, port: u32, f: impl FnOnce(&mut Vec<BoardEmulator>) -> R) -> R {
        f(self.state().boards.entry(port).or_default())
    }

    /// Accesses one board.
    pub fn board<R>(&self, port: u32, id: BoardId, f: impl FnOnce(&mut BoardEmulator) -> R) -> Option<R> {
        self.boards(port, |boards| boards.iter_mut().find(|b| b.id() == id).map(f))
    }

    /// Everything that happened so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.state().events.clone()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    /// Number of open contexts.
    pub fn open_contexts(&self) -> usize {
        self.state().contexts.len()
    }

    fn with_context<R>(
        &self,
        ctx: ContextId,
        f: impl FnOnce(&mut Context) -> R,
    ) -> Result<R, TransportError> {
        let mut state = self.state();
        Ok(f(state.context(ctx)?))
    }

    async fn wait_for<R>(
        &self,
        ctx: ContextId,
        timeout: Option<Duration>,
        mut ready: impl FnMut(&mut Context) -> Option<R>,
    ) -> Result<R, TransportError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(r) = self.with_context(ctx, &mut ready)? {
                return Ok(r);
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(TransportError::new(format!("{}: timeout", ctx)));
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn take(&self, ctx: ContextId, n: usize) -> Result<Vec<RawPacket>, TransportError> {
        let timeout = self.with_context(ctx, |c| c.timeout.unwrap_or(READBACK_TIMEOUT))?;
        self.wait_for(ctx, Some(timeout), |c| {
            (c.buffer.len() >= n).then(|| c.buffer.drain(..n).collect())
        })
        .await
    }
}

#[async_trait::async_trait]
impl Transport for Audit {
    async fn new_context(&self) -> Result<ContextId, TransportError> {
        let mut state = self.state();
        state.next_ctx += 1;
        let ctx = ContextId::new(state.next_ctx);
        state.contexts.insert(ctx, Context::default());
        Ok(ctx)
    }

    async fn send(&self, ctx: ContextId, request: Request) -> Result<Response, TransportError> {
        if self.state().broken {
            return Err(TransportError::new("broken".to_owned()));
        }
        let mut read = Vec::new();
        let mut trigger_wait = None;
        for record in request {
            match record {
                Record::Connect(port) => self.with_context(ctx, |c| c.port = Some(port))?,
                Record::DestinationMac(mac) => self.with_context(ctx, |c| c.dst = Some(mac))?,
                Record::RequireSourceMac(mac) => self.with_context(ctx, |c| c.src = Some(mac))?,
                Record::RequireLength(len) => self.with_context(ctx, |c| c.len = Some(len))?,
                Record::Timeout(timeout) => {
                    self.with_context(ctx, |c| c.timeout = Some(timeout))?
                }
                Record::Listen => self.with_context(ctx, |c| c.listening = true)?,
                Record::Write(data) => {
                    self.state().write(ctx, data)?;
                    self.notify.notify_waiters();
                }
                Record::Collect(n) => {
                    let timeout =
                        self.with_context(ctx, |c| c.timeout.unwrap_or(READBACK_TIMEOUT))?;
                    self.wait_for(ctx, Some(timeout), |c| (c.buffer.len() >= n).then_some(()))
                        .await?;
                }
                Record::Read(n) => read.extend(self.take(ctx, n).await?),
                Record::Discard(n) => {
                    self.take(ctx, n).await?;
                }
                Record::SendTrigger(to) => {
                    {
                        let mut state = self.state();
                        state.context(to)?.triggers += 1;
                        state.events.push(AuditEvent::Trigger { from: ctx, to });
                    }
                    self.notify.notify_waiters();
                }
                Record::WaitForTrigger(n) => {
                    let start = Instant::now();
                    let timeout = self.with_context(ctx, |c| c.timeout)?;
                    self.wait_for(ctx, timeout, |c| {
                        (c.triggers >= n).then(|| c.triggers -= n)
                    })
                    .await?;
                    trigger_wait = Some(start.elapsed());
                }
                Record::Clear => {
                    let mut state = self.state();
                    state.context(ctx)?.buffer.clear();
                    state.events.push(AuditEvent::Clear(ctx));
                }
            }
        }
        Ok(Response::new(read, trigger_wait))
    }

    async fn expire_context(&self, ctx: ContextId) -> Result<(), TransportError> {
        self.state().contexts.remove(&ctx);
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ghz_fpga_driver::firmware::register::{DacMemoryRegisters, DacReadback};
    use zerocopy::IntoBytes;

    use super::*;

    fn audit() -> Audit {
        Audit::new(
            AuditOption::default(),
            [(1, BoardEmulator::new(BoardId::dac(1), 7).unwrap())],
        )
    }

    #[tokio::test]
    async fn ping_is_read_back() -> anyhow::Result<()> {
        let audit = audit();
        let ctx = audit.new_context().await?;
        let mac = BoardId::dac(1).mac();
        let response = audit
            .send(
                ctx,
                Request::new()
                    .connect(1)
                    .destination_mac(mac)
                    .require_source_mac(mac)
                    .listen()
                    .write(DacMemoryRegisters::ping().as_bytes())
                    .read(1),
            )
            .await?;
        assert_eq!(1, response.read().len());
        assert_eq!(mac, *response.read()[0].src());
        assert_eq!(DacReadback::LEN, response.read()[0].data().len());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn read_times_out() -> anyhow::Result<()> {
        let audit = audit();
        let ctx = audit.new_context().await?;
        let result = audit
            .send(
                ctx,
                Request::new()
                    .connect(1)
                    .listen()
                    .timeout(Duration::from_millis(10))
                    .read(1),
            )
            .await;
        assert_eq!(
            Err(TransportError::new(format!("{}: timeout", ctx))),
            result
        );
        Ok(())
    }

    #[tokio::test]
    async fn triggers() -> anyhow::Result<()> {
        let audit = audit();
        let a = audit.new_context().await?;
        let b = audit.new_context().await?;
        audit
            .send(a, Request::new().send_trigger(b).send_trigger(b))
            .await?;
        let response = audit.send(b, Request::new().wait_for_trigger(2)).await?;
        assert!(response.trigger_wait().is_some());
        assert_eq!(
            2,
            audit
                .events()
                .iter()
                .filter(|e| matches!(e, AuditEvent::Trigger { .. }))
                .count()
        );
        Ok(())
    }

    #[tokio::test]
    async fn broken() -> anyhow::Result<()> {
        let audit = audit();
        let ctx = audit.new_context().await?;
        audit.break_down();
        assert!(audit.send(ctx, Request::new().clear()).await.is_err());
        audit.repair();
        assert!(audit.send(ctx, Request::new().clear()).await.is_ok());
        Ok(())
    }
}
