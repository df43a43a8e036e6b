//! Run a [`ProtocolEngine`] over a real UDP socket.
//!
//! Each endpoint owns one tokio task. Inbound datagrams, timer expiries and
//! the start trigger all arrive at a single `select!` loop, so the engine only
//! ever sees one event at a time. Timers are spawned sleeper tasks that post
//! their handle back into the loop; cancelling aborts the sleeper, and an
//! expiry that was already posted is discarded by the engine's timer table.

use anyhow::Context;
use bytes::Bytes;
use sr_arq_abstract::{ArqConfig, SystemContext, TimerHandle, TransportError};
use sr_arq_core::{EngineSnapshot, ProtocolEngine};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_PORT: u16 = 8080;

const MAX_DATAGRAM: usize = 1500;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Hard bound on how long the endpoint runs.
    pub run_for: Duration,
    /// Fill the send window after the configured start delay.
    pub start: bool,
    /// Return as soon as every sequence has been acknowledged.
    pub stop_when_drained: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run_for: Duration::from_secs(30),
            start: true,
            stop_when_drained: false,
        }
    }
}

#[derive(Debug)]
enum LoopEvent {
    Start,
    TimerFired(TimerHandle),
}

struct UdpContext<'a> {
    socket: &'a UdpSocket,
    timers: &'a mut HashMap<TimerHandle, JoinHandle<()>>,
    events: &'a UnboundedSender<LoopEvent>,
    next_generation: &'a mut u64,
    epoch: Instant,
}

impl SystemContext for UdpContext<'_> {
    fn send_packet(&mut self, datagram: Bytes) -> Result<(), TransportError> {
        // Never wait for socket readiness inside a handler; a full buffer is
        // just another loss for the retransmission timer to cover.
        self.socket.try_send(&datagram)?;
        Ok(())
    }

    fn schedule_timer(&mut self, delay: Duration, seq: u32) -> TimerHandle {
        let handle = TimerHandle {
            seq,
            generation: *self.next_generation,
        };
        *self.next_generation += 1;

        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(LoopEvent::TimerFired(handle));
        });
        self.timers.insert(handle, task);
        handle
    }

    fn cancel_timer(&mut self, handle: TimerHandle) {
        if let Some(task) = self.timers.remove(&handle) {
            task.abort();
        }
    }

    fn now(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// One Selective-Repeat endpoint bound to a local UDP port.
pub struct Endpoint {
    socket: UdpSocket,
    engine: ProtocolEngine,
}

impl Endpoint {
    pub async fn bind(addr: SocketAddr, config: ArqConfig) -> anyhow::Result<Self> {
        let engine = ProtocolEngine::new(config).context("Invalid ARQ configuration")?;
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind UDP socket on {addr}"))?;
        Ok(Self { socket, engine })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.socket
            .local_addr()
            .context("Failed to read local socket address")
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    /// Exchange packets with `peer` until the run bound (or drain) is reached.
    pub async fn run(self, peer: SocketAddr, options: RunOptions) -> anyhow::Result<EngineSnapshot> {
        let Endpoint { socket, mut engine } = self;
        socket
            .connect(peer)
            .await
            .with_context(|| format!("Failed to connect UDP socket to {peer}"))?;
        info!(
            "Endpoint {} <-> {} running for {:?}",
            socket.local_addr()?,
            peer,
            options.run_for
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers: HashMap<TimerHandle, JoinHandle<()>> = HashMap::new();
        let mut next_generation = 0u64;
        let epoch = Instant::now();

        if options.start {
            let start_delay = engine.start_delay();
            let events = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(start_delay).await;
                let _ = events.send(LoopEvent::Start);
            });
        }

        let deadline = tokio::time::sleep(options.run_for);
        tokio::pin!(deadline);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    info!("Run duration elapsed");
                    break;
                }
                received = socket.recv(&mut buf) => {
                    let n = match received {
                        Ok(n) => n,
                        Err(err) => {
                            // Typically ICMP port unreachable while the peer is not up yet.
                            debug!("recv failed: {}", err);
                            continue;
                        }
                    };
                    let mut ctx = UdpContext {
                        socket: &socket,
                        timers: &mut timers,
                        events: &tx,
                        next_generation: &mut next_generation,
                        epoch,
                    };
                    if let Err(err) = engine.on_datagram(&mut ctx, &buf[..n]) {
                        warn!("{}", err);
                    }
                }
                Some(event) = rx.recv() => {
                    if let LoopEvent::TimerFired(handle) = &event {
                        timers.remove(handle);
                    }
                    let mut ctx = UdpContext {
                        socket: &socket,
                        timers: &mut timers,
                        events: &tx,
                        next_generation: &mut next_generation,
                        epoch,
                    };
                    let result = match event {
                        LoopEvent::Start => engine.start(&mut ctx),
                        LoopEvent::TimerFired(handle) => engine.on_timer(&mut ctx, handle),
                    };
                    if let Err(err) = result {
                        warn!("{}", err);
                    }
                }
            }

            if options.stop_when_drained && engine.is_drained() {
                info!("All packets acknowledged");
                break;
            }
        }

        for (_, task) in timers.drain() {
            task.abort();
        }
        Ok(engine.snapshot())
    }
}
