use serde::Serialize;
use sr_arq_abstract::{
    ArqConfig, ArqError, ConfigError, Packet, PacketKind, SystemContext, TimerHandle,
};
use std::time::Duration;
use tracing::{debug, info};

use crate::receiver::{ReceiverHandler, ReceiverStats};
use crate::sender::{SenderStats, SenderWindow};

/// Serializable view of one endpoint, used by reports and drivers.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub started: bool,
    pub drained: bool,
    pub base: u32,
    pub next: u32,
    pub window_size: u32,
    pub total_packets: u32,
    pub acked: Vec<u32>,
    pub live_timers: Vec<u32>,
    pub sender: SenderStats,
    pub receiver: ReceiverStats,
}

/// One duplex endpoint: a sender window and a receiver sharing one channel.
///
/// All methods must be called from a single serialized event loop per
/// endpoint. Inbound anomalies (undecodable datagrams, sequences outside the
/// stream) are dropped here; only transport failures reach the caller.
#[derive(Debug)]
pub struct ProtocolEngine {
    config: ArqConfig,
    sender: SenderWindow,
    receiver: ReceiverHandler,
    started: bool,
}

impl ProtocolEngine {
    pub fn new(config: ArqConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            sender: SenderWindow::new(&config),
            receiver: ReceiverHandler::new(config.total_packets),
            config,
            started: false,
        })
    }

    pub fn config(&self) -> &ArqConfig {
        &self.config
    }

    /// How long the driver should wait after construction before calling [`start`](Self::start).
    pub fn start_delay(&self) -> Duration {
        self.config.start_delay()
    }

    pub fn sender(&self) -> &SenderWindow {
        &self.sender
    }

    pub fn receiver(&self) -> &ReceiverHandler {
        &self.receiver
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_drained(&self) -> bool {
        self.sender.is_drained()
    }

    /// Perform the initial window fill. Only the first call has any effect.
    pub fn start(&mut self, ctx: &mut dyn SystemContext) -> Result<(), ArqError> {
        if self.started {
            debug!("Engine: start requested twice, ignoring");
            return Ok(());
        }
        self.started = true;
        info!(
            "Engine: starting at {}ms (window={}, packets={})",
            ctx.now(),
            self.config.window_size,
            self.config.total_packets
        );
        self.sender.fill_window(ctx).map(|_| ())
    }

    pub fn on_datagram(&mut self, ctx: &mut dyn SystemContext, datagram: &[u8]) -> Result<(), ArqError> {
        match Packet::decode(datagram) {
            Ok(packet) => self.on_packet(ctx, packet),
            Err(err) => absorb(Err(err.into())),
        }
    }

    pub fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) -> Result<(), ArqError> {
        let result = match packet.kind {
            PacketKind::Data => self.receiver.on_data_packet(ctx, packet.seq),
            PacketKind::Ack => self.sender.on_ack(ctx, packet.seq).map(|_| ()),
        };
        absorb(result)
    }

    pub fn on_timer(&mut self, ctx: &mut dyn SystemContext, handle: TimerHandle) -> Result<(), ArqError> {
        absorb(self.sender.on_timer_fired(ctx, handle).map(|_| ()))
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            started: self.started,
            drained: self.sender.is_drained(),
            base: self.sender.base(),
            next: self.sender.next(),
            window_size: self.sender.window_size(),
            total_packets: self.sender.total_packets(),
            acked: self.sender.acked().collect(),
            live_timers: self.sender.live_timers().collect(),
            sender: self.sender.stats().clone(),
            receiver: self.receiver.stats().clone(),
        }
    }
}

fn absorb(result: Result<(), ArqError>) -> Result<(), ArqError> {
    match result {
        Err(err) if err.is_drop() => {
            debug!("Engine: dropped inbound event: {}", err);
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingContext;

    fn engine() -> ProtocolEngine {
        ProtocolEngine::new(ArqConfig::default()).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let err = ProtocolEngine::new(ArqConfig {
            total_packets: 0,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::ZeroTotalPackets);
    }

    #[test]
    fn start_fills_window_once() {
        let mut ctx = RecordingContext::default();
        let mut e = engine();
        assert!(ctx.sent.is_empty());

        e.start(&mut ctx).unwrap();
        e.start(&mut ctx).unwrap();
        assert_eq!(ctx.sent_data(), vec![0, 1, 2, 3]);
        assert_eq!(ctx.scheduled.len(), 4);
        assert_eq!(e.start_delay(), Duration::from_secs(1));
    }

    #[test]
    fn reference_ack_sequence() {
        let mut ctx = RecordingContext::default();
        let mut e = engine();
        e.start(&mut ctx).unwrap();
        ctx.clear();

        e.on_datagram(&mut ctx, &Packet::ack(2).encode()).unwrap();
        let snap = e.snapshot();
        assert_eq!((snap.base, snap.next), (0, 4));
        assert_eq!(snap.live_timers, vec![0, 1, 3]);
        assert!(ctx.sent.is_empty());

        e.on_datagram(&mut ctx, &Packet::ack(0).encode()).unwrap();
        let snap = e.snapshot();
        assert_eq!(snap.base, 1);
        assert_eq!(ctx.sent_data(), vec![4]);
        assert_eq!(snap.live_timers, vec![1, 3, 4]);
    }

    #[test]
    fn dispatches_data_to_receiver() {
        let mut ctx = RecordingContext::default();
        let mut e = engine();

        e.on_datagram(&mut ctx, &Packet::data(6).encode()).unwrap();
        assert_eq!(ctx.sent_acks(), vec![6]);
        assert_eq!(e.receiver().arrivals(6), 1);
        // Receiving does not start the sending side.
        assert!(!e.is_started());
    }

    #[test]
    fn drops_garbage_and_out_of_range_silently() {
        let mut ctx = RecordingContext::default();
        let mut e = engine();
        e.start(&mut ctx).unwrap();
        ctx.clear();

        e.on_datagram(&mut ctx, &[0, 1]).unwrap();
        e.on_datagram(&mut ctx, &[7, 0, 0, 0, 0]).unwrap();
        e.on_datagram(&mut ctx, &Packet::ack(10).encode()).unwrap();
        e.on_datagram(&mut ctx, &Packet::data(99).encode()).unwrap();

        assert!(ctx.sent.is_empty());
        assert!(ctx.cancelled.is_empty());
        assert_eq!(e.snapshot().base, 0);
    }

    #[test]
    fn timer_expiry_retransmits_until_acked() {
        let mut ctx = RecordingContext::default();
        let mut e = engine();
        e.start(&mut ctx).unwrap();

        for round in 1..=3 {
            let handle = ctx.last_handle(0);
            ctx.sent.clear();
            e.on_timer(&mut ctx, handle).unwrap();
            assert_eq!(ctx.sent_data(), vec![0]);
            assert_eq!(e.sender().stats().retransmissions, round);
        }

        let handle = ctx.last_handle(0);
        e.on_packet(&mut ctx, Packet::ack(0)).unwrap();
        ctx.sent.clear();
        e.on_timer(&mut ctx, handle).unwrap();
        assert!(ctx.sent.is_empty());
    }

    #[test]
    fn transport_failures_propagate() {
        let mut ctx = RecordingContext::failing();
        let mut e = engine();
        assert!(matches!(e.start(&mut ctx), Err(ArqError::Transport(_))));
        assert!(e.is_started());
    }
}
