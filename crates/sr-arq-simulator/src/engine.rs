use crate::trace::{LinkStats, NodeReport, SimulationReport};
use bytes::Bytes;
use rand::Rng;
use serde::Serialize;
use sr_arq_abstract::{
    ArqConfig, ArqError, ConfigError, Packet, SimConfig, SystemContext, TimerHandle,
    TransportError,
};
use sr_arq_core::ProtocolEngine;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeId {
    Node0,
    Node1,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            NodeId::Node0 => NodeId::Node1,
            NodeId::Node1 => NodeId::Node0,
        }
    }

    fn index(&self) -> usize {
        match self {
            NodeId::Node0 => 0,
            NodeId::Node1 => 1,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Node0 => f.write_str("node0"),
            NodeId::Node1 => f.write_str("node1"),
        }
    }
}

#[derive(Debug)]
pub enum EventType {
    Start { node: NodeId },
    PacketArrival { to: NodeId, datagram: Bytes },
    TimerExpiry { node: NodeId, handle: TimerHandle },
}

#[derive(Debug)]
struct Event {
    time: u64,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A compact textual summary of important link-layer events.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

enum TimerOp {
    Schedule(u64, TimerHandle),
    Cancel(TimerHandle),
}

/// Effects buffered while an engine handles one event.
#[derive(Default)]
struct ActionBuffer {
    outgoing: Vec<Bytes>,
    timer_ops: Vec<TimerOp>,
}

/// Context lent to an engine for the duration of one event.
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    next_generation: &'a mut u64,
    now: u64,
}

impl SystemContext for ScopedContext<'_> {
    fn send_packet(&mut self, datagram: Bytes) -> Result<(), TransportError> {
        self.buffer.outgoing.push(datagram);
        Ok(())
    }

    fn schedule_timer(&mut self, delay: Duration, seq: u32) -> TimerHandle {
        let handle = TimerHandle {
            seq,
            generation: *self.next_generation,
        };
        *self.next_generation += 1;
        self.buffer
            .timer_ops
            .push(TimerOp::Schedule(delay.as_millis() as u64, handle));
        handle
    }

    fn cancel_timer(&mut self, handle: TimerHandle) {
        self.buffer.timer_ops.push(TimerOp::Cancel(handle));
    }

    fn now(&self) -> u64 {
        self.now
    }
}

/// Virtual-time simulation of two endpoints joined by a lossy point-to-point link.
///
/// The simulator is both collaborators the engines need: the timer service
/// (timer expiries are heap events, cancelled ones are skipped by generation)
/// and the channel (random loss, uniform latency, deterministic one-shot drops).
pub struct Simulator {
    time: u64,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,

    arq: ArqConfig,
    config: SimConfig,
    rng: rand::rngs::StdRng,

    nodes: [ProtocolEngine; 2],

    /// Generation of the live timer per (node, seq).
    timer_generations: HashMap<(NodeId, u32), u64>,
    next_generation: u64,

    drop_data_once: Vec<u32>,
    drop_ack_once: Vec<u32>,

    drained_at: [Option<u64>; 2],
    link_stats: [LinkStats; 2],

    /// Timeline of link events (drops, sends) for traces.
    pub link_events: Vec<LinkEventSummary>,
}

impl Simulator {
    pub fn new(arq: ArqConfig, config: SimConfig) -> Result<Self, ConfigError> {
        use rand::SeedableRng;
        config.validate()?;
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);
        let nodes = [
            ProtocolEngine::new(arq.clone())?,
            ProtocolEngine::new(arq.clone())?,
        ];

        Ok(Self {
            time: 0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            arq,
            config,
            rng,
            nodes,
            timer_generations: HashMap::new(),
            next_generation: 0,
            drop_data_once: Vec::new(),
            drop_ack_once: Vec::new(),
            drained_at: [None; 2],
            link_stats: Default::default(),
            link_events: Vec::new(),
        })
    }

    /// Register a deterministic fault: drop the first DATA packet carrying `seq`.
    pub fn add_drop_data_once(&mut self, seq: u32) {
        self.drop_data_once.push(seq);
    }

    /// Register a deterministic fault: drop the first ACK carrying `seq`.
    pub fn add_drop_ack_once(&mut self, seq: u32) {
        self.drop_ack_once.push(seq);
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn arq_config(&self) -> &ArqConfig {
        &self.arq
    }

    pub fn engine(&self, node: NodeId) -> &ProtocolEngine {
        &self.nodes[node.index()]
    }

    /// Virtual time at which `node`'s window first drained.
    pub fn drained_at(&self, node: NodeId) -> Option<u64> {
        self.drained_at[node.index()]
    }

    pub fn link_stats(&self, from: NodeId) -> &LinkStats {
        &self.link_stats[from.index()]
    }

    pub fn current_time(&self) -> u64 {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    pub fn peek_next_event_time(&self) -> Option<u64> {
        self.event_queue.peek().map(|e| e.time)
    }

    fn push_event(&mut self, time: u64, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    /// Schedule the engine start(s) after the configured start delay.
    pub fn init(&mut self) {
        let at = self.time.saturating_add(self.arq.start_delay_ms);
        self.push_event(at, EventType::Start { node: NodeId::Node0 });
        if self.config.duplex {
            self.push_event(at, EventType::Start { node: NodeId::Node1 });
        }
    }

    /// Process the next event. Returns false once the queue is empty or the
    /// next event lies beyond `stop_at`.
    pub fn step(&mut self) -> bool {
        match self.peek_next_event_time() {
            Some(t) if t <= self.config.stop_at => {}
            _ => return false,
        }
        let Some(event) = self.event_queue.pop() else {
            return false;
        };

        self.time = event.time;
        trace!("Processing event at {}: {:?}", self.time, event.event_type);

        match event.event_type {
            EventType::Start { node } => {
                self.dispatch(node, |engine, ctx| engine.start(ctx));
            }
            EventType::PacketArrival { to, datagram } => {
                self.dispatch(to, |engine, ctx| engine.on_datagram(ctx, &datagram));
            }
            EventType::TimerExpiry { node, handle } => {
                let key = (node, handle.seq);
                if self.timer_generations.get(&key) != Some(&handle.generation) {
                    debug!(
                        "Skipping cancelled timer event for {} seq={}",
                        node, handle.seq
                    );
                    return true;
                }
                self.timer_generations.remove(&key);
                self.dispatch(node, |engine, ctx| engine.on_timer(ctx, handle));
            }
        }
        true
    }

    pub fn run_until_complete(&mut self) {
        self.init();
        while self.step() {}
    }

    fn dispatch<F>(&mut self, node: NodeId, handler: F)
    where
        F: FnOnce(&mut ProtocolEngine, &mut dyn SystemContext) -> Result<(), ArqError>,
    {
        let mut buffer = ActionBuffer::default();
        let result = {
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                next_generation: &mut self.next_generation,
                now: self.time,
            };
            handler(&mut self.nodes[node.index()], &mut ctx)
        };
        if let Err(err) = result {
            warn!("[{}] {}", node, err);
        }

        let idx = node.index();
        if self.drained_at[idx].is_none() && self.nodes[idx].is_drained() {
            self.drained_at[idx] = Some(self.time);
        }

        self.process_actions(node, buffer);
    }

    fn process_actions(&mut self, source_node: NodeId, buffer: ActionBuffer) {
        for op in buffer.timer_ops {
            match op {
                TimerOp::Cancel(handle) => {
                    let key = (source_node, handle.seq);
                    if self.timer_generations.get(&key) == Some(&handle.generation) {
                        self.timer_generations.remove(&key);
                    }
                }
                TimerOp::Schedule(delay, handle) => {
                    self.timer_generations
                        .insert((source_node, handle.seq), handle.generation);
                    self.push_event(
                        self.time.saturating_add(delay),
                        EventType::TimerExpiry {
                            node: source_node,
                            handle,
                        },
                    );
                }
            }
        }

        // Packet transmission logic (Channel)
        let target_node = source_node.peer();
        for datagram in buffer.outgoing {
            let stats = &mut self.link_stats[source_node.index()];
            stats.sent += 1;

            let label = match Packet::decode(&datagram) {
                Ok(packet) => {
                    let once = if packet.is_data() {
                        &mut self.drop_data_once
                    } else {
                        &mut self.drop_ack_once
                    };
                    if let Some(pos) = once.iter().position(|s| *s == packet.seq) {
                        once.remove(pos);
                        stats.dropped += 1;
                        self.link_events.push(LinkEventSummary {
                            time: self.time,
                            description: format!(
                                "[{}->{}] DROP (deterministic) {:?} seq={}",
                                source_node, target_node, packet.kind, packet.seq
                            ),
                        });
                        debug!(
                            "Deterministically dropping {:?} seq={}",
                            packet.kind, packet.seq
                        );
                        continue;
                    }
                    format!("{:?} seq={}", packet.kind, packet.seq)
                }
                Err(err) => format!("undecodable ({err})"),
            };

            // 1. Check Loss
            if self.rng.random::<f64>() < self.config.loss_rate {
                self.link_stats[source_node.index()].dropped += 1;
                self.link_events.push(LinkEventSummary {
                    time: self.time,
                    description: format!(
                        "[{}->{}] DROP (random loss) {}",
                        source_node, target_node, label
                    ),
                });
                debug!("Packet lost in channel: {}", label);
                continue;
            }

            // 2. Calculate Latency
            let latency = self
                .rng
                .random_range(self.config.min_latency..=self.config.max_latency);
            self.link_stats[source_node.index()].delivered += 1;

            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{}->{}] SEND {} (latency={}ms)",
                    source_node, target_node, label, latency
                ),
            });

            self.push_event(
                self.time.saturating_add(latency),
                EventType::PacketArrival {
                    to: target_node,
                    datagram,
                },
            );
        }
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        let nodes = [NodeId::Node0, NodeId::Node1]
            .into_iter()
            .map(|node| NodeReport {
                node,
                drained_at: self.drained_at(node),
                link: self.link_stats(node).clone(),
                engine: self.engine(node).snapshot(),
            })
            .collect();

        SimulationReport {
            arq: self.arq.clone(),
            sim: self.config.clone(),
            duration_ms: self.time,
            nodes,
            link_events: self.link_events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lossless(min_latency: u64, max_latency: u64) -> SimConfig {
        SimConfig {
            min_latency,
            max_latency,
            ..Default::default()
        }
    }

    #[test]
    fn reference_run_drains_without_retransmissions() {
        let mut sim = Simulator::new(ArqConfig::default(), lossless(2, 2)).unwrap();
        sim.run_until_complete();

        let sender = sim.engine(NodeId::Node0);
        assert!(sender.is_drained());
        assert_eq!(sender.sender().stats().transmissions, 10);
        assert_eq!(sender.sender().stats().retransmissions, 0);
        // Start at 1000ms, each window round trip takes 4ms.
        assert!(sim.drained_at(NodeId::Node0).unwrap() < 1100);
        assert_eq!(sim.engine(NodeId::Node1).receiver().stats().acks_sent, 10);
        assert!(!sim.engine(NodeId::Node1).is_started());
        // Every timer was cancelled by its ack, so nothing was left to fire.
        assert_eq!(sim.remaining_events(), 0);
    }

    #[test]
    fn extreme_delays_saturate_instead_of_overflowing() {
        let arq = ArqConfig {
            timeout_ms: u64::MAX,
            ..Default::default()
        };
        let mut sim = Simulator::new(arq, lossless(2, 2)).unwrap();
        sim.add_drop_data_once(0);
        sim.run_until_complete();
        // The lost packet's timer lies beyond stop_at, so the run just ends.
        let sender = sim.engine(NodeId::Node0);
        assert!(!sender.is_drained());
        assert_eq!(sender.sender().base(), 0);
        assert_eq!(sender.sender().stats().retransmissions, 0);

        let arq = ArqConfig {
            start_delay_ms: u64::MAX,
            ..Default::default()
        };
        let mut sim = Simulator::new(arq, lossless(2, 2)).unwrap();
        sim.run_until_complete();
        assert!(!sim.engine(NodeId::Node0).is_started());
        assert_eq!(sim.current_time(), 0);
    }

    #[test]
    fn dropped_data_is_retransmitted_once_after_timeout() {
        let mut sim = Simulator::new(ArqConfig::default(), lossless(2, 2)).unwrap();
        sim.add_drop_data_once(0);
        sim.run_until_complete();

        let stats = sim.engine(NodeId::Node0).sender().stats().clone();
        assert!(sim.engine(NodeId::Node0).is_drained());
        assert_eq!(stats.retransmissions, 1);
        assert_eq!(stats.transmissions, 11);
        // Held at base 0 until the 2000ms timeout fired.
        assert!(sim.drained_at(NodeId::Node0).unwrap() >= 3000);
    }

    #[test]
    fn dropped_ack_costs_one_retransmission() {
        let mut sim = Simulator::new(ArqConfig::default(), lossless(5, 5)).unwrap();
        sim.add_drop_ack_once(3);
        sim.run_until_complete();

        let node1 = sim.engine(NodeId::Node1).receiver();
        assert_eq!(node1.arrivals(3), 2);
        assert_eq!(node1.stats().duplicates, 1);
        assert_eq!(
            sim.engine(NodeId::Node0).sender().stats().retransmissions,
            1
        );
    }

    #[test]
    fn stop_at_bounds_the_run() {
        let sim_cfg = SimConfig {
            loss_rate: 1.0,
            stop_at: 9_000,
            ..Default::default()
        };
        let mut sim = Simulator::new(ArqConfig::default(), sim_cfg).unwrap();
        sim.run_until_complete();

        assert!(sim.current_time() <= 9_000);
        let sender = sim.engine(NodeId::Node0);
        assert!(!sender.is_drained());
        // Timeouts at 3000, 5000, 7000 and 9000 for each of the first four.
        assert_eq!(sender.sender().stats().retransmissions, 16);
    }

    #[test]
    fn duplex_runs_both_streams() {
        let sim_cfg = SimConfig {
            duplex: true,
            ..lossless(1, 30)
        };
        let mut sim = Simulator::new(ArqConfig::default(), sim_cfg).unwrap();
        sim.run_until_complete();

        assert!(sim.engine(NodeId::Node0).is_drained());
        assert!(sim.engine(NodeId::Node1).is_drained());
    }

    #[test]
    fn rejects_bad_channel_config() {
        let sim_cfg = SimConfig {
            loss_rate: 1.5,
            ..Default::default()
        };
        assert!(Simulator::new(ArqConfig::default(), sim_cfg).is_err());
    }
}
