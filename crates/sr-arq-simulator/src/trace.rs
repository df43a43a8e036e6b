use serde::Serialize;
use sr_arq_abstract::{ArqConfig, SimConfig};
use sr_arq_core::EngineSnapshot;

use crate::engine::{LinkEventSummary, NodeId};

/// Per-direction channel counters, keyed by the sending node.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkStats {
    pub sent: u32,
    pub dropped: u32,
    pub delivered: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub node: NodeId,
    pub drained_at: Option<u64>,
    pub link: LinkStats,
    pub engine: EngineSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub arq: ArqConfig,
    pub sim: SimConfig,
    pub duration_ms: u64,
    pub nodes: Vec<NodeReport>,
    pub link_events: Vec<LinkEventSummary>,
}

impl SimulationReport {
    pub fn node(&self, node: NodeId) -> Option<&NodeReport> {
        self.nodes.iter().find(|r| r.node == node)
    }
}
