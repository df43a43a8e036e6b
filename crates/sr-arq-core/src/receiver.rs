use serde::Serialize;
use sr_arq_abstract::{ArqError, Packet, SystemContext};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReceiverStats {
    pub data_packets: u32,
    /// DATA arrivals for a sequence that had already arrived before.
    pub duplicates: u32,
    pub acks_sent: u32,
}

/// Receive side of an endpoint: acknowledges every DATA packet it is given.
///
/// There is no receive window. Duplicates and out-of-order arrivals are
/// acknowledged like any other packet; nothing is buffered or reordered for
/// an upper layer. Arrival counts are kept for inspection only.
#[derive(Debug)]
pub struct ReceiverHandler {
    total_packets: u32,
    arrivals: Vec<u32>,
    stats: ReceiverStats,
}

impl ReceiverHandler {
    pub fn new(total_packets: u32) -> Self {
        Self {
            total_packets,
            arrivals: vec![0; total_packets as usize],
            stats: ReceiverStats::default(),
        }
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// How many DATA packets for `seq` have arrived.
    pub fn arrivals(&self, seq: u32) -> u32 {
        self.arrivals.get(seq as usize).copied().unwrap_or(0)
    }

    /// Number of distinct sequences seen at least once.
    pub fn distinct_received(&self) -> u32 {
        self.arrivals.iter().filter(|n| **n > 0).count() as u32
    }

    pub fn on_data_packet(&mut self, ctx: &mut dyn SystemContext, seq: u32) -> Result<(), ArqError> {
        let Some(count) = self.arrivals.get_mut(seq as usize) else {
            return Err(ArqError::OutOfRangeSequence {
                seq,
                total: self.total_packets,
            });
        };
        info!("Receiver: got DATA seq={} at {}ms", seq, ctx.now());

        *count += 1;
        if *count > 1 {
            self.stats.duplicates += 1;
        }
        self.stats.data_packets += 1;

        ctx.send_packet(Packet::ack(seq).encode())?;
        self.stats.acks_sent += 1;
        info!("Receiver: sent ACK seq={} at {}ms", seq, ctx.now());
        Ok(())
    }
}
