//! Send side of a Selective-Repeat endpoint.
//!
//! ```text
//!        base                next
//!         │                   │
//!  ───────┼───────────────────┼───────────────┼──────▶ seq
//!  acked  │ in flight (timers)│ sendable      │
//!         │<──────────── window_size ────────▶│
//! ```
//!
//! Acks are selective: any sequence inside the window may be acknowledged in
//! any order. `base` only ever slides across a contiguous run of acknowledged
//! sequences, and each slide immediately refills the window.

use serde::Serialize;
use sr_arq_abstract::{ArqConfig, ArqError, Packet, SystemContext, TimerHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::timer_table::SequenceTimerTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// First ack for the sequence. `base` moved by `slid` and `refilled` new
    /// sequences were sent.
    Accepted { slid: u32, refilled: u32 },
    /// The sequence was already acknowledged.
    Duplicate,
    /// Ack for a sequence that has not been sent yet; ignored.
    NotSent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    Retransmitted,
    /// Timer for a sequence that is already acknowledged.
    Stale,
    /// The handle was cancelled or superseded before it was delivered.
    Cancelled,
    /// Retransmission budget exhausted; the sequence is no longer retried.
    Abandoned,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SenderStats {
    /// DATA packets handed to the transport, retransmissions included.
    pub transmissions: u32,
    pub retransmissions: u32,
    pub stale_timeouts: u32,
    pub duplicate_acks: u32,
    pub abandoned: u32,
}

#[derive(Debug)]
pub struct SenderWindow {
    window_size: u32,
    total_packets: u32,
    timeout: Duration,
    max_retransmissions: Option<u32>,

    /// Oldest unacknowledged sequence.
    base: u32,
    /// Next sequence that has never been sent.
    next: u32,

    acked: Vec<bool>,
    retries: Vec<u32>,
    abandoned: Vec<bool>,
    timers: SequenceTimerTable,
    stats: SenderStats,
}

impl SenderWindow {
    pub fn new(config: &ArqConfig) -> Self {
        let total = config.total_packets as usize;
        Self {
            window_size: config.window_size,
            total_packets: config.total_packets,
            timeout: config.timeout(),
            max_retransmissions: config.max_retransmissions,
            base: 0,
            next: 0,
            acked: vec![false; total],
            retries: vec![0; total],
            abandoned: vec![false; total],
            timers: SequenceTimerTable::new(config.total_packets),
            stats: SenderStats::default(),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next(&self) -> u32 {
        self.next
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    pub fn total_packets(&self) -> u32 {
        self.total_packets
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    /// Every sequence has been acknowledged.
    pub fn is_drained(&self) -> bool {
        self.base == self.total_packets
    }

    pub fn is_acked(&self, seq: u32) -> bool {
        self.acked.get(seq as usize).copied().unwrap_or(false)
    }

    pub fn is_abandoned(&self, seq: u32) -> bool {
        self.abandoned.get(seq as usize).copied().unwrap_or(false)
    }

    pub fn acked(&self) -> impl Iterator<Item = u32> + '_ {
        self.acked
            .iter()
            .enumerate()
            .filter(|(_, acked)| **acked)
            .map(|(seq, _)| seq as u32)
    }

    /// Sequences with a live retransmission timer.
    pub fn live_timers(&self) -> impl Iterator<Item = u32> + '_ {
        self.timers.armed()
    }

    /// Sent but not yet acknowledged.
    pub fn outstanding(&self) -> impl Iterator<Item = u32> + '_ {
        (self.base..self.next).filter(|seq| !self.acked[*seq as usize])
    }

    fn check_range(&self, seq: u32) -> Result<(), ArqError> {
        if seq < self.total_packets {
            Ok(())
        } else {
            Err(ArqError::OutOfRangeSequence {
                seq,
                total: self.total_packets,
            })
        }
    }

    /// Transmit DATA for `seq` and (re)arm its timer.
    ///
    /// The timer is armed even when the transport refuses the packet, so the
    /// timeout path retries it later.
    pub fn send(&mut self, ctx: &mut dyn SystemContext, seq: u32) -> Result<(), ArqError> {
        self.check_range(seq)?;

        self.stats.transmissions += 1;
        let sent = ctx.send_packet(Packet::data(seq).encode());
        let armed = self.timers.arm(ctx, seq, self.timeout);
        debug_assert!(armed.is_some(), "no timer slot for seq={seq}");

        match sent {
            Ok(()) => {
                info!("Sender: sent DATA seq={} at {}ms", seq, ctx.now());
                Ok(())
            }
            Err(err) => {
                warn!("Sender: transport refused DATA seq={}: {}", seq, err);
                Err(err.into())
            }
        }
    }

    /// Send every sequence the window currently admits. Returns how many were sent.
    ///
    /// A transport failure does not stop the fill; the first one is reported
    /// after the window is full.
    pub fn fill_window(&mut self, ctx: &mut dyn SystemContext) -> Result<u32, ArqError> {
        let mut sent = 0;
        let mut first_err = None;
        while self.next - self.base < self.window_size && self.next < self.total_packets {
            if let Err(err) = self.send(ctx, self.next) {
                first_err.get_or_insert(err);
            }
            self.next += 1;
            sent += 1;
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(sent),
        }
    }

    /// Record an acknowledgment for `seq`.
    ///
    /// An ACK for a sequence at or past `next` has no matching transmission
    /// and is ignored without marking it acknowledged, so `base` never
    /// overtakes `next`.
    pub fn on_ack(&mut self, ctx: &mut dyn SystemContext, seq: u32) -> Result<AckOutcome, ArqError> {
        self.check_range(seq)?;
        info!("Sender: got ACK seq={} at {}ms", seq, ctx.now());

        if seq >= self.next {
            debug!("Sender: ignoring ACK for unsent seq={} (next={})", seq, self.next);
            return Ok(AckOutcome::NotSent);
        }

        let idx = seq as usize;
        let duplicate = self.acked[idx];
        self.acked[idx] = true;
        self.timers.cancel(ctx, seq);

        if duplicate {
            self.stats.duplicate_acks += 1;
            debug!("Sender: duplicate ACK seq={}", seq);
            return Ok(AckOutcome::Duplicate);
        }

        let before = self.base;
        while self.base < self.total_packets && self.acked[self.base as usize] {
            self.base += 1;
        }
        let slid = self.base - before;
        if slid > 0 {
            debug!("Sender: window slid {} -> {}", before, self.base);
        }
        if self.is_drained() {
            info!("Sender: all {} packets acknowledged at {}ms", self.total_packets, ctx.now());
        }

        let refilled = self.fill_window(ctx)?;
        Ok(AckOutcome::Accepted { slid, refilled })
    }

    /// Deliver a timer expiry from the timer service.
    pub fn on_timer_fired(
        &mut self,
        ctx: &mut dyn SystemContext,
        handle: TimerHandle,
    ) -> Result<TimeoutOutcome, ArqError> {
        if !self.timers.fire(handle) {
            debug!(
                "Sender: discarding cancelled timer seq={} gen={}",
                handle.seq, handle.generation
            );
            return Ok(TimeoutOutcome::Cancelled);
        }
        self.on_timeout(ctx, handle.seq)
    }

    pub fn on_timeout(
        &mut self,
        ctx: &mut dyn SystemContext,
        seq: u32,
    ) -> Result<TimeoutOutcome, ArqError> {
        self.check_range(seq)?;
        let idx = seq as usize;

        if self.acked[idx] || seq >= self.next || self.abandoned[idx] {
            self.stats.stale_timeouts += 1;
            debug!("Sender: stale timeout for seq={}", seq);
            return Ok(TimeoutOutcome::Stale);
        }

        if let Some(limit) = self.max_retransmissions
            && self.retries[idx] >= limit
        {
            self.abandoned[idx] = true;
            self.stats.abandoned += 1;
            warn!(
                "Sender: giving up on seq={} after {} retransmissions",
                seq, self.retries[idx]
            );
            return Ok(TimeoutOutcome::Abandoned);
        }

        info!(
            "Sender: timeout for seq={} at {}ms, retransmitting",
            seq,
            ctx.now()
        );
        self.retries[idx] += 1;
        self.stats.retransmissions += 1;
        self.send(ctx, seq)?;
        Ok(TimeoutOutcome::Retransmitted)
    }
}
