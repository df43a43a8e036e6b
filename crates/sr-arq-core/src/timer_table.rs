use sr_arq_abstract::{SystemContext, TimerHandle};
use std::time::Duration;

/// Retransmission timers, one slot per sequence number.
///
/// A slot holds the handle of the single timer currently armed for that
/// sequence. Expiries are matched against the slot by handle, so a timer that
/// was cancelled or superseded is recognised and ignored even if the timer
/// service still delivers it.
#[derive(Debug)]
pub struct SequenceTimerTable {
    slots: Vec<Option<TimerHandle>>,
}

impl SequenceTimerTable {
    pub fn new(total_packets: u32) -> Self {
        Self {
            slots: vec![None; total_packets as usize],
        }
    }

    /// Arm a timer for `seq`, cancelling whatever was armed for it before.
    pub fn arm(
        &mut self,
        ctx: &mut dyn SystemContext,
        seq: u32,
        duration: Duration,
    ) -> Option<TimerHandle> {
        let slot = self.slots.get_mut(seq as usize)?;
        if let Some(previous) = slot.take() {
            ctx.cancel_timer(previous);
        }
        let handle = ctx.schedule_timer(duration, seq);
        *slot = Some(handle);
        Some(handle)
    }

    /// Returns whether a live timer was cancelled.
    pub fn cancel(&mut self, ctx: &mut dyn SystemContext, seq: u32) -> bool {
        match self.slots.get_mut(seq as usize).and_then(Option::take) {
            Some(handle) => {
                ctx.cancel_timer(handle);
                true
            }
            None => false,
        }
    }

    /// Consume an expiry. Returns `false` when `handle` is not the live timer
    /// for its sequence (cancelled, superseded or already consumed).
    pub fn fire(&mut self, handle: TimerHandle) -> bool {
        match self.slots.get_mut(handle.seq as usize) {
            Some(slot) if *slot == Some(handle) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self, seq: u32) -> bool {
        matches!(self.slots.get(seq as usize), Some(Some(_)))
    }

    pub fn armed(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(seq, _)| seq as u32)
    }

    pub fn armed_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
