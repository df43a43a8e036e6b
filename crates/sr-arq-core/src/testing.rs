use bytes::Bytes;
use sr_arq_abstract::{Packet, SystemContext, TimerHandle, TransportError};
use std::time::Duration;

/// Context double that records every effect a handler asks for.
#[derive(Default)]
pub struct RecordingContext {
    pub sent: Vec<Packet>,
    pub scheduled: Vec<(Duration, TimerHandle)>,
    pub cancelled: Vec<TimerHandle>,
    pub now: u64,
    pub fail_sends: bool,
    next_generation: u64,
}

impl RecordingContext {
    /// A context whose transport refuses every datagram.
    pub fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Default::default()
        }
    }

    pub fn sent_data(&self) -> Vec<u32> {
        self.sent.iter().filter(|p| p.is_data()).map(|p| p.seq).collect()
    }

    pub fn sent_acks(&self) -> Vec<u32> {
        self.sent.iter().filter(|p| p.is_ack()).map(|p| p.seq).collect()
    }

    pub fn clear(&mut self) {
        self.sent.clear();
        self.scheduled.clear();
        self.cancelled.clear();
    }

    pub fn last_handle(&self, seq: u32) -> TimerHandle {
        self.scheduled
            .iter()
            .rev()
            .find(|(_, h)| h.seq == seq)
            .map(|(_, h)| *h)
            .expect("no timer scheduled for seq")
    }
}

impl SystemContext for RecordingContext {
    fn send_packet(&mut self, datagram: Bytes) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::Closed);
        }
        self.sent.push(Packet::decode(&datagram).expect("engine emitted garbage"));
        Ok(())
    }

    fn schedule_timer(&mut self, delay: Duration, seq: u32) -> TimerHandle {
        let handle = TimerHandle {
            seq,
            generation: self.next_generation,
        };
        self.next_generation += 1;
        self.scheduled.push((delay, handle));
        handle
    }

    fn cancel_timer(&mut self, handle: TimerHandle) {
        self.cancelled.push(handle);
    }

    fn now(&self) -> u64 {
        self.now
    }
}
