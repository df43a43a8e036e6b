use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;

use crate::error::TransportError;

/// Identifies one armed timer. The generation is unique per timer service,
/// so an expiry can always be matched against the timer that is live now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimerHandle {
    pub seq: u32,
    pub generation: u64,
}

/// The capabilities a driver lends to a protocol engine while it handles one event.
///
/// Handlers receive `&mut dyn SystemContext` and must not block; everything
/// delayed goes through `schedule_timer`.
pub trait SystemContext {
    /// Hand an encoded packet to the unreliable channel towards the peer.
    fn send_packet(&mut self, datagram: Bytes) -> Result<(), TransportError>;

    /// Arrange for `ProtocolEngine::on_timer` to be called with the returned
    /// handle once `delay` has elapsed.
    fn schedule_timer(&mut self, delay: Duration, seq: u32) -> TimerHandle;

    /// Stop a scheduled timer. Cancelling an expired or unknown handle is a no-op.
    fn cancel_timer(&mut self, handle: TimerHandle);

    /// Current time on the driver's clock, in milliseconds.
    fn now(&self) -> u64;
}
