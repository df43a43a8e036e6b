//! Selective-Repeat ARQ state machine.
//!
//! Every endpoint runs one [`ProtocolEngine`], which is both a sender (a
//! [`SenderWindow`] with its [`SequenceTimerTable`]) and a receiver (a
//! [`ReceiverHandler`]). The engine never touches sockets or clocks itself:
//! drivers feed it events and lend it a [`SystemContext`] for the duration of
//! each call.

pub mod engine;
pub mod receiver;
pub mod sender;
pub mod timer_table;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{EngineSnapshot, ProtocolEngine};
pub use receiver::{ReceiverHandler, ReceiverStats};
pub use sender::{AckOutcome, SenderStats, SenderWindow, TimeoutOutcome};
pub use timer_table::SequenceTimerTable;

pub use sr_arq_abstract::{
    ArqConfig, ArqError, Packet, PacketKind, SystemContext, TimerHandle, TransportError,
};
