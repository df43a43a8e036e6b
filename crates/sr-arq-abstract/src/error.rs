use thiserror::Error;

/// A datagram that cannot be read as a packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("datagram of {len} bytes is shorter than the packet header")]
    Truncated { len: usize },
    #[error("unknown packet kind {0:#04x}")]
    UnknownKind(u8),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("window_size must be positive")]
    ZeroWindow,
    #[error("total_packets must be positive")]
    ZeroTotalPackets,
    #[error("timeout_ms must be positive")]
    ZeroTimeout,
    #[error("loss_rate {0} is outside [0, 1]")]
    InvalidLossRate(f64),
    #[error("min_latency {min} exceeds max_latency {max}")]
    LatencyRange { min: u64, max: u64 },
}

/// Failure reported by the channel underneath the protocol.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ArqError {
    #[error("sequence {seq} is outside the {total}-packet stream")]
    OutOfRangeSequence { seq: u32, total: u32 },
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

impl ArqError {
    /// Errors the protocol absorbs by dropping the offending input.
    pub fn is_drop(&self) -> bool {
        matches!(self, ArqError::OutOfRangeSequence { .. } | ArqError::Wire(_))
    }
}
