pub mod config;
pub mod error;
pub mod interface;
pub mod packet;
pub mod scenario;

pub use config::{ArqConfig, SimConfig};
pub use error::{ArqError, ConfigError, TransportError, WireError};
pub use interface::{SystemContext, TimerHandle};
pub use packet::{HEADER_LEN, Packet, PacketKind};
pub use scenario::{ArqConfigOverride, SimConfigOverride, TestAction, TestAssertion, TestScenario};
