pub mod config;
pub mod correlator;
pub mod discovery;
pub mod error;
pub mod exposure;
pub mod protocol;
pub mod record_log;
pub mod session;
pub mod transport;

pub use config::LinkConfig;
pub use correlator::{Correlator, MatchReport};
pub use discovery::{scan_directory, ImageEvent, ImagePattern};
pub use error::{
    ConfigError, CorrelateError, DiscoveryError, LinkError, ProtocolError, Result, TransportError,
};
pub use exposure::{ExposureEvent, ExposureTracker};
pub use protocol::Command;
pub use record_log::{CorrelationRecord, RecordLog};
pub use session::{Session, SessionEvent, StopReason};
pub use transport::{ConnectionState, LineTransport, TransportEvent};
