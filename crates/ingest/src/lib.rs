//! Signal adapters and the ingestion loop that feeds the escalation engine.

pub mod fall_feed;
pub mod monitor;
pub mod traits;
pub mod vitals;

pub use fall_feed::JsonLinesFeed;
pub use monitor::{Monitor, MonitorExit, MonitorStats};
pub use traits::{ConditionSink, FallDetector, SourceError, VitalSource};
pub use vitals::HttpVitalSource;
