pub mod log;
pub mod metrics;

pub use self::log::{JsonLinesSink, LogSink, MemorySink, RecordSink, TelemetryRecord};
pub use self::metrics::{CycleMetrics, MetricsSnapshot};
