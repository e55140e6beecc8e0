use log::{debug, info};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::io::Write;

use crate::interface::{ChannelDiagnostics, GuidanceCommand, TargetCluster, TargetEstimate, ThrustMix};
use crate::prelude::{SonarError, SonarResult};

/// One append-only telemetry entry, tagged with the cycle that produced it.
///
/// Slices are borrowed from the producing stage; sinks that retain records
/// call [`TelemetryRecord::into_owned`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryRecord<'a> {
    Target {
        cycle: u64,
        estimate: TargetEstimate,
    },
    Clusters {
        cycle: u64,
        clusters: Cow<'a, [TargetCluster]>,
    },
    Guidance {
        cycle: u64,
        command: GuidanceCommand,
        thrust: ThrustMix,
    },
    Diagnostic {
        cycle: u64,
        channels: Cow<'a, [ChannelDiagnostics]>,
    },
}

impl TelemetryRecord<'_> {
    pub fn cycle(&self) -> u64 {
        match self {
            TelemetryRecord::Target { cycle, .. }
            | TelemetryRecord::Clusters { cycle, .. }
            | TelemetryRecord::Guidance { cycle, .. }
            | TelemetryRecord::Diagnostic { cycle, .. } => *cycle,
        }
    }

    pub fn into_owned(self) -> TelemetryRecord<'static> {
        match self {
            TelemetryRecord::Target { cycle, estimate } => TelemetryRecord::Target { cycle, estimate },
            TelemetryRecord::Clusters { cycle, clusters } => TelemetryRecord::Clusters {
                cycle,
                clusters: Cow::Owned(clusters.into_owned()),
            },
            TelemetryRecord::Guidance {
                cycle,
                command,
                thrust,
            } => TelemetryRecord::Guidance {
                cycle,
                command,
                thrust,
            },
            TelemetryRecord::Diagnostic { cycle, channels } => TelemetryRecord::Diagnostic {
                cycle,
                channels: Cow::Owned(channels.into_owned()),
            },
        }
    }
}

/// Append-style destination for telemetry records.
pub trait RecordSink {
    fn append(&mut self, record: TelemetryRecord<'_>) -> SonarResult<()>;

    /// Pushes buffered records to their destination.
    fn flush(&mut self) -> SonarResult<()> {
        Ok(())
    }
}

/// Forwards records to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

impl RecordSink for LogSink {
    fn append(&mut self, record: TelemetryRecord<'_>) -> SonarResult<()> {
        match &record {
            TelemetryRecord::Target { cycle, estimate } => info!(
                "cycle {}: target at {:.1} cm az {:.3} el {:.3} conf {:.2}",
                cycle,
                estimate.range_cm,
                estimate.azimuth_rad,
                estimate.elevation_rad,
                estimate.confidence
            ),
            TelemetryRecord::Clusters { cycle, clusters } => {
                info!("cycle {}: {} clusters", cycle, clusters.len());
                for cluster in clusters.iter() {
                    debug!(
                        "  cluster {:.1} cm power {:.1} from {} peaks",
                        cluster.range_cm, cluster.power, cluster.sample_count
                    );
                }
            }
            TelemetryRecord::Guidance {
                cycle,
                command,
                thrust,
            } => info!(
                "cycle {}: accel ({:.2}, {:.2}, {:.2}) intercept {} thrust {:?}",
                cycle,
                command.acceleration.x,
                command.acceleration.y,
                command.acceleration.z,
                command.intercept,
                thrust
            ),
            TelemetryRecord::Diagnostic { cycle, channels } => {
                for channel in channels.iter() {
                    debug!(
                        "cycle {}: ch{} power {:.3} noise {:.3} snr {:.1} dB",
                        cycle,
                        channel.channel,
                        channel.signal_power,
                        channel.noise_floor,
                        channel.snr_db
                    );
                }
            }
        }
        Ok(())
    }
}

/// Fixed-capacity in-memory log. Records arriving while full are dropped
/// and the overflow flag latches until `clear`.
#[derive(Debug)]
pub struct MemorySink {
    records: VecDeque<TelemetryRecord<'static>>,
    capacity: usize,
    overflow: bool,
}

impl MemorySink {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            overflow: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    pub fn records(&self) -> impl Iterator<Item = &TelemetryRecord<'static>> {
        self.records.iter()
    }

    /// Removes and returns everything recorded so far. Keeps the overflow flag.
    pub fn drain(&mut self) -> Vec<TelemetryRecord<'static>> {
        self.records.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.overflow = false;
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl RecordSink for MemorySink {
    fn append(&mut self, record: TelemetryRecord<'_>) -> SonarResult<()> {
        if self.records.len() >= self.capacity {
            self.overflow = true;
            return Ok(());
        }
        self.records.push_back(record.into_owned());
        Ok(())
    }
}

/// Writes each record as one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn append(&mut self, record: TelemetryRecord<'_>) -> SonarResult<()> {
        let line = serde_json::to_string(&record)
            .map_err(|err| SonarError::InvalidArgument(format!("telemetry encode: {}", err)))?;
        writeln!(self.writer, "{}", line)
            .map_err(|err| SonarError::Hardware(format!("telemetry write: {}", err)))
    }

    fn flush(&mut self) -> SonarResult<()> {
        self.writer
            .flush()
            .map_err(|err| SonarError::Hardware(format!("telemetry flush: {}", err)))
    }
}
