//! Output recording for completed activations.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::RecordError;
use crate::sim::types::{ClockId, Partition, Topology, Value};

/// Append-only sink keyed by partition.
pub trait OutputSink: Send + Sync {
    /// Appends one `(time, outputs...)` row for `partition`. `values` line
    /// up with `partition.outputs`.
    fn record(&self, partition: &Partition, time: f64, values: &[Value]) -> Result<(), RecordError>;

    /// Flushes buffered rows.
    fn flush(&self) -> Result<(), RecordError>;
}

/// CSV header for one partition: `time` followed by its output names.
pub fn header_for(partition: &Partition) -> Vec<String> {
    std::iter::once("time".to_string())
        .chain(partition.outputs.iter().map(|v| v.name.clone()))
        .collect()
}

/// File name of a partition's CSV stream.
pub fn file_name_for(prefix: &str, partition: &Partition) -> String {
    format!("{prefix}_part_{}_out.csv", partition.index)
}

fn row_for(time: f64, values: &[Value]) -> Vec<String> {
    std::iter::once(format!("{time}"))
        .chain(values.iter().map(ToString::to_string))
        .collect()
}

/// Writes one CSV file per partition.
pub struct CsvRecorder<W: Write + Send = BufWriter<File>> {
    writers: BTreeMap<ClockId, Mutex<csv::Writer<W>>>,
}

impl CsvRecorder<BufWriter<File>> {
    /// Creates `<dir>/<prefix>_part_<n>_out.csv` for every partition and
    /// writes the headers.
    ///
    /// # Errors
    ///
    /// Returns a `RecordError` if a file cannot be created or written.
    pub fn create(dir: &Path, prefix: &str, topology: &Topology) -> Result<Self, RecordError> {
        let mut streams = Vec::new();
        for partition in topology.partitions() {
            let path: PathBuf = dir.join(file_name_for(prefix, partition));
            let file = File::create(&path)?;
            streams.push((partition, BufWriter::new(file)));
        }
        Self::from_writers(streams)
    }
}

impl<W: Write + Send> CsvRecorder<W> {
    /// Wraps caller-provided writers, one per partition, and writes the
    /// headers.
    pub fn from_writers<'a>(
        streams: impl IntoIterator<Item = (&'a Partition, W)>,
    ) -> Result<Self, RecordError> {
        let mut writers = BTreeMap::new();
        for (partition, out) in streams {
            let mut wtr = csv::WriterBuilder::new().from_writer(out);
            wtr.write_record(header_for(partition))?;
            writers.insert(partition.clock, Mutex::new(wtr));
        }
        Ok(Self { writers })
    }

    /// Flushes and returns the underlying writers.
    pub fn into_inner(self) -> Result<BTreeMap<ClockId, W>, RecordError> {
        let mut out = BTreeMap::new();
        for (clock, wtr) in self.writers {
            let inner = wtr
                .into_inner()
                .into_inner()
                .map_err(|e| RecordError::Io(e.into_error()))?;
            out.insert(clock, inner);
        }
        Ok(out)
    }
}

impl<W: Write + Send> OutputSink for CsvRecorder<W> {
    fn record(&self, partition: &Partition, time: f64, values: &[Value]) -> Result<(), RecordError> {
        let wtr = self
            .writers
            .get(&partition.clock)
            .ok_or(RecordError::UnknownPartition(partition.clock))?;
        wtr.lock().write_record(row_for(time, values))?;
        Ok(())
    }

    fn flush(&self) -> Result<(), RecordError> {
        for wtr in self.writers.values() {
            wtr.lock().flush()?;
        }
        Ok(())
    }
}

/// One recorded activation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedRow {
    pub clock: ClockId,
    pub time: f64,
    pub values: Vec<(String, Value)>,
}

impl RecordedRow {
    /// Value of the named output, if recorded.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

/// Keeps rows in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    rows: Mutex<Vec<RecordedRow>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<RecordedRow> {
        self.rows.lock().clone()
    }

    /// Rows of one partition, sorted by time. Rows with equal time keep
    /// arrival order.
    pub fn rows_for(&self, clock: ClockId) -> Vec<RecordedRow> {
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .iter()
            .filter(|r| r.clock == clock)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.time.total_cmp(&b.time));
        rows
    }
}

impl OutputSink for MemoryRecorder {
    fn record(&self, partition: &Partition, time: f64, values: &[Value]) -> Result<(), RecordError> {
        let values = partition
            .outputs
            .iter()
            .zip(values)
            .map(|(var, v)| (var.name.clone(), *v))
            .collect();
        self.rows.lock().push(RecordedRow {
            clock: partition.clock,
            time,
            values,
        });
        Ok(())
    }

    fn flush(&self) -> Result<(), RecordError> {
        Ok(())
    }
}
