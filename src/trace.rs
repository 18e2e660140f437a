//! JSONL capture of synthesis runs: compact tick traces and full reports.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::network::NormativeNetwork;
use crate::norm::NormId;
use crate::synthesis::TickReport;

/// One JSONL row per tick. Norms are rendered as text so a trace reads
/// without the network at hand.
#[derive(Debug, Clone, Serialize)]
pub struct TickTrace {
    pub timestamp_ms: u64,
    pub tick: u64,
    pub conflicts: usize,
    pub unregulated: usize,
    pub generated: usize,
    pub revised: usize,
    pub merges: usize,
    pub splits: usize,
    pub substitutions: usize,
    pub relations: usize,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub normative_system: Vec<String>,
    pub nodes: usize,
    pub active: usize,
    pub max_level: u32,
    pub converged: bool,
}

fn describe(network: &NormativeNetwork, ids: &[NormId]) -> Vec<String> {
    ids.iter()
        .map(|&id| match network.norm(id) {
            Some(norm) => format!("{id} {norm}"),
            None => id.to_string(),
        })
        .collect()
}

impl TickTrace {
    pub fn from_report(report: &TickReport, network: &NormativeNetwork) -> Self {
        let system: Vec<NormId> = network.normative_system().iter().copied().collect();
        Self {
            timestamp_ms: now_epoch_ms(),
            tick: report.tick,
            conflicts: report.conflicts,
            unregulated: report.unregulated,
            generated: report.generated.len(),
            revised: report.revised.len(),
            merges: report.refinement.merges.len(),
            splits: report.refinement.splits.len(),
            substitutions: report.refinement.substitutions.len(),
            relations: report.classification.relations.len(),
            added: describe(network, &report.delta.added),
            removed: describe(network, &report.delta.removed),
            normative_system: describe(network, &system),
            nodes: report.summary.nodes,
            active: report.summary.active,
            max_level: report.summary.max_level,
            converged: report.converged,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace row {row} failed to serialize: {source}")]
    Serde {
        row: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("trace writer already stopped")]
    Closed,
    #[error("trace writer panicked")]
    Panicked,
}

/// Destination for rows of type `T`, one per record call.
pub trait TraceSink<T = TickTrace>: Send + Sync {
    fn record(&self, row: T) -> Result<(), TraceError>;
}

/// Streams rows as JSON lines from a dedicated writer thread, so a
/// synthesis loop never waits on the disk.
pub struct JsonlTraceSink<T> {
    sender: mpsc::Sender<T>,
}

impl<T> Clone for JsonlTraceSink<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Handle on the writer thread. Joining returns the number of rows written.
pub struct TraceWorker {
    handle: thread::JoinHandle<Result<usize, TraceError>>,
}

impl TraceWorker {
    /// Wait for the writer to drain. Every sink clone must be dropped first
    /// or this blocks.
    pub fn join(self) -> Result<usize, TraceError> {
        self.handle.join().map_err(|_| TraceError::Panicked)?
    }
}

impl<T: Serialize + Send + 'static> JsonlTraceSink<T> {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let writer = BufWriter::new(File::create(path)?);
        let (sender, receiver) = mpsc::channel::<T>();
        let handle = thread::spawn(move || drain_rows(writer, receiver));
        Ok((Self { sender }, TraceWorker { handle }))
    }
}

impl<T: Serialize + Send + 'static> TraceSink<T> for JsonlTraceSink<T> {
    fn record(&self, row: T) -> Result<(), TraceError> {
        self.sender.send(row).map_err(|_| TraceError::Closed)
    }
}

fn drain_rows<T: Serialize, W: Write>(
    mut writer: W,
    receiver: mpsc::Receiver<T>,
) -> Result<usize, TraceError> {
    let mut rows = 0usize;
    for row in receiver {
        serde_json::to_writer(&mut writer, &row)
            .map_err(|source| TraceError::Serde { row: rows, source })?;
        writer.write_all(b"\n")?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_counts_rows_and_stops_on_hangup() {
        let (sender, receiver) = mpsc::channel();
        for tick in 1..=3u64 {
            sender.send(serde_json::json!({ "tick": tick })).unwrap();
        }
        drop(sender);

        let mut out = Vec::new();
        assert_eq!(drain_rows(&mut out, receiver).unwrap(), 3);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "{\"tick\":1}\n{\"tick\":2}\n{\"tick\":3}\n");
    }
}
