//! Process store with optimistic concurrency control
//!
//! Snapshots are kept serialized, so every read rebuilds an independent
//! [`Process`] and no caller can mutate another caller's copy. Writes are
//! accepted only when the caller's version still matches the stored one.

use crate::error::{FlowError, Result};
use crate::models::{ProcessId, Version};
use crate::process::Process;
use crate::snapshot::ProcessSnapshot;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// One stored snapshot: its version and its serialized JSON body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub version: Version,
    pub body: String,
}

/// Storage medium behind a [`ProcessStore`].
///
/// `update` must run the read-check-write it is given atomically with respect
/// to other calls for the same id; that is the only place the store relies
/// on the backend for arbitration.
pub trait SnapshotBackend: Send + Sync {
    fn get(&self, id: &ProcessId) -> Result<Option<StoredSnapshot>>;

    fn put(&self, id: ProcessId, record: StoredSnapshot) -> Result<()>;

    fn delete(&self, id: &ProcessId) -> Result<Option<StoredSnapshot>>;

    fn list(&self) -> Result<Vec<(ProcessId, StoredSnapshot)>>;

    /// Replace the record for `id` with the value `apply` derives from the
    /// current one and return what was written. When `apply` fails nothing
    /// is written.
    fn update(
        &self,
        id: ProcessId,
        apply: &mut dyn FnMut(Option<&StoredSnapshot>) -> Result<StoredSnapshot>,
    ) -> Result<StoredSnapshot>;

    fn len(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }
}

/// In-memory backend. Per-key updates hold the shard lock of that key only.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: DashMap<ProcessId, StoredSnapshot>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotBackend for MemoryBackend {
    fn get(&self, id: &ProcessId) -> Result<Option<StoredSnapshot>> {
        Ok(self.records.get(id).map(|record| record.value().clone()))
    }

    fn put(&self, id: ProcessId, record: StoredSnapshot) -> Result<()> {
        self.records.insert(id, record);
        Ok(())
    }

    fn delete(&self, id: &ProcessId) -> Result<Option<StoredSnapshot>> {
        Ok(self.records.remove(id).map(|(_, record)| record))
    }

    fn list(&self) -> Result<Vec<(ProcessId, StoredSnapshot)>> {
        Ok(self
            .records
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect())
    }

    fn update(
        &self,
        id: ProcessId,
        apply: &mut dyn FnMut(Option<&StoredSnapshot>) -> Result<StoredSnapshot>,
    ) -> Result<StoredSnapshot> {
        let record = match self.records.entry(id) {
            Entry::Occupied(mut entry) => {
                let record = apply(Some(entry.get()))?;
                entry.insert(record.clone());
                record
            }
            Entry::Vacant(entry) => {
                let record = apply(None)?;
                entry.insert(record.clone());
                record
            }
        };
        Ok(record)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }
}

/// Maps process id to its latest snapshot
#[derive(Debug)]
pub struct ProcessStore<B = MemoryBackend> {
    backend: B,
    version_counter: AtomicU64,
}

impl ProcessStore<MemoryBackend> {
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }
}

impl Default for ProcessStore<MemoryBackend> {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl<B: SnapshotBackend> ProcessStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            version_counter: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Fresh, independent copy of the stored process
    pub fn get(&self, id: &ProcessId) -> Result<Process> {
        let record = self
            .backend
            .get(id)?
            .ok_or_else(|| FlowError::ProcessNotFound(id.to_string()))?;
        decode(&record)
    }

    /// Fresh, independent copies of every stored process
    pub fn all(&self) -> Result<Vec<Process>> {
        self.backend
            .list()?
            .iter()
            .map(|(_, record)| decode(record))
            .collect()
    }

    /// Store the process, bumping its version.
    ///
    /// A process never stored before is written unconditionally. Otherwise
    /// the stored version must equal `process.version()`, or the call fails
    /// with `FlowError::Conflict` and changes nothing. On success the new
    /// version is written back into `process`.
    pub fn persist(&self, process: &mut Process) -> Result<Version> {
        let pid = process.id();
        let expected = process.version();
        let mut snapshot = process.export();

        let result = self.backend.update(pid, &mut |current: Option<&StoredSnapshot>| {
            if let Some(current) = current {
                if Some(current.version) != expected {
                    return Err(FlowError::Conflict {
                        pid: pid.to_string(),
                    });
                }
            }

            let floor = current.map(|record| record.version.get()).unwrap_or(0);
            let version = self.allocate_version(floor);
            snapshot.version = Some(version);
            let body = serde_json::to_string(&snapshot)?;

            Ok(StoredSnapshot { version, body })
        });

        let version = match result {
            Ok(record) => record.version,
            Err(err) => {
                if matches!(err, FlowError::Conflict { .. }) {
                    warn!(pid = %pid, expected = ?expected, "Stale process version rejected");
                }
                return Err(err);
            }
        };
        process.set_version(version);
        debug!(pid = %pid, version = %version, "Process persisted");

        Ok(version)
    }

    /// Drop a process from the store
    pub fn remove(&self, id: &ProcessId) -> Result<()> {
        self.backend
            .delete(id)?
            .map(|_| ())
            .ok_or_else(|| FlowError::ProcessNotFound(id.to_string()))
    }

    pub fn len(&self) -> Result<usize> {
        self.backend.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Strictly greater than `floor` and unique within this store
    fn allocate_version(&self, floor: u64) -> Version {
        self.version_counter.fetch_max(floor, Ordering::SeqCst);
        Version::new(self.version_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

fn decode(record: &StoredSnapshot) -> Result<Process> {
    let snapshot: ProcessSnapshot = serde_json::from_str(&record.body)?;
    Process::import(&snapshot)
}
