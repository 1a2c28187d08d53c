// Snapshot stores - replace-on-write holders for the map and system status
use crate::domain::telemetry::{MapSnapshot, SystemStatusSnapshot};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("grid has {actual} cells but {width}x{height} needs {expected:?}")]
    GridLengthMismatch {
        width: usize,
        height: usize,
        expected: Option<usize>,
        actual: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct MapStore {
    current: MapSnapshot,
    revision: u64,
}

impl MapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot. A grid whose length disagrees with its dimensions
    /// is rejected and the previous snapshot stays in place.
    pub fn update(&mut self, snapshot: MapSnapshot) -> Result<(), SnapshotError> {
        if !snapshot.is_consistent() {
            return Err(SnapshotError::GridLengthMismatch {
                width: snapshot.width,
                height: snapshot.height,
                expected: snapshot.expected_len(),
                actual: snapshot.grid.len(),
            });
        }
        self.current = snapshot;
        self.revision += 1;
        Ok(())
    }

    pub fn current(&self) -> &MapSnapshot {
        &self.current
    }

    /// Bumped on every accepted snapshot; 0 means still the initial grid.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    current: SystemStatusSnapshot,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, snapshot: SystemStatusSnapshot) {
        self.current = snapshot;
    }

    pub fn set_link_up(&mut self) {
        self.current.backend_connected = true;
    }

    /// Losing the socket also invalidates the backend's shared-memory flag.
    pub fn set_link_down(&mut self) {
        self.current.backend_connected = false;
        self.current.shm_active = false;
    }

    pub fn current(&self) -> &SystemStatusSnapshot {
        &self.current
    }
}
