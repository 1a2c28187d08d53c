// Session state - the four stores plus the single ingestion point for frames
use crate::application::series_catalog::SeriesCatalog;
use crate::application::snapshot_store::{MapStore, StatusStore};
use crate::application::time_series_store::{TimeSeriesStore, DEFAULT_CAPACITY};
use crate::domain::telemetry::DataPoint;
use crate::infrastructure::protocol::{DataMessage, InboundMessage};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// What a frame did to the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Catalog { added: bool },
    Data { appended: usize },
    Map { accepted: bool },
    Status,
    Ignored,
}

#[derive(Debug)]
pub struct SessionState {
    catalog: SeriesCatalog,
    series: TimeSeriesStore,
    map: MapStore,
    status: StatusStore,
    connected: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            catalog: SeriesCatalog::new(),
            series: TimeSeriesStore::with_capacity(capacity),
            map: MapStore::new(),
            status: StatusStore::new(),
            connected: false,
        }
    }

    /// Routes one decoded frame to its store. Real and synthesized frames both come through here.
    pub fn apply(&mut self, message: InboundMessage) -> Applied {
        match message {
            InboundMessage::Metadata(meta) => Applied::Catalog {
                added: self.catalog.merge(&meta.available_series),
            },
            InboundMessage::Data(data) => Applied::Data {
                appended: self.apply_data(data),
            },
            InboundMessage::Map(map) => match self.map.update(map.into_snapshot()) {
                Ok(()) => Applied::Map { accepted: true },
                Err(err) => {
                    tracing::debug!("Dropping map frame: {}", err);
                    Applied::Map { accepted: false }
                }
            },
            InboundMessage::Status(status) => {
                self.status.update(status.into_snapshot());
                Applied::Status
            }
            InboundMessage::Unknown => Applied::Ignored,
        }
    }

    fn apply_data(&mut self, data: DataMessage) -> usize {
        let valid: Vec<(String, f64)> = data
            .series
            .into_iter()
            .filter(|(_, value)| value.is_finite())
            .collect();
        if valid.is_empty() {
            tracing::debug!("Dropping data frame at {} with no finite values", data.timestamp);
            return 0;
        }

        self.catalog.merge(valid.iter().map(|(key, _)| key));
        for (key, value) in &valid {
            self.series.append(key, DataPoint::new(data.timestamp, *value));
        }
        valid.len()
    }

    pub fn set_link_up(&mut self) {
        self.connected = true;
        self.status.set_link_up();
    }

    pub fn set_link_down(&mut self) {
        self.connected = false;
        self.status.set_link_down();
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn catalog(&self) -> &SeriesCatalog {
        &self.catalog
    }

    pub fn series(&self) -> &TimeSeriesStore {
        &self.series
    }

    pub fn map(&self) -> &MapStore {
        &self.map
    }

    pub fn status(&self) -> &StatusStore {
        &self.status
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to the session. The connection supervisor is the only writer.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<SessionState>>,
}

impl SessionHandle {
    pub fn new(state: SessionState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    // A panic while holding the lock cannot leave a store half-written, so
    // poisoning is ignored.
    pub fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
