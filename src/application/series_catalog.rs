// Series catalog - every key observed during the session
use crate::domain::telemetry::SeriesKey;
use std::collections::BTreeSet;
use tokio::sync::watch;

#[derive(Debug)]
pub struct SeriesCatalog {
    known: BTreeSet<SeriesKey>,
    notifier: watch::Sender<Vec<SeriesKey>>,
}

impl SeriesCatalog {
    pub fn new() -> Self {
        let (notifier, _) = watch::channel(Vec::new());
        Self {
            known: BTreeSet::new(),
            notifier,
        }
    }

    /// Adds any unseen keys. Subscribers are only woken when the set grew.
    pub fn merge<I, S>(&mut self, keys: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dirty = false;
        for key in keys {
            let key = key.as_ref();
            if !self.known.contains(key) {
                self.known.insert(key.to_string());
                dirty = true;
            }
        }
        if dirty {
            tracing::debug!("Series catalog grew to {} keys", self.known.len());
            self.notifier.send_replace(self.keys());
        }
        dirty
    }

    /// Sorted snapshot of the known keys.
    pub fn keys(&self) -> Vec<SeriesKey> {
        self.known.iter().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.known.contains(key)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<SeriesKey>> {
        self.notifier.subscribe()
    }
}

impl Default for SeriesCatalog {
    fn default() -> Self {
        Self::new()
    }
}
