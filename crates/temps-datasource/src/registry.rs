use tokio::sync::RwLock;
use tracing::debug;

use crate::data_source::DataSource;

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

/// Authoritative, ordered, name-keyed set of data source snapshots.
///
/// Every write replaces one whole entry under the write lock, so readers see
/// the collection either before or after an upsert, never in between.
pub struct SourceRegistry {
    sources: RwLock<Vec<DataSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
        }
    }

    /// Registry seeded with the given sources; later duplicates of a name replace earlier ones
    pub fn with_sources(sources: impl IntoIterator<Item = DataSource>) -> Self {
        let mut seeded: Vec<DataSource> = Vec::new();
        for data_source in sources {
            upsert_into(&mut seeded, data_source);
        }
        Self {
            sources: RwLock::new(seeded),
        }
    }

    /// Replace the entry with the same name, or append a new one
    pub async fn upsert(&self, data_source: DataSource) -> Upsert {
        let mut sources = self.sources.write().await;
        let name = data_source.name.clone();
        let outcome = upsert_into(&mut sources, data_source);
        debug!("Upserted data source {} ({:?})", name, outcome);
        outcome
    }

    pub async fn find(&self, name: &str) -> Option<DataSource> {
        let sources = self.sources.read().await;
        sources.iter().find(|ds| ds.name == name).cloned()
    }

    pub async fn list_all(&self) -> Vec<DataSource> {
        self.sources.read().await.clone()
    }

    /// Queryable entries in registry order
    pub async fn list_queryable(&self) -> Vec<DataSource> {
        let sources = self.sources.read().await;
        sources.iter().filter(|ds| ds.is_queryable()).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sources.read().await.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn upsert_into(sources: &mut Vec<DataSource>, data_source: DataSource) -> Upsert {
    match sources.iter_mut().find(|ds| ds.name == data_source.name) {
        Some(existing) => {
            *existing = data_source;
            Upsert::Replaced
        }
        None => {
            sources.push(data_source);
            Upsert::Inserted
        }
    }
}
