use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::data_source::DataSource;
use crate::refresh_rule::RefreshRule;
use crate::types::EngineKind;

/// Builds a placeholder data source for a cluster name nobody configured
pub type StubFactory = Arc<dyn Fn(&str) -> DataSource + Send + Sync>;

/// Stub for a cluster source: named after it, queried for freshness every minute
pub fn default_stub_factory() -> StubFactory {
    Arc::new(|name: &str| {
        DataSource::new(name, EngineKind::Druid, name).with_refresh_rule(RefreshRule::query())
    })
}

/// What a discovery pass should do with the names the cluster reported
#[derive(Debug, Default)]
pub struct DiscoveryPlan {
    /// New stubs to insert into the registry
    pub stubs: Vec<DataSource>,
    /// Sources (existing non-queryable ones and the new stubs) to introspect
    pub to_introspect: Vec<DataSource>,
}

impl DiscoveryPlan {
    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty() && self.to_introspect.is_empty()
    }
}

/// Diff cluster-reported names against the current registry contents.
///
/// A name with no entry for its `(engine, source)` pair gets a stub; entries that
/// exist but are not queryable are scheduled for another introspection. Names
/// missing from the report are never touched.
pub fn plan_discovery(
    current: &[DataSource],
    engine: EngineKind,
    reported: &[String],
    stub_factory: &StubFactory,
) -> DiscoveryPlan {
    let mut plan = DiscoveryPlan::default();
    let mut seen = HashSet::new();
    let mut scheduled = HashSet::new();

    for name in reported {
        if !seen.insert(name.as_str()) {
            continue;
        }

        let existing: Vec<&DataSource> = current
            .iter()
            .filter(|ds| ds.engine == engine && &ds.source == name)
            .collect();

        if existing.is_empty() {
            let stub = stub_factory(name);
            if current.iter().any(|ds| ds.name == stub.name)
                || plan.stubs.iter().any(|ds| ds.name == stub.name)
            {
                warn!(
                    "Not adding {} data source '{}': the name is already taken",
                    engine, stub.name
                );
                continue;
            }
            info!("Adding {} data source: '{}'", engine, name);
            scheduled.insert(stub.name.clone());
            plan.to_introspect.push(stub.clone());
            plan.stubs.push(stub);
        } else {
            for data_source in existing {
                if !data_source.is_queryable() && scheduled.insert(data_source.name.clone()) {
                    plan.to_introspect.push(data_source.clone());
                }
            }
        }
    }

    plan
}
