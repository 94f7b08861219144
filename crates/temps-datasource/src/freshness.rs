//! Max time ("freshness") probing for sources with a `query` refresh rule.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::data_source::DataSource;
use crate::error::{DataSourceError, Result};
use crate::refresh_rule::MaxTime;
use crate::registry::SourceRegistry;
use crate::settle::{settle_all, SettleSummary, Settled};

pub const DEFAULT_MAX_TIME_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Query the source for its latest data time if a check is due.
///
/// Sources that are not due come back unchanged. A query that returns no value
/// also leaves the snapshot unchanged.
pub async fn update_max_time(data_source: DataSource) -> Result<DataSource> {
    let now = Utc::now();
    if !data_source.should_query_max_time(now) {
        return Ok(data_source);
    }

    let (Some(executor), Some(time_attribute)) =
        (data_source.executor().cloned(), data_source.time_attribute.clone())
    else {
        return Ok(data_source);
    };

    let latest = executor
        .max_time(&time_attribute)
        .await
        .map_err(|e| DataSourceError::max_time_check(&data_source.name, e))?;

    match latest {
        Some(time) => Ok(data_source.change_max_time(MaxTime::new(time, Utc::now()))),
        None => {
            debug!("No max time available for '{}'", data_source.name);
            Ok(data_source)
        }
    }
}

/// Check right after introspection so a new source has a max time before the
/// next tick. Failures are logged and the source is returned unchecked.
pub async fn check_after_introspection(data_source: DataSource) -> DataSource {
    if !data_source.refresh_rule.is_query() {
        return data_source;
    }

    let fallback = data_source.clone();
    match update_max_time(data_source).await {
        Ok(updated) => updated,
        Err(e) => {
            warn!("{}", e);
            fallback
        }
    }
}

/// Periodically refreshes max times of registered sources
pub struct FreshnessTracker {
    registry: Arc<SourceRegistry>,
}

impl FreshnessTracker {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self { registry }
    }

    /// Check every due source once and merge the successful results.
    ///
    /// Each check is its own failure domain; the tick finishes when all of them have.
    pub async fn tick(&self) -> SettleSummary {
        let now = Utc::now();
        let due: Vec<DataSource> = self
            .registry
            .list_all()
            .await
            .into_iter()
            .filter(|ds| ds.should_query_max_time(now))
            .collect();

        if due.is_empty() {
            return SettleSummary::default();
        }

        let tasks = due.into_iter().map(|data_source| {
            let registry = self.registry.clone();
            async move {
                let updated = update_max_time(data_source).await?;
                info!("Getting the latest MaxTime for '{}'", updated.name);
                registry.upsert(updated).await;
                Ok::<_, DataSourceError>(())
            }
        });

        let outcomes = settle_all(tasks).await;
        for outcome in &outcomes {
            match outcome {
                Settled::Rejected(e) => warn!("{}", e),
                Settled::Aborted(e) => warn!("Max time check aborted: {}", e),
                Settled::Fulfilled(_) => {}
            }
        }
        SettleSummary::of(&outcomes)
    }

    /// Tick every `period` until cancelled
    pub async fn run(self, period: Duration, shutdown: CancellationToken) {
        debug!("Starting max time refresh every {:?}", period);
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // An in-flight tick is dropped on cancellation; spawned max time queries finish on their own
            tokio::select! {
                _ = async {
                    interval.tick().await;
                    self.tick().await;
                } => {}
                _ = shutdown.cancelled() => {
                    debug!("Max time refresh received cancellation signal");
                    return;
                }
            }
        }
    }
}
