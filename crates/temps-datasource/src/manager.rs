//! Startup sequencing, the public read API and the background refresh loops.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ManagerSettings, SourceListScan};
use crate::data_source::DataSource;
use crate::discovery::{default_stub_factory, plan_discovery, StubFactory};
use crate::error::{DataSourceError, Result};
use crate::freshness::FreshnessTracker;
use crate::registry::SourceRegistry;
use crate::settle::{settle_all, Settled};
use crate::traits::{Introspector, SourceLister};

/// Everything the manager needs to start
pub struct DataSourceManagerOptions {
    pub data_sources: Vec<DataSource>,
    pub introspector: Arc<dyn Introspector>,
    pub source_lister: Option<Arc<dyn SourceLister>>,
    pub stub_factory: Option<StubFactory>,
    pub settings: ManagerSettings,
}

impl DataSourceManagerOptions {
    pub fn new(introspector: Arc<dyn Introspector>) -> Self {
        Self {
            data_sources: Vec::new(),
            introspector,
            source_lister: None,
            stub_factory: None,
            settings: ManagerSettings::default(),
        }
    }

    pub fn with_data_sources(mut self, data_sources: Vec<DataSource>) -> Self {
        self.data_sources = data_sources;
        self
    }

    pub fn with_source_lister(mut self, source_lister: Arc<dyn SourceLister>) -> Self {
        self.source_lister = Some(source_lister);
        self
    }

    pub fn with_stub_factory(mut self, stub_factory: StubFactory) -> Self {
        self.stub_factory = Some(stub_factory);
        self
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// State shared between the manager and its background tasks
struct ManagerCore {
    registry: Arc<SourceRegistry>,
    introspector: Arc<dyn Introspector>,
    source_lister: Option<Arc<dyn SourceLister>>,
    stub_factory: StubFactory,
}

impl ManagerCore {
    /// Introspect one source and merge the result.
    ///
    /// Returns whether the merged snapshot is queryable. Only configuration
    /// errors are returned; every other failure is logged and leaves the
    /// registry untouched.
    async fn introspect_data_source(self: Arc<Self>, data_source: DataSource) -> Result<bool> {
        let name = data_source.name.clone();
        match self.introspector.introspect(data_source).await {
            Ok(introspected) => {
                let queryable = introspected.is_queryable();
                self.registry.upsert(introspected).await;
                Ok(queryable)
            }
            Err(e) if e.is_fatal() => {
                error!("Cannot introspect data source '{}': {}", name, e);
                Err(e)
            }
            Err(e) => {
                warn!("Failed to introspect data source: '{}' because {}", name, e);
                Ok(false)
            }
        }
    }

    /// One discovery pass against the cluster. Best effort: never fails.
    async fn load_cluster_sources(self: Arc<Self>) {
        let Some(lister) = self.source_lister.clone() else {
            return;
        };

        let reported = match lister.list_sources().await {
            Ok(reported) => reported,
            Err(e) => {
                warn!("Could not get {} source list: '{}'", lister.engine(), e);
                return;
            }
        };
        debug!("{} cluster reported {} sources", lister.engine(), reported.len());

        let current = self.registry.list_all().await;
        let plan = plan_discovery(&current, lister.engine(), &reported, &self.stub_factory);
        if plan.is_empty() {
            return;
        }

        for stub in plan.stubs {
            self.registry.upsert(stub).await;
        }

        let tasks = plan
            .to_introspect
            .into_iter()
            .map(|data_source| self.clone().introspect_data_source(data_source));
        for outcome in settle_all(tasks).await {
            if let Settled::Aborted(e) = outcome {
                error!("Introspection task aborted: {}", e);
            }
        }
    }

    async fn find_queryable(&self, name: &str) -> Option<DataSource> {
        self.registry.find(name).await.filter(|ds| ds.is_queryable())
    }
}

/// Owns the data source registry and keeps it up to date.
///
/// Construction starts introspection of every configured source (and a
/// discovery pass when enabled) in the background. Reads wait for that initial
/// load to settle. Dropping the manager stops its background loops.
pub struct DataSourceManager {
    core: Arc<ManagerCore>,
    settings: ManagerSettings,
    initial_load: Shared<BoxFuture<'static, ()>>,
    shutdown: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl DataSourceManager {
    /// Validate the options and start loading. Must be called inside a tokio runtime.
    pub fn start(options: DataSourceManagerOptions) -> Result<Self> {
        let DataSourceManagerOptions {
            data_sources,
            introspector,
            source_lister,
            stub_factory,
            settings,
        } = options;

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(DataSourceError::configuration(
                "data source manager must be started inside a tokio runtime",
            ));
        }
        settings.validate()?;

        let mut names = HashSet::new();
        for data_source in &data_sources {
            if !names.insert(data_source.name.as_str()) {
                return Err(DataSourceError::configuration(format!(
                    "duplicate data source name '{}'",
                    data_source.name
                )));
            }
            introspector.validate(data_source)?;
        }

        let core = Arc::new(ManagerCore {
            registry: Arc::new(SourceRegistry::with_sources(data_sources.clone())),
            introspector,
            source_lister,
            stub_factory: stub_factory.unwrap_or_else(default_stub_factory),
        });

        let scan_enabled =
            settings.source_list_scan == SourceListScan::Auto && core.source_lister.is_some();

        let mut initial_tasks: Vec<BoxFuture<'static, Result<()>>> = data_sources
            .into_iter()
            .map(|data_source| {
                core.clone()
                    .introspect_data_source(data_source)
                    .map(|result| result.map(|_| ()))
                    .boxed()
            })
            .collect();
        if scan_enabled {
            let core = core.clone();
            initial_tasks.push(
                async move {
                    core.load_cluster_sources().await;
                    Ok(())
                }
                .boxed(),
            );
        }

        let registry = core.registry.clone();
        let initial_load = async move {
            for outcome in settle_all(initial_tasks).await {
                match outcome {
                    Settled::Rejected(e) => error!("Initial load task failed: {}", e),
                    Settled::Aborted(e) => error!("Initial load task aborted: {}", e),
                    Settled::Fulfilled(()) => {}
                }
            }
            let total = registry.len().await;
            let queryable = registry.list_queryable().await.len();
            info!(
                "Initial introspection complete. Got {} data sources, {} queryable",
                total, queryable
            );
        }
        .boxed()
        .shared();

        // Detached: readers drive the shared future too, and shutdown must not wait on it
        tokio::spawn(initial_load.clone());

        let shutdown = CancellationToken::new();
        let mut background = Vec::new();

        if scan_enabled {
            if let Some(period) = settings.source_list_refresh_interval() {
                info!("Will refresh data sources every {}ms", period.as_millis());
                background.push(tokio::spawn(run_discovery_loop(
                    core.clone(),
                    period,
                    shutdown.child_token(),
                )));
            }
        }

        background.push(tokio::spawn(
            FreshnessTracker::new(core.registry.clone())
                .run(settings.max_time_check_interval(), shutdown.child_token()),
        ));

        Ok(Self {
            core,
            settings,
            initial_load,
            shutdown,
            background: Mutex::new(background),
        })
    }

    /// Resolves once every startup task has finished, successfully or not
    pub async fn wait_for_initial_load(&self) {
        self.initial_load.clone().await
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.core.registry
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// All known data sources, queryable or not
    pub async fn get_data_sources(&self) -> Vec<DataSource> {
        self.wait_for_initial_load().await;

        let registry = &self.core.registry;
        if !registry.is_empty().await && !self.settings.source_list_refresh_on_load {
            return registry.list_all().await;
        }

        // Nothing loaded yet, try the cluster once and return whatever we have
        self.core.clone().load_cluster_sources().await;
        registry.list_all().await
    }

    /// Data sources that have an executor attached
    pub async fn get_queryable_data_sources(&self) -> Vec<DataSource> {
        self.wait_for_initial_load().await;

        let registry = &self.core.registry;
        let queryable = registry.list_queryable().await;
        if !queryable.is_empty() && !self.settings.source_list_refresh_on_load {
            return queryable;
        }

        self.core.clone().load_cluster_sources().await;
        registry.list_queryable().await
    }

    /// A queryable data source by name.
    ///
    /// A known but unqueryable source is introspected once more; an unknown name
    /// triggers one discovery pass. `Ok(None)` when it is still not queryable.
    /// Errors only on misconfiguration.
    pub async fn get_queryable_data_source(&self, name: &str) -> Result<Option<DataSource>> {
        self.wait_for_initial_load().await;

        if let Some(data_source) = self.core.registry.find(name).await {
            if data_source.is_queryable() {
                return Ok(Some(data_source));
            }

            self.core.clone().introspect_data_source(data_source).await?;
            return Ok(self.core.find_queryable(name).await);
        }

        self.core.clone().load_cluster_sources().await;
        Ok(self.core.find_queryable(name).await)
    }

    /// Stop the background loops and wait for them to exit
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles = std::mem::take(&mut *self.background.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        info!("Data source manager stopped");
    }
}

impl fmt::Debug for DataSourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceManager")
            .field("settings", &self.settings)
            .field("discovery", &self.core.source_lister.is_some())
            .field("cancelled", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl Drop for DataSourceManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_discovery_loop(core: Arc<ManagerCore>, period: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = async {
                interval.tick().await;
                core.clone().load_cluster_sources().await;
            } => {}
            _ = shutdown.cancelled() => {
                debug!("Source list refresh received cancellation signal");
                return;
            }
        }
    }
}
