//! Fakes shared by the unit tests of this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::data_source::DataSource;
use crate::error::{DataSourceError, Result};
use crate::traits::{Executor, Introspector};
use crate::types::{AttributeInfo, EngineKind, FieldType};

/// Executor answering max time queries from a fixed value
pub struct StaticExecutor {
    engine: EngineKind,
    attributes: Vec<AttributeInfo>,
    answer: Mutex<std::result::Result<Option<DateTime<Utc>>, String>>,
    delay: Option<Duration>,
    checks: AtomicUsize,
}

impl StaticExecutor {
    fn with_answer(
        engine: EngineKind,
        answer: std::result::Result<Option<DateTime<Utc>>, String>,
    ) -> Self {
        Self {
            engine,
            attributes: vec![AttributeInfo::new("time", FieldType::Timestamp)],
            answer: Mutex::new(answer),
            delay: None,
            checks: AtomicUsize::new(0),
        }
    }

    pub fn empty(engine: EngineKind) -> Self {
        Self::with_answer(engine, Ok(None))
    }

    pub fn returning(engine: EngineKind, time: DateTime<Utc>) -> Self {
        Self::with_answer(engine, Ok(Some(time)))
    }

    /// Answers with `time` after sleeping for `delay`
    pub fn delayed(engine: EngineKind, time: DateTime<Utc>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::returning(engine, time)
        }
    }

    pub fn failing(engine: EngineKind, message: &str) -> Self {
        Self::with_answer(engine, Err(message.to_string()))
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for StaticExecutor {
    fn engine(&self) -> EngineKind {
        self.engine
    }

    fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    async fn max_time(&self, _time_attribute: &str) -> Result<Option<DateTime<Utc>>> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answer
            .lock()
            .unwrap()
            .clone()
            .map_err(DataSourceError::QueryFailed)
    }
}

/// What the scripted introspector does for one source name
#[derive(Clone)]
pub enum Script {
    /// Attach an executor whose max time queries return the given time
    Succeed(Option<DateTime<Utc>>),
    Fail(String),
    Misconfigured(String),
    /// Sleep, then attach an executor
    Slow(Duration),
}

/// Introspector whose outcome per source name is set by the test
#[derive(Default)]
pub struct ScriptedIntrospector {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, name: &str, script: Script) -> Self {
        self.set(name, script);
        self
    }

    pub fn set(&self, name: &str, script: Script) {
        self.scripts.lock().unwrap().insert(name.to_string(), script);
    }

    pub fn calls_for(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|n| *n == name).count()
    }
}

#[async_trait]
impl Introspector for ScriptedIntrospector {
    fn validate(&self, data_source: &DataSource) -> Result<()> {
        match self.scripts.lock().unwrap().get(&data_source.name) {
            Some(Script::Misconfigured(message)) => {
                Err(DataSourceError::configuration(message.clone()))
            }
            _ => Ok(()),
        }
    }

    async fn introspect(&self, data_source: DataSource) -> Result<DataSource> {
        self.calls.lock().unwrap().push(data_source.name.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&data_source.name)
            .cloned()
            .unwrap_or(Script::Fail("no script".to_string()));

        let answer = match script {
            Script::Succeed(answer) => answer,
            Script::Fail(cause) => {
                return Err(DataSourceError::introspection(&data_source.name, cause))
            }
            Script::Misconfigured(message) => return Err(DataSourceError::configuration(message)),
            Script::Slow(delay) => {
                tokio::time::sleep(delay).await;
                None
            }
        };

        let executor: Arc<dyn Executor> = match answer {
            Some(time) => Arc::new(StaticExecutor::returning(data_source.engine, time)),
            None => Arc::new(StaticExecutor::empty(data_source.engine)),
        };
        let attributes = executor.attributes().to_vec();
        Ok(data_source.add_attributes(attributes).attach_executor(executor))
    }
}
