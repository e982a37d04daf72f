//! Worker pool
//!
//! One worker task per [`ExecutionContext`] pops units from a shared queue
//! until it is empty. The queue is the only concurrency limit: a context
//! runs one unit at a time, and each unit is popped exactly once.

use dashmap::DashMap;
use futures::FutureExt;
use integ_suite::TestUnit;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use ulid::Ulid;

/// Region and profile a worker deploys to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Target region
    pub region: String,
    /// Credentials profile
    pub profile: Option<String>,
}

impl ExecutionContext {
    /// Create new context
    #[inline]
    #[must_use]
    pub fn new(region: impl Into<String>, profile: Option<String>) -> Self {
        Self {
            region: region.into(),
            profile,
        }
    }
}

impl Display for ExecutionContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.profile {
            Some(profile) => write!(f, "{profile}/{}", self.region),
            None => write!(f, "default/{}", self.region),
        }
    }
}

/// One context per region and profile pair, or per region without profiles
#[must_use]
pub fn execution_contexts(regions: &[String], profiles: &[String]) -> Vec<ExecutionContext> {
    if profiles.is_empty() {
        return regions
            .iter()
            .map(|r| ExecutionContext::new(r.clone(), None))
            .collect();
    }
    regions
        .iter()
        .flat_map(|r| {
            profiles
                .iter()
                .map(move |p| ExecutionContext::new(r.clone(), Some(p.clone())))
        })
        .collect()
}

/// Worker identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Ulid);

impl WorkerId {
    /// Create new worker id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared queue of units
#[derive(Debug)]
pub struct UnitQueue {
    units: Mutex<Vec<TestUnit>>,
}

impl UnitQueue {
    /// Create new queue; units are popped in the given order
    #[must_use]
    pub fn new(mut units: Vec<TestUnit>) -> Self {
        units.reverse();
        Self {
            units: Mutex::new(units),
        }
    }

    /// Take the next unit
    pub fn pop(&self) -> Option<TestUnit> {
        self.units.lock().pop()
    }

    /// Units still queued
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.lock().len()
    }

    /// Whether the queue is drained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Timing of one context
#[derive(Debug, Clone, PartialEq)]
pub struct ContextMetrics {
    /// Worker that served the context
    pub worker_id: WorkerId,
    /// The context
    pub context: ExecutionContext,
    /// Wall time of the worker
    pub total: Duration,
    /// Wall time per unit, by test name
    pub units: BTreeMap<String, Duration>,
}

/// Results and metrics of a drained queue
#[derive(Debug)]
pub struct PoolReport<R> {
    /// Job results, in completion order per worker
    pub results: Vec<R>,
    /// Metrics per context
    pub metrics: Vec<ContextMetrics>,
    /// Worker each unit was assigned to
    pub assignments: BTreeMap<String, WorkerId>,
}

impl<R> Default for PoolReport<R> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            metrics: Vec::new(),
            assignments: BTreeMap::new(),
        }
    }
}

/// Pool of execution contexts
#[derive(Debug, Clone)]
pub struct WorkerPool {
    contexts: Vec<ExecutionContext>,
}

impl WorkerPool {
    /// Create new pool over `contexts`
    #[inline]
    #[must_use]
    pub fn new(contexts: Vec<ExecutionContext>) -> Self {
        Self { contexts }
    }

    /// Pool of `size` contexts that never deploy
    #[must_use]
    pub fn local(size: usize) -> Self {
        let context = ExecutionContext::new(crate::context::DUMMY_REGION, None);
        Self::new(vec![context; size.max(1)])
    }

    /// Contexts of this pool
    #[inline]
    #[must_use]
    pub fn contexts(&self) -> &[ExecutionContext] {
        &self.contexts
    }

    /// Run `job` on every unit
    ///
    /// A job that panics yields `recover(context, unit, message)` for its unit;
    /// the worker carries on with the rest of the queue.
    pub async fn drain<F, Fut, R, P>(&self, units: Vec<TestUnit>, job: F, recover: P) -> PoolReport<R>
    where
        F: Fn(ExecutionContext, TestUnit) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
        P: Fn(ExecutionContext, TestUnit, String) -> R + Send + Sync + 'static,
    {
        let queue = Arc::new(UnitQueue::new(units));
        let assignments: Arc<DashMap<String, WorkerId>> = Arc::new(DashMap::new());
        let job = Arc::new(job);
        let recover = Arc::new(recover);

        let handles: Vec<_> = self
            .contexts
            .iter()
            .cloned()
            .map(|context| {
                let queue = Arc::clone(&queue);
                let assignments = Arc::clone(&assignments);
                let job = Arc::clone(&job);
                let recover = Arc::clone(&recover);
                tokio::spawn(async move {
                    let worker_id = WorkerId::new();
                    let started = Instant::now();
                    let mut units = BTreeMap::new();
                    let mut results = Vec::new();

                    while let Some(unit) = queue.pop() {
                        let name = unit.normalized_test_name().to_string();
                        assignments.insert(name.clone(), worker_id);
                        tracing::debug!(worker = %worker_id, %context, test = %name, "unit assigned");

                        let unit_started = Instant::now();
                        let run = AssertUnwindSafe(job(context.clone(), unit.clone()));
                        match run.catch_unwind().await {
                            Ok(result) => results.push(result),
                            Err(payload) => {
                                let message = panic_message(payload.as_ref());
                                tracing::error!(worker = %worker_id, %context, test = %name, %message, "job panicked");
                                metrics::counter!("integ_unit_panics_total").increment(1);
                                results.push(recover(context.clone(), unit, message));
                            }
                        }
                        let elapsed = unit_started.elapsed();

                        metrics::histogram!(
                            "integ_unit_duration_seconds",
                            "region" => context.region.clone()
                        )
                        .record(elapsed.as_secs_f64());
                        metrics::counter!("integ_units_processed_total").increment(1);
                        units.insert(name, elapsed);
                    }

                    let metrics = ContextMetrics {
                        worker_id,
                        context,
                        total: started.elapsed(),
                        units,
                    };
                    (metrics, results)
                })
            })
            .collect();

        let mut report = PoolReport::default();
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok((metrics, results)) => {
                    report.metrics.push(metrics);
                    report.results.extend(results);
                }
                Err(e) => tracing::error!(error = %e, "worker task failed"),
            }
        }
        report.assignments = assignments
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "job panicked".to_string()
    }
}
