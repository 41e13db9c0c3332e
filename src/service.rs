//! Percolation service orchestration
//!
//! Wires the query registry, document materializer, match engine, and
//! evaluation pool together behind the public percolation surface. Each call
//! walks a small state machine; terminal states are final and retries belong
//! to the caller.

use crate::config::{Config, ResourceConfig};
use crate::document::DocumentMaterializer;
use crate::engine::MatchEngine;
use crate::error::{PercolateError, Result};
use crate::mapping::MappingRegistry;
use crate::metrics::{PERCOLATIONS_TOTAL, PERCOLATION_DURATION_SECONDS, REGISTERED_QUERIES};
use crate::pool::{estimate_document_memory, EvaluationPool};
use crate::registry::{Predicate, QueryRegistry};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use strum_macros::{Display, IntoStaticStr};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;
use validator::Validate;

/// Lifecycle of a single percolation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CallState {
    Received,
    Materializing,
    Queued,
    Evaluating,
    Completed,
    TimedOut,
    Rejected,
    ParseFailed,
}

impl CallState {
    /// Whether the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallState::Completed
                | CallState::TimedOut
                | CallState::Rejected
                | CallState::ParseFailed
        )
    }
}

/// A percolation request: one transient document to test against every
/// registered query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercolateRequest {
    /// Document type naming the mapping context
    pub doc_type: String,

    /// Raw JSON payload
    pub source: Vec<u8>,
}

impl PercolateRequest {
    pub fn new(doc_type: impl Into<String>, source: impl Into<Vec<u8>>) -> Self {
        Self {
            doc_type: doc_type.into(),
            source: source.into(),
        }
    }
}

/// The outcome of a completed percolation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercolateResponse {
    /// Names of the queries that matched; possibly empty, never partial
    pub matches: HashSet<String>,

    /// Call identifier, for log correlation
    pub call_id: Uuid,

    /// Number of registered queries evaluated (the snapshot size)
    pub evaluated: usize,

    /// Wall-clock duration of the call in milliseconds
    pub elapsed_ms: u64,
}

/// Point-in-time service statistics
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub in_flight: usize,
    pub completed: u64,
    pub timed_out: u64,
    pub rejected: u64,
    pub parse_failed: u64,
    pub registered_queries: usize,
    pub registry_version: u64,
    pub pool_workers: usize,
    pub used_memory_bytes: usize,
}

#[derive(Debug, Default)]
struct OutcomeCounters {
    completed: AtomicU64,
    timed_out: AtomicU64,
    rejected: AtomicU64,
    parse_failed: AtomicU64,
}

impl OutcomeCounters {
    fn record(&self, state: CallState) {
        match state {
            CallState::Completed => self.completed.fetch_add(1, Ordering::Relaxed),
            CallState::TimedOut => self.timed_out.fetch_add(1, Ordering::Relaxed),
            CallState::Rejected => self.rejected.fetch_add(1, Ordering::Relaxed),
            CallState::ParseFailed => self.parse_failed.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
    }
}

/// The percolation engine's public surface
///
/// Owns its collaborators directly; there is no runtime service locator.
/// Cheap to share behind an `Arc`.
pub struct PercolatorService {
    registry: Arc<QueryRegistry>,
    materializer: Arc<DocumentMaterializer>,
    engine: Arc<MatchEngine>,
    pool: Arc<EvaluationPool>,
    calls: Arc<DashMap<Uuid, CallState>>,
    counters: Arc<OutcomeCounters>,
}

impl PercolatorService {
    /// Build a service from validated configuration and a mapping registry
    ///
    /// Must be called inside a Tokio runtime; the evaluation pool spawns its
    /// workers immediately.
    pub fn new(config: Config, mappings: MappingRegistry) -> Result<Self> {
        config.validate()?;

        let pool = EvaluationPool::new(config.resources.clone(), config.queue_capacity);

        Ok(Self {
            registry: Arc::new(QueryRegistry::new()),
            materializer: Arc::new(DocumentMaterializer::new(mappings)),
            engine: Arc::new(MatchEngine::new()),
            pool,
            calls: Arc::new(DashMap::new()),
            counters: Arc::new(OutcomeCounters::default()),
        })
    }

    /// Register a compiled query under `name`, returning the predicate it
    /// replaced if any
    pub fn add_query(&self, name: impl Into<String>, predicate: Predicate) -> Option<Predicate> {
        let previous = self.registry.add(name, predicate);
        REGISTERED_QUERIES.set(self.registry.len() as i64);
        previous
    }

    /// Remove a query; true if something was removed
    pub fn remove_query(&self, name: &str) -> bool {
        let removed = self.registry.remove(name);
        REGISTERED_QUERIES.set(self.registry.len() as i64);
        removed
    }

    /// Remove every registered query
    pub fn clear_queries(&self) {
        self.registry.clear();
        REGISTERED_QUERIES.set(0);
    }

    /// Number of registered queries
    pub fn query_count(&self) -> usize {
        self.registry.len()
    }

    /// Evaluate one document against the current query set
    pub async fn percolate(&self, request: PercolateRequest) -> Result<PercolateResponse> {
        let call_id = Uuid::new_v4();
        let started = Instant::now();
        self.calls.insert(call_id, CallState::Received);

        // limits in effect at submission time stay with this call
        let limits = self.pool.current_config();

        let estimate = estimate_document_memory(request.source.len());
        let reservation = match self.pool.reserve_memory(estimate, limits.max_memory_bytes) {
            Ok(reservation) => reservation,
            Err(err) => return self.finish(call_id, started, CallState::Rejected, Err(err)),
        };

        self.set_state(call_id, CallState::Materializing);
        let document =
            match self
                .materializer
                .materialize(&request.doc_type, &request.source, reservation)
            {
                Ok(document) => document,
                Err(err) => return self.finish(call_id, started, CallState::ParseFailed, Err(err)),
            };

        // exactly one snapshot per call, taken at submission
        let snapshot = self.registry.snapshot();
        let evaluated = snapshot.len();

        self.set_state(call_id, CallState::Queued);
        let engine = Arc::clone(&self.engine);
        let calls = Arc::clone(&self.calls);
        let result_rx = match self.pool.submit(call_id, move || {
            if let Some(mut state) = calls.get_mut(&call_id) {
                *state = CallState::Evaluating;
            }
            engine.evaluate(&document, &snapshot)
        }) {
            Ok(result_rx) => result_rx,
            Err(err) => return self.finish(call_id, started, CallState::Rejected, Err(err)),
        };

        match self.pool.await_result(result_rx, limits.timeout()).await {
            Ok(matches) => {
                let response = PercolateResponse {
                    matches,
                    call_id,
                    evaluated,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                self.finish(call_id, started, CallState::Completed, Ok(response))
            }
            Err(err @ PercolateError::Timeout(_)) => {
                self.finish(call_id, started, CallState::TimedOut, Err(err))
            }
            Err(err) => self.finish(call_id, started, CallState::Rejected, Err(err)),
        }
    }

    /// Validate and apply a new resource configuration immediately
    pub fn apply_settings(&self, resources: ResourceConfig) -> Result<()> {
        resources.validate()?;
        self.pool.reconfigure(resources);
        Ok(())
    }

    /// Apply settings-change notifications from `settings_rx` asynchronously
    pub fn subscribe_settings(
        &self,
        settings_rx: watch::Receiver<ResourceConfig>,
    ) -> JoinHandle<()> {
        self.pool.subscribe(settings_rx)
    }

    /// The resource configuration currently in effect
    pub fn current_resources(&self) -> ResourceConfig {
        self.pool.current_config().as_ref().clone()
    }

    /// Current service statistics
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            in_flight: self.calls.len(),
            completed: self.counters.completed.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            parse_failed: self.counters.parse_failed.load(Ordering::Relaxed),
            registered_queries: self.registry.len(),
            registry_version: self.registry.version(),
            pool_workers: self.pool.worker_count(),
            used_memory_bytes: self.pool.used_memory(),
        }
    }

    /// Drain the evaluation pool and stop its workers
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    fn set_state(&self, call_id: Uuid, state: CallState) {
        self.calls.insert(call_id, state);
    }

    fn finish(
        &self,
        call_id: Uuid,
        started: Instant,
        state: CallState,
        result: Result<PercolateResponse>,
    ) -> Result<PercolateResponse> {
        debug_assert!(state.is_terminal());
        self.calls.remove(&call_id);
        self.counters.record(state);

        let label: &'static str = state.into();
        PERCOLATIONS_TOTAL.with_label_values(&[label]).inc();
        PERCOLATION_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(response) => tracing::debug!(
                call_id = %call_id,
                matches = response.matches.len(),
                evaluated = response.evaluated,
                elapsed_ms = response.elapsed_ms,
                "Percolation completed"
            ),
            Err(err) => tracing::warn!(
                call_id = %call_id,
                outcome = %state,
                error = %err,
                "Percolation call failed"
            ),
        }

        result
    }
}
