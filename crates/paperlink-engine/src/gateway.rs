use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::audit::{AuditEntry, AuditLog, AuditOutcome};
use crate::backend::{Completion, CompletionBackend, CompletionRequest};
use crate::budget::BudgetTracker;
use crate::cache::CacheStore;
use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::fingerprint::Fingerprint;
use crate::retry::{RetryPolicy, retry_with_backoff};

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub completion: Completion,
    pub from_cache: bool,
    /// Model attempts spent producing this response; 0 for cache hits.
    pub attempts: u32,
}

#[derive(Debug, Clone)]
enum FlightError {
    Quota(String),
    Failed { attempts: u32, reason: String },
}

type FlightResult = std::result::Result<GatewayResponse, FlightError>;

/// Cache, budget, retry and audit in front of a [`CompletionBackend`].
///
/// Concurrent calls with the same fingerprint share one upstream request.
pub struct ModelGateway {
    backend: Arc<dyn CompletionBackend>,
    cache: Arc<dyn CacheStore>,
    budget: Arc<BudgetTracker>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    in_flight: Mutex<HashMap<Fingerprint, Arc<OnceCell<FlightResult>>>>,
}

impl ModelGateway {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        cache: Arc<dyn CacheStore>,
        budget: Arc<BudgetTracker>,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            cache,
            budget,
            audit,
            clock,
            retry,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub fn budget(&self) -> &Arc<BudgetTracker> {
        &self.budget
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Answer `request` from cache, or from the model within budget.
    ///
    /// Errors: [`EngineError::QuotaExceeded`] when the budget denies the
    /// call, [`EngineError::ExtractionFailed`] when every attempt failed.
    pub async fn complete(
        &self,
        fingerprint: &Fingerprint,
        request: &CompletionRequest,
    ) -> Result<GatewayResponse> {
        if let Some(hit) = self.lookup(fingerprint).await {
            return Ok(hit);
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                in_flight
                    .entry(fingerprint.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let mut led = false;
        let result = cell
            .get_or_init(|| {
                led = true;
                self.dispatch(fingerprint, request)
            })
            .await
            .clone();

        if led {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if in_flight
                .get(fingerprint)
                .is_some_and(|current| Arc::ptr_eq(current, &cell))
            {
                in_flight.remove(fingerprint);
            }
        } else {
            debug!(fingerprint = fingerprint.short(), "joined in-flight request");
        }

        result.map_err(|e| match e {
            FlightError::Quota(reason) => EngineError::QuotaExceeded(reason),
            FlightError::Failed { attempts, reason } => EngineError::ExtractionFailed {
                fingerprint: fingerprint.to_string(),
                attempts,
                reason,
            },
        })
    }

    async fn lookup(&self, fingerprint: &Fingerprint) -> Option<GatewayResponse> {
        let payload = self.cache.get(fingerprint).await?;
        match serde_json::from_value::<Completion>(payload) {
            Ok(completion) => {
                debug!(fingerprint = fingerprint.short(), "cache hit");
                Some(GatewayResponse {
                    completion,
                    from_cache: true,
                    attempts: 0,
                })
            }
            Err(e) => {
                warn!(fingerprint = fingerprint.short(), error = %e, "dropping incompatible cache entry");
                self.cache.invalidate(fingerprint).await;
                None
            }
        }
    }

    async fn dispatch(&self, fingerprint: &Fingerprint, request: &CompletionRequest) -> FlightResult {
        // A flight for this key may have finished between our miss and now.
        if let Some(hit) = self.lookup(fingerprint).await {
            return Ok(hit);
        }

        let estimate = self
            .budget
            .estimate_cost(request.prompt_token_bound(), request.max_tokens);
        let reservation = match self.budget.reserve(estimate) {
            Ok(reservation) => reservation,
            Err(denial) => {
                let reason = denial.to_string();
                warn!(fingerprint = fingerprint.short(), %reason, "model call skipped");
                self.audit(fingerprint, request, 0, 0, 0, 0.0, AuditOutcome::QuotaDenied {
                    reason: reason.clone(),
                });
                return Err(FlightError::Quota(reason));
            }
        };

        let started = Instant::now();
        let result = retry_with_backoff(&self.retry, |_| self.backend.complete(request)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok((completion, attempts)) => {
                let cost = self.budget.cost_for_tokens(completion.total_tokens);
                reservation.commit(cost, completion.total_tokens);

                match serde_json::to_value(&completion) {
                    Ok(payload) => {
                        if let Err(e) = self.cache.put(fingerprint, payload).await {
                            warn!(fingerprint = fingerprint.short(), error = %e, "failed to cache response");
                        }
                    }
                    Err(e) => warn!(error = %e, "response not serializable"),
                }

                self.audit(
                    fingerprint,
                    request,
                    attempts,
                    latency_ms,
                    completion.total_tokens,
                    cost,
                    AuditOutcome::Success,
                );
                Ok(GatewayResponse {
                    completion,
                    from_cache: false,
                    attempts,
                })
            }
            Err(failure) => {
                reservation.release();
                warn!(
                    fingerprint = fingerprint.short(),
                    attempts = failure.attempts,
                    reason = %failure.reason,
                    "model call failed"
                );
                self.audit(
                    fingerprint,
                    request,
                    failure.attempts,
                    latency_ms,
                    0,
                    0.0,
                    AuditOutcome::Failed {
                        reason: failure.reason.clone(),
                    },
                );
                Err(FlightError::Failed {
                    attempts: failure.attempts,
                    reason: failure.reason,
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn audit(
        &self,
        fingerprint: &Fingerprint,
        request: &CompletionRequest,
        attempts: u32,
        latency_ms: u64,
        tokens: u64,
        cost: f64,
        outcome: AuditOutcome,
    ) {
        self.audit.record(&AuditEntry {
            timestamp: self.clock.now(),
            kind: request.kind,
            fingerprint: fingerprint.to_string(),
            model: self.backend.model().to_string(),
            prompt_chars: request.prompt_chars(),
            attempts,
            latency_ms,
            tokens,
            cost,
            outcome,
        });
    }
}
