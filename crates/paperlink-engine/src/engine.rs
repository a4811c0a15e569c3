use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use paperlink_core::AppConfig;

use crate::audit::{AuditFanout, AuditLog, JsonlAuditLog, TracingAuditLog};
use crate::backend::{ChatCompletionsBackend, CompletionBackend};
use crate::budget::{BudgetLimits, BudgetTracker};
use crate::cache::{CacheStore, DiskCache};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::extract::{DocumentExtractor, ExtractionClient, ExtractionSettings};
use crate::gateway::ModelGateway;
use crate::matching::{CrossLingualMatcher, MatchSettings};
use crate::retry::RetryPolicy;
use crate::translate::{LlmTranslator, OfflineTranslator, Translator};

/// Everything wired together from one configuration snapshot.
pub struct Engine {
    config: AppConfig,
    budget: Arc<BudgetTracker>,
    cache: Arc<DiskCache>,
    gateway: Option<Arc<ModelGateway>>,
}

impl Engine {
    /// `use_model = false` builds an offline engine: heuristic extraction and
    /// no translation. With a model, a missing API key is a configuration
    /// error.
    pub fn from_config(config: &AppConfig, use_model: bool) -> Result<Self> {
        let backend: Option<Arc<dyn CompletionBackend>> = if use_model {
            Some(Arc::new(ChatCompletionsBackend::from_config(config)?))
        } else {
            None
        };
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: &AppConfig, backend: Option<Arc<dyn CompletionBackend>>) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = Arc::new(DiskCache::new(
            Self::response_cache_dir(config),
            Duration::from_secs(config.extraction.cache_ttl),
            clock.clone(),
        )?);
        let budget = BudgetTracker::load(
            &config.stats_path(),
            BudgetLimits::from(&config.limits),
            clock.clone(),
        )?;

        let gateway = match backend {
            Some(backend) => {
                let audit = Self::audit_log(config)?;
                info!(model = backend.model(), "language model enabled");
                Some(Arc::new(ModelGateway::new(
                    backend,
                    cache.clone(),
                    budget.clone(),
                    audit,
                    clock,
                    RetryPolicy::from_config(config),
                )))
            }
            None => {
                debug!("running without a language model");
                None
            }
        };

        Ok(Self {
            config: config.clone(),
            budget,
            cache,
            gateway,
        })
    }

    pub fn response_cache_dir(config: &AppConfig) -> PathBuf {
        config.cache_dir().join("responses")
    }

    fn audit_log(config: &AppConfig) -> Result<Arc<dyn AuditLog>> {
        let mut sinks: Vec<Box<dyn AuditLog>> = vec![Box::new(TracingAuditLog)];
        if let Some(path) = &config.logging.audit_file {
            sinks.push(Box::new(JsonlAuditLog::open(&PathBuf::from(path))?));
        }
        Ok(Arc::new(AuditFanout::new(sinks)))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn budget(&self) -> &Arc<BudgetTracker> {
        &self.budget
    }

    pub fn cache(&self) -> Arc<dyn CacheStore> {
        self.cache.clone()
    }

    pub fn has_model(&self) -> bool {
        self.gateway.is_some()
    }

    /// Model extraction when enabled in config and a model is wired in.
    pub fn extractor(&self) -> DocumentExtractor {
        let client = self
            .gateway
            .as_ref()
            .filter(|_| self.config.extraction.enabled)
            .map(|gateway| {
                ExtractionClient::new(gateway.clone(), ExtractionSettings::from_config(&self.config))
            });
        DocumentExtractor::new(client)
    }

    pub fn translator(&self) -> Arc<dyn Translator> {
        match &self.gateway {
            Some(gateway) => Arc::new(LlmTranslator::from_config(gateway.clone(), &self.config)),
            None => Arc::new(OfflineTranslator),
        }
    }

    pub fn matcher(&self, settings: MatchSettings) -> CrossLingualMatcher {
        CrossLingualMatcher::new(self.translator(), settings)
    }

    /// Persist usage counters to `api_stats.json`.
    pub fn save_usage(&self) -> Result<()> {
        self.budget.save(&self.config.stats_path())
    }
}
