//! Configuration enrichment for automations and scripts.
//!
//! One extra fetch per behavior definition, at most `concurrency` in flight.
//! A failed fetch is logged and leaves that definition without a payload;
//! it never fails the pass and is not retried until the next pass.

use hearth_db::{AutomationConfig, ScriptConfig};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::fetcher::{FetchResult, Fetcher};

/// Fetched payloads keyed by configuration id.
#[derive(Debug, Clone)]
pub struct Enrichment<C> {
    pub configs: HashMap<String, C>,
    /// Ids whose fetch failed, sorted.
    pub failed: Vec<String>,
}

impl<C> Enrichment<C> {
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Fetches full behavior-definition payloads, tolerant of per-item failure.
#[derive(Clone)]
pub struct ConfigEnricher {
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
}

impl ConfigEnricher {
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch automation configurations.
    pub async fn automation_configs(&self, config_ids: Vec<String>) -> Enrichment<AutomationConfig> {
        self.fan_out("automation", config_ids, |fetcher, id| async move {
            fetcher.get_automation_config(&id).await
        })
        .await
    }

    /// Fetch script configurations.
    pub async fn script_configs(&self, config_ids: Vec<String>) -> Enrichment<ScriptConfig> {
        self.fan_out("script", config_ids, |fetcher, id| async move {
            fetcher.get_script_config(&id).await
        })
        .await
    }

    async fn fan_out<C, F, Fut>(
        &self,
        kind: &'static str,
        mut config_ids: Vec<String>,
        fetch: F,
    ) -> Enrichment<C>
    where
        C: Send + 'static,
        F: Fn(Arc<dyn Fetcher>, String) -> Fut,
        Fut: Future<Output = FetchResult<C>> + Send + 'static,
    {
        config_ids.sort();
        config_ids.dedup();

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();

        for config_id in &config_ids {
            let semaphore = semaphore.clone();
            let call = fetch(self.fetcher.clone(), config_id.clone());
            let config_id = config_id.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (config_id, call.await)
            });
        }

        let mut configs = HashMap::with_capacity(config_ids.len());
        while let Some(join_result) = join_set.join_next().await {
            match join_result {
                Ok((config_id, Ok(config))) => {
                    configs.insert(config_id, config);
                }
                Ok((config_id, Err(e))) if e.is_unsupported() => {
                    debug!(kind, config_id = %config_id, "Configuration fetch unsupported");
                }
                Ok((config_id, Err(e))) => {
                    warn!(
                        kind,
                        config_id = %config_id,
                        error = %e,
                        "Configuration fetch failed, syncing without payload"
                    );
                }
                Err(e) => {
                    warn!(kind, error = %e, "Configuration fetch task panicked");
                }
            }
        }

        let failed = config_ids
            .into_iter()
            .filter(|id| !configs.contains_key(id))
            .collect();

        Enrichment { configs, failed }
    }
}
