//! Reconciliation orchestrator.
//!
//! Sequences one pass over the remote controller's resource graph:
//!
//! 1. Persist a `running` run record.
//! 2. List every resource (fatal on failure).
//! 3. Reconcile locations, then devices, from the registries when the remote
//!    side has them and by inference otherwise.
//! 4. Reconcile entities, mapping location/device references through the
//!    ids written in step 3. Delta passes skip records that are current.
//! 5. Enrich and reconcile automations, scripts and scenes concurrently.
//! 6. Mark the run `completed`.
//!
//! A fetch or store failure marks the run `failed` and is returned to the
//! caller. Enrichment failures and missing registries only show up as
//! counters and capability gaps.

use chrono::{DateTime, Utc};
use hearth_db::{
    validate_external_id, Automation, AutomationFields, CapabilityGap, Device, DeviceFields,
    Entity, EntityFields, Location, LocationFields, RecordKind, Scene, SceneFields,
    Script, ScriptFields, SyncMode, SyncRecord, SyncRun, SyncStores, SyncTrigger,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::delta::DeltaPolicy;
use crate::enricher::ConfigEnricher;
use crate::error::{SyncError, SyncResult};
use crate::fetcher::{DeviceRecord, FetchError, Fetcher, LocationRecord, Resource, ResourceKind};
use crate::inference::RelationshipInferer;
use crate::statistics::StatisticsTracker;
use crate::upsert::{BatchOutcome, UpsertStore};

/// Internal ids of the locations and devices written in this pass.
#[derive(Debug, Default)]
struct ResolvedGraph {
    locations: HashMap<String, Uuid>,
    devices: HashMap<String, Uuid>,
    /// Device internal id → its location's internal id.
    device_locations: HashMap<Uuid, Uuid>,
}

impl ResolvedGraph {
    fn location_id(&self, external_id: Option<&str>) -> Option<Uuid> {
        external_id.and_then(|key| self.locations.get(key).copied())
    }

    fn device_id(&self, external_id: Option<&str>) -> Option<Uuid> {
        external_id.and_then(|key| self.devices.get(key).copied())
    }
}

/// Runs reconciliation passes for one zone.
pub struct ReconciliationOrchestrator {
    fetcher: Arc<dyn Fetcher>,
    stores: SyncStores,
    config: SyncConfig,
    inferer: RelationshipInferer,
    enricher: ConfigEnricher,
    delta: DeltaPolicy,
    locations: UpsertStore<Location>,
    devices: UpsertStore<Device>,
    entities: UpsertStore<Entity>,
    automations: UpsertStore<Automation>,
    scripts: UpsertStore<Script>,
    scenes: UpsertStore<Scene>,
}

impl ReconciliationOrchestrator {
    /// Create an orchestrator over `fetcher` and `stores`.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, stores: SyncStores, config: SyncConfig) -> Self {
        Self {
            inferer: RelationshipInferer::from_config(&config),
            enricher: ConfigEnricher::new(fetcher.clone(), config.enrichment_concurrency),
            delta: DeltaPolicy::new(),
            locations: UpsertStore::new(stores.locations.clone()),
            devices: UpsertStore::new(stores.devices.clone()),
            entities: UpsertStore::new(stores.entities.clone()),
            automations: UpsertStore::new(stores.automations.clone()),
            scripts: UpsertStore::new(stores.scripts.clone()),
            scenes: UpsertStore::new(stores.scenes.clone()),
            fetcher,
            stores,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run a full pass.
    pub async fn run_full(&self, trigger: SyncTrigger) -> SyncResult<SyncRun> {
        self.run(SyncMode::Full, trigger).await
    }

    /// Run a delta pass.
    pub async fn run_delta(&self, trigger: SyncTrigger) -> SyncResult<SyncRun> {
        self.run(SyncMode::Delta, trigger).await
    }

    /// Reconcile automations, scripts and scenes only.
    pub async fn run_registry_only(&self, trigger: SyncTrigger) -> SyncResult<SyncRun> {
        self.run(SyncMode::RegistryOnly, trigger).await
    }

    /// Run one pass and return its final run record.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` if a recent pass for the zone has not finished.
    /// Otherwise the fetch, validation or write error that failed the pass,
    /// after the run has been marked `failed`.
    #[instrument(skip(self), fields(zone = %self.config.zone))]
    pub async fn run(&self, mode: SyncMode, trigger: SyncTrigger) -> SyncResult<SyncRun> {
        self.expire_abandoned_runs().await?;
        if let Some(active) = self
            .stores
            .runs
            .list_running(&self.config.zone)
            .await?
            .into_iter()
            .next()
        {
            return Err(SyncError::already_running(&self.config.zone, active.id));
        }

        let mut run = SyncRun::start(&self.config.zone, mode, trigger);
        self.stores.runs.create(&run).await?;

        info!(
            run_id = %run.id,
            mode = %mode,
            trigger = %trigger,
            "Started sync run"
        );

        let tracker = StatisticsTracker::new();
        let outcome = match self.execute(mode, &tracker).await {
            Ok(()) => self.record_completion(&run, &tracker).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(completed) => {
                let totals = completed.statistics.totals();
                info!(
                    run_id = %completed.id,
                    resources = completed.statistics.resources_found,
                    added = totals.added,
                    updated = totals.updated,
                    unchanged = totals.unchanged,
                    skipped = totals.skipped,
                    removed = totals.removed,
                    enrichment_failed = totals.enrichment_failed,
                    gaps = ?completed.capability_gaps,
                    duration_ms = tracker.elapsed_millis(),
                    "Sync run completed"
                );
                Ok(completed)
            }
            Err(e) => {
                error!(run_id = %run.id, error = %e, "Sync run failed");

                let (statistics, gaps) = tracker.snapshot();
                let message = self.config.bound_error_message(&e.to_string());
                if run.fail(message, statistics, gaps).is_ok() {
                    if let Err(persist_err) = self.stores.runs.update(&run).await {
                        error!(
                            run_id = %run.id,
                            error = %persist_err,
                            "Failed to record sync run failure"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Persist `run` as completed. On error the caller's copy is still `running`.
    async fn record_completion(
        &self,
        run: &SyncRun,
        tracker: &StatisticsTracker,
    ) -> SyncResult<SyncRun> {
        let mut completed = run.clone();
        let (statistics, gaps) = tracker.snapshot();
        completed.complete(statistics, gaps)?;
        self.stores.runs.update(&completed).await?;
        Ok(completed)
    }

    /// Look up a run record.
    pub async fn get_run(&self, id: Uuid) -> SyncResult<SyncRun> {
        self.stores
            .runs
            .get(id)
            .await?
            .ok_or(SyncError::RunNotFound { id })
    }

    /// Most recent run records first.
    pub async fn list_runs(&self, limit: i64) -> SyncResult<Vec<SyncRun>> {
        Ok(self.stores.runs.list_recent(limit).await?)
    }

    /// Mark `running` runs older than the stale-run timeout as failed.
    ///
    /// Returns the ids of the runs expired.
    pub async fn expire_abandoned_runs(&self) -> SyncResult<Vec<Uuid>> {
        let now = Utc::now();
        let timeout = self.config.stale_run_timeout();
        let mut expired = Vec::new();

        for mut run in self.stores.runs.list_running(&self.config.zone).await? {
            if !run.is_abandoned(now, timeout) {
                continue;
            }
            let statistics = run.statistics.clone();
            let gaps = run.capability_gaps.clone();
            run.fail(
                format!(
                    "abandoned: still running after {} seconds",
                    self.config.stale_run_timeout_secs
                ),
                statistics,
                gaps,
            )?;
            self.stores.runs.update(&run).await?;

            warn!(
                run_id = %run.id,
                started_at = %run.started_at,
                "Expired abandoned sync run"
            );
            expired.push(run.id);
        }
        Ok(expired)
    }

    async fn execute(&self, mode: SyncMode, tracker: &StatisticsTracker) -> SyncResult<()> {
        let resources = self.fetcher.list_resources().await?;
        tracker.set_resources_found(resources.len());
        debug!(count = resources.len(), "Listed resources");

        for resource in &resources {
            validate_external_id(RecordKind::Entity, &resource.external_id)?;
        }

        if mode != SyncMode::RegistryOnly {
            let graph = self.reconcile_graph(&resources, tracker).await?;
            self.reconcile_entities(mode, &resources, &graph, tracker)
                .await?;
        }

        let automations = of_kind(&resources, ResourceKind::Automation);
        let scripts = of_kind(&resources, ResourceKind::Script);
        let scenes = of_kind(&resources, ResourceKind::Scene);
        tokio::try_join!(
            self.reconcile_automations(&automations, tracker),
            self.reconcile_scripts(&scripts, tracker),
            self.reconcile_scenes(&scenes, tracker),
        )?;
        Ok(())
    }

    /// Locations, then devices.
    async fn reconcile_graph(
        &self,
        resources: &[Resource],
        tracker: &StatisticsTracker,
    ) -> SyncResult<ResolvedGraph> {
        let locations = self.resolve_locations(resources, tracker).await;
        let items: Vec<(String, LocationFields)> = locations
            .into_iter()
            .map(|l| {
                (
                    l.external_id,
                    LocationFields {
                        name: l.name,
                        parent_id: l.parent_id,
                        icon: l.icon,
                    },
                )
            })
            .collect();
        let current = key_set(&items);
        tracker.record_found(RecordKind::Location, current.len());
        let written = self
            .write_and_prune(&self.locations, items, &current, tracker)
            .await?;

        let mut graph = ResolvedGraph {
            locations: written.id_map(),
            ..ResolvedGraph::default()
        };

        let devices = self.resolve_devices(resources, tracker).await;
        let items: Vec<(String, DeviceFields)> = devices
            .into_iter()
            .map(|d| {
                let location_id = graph.location_id(d.location_ref.as_deref());
                (
                    d.external_id,
                    DeviceFields {
                        name: d.name,
                        manufacturer: d.manufacturer,
                        model: d.model,
                        sw_version: d.sw_version,
                        location_id,
                    },
                )
            })
            .collect();
        let current = key_set(&items);
        tracker.record_found(RecordKind::Device, current.len());
        let written = self
            .write_and_prune(&self.devices, items, &current, tracker)
            .await?;

        graph.devices = written.id_map();
        graph.device_locations = written
            .records
            .iter()
            .filter_map(|d| d.location_id.map(|location| (d.id, location)))
            .collect();
        Ok(graph)
    }

    async fn resolve_locations(
        &self,
        resources: &[Resource],
        tracker: &StatisticsTracker,
    ) -> Vec<LocationRecord> {
        match self.fetcher.list_locations().await {
            Ok(locations) => locations,
            Err(e) => {
                log_registry_fallback("location", &e);
                tracker.record_gap(CapabilityGap::LocationRegistry);
                self.inferer.infer_locations(resources)
            }
        }
    }

    async fn resolve_devices(
        &self,
        resources: &[Resource],
        tracker: &StatisticsTracker,
    ) -> Vec<DeviceRecord> {
        match self.fetcher.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                log_registry_fallback("device", &e);
                tracker.record_gap(CapabilityGap::DeviceRegistry);
                self.inferer.infer_devices(resources)
            }
        }
    }

    async fn reconcile_entities(
        &self,
        mode: SyncMode,
        resources: &[Resource],
        graph: &ResolvedGraph,
        tracker: &StatisticsTracker,
    ) -> SyncResult<()> {
        let resources = last_occurrences(resources);
        let items: Vec<(String, EntityFields)> = resources
            .iter()
            .map(|r| (r.external_id.clone(), self.entity_fields(r, graph)))
            .collect();
        let current = key_set(&items);
        tracker.record_found(RecordKind::Entity, current.len());

        let items = if mode == SyncMode::Delta {
            let keys: Vec<String> = current.iter().cloned().collect();
            let existing = self.entities.find_many(&keys).await?;

            let mut stale = Vec::with_capacity(items.len());
            let mut skipped = 0;
            for (resource, (external_id, fields)) in resources.iter().zip(items) {
                let stored = existing.get(&external_id);
                let links_moved = stored.is_some_and(|e| {
                    e.location_id != fields.location_id || e.device_id != fields.device_id
                });
                if links_moved || self.delta.should_sync(resource, stored) {
                    stale.push((external_id, fields));
                } else {
                    skipped += 1;
                }
            }
            tracker.record_skipped(RecordKind::Entity, skipped);
            stale
        } else {
            items
        };

        self.write_and_prune(&self.entities, items, &current, tracker)
            .await?;
        Ok(())
    }

    fn entity_fields(&self, resource: &Resource, graph: &ResolvedGraph) -> EntityFields {
        let attributes = &resource.attributes;
        let device_id = graph.device_id(self.inferer.device_ref(resource));
        let location_id = graph
            .location_id(self.inferer.location_ref(resource))
            .or_else(|| device_id.and_then(|d| graph.device_locations.get(&d).copied()));

        EntityFields {
            domain: resource.domain().to_string(),
            name: resource.display_name().to_string(),
            state: resource.state.clone(),
            attributes: attributes.clone(),
            device_id,
            location_id,
            device_class: attributes.text("device_class").map(str::to_string),
            unit_of_measurement: attributes.text("unit_of_measurement").map(str::to_string),
            supported_features: attributes.int_or("supported_features", 0),
        }
    }

    async fn reconcile_automations(
        &self,
        resources: &[&Resource],
        tracker: &StatisticsTracker,
    ) -> SyncResult<()> {
        let config_ids = resources.iter().map(|r| automation_config_id(r)).collect();
        let enrichment = self.enricher.automation_configs(config_ids).await;
        if enrichment.failed_count() > 0 {
            tracker.record_enrichment_failed(RecordKind::Automation, enrichment.failed_count());
            tracker.record_gap(CapabilityGap::AutomationConfig);
        }

        let items: Vec<(String, AutomationFields)> = resources
            .iter()
            .map(|r| {
                (
                    r.external_id.clone(),
                    AutomationFields {
                        alias: r.display_name().to_string(),
                        state: r.state.clone(),
                        mode: r.attributes.text("mode").map(str::to_string),
                        last_triggered: last_triggered(r),
                        config: enrichment.configs.get(&automation_config_id(r)).cloned(),
                    },
                )
            })
            .collect();
        let current = key_set(&items);
        tracker.record_found(RecordKind::Automation, current.len());
        self.write_and_prune(&self.automations, items, &current, tracker)
            .await?;
        Ok(())
    }

    async fn reconcile_scripts(
        &self,
        resources: &[&Resource],
        tracker: &StatisticsTracker,
    ) -> SyncResult<()> {
        let config_ids = resources.iter().map(|r| r.object_id().to_string()).collect();
        let enrichment = self.enricher.script_configs(config_ids).await;
        if enrichment.failed_count() > 0 {
            tracker.record_enrichment_failed(RecordKind::Script, enrichment.failed_count());
            tracker.record_gap(CapabilityGap::ScriptConfig);
        }

        let items: Vec<(String, ScriptFields)> = resources
            .iter()
            .map(|r| {
                (
                    r.external_id.clone(),
                    ScriptFields {
                        alias: r.display_name().to_string(),
                        state: r.state.clone(),
                        mode: r.attributes.text("mode").map(str::to_string),
                        last_triggered: last_triggered(r),
                        config: enrichment.configs.get(r.object_id()).cloned(),
                    },
                )
            })
            .collect();
        let current = key_set(&items);
        tracker.record_found(RecordKind::Script, current.len());
        self.write_and_prune(&self.scripts, items, &current, tracker)
            .await?;
        Ok(())
    }

    async fn reconcile_scenes(
        &self,
        resources: &[&Resource],
        tracker: &StatisticsTracker,
    ) -> SyncResult<()> {
        let items: Vec<(String, SceneFields)> = resources
            .iter()
            .map(|r| {
                (
                    r.external_id.clone(),
                    SceneFields {
                        alias: r.display_name().to_string(),
                        state: r.state.clone(),
                        last_triggered: last_triggered(r),
                    },
                )
            })
            .collect();
        let current = key_set(&items);
        tracker.record_found(RecordKind::Scene, current.len());
        self.write_and_prune(&self.scenes, items, &current, tracker)
            .await?;
        Ok(())
    }

    /// Upsert `items`, then delete every stored key missing from `current`.
    async fn write_and_prune<T: SyncRecord>(
        &self,
        store: &UpsertStore<T>,
        items: Vec<(String, T::Fields)>,
        current: &HashSet<String>,
        tracker: &StatisticsTracker,
    ) -> SyncResult<BatchOutcome<T>> {
        let outcome = store.upsert_batch(items).await?;
        tracker.record_written(T::KIND, outcome.created, outcome.updated, outcome.unchanged);

        let removed = store.remove_vanished(current).await?;
        tracker.record_removed(T::KIND, removed);
        if removed > 0 {
            debug!(kind = %T::KIND, removed, "Removed vanished records");
        }
        Ok(outcome)
    }
}

fn of_kind(resources: &[Resource], kind: ResourceKind) -> Vec<&Resource> {
    resources.iter().filter(|r| r.kind() == kind).collect()
}

/// One resource per external id: the last occurrence, at its first-seen position.
fn last_occurrences(resources: &[Resource]) -> Vec<&Resource> {
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(resources.len());
    let mut unique: Vec<&Resource> = Vec::with_capacity(resources.len());
    for resource in resources {
        match positions.get(resource.external_id.as_str()) {
            Some(&i) => unique[i] = resource,
            None => {
                positions.insert(&resource.external_id, unique.len());
                unique.push(resource);
            }
        }
    }
    unique
}

fn key_set<F>(items: &[(String, F)]) -> HashSet<String> {
    items.iter().map(|(key, _)| key.clone()).collect()
}

/// Configuration id of an automation: its `id` attribute, else its object id.
fn automation_config_id(resource: &Resource) -> String {
    resource
        .attributes
        .first_text(&["id"])
        .unwrap_or_else(|| resource.object_id())
        .to_string()
}

fn last_triggered(resource: &Resource) -> Option<DateTime<Utc>> {
    resource
        .attributes
        .text("last_triggered")
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn log_registry_fallback(registry: &str, err: &FetchError) {
    if err.is_unsupported() {
        debug!(registry, "No registry on remote controller, inferring from attributes");
    } else {
        warn!(
            registry,
            error = %err,
            "Registry fetch failed, inferring from attributes"
        );
    }
}
