//! Reconciliation Orchestrator Tests
//!
//! End-to-end passes over the in-memory store covering:
//! - Full passes: locations, devices, entities and behavior definitions
//! - Removal of vanished records
//! - Delta passes and staleness skips
//! - Partial enrichment failure
//! - Fatal fetch, validation and write failures
//! - Run lifecycle: concurrent and abandoned runs

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use hearth_db::{
    AutomationConfig, CapabilityGap, DbError, DbResult, Entity, MemoryRunStore, MemoryStore,
    MemoryTable, PageRequest, RecordStore, RunStatus, RunStore, ScriptConfig, SyncMode,
    SyncRecord, SyncRun, SyncTrigger,
};
use hearth_sync::{
    DeviceRecord, FetchError, FetchResult, Fetcher, LocationRecord, ReconciliationOrchestrator,
    Resource, SyncConfig, SyncError,
};

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("hearth_sync=debug")
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Manual Mock Implementations
// =============================================================================

/// Fetcher serving a mutable in-memory view of the remote controller.
#[derive(Default)]
pub struct MockFetcher {
    resources: Mutex<Vec<Resource>>,
    locations: Mutex<Option<Vec<LocationRecord>>>,
    devices: Mutex<Option<Vec<DeviceRecord>>>,
    automation_configs: Mutex<HashMap<String, AutomationConfig>>,
    script_configs: Mutex<HashMap<String, ScriptConfig>>,
    fail_listing: AtomicBool,
    list_calls: AtomicUsize,
    config_calls: AtomicUsize,
}

impl MockFetcher {
    pub fn with_resources(resources: Vec<Resource>) -> Self {
        let fetcher = Self::default();
        fetcher.set_resources(resources);
        fetcher
    }

    pub fn set_resources(&self, resources: Vec<Resource>) {
        *self.resources.lock().unwrap() = resources;
    }

    pub fn set_locations(&self, locations: Vec<LocationRecord>) {
        *self.locations.lock().unwrap() = Some(locations);
    }

    pub fn set_devices(&self, devices: Vec<DeviceRecord>) {
        *self.devices.lock().unwrap() = Some(devices);
    }

    pub fn add_automation_config(&self, config_id: &str, description: &str) {
        self.automation_configs.lock().unwrap().insert(
            config_id.to_string(),
            AutomationConfig {
                description: Some(description.to_string()),
                ..Default::default()
            },
        );
    }

    pub fn add_script_config(&self, config_id: &str) {
        self.script_configs
            .lock()
            .unwrap()
            .insert(config_id.to_string(), ScriptConfig::default());
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn config_calls(&self) -> usize {
        self.config_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn list_resources(&self) -> FetchResult<Vec<Resource>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(FetchError::transport("connection refused by controller"));
        }
        Ok(self.resources.lock().unwrap().clone())
    }

    async fn list_locations(&self) -> FetchResult<Vec<LocationRecord>> {
        self.locations
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FetchError::unsupported("list_locations"))
    }

    async fn list_devices(&self) -> FetchResult<Vec<DeviceRecord>> {
        self.devices
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FetchError::unsupported("list_devices"))
    }

    async fn get_automation_config(&self, config_id: &str) -> FetchResult<AutomationConfig> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        self.automation_configs
            .lock()
            .unwrap()
            .get(config_id)
            .cloned()
            .ok_or_else(|| FetchError::not_found(format!("automation {config_id}")))
    }

    async fn get_script_config(&self, config_id: &str) -> FetchResult<ScriptConfig> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        self.script_configs
            .lock()
            .unwrap()
            .get(config_id)
            .cloned()
            .ok_or_else(|| FetchError::timeout(format!("script {config_id}")))
    }
}

/// Store wrapper whose writes fail while the switch is on.
pub struct FailingTable<T: SyncRecord> {
    inner: Arc<MemoryTable<T>>,
    fail_writes: AtomicBool,
    write_calls: AtomicUsize,
}

impl<T: SyncRecord> FailingTable<T> {
    pub fn new(inner: Arc<MemoryTable<T>>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(true),
            write_calls: AtomicUsize::new(0),
        }
    }

    fn check(&self) -> DbResult<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::ConnectionFailed(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl<T: SyncRecord> RecordStore<T> for FailingTable<T> {
    async fn get(&self, id: Uuid) -> DbResult<Option<T>> {
        self.inner.get(id).await
    }

    async fn find_by_external_id(&self, external_id: &str) -> DbResult<Option<T>> {
        self.inner.find_by_external_id(external_id).await
    }

    async fn find_by_external_ids(&self, external_ids: &[String]) -> DbResult<Vec<T>> {
        self.inner.find_by_external_ids(external_ids).await
    }

    async fn list(&self, page: PageRequest) -> DbResult<Vec<T>> {
        self.inner.list(page).await
    }

    async fn count(&self) -> DbResult<u64> {
        self.inner.count().await
    }

    async fn insert(&self, record: &T) -> DbResult<()> {
        self.check()?;
        self.inner.insert(record).await
    }

    async fn insert_batch(&self, records: &[T]) -> DbResult<()> {
        self.check()?;
        self.inner.insert_batch(records).await
    }

    async fn update_batch(&self, records: &[T]) -> DbResult<()> {
        self.check()?;
        self.inner.update_batch(records).await
    }

    async fn external_ids(&self) -> DbResult<HashSet<String>> {
        self.inner.external_ids().await
    }

    async fn delete_by_external_ids(&self, external_ids: &[String]) -> DbResult<u64> {
        self.check()?;
        self.inner.delete_by_external_ids(external_ids).await
    }
}

/// Run store that refuses to persist completed runs.
pub struct CompletionFailingRunStore {
    inner: Arc<MemoryRunStore>,
}

#[async_trait]
impl RunStore for CompletionFailingRunStore {
    async fn create(&self, run: &SyncRun) -> DbResult<()> {
        self.inner.create(run).await
    }

    async fn update(&self, run: &SyncRun) -> DbResult<()> {
        if run.status == RunStatus::Completed {
            return Err(DbError::ConnectionFailed(sqlx::Error::PoolTimedOut));
        }
        self.inner.update(run).await
    }

    async fn get(&self, id: Uuid) -> DbResult<Option<SyncRun>> {
        self.inner.get(id).await
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<SyncRun>> {
        self.inner.list_recent(limit).await
    }

    async fn list_running(&self, zone: &str) -> DbResult<Vec<SyncRun>> {
        self.inner.list_running(zone).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn orchestrator(fetcher: &Arc<MockFetcher>, store: &MemoryStore) -> ReconciliationOrchestrator {
    ReconciliationOrchestrator::new(fetcher.clone(), store.stores(), SyncConfig::default())
}

async fn entity(store: &MemoryStore, external_id: &str) -> Option<Entity> {
    store
        .entities
        .find_by_external_id(external_id)
        .await
        .unwrap()
}

fn kitchen_and_outdoor() -> Vec<Resource> {
    vec![
        Resource::new("light.kitchen")
            .with_name("Kitchen light")
            .with_state("on")
            .with_attribute("location", "kitchen"),
        Resource::new("sensor.outdoor_temperature")
            .with_state("12.5")
            .with_attribute("device_class", "temperature")
            .with_attribute("unit_of_measurement", "°C"),
    ]
}

// =============================================================================
// Full passes
// =============================================================================

#[tokio::test]
async fn test_full_pass_infers_location_and_leaves_unmapped_fk_null() {
    init_test_logging();
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::with_resources(kitchen_and_outdoor()));

    let run = orchestrator(&fetcher, &store)
        .run_full(SyncTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.mode, SyncMode::Full);
    assert!(run.completed_at.is_some());
    assert_eq!(run.statistics.resources_found, 2);
    assert_eq!(store.locations.count().await.unwrap(), 1);
    assert_eq!(store.devices.count().await.unwrap(), 0);
    assert_eq!(store.entities.count().await.unwrap(), 2);

    let kitchen = store
        .locations
        .find_by_external_id("kitchen")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kitchen.name, "Kitchen");

    let light = entity(&store, "light.kitchen").await.unwrap();
    assert_eq!(light.location_id, Some(kitchen.id));
    assert_eq!(light.name, "Kitchen light");
    assert_eq!(light.domain, "light");

    let sensor = entity(&store, "sensor.outdoor_temperature").await.unwrap();
    assert_eq!(sensor.location_id, None);
    assert_eq!(sensor.device_id, None);
    assert_eq!(sensor.device_class.as_deref(), Some("temperature"));
    assert_eq!(sensor.unit_of_measurement.as_deref(), Some("°C"));

    assert!(run
        .capability_gaps
        .contains(&CapabilityGap::LocationRegistry));
    assert!(run.capability_gaps.contains(&CapabilityGap::DeviceRegistry));

    let stored = store.runs.get(run.id).await.unwrap().unwrap();
    assert_eq!(stored, run);
}

#[tokio::test]
async fn test_inferred_device_links_entities_and_location() {
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::with_resources(vec![
        Resource::new("sensor.th_temperature")
            .with_attribute("device_id", "th01")
            .with_attribute("area_id", "bathroom"),
        Resource::new("sensor.th_battery").with_attribute("device_id", "th01"),
    ]));

    orchestrator(&fetcher, &store)
        .run_full(SyncTrigger::Manual)
        .await
        .unwrap();

    let device = store
        .devices
        .find_by_external_id("th01")
        .await
        .unwrap()
        .unwrap();
    let bathroom = store
        .locations
        .find_by_external_id("bathroom")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(device.location_id, Some(bathroom.id));

    let battery = entity(&store, "sensor.th_battery").await.unwrap();
    assert_eq!(battery.device_id, Some(device.id));
    // No location of its own: inherited from the device.
    assert_eq!(battery.location_id, Some(bathroom.id));
}

#[tokio::test]
async fn test_registries_bypass_inference() {
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::with_resources(vec![Resource::new(
        "light.desk",
    )
    .with_device("lamp01")
    .with_attribute("area_id", "ignored_area")]));
    fetcher.set_locations(vec![
        LocationRecord {
            external_id: "office".into(),
            name: "Home office".into(),
            parent_id: Some("first_floor".into()),
            icon: Some("mdi:desk".into()),
        },
        LocationRecord {
            external_id: "empty_room".into(),
            name: "Empty room".into(),
            parent_id: None,
            icon: None,
        },
    ]);
    fetcher.set_devices(vec![DeviceRecord {
        external_id: "lamp01".into(),
        name: "Desk lamp".into(),
        manufacturer: Some("Acme".into()),
        model: Some("L-1".into()),
        sw_version: Some("1.0.3".into()),
        location_ref: Some("office".into()),
    }]);

    let run = orchestrator(&fetcher, &store)
        .run_full(SyncTrigger::Startup)
        .await
        .unwrap();

    assert!(run.capability_gaps.is_empty());
    assert_eq!(run.statistics.locations.added, 2);
    assert!(store
        .locations
        .find_by_external_id("ignored_area")
        .await
        .unwrap()
        .is_none());

    let office = store
        .locations
        .find_by_external_id("office")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(office.parent_id.as_deref(), Some("first_floor"));

    let lamp = store
        .devices
        .find_by_external_id("lamp01")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lamp.location_id, Some(office.id));
    assert_eq!(lamp.manufacturer.as_deref(), Some("Acme"));

    let desk = entity(&store, "light.desk").await.unwrap();
    assert_eq!(desk.device_id, Some(lamp.id));
}

#[tokio::test]
async fn test_vanished_entity_is_removed() {
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::with_resources(vec![
        Resource::new("switch.a"),
        Resource::new("switch.b"),
    ]));
    let orchestrator = orchestrator(&fetcher, &store);

    orchestrator.run_full(SyncTrigger::Manual).await.unwrap();
    let a_before = entity(&store, "switch.a").await.unwrap();

    fetcher.set_resources(vec![Resource::new("switch.a")]);
    let run = orchestrator.run_full(SyncTrigger::Manual).await.unwrap();

    assert_eq!(run.statistics.entities.removed, 1);
    assert!(entity(&store, "switch.b").await.is_none());
    let a_after = entity(&store, "switch.a").await.unwrap();
    assert_eq!(a_after.id, a_before.id);
}

#[tokio::test]
async fn test_vanished_location_is_removed() {
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::with_resources(vec![
        Resource::new("light.a").with_attribute("room", "kitchen"),
        Resource::new("light.b").with_attribute("room", "garage"),
    ]));
    let orchestrator = orchestrator(&fetcher, &store);
    orchestrator.run_full(SyncTrigger::Manual).await.unwrap();

    fetcher.set_resources(vec![Resource::new("light.a").with_attribute("room", "kitchen")]);
    let run = orchestrator.run_full(SyncTrigger::Manual).await.unwrap();

    assert_eq!(run.statistics.locations.removed, 1);
    let keys = store.locations.external_ids().await.unwrap();
    assert_eq!(keys, ["kitchen".to_string()].into_iter().collect());
}

#[tokio::test]
async fn test_repeated_full_pass_is_idempotent() {
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::with_resources(vec![
        Resource::new("light.kitchen").with_attribute("area_id", "kitchen"),
        Resource::new("automation.wake_up").with_state("on"),
        Resource::new("scene.movie"),
    ]));
    fetcher.add_automation_config("wake_up", "Morning routine");
    let orchestrator = orchestrator(&fetcher, &store);

    let first = orchestrator.run_full(SyncTrigger::Manual).await.unwrap();
    assert!(first.statistics.totals().added > 0);

    let second = orchestrator.run_full(SyncTrigger::Manual).await.unwrap();
    let totals = second.statistics.totals();
    assert_eq!(totals.added, 0);
    assert_eq!(totals.updated, 0);
    assert_eq!(totals.removed, 0);
    assert_eq!(second.statistics.entities.unchanged, 3);
    assert_eq!(store.entities.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_duplicate_keys_in_listing_produce_one_row() {
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::with_resources(vec![
        Resource::new("light.hall").with_state("off"),
        Resource::new("light.hall").with_state("on"),
    ]));

    orchestrator(&fetcher, &store)
        .run_full(SyncTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(store.entities.count().await.unwrap(), 1);
    let hall = entity(&store, "light.hall").await.unwrap();
    assert_eq!(hall.state.as_deref(), Some("on"));
}

// =============================================================================
// Behavior definitions
// =============================================================================

#[tokio::test]
async fn test_one_failed_enrichment_does_not_fail_the_pass() {
    init_test_logging();
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::with_resources(vec![
        Resource::new("automation.one").with_attribute("id", "1001"),
        Resource::new("automation.two").with_attribute("id", "1002"),
        Resource::new("automation.three").with_attribute("id", "1003"),
    ]));
    fetcher.add_automation_config("1001", "first");
    fetcher.add_automation_config("1003", "third");

    let run = orchestrator(&fetcher, &store)
        .run_full(SyncTrigger::Scheduled)
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(fetcher.config_calls(), 3);
    assert_eq!(run.statistics.automations.found, 3);
    assert_eq!(run.statistics.automations.added, 3);
    assert_eq!(run.statistics.automations.enrichment_failed, 1);
    assert!(run
        .capability_gaps
        .contains(&CapabilityGap::AutomationConfig));

    assert_eq!(store.automations.count().await.unwrap(), 3);
    let with_config = store
        .automations
        .all()
        .await
        .into_iter()
        .filter(|a| a.config.is_some())
        .count();
    assert_eq!(with_config, 2);

    let two = store
        .automations
        .find_by_external_id("automation.two")
        .await
        .unwrap()
        .unwrap();
    assert!(two.config.is_none());
}

#[tokio::test]
async fn test_scripts_and_scenes_reconciled() {
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::with_resources(vec![
        Resource::new("script.bedtime")
            .with_attribute("mode", "queued")
            .with_attribute("last_triggered", "2026-02-01T22:30:00Z"),
        Resource::new("script.unknown_config"),
        Resource::new("scene.movie").with_name("Movie night"),
    ]));
    fetcher.add_script_config("bedtime");

    let run = orchestrator(&fetcher, &store)
        .run_full(SyncTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(run.statistics.scripts.added, 2);
    assert_eq!(run.statistics.scripts.enrichment_failed, 1);
    assert!(run.capability_gaps.contains(&CapabilityGap::ScriptConfig));

    let bedtime = store
        .scripts
        .find_by_external_id("script.bedtime")
        .await
        .unwrap()
        .unwrap();
    assert!(bedtime.config.is_some());
    assert_eq!(bedtime.mode.as_deref(), Some("queued"));
    assert!(bedtime.last_triggered.is_some());

    let movie = store
        .scenes
        .find_by_external_id("scene.movie")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(movie.alias, "Movie night");

    // Behavior definitions are entities too.
    assert_eq!(store.entities.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_registry_only_pass_skips_graph() {
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::with_resources(vec![
        Resource::new("light.kitchen").with_attribute("area_id", "kitchen"),
        Resource::new("scene.movie"),
    ]));

    let run = orchestrator(&fetcher, &store)
        .run_registry_only(SyncTrigger::Api)
        .await
        .unwrap();

    assert_eq!(run.mode, SyncMode::RegistryOnly);
    assert_eq!(run.statistics.resources_found, 2);
    assert_eq!(store.scenes.count().await.unwrap(), 1);
    assert_eq!(store.entities.count().await.unwrap(), 0);
    assert_eq!(store.locations.count().await.unwrap(), 0);
    assert!(!run
        .capability_gaps
        .contains(&CapabilityGap::LocationRegistry));
}

// =============================================================================
// Delta passes
// =============================================================================

#[tokio::test]
async fn test_delta_pass_skips_current_records() {
    let store = MemoryStore::new();
    let an_hour_ago = Utc::now() - Duration::hours(1);
    let fetcher = Arc::new(MockFetcher::with_resources(vec![
        Resource::new("light.a").updated_at(an_hour_ago),
        Resource::new("light.b").updated_at(an_hour_ago),
    ]));
    let orchestrator = orchestrator(&fetcher, &store);

    orchestrator.run_full(SyncTrigger::Manual).await.unwrap();
    let a_before = entity(&store, "light.a").await.unwrap();

    let run = orchestrator.run_delta(SyncTrigger::Scheduled).await.unwrap();
    assert_eq!(run.statistics.entities.skipped, 2);
    assert_eq!(run.statistics.entities.added, 0);
    assert_eq!(run.statistics.entities.updated, 0);
    assert_eq!(run.statistics.entities.removed, 0);

    let a_after = entity(&store, "light.a").await.unwrap();
    assert_eq!(a_after.last_synced_at, a_before.last_synced_at);
}

#[tokio::test]
async fn test_delta_pass_writes_newer_records_and_removes_vanished() {
    let store = MemoryStore::new();
    let an_hour_ago = Utc::now() - Duration::hours(1);
    let fetcher = Arc::new(MockFetcher::with_resources(vec![
        Resource::new("light.a").with_state("off").updated_at(an_hour_ago),
        Resource::new("light.b").updated_at(an_hour_ago),
        Resource::new("light.c").updated_at(an_hour_ago),
    ]));
    let orchestrator = orchestrator(&fetcher, &store);
    orchestrator.run_full(SyncTrigger::Manual).await.unwrap();
    let b_before = entity(&store, "light.b").await.unwrap();

    let in_an_hour = Utc::now() + Duration::hours(1);
    fetcher.set_resources(vec![
        Resource::new("light.a").with_state("on").updated_at(in_an_hour),
        Resource::new("light.b").updated_at(an_hour_ago),
        Resource::new("light.d"),
    ]);
    let run = orchestrator.run_delta(SyncTrigger::Scheduled).await.unwrap();

    let counts = run.statistics.entities;
    assert_eq!(counts.found, 3);
    assert_eq!(counts.added, 1);
    assert_eq!(counts.updated, 1);
    assert_eq!(counts.skipped, 1);
    assert_eq!(counts.removed, 1);

    assert_eq!(
        entity(&store, "light.a").await.unwrap().state.as_deref(),
        Some("on")
    );
    assert_eq!(
        entity(&store, "light.b").await.unwrap().last_synced_at,
        b_before.last_synced_at
    );
    assert!(entity(&store, "light.c").await.is_none());
    assert!(entity(&store, "light.d").await.is_some());
}

#[tokio::test]
async fn test_delta_pass_uses_last_duplicate() {
    let store = MemoryStore::new();
    let an_hour_ago = Utc::now() - Duration::hours(1);
    let in_an_hour = Utc::now() + Duration::hours(1);
    let fetcher = Arc::new(MockFetcher::with_resources(vec![Resource::new("light.hall")
        .with_state("off")
        .updated_at(an_hour_ago)]));
    let orchestrator = orchestrator(&fetcher, &store);
    orchestrator.run_full(SyncTrigger::Manual).await.unwrap();

    // Last occurrence is current: nothing written.
    fetcher.set_resources(vec![
        Resource::new("light.hall").with_state("on").updated_at(in_an_hour),
        Resource::new("light.hall").with_state("dim").updated_at(an_hour_ago),
    ]);
    let run = orchestrator.run_delta(SyncTrigger::Scheduled).await.unwrap();
    assert_eq!(run.statistics.entities.skipped, 1);
    assert_eq!(run.statistics.entities.updated, 0);
    assert_eq!(
        entity(&store, "light.hall").await.unwrap().state.as_deref(),
        Some("off")
    );

    // Last occurrence is newer: its fields are written.
    fetcher.set_resources(vec![
        Resource::new("light.hall").with_state("dim").updated_at(an_hour_ago),
        Resource::new("light.hall").with_state("on").updated_at(in_an_hour),
    ]);
    let run = orchestrator.run_delta(SyncTrigger::Scheduled).await.unwrap();
    assert_eq!(run.statistics.entities.skipped, 0);
    assert_eq!(run.statistics.entities.updated, 1);
    assert_eq!(
        entity(&store, "light.hall").await.unwrap().state.as_deref(),
        Some("on")
    );
    assert_eq!(store.entities.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_delta_pass_relinks_moved_entity() {
    let store = MemoryStore::new();
    let an_hour_ago = Utc::now() - Duration::hours(1);
    let fetcher = Arc::new(MockFetcher::with_resources(vec![Resource::new("light.a")
        .with_attribute("room", "kitchen")
        .updated_at(an_hour_ago)]));
    let orchestrator = orchestrator(&fetcher, &store);
    orchestrator.run_full(SyncTrigger::Manual).await.unwrap();

    fetcher.set_resources(vec![Resource::new("light.a")
        .with_attribute("room", "office")
        .updated_at(an_hour_ago)]);
    let run = orchestrator.run_delta(SyncTrigger::Scheduled).await.unwrap();

    assert_eq!(run.statistics.locations.removed, 1);
    assert_eq!(run.statistics.entities.updated, 1);
    assert_eq!(run.statistics.entities.skipped, 0);

    let office = store
        .locations
        .find_by_external_id("office")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        entity(&store, "light.a").await.unwrap().location_id,
        Some(office.id)
    );
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_listing_failure_fails_run_without_writes() {
    init_test_logging();
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::with_resources(kitchen_and_outdoor()));
    fetcher.fail_listing(true);

    let err = orchestrator(&fetcher, &store)
        .run_full(SyncTrigger::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Fetch(FetchError::Transport { .. })));
    assert!(err.is_retryable());
    assert_eq!(fetcher.list_calls(), 1);

    let runs = store.runs.list_recent(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    let message = runs[0].error_message.as_deref().unwrap();
    assert!(message.contains("connection refused"));
    assert!(runs[0].completed_at.is_some());

    assert_eq!(store.locations.count().await.unwrap(), 0);
    assert_eq!(store.devices.count().await.unwrap(), 0);
    assert_eq!(store.entities.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_error_message_is_bounded() {
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::default());
    fetcher.fail_listing(true);
    let config = SyncConfig {
        error_message_limit: 12,
        ..SyncConfig::default()
    };
    let orchestrator = ReconciliationOrchestrator::new(fetcher.clone(), store.stores(), config);

    orchestrator.run_full(SyncTrigger::Manual).await.unwrap_err();

    let run = &store.runs.list_recent(1).await.unwrap()[0];
    assert_eq!(run.error_message.as_deref().unwrap().chars().count(), 12);
}

#[tokio::test]
async fn test_missing_external_id_rejected_before_any_write() {
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::with_resources(vec![
        Resource::new("light.kitchen").with_attribute("area_id", "kitchen"),
        Resource::new(""),
    ]));

    let err = orchestrator(&fetcher, &store)
        .run_full(SyncTrigger::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation { .. }));
    assert!(!err.is_retryable());

    assert_eq!(store.locations.count().await.unwrap(), 0);
    assert_eq!(store.entities.count().await.unwrap(), 0);
    let run = &store.runs.list_recent(1).await.unwrap()[0];
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_store_failure_fails_run() {
    let store = MemoryStore::new();
    let failing = Arc::new(FailingTable::new(store.entities.clone()));
    let mut stores = store.stores();
    stores.entities = failing.clone();

    let fetcher = Arc::new(MockFetcher::with_resources(kitchen_and_outdoor()));
    let orchestrator = ReconciliationOrchestrator::new(fetcher, stores, SyncConfig::default());

    let err = orchestrator.run_full(SyncTrigger::Manual).await.unwrap_err();
    assert!(matches!(err, SyncError::Write(_)));
    assert!(err.is_retryable());
    assert_eq!(failing.write_calls.load(Ordering::SeqCst), 1);

    let run = &store.runs.list_recent(1).await.unwrap()[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("Write failed"));
    assert_eq!(store.entities.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_completion_write_marks_run_failed() {
    let store = MemoryStore::new();
    let mut stores = store.stores();
    stores.runs = Arc::new(CompletionFailingRunStore {
        inner: store.runs.clone(),
    });

    let fetcher = Arc::new(MockFetcher::with_resources(kitchen_and_outdoor()));
    let orchestrator = ReconciliationOrchestrator::new(fetcher, stores, SyncConfig::default());

    let err = orchestrator.run_full(SyncTrigger::Manual).await.unwrap_err();
    assert!(matches!(err, SyncError::Write(_)));

    let run = &store.runs.list_recent(1).await.unwrap()[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("Write failed"));
    assert!(store.runs.list_running("default").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_message_limit_still_records_a_message() {
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::default());
    fetcher.fail_listing(true);
    let config = SyncConfig {
        error_message_limit: 0,
        ..SyncConfig::default()
    };
    let orchestrator = ReconciliationOrchestrator::new(fetcher.clone(), store.stores(), config);

    orchestrator.run_full(SyncTrigger::Manual).await.unwrap_err();

    let run = &store.runs.list_recent(1).await.unwrap()[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error_message.as_deref(), Some("F"));
}

#[tokio::test]
async fn test_huge_stale_run_timeout_never_expires_runs() {
    let store = MemoryStore::new();
    let mut old = SyncRun::start("default", SyncMode::Full, SyncTrigger::Manual);
    old.started_at = Utc::now() - Duration::days(3650);
    store.runs.create(&old).await.unwrap();

    let fetcher = Arc::new(MockFetcher::with_resources(kitchen_and_outdoor()));
    let config = SyncConfig::default().with_stale_run_timeout_secs(u64::MAX);
    let orchestrator = ReconciliationOrchestrator::new(fetcher, store.stores(), config);

    assert!(orchestrator.expire_abandoned_runs().await.unwrap().is_empty());
    let err = orchestrator.run_full(SyncTrigger::Manual).await.unwrap_err();
    assert!(matches!(err, SyncError::AlreadyRunning { run_id, .. } if run_id == old.id));
}

// =============================================================================
// Run lifecycle
// =============================================================================

#[tokio::test]
async fn test_in_flight_run_rejects_new_pass() {
    let store = MemoryStore::new();
    let active = SyncRun::start("default", SyncMode::Full, SyncTrigger::Scheduled);
    store.runs.create(&active).await.unwrap();

    let fetcher = Arc::new(MockFetcher::with_resources(kitchen_and_outdoor()));
    let err = orchestrator(&fetcher, &store)
        .run_delta(SyncTrigger::Manual)
        .await
        .unwrap_err();

    match err {
        SyncError::AlreadyRunning { zone, run_id } => {
            assert_eq!(zone, "default");
            assert_eq!(run_id, active.id);
        }
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert_eq!(fetcher.list_calls(), 0);
}

#[tokio::test]
async fn test_other_zone_does_not_block() {
    let store = MemoryStore::new();
    let other = SyncRun::start("garage", SyncMode::Full, SyncTrigger::Scheduled);
    store.runs.create(&other).await.unwrap();

    let fetcher = Arc::new(MockFetcher::with_resources(kitchen_and_outdoor()));
    let run = orchestrator(&fetcher, &store)
        .run_full(SyncTrigger::Manual)
        .await
        .unwrap();
    assert_eq!(run.zone, "default");
}

#[tokio::test]
async fn test_abandoned_run_is_expired_before_new_pass() {
    let store = MemoryStore::new();
    let mut stale = SyncRun::start("default", SyncMode::Full, SyncTrigger::Scheduled);
    stale.started_at = Utc::now() - Duration::hours(2);
    store.runs.create(&stale).await.unwrap();

    let fetcher = Arc::new(MockFetcher::with_resources(kitchen_and_outdoor()));
    let orchestrator = orchestrator(&fetcher, &store);
    let run = orchestrator.run_full(SyncTrigger::Manual).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    let expired = orchestrator.get_run(stale.id).await.unwrap();
    assert_eq!(expired.status, RunStatus::Failed);
    assert!(expired
        .error_message
        .as_deref()
        .unwrap()
        .contains("abandoned"));

    let runs = orchestrator.list_runs(10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, run.id);
}

#[tokio::test]
async fn test_expire_abandoned_runs_leaves_young_runs() {
    let store = MemoryStore::new();
    let young = SyncRun::start("default", SyncMode::Full, SyncTrigger::Scheduled);
    store.runs.create(&young).await.unwrap();

    let fetcher = Arc::new(MockFetcher::default());
    let expired = orchestrator(&fetcher, &store)
        .expire_abandoned_runs()
        .await
        .unwrap();
    assert!(expired.is_empty());
    assert_eq!(
        store.runs.get(young.id).await.unwrap().unwrap().status,
        RunStatus::Running
    );
}

#[tokio::test]
async fn test_get_unknown_run() {
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::default());
    let missing = Uuid::new_v4();

    let err = orchestrator(&fetcher, &store)
        .get_run(missing)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RunNotFound { id } if id == missing));
}
