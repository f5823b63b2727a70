//! Location and device inference from resource attributes.
//!
//! Used when the remote controller has no location or device registry.
//! Inference is lossy: locations and devices without resources, hierarchies
//! and metadata never reflected in attributes cannot be recovered.

use std::collections::BTreeMap;

use crate::config::SyncConfig;
use crate::fetcher::{DeviceRecord, LocationRecord, Resource};

/// Derives locations and devices from a flat resource list.
#[derive(Debug, Clone)]
pub struct RelationshipInferer {
    location_keys: Vec<String>,
    device_keys: Vec<String>,
}

impl RelationshipInferer {
    #[must_use]
    pub fn new(location_keys: Vec<String>, device_keys: Vec<String>) -> Self {
        Self {
            location_keys,
            device_keys,
        }
    }

    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.location_attribute_keys.clone(),
            config.device_attribute_keys.clone(),
        )
    }

    /// External id of the location `resource` belongs to, if any.
    ///
    /// An explicit reference wins over attributes.
    #[must_use]
    pub fn location_ref<'a>(&self, resource: &'a Resource) -> Option<&'a str> {
        explicit(resource.location_ref.as_deref())
            .or_else(|| resource.attributes.first_text(self.location_keys.as_slice()))
    }

    /// External id of the device `resource` belongs to, if any.
    #[must_use]
    pub fn device_ref<'a>(&self, resource: &'a Resource) -> Option<&'a str> {
        explicit(resource.device_ref.as_deref())
            .or_else(|| resource.attributes.first_text(self.device_keys.as_slice()))
    }

    /// One location per distinct location reference, ordered by id.
    #[must_use]
    pub fn infer_locations(&self, resources: &[Resource]) -> Vec<LocationRecord> {
        let mut locations: BTreeMap<&str, LocationRecord> = BTreeMap::new();
        for resource in resources {
            if let Some(location) = self.location_ref(resource) {
                locations
                    .entry(location)
                    .or_insert_with(|| LocationRecord {
                        external_id: location.to_string(),
                        name: humanize(location),
                        parent_id: None,
                        icon: None,
                    });
            }
        }
        locations.into_values().collect()
    }

    /// One device per distinct device reference, ordered by id.
    ///
    /// A device's location is the first one named by any of its resources,
    /// in listing order. Descriptive fields come from the first resource
    /// carrying them.
    #[must_use]
    pub fn infer_devices(&self, resources: &[Resource]) -> Vec<DeviceRecord> {
        let mut devices: BTreeMap<&str, DeviceRecord> = BTreeMap::new();
        for resource in resources {
            let Some(device) = self.device_ref(resource) else {
                continue;
            };
            let record = devices.entry(device).or_insert_with(|| DeviceRecord {
                external_id: device.to_string(),
                name: String::new(),
                manufacturer: None,
                model: None,
                sw_version: None,
                location_ref: None,
            });

            let attrs = &resource.attributes;
            if record.name.is_empty() {
                if let Some(name) = attrs.first_text(&["device_name"]) {
                    record.name = name.to_string();
                }
            }
            fill(&mut record.manufacturer, attrs.first_text(&["manufacturer"]));
            fill(&mut record.model, attrs.first_text(&["model"]));
            fill(&mut record.sw_version, attrs.first_text(&["sw_version"]));
            fill(&mut record.location_ref, self.location_ref(resource));
        }

        devices
            .into_values()
            .map(|mut device| {
                if device.name.is_empty() {
                    device.name = device.external_id.clone();
                }
                device
            })
            .collect()
    }
}

impl Default for RelationshipInferer {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

fn explicit(reference: Option<&str>) -> Option<&str> {
    reference.map(str::trim).filter(|r| !r.is_empty())
}

fn fill(slot: &mut Option<String>, value: Option<&str>) {
    if slot.is_none() {
        *slot = value.map(str::to_string);
    }
}

/// `living_room` → `Living Room`.
fn humanize(id: &str) -> String {
    id.split(|c: char| c == '_' || c == '-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
