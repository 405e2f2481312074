use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveTime;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::model::new_record_id;
use crate::model::zone::{Coordinates, Zone, ZoneId, ZoneSpec, validate_radius, validate_shift};
use crate::store::{Collection, RecordStore};

/// Zone geometry and the enrollment roster.
///
/// Writers take `write_lock` and hold it across the record-store write, so
/// every roster mutation is a single check-and-set: a failed write leaves the
/// roster untouched, and two concurrent assignments of the same user can never
/// both pass the exclusivity check. Readers only touch the `zones` table,
/// which a writer updates after its write succeeds, so sampling never waits on
/// a roster change or on the store.
pub struct ZoneRegistry {
    store: Arc<dyn RecordStore>,
    zones: RwLock<HashMap<ZoneId, Zone>>,
    write_lock: Mutex<()>,
}

impl ZoneRegistry {
    pub async fn load(store: Arc<dyn RecordStore>) -> Result<Self, EngineError> {
        let mut zones = HashMap::new();
        for record in store.load(Collection::Zones).await? {
            let zone: Zone = serde_json::from_value(record.body)?;
            zones.insert(zone.id.clone(), zone);
        }
        info!(zones = zones.len(), "Zone registry loaded");

        Ok(Self {
            store,
            zones: RwLock::new(zones),
            write_lock: Mutex::new(()),
        })
    }

    pub async fn create_zone(&self, spec: ZoneSpec) -> Result<Zone, EngineError> {
        spec.validate()?;
        let zone = spec.into_zone(new_record_id());

        let _writer = self.write_lock.lock().await;
        self.persist(&zone).await?;
        self.zones.write().insert(zone.id.clone(), zone.clone());

        info!(zone_id = %zone.id, name = %zone.name, "Zone created");
        Ok(zone)
    }

    /// Enrolls `user_id` in `zone_id`. No-op when already enrolled there.
    pub async fn assign(&self, user_id: &str, zone_id: &str) -> Result<(), EngineError> {
        let _writer = self.write_lock.lock().await;

        let mut updated = {
            let zones = self.zones.read();
            let target = zones
                .get(zone_id)
                .ok_or_else(|| EngineError::not_found(format!("zone {zone_id} not found")))?;
            if target.has_member(user_id) {
                return Ok(());
            }

            if let Some(other) = zones
                .values()
                .find(|z| z.id != zone_id && z.has_member(user_id))
            {
                warn!(user_id, zone_id, other_zone_id = %other.id, "Rejected double zone assignment");
                return Err(EngineError::conflict("already assigned elsewhere"));
            }
            target.clone()
        };

        updated.assigned_user_ids.insert(user_id.to_string());
        self.persist(&updated).await?;
        self.zones.write().insert(updated.id.clone(), updated);

        info!(user_id, zone_id, "User assigned to zone");
        Ok(())
    }

    pub async fn unassign(&self, user_id: &str, zone_id: &str) -> Result<(), EngineError> {
        let _writer = self.write_lock.lock().await;

        let mut updated = self.get(zone_id)?;
        if !updated.has_member(user_id) {
            return Err(EngineError::not_found(format!(
                "user {user_id} is not assigned to zone {zone_id}"
            )));
        }

        updated.assigned_user_ids.remove(user_id);
        self.persist(&updated).await?;
        self.zones.write().insert(updated.id.clone(), updated);

        info!(user_id, zone_id, "User removed from zone");
        Ok(())
    }

    /// Moves or resizes the fence. Samples already being classified keep the
    /// geometry they read.
    pub async fn update_geometry(
        &self,
        zone_id: &str,
        center: Coordinates,
        radius_meters: f64,
    ) -> Result<Zone, EngineError> {
        center.validate()?;
        validate_radius(radius_meters)?;

        self.modify(zone_id, |zone| {
            zone.center_lat = center.lat;
            zone.center_lng = center.lng;
            zone.radius_meters = radius_meters;
        })
        .await
    }

    pub async fn update_schedule(
        &self,
        zone_id: &str,
        shift_start: NaiveTime,
        shift_end: NaiveTime,
    ) -> Result<Zone, EngineError> {
        validate_shift(shift_start, shift_end)?;

        self.modify(zone_id, |zone| {
            zone.shift_start = shift_start;
            zone.shift_end = shift_end;
        })
        .await
    }

    pub async fn remove_zone(&self, zone_id: &str) -> Result<Zone, EngineError> {
        let _writer = self.write_lock.lock().await;
        if !self.zones.read().contains_key(zone_id) {
            return Err(EngineError::not_found(format!("zone {zone_id} not found")));
        }

        self.store.delete(Collection::Zones, zone_id).await?;
        let removed = self
            .zones
            .write()
            .remove(zone_id)
            .ok_or_else(|| EngineError::not_found(format!("zone {zone_id} not found")))?;

        info!(zone_id, members = removed.assigned_user_ids.len(), "Zone removed");
        Ok(removed)
    }

    pub fn zone_of(&self, user_id: &str) -> Option<Zone> {
        self.zones
            .read()
            .values()
            .find(|z| z.has_member(user_id))
            .cloned()
    }

    pub fn get(&self, zone_id: &str) -> Result<Zone, EngineError> {
        self.zones
            .read()
            .get(zone_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("zone {zone_id} not found")))
    }

    /// All zones, ordered by name.
    pub fn list(&self) -> Vec<Zone> {
        let mut zones: Vec<Zone> = self.zones.read().values().cloned().collect();
        zones.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        zones
    }

    async fn modify(&self, zone_id: &str, apply: impl FnOnce(&mut Zone)) -> Result<Zone, EngineError> {
        let _writer = self.write_lock.lock().await;
        let mut updated = self.get(zone_id)?;

        apply(&mut updated);
        self.persist(&updated).await?;
        self.zones.write().insert(updated.id.clone(), updated.clone());

        info!(zone_id, "Zone updated");
        Ok(updated)
    }

    async fn persist(&self, zone: &Zone) -> Result<(), EngineError> {
        let body = serde_json::to_value(zone)?;
        self.store.put(Collection::Zones, &zone.id, &body).await?;
        Ok(())
    }
}
