//! Latest-value sensor cache fed by the telemetry subscriber.
//!
//! The station firmware publishes small JSON objects containing any subset
//! of its readings. [`SensorUpdate`] decodes the recognized keys and
//! [`SensorCache`] merges them into a single snapshot that readers copy out.

use std::sync::{PoisonError, RwLock};

use serde_json::{Map, Value};

use crate::models::SensorSnapshot;

// ---

/// Rated maximum of the light sensor; normalized readings scale against it.
pub const LIGHT_SENSOR_MAX_LUX: f64 = 40_000.0;

/// A partial set of readings decoded from one payload.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SensorUpdate {
    // ---
    pub lux: Option<f64>,
    pub temp_c: Option<f64>,
}

impl SensorUpdate {
    /// Decode a raw payload. Returns `None` unless it is a JSON object.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        // ---
        match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(fields)) => Some(Self::from_fields(&fields)),
            _ => None,
        }
    }

    /// Pick the recognized keys out of a field map.
    ///
    /// `lux` is raw lux, `light` a 0.0-1.0 fraction of the sensor's range,
    /// `temp` / `temperature` degrees Celsius. Within one payload `light`
    /// overrides `lux` and `temperature` overrides `temp`. Unknown keys and
    /// non-numeric values are ignored.
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        // ---
        let number = |key: &str| fields.get(key).and_then(Value::as_f64);

        let mut update = SensorUpdate::default();
        if let Some(lux) = number("lux") {
            update.lux = Some(lux);
        }
        if let Some(fraction) = number("light") {
            update.lux = Some(normalized_to_lux(fraction));
        }
        if let Some(temp) = number("temp") {
            update.temp_c = Some(temp);
        }
        if let Some(temp) = number("temperature") {
            update.temp_c = Some(temp);
        }
        update
    }

    pub fn is_empty(&self) -> bool {
        self.lux.is_none() && self.temp_c.is_none()
    }
}

/// Rescale a normalized light reading to lux, rounded to one decimal.
pub fn normalized_to_lux(fraction: f64) -> f64 {
    // ---
    (fraction * LIGHT_SENSOR_MAX_LUX * 10.0).round() / 10.0
}

/// Thread-safe holder of the latest [`SensorSnapshot`].
///
/// Writers merge only the fields they carry; readers always receive a copy,
/// so a concurrent update is never observed half-applied.
#[derive(Debug, Default)]
pub struct SensorCache {
    snapshot: RwLock<SensorSnapshot>,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the supplied fields into the snapshot.
    pub fn update(&self, update: SensorUpdate) {
        // ---
        if update.is_empty() {
            return;
        }
        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(lux) = update.lux {
            snapshot.lux = Some(lux);
        }
        if let Some(temp_c) = update.temp_c {
            snapshot.temp_c = Some(temp_c);
        }
    }

    /// Convenience entry point for an already-parsed field map.
    pub fn update_fields(&self, fields: &Map<String, Value>) {
        self.update(SensorUpdate::from_fields(fields));
    }

    /// Copy of the current snapshot.
    pub fn read(&self) -> SensorSnapshot {
        // ---
        *self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }
}
