//! Named numeric tunables with defaults.
//!
//! Commands read tunables fresh every cycle (e.g. the tape-approach offsets
//! published under `cameraTable/…`), so a value changed by an operator or a
//! co-processor takes effect on the next control cycle.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use tracing::warn;

/// Source of named numeric values.
pub trait Tunables: Send {
    /// Return the value stored under `key`, or `default` when it is absent.
    fn number(&self, key: &str, default: f64) -> f64;
}

/// Thread-safe in-memory tunables table.  Clones share the same storage.
///
/// # Example
///
/// ```
/// use krypton_hal::tunables::{SharedTunables, Tunables};
///
/// let table = SharedTunables::new();
/// assert_eq!(table.number("cameraTable/tapeStrafe", 0.0), 0.0);
///
/// table.set("cameraTable/tapeStrafe", 12.5);
/// assert_eq!(table.number("cameraTable/tapeStrafe", 0.0), 12.5);
/// ```
#[derive(Clone, Default)]
pub struct SharedTunables {
    values: Arc<RwLock<HashMap<String, f64>>>,
}

impl SharedTunables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set(&self, key: &str, value: f64) {
        match self.values.write() {
            Ok(mut values) => {
                values.insert(key.to_string(), value);
            }
            Err(_) => warn!(key, "tunables table poisoned; value dropped"),
        }
    }

    /// Remove `key` so readers fall back to their defaults.
    pub fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
    }

    /// Sorted copy of every stored value.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.values
            .read()
            .map(|values| values.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for SharedTunables {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let values = iter.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            values: Arc::new(RwLock::new(values)),
        }
    }
}

impl Tunables for SharedTunables {
    fn number(&self, key: &str, default: f64) -> f64 {
        match self.values.read() {
            Ok(values) => values.get(key).copied().unwrap_or(default),
            Err(_) => default,
        }
    }
}
