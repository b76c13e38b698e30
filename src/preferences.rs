// Durable key -> number store for values that must survive power cycles
//
// The file is a flat JSON object, e.g. {"FrontLeft": 1187.0}. Every write
// replaces it atomically so a power loss never leaves a half-written file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum PreferencesError {
    #[error("Preferences IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Preferences file {} JSON error: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Single-key durable storage of numbers
pub trait PreferenceStore {
    fn set_double(&mut self, key: &str, value: f64) -> Result<(), PreferencesError>;

    /// `None` when nothing was ever stored under `key`
    fn get_double(&self, key: &str) -> Option<f64>;
}

/// Preferences persisted to a JSON file
#[derive(Debug)]
pub struct JsonPreferences {
    path: PathBuf,
    values: BTreeMap<String, f64>,
}

impl JsonPreferences {
    /// Load the store at `path`; a missing file is an empty store
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| PreferencesError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No preferences at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(source) => return Err(PreferencesError::Io { path, source }),
        };
        Ok(Self { path, values })
    }

    /// All stored entries in key order
    pub fn entries(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    fn persist(&self) -> Result<(), PreferencesError> {
        let io_err = |source: std::io::Error| PreferencesError::Io {
            path: self.path.clone(),
            source,
        };
        let text = serde_json::to_string_pretty(&self.values).map_err(|source| {
            PreferencesError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, text).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!("Preferences written to {}", self.path.display());
        Ok(())
    }
}

impl PreferenceStore for JsonPreferences {
    fn set_double(&mut self, key: &str, value: f64) -> Result<(), PreferencesError> {
        let previous = self.values.insert(key.to_string(), value);
        if let Err(e) = self.persist() {
            // keep memory consistent with disk
            match previous {
                Some(v) => self.values.insert(key.to_string(), v),
                None => self.values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn get_double(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}

/// Non-durable store for tests and simulation
#[derive(Debug, Default, Clone)]
pub struct MemoryPreferences {
    values: BTreeMap<String, f64>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn set_double(&mut self, key: &str, value: f64) -> Result<(), PreferencesError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn get_double(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("swerve-prefs-{}-{}", std::process::id(), name));
        fs::create_dir_all(&dir).unwrap();
        dir.join("prefs.json")
    }

    #[test]
    fn test_missing_file_is_empty() {
        let path = scratch_path("missing");
        let _ = fs::remove_file(&path);
        let prefs = JsonPreferences::open(&path).unwrap();
        assert_eq!(prefs.get_double("FrontLeft"), None);
        assert_eq!(prefs.entries().count(), 0);
    }

    #[test]
    fn test_values_survive_reopen() {
        let path = scratch_path("reopen");
        let _ = fs::remove_file(&path);

        let mut prefs = JsonPreferences::open(&path).unwrap();
        prefs.set_double("FrontLeft", 1187.0).unwrap();
        prefs.set_double("RearRight", -12.5).unwrap();
        prefs.set_double("FrontLeft", 1190.0).unwrap();
        drop(prefs);

        let reopened = JsonPreferences::open(&path).unwrap();
        assert_eq!(reopened.get_double("FrontLeft"), Some(1190.0));
        assert_eq!(reopened.get_double("RearRight"), Some(-12.5));
        let keys: Vec<&str> = reopened.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["FrontLeft", "RearRight"]);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let path = scratch_path("corrupt");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonPreferences::open(&path),
            Err(PreferencesError::Parse { .. })
        ));
    }

    #[test]
    fn test_memory_store() {
        let mut prefs = MemoryPreferences::new();
        assert_eq!(prefs.get_double("x"), None);
        prefs.set_double("x", 3.0).unwrap();
        assert_eq!(prefs.get_double("x"), Some(3.0));
    }
}
