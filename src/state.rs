//! Last-applied state, stored as JSON next to the plan file

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{Resource, StateStore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// Contents of the state file
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlanState {
    /// Resources recorded by the last apply
    #[serde(default)]
    pub resources: Vec<Resource>,

    /// Last time the state was written
    pub last_updated: Option<DateTime<Utc>>,
}

// ============================================================================
// JSON store
// ============================================================================

/// [`StateStore`] backed by a JSON file
///
/// Saving renames the previous file to `<file>.bak` before writing, so the
/// last two states are always on disk.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for a plan file, using the configured state file name
    pub fn for_plan(plan: &Path, file_name: &str) -> Self {
        Self::new(crate::paths::plan_dir(plan).join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the previous state
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Read the full state file, `None` when nothing was applied yet
    pub fn read(&self) -> Result<Option<PlanState>> {
        if !self.path.exists() {
            log::debug!("State file {} does not exist", self.path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;
        let state: PlanState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", self.path.display()))?;

        log::debug!(
            "Loaded {} resource(s) from {}",
            state.resources.len(),
            self.path.display()
        );
        Ok(Some(state))
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<Vec<Resource>> {
        Ok(self.read()?.map(|s| s.resources).unwrap_or_default())
    }

    fn save(&self, resources: &[Resource]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        if self.path.exists() {
            let backup = self.backup_path();
            fs::rename(&self.path, &backup)
                .with_context(|| format!("Failed to back up state to {}", backup.display()))?;
        }

        let state = PlanState {
            resources: resources.to_vec(),
            last_updated: Some(Utc::now()),
        };
        let content = serde_json::to_string_pretty(&state).context("Failed to serialize state")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write state file: {}", self.path.display()))?;

        log::debug!(
            "Saved {} resource(s) to {}",
            resources.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resources(version: u32) -> Vec<Resource> {
        vec![
            Resource::new("Phase", "init", json!({"version": version})),
            Resource::new("Database", "orders", json!({})),
        ]
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join(".plan_state.json"));
        assert!(store.load().unwrap().is_empty());
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join(".plan_state.json"));

        store.save(&resources(1)).unwrap();
        assert_eq!(store.load().unwrap(), resources(1));
        assert!(store.read().unwrap().unwrap().last_updated.is_some());
        assert!(!store.backup_path().exists());
    }

    #[test]
    fn test_save_keeps_previous_state_as_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join(".plan_state.json"));

        store.save(&resources(1)).unwrap();
        store.save(&resources(2)).unwrap();

        assert_eq!(
            store.backup_path(),
            dir.path().join(".plan_state.json.bak")
        );
        let backup = JsonStateStore::new(store.backup_path());
        assert_eq!(backup.load().unwrap(), resources(1));
        assert_eq!(store.load().unwrap(), resources(2));
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("state.json"));
        store.save(&resources(1)).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert!(raw["resources"].is_array());
        assert_eq!(raw["resources"][0]["kind"], "Phase");
        assert!(raw["last_updated"].is_string());
    }

    #[test]
    fn test_for_plan_uses_plan_directory() {
        let store = JsonStateStore::for_plan(Path::new("plans/plan.yaml"), ".plan_state.json");
        assert_eq!(store.path(), Path::new("plans/.plan_state.json"));
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".plan_state.json");
        fs::write(&path, "not json").unwrap();
        assert!(JsonStateStore::new(path).load().is_err());
    }
}
