use crate::models::{AppResult, WatcherState};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// JSON file holding the notified-slot record between runs.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record. A missing, unreadable, corrupt or oddly shaped file yields an empty state.
    pub fn load(&self) -> WatcherState {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file yet");
                return WatcherState::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file unreadable, starting empty");
                return WatcherState::default();
            }
        };

        let document: serde_json::Value = match serde_json::from_str(&text) {
            Ok(document) => document,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file corrupt, starting empty");
                return WatcherState::default();
            }
        };

        let Some(seen) = document.get("seen").and_then(|seen| seen.as_object()) else {
            warn!(path = %self.path.display(), "state file has no seen map, starting empty");
            return WatcherState::default();
        };

        let seen: BTreeMap<String, String> = seen
            .iter()
            .filter_map(|(key, value)| value.as_str().map(|stamp| (key.clone(), stamp.to_string())))
            .collect();
        debug!(path = %self.path.display(), entries = seen.len(), "state loaded");
        WatcherState { seen }
    }

    /// Overwrites the record with pretty-printed JSON through a temporary sibling and a rename,
    /// so readers see either the old or the new file.
    pub fn save(&self, state: &WatcherState) -> AppResult<()> {
        let json = serde_json::to_string_pretty(state)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state.json".to_string());
        let tmp = self.path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!(path = %self.path.display(), entries = state.len(), "state saved");
        Ok(())
    }
}
