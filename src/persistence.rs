// src/persistence.rs
//
// JSON-document storage for the learned stores. Every store is one document;
// writes replace it atomically, reads fall back to the store's default state.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How a store's persisted state was obtained at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    /// No document yet (first run)
    Missing,
    /// The document could not be read or parsed; defaults were used
    Corrupt,
}

/// Loads `path` as JSON. Absence and corruption both yield `T::default()`;
/// corruption is logged as a warning and never fails the caller.
pub fn load_or_default<T>(path: &Path, store_label: &str) -> (T, LoadStatus)
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        info!(
            "No persisted {} found at {}, starting from defaults",
            store_label,
            path.display()
        );
        return (T::default(), LoadStatus::Missing);
    }

    let parsed = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))
        .and_then(|raw| {
            serde_json::from_str::<T>(&raw)
                .with_context(|| format!("Failed to parse {}", path.display()))
        });

    match parsed {
        Ok(value) => {
            info!("Loaded {} from {}", store_label, path.display());
            (value, LoadStatus::Loaded)
        }
        Err(e) => {
            warn!(
                "Persisted {} is unreadable ({:#}). Falling back to defaults.",
                store_label, e
            );
            (T::default(), LoadStatus::Corrupt)
        }
    }
}

/// Serializes `value` to a sibling temp file, then renames it over `path`.
pub fn save_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }

    let payload = serde_json::to_string_pretty(value).context("Failed to serialize document")?;
    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, payload)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "Failed to move {} into place at {}",
            tmp_path.display(),
            path.display()
        )
    })?;

    debug!("Persisted document to {}", path.display());
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    file_name.push(".tmp");
    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Doc {
        counter: u32,
    }

    #[test]
    fn missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let (doc, status): (Doc, _) = load_or_default(&dir.path().join("none.json"), "doc");
        assert_eq!(doc, Doc::default());
        assert_eq!(status, LoadStatus::Missing);
    }

    #[test]
    fn corrupt_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, "{ not json").unwrap();
        let (doc, status): (Doc, _) = load_or_default(&path, "doc");
        assert_eq!(doc, Doc::default());
        assert_eq!(status, LoadStatus::Corrupt);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        save_atomic(&path, &Doc { counter: 7 }).unwrap();
        let (doc, status): (Doc, _) = load_or_default(&path, "doc");
        assert_eq!(doc.counter, 7);
        assert_eq!(status, LoadStatus::Loaded);
        assert!(!temp_path_for(&path).exists());
    }
}
