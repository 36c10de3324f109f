//! Saved scripts, kept as a JSON list next to the settings.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SavedScript {
    pub id: u64,
    pub title: String,
    pub text: String,
    /// RFC 3339 time of the save.
    #[serde(default)]
    pub saved_at: String,
}

/// A named-script collection backed by one JSON file.
#[derive(Debug)]
pub struct ScriptLibrary {
    path: PathBuf,
    scripts: Vec<SavedScript>,
}

impl ScriptLibrary {
    /// Open the library at `path`. A missing or unreadable file gives an
    /// empty library.
    pub fn open(path: &Path) -> Self {
        let scripts = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Vec<SavedScript>>(&raw) {
                Ok(scripts) => {
                    debug!("Loaded {} saved scripts", scripts.len());
                    scripts
                }
                Err(e) => {
                    warn!("Failed to parse script library {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No script library at {}, starting empty", path.display());
                Vec::new()
            }
            Err(e) => {
                warn!("Failed to read script library {}: {}", path.display(), e);
                Vec::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            scripts,
        }
    }

    pub fn list(&self) -> &[SavedScript] {
        &self.scripts
    }

    pub fn get(&self, id: u64) -> Result<&SavedScript> {
        self.scripts
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow!("Saved script {} not found", id))
    }

    /// Store `text` under `title` and write the library back.
    pub fn save(&mut self, title: &str, text: &str) -> Result<SavedScript> {
        let title = title.trim();
        if title.is_empty() {
            return Err(anyhow!("Script title must not be empty"));
        }

        let id = self.scripts.iter().map(|s| s.id).max().map_or(1, |max| max + 1);
        let script = SavedScript {
            id,
            title: title.to_string(),
            text: text.to_string(),
            saved_at: chrono::Utc::now().to_rfc3339(),
        };
        self.scripts.push(script.clone());
        self.write()?;
        info!("Saved script {} \"{}\"", id, script.title);
        Ok(script)
    }

    pub fn delete(&mut self, id: u64) -> Result<()> {
        let initial_len = self.scripts.len();
        self.scripts.retain(|s| s.id != id);

        if self.scripts.len() < initial_len {
            self.write()?;
            info!("Deleted saved script {}", id);
            Ok(())
        } else {
            Err(anyhow!("Saved script {} not found", id))
        }
    }

    fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json =
            serde_json::to_string_pretty(&self.scripts).context("Failed to serialize scripts")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_list_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("scripts.json");

        let mut library = ScriptLibrary::open(&path);
        assert!(library.list().is_empty());
        let first = library.save("  Opening  ", "Good evening.").unwrap();
        let second = library.save("Weather", "Tonight we look at the weather.").unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(first.title, "Opening");
        assert_eq!(second.id, 2);
        assert!(!first.saved_at.is_empty());

        let reopened = ScriptLibrary::open(&path);
        assert_eq!(reopened.list().len(), 2);
        assert_eq!(reopened.get(2).unwrap().text, "Tonight we look at the weather.");
    }

    #[test]
    fn test_blank_title_is_rejected() {
        let dir = tempdir().unwrap();
        let mut library = ScriptLibrary::open(&dir.path().join("scripts.json"));
        assert!(library.save("   ", "text").is_err());
        assert!(library.list().is_empty());
        assert!(!dir.path().join("scripts.json").exists());
    }

    #[test]
    fn test_delete_by_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scripts.json");
        let mut library = ScriptLibrary::open(&path);
        library.save("One", "first").unwrap();
        library.save("Two", "second").unwrap();

        library.delete(1).unwrap();
        assert!(library.delete(1).is_err());
        assert!(library.get(1).is_err());

        // ids are not reused after a delete of an earlier entry
        let third = library.save("Three", "third").unwrap();
        assert_eq!(third.id, 3);

        let reopened = ScriptLibrary::open(&path);
        let titles: Vec<&str> = reopened.list().iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Two", "Three"]);
    }

    #[test]
    fn test_corrupt_file_opens_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scripts.json");
        fs::write(&path, "{ not json").unwrap();
        let library = ScriptLibrary::open(&path);
        assert!(library.list().is_empty());
    }

    #[test]
    fn test_entries_without_timestamp_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scripts.json");
        fs::write(&path, r#"[{"id": 7, "title": "Old", "text": "hello"}]"#).unwrap();
        let library = ScriptLibrary::open(&path);
        assert_eq!(library.get(7).unwrap().saved_at, "");
    }
}
