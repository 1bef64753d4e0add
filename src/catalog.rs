use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SongwaveError};

/// One rendered video.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub artist: String,
    pub path: PathBuf,
}

impl CatalogEntry {
    pub fn matches(&self, name: &str, artist: &str) -> bool {
        self.name == name && self.artist == artist
    }
}

/// The list of rendered videos, backed by a JSON array on disk.
///
/// The file is read once on [`Catalog::load`] and rewritten whole on
/// [`Catalog::save`]; nothing is written in between.
#[derive(Debug)]
pub struct Catalog {
    path: PathBuf,
    entries: Vec<CatalogEntry>,
    /// The file on disk failed to parse and has not been backed up yet.
    corrupt: bool,
}

impl Catalog {
    /// Read the catalog at `path`. A missing, empty or unparseable file is an
    /// empty catalog; the parse failure is logged and the file is moved to
    /// [`Catalog::backup_path`] before the first save.
    pub fn load(path: &Path) -> Self {
        let mut corrupt = false;
        let entries = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    log::error!("Catalog {} is corrupt, treating as empty: {}", path.display(), e);
                    corrupt = true;
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                log::error!("Could not read catalog {}: {}", path.display(), e);
                Vec::new()
            }
        };

        log::debug!("Loaded {} catalog entries from {}", entries.len(), path.display());
        Self {
            path: path.to_path_buf(),
            entries,
            corrupt,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `videos.json` becomes `videos.json.bak`.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn find(&self, name: &str, artist: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.matches(name, artist))
    }

    /// Case-insensitive substring match on name or artist.
    pub fn search(&self, query: &str) -> Vec<&CatalogEntry> {
        let needle = query.to_lowercase();
        self.entries
            .iter()
            .filter(|e| {
                e.name.to_lowercase().contains(&needle) || e.artist.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Record a rendered video. An existing (name, artist) entry is repointed
    /// instead of duplicated.
    pub fn add(&mut self, entry: CatalogEntry) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.matches(&entry.name, &entry.artist))
        {
            log::info!("Updating catalog entry {} / {}", entry.name, entry.artist);
            existing.path = entry.path;
        } else {
            log::info!("Adding catalog entry {} / {}", entry.name, entry.artist);
            self.entries.push(entry);
        }
    }

    /// Drop the first record matching (name, artist), leaving the rest in order.
    pub fn remove(&mut self, name: &str, artist: &str) -> Option<CatalogEntry> {
        let idx = self.entries.iter().position(|e| e.matches(name, artist))?;
        Some(self.entries.remove(idx))
    }

    /// Whether any record still points at `path`.
    pub fn references(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    /// Remove the record, save, then delete its video unless another record
    /// still points at the same file.
    pub fn delete(&mut self, name: &str, artist: &str) -> Result<Option<CatalogEntry>> {
        let Some(entry) = self.remove(name, artist) else {
            return Ok(None);
        };
        self.save()?;

        if self.references(&entry.path) {
            log::warn!(
                "Keeping {}: still referenced by another catalog entry",
                entry.path.display()
            );
        } else {
            match std::fs::remove_file(&entry.path) {
                Ok(()) => log::info!("Deleted {}", entry.path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::warn!("Video {} was already gone", entry.path.display())
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Some(entry))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }

    pub fn save(&mut self) -> Result<()> {
        let persistence = |reason: String| SongwaveError::Persistence {
            path: self.path.clone(),
            reason,
        };

        let json = self.to_json().map_err(|e| persistence(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| persistence(e.to_string()))?;
        }
        if self.corrupt {
            let backup = self.backup_path();
            std::fs::rename(&self.path, &backup)
                .map_err(|e| persistence(format!("backing up to {}: {e}", backup.display())))?;
            log::warn!("Moved unreadable catalog to {}", backup.display());
        }
        std::fs::write(&self.path, json).map_err(|e| persistence(e.to_string()))?;
        self.corrupt = false;

        log::debug!("Saved {} catalog entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}
