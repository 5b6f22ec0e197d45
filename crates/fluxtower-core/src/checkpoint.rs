use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const LAST_CONTACT_FILE: &str = "last_contact.json";
pub const MANIFEST_FILE: &str = "files_downloaded.json";

/// File names already present locally, keyed by source category (e.g. `"summaries"`).
pub type Manifest = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LastContact {
    last_contact: NaiveDateTime,
}

/// JSON checkpoints kept in the local data directory between runs.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load_last_contact(&self) -> Result<Option<NaiveDateTime>> {
        let stored: Option<LastContact> = self.read(LAST_CONTACT_FILE)?;
        Ok(stored.map(|entry| entry.last_contact))
    }

    pub fn save_last_contact(&self, last_contact: NaiveDateTime) -> Result<()> {
        self.write(LAST_CONTACT_FILE, &LastContact { last_contact })
    }

    pub fn load_manifest(&self) -> Result<Option<Manifest>> {
        self.read(MANIFEST_FILE)
    }

    pub fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        self.write(MANIFEST_FILE, manifest)
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| PipelineError::Checkpoint { path, source })
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_vec_pretty(value)?)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}
