//! Per-run key/value store.
//!
//! Holds curriculum-derived facts (region counts, recorded checkpoint jobs)
//! that later invocations and the job scripts themselves read back.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{tlog_debug, Result};

#[derive(Debug, Clone, Default)]
pub struct EnvStore {
    values: BTreeMap<String, String>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl EnvStore {
    /// In-memory store that is never written.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let values = if path.exists() {
            toml::from_str(&fs::read_to_string(path)?)?
        } else {
            BTreeMap::new()
        };
        tlog_debug!("EnvStore::load path={} keys={}", path.display(), values.len());
        Ok(Self {
            values,
            path: Some(path.to_path_buf()),
            dirty: false,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn set(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        if self.values.get(key) != Some(&value) {
            tlog_debug!("EnvStore::set {}={}", key, value);
            self.values.insert(key.to_string(), value);
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist if anything changed and the store is file-backed.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(&self.values)?)?;
        self.dirty = false;
        Ok(())
    }
}
