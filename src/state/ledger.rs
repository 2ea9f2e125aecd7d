//! Job ledger: the last dependency vector each phase produced.
//!
//! This is the only thing persisted between invocations. When no explicit
//! restart spec is given, a phase reads its previous vector back from here so
//! that jobs already in the scheduler's queue are not submitted twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::core::DependencyVector;
use crate::{tlog_debug, Result};

const LEDGER_VERSION: u32 = 1;

/// Identifier of one trioctl invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerRecord {
    pub vector: DependencyVector,
    pub run_id: RunId,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLedger {
    pub version: u32,
    /// `<genome>/<phase>/<role>` -> record.
    pub records: BTreeMap<String, LedgerRecord>,
    #[serde(skip)]
    path: PathBuf,
}

impl JobLedger {
    pub fn new(path: &Path) -> Self {
        Self {
            version: LEDGER_VERSION,
            records: BTreeMap::new(),
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `owner` is the genome whose outputs the phase writes.
    pub fn key(owner: &str, phase: &str, role: &str) -> String {
        format!("{}/{}/{}", owner, phase, role)
    }

    pub fn load(path: &Path) -> Result<Self> {
        tlog_debug!("JobLedger::load path={}", path.display());

        if !path.exists() {
            tlog_debug!("Ledger not found, starting empty");
            return Ok(Self::new(path));
        }

        let contents = fs::read_to_string(path)?;
        let mut ledger: JobLedger = serde_json::from_str(&contents)?;
        ledger.path = path.to_path_buf();
        tlog_debug!("Ledger loaded: {} records", ledger.records.len());
        Ok(ledger)
    }

    pub fn get(&self, key: &str) -> Option<&LedgerRecord> {
        self.records.get(key)
    }

    pub fn record(&mut self, key: &str, vector: &DependencyVector, run_id: RunId) {
        self.records.insert(
            key.to_string(),
            LedgerRecord {
                vector: vector.clone(),
                run_id,
                recorded_at: Utc::now(),
            },
        );
    }

    /// Records whose key starts with `prefix`, in key order.
    pub fn records_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a LedgerRecord)> + 'a {
        self.records.iter().filter(move |(k, _)| k.starts_with(prefix))
    }

    /// Write atomically, keeping the previous file as `.json.bak`.
    pub fn save(&self) -> Result<()> {
        tlog_debug!("JobLedger::save records={}", self.records.len());
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        if self.path.exists() {
            let backup_path = self.path.with_extension("json.bak");
            fs::copy(&self.path, &backup_path)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&temp_path, &contents)?;
        fs::rename(&temp_path, &self.path)?;
        tlog_debug!("Ledger saved: {}", self.path.display());
        Ok(())
    }
}
