//! File-backed policy store
//!
//! Layout under the data directory:
//! - `apolice_<id>.json`: one live record per policy
//! - `apolices_excluidas/apolice_<id>.json`: archived records
//! - `apolices_monitoradas.json`: the monitored index, a JSON array of ids
//!
//! Records are rewritten atomically (temp file, fsync, rename). Mutations hold
//! an in-process mutex and the directory's advisory [`FileLock`], and always
//! re-read the record from disk inside that section.

use parking_lot::Mutex;
use pluvia_core::{Error, Policy, PolicyDraft, PolicyId, Result};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::file_lock::FileLock;
use crate::traits::{next_policy_id, PolicyStore, TriggerCommit};

const RECORD_PREFIX: &str = "apolice_";
const RECORD_SUFFIX: &str = ".json";
const ARCHIVE_DIR: &str = "apolices_excluidas";
const INDEX_FILE: &str = "apolices_monitoradas.json";

/// Monitored index entry; older tooling wrote `{"policy_id": n}` objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum IndexEntry {
    Id(PolicyId),
    Object { policy_id: PolicyId },
}

impl IndexEntry {
    fn id(&self) -> PolicyId {
        match self {
            Self::Id(id) | Self::Object { policy_id: id } => *id,
        }
    }
}

/// Policy store persisted as JSON files in a directory
pub struct FilePolicyStore {
    root: PathBuf,
    archive_dir: PathBuf,
    index_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePolicyStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let archive_dir = root.join(ARCHIVE_DIR);
        fs::create_dir_all(&archive_dir)?;

        info!("Policy store opened at {:?}", root);

        Ok(Self {
            index_path: root.join(INDEX_FILE),
            root,
            archive_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the live records
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: PolicyId) -> PathBuf {
        self.root.join(record_file_name(id))
    }

    fn archived_path(&self, id: PolicyId) -> PathBuf {
        self.archive_dir.join(record_file_name(id))
    }

    /// Run a mutation under both the in-process and the cross-process lock
    fn with_write_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock();
        let _file_lock = FileLock::acquire(&self.root)?;
        f()
    }

    fn read_index(&self) -> Result<Vec<PolicyId>> {
        let content = match fs::read_to_string(&self.index_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries: Vec<IndexEntry> = serde_json::from_str(&content)?;
        let mut ids: Vec<PolicyId> = Vec::with_capacity(entries.len());
        for id in entries.iter().map(IndexEntry::id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn write_index(&self, ids: &[PolicyId]) -> Result<()> {
        let json = serde_json::to_vec_pretty(ids)?;
        atomic_write(&self.index_path, &json)
    }

    fn update_index(&self, f: impl FnOnce(&mut Vec<PolicyId>)) -> Result<()> {
        let mut ids = self.read_index()?;
        let before = ids.clone();
        f(&mut ids);
        if ids != before {
            self.write_index(&ids)?;
        }
        Ok(())
    }

    fn write_record(&self, path: &Path, policy: &Policy) -> Result<()> {
        let json = serde_json::to_vec_pretty(policy)?;
        atomic_write(path, &json)
    }

    fn scan_dir(&self, dir: &Path) -> Result<Vec<Policy>> {
        let mut policies = Vec::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_record_file_name)
            else {
                continue;
            };

            match read_record(&path) {
                Ok(Some(policy)) if policy.id == id => policies.push(policy),
                Ok(Some(policy)) => warn!(
                    "Record {:?} holds policy {} instead of {}, skipping",
                    path, policy.id, id
                ),
                Ok(None) => {}
                Err(Error::Serialization(e)) => {
                    error!(policy_id = %id, error = %e, "Unreadable policy record, skipping")
                }
                Err(e) => return Err(e),
            }
        }

        policies.sort_by_key(|p| p.id);
        Ok(policies)
    }

    fn all_ids(&self) -> Result<Vec<PolicyId>> {
        let mut ids = Vec::new();
        for dir in [&self.root, &self.archive_dir] {
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                if let Some(id) = entry.file_name().to_str().and_then(parse_record_file_name) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }
}

impl PolicyStore for FilePolicyStore {
    fn list_monitored(&self) -> Result<Vec<Policy>> {
        let mut policies = Vec::new();

        for id in self.read_index()? {
            match read_record(&self.record_path(id)) {
                Ok(Some(policy)) => policies.push(policy),
                Ok(None) => warn!(policy_id = %id, "Monitored policy has no live record, skipping"),
                Err(Error::Serialization(e)) => {
                    error!(policy_id = %id, error = %e, "Unreadable policy record, skipping")
                }
                Err(e) => return Err(e),
            }
        }

        Ok(policies)
    }

    fn list_live(&self) -> Result<Vec<Policy>> {
        self.scan_dir(&self.root)
    }

    fn list_archived(&self) -> Result<Vec<Policy>> {
        self.scan_dir(&self.archive_dir)
    }

    fn load(&self, id: PolicyId) -> Result<Policy> {
        if let Some(policy) = read_record(&self.record_path(id))? {
            return Ok(policy);
        }
        read_record(&self.archived_path(id))?.ok_or(Error::NotFound(id))
    }

    fn commit_trigger(&self, commit: &TriggerCommit) -> Result<Policy> {
        self.with_write_lock(|| {
            let path = self.record_path(commit.policy_id);
            let Some(mut policy) = read_record(&path)? else {
                if self.archived_path(commit.policy_id).exists() {
                    return Err(Error::conflict(commit.policy_id, "policy was archived"));
                }
                return Err(Error::NotFound(commit.policy_id));
            };

            commit.validate(&policy)?;
            commit.apply(&mut policy);
            self.write_record(&path, &policy)?;

            debug!(
                policy_id = %policy.id,
                trigger_count = policy.trigger_count,
                "Trigger committed to disk"
            );
            Ok(policy)
        })
    }

    fn register(&self, draft: PolicyDraft) -> Result<PolicyId> {
        draft.validate()?;

        self.with_write_lock(|| {
            let id = next_policy_id(self.all_ids()?);
            let policy = Policy::from_draft(id, draft);

            self.write_record(&self.record_path(id), &policy)?;
            self.update_index(|ids| {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            })?;

            info!(policy_id = %id, location = %policy.location, "Policy registered");
            Ok(id)
        })
    }

    fn deactivate(&self, id: PolicyId) -> Result<Policy> {
        self.with_write_lock(|| {
            let live_path = self.record_path(id);
            let mut policy = read_record(&live_path)?.ok_or(Error::NotFound(id))?;

            // Unmonitor first so a crash mid-way never leaves it evaluated
            self.update_index(|ids| ids.retain(|m| *m != id))?;

            policy.active = false;
            self.write_record(&self.archived_path(id), &policy)?;
            fs::remove_file(&live_path)?;

            info!(policy_id = %id, "Policy archived");
            Ok(policy)
        })
    }

    fn restore(&self, id: PolicyId) -> Result<Policy> {
        self.with_write_lock(|| {
            let live_path = self.record_path(id);
            if live_path.exists() {
                return Err(Error::AlreadyExists(id));
            }
            let archived_path = self.archived_path(id);
            let mut policy = read_record(&archived_path)?.ok_or(Error::NotFound(id))?;

            policy.active = true;
            self.write_record(&live_path, &policy)?;
            fs::remove_file(&archived_path)?;
            self.update_index(|ids| {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            })?;

            info!(policy_id = %id, "Policy restored");
            Ok(policy)
        })
    }

    fn set_monitored(&self, id: PolicyId, monitored: bool) -> Result<()> {
        self.with_write_lock(|| {
            if !self.record_path(id).exists() {
                return Err(Error::NotFound(id));
            }
            self.update_index(|ids| {
                if monitored {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                } else {
                    ids.retain(|m| *m != id);
                }
            })
        })
    }
}

fn record_file_name(id: PolicyId) -> String {
    format!("{RECORD_PREFIX}{id}{RECORD_SUFFIX}")
}

fn parse_record_file_name(name: &str) -> Option<PolicyId> {
    name.strip_prefix(RECORD_PREFIX)?
        .strip_suffix(RECORD_SUFFIX)?
        .parse()
        .ok()
}

fn read_record(path: &Path) -> Result<Option<Policy>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
