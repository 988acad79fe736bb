//! Trigger journal persistence layer
//!
//! Provides file-based persistence for trigger outcomes with:
//! - JSON-lines format for append-only writes
//! - Hash chaining that resumes across restarts and rotations
//! - Size-based rotation
//! - Query, export and chain verification for reconciliation

use crate::chain::{find_chain_break, EntryKind, HashChain, JournalEntry, Severity};
use parking_lot::Mutex;
use pluvia_core::{PolicyId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const CURRENT_FILE: &str = "journal_current.jsonl";

/// Configuration for journal persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Directory to store journal files
    pub dir: PathBuf,

    /// Maximum file size before rotation (bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./journal"),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024 // 100MB
}

/// Journal file writer with rotation support
pub struct JournalWriter {
    config: JournalConfig,
    current_file: Option<BufWriter<File>>,
    current_size: u64,
    chain: HashChain,
}

impl JournalWriter {
    /// Open the journal, resuming the hash chain from the last entry on disk
    pub fn open(config: JournalConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.dir)?;

        let head = JournalReader::new(config.clone())
            .read_all()?
            .last()
            .and_then(|e| e.hash.clone());

        let mut writer = Self {
            config,
            current_file: None,
            current_size: 0,
            chain: HashChain::resume(head),
        };

        writer.open_current_file()?;
        Ok(writer)
    }

    /// Chain, append and flush one entry; returns the chained entry
    pub fn append(&mut self, entry: JournalEntry) -> std::io::Result<JournalEntry> {
        if self.current_size >= self.config.max_file_size {
            self.rotate()?;
        }

        let entry = self.chain.link(entry);

        let line = format!("{}\n", serde_json::to_string(&entry)?);
        let bytes = line.as_bytes();

        if let Some(ref mut writer) = self.current_file {
            writer.write_all(bytes)?;
            writer.flush()?;
            self.current_size += bytes.len() as u64;
        }

        Ok(entry)
    }

    /// Rotate to a new file
    fn rotate(&mut self) -> std::io::Result<()> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
        }
        self.current_file = None;

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let mut rotated_path = self.config.dir.join(format!("journal_{}.jsonl", secs));
        let mut suffix = 1;
        while rotated_path.exists() {
            rotated_path = self
                .config
                .dir
                .join(format!("journal_{}_{}.jsonl", secs, suffix));
            suffix += 1;
        }
        let current_path = self.config.dir.join(CURRENT_FILE);

        if let Err(e) = std::fs::rename(&current_path, &rotated_path) {
            warn!("Failed to rotate journal file: {}", e);
        } else {
            info!("Rotated journal file to: {:?}", rotated_path);
        }

        self.open_current_file()
    }

    fn open_current_file(&mut self) -> std::io::Result<()> {
        let path = self.config.dir.join(CURRENT_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        self.current_size = file.metadata()?.len();
        self.current_file = Some(BufWriter::new(file));
        Ok(())
    }
}

/// Query filter for journal entries
#[derive(Debug, Clone, Default)]
pub struct JournalQuery {
    pub policy_id: Option<PolicyId>,
    pub kind: Option<EntryKind>,
    pub min_severity: Option<Severity>,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl JournalQuery {
    /// Create a new empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by policy
    pub fn policy(mut self, policy_id: PolicyId) -> Self {
        self.policy_id = Some(policy_id);
        self
    }

    /// Filter by entry kind
    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Filter by minimum severity
    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Set an inclusive time range over `at`
    pub fn time_range(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Set limit and offset
    pub fn paginate(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// Set just limit
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &JournalEntry) -> bool {
        if self.policy_id.is_some_and(|id| id != entry.policy_id) {
            return false;
        }
        if self.kind.is_some_and(|kind| kind != entry.kind) {
            return false;
        }
        if self.min_severity.is_some_and(|min| entry.severity < min) {
            return false;
        }
        if self.start.is_some_and(|start| entry.at < start) {
            return false;
        }
        if self.end.is_some_and(|end| entry.at > end) {
            return false;
        }
        true
    }
}

/// Journal reader for querying persisted entries
pub struct JournalReader {
    config: JournalConfig,
}

impl JournalReader {
    /// Create a new journal reader
    pub fn new(config: JournalConfig) -> Self {
        Self { config }
    }

    /// Journal files oldest first; the current file always sorts last
    fn files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !self.config.dir.exists() {
            return Ok(files);
        }

        for entry in std::fs::read_dir(&self.config.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "jsonl") {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    fn for_each_entry(
        &self,
        mut f: impl FnMut(JournalEntry) -> bool,
    ) -> std::io::Result<()> {
        for file_path in self.files()? {
            let reader = BufReader::new(File::open(&file_path)?);

            for line in reader.lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }

                match serde_json::from_str::<JournalEntry>(&line) {
                    Ok(entry) => {
                        if !f(entry) {
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        debug!("Failed to parse journal entry: {}", e);
                    }
                }
            }
        }
        Ok(())
    }

    /// Every parseable entry in journal order
    pub fn read_all(&self) -> std::io::Result<Vec<JournalEntry>> {
        let mut entries = Vec::new();
        self.for_each_entry(|entry| {
            entries.push(entry);
            true
        })?;
        Ok(entries)
    }

    /// Query journal entries
    pub fn query(&self, query: &JournalQuery) -> std::io::Result<Vec<JournalEntry>> {
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(1000);
        let mut skipped = 0;
        let mut results = Vec::new();
        if limit == 0 {
            return Ok(results);
        }

        self.for_each_entry(|entry| {
            if !query.matches(&entry) {
                return true;
            }
            if skipped < offset {
                skipped += 1;
                return true;
            }
            results.push(entry);
            results.len() < limit
        })?;

        Ok(results)
    }

    /// Count entries matching query
    pub fn count(&self, query: &JournalQuery) -> std::io::Result<usize> {
        let mut count = 0;
        self.for_each_entry(|entry| {
            if query.matches(&entry) {
                count += 1;
            }
            true
        })?;
        Ok(count)
    }

    /// Index (in journal order) of the first entry that breaks the hash chain
    pub fn verify_chain(&self) -> std::io::Result<Option<usize>> {
        let entries = self.read_all()?;
        Ok(find_chain_break(&entries))
    }

    /// Export entries to a file for reconciliation reports
    pub fn export_to_file(
        &self,
        query: &JournalQuery,
        output_path: &Path,
        format: ExportFormat,
    ) -> std::io::Result<usize> {
        let entries = self.query(query)?;
        let count = entries.len();

        let mut file = File::create(output_path)?;

        match format {
            ExportFormat::JsonLines => {
                for entry in &entries {
                    writeln!(file, "{}", serde_json::to_string(entry)?)?;
                }
            }
            ExportFormat::Json => {
                write!(file, "{}", serde_json::to_string_pretty(&entries)?)?;
            }
            ExportFormat::Csv => {
                writeln!(file, "id,kind,severity,policy_id,measurement_mm,at,tx_ref,detail")?;

                for entry in &entries {
                    writeln!(
                        file,
                        "{},{},{:?},{},{},{},{},{}",
                        entry.id,
                        entry.kind.as_str(),
                        entry.severity,
                        entry.policy_id,
                        entry.measurement_mm,
                        entry.at,
                        entry.tx_ref.as_ref().map(|t| t.as_str()).unwrap_or(""),
                        entry.detail.as_deref().unwrap_or("").replace(',', ";")
                    )?;
                }
            }
        }

        Ok(count)
    }
}

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// JSON Lines format (one JSON object per line)
    JsonLines,
    /// Pretty-printed JSON array
    Json,
    /// CSV format
    Csv,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" | "jsonlines" => Ok(Self::JsonLines),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown export format '{}'", other)),
        }
    }
}

/// Shared handle appending to the journal from concurrent submissions
pub struct TriggerJournal {
    writer: Mutex<JournalWriter>,
    reader: JournalReader,
}

impl TriggerJournal {
    /// Open the journal directory
    pub fn open(config: JournalConfig) -> pluvia_core::Result<Self> {
        let writer = JournalWriter::open(config.clone())?;
        info!("Trigger journal opened at {:?}", config.dir);

        Ok(Self {
            writer: Mutex::new(writer),
            reader: JournalReader::new(config),
        })
    }

    /// Append an entry; it is on disk when this returns
    pub fn record(&self, entry: JournalEntry) -> pluvia_core::Result<JournalEntry> {
        Ok(self.writer.lock().append(entry)?)
    }

    /// Reader over the same directory
    pub fn reader(&self) -> &JournalReader {
        &self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pluvia_core::TxRef;
    use tempfile::TempDir;

    fn test_config(dir: &Path) -> JournalConfig {
        JournalConfig {
            dir: dir.to_path_buf(),
            max_file_size: 1024 * 1024,
        }
    }

    fn submitted(policy_id: PolicyId, at: Timestamp) -> JournalEntry {
        JournalEntry::new(EntryKind::TriggerSubmitted, policy_id, 150.0, at)
            .with_tx_ref(TxRef::new(format!("0x{policy_id}{at}")))
    }

    #[test]
    fn test_write_and_read_entries() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        {
            let mut writer = JournalWriter::open(config.clone()).unwrap();
            writer.append(submitted(1, 100)).unwrap();
            writer
                .append(JournalEntry::new(EntryKind::TriggerCommitted, 1, 150.0, 100))
                .unwrap();
        }

        let reader = JournalReader::new(config);
        let entries = reader.query(&JournalQuery::new()).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::TriggerSubmitted);
        assert_eq!(entries[1].kind, EntryKind::TriggerCommitted);
        assert_eq!(reader.verify_chain().unwrap(), None);
    }

    #[test]
    fn test_chain_resumes_after_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        JournalWriter::open(config.clone())
            .unwrap()
            .append(submitted(1, 100))
            .unwrap();
        let second = JournalWriter::open(config.clone())
            .unwrap()
            .append(submitted(2, 200))
            .unwrap();

        let reader = JournalReader::new(config);
        let entries = reader.read_all().unwrap();
        assert_eq!(second.previous_hash, entries[0].hash);
        assert_eq!(reader.verify_chain().unwrap(), None);
    }

    #[test]
    fn test_rotation_keeps_chain() {
        let temp_dir = TempDir::new().unwrap();
        let config = JournalConfig {
            dir: temp_dir.path().to_path_buf(),
            max_file_size: 1,
        };

        let mut writer = JournalWriter::open(config.clone()).unwrap();
        writer.append(submitted(1, 100)).unwrap();
        writer.append(submitted(2, 200)).unwrap();

        let files = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(files, 2);

        let reader = JournalReader::new(config);
        let entries = reader.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].policy_id, 1);
        assert_eq!(reader.verify_chain().unwrap(), None);
    }

    #[test]
    fn test_tampered_file_fails_verification() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        let mut writer = JournalWriter::open(config.clone()).unwrap();
        writer.append(submitted(1, 100)).unwrap();
        writer.append(submitted(2, 200)).unwrap();
        drop(writer);

        let path = temp_dir.path().join(CURRENT_FILE);
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replace("\"policy_id\":2", "\"policy_id\":3")).unwrap();

        let reader = JournalReader::new(config);
        assert_eq!(reader.verify_chain().unwrap(), Some(1));
    }

    #[test]
    fn test_query_filters() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        {
            let mut writer = JournalWriter::open(config.clone()).unwrap();
            for i in 0..10 {
                let kind = if i % 2 == 0 {
                    EntryKind::TriggerSubmitted
                } else {
                    EntryKind::SubmissionFailed
                };
                writer
                    .append(JournalEntry::new(kind, i % 3, 150.0, i as i64 * 100))
                    .unwrap();
            }
        }

        let reader = JournalReader::new(config);

        let failed = reader
            .query(&JournalQuery::new().kind(EntryKind::SubmissionFailed))
            .unwrap();
        assert_eq!(failed.len(), 5);

        let warnings = reader
            .count(&JournalQuery::new().min_severity(Severity::Warning))
            .unwrap();
        assert_eq!(warnings, 5);

        let policy0 = reader.query(&JournalQuery::new().policy(0)).unwrap();
        assert_eq!(policy0.len(), 4); // 0, 3, 6, 9

        let window = reader
            .query(&JournalQuery::new().time_range(200, 400))
            .unwrap();
        assert_eq!(window.len(), 3);

        let page2 = reader.query(&JournalQuery::new().paginate(3, 3)).unwrap();
        assert_eq!(page2.len(), 3);
        assert_eq!(page2[0].at, 300);
    }

    #[test]
    fn test_export_csv() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        let journal = TriggerJournal::open(config).unwrap();
        journal
            .record(
                JournalEntry::new(EntryKind::CommitConflict, 5, 180.5, 1_000)
                    .with_tx_ref(TxRef::new("0xdead"))
                    .with_detail("trigger_count changed, from 0 to 1"),
            )
            .unwrap();

        let export_path = temp_dir.path().join("export.csv");
        let count = journal
            .reader()
            .export_to_file(&JournalQuery::new(), &export_path, ExportFormat::Csv)
            .unwrap();

        assert_eq!(count, 1);
        let content = std::fs::read_to_string(&export_path).unwrap();
        assert!(content.contains("commit_conflict"));
        assert!(content.contains("0xdead"));
        assert!(content.contains("trigger_count changed; from 0 to 1"));
    }

    #[test]
    fn test_export_format_parse() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("JSONL".parse::<ExportFormat>().unwrap(), ExportFormat::JsonLines);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
