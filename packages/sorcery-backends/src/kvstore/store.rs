//! Key-value store implementations.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sorcery_core::io_utils::{classify_io_error, retry_io_operation, write_atomically};
use sorcery_core::{RegistryConfig, Result, SorceryError};

use super::KvStore;

type Families = BTreeMap<String, BTreeMap<String, String>>;

fn scan_family(families: &Families, family: &str, prefix: &str) -> Vec<(String, String)> {
    families
        .get(family)
        .map(|entries| {
            entries
                .range(prefix.to_string()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Volatile store.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    families: RwLock<Families>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, family: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .families
            .read()
            .get(family)
            .and_then(|entries| entries.get(key).cloned()))
    }

    fn put(&self, family: &str, key: &str, value: &str) -> Result<()> {
        self.families
            .write()
            .entry(family.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn replace(&self, family: &str, key: &str, value: &str) -> Result<bool> {
        let mut families = self.families.write();
        match families.get_mut(family).and_then(|entries| entries.get_mut(key)) {
            Some(slot) => {
                *slot = value.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&self, family: &str, key: &str) -> Result<bool> {
        Ok(self
            .families
            .write()
            .get_mut(family)
            .is_some_and(|entries| entries.remove(key).is_some()))
    }

    fn scan(&self, family: &str, prefix: &str) -> Result<Vec<(String, String)>> {
        Ok(scan_family(&self.families.read(), family, prefix))
    }
}

/// On-disk layout of a [`FileKvStore`] snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KvFile {
    version: u32,
    families: Families,
}

const KV_FILE_VERSION: u32 = 1;

/// Journal entries written to compact before the snapshot is rewritten,
/// unless the store holds more keys than this.
const MIN_COMPACT_ENTRIES: usize = 64;

/// One change appended to the journal, one JSON document per line.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry {
    Put {
        family: String,
        key: String,
        value: String,
    },
    Remove {
        family: String,
        key: String,
    },
}

impl JournalEntry {
    fn apply(self, families: &mut Families) {
        match self {
            JournalEntry::Put { family, key, value } => {
                families.entry(family).or_default().insert(key, value);
            }
            JournalEntry::Remove { family, key } => {
                if let Some(entries) = families.get_mut(&family) {
                    entries.remove(&key);
                    if entries.is_empty() {
                        families.remove(&family);
                    }
                }
            }
        }
    }
}

#[derive(Debug)]
struct FileState {
    families: Families,
    journal: Option<File>,
    journal_entries: usize,
}

impl FileState {
    fn key_count(&self) -> usize {
        self.families.values().map(BTreeMap::len).sum()
    }
}

/// Store persisted as a JSON snapshot plus an append-only journal.
///
/// Each change appends one line to `<path>.journal`. Once the journal
/// holds more entries than the store holds keys (and at least
/// [`MIN_COMPACT_ENTRIES`]), the snapshot is rewritten atomically and the
/// journal truncated, so writes cost amortised O(1) in store size.
/// Dropping the store compacts it.
///
/// A change that cannot be written is not applied.
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    journal_path: PathBuf,
    state: Mutex<FileState>,
    io_max_retries: u32,
    io_retry_delay_ms: u64,
}

fn journal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".journal");
    PathBuf::from(name)
}

impl FileKvStore {
    /// Opens the store at `path`, creating it on the first write.
    ///
    /// # Arguments
    /// * `path` - Snapshot file, resolved against the registry config directory
    /// * `config` - Registry configuration (directory and retry policy)
    pub fn open(path: impl AsRef<Path>, config: &RegistryConfig) -> Result<Self> {
        let path = config.resolve(path);
        let journal_path = journal_path(&path);
        let read = |file: &Path, what: &str| {
            let context = format!("Failed to read {}", file.display());
            retry_io_operation(
                || std::fs::read_to_string(file).map_err(|e| classify_io_error(e, &context)),
                config.io_max_retries,
                config.io_retry_delay_ms,
                what,
            )
        };

        let mut families = if path.exists() {
            let file: KvFile = serde_json::from_str(&read(&path, "kv store read")?).map_err(|e| {
                SorceryError::Serialization(format!("{}: {}", path.display(), e))
            })?;
            if file.version != KV_FILE_VERSION {
                return Err(SorceryError::Serialization(format!(
                    "{}: unsupported version {}",
                    path.display(),
                    file.version
                )));
            }
            file.families
        } else {
            Families::new()
        };

        let mut journal_entries = 0;
        if journal_path.exists() {
            let text = read(&journal_path, "kv journal read")?;
            let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
            for (index, line) in lines.iter().enumerate() {
                match serde_json::from_str::<JournalEntry>(line) {
                    Ok(entry) => {
                        entry.apply(&mut families);
                        journal_entries += 1;
                    }
                    // a write cut short leaves at most the last line torn
                    Err(err) if index + 1 == lines.len() => {
                        tracing::warn!(
                            "Ignoring torn journal tail in {}: {}",
                            journal_path.display(),
                            err
                        );
                    }
                    Err(err) => {
                        return Err(SorceryError::Serialization(format!(
                            "{} line {}: {}",
                            journal_path.display(),
                            index + 1,
                            err
                        )));
                    }
                }
            }
        }

        tracing::debug!(
            "Opened kv store {} with {} families, {} journal entries",
            path.display(),
            families.len(),
            journal_entries
        );

        Ok(Self {
            path,
            journal_path,
            state: Mutex::new(FileState {
                families,
                journal: None,
                journal_entries,
            }),
            io_max_retries: config.io_max_retries,
            io_retry_delay_ms: config.io_retry_delay_ms,
        })
    }

    /// Snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Journal file holding changes since the last compaction.
    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    /// Rewrites the snapshot and empties the journal.
    pub fn compact(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.compact_locked(&mut state)
    }

    fn compact_locked(&self, state: &mut FileState) -> Result<()> {
        let file = KvFile {
            version: KV_FILE_VERSION,
            families: state.families.clone(),
        };
        let bytes =
            serde_json::to_vec_pretty(&file).map_err(|e| SorceryError::Serialization(e.to_string()))?;
        retry_io_operation(
            || write_atomically(&self.path, &bytes),
            self.io_max_retries,
            self.io_retry_delay_ms,
            "kv store write",
        )?;

        state.journal = None;
        if self.journal_path.exists() {
            std::fs::remove_file(&self.journal_path).map_err(|e| {
                classify_io_error(e, &format!("Failed to remove {}", self.journal_path.display()))
            })?;
        }
        tracing::debug!(
            "Compacted kv store {} ({} journal entries)",
            self.path.display(),
            state.journal_entries
        );
        state.journal_entries = 0;
        Ok(())
    }

    /// Appends `entry` to the journal, then applies it.
    fn record(&self, state: &mut FileState, entry: JournalEntry) -> Result<()> {
        let mut line =
            serde_json::to_vec(&entry).map_err(|e| SorceryError::Serialization(e.to_string()))?;
        line.push(b'\n');

        let context = format!("Failed to append to {}", self.journal_path.display());
        if state.journal.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.journal_path)
                .map_err(|e| classify_io_error(e, &context))?;
            state.journal = Some(file);
        }
        if let Some(journal) = state.journal.as_mut() {
            journal
                .write_all(&line)
                .and_then(|()| journal.sync_data())
                .map_err(|e| classify_io_error(e, &context))?;
        }

        entry.apply(&mut state.families);
        state.journal_entries += 1;

        if state.journal_entries > MIN_COMPACT_ENTRIES.max(state.key_count()) {
            self.compact_locked(state)?;
        }
        Ok(())
    }
}

impl Drop for FileKvStore {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.journal_entries == 0 {
            return;
        }
        if let Err(err) = self.compact_locked(&mut state) {
            tracing::error!("Failed to compact kv store {}: {}", self.path.display(), err);
        }
    }
}

impl KvStore for FileKvStore {
    fn get(&self, family: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .families
            .get(family)
            .and_then(|entries| entries.get(key).cloned()))
    }

    fn put(&self, family: &str, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        self.record(
            &mut state,
            JournalEntry::Put {
                family: family.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            },
        )
    }

    fn replace(&self, family: &str, key: &str, value: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let exists = state
            .families
            .get(family)
            .is_some_and(|entries| entries.contains_key(key));
        if !exists {
            return Ok(false);
        }
        self.record(
            &mut state,
            JournalEntry::Put {
                family: family.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            },
        )?;
        Ok(true)
    }

    fn remove(&self, family: &str, key: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let exists = state
            .families
            .get(family)
            .is_some_and(|entries| entries.contains_key(key));
        if !exists {
            return Ok(false);
        }
        self.record(
            &mut state,
            JournalEntry::Remove {
                family: family.to_string(),
                key: key.to_string(),
            },
        )?;
        Ok(true)
    }

    fn scan(&self, family: &str, prefix: &str) -> Result<Vec<(String, String)>> {
        Ok(scan_family(&self.state.lock().families, family, prefix))
    }
}
