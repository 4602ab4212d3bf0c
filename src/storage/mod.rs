// src/storage/mod.rs
use crate::extractors::ExtractionStats;
use crate::utils::error::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Identifier handed back to the caller after an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Anything that is not a UUID cannot name a stored task.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| StorageError::NotFound(raw.to_string()))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Write-once, read-many artifact store keyed by task id.
pub trait TaskStore: Send + Sync {
    /// Stores the artifact. A second put for the same id is `TaskExists`.
    fn put(&self, id: &TaskId, artifact: &[u8]) -> Result<(), StorageError>;

    /// Unknown or expired ids are `NotFound`.
    fn get(&self, id: &TaskId) -> Result<Vec<u8>, StorageError>;

    /// Drops everything stored for the task. Removing an unknown id is not an error.
    fn remove(&self, id: &TaskId) -> Result<(), StorageError>;

    /// Stores metadata alongside an artifact. Stores without a place for it ignore it.
    fn put_metadata(&self, _metadata: &TaskMetadata) -> Result<(), StorageError> {
        Ok(())
    }

    /// Stores a candidate report; returns where it went, if anywhere.
    fn put_debug_report(&self, _id: &TaskId, _report: &str) -> Result<Option<PathBuf>, StorageError> {
        Ok(None)
    }
}

/// Metadata written next to each stored artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub task_id: TaskId,
    pub source_name: String,
    pub target_year: String,
    pub stats: ExtractionStats,
    pub content_length: usize,
    pub created_at: String,
}

impl TaskMetadata {
    pub fn new(task_id: TaskId, source_name: &str, target_year: &str, stats: ExtractionStats, content_length: usize) -> Self {
        Self {
            task_id,
            source_name: source_name.to_string(),
            target_year: target_year.to_string(),
            stats,
            content_length,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Directory-backed store: `output_<id>.txt` plus `output_<id>_meta.json`.
pub struct FsTaskStore {
    base_dir: PathBuf,
    ttl: Option<Duration>,
}

impl FsTaskStore {
    /// Creates a new store rooted at the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        // Create the base directory if it doesn't exist
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path, ttl: None })
    }

    /// Entries older than `ttl` read as not found and are removed by `purge_expired`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn artifact_path(&self, id: &TaskId) -> PathBuf {
        self.base_dir.join(format!("output_{}.txt", id))
    }

    pub fn metadata_path(&self, id: &TaskId) -> PathBuf {
        self.base_dir.join(format!("output_{}_meta.json", id))
    }

    pub fn debug_path(&self, id: &TaskId) -> PathBuf {
        self.base_dir.join(format!("debug_{}.txt", id))
    }

    /// Writes `contents` to a temp file in the base directory. Dropping the
    /// returned handle without persisting it deletes the file.
    fn stage(&self, contents: &[u8]) -> Result<NamedTempFile, StorageError> {
        let mut staged = NamedTempFile::new_in(&self.base_dir)?;
        staged.write_all(contents)?;
        staged.as_file().sync_all()?;
        Ok(staged)
    }

    /// Saves metadata about the task in JSON format
    pub fn save_metadata(&self, metadata: &TaskMetadata) -> Result<PathBuf, StorageError> {
        let file_path = self.metadata_path(&metadata.task_id);

        let metadata_str = serde_json::to_string_pretty(metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        self.stage(metadata_str.as_bytes())?
            .persist(&file_path)
            .map_err(|e| StorageError::IoError(e.error))?;

        tracing::info!("Saved metadata to {}", file_path.display());
        Ok(file_path)
    }

    pub fn load_metadata(&self, id: &TaskId) -> Result<TaskMetadata, StorageError> {
        let path = self.metadata_path(id);
        let raw = fs::read_to_string(&path).map_err(|e| not_found_or_io(e, id))?;
        serde_json::from_str(&raw).map_err(|e| StorageError::SerializationError(e.to_string()))
    }

    /// Writes the candidate report for a task, overwriting any previous one.
    pub fn save_debug_report(&self, id: &TaskId, report: &str) -> Result<PathBuf, StorageError> {
        let path = self.debug_path(id);
        fs::write(&path, report).map_err(StorageError::IoError)?;
        tracing::info!("Saved debug report to {}", path.display());
        Ok(path)
    }

    /// Deletes every expired task file; returns how many artifacts were removed.
    pub fn purge_expired(&self) -> Result<usize, StorageError> {
        let Some(ttl) = self.ttl else {
            return Ok(0);
        };

        let mut removed = 0;
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(raw_id) = name.strip_prefix("output_").and_then(|n| n.strip_suffix(".txt")) else {
                continue;
            };
            let Ok(id) = TaskId::parse(raw_id) else { continue };

            if is_expired(&entry.path(), ttl)? {
                self.remove(&id)?;
                tracing::debug!("Purged expired task {}", id);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl TaskStore for FsTaskStore {
    fn put(&self, id: &TaskId, artifact: &[u8]) -> Result<(), StorageError> {
        let file_path = self.artifact_path(id);

        // Readers only ever see the complete file; the no-clobber publish keeps puts write-once.
        self.stage(artifact)?
            .persist_noclobber(&file_path)
            .map_err(|e| match e.error.kind() {
                ErrorKind::AlreadyExists => StorageError::TaskExists(id.to_string()),
                _ => StorageError::IoError(e.error),
            })?;

        tracing::info!("Saved task artifact to {}", file_path.display());
        Ok(())
    }

    fn get(&self, id: &TaskId) -> Result<Vec<u8>, StorageError> {
        let file_path = self.artifact_path(id);
        if let Some(ttl) = self.ttl {
            if is_expired(&file_path, ttl).map_err(|e| match e {
                StorageError::IoError(io) => not_found_or_io(io, id),
                other => other,
            })? {
                tracing::debug!("Task {} has expired", id);
                return Err(StorageError::NotFound(id.to_string()));
            }
        }
        fs::read(&file_path).map_err(|e| not_found_or_io(e, id))
    }

    fn remove(&self, id: &TaskId) -> Result<(), StorageError> {
        for path in [self.artifact_path(id), self.metadata_path(id), self.debug_path(id)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::IoError(e)),
            }
        }
        Ok(())
    }

    fn put_metadata(&self, metadata: &TaskMetadata) -> Result<(), StorageError> {
        self.save_metadata(metadata).map(|_| ())
    }

    fn put_debug_report(&self, id: &TaskId, report: &str) -> Result<Option<PathBuf>, StorageError> {
        self.save_debug_report(id, report).map(Some)
    }
}

fn not_found_or_io(e: std::io::Error, id: &TaskId) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotFound(id.to_string())
    } else {
        StorageError::IoError(e)
    }
}

fn is_expired(path: &Path, ttl: Duration) -> Result<bool, StorageError> {
    let modified = fs::metadata(path)?.modified()?;
    // Clock skew (mtime in the future) counts as fresh.
    Ok(SystemTime::now().duration_since(modified).map(|age| age > ttl).unwrap_or(false))
}

/// In-process store; used where nothing needs to outlive the process.
#[derive(Default)]
pub struct MemoryTaskStore {
    entries: RwLock<HashMap<TaskId, Vec<u8>>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryTaskStore {
    fn put(&self, id: &TaskId, artifact: &[u8]) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(id) {
            return Err(StorageError::TaskExists(id.to_string()));
        }
        entries.insert(*id, artifact.to_vec());
        Ok(())
    }

    fn get(&self, id: &TaskId) -> Result<Vec<u8>, StorageError> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn remove(&self, id: &TaskId) -> Result<(), StorageError> {
        self.entries.write().unwrap_or_else(|e| e.into_inner()).remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_fs_put_then_get() {
        let dir = tempdir().unwrap();
        let store = FsTaskStore::new(dir.path().join("nested/output")).unwrap();
        let id = TaskId::new();

        store.put(&id, "1. 24년 문제\n".as_bytes()).unwrap();
        assert_eq!(store.get(&id).unwrap(), "1. 24년 문제\n".as_bytes());
        assert!(store.artifact_path(&id).ends_with(format!("output_{}.txt", id)));
    }

    #[test]
    fn test_fs_is_write_once() {
        let dir = tempdir().unwrap();
        let store = FsTaskStore::new(dir.path()).unwrap();
        let id = TaskId::new();

        store.put(&id, b"first").unwrap();
        assert!(matches!(store.put(&id, b"second"), Err(StorageError::TaskExists(_))));
        assert_eq!(store.get(&id).unwrap(), b"first");
    }

    #[test]
    fn test_unknown_and_malformed_ids_are_not_found() {
        let dir = tempdir().unwrap();
        let store = FsTaskStore::new(dir.path()).unwrap();
        assert!(matches!(store.get(&TaskId::new()), Err(StorageError::NotFound(_))));
        assert!(matches!(TaskId::parse("../../etc/passwd"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_expired_entries_read_as_not_found_and_purge() {
        let dir = tempdir().unwrap();
        let store = FsTaskStore::new(dir.path()).unwrap().with_ttl(Duration::ZERO);
        let id = TaskId::new();
        store.put(&id, b"artifact").unwrap();
        store
            .save_metadata(&TaskMetadata::new(id, "exam.txt", "24년", ExtractionStats::default(), 8))
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert!(matches!(store.get(&id), Err(StorageError::NotFound(_))));
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert!(!store.artifact_path(&id).exists());
        assert!(!store.metadata_path(&id).exists());
    }

    #[test]
    fn test_metadata_round_trip() {
        let dir = tempdir().unwrap();
        let store = FsTaskStore::new(dir.path()).unwrap();
        let id = TaskId::new();
        let stats = ExtractionStats { total_found: 2, numbered: 1, paragraph: 1, context: 0 };
        let metadata = TaskMetadata::new(id, "exam.txt", "24년", stats, 42);

        store.save_metadata(&metadata).unwrap();
        let loaded = store.load_metadata(&id).unwrap();
        assert_eq!(loaded, metadata);
        assert!(chrono::DateTime::parse_from_rfc3339(&loaded.created_at).is_ok());
    }

    #[test]
    fn test_concurrent_puts_do_not_collide() {
        let dir = tempdir().unwrap();
        let fs_store: Arc<dyn TaskStore> = Arc::new(FsTaskStore::new(dir.path()).unwrap());
        let mem_store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());

        for store in [fs_store, mem_store] {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let store = Arc::clone(&store);
                    std::thread::spawn(move || {
                        let id = TaskId::new();
                        store.put(&id, format!("artifact {}", i).as_bytes()).unwrap();
                        (id, i)
                    })
                })
                .collect();
            for handle in handles {
                let (id, i) = handle.join().unwrap();
                assert_eq!(store.get(&id).unwrap(), format!("artifact {}", i).as_bytes());
            }
        }
    }

    #[test]
    fn test_put_leaves_no_staging_files() {
        let dir = tempdir().unwrap();
        let store = FsTaskStore::new(dir.path()).unwrap();
        let id = TaskId::new();

        store.put(&id, b"first").unwrap();
        assert!(store.put(&id, b"second").is_err());
        store
            .save_metadata(&TaskMetadata::new(id, "exam.txt", "24년", ExtractionStats::default(), 5))
            .unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![format!("output_{}.txt", id), format!("output_{}_meta.json", id)]);
    }

    #[test]
    fn test_readers_never_see_partial_artifacts() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FsTaskStore::new(dir.path()).unwrap());
        let id = TaskId::new();
        let artifact = "1. 24년 기출 문제\n".repeat(20_000).into_bytes();

        let reader = {
            let store = Arc::clone(&store);
            let expected = artifact.clone();
            std::thread::spawn(move || {
                for _ in 0..2_000 {
                    match store.get(&id) {
                        Ok(bytes) => {
                            assert_eq!(bytes.len(), expected.len());
                            return;
                        }
                        Err(StorageError::NotFound(_)) => std::thread::yield_now(),
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        };
        store.put(&id, &artifact).unwrap();
        reader.join().unwrap();
        assert_eq!(store.get(&id).unwrap(), artifact);
    }

    #[test]
    fn test_remove_drops_every_file_of_a_task() {
        let dir = tempdir().unwrap();
        let store = FsTaskStore::new(dir.path()).unwrap();
        let id = TaskId::new();
        store.put(&id, b"artifact").unwrap();
        store
            .save_metadata(&TaskMetadata::new(id, "exam.txt", "24년", ExtractionStats::default(), 8))
            .unwrap();
        store.save_debug_report(&id, "# report").unwrap();

        store.remove(&id).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        // Removing again, or an id that never existed, is fine.
        store.remove(&id).unwrap();
        store.remove(&TaskId::new()).unwrap();

        let memory = MemoryTaskStore::new();
        memory.put(&id, b"x").unwrap();
        memory.remove(&id).unwrap();
        assert!(matches!(memory.get(&id), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_memory_store_contract() {
        let store = MemoryTaskStore::new();
        let id = TaskId::new();
        assert!(matches!(store.get(&id), Err(StorageError::NotFound(_))));
        store.put(&id, b"x").unwrap();
        assert!(matches!(store.put(&id, b"y"), Err(StorageError::TaskExists(_))));
        assert_eq!(store.get(&id).unwrap(), b"x");
    }
}
