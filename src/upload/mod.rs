// src/upload/mod.rs
use crate::extractors::tokenizer::decode_bytes;
use crate::extractors::{ExtractionStats, QuestionExtractor};
use crate::storage::{TaskId, TaskMetadata, TaskStore};
use crate::utils::debug_report::render_candidate_report;
use crate::utils::error::{AppError, ExtractError, StorageError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

const ALLOWED_EXTENSIONS: &[&str] = &["txt"];
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Per-request switches coming from the command line.
#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    /// Store the grouped report instead of the plain joined blocks.
    pub report: bool,
    /// Also store a candidate report for the task.
    pub debug: bool,
    pub max_bytes: u64,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self { report: false, debug: false, max_bytes: DEFAULT_MAX_BYTES }
    }
}

/// A finished, stored extraction.
#[derive(Debug, Clone)]
pub struct StoredTask {
    pub task_id: TaskId,
    pub target_year: String,
    pub stats: ExtractionStats,
    pub debug_report: Option<PathBuf>,
}

/// JSON line reported to the caller for each uploaded file.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ExtractionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl UploadResponse {
    pub fn from_outcome(file: &str, outcome: &Result<StoredTask, AppError>) -> Self {
        let mut response = Self {
            success: false,
            file: file.to_string(),
            task_id: None,
            message: None,
            stats: None,
            error: None,
            hint: None,
        };
        match outcome {
            Ok(task) => {
                response.success = true;
                response.task_id = Some(task.task_id);
                response.message = Some(format!(
                    "{}개의 {} 관련 내용을 찾았습니다",
                    task.stats.total_found, task.target_year
                ));
                response.stats = Some(task.stats);
            }
            Err(AppError::Extraction(e @ ExtractError::EmptyResult(year))) => {
                response.message = Some(format!("{} 관련 내용을 찾을 수 없습니다", year));
                response.stats = Some(ExtractionStats::default());
                response.error = Some(e.to_string());
                response.hint = e.hint().map(str::to_string);
            }
            Err(AppError::Extraction(e)) => {
                response.error = Some(e.to_string());
                response.hint = e.hint().map(str::to_string);
            }
            Err(e @ AppError::UnsupportedFile(_)) => {
                response.error = Some(e.to_string());
                response.hint = Some("한글에서 \"파일 > 다른 이름으로 저장 > 텍스트 문서(*.txt)\"로 저장 후 업로드하세요".to_string());
            }
            Err(e) => response.error = Some(e.to_string()),
        }
        response
    }

    /// True when no matches were found; that is reported but is not a failure.
    pub fn is_no_match(outcome: &Result<StoredTask, AppError>) -> bool {
        matches!(outcome, Err(AppError::Extraction(ExtractError::EmptyResult(_))))
    }
}

pub fn allowed_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ALLOWED_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
}

/// Handles one uploaded file end to end: validate, read, extract, store.
pub async fn process_upload(
    extractor: Arc<QuestionExtractor>,
    store: Arc<dyn TaskStore>,
    path: PathBuf,
    options: UploadOptions,
) -> Result<StoredTask, AppError> {
    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    if !allowed_file(&path) {
        tracing::warn!("Rejecting non-TXT upload: {}", path.display());
        return Err(AppError::UnsupportedFile(format!("{}: TXT 파일만 업로드 가능합니다", source_name)));
    }

    // Size cap is enforced before the core ever sees the document.
    let size = tokio::fs::metadata(&path).await?.len();
    if size > options.max_bytes {
        return Err(AppError::TooLarge(format!(
            "{} is {} bytes, limit is {} bytes",
            source_name, size, options.max_bytes
        )));
    }

    let bytes = tokio::fs::read(&path).await?;
    tracing::info!("Read {} ({} bytes)", source_name, bytes.len());

    let task_id = TaskId::new();
    tokio::task::spawn_blocking(move || run_extraction(&extractor, store.as_ref(), task_id, &source_name, &bytes, options))
        .await
        .map_err(|e| AppError::Processing(format!("extraction task failed: {}", e)))?
}

/// Processes every file concurrently; results come back in input order.
pub async fn process_uploads(
    extractor: Arc<QuestionExtractor>,
    store: Arc<dyn TaskStore>,
    paths: Vec<PathBuf>,
    options: UploadOptions,
) -> Vec<(PathBuf, Result<StoredTask, AppError>)> {
    let mut set = JoinSet::new();
    for (index, path) in paths.iter().cloned().enumerate() {
        let extractor = Arc::clone(&extractor);
        let store = Arc::clone(&store);
        set.spawn(async move { (index, process_upload(extractor, store, path, options).await) });
    }

    let mut outcomes: Vec<Option<Result<StoredTask, AppError>>> = paths.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = Some(outcome),
            Err(e) => tracing::error!("Upload task aborted: {}", e),
        }
    }

    paths
        .into_iter()
        .zip(outcomes)
        .map(|(path, outcome)| {
            let outcome = outcome.unwrap_or_else(|| Err(AppError::Processing("upload task aborted".to_string())));
            (path, outcome)
        })
        .collect()
}

/// Blocking part of a request. Nothing is stored unless extraction succeeds.
fn run_extraction(
    extractor: &QuestionExtractor,
    store: &dyn TaskStore,
    task_id: TaskId,
    source_name: &str,
    bytes: &[u8],
    options: UploadOptions,
) -> Result<StoredTask, AppError> {
    let text = decode_bytes(bytes)?;
    let trace = extractor.trace(&text);
    let candidate_report = options.debug.then(|| render_candidate_report(&trace));

    let result = trace.outcome?;
    let artifact = if options.report { result.render_report(source_name) } else { result.to_text() };
    let metadata = TaskMetadata::new(task_id, source_name, &result.target_year, result.stats, artifact.len());

    let debug_report = commit(store, &task_id, artifact.as_bytes(), &metadata, candidate_report.as_deref())?;
    tracing::info!("Stored task {} for {}: {:?}", task_id, source_name, result.stats);

    Ok(StoredTask { task_id, target_year: result.target_year, stats: result.stats, debug_report })
}

/// Stores every file of a task, or none of them.
fn commit(
    store: &dyn TaskStore,
    task_id: &TaskId,
    artifact: &[u8],
    metadata: &TaskMetadata,
    candidate_report: Option<&str>,
) -> Result<Option<PathBuf>, StorageError> {
    store.put(task_id, artifact)?;

    let rest = store.put_metadata(metadata).and_then(|()| match candidate_report {
        Some(report) => store.put_debug_report(task_id, report),
        None => Ok(None),
    });
    if let Err(e) = &rest {
        tracing::warn!("Rolling back task {}: {}", task_id, e);
        if let Err(cleanup) = store.remove(task_id) {
            tracing::error!("Failed to roll back task {}: {}", task_id, cleanup);
        }
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::ExtractionConfig;
    use crate::storage::{FsTaskStore, MemoryTaskStore};
    use tempfile::tempdir;
    use tokio_test::{assert_err, assert_ok};

    fn extractor() -> Arc<QuestionExtractor> {
        Arc::new(QuestionExtractor::new(ExtractionConfig::default()).unwrap())
    }

    #[test]
    fn test_allowed_file() {
        assert!(allowed_file(Path::new("exam.txt")));
        assert!(allowed_file(Path::new("dir/EXAM.TXT")));
        assert!(!allowed_file(Path::new("exam.hwp")));
        assert!(!allowed_file(Path::new("txt")));
    }

    #[tokio::test]
    async fn test_upload_is_stored_and_retrievable() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("exam.txt");
        std::fs::write(&input, "1. 24년 6월 모의고사 문제\n보기\n\n2. 다른 문제\n").unwrap();
        let fs_store = Arc::new(FsTaskStore::new(dir.path().join("out")).unwrap());
        let store: Arc<dyn TaskStore> = fs_store.clone();

        let options = UploadOptions { debug: true, ..Default::default() };
        let task = assert_ok!(process_upload(extractor(), store.clone(), input, options).await);

        assert_eq!(task.stats, ExtractionStats { total_found: 1, numbered: 1, paragraph: 0, context: 0 });
        assert_eq!(store.get(&task.task_id).unwrap(), "1. 24년 6월 모의고사 문제\n보기\n".as_bytes());
        assert_eq!(fs_store.load_metadata(&task.task_id).unwrap().stats, task.stats);
        assert!(task.debug_report.unwrap().exists());
    }

    #[tokio::test]
    async fn test_report_artifact() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("mock.txt");
        std::fs::write(&input, "1. 24년 기출 문제\n").unwrap();
        let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());

        let options = UploadOptions { report: true, ..Default::default() };
        let task = assert_ok!(process_upload(extractor(), store.clone(), input, options).await);
        let artifact = String::from_utf8(store.get(&task.task_id).unwrap()).unwrap();
        assert!(artifact.contains("원본 파일: mock.txt"));
        assert!(artifact.contains("[ 번호가 있는 문제 ]"));
    }

    #[tokio::test]
    async fn test_no_match_stores_nothing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("plain.txt");
        std::fs::write(&input, "본문 내용이 여기에 이어집니다 아주 길게 이어지는 본문\n\n- 24 -\n").unwrap();
        let out = dir.path().join("out");
        let store: Arc<dyn TaskStore> = Arc::new(FsTaskStore::new(&out).unwrap());

        // Even with --debug, a request without matches leaves nothing behind.
        let options = UploadOptions { debug: true, ..Default::default() };
        let outcome = process_upload(extractor(), store, input, options).await;
        assert!(UploadResponse::is_no_match(&outcome));
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);

        let response = UploadResponse::from_outcome("plain.txt", &outcome);
        assert!(!response.success);
        assert_eq!(response.stats, Some(ExtractionStats::default()));
        assert!(response.task_id.is_none());
    }

    #[tokio::test]
    async fn test_rejections_at_the_boundary() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());

        let hwp = dir.path().join("exam.hwp");
        std::fs::write(&hwp, "1. 24년 문제").unwrap();
        let outcome = process_upload(extractor(), store.clone(), hwp, UploadOptions::default()).await;
        assert!(matches!(outcome, Err(AppError::UnsupportedFile(_))));
        assert!(UploadResponse::from_outcome("exam.hwp", &outcome).hint.is_some());

        let big = dir.path().join("big.txt");
        std::fs::write(&big, "1. 24년 문제 ".repeat(100)).unwrap();
        let options = UploadOptions { max_bytes: 64, ..Default::default() };
        let outcome = process_upload(extractor(), store.clone(), big, options).await;
        assert!(matches!(outcome, Err(AppError::TooLarge(_))));

        let garbage = dir.path().join("broken.txt");
        std::fs::write(&garbage, [0xFF, 0xFF, 0x41]).unwrap();
        let outcome = process_upload(extractor(), store, garbage, UploadOptions::default()).await;
        assert!(matches!(outcome, Err(AppError::Extraction(ExtractError::Decoding(_)))));
    }

    #[tokio::test]
    async fn test_cp949_upload_is_extracted() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("legacy.txt");
        // "1. 24년 기출 문제" as exported in CP949.
        std::fs::write(
            &input,
            [0x31, 0x2E, 0x20, 0x32, 0x34, 0xB3, 0xE2, 0x20, 0xB1, 0xE2, 0xC3, 0xE2, 0x20, 0xB9, 0xAE, 0xC1, 0xA6],
        )
        .unwrap();
        let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());

        let task = assert_ok!(process_upload(extractor(), store.clone(), input, UploadOptions::default()).await);
        assert_eq!(task.stats.numbered, 1);
        assert_eq!(store.get(&task.task_id).unwrap(), "1. 24년 기출 문제\n".as_bytes());
    }

    #[test]
    fn test_many_uploads_are_isolated() {
        let dir = tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..8 {
            let path = dir.path().join(format!("exam{}.txt", i));
            let body = if i % 2 == 0 {
                format!("{}. 24년 모의고사 {}번 문제\n", i + 1, i)
            } else {
                "관련 없는 문서입니다\n".to_string()
            };
            std::fs::write(&path, body).unwrap();
            paths.push(path);
        }
        let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());

        let outcomes = tokio_test::block_on(process_uploads(extractor(), store.clone(), paths.clone(), UploadOptions::default()));

        assert_eq!(outcomes.len(), 8);
        for (i, (path, outcome)) in outcomes.iter().enumerate() {
            assert_eq!(path, &paths[i]);
            if i % 2 == 0 {
                let task = outcome.as_ref().unwrap();
                let artifact = String::from_utf8(store.get(&task.task_id).unwrap()).unwrap();
                assert!(artifact.contains(&format!("{}번 문제", i)));
            } else {
                assert!(UploadResponse::is_no_match(outcome));
            }
        }
    }

    /// Memory store whose metadata writes always fail; remembers the last put id.
    #[derive(Default)]
    struct MetadataFails {
        inner: MemoryTaskStore,
        last_put: std::sync::Mutex<Option<TaskId>>,
    }

    impl TaskStore for MetadataFails {
        fn put(&self, id: &TaskId, artifact: &[u8]) -> Result<(), StorageError> {
            *self.last_put.lock().unwrap() = Some(*id);
            self.inner.put(id, artifact)
        }

        fn get(&self, id: &TaskId) -> Result<Vec<u8>, StorageError> {
            self.inner.get(id)
        }

        fn remove(&self, id: &TaskId) -> Result<(), StorageError> {
            self.inner.remove(id)
        }

        fn put_metadata(&self, _metadata: &TaskMetadata) -> Result<(), StorageError> {
            Err(StorageError::SerializationError("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_metadata_write_rolls_back_artifact() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("exam.txt");
        std::fs::write(&input, "1. 24년 기출 문제\n").unwrap();
        let failing = Arc::new(MetadataFails::default());
        let store: Arc<dyn TaskStore> = failing.clone();

        let outcome = process_upload(extractor(), store, input, UploadOptions::default()).await;
        assert!(matches!(outcome, Err(AppError::Storage(StorageError::SerializationError(_)))));

        let attempted = failing.last_put.lock().unwrap().expect("artifact put was attempted");
        assert!(matches!(failing.get(&attempted), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_fetch_unknown_task_is_not_found() {
        let store = MemoryTaskStore::new();
        let err = assert_err!(store.get(&TaskId::new()));
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
