//! Newline-delimited JSON file source
//!
//! `path` names one file or a directory of `*.ndjson` / `*.jsonl` files. Each
//! file is a partition for field type checks. Files are re-read for every
//! operation. Enumeration keeps at most `distinct_cache_limit` values in
//! memory; when a field's distinct values fit, later pages are served from a
//! cache, otherwise each page re-reads the files.

use crate::adapters::source::{
    consistent_field_type, distinct_page, DistinctWindow, DocumentSource, Projection, Query,
    RecordStream,
};
use crate::domain::{FieldType, Record, Result, SourceError};
use async_trait::async_trait;
use futures::stream;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

const EXTENSIONS: [&str; 2] = ["ndjson", "jsonl"];

/// Parameters of `[source]` with `type = "file"`
#[derive(Debug, Clone, Deserialize)]
pub struct FileSourceParams {
    /// File or directory to read
    pub path: PathBuf,
    /// Distinct values of one field held in memory while enumerating
    #[serde(default = "default_distinct_cache_limit")]
    pub distinct_cache_limit: usize,
}

impl FileSourceParams {
    /// Parameters for a path with the default enumeration limit
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            distinct_cache_limit: default_distinct_cache_limit(),
        }
    }
}

fn default_distinct_cache_limit() -> usize {
    100_000
}

type DistinctCache = Option<(String, Query, Arc<Vec<Value>>)>;

/// Source reading NDJSON files from the local filesystem
pub struct FileSource {
    files: Vec<PathBuf>,
    distinct_cache_limit: usize,
    distinct_cache: Mutex<DistinctCache>,
}

impl FileSource {
    /// Creates a source, resolving the files to read
    ///
    /// # Errors
    ///
    /// Returns a connection error if the path does not exist or a directory
    /// cannot be listed.
    pub fn new(params: FileSourceParams) -> Result<Self> {
        let files = resolve_files(&params.path)?;
        if files.is_empty() {
            tracing::warn!(path = %params.path.display(), "No NDJSON files found");
        }
        Ok(Self {
            files,
            distinct_cache_limit: params.distinct_cache_limit,
            distinct_cache: Mutex::new(None),
        })
    }

    /// Files read by the source, in order
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    async fn visit<F>(&self, path: &Path, query: &Query, mut visitor: F) -> Result<()>
    where
        F: FnMut(Record) + Send,
    {
        let mut cursor = FileCursor::open(path.to_path_buf()).await?;
        while let Some(record) = cursor.next_record().await? {
            if query.matches(&record)? {
                visitor(record);
            }
        }
        Ok(())
    }

    fn cached_distinct(&self, field: &str, query: &Query) -> Option<Arc<Vec<Value>>> {
        let cache = self.distinct_cache.lock().ok()?;
        match cache.as_ref() {
            Some((cached_field, cached_query, values))
                if cached_field == field && cached_query == query =>
            {
                Some(Arc::clone(values))
            }
            _ => None,
        }
    }

    /// Folds the field's values into a window following `after`
    async fn distinct_window(
        &self,
        field: &str,
        query: &Query,
        after: Option<&Value>,
        capacity: usize,
    ) -> Result<DistinctWindow> {
        let mut window = DistinctWindow::new(after, capacity);
        for path in &self.files {
            self.visit(path, query, |record| {
                if let Some(value) = record.get(field) {
                    window.offer(value);
                }
            })
            .await?;
        }
        Ok(window)
    }
}

fn resolve_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(SourceError::ConnectionFailed(format!(
            "path does not exist: {}",
            path.display()
        ))
        .into());
    }

    let entries = std::fs::read_dir(path).map_err(|e| {
        SourceError::ConnectionFailed(format!("cannot list {}: {e}", path.display()))
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|ext| ext.to_str())
                    .map_or(false, |ext| EXTENSIONS.contains(&ext))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Line cursor over one NDJSON file
struct FileCursor {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line: usize,
}

impl FileCursor {
    async fn open(path: PathBuf) -> Result<Self> {
        let file = File::open(&path).await.map_err(|e| {
            SourceError::ConnectionFailed(format!("cannot open {}: {e}", path.display()))
        })?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line: 0,
        })
    }

    async fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let line = self.lines.next_line().await.map_err(|e| {
                SourceError::QueryFailed(format!("cannot read {}: {e}", self.path.display()))
            })?;
            let Some(line) = line else {
                return Ok(None);
            };
            self.line += 1;
            if line.trim().is_empty() {
                continue;
            }

            let document: Value = serde_json::from_str(&line).map_err(|e| {
                SourceError::InvalidFormat(format!("{}:{}: {e}", self.path.display(), self.line))
            })?;
            return Record::from_document(document).map(Some);
        }
    }
}

/// Scan position across all files
struct ScanState {
    pending: VecDeque<PathBuf>,
    current: Option<FileCursor>,
    query: Query,
    projection: Projection,
}

async fn next_record(mut state: ScanState) -> Result<Option<(Record, ScanState)>> {
    loop {
        if state.current.is_none() {
            match state.pending.pop_front() {
                Some(path) => state.current = Some(FileCursor::open(path).await?),
                None => return Ok(None),
            }
        }
        let Some(cursor) = state.current.as_mut() else {
            continue;
        };

        match cursor.next_record().await? {
            Some(record) if state.query.matches(&record)? => {
                let record = state.projection.apply(record);
                return Ok(Some((record, state)));
            }
            Some(_) => {}
            None => state.current = None,
        }
    }
}

#[async_trait]
impl DocumentSource for FileSource {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn test_connection(&self) -> Result<()> {
        for path in &self.files {
            FileCursor::open(path.clone()).await?;
        }
        Ok(())
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        let mut count = 0u64;
        for path in &self.files {
            self.visit(path, query, |_| count += 1).await?;
        }
        Ok(count)
    }

    async fn distinct_values_page(
        &self,
        field: &str,
        query: &Query,
        after: Option<&Value>,
        page_size: usize,
    ) -> Result<Vec<Value>> {
        if let Some(values) = self.cached_distinct(field, query) {
            return Ok(distinct_page(values.iter(), after, page_size));
        }

        let capacity = self.distinct_cache_limit.max(page_size);
        let window = self.distinct_window(field, query, after, capacity).await?;

        if after.is_none() && !window.is_truncated() {
            let values = Arc::new(window.into_values());
            if let Ok(mut cache) = self.distinct_cache.lock() {
                *cache = Some((field.to_string(), query.clone(), Arc::clone(&values)));
            }
            return Ok(values.iter().take(page_size).cloned().collect());
        }

        if window.is_truncated() {
            tracing::debug!(
                field,
                limit = self.distinct_cache_limit,
                "Distinct values exceed the cache limit; paging by re-reading files"
            );
        }
        Ok(window.into_values().into_iter().take(page_size).collect())
    }

    async fn field_type(&self, field: &str) -> Result<Option<FieldType>> {
        let mut observed = Vec::new();
        for path in &self.files {
            let mut declared = None;
            self.visit(path, &Query::match_all(), |record| {
                if declared.is_none() {
                    declared = record.get(field).and_then(FieldType::of_value);
                }
            })
            .await?;
            if let Some(field_type) = declared {
                observed.push((path.display().to_string(), field_type));
            }
        }
        consistent_field_type(field, observed)
    }

    async fn scan(&self, query: &Query, projection: &Projection) -> Result<RecordStream> {
        let state = ScanState {
            pending: self.files.iter().cloned().collect(),
            current: None,
            query: query.clone(),
            projection: projection.clone(),
        };
        Ok(Box::pin(stream::try_unfold(state, next_record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, lines: &[Value]) {
        let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
    }

    fn fixture() -> (TempDir, FileSource) {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            "a.ndjson",
            &[
                json!({"user": {"ip": "10.0.0.1"}, "kind": "alert"}),
                json!({"user": {"ip": "10.0.0.2"}, "kind": "metric"}),
            ],
        );
        write_file(&dir, "b.jsonl", &[json!({"user": {"ip": "10.0.0.1"}, "kind": "alert"})]);
        write_file(&dir, "ignored.txt", &[json!({"user": {"ip": "1.1.1.1"}})]);
        let source = FileSource::new(FileSourceParams::new(dir.path())).unwrap();
        (dir, source)
    }

    #[tokio::test]
    async fn test_lists_only_ndjson_files() {
        let (_dir, source) = fixture();
        assert_eq!(source.files().len(), 2);
    }

    #[tokio::test]
    async fn test_count_honours_predicate() {
        let (_dir, source) = fixture();
        assert_eq!(source.count(&Query::match_all()).await.unwrap(), 3);
        assert_eq!(
            source.count(&Query::new(json!({"kind": "alert"}))).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_distinct_values_are_paged() {
        let (_dir, source) = fixture();
        let query = Query::match_all();
        let first = source
            .distinct_values_page("user.ip", &query, None, 1)
            .await
            .unwrap();
        assert_eq!(first, vec![json!("10.0.0.1")]);

        let second = source
            .distinct_values_page("user.ip", &query, first.last(), 1)
            .await
            .unwrap();
        assert_eq!(second, vec![json!("10.0.0.2")]);
    }

    #[tokio::test]
    async fn test_distinct_values_cached_when_within_limit() {
        let (_dir, source) = fixture();
        let query = Query::match_all();
        source
            .distinct_values_page("user.ip", &query, None, 1)
            .await
            .unwrap();

        let cached = source.cached_distinct("user.ip", &query).unwrap();
        assert_eq!(cached.as_slice(), &[json!("10.0.0.1"), json!("10.0.0.2")]);
        assert!(source.cached_distinct("kind", &query).is_none());
    }

    #[tokio::test]
    async fn test_distinct_values_beyond_limit_are_paged_from_files() {
        let dir = TempDir::new().unwrap();
        let lines: Vec<Value> = ["e", "a", "d", "b", "c", "a"]
            .iter()
            .map(|tag| json!({"tag": tag, "tags": [tag, "z"]}))
            .collect();
        write_file(&dir, "tags.ndjson", &lines);
        let params = FileSourceParams {
            distinct_cache_limit: 2,
            ..FileSourceParams::new(dir.path())
        };
        let source = FileSource::new(params).unwrap();
        let query = Query::match_all();

        let mut collected = Vec::new();
        let mut after: Option<Value> = None;
        loop {
            let page = source
                .distinct_values_page("tag", &query, after.as_ref(), 2)
                .await
                .unwrap();
            collected.extend(page.iter().cloned());
            if page.len() < 2 {
                break;
            }
            after = page.last().cloned();
        }

        assert_eq!(
            collected,
            vec![json!("a"), json!("b"), json!("c"), json!("d"), json!("e")]
        );
        assert!(source.cached_distinct("tag", &query).is_none());

        let listed = source
            .distinct_values_page("tags", &query, Some(&json!("d")), 10)
            .await
            .unwrap();
        assert_eq!(listed, vec![json!("e"), json!("z")]);
    }

    #[tokio::test]
    async fn test_scan_streams_every_file() {
        let (_dir, source) = fixture();
        let projection = Projection {
            includes: Some(vec!["user".to_string()]),
            excludes: Vec::new(),
        };
        let records: Vec<Record> = source
            .scan(&Query::match_all(), &projection)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| !r.contains("kind")));
    }

    #[tokio::test]
    async fn test_invalid_line_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.ndjson"), "{\"a\": 1}\nnot json\n").unwrap();
        let source = FileSource::new(FileSourceParams::new(dir.path().join("bad.ndjson"))).unwrap();

        let err = source.count(&Query::match_all()).await.unwrap_err();
        assert!(err.to_string().contains("bad.ndjson:2"));
    }

    #[tokio::test]
    async fn test_field_type_conflict_between_files() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "a.ndjson", &[json!({"id": "x"})]);
        write_file(&dir, "b.ndjson", &[json!({"id": 3})]);
        let source = FileSource::new(FileSourceParams::new(dir.path())).unwrap();

        assert!(source.field_type("id").await.is_err());
    }

    #[test]
    fn test_missing_path_rejected() {
        let result = FileSource::new(FileSourceParams::new("/definitely/not/here"));
        assert!(result.is_err());
    }
}
