//! 执行日志：只追加的调度历史
//!
//! 内存中保留最近 `max_in_memory` 条（带分词缓存，用于 find_similar），可选 JSONL 落盘。
//! 并发调度同时 append 时由 RwLock 保护，append 不挂起。

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use super::persistence::JsonlSink;
use super::tokenizer::{jaccard_similarity, tokenize_to_set};
use super::ExecutionRecord;
use crate::core::ConfigError;

pub const DEFAULT_MAX_IN_MEMORY: usize = 10_000;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.6;

struct Entry {
    record: ExecutionRecord,
    tokens: HashSet<String>,
}

impl Entry {
    fn new(record: ExecutionRecord) -> Self {
        let tokens = tokenize_to_set(&record.input);
        Self { record, tokens }
    }
}

pub struct ExecutionLog {
    entries: RwLock<VecDeque<Entry>>,
    max_in_memory: usize,
    similarity_threshold: f32,
    sink: Option<JsonlSink>,
}

impl Default for ExecutionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionLog {
    /// 纯内存日志
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_IN_MEMORY, DEFAULT_SIMILARITY_THRESHOLD)
    }

    pub fn with_limits(max_in_memory: usize, similarity_threshold: f32) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_in_memory: max_in_memory.max(1),
            similarity_threshold,
            sink: None,
        }
    }

    /// 带 JSONL 落盘的日志；已有记录读回内存
    pub async fn open(
        path: &Path,
        max_in_memory: usize,
        similarity_threshold: f32,
    ) -> Result<Self, ConfigError> {
        let io_err = |source| ConfigError::Log {
            path: path.to_path_buf(),
            source,
        };
        let restored = JsonlSink::load(path).await.map_err(io_err)?;
        let sink = JsonlSink::open(path).await.map_err(io_err)?;

        let mut log = Self::with_limits(max_in_memory, similarity_threshold);
        let count = restored.len();
        {
            let entries = log.entries.get_mut().unwrap_or_else(PoisonError::into_inner);
            let skip = count.saturating_sub(log.max_in_memory);
            entries.extend(restored.into_iter().skip(skip).map(Entry::new));
        }
        log.sink = Some(sink);
        tracing::info!(path = %path.display(), restored = count, "Execution log opened");
        Ok(log)
    }

    /// 追加一条记录（O(1) 摊还）
    pub fn append(&self, record: ExecutionRecord) {
        if let Some(sink) = &self.sink {
            sink.append(&record);
        }
        let entry = Entry::new(record);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push_back(entry);
        while entries.len() > self.max_in_memory {
            entries.pop_front();
        }
    }

    /// 最近 `limit` 条，最新在前
    pub fn recent(&self, limit: usize) -> Vec<ExecutionRecord> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .rev()
            .take(limit)
            .map(|e| e.record.clone())
            .collect()
    }

    /// 在成功记录中按词重叠找最相似的一条；低于阈值时为 None
    ///
    /// 仅作建议，不影响分类与调度。相似度相同时取较新的记录。
    pub fn find_similar(&self, text: &str) -> Option<ExecutionRecord> {
        let query = tokenize_to_set(text);
        if query.is_empty() {
            return None;
        }

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut best: Option<(f32, &Entry)> = None;
        for entry in entries.iter().rev().filter(|e| e.record.succeeded()) {
            let score = jaccard_similarity(&query, &entry.tokens);
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, entry));
            }
        }

        best.filter(|(score, _)| *score >= self.similarity_threshold)
            .map(|(_, entry)| entry.record.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    /// 等待落盘完成（无持久化时立即返回）
    pub async fn flush(&self) {
        if let Some(sink) = &self.sink {
            sink.flush().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::command::{AgentKind, ClassifyMethod, Command};
    use crate::core::ErrorKind;
    use crate::router::Response;

    fn record(input: &str, success: bool) -> ExecutionRecord {
        let cmd = Command::new(AgentKind::Browser, "navigate", input, ClassifyMethod::Pattern);
        let id = uuid::Uuid::new_v4().to_string();
        let resp = if success {
            Response::succeeded(id, serde_json::json!("ok"), Duration::from_millis(5))
        } else {
            Response::failed(id, ErrorKind::Timeout, "late", Some(AgentKind::Browser), Duration::ZERO)
        };
        ExecutionRecord::new(cmd, resp)
    }

    #[test]
    fn test_recent_most_recent_first() {
        let log = ExecutionLog::new();
        for input in ["one", "two", "three"] {
            log.append(record(input, true));
        }
        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].input, "three");
        assert_eq!(recent[1].input, "two");
        assert_eq!(log.recent(10).len(), 3);
        assert!(log.recent(0).is_empty());
    }

    #[test]
    fn test_memory_cap_drops_oldest() {
        let log = ExecutionLog::with_limits(2, DEFAULT_SIMILARITY_THRESHOLD);
        for input in ["a1", "b2", "c3"] {
            log.append(record(input, true));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.recent(5).last().unwrap().input, "b2");
    }

    #[test]
    fn test_find_similar_only_successful() {
        let log = ExecutionLog::new();
        log.append(record("please open reddit.com", false));
        assert!(log.find_similar("open reddit.com please").is_none());

        log.append(record("please open reddit.com", true));
        let hit = log.find_similar("open reddit.com please").unwrap();
        assert!(hit.succeeded());

        assert!(log.find_similar("add buy milk").is_none());
        assert!(log.find_similar("").is_none());
    }

    #[test]
    fn test_find_similar_prefers_newest_on_tie() {
        let log = ExecutionLog::new();
        let older = record("search gpus on ebay", true);
        let newer = record("search gpus on ebay", true);
        let newer_id = newer.id.clone();
        log.append(older);
        log.append(newer);
        assert_eq!(log.find_similar("search gpus on ebay").unwrap().id, newer_id);
    }

    #[tokio::test]
    async fn test_concurrent_appends() {
        let log = Arc::new(ExecutionLog::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                log.append(record(&format!("task {i}"), true));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(log.len(), 50);
    }

    #[tokio::test]
    async fn test_persisted_log_restores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("executions.jsonl");

        let log = ExecutionLog::open(&path, 100, 0.6).await.unwrap();
        log.append(record("go to reddit.com", true));
        log.append(record("add buy milk", false));
        log.flush().await;
        drop(log);

        // 损坏的行被跳过
        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push_str("{not json\n");
        std::fs::write(&path, text).unwrap();

        let reopened = ExecutionLog::open(&path, 100, 0.6).await.unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.recent(1)[0].input, "add buy milk");
        assert!(reopened.find_similar("go to reddit.com").is_some());
    }
}
