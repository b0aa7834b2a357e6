// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! History store implementations
//!
//! `MemoryHistoryStore` keeps turns in process; `JsonlHistoryStore` keeps one
//! JSONL file per conversation with a timestamped record per line.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;

use super::ConversationId;
use crate::error::{ColloquyError, Result};
use crate::llm::message::Turn;

/// Durable log of one conversation
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one turn at the end of the log
    async fn append(&self, turn: Turn) -> Result<()>;

    /// Replace the whole log (explicit compaction only)
    async fn replace_all(&self, turns: Vec<Turn>) -> Result<()>;

    /// Read the whole log in order
    async fn read(&self) -> Result<Vec<Turn>>;
}

/// Read the log, treating any failure as a new, empty conversation.
pub async fn read_or_empty(store: &dyn HistoryStore) -> Vec<Turn> {
    match store.read().await {
        Ok(turns) => turns,
        Err(error) => {
            tracing::warn!(
                target: "colloquy.history.store",
                error = %error,
                "history read failed; treating conversation as new"
            );
            Vec::new()
        }
    }
}

/// In-process history store. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    turns: Arc<Mutex<Vec<Turn>>>,
}

impl MemoryHistoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with turns
    pub fn with_turns(turns: Vec<Turn>) -> Self {
        Self {
            turns: Arc::new(Mutex::new(turns)),
        }
    }

    /// Current contents
    pub fn snapshot(&self) -> Vec<Turn> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Turn>> {
        match self.turns.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!(
                    target: "colloquy.history.store",
                    "memory history lock was poisoned, recovering"
                );
                poisoned.into_inner()
            }
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, turn: Turn) -> Result<()> {
        self.lock().push(turn);
        Ok(())
    }

    async fn replace_all(&self, turns: Vec<Turn>) -> Result<()> {
        *self.lock() = turns;
        Ok(())
    }

    async fn read(&self) -> Result<Vec<Turn>> {
        Ok(self.snapshot())
    }
}

/// One line of a JSONL history file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTurn {
    recorded_at: DateTime<Utc>,
    turn: Turn,
}

/// File-backed history store, one JSONL file per conversation
#[derive(Debug)]
pub struct JsonlHistoryStore {
    /// Path to the conversation log
    path: PathBuf,
    /// Serializes writers within this process
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlHistoryStore {
    /// Open (or prepare) the log for a conversation under `dir`
    pub fn open(dir: &Path, id: ConversationId) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self::from_path(dir.join(format!("{id}.jsonl"))))
    }

    /// Use an explicit file path
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(turn: Turn) -> Result<String> {
        let record = StoredTurn {
            recorded_at: Utc::now(),
            turn,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        Ok(line)
    }
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn append(&self, turn: Turn) -> Result<()> {
        let line = Self::encode(turn)?;
        let _guard = self.write_lock.lock().await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| ColloquyError::Store(format!("{}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ColloquyError::Store(format!("{}: {e}", self.path.display())))?;
        file.flush()
            .await
            .map_err(|e| ColloquyError::Store(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }

    async fn replace_all(&self, turns: Vec<Turn>) -> Result<()> {
        let mut content = String::new();
        for turn in turns {
            content.push_str(&Self::encode(turn)?);
        }

        let _guard = self.write_lock.lock().await;
        let tmp_path = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| ColloquyError::Store(format!("{}: {e}", tmp_path.display())))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| ColloquyError::Store(format!("{}: {e}", self.path.display())))?;

        tracing::debug!(
            target: "colloquy.history.store",
            path = %self.path.display(),
            "history log replaced"
        );
        Ok(())
    }

    async fn read(&self) -> Result<Vec<Turn>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut turns = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredTurn>(line) {
                Ok(record) => turns.push(record.turn),
                Err(error) => tracing::warn!(
                    target: "colloquy.history.store",
                    path = %self.path.display(),
                    line = line_no + 1,
                    error = %error,
                    "skipping unreadable history line"
                ),
            }
        }
        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::{ContentBlock, ToolStatus};
    use tempfile::TempDir;

    struct BrokenStore;

    #[async_trait]
    impl HistoryStore for BrokenStore {
        async fn append(&self, _turn: Turn) -> Result<()> {
            Err(ColloquyError::Store("offline".to_string()))
        }

        async fn replace_all(&self, _turns: Vec<Turn>) -> Result<()> {
            Err(ColloquyError::Store("offline".to_string()))
        }

        async fn read(&self) -> Result<Vec<Turn>> {
            Err(ColloquyError::Store("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_memory_store_append_and_read() {
        let store = MemoryHistoryStore::new();
        store.append(Turn::user("Hello")).await.unwrap();
        store.append(Turn::assistant("Hi")).await.unwrap();

        let turns = store.read().await.unwrap();
        assert_eq!(turns, vec![Turn::user("Hello"), Turn::assistant("Hi")]);

        let clone = store.clone();
        clone.replace_all(vec![Turn::user("fresh")]).await.unwrap();
        assert_eq!(store.snapshot(), vec![Turn::user("fresh")]);
    }

    #[tokio::test]
    async fn test_read_or_empty_degrades() {
        assert!(read_or_empty(&BrokenStore).await.is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let id = ConversationId::new();
        let store = JsonlHistoryStore::open(dir.path(), id).unwrap();

        assert!(store.read().await.unwrap().is_empty());

        let invocation = Turn::assistant_blocks(vec![
            ContentBlock::text("Looking it up."),
            ContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "lookup".to_string(),
                input: serde_json::json!({"q": "answer"}),
            },
        ]);
        store.append(Turn::user("X")).await.unwrap();
        store.append(invocation.clone()).await.unwrap();
        store
            .append(Turn::tool_result("t1", "42", ToolStatus::Success))
            .await
            .unwrap();

        let turns = store.read().await.unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1], invocation);
        assert!(store.path().ends_with(format!("{id}.jsonl")));
    }

    #[tokio::test]
    async fn test_jsonl_store_replace_all() {
        let dir = TempDir::new().unwrap();
        let store = JsonlHistoryStore::open(dir.path(), ConversationId::new()).unwrap();
        store.append(Turn::user("old")).await.unwrap();
        store
            .replace_all(vec![Turn::user("new"), Turn::assistant("ok")])
            .await
            .unwrap();

        let turns = store.read().await.unwrap();
        assert_eq!(turns, vec![Turn::user("new"), Turn::assistant("ok")]);
    }

    #[tokio::test]
    async fn test_jsonl_store_skips_corrupt_lines() {
        let dir = TempDir::new().unwrap();
        let store = JsonlHistoryStore::open(dir.path(), ConversationId::new()).unwrap();
        store.append(Turn::user("kept")).await.unwrap();
        let mut content = std::fs::read_to_string(store.path()).unwrap();
        content.push_str("{not json\n");
        std::fs::write(store.path(), content).unwrap();
        store.append(Turn::assistant("also kept")).await.unwrap();

        let turns = store.read().await.unwrap();
        assert_eq!(turns, vec![Turn::user("kept"), Turn::assistant("also kept")]);
    }
}
