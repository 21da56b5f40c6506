//! Durable message log.
//!
//! The whole history lives in one JSON array that is rewritten on every
//! append. Appends are serialized through a single async write gate held for
//! the full read → push → write cycle, and the file I/O itself runs on the
//! blocking pool so a slow disk never stalls routing for other connections.
//!
//! Reads are tolerant: a missing, empty or unparseable file is an empty
//! history, and the next append replaces it with a valid array.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::record::MessageRecord;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("I/O error on message log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Log task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub struct MessageLog {
    path: PathBuf,
    group: String,
    write_gate: tokio::sync::Mutex<()>,
}

impl MessageLog {
    pub fn new(path: impl Into<PathBuf>, group: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            group: group.into(),
            write_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record to the end of the persisted history.
    pub async fn append(&self, record: &MessageRecord) -> Result<(), LogError> {
        let _gate = self.write_gate.lock().await;
        let path = self.path.clone();
        let entry = Value::Object(record.as_map().clone());
        tokio::task::spawn_blocking(move || append_blocking(&path, entry)).await?
    }

    /// Every stored object, in stored order. Entries that are not JSON
    /// objects cannot be matched against anyone and are skipped.
    pub async fn load(&self) -> Result<Vec<MessageRecord>, LogError> {
        let path = self.path.clone();
        let entries = tokio::task::spawn_blocking(move || read_entries(&path)).await?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(map) => Some(MessageRecord::from_stored(map)),
                _ => None,
            })
            .collect())
    }

    /// History visible to `identity`: group traffic plus everything sent to
    /// or by them. Never mutates the store.
    pub async fn visible_to(&self, identity: &str) -> Result<Vec<MessageRecord>, LogError> {
        let mut records = self.load().await?;
        records.retain(|r| r.visible_to(identity, &self.group));
        Ok(records)
    }
}

fn append_blocking(path: &Path, entry: Value) -> Result<(), LogError> {
    let mut entries = read_entries(path);
    entries.push(entry);
    let body = serde_json::to_string_pretty(&entries)?;

    // Write beside the log and rename over it so readers never see a torn file.
    let tmp = tmp_path(path);
    std::fs::write(&tmp, body).map_err(|source| LogError::Io {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| LogError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Raw log entries. Anything unreadable is treated as an empty history.
fn read_entries(path: &Path) -> Vec<Value> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "Message log unreadable, treating as empty: {e}");
            return Vec::new();
        }
    };
    if text.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            tracing::warn!(path = %path.display(), "Message log is not a JSON array, treating as empty");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "Message log corrupt, treating as empty: {e}");
            Vec::new()
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn record(text: &str) -> MessageRecord {
        MessageRecord::from_wire(text).unwrap()
    }

    fn log_in(dir: &tempfile::TempDir) -> MessageLog {
        MessageLog::new(dir.path().join("messages.json"), "FamilyChat")
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        assert!(log.load().await.unwrap().is_empty());
        assert!(log.visible_to("vamsi").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_preserves_order_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        let first = record(r#"{"message":"hello","to":"FamilyChat"}"#);
        let second = record(r#"{"message":"hi","to":"b","from":"a","extra":{"k":[1,2]}}"#);
        log.append(&first).await.unwrap();
        log.append(&second).await.unwrap();

        let stored = log.load().await.unwrap();
        assert_eq!(stored, vec![first, second]);

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(log.path()).unwrap()).unwrap();
        assert_eq!(raw.as_array().map(Vec::len), Some(2));
        assert!(!tmp_path(log.path()).exists());
    }

    #[tokio::test]
    async fn corrupt_file_reads_empty_and_heals() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        std::fs::write(log.path(), "{not json").unwrap();
        assert!(log.load().await.unwrap().is_empty());

        log.append(&record(r#"{"message":"again","to":"FamilyChat"}"#)).await.unwrap();
        assert_eq!(log.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_array_document_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        std::fs::write(log.path(), r#"{"message":"x"}"#).unwrap();
        assert!(log.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(log_in(&dir));

        let mut tasks = Vec::new();
        for i in 0..50 {
            let log = Arc::clone(&log);
            tasks.push(tokio::spawn(async move {
                let rec = record(&format!(r#"{{"message":"m{i}","to":"FamilyChat","n":{i}}}"#));
                log.append(&rec).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let stored = log.load().await.unwrap();
        assert_eq!(stored.len(), 50);
        let mut seen: Vec<i64> = stored
            .iter()
            .map(|r| r.as_map()["n"].as_i64().unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn visible_to_filters_in_stored_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        let entries = [
            r#"{"message":"1","to":"FamilyChat","from":"c"}"#,
            r#"{"message":"2","to":"b","from":"a"}"#,
            r#"{"message":"3","to":"c","from":"b"}"#,
            r#"{"message":"4","to":"a","from":"c"}"#,
            r#"{"message":"5","to":"c","username":"a"}"#,
        ];
        for e in entries {
            log.append(&record(e)).await.unwrap();
        }

        let texts = |recs: Vec<MessageRecord>| -> Vec<String> {
            recs.iter()
                .map(|r| r.as_map()["message"].as_str().unwrap_or_default().to_string())
                .collect()
        };
        assert_eq!(texts(log.visible_to("a").await.unwrap()), ["1", "2", "4", "5"]);
        assert_eq!(texts(log.visible_to("b").await.unwrap()), ["1", "2", "3"]);
        assert_eq!(texts(log.visible_to("nobody").await.unwrap()), ["1"]);

        // Reading never rewrites the file.
        assert_eq!(log.load().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn foreign_entries_survive_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        std::fs::write(log.path(), r#"[{"note":"imported"}, 7]"#).unwrap();
        log.append(&record(r#"{"message":"x","to":"FamilyChat"}"#)).await.unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(log.path()).unwrap()).unwrap();
        assert_eq!(raw.as_array().map(Vec::len), Some(3));
        // The bare number is not an object; the imported object is kept.
        assert_eq!(log.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn history_keeps_stored_entries_without_message() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        std::fs::write(
            log.path(),
            r#"[{"to":"FamilyChat","text":"legacy"},{"message":"m","to":"FamilyChat"},{"to":"b","text":"dm"}]"#,
        )
        .unwrap();

        let visible = log.visible_to("vamsi").await.unwrap();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].as_map()["text"], "legacy");
        assert_eq!(log.visible_to("b").await.unwrap().len(), 3);
    }
}
