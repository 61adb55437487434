//! File-backed checkpoint storage
//!
//! [`FileCheckpointSaver`] stores every lineage as a JSON-lines file:
//!
//! ```text
//! <root>/<thread_id>/<checkpoint_ns or "_default">.jsonl
//! ```
//!
//! Each line is one serialized [`Checkpoint`]. Lines are only ever appended, so
//! the latest checkpoint is the last line and a new process pointed at the same
//! root picks up exactly where the previous one stopped.
//!
//! A record is committed once its terminating newline is on disk. A final line
//! without one is what a crash in the middle of [`put`](CheckpointSaver::put)
//! leaves behind: readers skip it and the next `put` cuts it off. An unparseable
//! line anywhere else is a [`CheckpointError::Serialization`].
//!
//! Writes are serialized per saver instance (clones share the lock). Before
//! appending, `put` checks the step against the file as it is on disk, so a
//! stale step from a writer that ran earlier in another process is rejected.
//! Processes appending to the same lineage at the same moment are not
//! coordinated; keep one writer per lineage at a time.

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig},
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const DEFAULT_NAMESPACE_FILE: &str = "_default";

/// Committed records of one lineage file
#[derive(Debug, Default)]
struct Lineage {
    checkpoints: Vec<Checkpoint>,
    /// Bytes read from disk
    file_len: u64,
    /// Length of the prefix made of complete records
    committed_len: u64,
}

/// Latest committed checkpoint of a lineage, valid while the file keeps `file_len` bytes
#[derive(Debug, Clone, Default)]
struct Tail {
    file_len: u64,
    committed_len: u64,
    latest: Option<Checkpoint>,
}

/// Append-only JSON-lines checkpoint saver
#[derive(Debug, Clone)]
pub struct FileCheckpointSaver {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
    tails: Arc<Mutex<HashMap<PathBuf, Tail>>>,
}

impl FileCheckpointSaver {
    /// Create a saver rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Arc::new(Mutex::new(())),
            tails: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn thread_dir(&self, thread_id: &str) -> PathBuf {
        self.root.join(encode_component(thread_id))
    }

    fn lineage_path(&self, config: &CheckpointConfig) -> PathBuf {
        let file = if config.checkpoint_ns.is_empty() {
            DEFAULT_NAMESPACE_FILE.to_string()
        } else {
            encode_component(&config.checkpoint_ns)
        };
        self.thread_dir(&config.thread_id)
            .join(format!("{}.jsonl", file))
    }

    async fn read_lineage(&self, path: &Path) -> Result<Lineage> {
        match fs::read_to_string(path).await {
            Ok(contents) => parse_lineage(path, &contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Lineage::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Latest committed checkpoint, parsing the file only when its length changed
    async fn tail(&self, path: &Path) -> Result<Tail> {
        let file_len = match fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.tails.lock().await.remove(path);
                return Ok(Tail::default());
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(tail) = self.tails.lock().await.get(path) {
            if tail.file_len == file_len {
                return Ok(tail.clone());
            }
        }

        let mut lineage = self.read_lineage(path).await?;
        let tail = Tail {
            file_len: lineage.file_len,
            committed_len: lineage.committed_len,
            latest: lineage.checkpoints.pop(),
        };
        self.tails
            .lock()
            .await
            .insert(path.to_path_buf(), tail.clone());
        Ok(tail)
    }
}

fn parse_lineage(path: &Path, contents: &str) -> Result<Lineage> {
    let mut lineage = Lineage {
        file_len: contents.len() as u64,
        ..Lineage::default()
    };

    for line in contents.split_inclusive('\n') {
        if !line.ends_with('\n') {
            tracing::warn!(
                path = %path.display(),
                bytes = line.len(),
                "Ignoring incomplete trailing checkpoint record"
            );
            break;
        }
        let record = line.trim();
        if !record.is_empty() {
            lineage.checkpoints.push(serde_json::from_str(record)?);
        }
        lineage.committed_len += line.len() as u64;
    }

    Ok(lineage)
}

/// Make an identifier safe to use as a single path component.
///
/// Alphanumerics, `-` and `.` pass through (a leading `.` is escaped); every other
/// byte becomes `_xx` (lower-case hex), so distinct identifiers never collide.
fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, byte) in raw.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric() || byte == b'-' || (byte == b'.' && i > 0);
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("_{:02x}", byte));
        }
    }
    out
}

#[async_trait]
impl CheckpointSaver for FileCheckpointSaver {
    async fn put(&self, config: &CheckpointConfig, checkpoint: Checkpoint) -> Result<()> {
        config.validate()?;

        let _guard = self.write_lock.lock().await;

        let path = self.lineage_path(config);
        let tail = self.tail(&path).await?;
        if let Some(latest) = &tail.latest {
            if checkpoint.step <= latest.step {
                return Err(CheckpointError::Conflict {
                    thread_id: config.thread_id.clone(),
                    checkpoint_ns: config.checkpoint_ns.clone(),
                    step: checkpoint.step,
                    latest: latest.step,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(&checkpoint)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        if tail.file_len > tail.committed_len {
            tracing::warn!(
                lineage = %config,
                bytes = tail.file_len - tail.committed_len,
                "Truncating incomplete checkpoint record"
            );
            file.set_len(tail.committed_len).await?;
        }
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        let committed_len = tail.committed_len + line.len() as u64;
        self.tails.lock().await.insert(
            path.clone(),
            Tail {
                file_len: committed_len,
                committed_len,
                latest: Some(checkpoint.clone()),
            },
        );

        tracing::debug!(
            lineage = %config,
            step = checkpoint.step,
            path = %path.display(),
            "Appended checkpoint"
        );
        Ok(())
    }

    async fn get_latest(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        config.validate()?;
        Ok(self.tail(&self.lineage_path(config)).await?.latest)
    }

    async fn list_history(&self, config: &CheckpointConfig) -> Result<CheckpointStream> {
        config.validate()?;
        let checkpoints = self
            .read_lineage(&self.lineage_path(config))
            .await?
            .checkpoints;
        Ok(Box::pin(stream::iter(checkpoints.into_iter().map(Ok))))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let dir = self.thread_dir(thread_id);
        self.tails.lock().await.retain(|path, _| !path.starts_with(&dir));
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("thread-1"), "thread-1");
        assert_eq!(encode_component("a/b"), "a_2fb");
        assert_eq!(encode_component(".."), "_2e.");
        assert_ne!(encode_component("a_b"), encode_component("a/b"));
    }

    #[tokio::test]
    async fn test_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckpointConfig::new("42").with_checkpoint_ns("para");

        let mut values = crate::ChannelValues::new();
        values.insert("question".to_string(), json!("hi"));
        let checkpoint = Checkpoint::new(0, values).with_frontier(["trim".to_string()]);

        FileCheckpointSaver::new(dir.path())
            .put(&config, checkpoint.clone())
            .await
            .unwrap();

        let reopened = FileCheckpointSaver::new(dir.path());
        assert_eq!(reopened.get_latest(&config).await.unwrap(), Some(checkpoint));
    }

    #[tokio::test]
    async fn test_history_and_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCheckpointSaver::new(dir.path());
        let config = CheckpointConfig::new("t");

        saver.put(&config, Checkpoint::empty(-1)).await.unwrap();
        saver.put(&config, Checkpoint::empty(0)).await.unwrap();

        let err = FileCheckpointSaver::new(dir.path())
            .put(&config, Checkpoint::empty(0))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::Conflict { .. }));

        let steps: Vec<i64> = saver
            .list_history(&config)
            .await
            .unwrap()
            .map(|c| c.unwrap().step)
            .collect()
            .await;
        assert_eq!(steps, vec![-1, 0]);
    }

    #[tokio::test]
    async fn test_delete_thread_removes_all_namespaces() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCheckpointSaver::new(dir.path());
        let a = CheckpointConfig::new("t").with_checkpoint_ns("a");
        let b = CheckpointConfig::new("t");

        saver.put(&a, Checkpoint::empty(0)).await.unwrap();
        saver.put(&b, Checkpoint::empty(0)).await.unwrap();
        saver.delete_thread("t").await.unwrap();

        assert!(saver.get_latest(&a).await.unwrap().is_none());
        assert!(saver.get_latest(&b).await.unwrap().is_none());
        saver.delete_thread("never-existed").await.unwrap();
    }

    async fn append_raw(path: &Path, bytes: &str) {
        let mut file = fs::OpenOptions::new().append(true).open(path).await.unwrap();
        file.write_all(bytes.as_bytes()).await.unwrap();
    }

    async fn steps(saver: &FileCheckpointSaver, config: &CheckpointConfig) -> Vec<i64> {
        saver
            .list_history(config)
            .await
            .unwrap()
            .map(|c| c.unwrap().step)
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_torn_final_record_is_ignored_and_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCheckpointSaver::new(dir.path());
        let config = CheckpointConfig::new("t");
        saver.put(&config, Checkpoint::empty(0)).await.unwrap();

        // A crash part way through writing the next record
        let path = dir.path().join("t").join("_default.jsonl");
        append_raw(&path, r#"{"v":1,"id":"abc","ts":"#).await;

        let reopened = FileCheckpointSaver::new(dir.path());
        let latest = reopened.get_latest(&config).await.unwrap().unwrap();
        assert_eq!(latest.step, 0);
        assert_eq!(steps(&reopened, &config).await, vec![0]);

        reopened.put(&config, Checkpoint::empty(1)).await.unwrap();
        assert_eq!(steps(&FileCheckpointSaver::new(dir.path()), &config).await, vec![0, 1]);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains(r#""id":"abc""#));
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_committed_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCheckpointSaver::new(dir.path());
        let config = CheckpointConfig::new("t");
        saver.put(&config, Checkpoint::empty(0)).await.unwrap();

        let path = dir.path().join("t").join("_default.jsonl");
        append_raw(&path, "not json\n").await;
        let last = serde_json::to_string(&Checkpoint::empty(1)).unwrap();
        append_raw(&path, &format!("{}\n", last)).await;

        let err = saver.get_latest(&config).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Serialization(_)));
        assert!(saver.put(&config, Checkpoint::empty(2)).await.is_err());
    }

    #[tokio::test]
    async fn test_cached_tail_sees_other_writers() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileCheckpointSaver::new(dir.path());
        let second = FileCheckpointSaver::new(dir.path());
        let config = CheckpointConfig::new("t").with_checkpoint_ns("para");

        first.put(&config, Checkpoint::empty(0)).await.unwrap();
        assert_eq!(first.get_latest(&config).await.unwrap().map(|c| c.step), Some(0));

        second.put(&config, Checkpoint::empty(1)).await.unwrap();
        assert_eq!(first.get_latest(&config).await.unwrap().map(|c| c.step), Some(1));

        let err = first.put(&config, Checkpoint::empty(1)).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Conflict { latest: 1, .. }));
    }

    #[tokio::test]
    async fn test_missing_lineage_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCheckpointSaver::new(dir.path().join("not-yet-created"));
        assert!(saver.get_latest(&CheckpointConfig::new("t")).await.unwrap().is_none());
    }
}
