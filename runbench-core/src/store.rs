use std::path::{Path, PathBuf};

use runbench_model::{Run, RunId};
use tracing::warn;

use crate::error::Result;

const RECORDS_DIR: &str = "runs";
const ARTIFACTS_DIR: &str = "artifacts";

/// Durable, file-per-run persistence. Records are JSON under
/// `<root>/runs/<id>.json`; captured output lives under
/// `<root>/artifacts/<id>/`.
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    /// Open (and create, if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(root.join(RECORDS_DIR)).await?;
        tokio::fs::create_dir_all(root.join(ARTIFACTS_DIR)).await?;
        Ok(Self { root })
    }

    fn record_path(&self, run_id: &RunId) -> PathBuf {
        self.root.join(RECORDS_DIR).join(format!("{run_id}.json"))
    }

    /// Directory the coordinator flushes a run's captured output into.
    pub fn artifact_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(ARTIFACTS_DIR).join(run_id.to_string())
    }

    /// Write or fully replace the record for `run.id`. Goes through a temp
    /// file and rename so a crash mid-save never leaves a truncated record.
    pub async fn save(&self, run: &Run) -> Result<()> {
        let path = self.record_path(&run.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(run)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// The record for `run_id`, or `None` if unknown.
    pub async fn get(&self, run_id: &RunId) -> Result<Option<Run>> {
        let path = self.record_path(run_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// All records, newest submission first. A record that fails to parse is
    /// skipped rather than aborting the listing.
    pub async fn list(&self) -> Result<Vec<Run>> {
        let mut runs = Vec::new();
        let mut entries = tokio::fs::read_dir(self.root.join(RECORDS_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path).await {
                Ok(run) => runs.push(run),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable run record");
                }
            }
        }
        runs.sort_by(|a, b| {
            b.timestamps
                .queued
                .cmp(&a.timestamps.queued)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(runs)
    }

    /// Flush one named artifact for a run, creating its directory on first
    /// use. Returns the path for the run record.
    pub async fn write_artifact(
        &self,
        run_id: &RunId,
        name: &str,
        contents: &[u8],
    ) -> Result<PathBuf> {
        let dir = self.artifact_dir(run_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(name);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }
}

async fn read_record(path: &Path) -> Result<Run> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use runbench_model::{RunRequest, RunStatus, Variant};
    use tempfile::TempDir;

    async fn store() -> (TempDir, RunStore) {
        let dir = TempDir::new().unwrap();
        let store = RunStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let (_dir, store) = store().await;
        let run = Run::admitted(RunRequest::new("fib", Variant::Baseline));
        store.save(&run).await.unwrap();

        let loaded = store.get(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded, run);
    }

    #[tokio::test]
    async fn get_unknown_returns_none() {
        let (_dir, store) = store().await;
        assert!(store.get(&RunId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_replaces_prior_snapshot() {
        let (_dir, store) = store().await;
        let mut run = Run::admitted(RunRequest::new("fib", Variant::Baseline));
        store.save(&run).await.unwrap();

        run.status = RunStatus::Running;
        store.save(&run).await.unwrap();

        let loaded = store.get(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_skips_garbage() {
        let (dir, store) = store().await;

        let first = Run::admitted(RunRequest::new("a", Variant::Baseline));
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = Run::admitted(RunRequest::new("b", Variant::Baseline));
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        std::fs::write(dir.path().join("runs/not-a-run.json"), b"{broken").unwrap();

        let runs = store.list().await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second.id);
        assert_eq!(runs[1].id, first.id);
    }

    #[tokio::test]
    async fn writes_artifacts_under_run_dir() {
        let (_dir, store) = store().await;
        let id = RunId::new();
        let path = store.write_artifact(&id, "stdout.log", b"hello\n").await.unwrap();
        assert!(path.starts_with(store.artifact_dir(&id)));
        assert_eq!(std::fs::read(path).unwrap(), b"hello\n");
    }
}
