use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::task::Task;
use crate::view::Selector;

/// Persistence collaborator for the two snapshots the engine keeps: the
/// task collection (JSON Lines, one task per line, order preserved) and
/// the last-selected view. Both load-or-default and save atomically.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub view_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let view_path = data_dir.join("view.data");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }
        if !view_path.exists() {
            fs::write(&view_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            view = %view_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            view_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        debug!(file = %self.tasks_path.display(), "loading task snapshot");
        let file = fs::File::open(&self.tasks_path)
            .with_context(|| format!("failed to open {}", self.tasks_path.display()))?;
        let reader = BufReader::new(file);

        let mut out = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let task: Task = serde_json::from_str(trimmed).with_context(|| {
                format!(
                    "failed parsing {} line {}",
                    self.tasks_path.display(),
                    idx + 1
                )
            })?;
            out.push(task);
        }

        debug!(count = out.len(), "loaded task snapshot");
        Ok(out)
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        debug!(
            file = %self.tasks_path.display(),
            count = tasks.len(),
            "saving task snapshot"
        );

        let mut temp = new_sibling_tempfile(&self.tasks_path)?;
        for task in tasks {
            let serialized = serde_json::to_string(task)?;
            writeln!(temp, "{serialized}")?;
        }
        persist_over(temp, &self.tasks_path)
    }

    /// The last-selected view, or the default when nothing was saved yet.
    /// A corrupt selector falls back to the default instead of failing the
    /// whole invocation.
    #[tracing::instrument(skip(self))]
    pub fn load_view(&self) -> Selector {
        let raw = match fs::read_to_string(&self.view_path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    file = %self.view_path.display(),
                    error = %err,
                    "failed reading view snapshot; using default view"
                );
                return Selector::default();
            }
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Selector::default();
        }

        match serde_json::from_str(trimmed) {
            Ok(selector) => selector,
            Err(err) => {
                warn!(
                    file = %self.view_path.display(),
                    error = %err,
                    "corrupt view snapshot; using default view"
                );
                Selector::default()
            }
        }
    }

    #[tracing::instrument(skip(self, selector))]
    pub fn save_view(&self, selector: &Selector) -> anyhow::Result<()> {
        debug!(view = %selector.describe(), "saving view snapshot");
        let mut temp = new_sibling_tempfile(&self.view_path)?;
        writeln!(temp, "{}", serde_json::to_string(selector)?)?;
        persist_over(temp, &self.view_path)
    }
}

fn new_sibling_tempfile(target: &Path) -> anyhow::Result<NamedTempFile> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file next to {}", target.display()))
}

fn persist_over(mut temp: NamedTempFile, target: &Path) -> anyhow::Result<()> {
    temp.flush()?;
    temp.persist(target)
        .map_err(|err| anyhow!("failed to persist {}: {}", target.display(), err))?;
    Ok(())
}
