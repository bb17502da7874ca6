use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::datastore::DataStore;
use crate::recur::next_occurrence;
use crate::task::{Draft, Priority, Recur, Task, dedup_labels};

/// Partial update for `TaskStore::edit`. Outer `None` leaves a field alone;
/// for clearable fields the inner `Option` distinguishes "set" from
/// "clear", so `Some(None)` explicitly empties `due`, `notes`, `project`
/// or `completed_at`.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub notes: Option<Option<String>>,
    pub project: Option<Option<String>>,
    pub labels: Option<Vec<String>>,
    pub priority: Option<Priority>,
    pub due: Option<Option<NaiveDate>>,
    pub recur: Option<Recur>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub archived: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    NoMatch,
    Completed { spawned: Option<Uuid> },
    Reopened,
}

/// Owns the in-memory task collection and pushes a snapshot to the
/// datastore after every mutation. A failed write is logged and the
/// in-memory state stays authoritative for the rest of the session.
#[derive(Debug)]
pub struct TaskStore {
    tasks: Vec<Task>,
    datastore: DataStore,
}

impl TaskStore {
    pub fn open(datastore: DataStore) -> anyhow::Result<Self> {
        let tasks = datastore.load_tasks()?;
        Ok(Self { tasks, datastore })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn datastore(&self) -> &DataStore {
        &self.datastore
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Resolves a hex id prefix typed on the command line. Empty or
    /// ambiguous prefixes resolve to nothing rather than guessing.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<&Task> {
        let needle = prefix.trim().to_ascii_lowercase().replace('-', "");
        if needle.is_empty() {
            return None;
        }

        let mut matches = self
            .tasks
            .iter()
            .filter(|task| task.id.simple().to_string().starts_with(&needle));
        let first = matches.next()?;
        if matches.next().is_some() {
            None
        } else {
            Some(first)
        }
    }

    /// Admits a draft into the collection. `None` means the trimmed title
    /// was empty and nothing changed.
    #[instrument(skip(self, draft, now))]
    pub fn add(&mut self, draft: Draft, now: DateTime<Utc>) -> Option<Uuid> {
        let task = Task::from_draft(draft, now)?;
        let id = task.id;
        info!(id = %id, "task created");
        self.tasks.push(task);
        self.persist();
        Some(id)
    }

    /// Flips completion. Completing a recurring task also spawns its next
    /// occurrence: a copy with a fresh id and creation time, not completed,
    /// due advanced from the original's due date (or from today when it had
    /// none). Reopening never retracts a previously spawned sibling.
    #[instrument(skip(self, now, today))]
    pub fn toggle_complete(&mut self, id: Uuid, now: DateTime<Utc>, today: NaiveDate) -> ToggleOutcome {
        let Some(idx) = self.tasks.iter().position(|task| task.id == id) else {
            return ToggleOutcome::NoMatch;
        };

        let outcome = if self.tasks[idx].is_completed() {
            self.tasks[idx].completed_at = None;
            info!(id = %id, "task reopened");
            ToggleOutcome::Reopened
        } else {
            self.tasks[idx].completed_at = Some(now);
            info!(id = %id, "task completed");
            let spawned = self.spawn_next_occurrence(idx, now, today);
            ToggleOutcome::Completed { spawned }
        };

        self.persist();
        outcome
    }

    fn spawn_next_occurrence(
        &mut self,
        idx: usize,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Option<Uuid> {
        let base = self.tasks[idx].due.unwrap_or(today);
        let next_due = next_occurrence(base, self.tasks[idx].recur)?;

        let mut sibling = self.tasks[idx].clone();
        sibling.id = Uuid::new_v4();
        sibling.created_at = now;
        sibling.completed_at = None;
        sibling.due = Some(next_due);

        let spawned = sibling.id;
        info!(
            original = %self.tasks[idx].id,
            spawned = %spawned,
            due = %next_due,
            "recurrence spawned next occurrence"
        );
        self.tasks.push(sibling);
        Some(spawned)
    }

    /// Permanent deletion. `false` when the id is unknown; never an error.
    #[instrument(skip(self))]
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        if self.tasks.len() == before {
            return false;
        }

        info!(id = %id, "task removed");
        self.persist();
        true
    }

    /// One-way transition out of every active view. Completion state is
    /// left as it was.
    #[instrument(skip(self))]
    pub fn archive(&mut self, id: Uuid) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) else {
            return false;
        };
        task.archived = true;

        info!(id = %id, "task archived");
        self.persist();
        true
    }

    /// Shallow merge of the supplied fields. A blank title in the patch is
    /// ignored rather than admitted.
    #[instrument(skip(self, patch))]
    pub fn edit(&mut self, id: Uuid, patch: TaskPatch) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) else {
            return false;
        };

        if let Some(title) = patch.title {
            let trimmed = title.trim().to_string();
            if !trimmed.is_empty() {
                task.title = trimmed;
            }
        }
        if let Some(notes) = patch.notes {
            task.notes = notes;
        }
        if let Some(project) = patch.project {
            task.project = project;
        }
        if let Some(labels) = patch.labels {
            task.labels = dedup_labels(labels);
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(due) = patch.due {
            task.due = due;
        }
        if let Some(recur_rule) = patch.recur {
            task.recur = recur_rule;
        }
        if let Some(completed_at) = patch.completed_at {
            task.completed_at = completed_at;
        }
        if let Some(archived) = patch.archived {
            task.archived = archived;
        }

        info!(id = %id, "task edited");
        self.persist();
        true
    }

    /// Completes every open task due today or earlier. Spawns no recurrence
    /// siblings, unlike the single-task toggle path.
    #[instrument(skip(self, now, today))]
    pub fn bulk_complete_today(&mut self, now: DateTime<Utc>, today: NaiveDate) -> usize {
        let mut completed = 0;
        for task in &mut self.tasks {
            if task.completed_at.is_none() && task.due.map(|due| due <= today).unwrap_or(false) {
                task.completed_at = Some(now);
                completed += 1;
            }
        }

        if completed > 0 {
            info!(completed, "bulk completed due tasks");
            self.persist();
        }
        completed
    }

    /// Wholesale replacement, used by import and restore.
    #[instrument(skip(self, tasks))]
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        info!(count = tasks.len(), "replacing task collection");
        self.tasks = tasks;
        self.persist();
    }

    fn persist(&self) {
        if let Err(err) = self.datastore.save_tasks(&self.tasks) {
            warn!(
                error = %err,
                "failed to persist task snapshot; in-memory state remains authoritative"
            );
        }
    }
}
