use std::cmp::Ordering;

use anyhow::anyhow;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::task::Task;

pub const UPCOMING_HORIZON_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Inbox,
    Today,
    Upcoming,
    Project,
    Label,
    Completed,
    Archive,
}

/// Which projection to render: a kind plus the project or label name when
/// the kind needs one. The active selector is persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub kind: ViewKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Default for Selector {
    fn default() -> Self {
        Self {
            kind: ViewKind::Inbox,
            key: None,
        }
    }
}

impl Selector {
    pub fn parse(tokens: &[String]) -> anyhow::Result<Self> {
        let Some(head) = tokens.first() else {
            return Err(anyhow!("empty view selector"));
        };

        let (name, mut key) = match head.split_once(':') {
            Some((name, key)) => (name.to_ascii_lowercase(), Some(key.to_string())),
            None => (head.to_ascii_lowercase(), None),
        };
        if key.is_none() && tokens.len() > 1 {
            key = Some(tokens[1..].join(" "));
        }

        let kind = match name.as_str() {
            "inbox" => ViewKind::Inbox,
            "today" => ViewKind::Today,
            "upcoming" => ViewKind::Upcoming,
            "project" => ViewKind::Project,
            "label" => ViewKind::Label,
            "completed" => ViewKind::Completed,
            "archive" | "archived" => ViewKind::Archive,
            other => return Err(anyhow!("unknown view: {other}")),
        };

        match kind {
            ViewKind::Project | ViewKind::Label => {
                let key = key
                    .filter(|value| !value.trim().is_empty())
                    .ok_or_else(|| anyhow!("view '{name}' requires a name, e.g. {name}:work"))?;
                Ok(Self {
                    kind,
                    key: Some(key.trim().to_string()),
                })
            }
            _ => Ok(Self { kind, key: None }),
        }
    }

    pub fn describe(&self) -> String {
        let name = match self.kind {
            ViewKind::Inbox => "inbox",
            ViewKind::Today => "today",
            ViewKind::Upcoming => "upcoming",
            ViewKind::Project => "project",
            ViewKind::Label => "label",
            ViewKind::Completed => "completed",
            ViewKind::Archive => "archive",
        };
        match &self.key {
            Some(key) => format!("{name}:{key}"),
            None => name.to_string(),
        }
    }
}

/// Derives the ordered projection for a selector: archive exclusion, then
/// the text query, then the kind filter, then the display sort. Purely a
/// function of its inputs; never mutates the collection.
pub fn project_view<'a>(
    tasks: &'a [Task],
    selector: &Selector,
    query: &str,
    today: NaiveDate,
) -> Vec<&'a Task> {
    let query = query.trim().to_lowercase();
    let mut rows: Vec<&Task> = tasks
        .iter()
        .filter(|task| selector.kind == ViewKind::Archive || !task.archived)
        .filter(|task| query.is_empty() || search_text(task).contains(&query))
        .filter(|task| kind_matches(task, selector, today))
        .collect();
    rows.sort_by(|a, b| display_order(a, b));
    rows
}

fn kind_matches(task: &Task, selector: &Selector, today: NaiveDate) -> bool {
    match selector.kind {
        ViewKind::Inbox => !task.is_completed(),
        ViewKind::Today => {
            !task.is_completed() && task.due.map(|due| due <= today).unwrap_or(false)
        }
        ViewKind::Upcoming => {
            let horizon = today
                .checked_add_days(Days::new(UPCOMING_HORIZON_DAYS))
                .unwrap_or(today);
            !task.is_completed()
                && task
                    .due
                    .map(|due| due >= today && due <= horizon)
                    .unwrap_or(false)
        }
        ViewKind::Project => {
            !task.is_completed() && task.project.as_deref() == selector.key.as_deref()
        }
        ViewKind::Label => {
            !task.is_completed()
                && selector
                    .key
                    .as_deref()
                    .map(|key| task.labels.iter().any(|label| label == key))
                    .unwrap_or(false)
        }
        ViewKind::Completed => task.is_completed(),
        ViewKind::Archive => task.archived,
    }
}

/// Space-joined lowercase haystack of title, notes, project and labels;
/// missing fields are skipped.
fn search_text(task: &Task) -> String {
    let mut parts: Vec<&str> = vec![task.title.as_str()];
    if let Some(notes) = task.notes.as_deref() {
        parts.push(notes);
    }
    if let Some(project) = task.project.as_deref() {
        parts.push(project);
    }
    for label in &task.labels {
        parts.push(label.as_str());
    }
    parts.join(" ").to_lowercase()
}

/// Due date ascending with undated tasks last, then priority descending,
/// then creation time ascending.
pub fn display_order(a: &Task, b: &Task) -> Ordering {
    let due = match (a.due, b.due) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    due.then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Buckets an already-sorted projection by calendar day for display.
/// Chronological buckets first, the "no due date" bucket last; the sort
/// above guarantees that order, so one sequential pass suffices.
pub fn group_by_due<'a>(rows: &[&'a Task]) -> Vec<(Option<NaiveDate>, Vec<&'a Task>)> {
    let mut buckets: Vec<(Option<NaiveDate>, Vec<&Task>)> = Vec::new();
    for &task in rows {
        match buckets.last_mut() {
            Some((due, bucket)) if *due == task.due => bucket.push(task),
            _ => buckets.push((task.due, vec![task])),
        }
    }
    buckets
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub inbox: usize,
    pub today: usize,
    pub upcoming: usize,
    pub completed: usize,
    pub archive: usize,
}

/// Badge counts per kind, always computed without a text query.
pub fn counts(tasks: &[Task], today: NaiveDate) -> Counts {
    let count = |kind: ViewKind| {
        project_view(tasks, &Selector { kind, key: None }, "", today).len()
    };
    Counts {
        inbox: count(ViewKind::Inbox),
        today: count(ViewKind::Today),
        upcoming: count(ViewKind::Upcoming),
        completed: count(ViewKind::Completed),
        archive: count(ViewKind::Archive),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Days, NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    use super::{Counts, Selector, ViewKind, counts, group_by_due, project_view};
    use crate::task::{Priority, Recur, Task};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).expect("valid date")
    }

    fn task(title: &str, due: Option<NaiveDate>) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            notes: None,
            project: None,
            labels: vec![],
            priority: Priority::Low,
            due,
            recur: Recur::None,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
            completed_at: None,
            archived: false,
        }
    }

    fn selector(kind: ViewKind) -> Selector {
        Selector { kind, key: None }
    }

    fn titles(rows: &[&Task]) -> Vec<String> {
        rows.iter().map(|t| t.title.clone()).collect()
    }

    fn date_set() -> Vec<Task> {
        let today = today();
        vec![
            task("yesterday", today.checked_sub_days(Days::new(1))),
            task("today", Some(today)),
            task("tomorrow", today.checked_add_days(Days::new(1))),
            task("far", today.checked_add_days(Days::new(10))),
            task("undated", None),
        ]
    }

    #[test]
    fn today_view_surfaces_overdue_tasks() {
        let tasks = date_set();
        let rows = project_view(&tasks, &selector(ViewKind::Today), "", today());
        assert_eq!(titles(&rows), vec!["yesterday", "today"]);
    }

    #[test]
    fn upcoming_view_is_a_seven_day_window() {
        let tasks = date_set();
        let rows = project_view(&tasks, &selector(ViewKind::Upcoming), "", today());
        assert_eq!(titles(&rows), vec!["today", "tomorrow"]);
    }

    #[test]
    fn sort_breaks_due_ties_by_priority() {
        let mut high = task("high", Some(today()));
        high.priority = Priority::High;
        let mut urgent = task("urgent", Some(today()));
        urgent.priority = Priority::Urgent;
        let tasks = vec![high, urgent];

        let rows = project_view(&tasks, &selector(ViewKind::Inbox), "", today());
        assert_eq!(titles(&rows), vec!["urgent", "high"]);
    }

    #[test]
    fn undated_tasks_sort_last_and_bucket_last() {
        let tasks = date_set();
        let rows = project_view(&tasks, &selector(ViewKind::Inbox), "", today());
        assert_eq!(
            titles(&rows),
            vec!["yesterday", "today", "tomorrow", "far", "undated"]
        );

        let buckets = group_by_due(&rows);
        assert_eq!(buckets.len(), 5);
        assert_eq!(buckets.last().map(|(due, _)| *due), Some(None));
    }

    #[test]
    fn search_matches_labels_alone() {
        let mut labelled = task("call the bank", None);
        labelled.labels = vec!["urgent".to_string()];
        let other = task("buy milk", None);
        let tasks = vec![labelled, other];

        let rows = project_view(&tasks, &selector(ViewKind::Inbox), "urgent", today());
        assert_eq!(titles(&rows), vec!["call the bank"]);
    }

    #[test]
    fn search_is_case_insensitive_over_notes() {
        let mut noted = task("errand", None);
        noted.notes = Some("Pick up the Dry Cleaning".to_string());
        let tasks = vec![noted];

        let rows = project_view(&tasks, &selector(ViewKind::Inbox), "dry clean", today());
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn archive_view_sees_what_every_other_view_hides() {
        let mut archived = task("old", None);
        archived.archived = true;
        let live = task("live", None);
        let tasks = vec![archived, live];

        let inbox = project_view(&tasks, &selector(ViewKind::Inbox), "", today());
        assert_eq!(titles(&inbox), vec!["live"]);

        let archive = project_view(&tasks, &selector(ViewKind::Archive), "", today());
        assert_eq!(titles(&archive), vec!["old"]);
    }

    #[test]
    fn completed_view_excludes_archived_tasks() {
        let now = Utc.with_ymd_and_hms(2024, 6, 9, 12, 0, 0).unwrap();
        let mut done = task("done", None);
        done.completed_at = Some(now);
        let mut done_archived = task("done and archived", None);
        done_archived.completed_at = Some(now);
        done_archived.archived = true;
        let tasks = vec![done, done_archived];

        let rows = project_view(&tasks, &selector(ViewKind::Completed), "", today());
        assert_eq!(titles(&rows), vec!["done"]);
    }

    #[test]
    fn project_and_label_selectors_match_open_tasks_only() {
        let now = Utc.with_ymd_and_hms(2024, 6, 9, 12, 0, 0).unwrap();
        let mut in_project = task("write report", None);
        in_project.project = Some("work".to_string());
        let mut done_in_project = task("old report", None);
        done_in_project.project = Some("work".to_string());
        done_in_project.completed_at = Some(now);
        let mut labelled = task("sharpen saw", None);
        labelled.labels = vec!["deep".to_string()];
        let tasks = vec![in_project, done_in_project, labelled];

        let by_project = Selector::parse(&["project:work".to_string()]).expect("selector");
        let rows = project_view(&tasks, &by_project, "", today());
        assert_eq!(titles(&rows), vec!["write report"]);

        let by_label = Selector::parse(&["label".to_string(), "deep".to_string()])
            .expect("selector");
        let rows = project_view(&tasks, &by_label, "", today());
        assert_eq!(titles(&rows), vec!["sharpen saw"]);
    }

    #[test]
    fn selector_parse_rejects_bad_input() {
        assert!(Selector::parse(&[]).is_err());
        assert!(Selector::parse(&["someday".to_string()]).is_err());
        assert!(Selector::parse(&["project".to_string()]).is_err());
        assert!(Selector::parse(&["label:".to_string()]).is_err());
    }

    #[test]
    fn counts_cover_every_badge_kind() {
        let now = Utc.with_ymd_and_hms(2024, 6, 9, 12, 0, 0).unwrap();
        let mut tasks = date_set();
        tasks[4].completed_at = Some(now);
        let mut archived = task("archived", None);
        archived.archived = true;
        tasks.push(archived);

        assert_eq!(
            counts(&tasks, today()),
            Counts {
                inbox: 4,
                today: 2,
                upcoming: 2,
                completed: 1,
                archive: 1,
            }
        );
    }
}
