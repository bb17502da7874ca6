use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Low,
    Med,
    High,
    Urgent,
}

impl Priority {
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "low" | "l" => Some(Self::Low),
            "med" | "medium" | "m" => Some(Self::Med),
            "high" | "h" => Some(Self::High),
            "urgent" | "u" => Some(Self::Urgent),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Med => "med",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recur {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

impl Recur {
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "none" | "off" => Some(Self::None),
            "daily" | "day" => Some(Self::Daily),
            "weekly" | "week" => Some(Self::Weekly),
            "monthly" | "month" => Some(Self::Monthly),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,

    pub title: String,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub project: Option<String>,

    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub due: Option<NaiveDate>,

    #[serde(default)]
    pub recur: Recur,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub title: String,
    pub notes: Option<String>,
    pub project: Option<String>,
    pub labels: Vec<String>,
    pub priority: Priority,
    pub due: Option<NaiveDate>,
    pub recur: Recur,
}

impl Task {
    /// Builds a task from a draft. Returns `None` when the trimmed title is
    /// empty; the draft is rejected without side effects.
    pub fn from_draft(draft: Draft, now: DateTime<Utc>) -> Option<Self> {
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return None;
        }

        Some(Self {
            id: Uuid::new_v4(),
            title,
            notes: draft.notes,
            project: draft.project,
            labels: dedup_labels(draft.labels),
            priority: draft.priority,
            due: draft.due,
            recur: draft.recur,
            created_at: now,
            completed_at: None,
            archived: false,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// First eight hex digits of the id, enough to address tasks from the CLI.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

pub fn dedup_labels(labels: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        let label = label.trim().to_string();
        if label.is_empty() {
            continue;
        }
        if out.iter().all(|existing| existing != &label) {
            out.push(label);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Draft, Priority, Recur, Task, dedup_labels};

    #[test]
    fn draft_with_blank_title_is_rejected() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let draft = Draft {
            title: "   ".to_string(),
            ..Draft::default()
        };
        assert!(Task::from_draft(draft, now).is_none());
    }

    #[test]
    fn draft_defaults_and_label_dedup() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let draft = Draft {
            title: "  water the plants  ".to_string(),
            labels: vec![
                "home".to_string(),
                "garden".to_string(),
                "home".to_string(),
            ],
            ..Draft::default()
        };

        let task = Task::from_draft(draft, now).expect("valid draft");
        assert_eq!(task.title, "water the plants");
        assert_eq!(task.labels, vec!["home".to_string(), "garden".to_string()]);
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.recur, Recur::None);
        assert_eq!(task.created_at, now);
        assert!(task.completed_at.is_none());
        assert!(!task.archived);
    }

    #[test]
    fn priority_order_ranks_urgent_highest() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Med);
        assert!(Priority::Med > Priority::Low);
    }

    #[test]
    fn dedup_drops_blank_labels() {
        let labels = dedup_labels(vec!["a".to_string(), "  ".to_string(), "a".to_string()]);
        assert_eq!(labels, vec!["a".to_string()]);
    }
}
