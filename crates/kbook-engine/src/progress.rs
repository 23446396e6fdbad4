//! Progress summary for the chapter phase

use serde::Serialize;
use std::fmt;

use crate::tasks::{TaskStatus, TaskStore};

/// What the automatic-mode control offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoControl {
    Start,
    Resume,
    Pause,
    /// Automatic mode is on but nothing is streaming yet
    Pausing,
}

impl AutoControl {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Start => "Start automatic chapter generation",
            Self::Resume => "Resume automatic generation",
            Self::Pause => "Pause automatic generation",
            Self::Pausing => "Pausing...",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "title", rename_all = "snake_case")]
pub enum ProgressStatus {
    Writing(String),
    PreparingNext,
    HaltedWithErrors,
    AllProcessed,
    InProgress,
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Writing(title) => write!(f, "Writing: {title}..."),
            Self::PreparingNext => f.write_str("Preparing next chapter..."),
            Self::HaltedWithErrors => f.write_str("Generation halted (errors)"),
            Self::AllProcessed => f.write_str("All chapters processed"),
            Self::InProgress => f.write_str("Progress"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub completed: usize,
    pub total: usize,
    /// 0 to 100; 0 for an empty book
    pub percentage: f64,
    pub all_processed: bool,
    pub pending_exist: bool,
    pub can_toggle: bool,
    pub control: AutoControl,
    pub status: ProgressStatus,
}

impl ProgressSummary {
    #[must_use]
    pub fn compute(tasks: &TaskStore, auto: bool, active: Option<&str>) -> Self {
        let completed = tasks.count(TaskStatus::Done);
        let total = tasks.len();
        let percentage = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        let all_processed = tasks.all_processed();
        let pending_exist = tasks.any_pending();
        let active_title = active.and_then(|id| tasks.get(id)).map(|t| t.title.clone());

        let control = match (auto, active.is_some(), pending_exist) {
            (true, true, _) => AutoControl::Pause,
            (true, false, _) => AutoControl::Pausing,
            (false, _, true) => AutoControl::Resume,
            (false, _, false) => AutoControl::Start,
        };
        let status = match active_title {
            Some(title) => ProgressStatus::Writing(title),
            None if auto && pending_exist => ProgressStatus::PreparingNext,
            None if all_processed && completed < total => ProgressStatus::HaltedWithErrors,
            None if all_processed => ProgressStatus::AllProcessed,
            None => ProgressStatus::InProgress,
        };

        Self {
            completed,
            total,
            percentage,
            all_processed,
            pending_exist,
            can_toggle: auto || pending_exist,
            control,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::ChapterTask;

    fn store(statuses: &[TaskStatus]) -> TaskStore {
        TaskStore::from_tasks(statuses.iter().enumerate().map(|(i, s)| {
            let mut t = ChapterTask::new(format!("c{i}"), format!("Chapter {i}"), String::new());
            t.status = *s;
            t
        }))
    }

    #[test]
    fn empty_book_is_zero_percent() {
        let p = ProgressSummary::compute(&TaskStore::default(), false, None);
        assert_eq!(p.percentage, 0.0);
        assert!(!p.all_processed);
        assert!(!p.can_toggle);
        assert_eq!(p.control, AutoControl::Start);
        assert_eq!(p.status, ProgressStatus::InProgress);
    }

    #[test]
    fn active_chapter_drives_labels() {
        use TaskStatus::*;
        let tasks = store(&[Done, Generating, Pending, Pending]);
        let p = ProgressSummary::compute(&tasks, true, Some("c1"));
        assert_eq!(p.percentage, 25.0);
        assert_eq!(p.control.label(), "Pause automatic generation");
        assert_eq!(p.status.to_string(), "Writing: Chapter 1...");

        let p = ProgressSummary::compute(&store(&[Done, Pending]), true, None);
        assert_eq!(p.control, AutoControl::Pausing);
        assert_eq!(p.status, ProgressStatus::PreparingNext);

        let p = ProgressSummary::compute(&store(&[Done, Pending]), false, None);
        assert_eq!(p.control, AutoControl::Resume);
        assert!(p.can_toggle);
    }

    #[test]
    fn processed_books_report_errors() {
        use TaskStatus::*;
        let p = ProgressSummary::compute(&store(&[Done, Error]), false, None);
        assert!(p.all_processed);
        assert!(!p.can_toggle);
        assert_eq!(p.status, ProgressStatus::HaltedWithErrors);

        let p = ProgressSummary::compute(&store(&[Done, Done]), false, None);
        assert_eq!(p.status, ProgressStatus::AllProcessed);
        assert_eq!(p.percentage, 100.0);
    }
}
