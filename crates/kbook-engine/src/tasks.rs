//! Chapter tasks and their ordered store

use indexmap::IndexMap;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

use kbook_llm::prompts::END_OF_PREVIOUS_CHAPTER;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Generating,
    Done,
    Error,
}

impl TaskStatus {
    /// Done or error: the unit will not run again without a retry or rewrite
    #[must_use]
    pub fn is_processed(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// One chapter to generate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterTask {
    pub id: String,
    pub title: String,
    /// Leaf description, or the sub-sections as pretty JSON
    pub outline: String,
    pub path: Vec<String>,
    pub status: TaskStatus,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ChapterTask {
    #[must_use]
    pub fn new(id: String, title: String, outline: String) -> Self {
        Self {
            id,
            path: vec![title.clone()],
            title,
            outline,
            status: TaskStatus::Pending,
            content: String::new(),
            error_message: None,
        }
    }
}

/// Tasks in outline order, keyed by id.
///
/// Reads are public; only the engine mutates.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: IndexMap<String, ChapterTask>,
}

impl TaskStore {
    #[must_use]
    pub fn from_tasks(tasks: impl IntoIterator<Item = ChapterTask>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    pub(crate) fn replace_all(&mut self, tasks: impl IntoIterator<Item = ChapterTask>) {
        *self = Self::from_tasks(tasks);
    }

    pub(crate) fn clear(&mut self) {
        self.tasks.clear();
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut ChapterTask> {
        self.tasks.get_mut(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ChapterTask> {
        self.tasks.get(id)
    }

    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.tasks.get_index_of(id)
    }

    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&ChapterTask> {
        self.tasks.get_index(index).map(|(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChapterTask> {
        self.tasks.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[must_use]
    pub fn count(&self, status: TaskStatus) -> usize {
        self.iter().filter(|t| t.status == status).count()
    }

    /// Every task is done or error. False for an empty store.
    #[must_use]
    pub fn all_processed(&self) -> bool {
        !self.is_empty() && self.iter().all(|t| t.status.is_processed())
    }

    #[must_use]
    pub fn any_pending(&self) -> bool {
        self.iter().any(|t| t.status == TaskStatus::Pending)
    }

    #[must_use]
    pub fn any_generating(&self) -> bool {
        self.iter().any(|t| t.status == TaskStatus::Generating)
    }

    /// First task in order that is pending or failed
    #[must_use]
    pub fn next_runnable(&self) -> Option<&ChapterTask> {
        self.iter()
            .find(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Error))
    }

    #[must_use]
    pub fn next_pending(&self) -> Option<&ChapterTask> {
        self.iter().find(|t| t.status == TaskStatus::Pending)
    }

    /// Text of every finished chapter before `index`, in order
    #[must_use]
    pub fn continuity_context(&self, index: usize) -> String {
        self.iter()
            .take(index)
            .filter(|t| t.status == TaskStatus::Done && !t.content.is_empty())
            .map(|t| {
                format!(
                    "Chapter: {}\n{}\n\n{END_OF_PREVIOUS_CHAPTER}\n\n",
                    t.title, t.content
                )
            })
            .collect()
    }
}
