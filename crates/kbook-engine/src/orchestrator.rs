//! Chapter generation orchestrator
//!
//! Owns the task store and runs at most one chapter stream at a time. Automatic
//! mode is a queue: [`ChapterOrchestrator::try_advance_queue`] picks the next
//! pending or failed chapter, and the caller runs it. The decision itself is the
//! pure [`next_decision`], so it can be reapplied after any mutation.

use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Instrument, debug, info, trace, warn};

use kbook_llm::{ChapterRequest, GenerationClient, LlmError, redact_error_message};
use kbook_utils::UserInputs;
use kbook_utils::logging::chapter_span;

use crate::error::KbookError;
use crate::events::{EventBus, SessionEvent};
use crate::tasks::{ChapterTask, TaskStatus, TaskStore};

/// Shared on/off flag for automatic mode.
///
/// Clones share state, so a signal handler can pause the queue while a stream
/// is in flight. The running chapter always finishes.
#[derive(Debug, Clone, Default)]
pub struct AutoModeSwitch(Arc<AtomicBool>);

impl AutoModeSwitch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Set the flag and return the previous value
    pub fn set(&self, on: bool) -> bool {
        self.0.swap(on, Ordering::SeqCst)
    }
}

/// Conditions the queue is gated on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueGate {
    pub in_chapter_phase: bool,
    pub auto: bool,
    pub unit_active: bool,
    pub rewrite_open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Run this task next
    Start(String),
    /// Nothing is left to run; automatic mode should switch off
    Finished,
    /// Not allowed to start anything right now
    Idle,
}

/// Decide what the queue does next. Pure and idempotent.
#[must_use]
pub fn next_decision(tasks: &TaskStore, gate: QueueGate) -> NextStep {
    if !gate.in_chapter_phase || !gate.auto || gate.unit_active || gate.rewrite_open {
        return NextStep::Idle;
    }
    match tasks.next_runnable() {
        Some(task) => NextStep::Start(task.id.clone()),
        None if !tasks.any_generating() => NextStep::Finished,
        None => NextStep::Idle,
    }
}

/// Session data every chapter call needs
#[derive(Debug, Clone, Copy)]
pub struct UnitContext<'a> {
    pub inputs: &'a UserInputs,
    pub reference_text: &'a str,
    /// The approved outline as pretty JSON
    pub full_structure: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A fresh run was requested while automatic mode is off
    AutoModeOff,
    /// The chapter is already done or generating and nothing else is pending
    NothingToRun,
    /// Another chapter is streaming
    UnitActive,
}

#[derive(Debug, Clone)]
pub enum UnitOutcome {
    Completed {
        task_id: String,
    },
    Failed {
        task_id: String,
        title: String,
        error: LlmError,
    },
    Skipped(SkipReason),
}

pub struct ChapterOrchestrator {
    tasks: TaskStore,
    auto: AutoModeSwitch,
    active: Option<String>,
    rewrite: Option<String>,
    events: EventBus,
}

impl ChapterOrchestrator {
    #[must_use]
    pub fn new(events: EventBus, auto: AutoModeSwitch) -> Self {
        Self {
            tasks: TaskStore::default(),
            auto,
            active: None,
            rewrite: None,
            events,
        }
    }

    #[must_use]
    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    /// Id of the chapter currently streaming
    #[must_use]
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Id of the chapter with an open rewrite request
    #[must_use]
    pub fn rewrite_target(&self) -> Option<&str> {
        self.rewrite.as_deref()
    }

    #[must_use]
    pub fn auto_mode(&self) -> bool {
        self.auto.is_on()
    }

    #[must_use]
    pub fn auto_switch(&self) -> AutoModeSwitch {
        self.auto.clone()
    }

    pub fn set_auto_mode(&mut self, on: bool) {
        if self.auto.set(on) != on {
            debug!(enabled = on, "automatic mode changed");
            self.events.publish(SessionEvent::AutoModeChanged { enabled: on });
        }
    }

    pub(crate) fn load(&mut self, tasks: Vec<ChapterTask>) {
        self.tasks.replace_all(tasks);
        self.active = None;
        self.rewrite = None;
    }

    pub(crate) fn clear(&mut self) {
        self.tasks.clear();
        self.active = None;
        self.rewrite = None;
    }

    /// Leave the chapter phase: automatic mode off, no active chapter
    pub(crate) fn halt(&mut self) {
        self.set_auto_mode(false);
        self.active = None;
    }

    /// Apply [`next_decision`] and its side effects.
    ///
    /// A failed chapter picked by the queue is reset to pending first. When
    /// nothing is left, automatic mode switches off.
    pub fn try_advance_queue(&mut self, in_chapter_phase: bool) -> NextStep {
        let step = next_decision(
            &self.tasks,
            QueueGate {
                in_chapter_phase,
                auto: self.auto.is_on(),
                unit_active: self.active.is_some(),
                rewrite_open: self.rewrite.is_some(),
            },
        );
        match &step {
            NextStep::Start(id) => {
                if self.tasks.get(id).is_some_and(|t| t.status == TaskStatus::Error) {
                    self.reset_to_pending(id);
                }
            }
            NextStep::Finished => {
                info!(chapters = self.tasks.len(), "all chapters processed");
                self.set_auto_mode(false);
            }
            NextStep::Idle => {}
        }
        step
    }

    fn reset_to_pending(&mut self, id: &str) {
        if let Some(task) = self.tasks.get_mut(id) {
            task.status = TaskStatus::Pending;
            task.content.clear();
            task.error_message = None;
            self.events.publish(SessionEvent::ChapterReset {
                task_id: id.to_string(),
            });
        }
    }

    /// Generate one chapter.
    ///
    /// A fresh run needs automatic mode. A rewrite (instructions present) is
    /// always honored and switches automatic mode off first.
    ///
    /// # Errors
    ///
    /// `KbookError::UnknownTask` when `task_id` is not in the store. Generation
    /// failures are reported through [`UnitOutcome::Failed`].
    pub async fn run_unit(
        &mut self,
        ctx: UnitContext<'_>,
        client: &GenerationClient,
        task_id: &str,
        rewrite: Option<&str>,
    ) -> Result<UnitOutcome, KbookError> {
        let status = self
            .tasks
            .get(task_id)
            .map(|t| t.status)
            .ok_or_else(|| KbookError::UnknownTask(task_id.to_string()))?;
        if self.active.is_some() {
            return Ok(UnitOutcome::Skipped(SkipReason::UnitActive));
        }
        if rewrite.is_some() {
            self.set_auto_mode(false);
        } else if !self.auto.is_on() {
            debug!(task_id, "fresh run refused while automatic mode is off");
            return Ok(UnitOutcome::Skipped(SkipReason::AutoModeOff));
        }

        let mut target = task_id.to_string();
        if rewrite.is_none() && matches!(status, TaskStatus::Done | TaskStatus::Generating) {
            match self.tasks.next_pending() {
                Some(next) => target = next.id.clone(),
                None => {
                    self.set_auto_mode(false);
                    return Ok(UnitOutcome::Skipped(SkipReason::NothingToRun));
                }
            }
        }
        self.generate(ctx, client, &target, rewrite).await
    }

    async fn generate(
        &mut self,
        ctx: UnitContext<'_>,
        client: &GenerationClient,
        id: &str,
        rewrite: Option<&str>,
    ) -> Result<UnitOutcome, KbookError> {
        let index = self
            .tasks
            .index_of(id)
            .ok_or_else(|| KbookError::UnknownTask(id.to_string()))?;
        let (title, outline) = {
            let task = self
                .tasks
                .get_mut(id)
                .ok_or_else(|| KbookError::UnknownTask(id.to_string()))?;
            if rewrite.is_some() || task.status == TaskStatus::Pending {
                task.content.clear();
            }
            task.status = TaskStatus::Generating;
            task.error_message = None;
            (task.title.clone(), task.outline.clone())
        };
        self.active = Some(id.to_string());
        self.events.publish(SessionEvent::ChapterStarted {
            task_id: id.to_string(),
            title: title.clone(),
            rewrite: rewrite.is_some(),
        });

        let prior = self.tasks.continuity_context(index);
        let request = ChapterRequest {
            inputs: ctx.inputs,
            title: &title,
            unit_outline: &outline,
            full_structure: ctx.full_structure,
            prior_text: &prior,
            reference_text: ctx.reference_text,
            rewrite_instructions: rewrite,
        };
        let span = chapter_span(id, &title, rewrite.is_some());
        let result = self
            .stream_into(client, request, id)
            .instrument(span)
            .await;

        let outcome = match result {
            Ok(()) => {
                let chars = self.finish(id, |task| {
                    task.status = TaskStatus::Done;
                    task.content = task.content.trim().to_string();
                    task.content.len()
                });
                info!(task_id = id, title = %title, chars, "chapter completed");
                self.events.publish(SessionEvent::ChapterCompleted {
                    task_id: id.to_string(),
                    chars,
                });
                UnitOutcome::Completed {
                    task_id: id.to_string(),
                }
            }
            Err(error) => {
                let message = error.to_string();
                self.finish(id, |task| {
                    task.status = TaskStatus::Error;
                    task.error_message = Some(message.clone());
                });
                warn!(
                    task_id = id,
                    title = %title,
                    error = %redact_error_message(&message),
                    "chapter generation failed"
                );
                self.events.publish(SessionEvent::ChapterFailed {
                    task_id: id.to_string(),
                    title: title.clone(),
                    message,
                });
                self.set_auto_mode(false);
                UnitOutcome::Failed {
                    task_id: id.to_string(),
                    title,
                    error,
                }
            }
        };

        self.active = None;
        if rewrite.is_some() {
            self.rewrite = None;
        }
        Ok(outcome)
    }

    fn finish<T: Default>(&mut self, id: &str, apply: impl FnOnce(&mut ChapterTask) -> T) -> T {
        self.tasks.get_mut(id).map(apply).unwrap_or_default()
    }

    async fn stream_into(
        &mut self,
        client: &GenerationClient,
        request: ChapterRequest<'_>,
        id: &str,
    ) -> Result<(), LlmError> {
        let mut stream = client.generate_chapter_stream(request).await?;
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            if let Some(task) = self.tasks.get_mut(id) {
                task.content.push_str(&fragment);
                trace!(task_id = id, len = task.content.len(), "chapter fragment");
            }
            self.events.publish(SessionEvent::ChapterDelta {
                task_id: id.to_string(),
                fragment,
            });
        }
        Ok(())
    }

    /// Open a rewrite request for `task_id`; automatic mode switches off.
    ///
    /// # Errors
    ///
    /// Unknown task, or a request already open for another chapter.
    pub fn open_rewrite(&mut self, task_id: &str) -> Result<(), KbookError> {
        if self.tasks.get(task_id).is_none() {
            return Err(KbookError::UnknownTask(task_id.to_string()));
        }
        if let Some(open) = self.rewrite.as_deref().filter(|open| *open != task_id) {
            return Err(KbookError::RewriteInProgress(open.to_string()));
        }
        self.set_auto_mode(false);
        self.rewrite = Some(task_id.to_string());
        Ok(())
    }

    /// Close the open request without running anything. Returns whether one was open.
    pub fn cancel_rewrite(&mut self) -> bool {
        self.rewrite.take().is_some()
    }

    /// Reset the chapter with the open request and regenerate it with `instructions`.
    ///
    /// # Errors
    ///
    /// No open request, or blank instructions.
    pub async fn submit_rewrite(
        &mut self,
        ctx: UnitContext<'_>,
        client: &GenerationClient,
        instructions: &str,
    ) -> Result<UnitOutcome, KbookError> {
        if instructions.trim().is_empty() {
            return Err(KbookError::EmptyRewriteInstructions);
        }
        let id = self.rewrite.clone().ok_or(KbookError::NoRewriteOpen)?;
        self.reset_to_pending(&id);
        self.run_unit(ctx, client, &id, Some(instructions)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbook_config::Config;
    use kbook_llm::{CallPurpose, GenerationBackend, ScriptedBackend};

    const STRUCTURE: &str = "{}";

    fn tasks(n: usize) -> Vec<ChapterTask> {
        (0..n)
            .map(|i| {
                ChapterTask::new(
                    format!("c{i}"),
                    format!("Chapter {i}"),
                    format!("outline {i}"),
                )
            })
            .collect()
    }

    fn setup(n: usize) -> (Arc<ScriptedBackend>, GenerationClient, ChapterOrchestrator) {
        let backend = Arc::new(ScriptedBackend::new());
        let client = GenerationClient::with_backend(
            Arc::clone(&backend) as Arc<dyn GenerationBackend>,
            &Config::default(),
        );
        let mut orchestrator = ChapterOrchestrator::new(EventBus::default(), AutoModeSwitch::new());
        orchestrator.load(tasks(n));
        (backend, client, orchestrator)
    }

    fn ctx(inputs: &UserInputs) -> UnitContext<'_> {
        UnitContext {
            inputs,
            reference_text: "",
            full_structure: STRUCTURE,
        }
    }

    fn gate(auto: bool) -> QueueGate {
        QueueGate {
            in_chapter_phase: true,
            auto,
            unit_active: false,
            rewrite_open: false,
        }
    }

    #[test]
    fn decision_is_gated() {
        let store = TaskStore::from_tasks(tasks(2));
        assert_eq!(next_decision(&store, gate(true)), NextStep::Start("c0".into()));
        assert_eq!(next_decision(&store, gate(false)), NextStep::Idle);
        for blocked in [
            QueueGate { in_chapter_phase: false, ..gate(true) },
            QueueGate { unit_active: true, ..gate(true) },
            QueueGate { rewrite_open: true, ..gate(true) },
        ] {
            assert_eq!(next_decision(&store, blocked), NextStep::Idle);
        }
    }

    #[test]
    fn finished_switches_auto_off_once() {
        let (_, _, mut orch) = setup(1);
        orch.tasks.get_mut("c0").unwrap().status = TaskStatus::Done;
        orch.set_auto_mode(true);
        let mut rx = orch.events.subscribe();
        assert_eq!(orch.try_advance_queue(true), NextStep::Finished);
        assert!(!orch.auto_mode());
        assert_eq!(orch.try_advance_queue(true), NextStep::Idle);
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::AutoModeChanged { enabled: false }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn queue_resets_failed_chapter_before_retry() {
        let (_, _, mut orch) = setup(2);
        {
            let t = orch.tasks.get_mut("c0").unwrap();
            t.status = TaskStatus::Error;
            t.content = "partial".into();
            t.error_message = Some("boom".into());
        }
        orch.set_auto_mode(true);
        assert_eq!(orch.try_advance_queue(true), NextStep::Start("c0".into()));
        let t = orch.tasks().get("c0").unwrap();
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.content.is_empty());
        assert!(t.error_message.is_none());
    }

    #[tokio::test]
    async fn fresh_run_needs_auto_mode() {
        let (backend, client, mut orch) = setup(1);
        let inputs = UserInputs::new("s");
        let outcome = orch.run_unit(ctx(&inputs), &client, "c0", None).await.unwrap();
        assert!(matches!(outcome, UnitOutcome::Skipped(SkipReason::AutoModeOff)));
        assert!(backend.calls().is_empty());
        assert!(matches!(
            orch.run_unit(ctx(&inputs), &client, "nope", None).await,
            Err(KbookError::UnknownTask(_))
        ));
    }

    #[tokio::test]
    async fn completed_chapter_is_trimmed_and_feeds_continuity() {
        let (backend, client, mut orch) = setup(2);
        backend
            .push_text(CallPurpose::Chapter, ["\n## Chapter 0\n", "body zero  \n"])
            .push_text(CallPurpose::Chapter, ["## Chapter 1\nbody one"]);
        orch.set_auto_mode(true);
        let inputs = UserInputs::new("s");
        for id in ["c0", "c1"] {
            let outcome = orch.run_unit(ctx(&inputs), &client, id, None).await.unwrap();
            assert!(matches!(outcome, UnitOutcome::Completed { .. }));
        }
        assert_eq!(orch.tasks().get("c0").unwrap().content, "## Chapter 0\nbody zero");
        let calls = backend.calls_for(CallPurpose::Chapter);
        assert!(!calls[0].prompt.contains("body zero"));
        assert!(calls[1].prompt.contains("Chapter: Chapter 0\n## Chapter 0\nbody zero"));
        assert!(orch.active().is_none());
    }

    #[tokio::test]
    async fn done_chapter_redirects_to_next_pending() {
        let (backend, client, mut orch) = setup(2);
        orch.tasks.get_mut("c0").unwrap().status = TaskStatus::Done;
        backend.push_text(CallPurpose::Chapter, ["## Chapter 1\nx"]);
        orch.set_auto_mode(true);
        let inputs = UserInputs::new("s");
        let outcome = orch.run_unit(ctx(&inputs), &client, "c0", None).await.unwrap();
        assert!(matches!(outcome, UnitOutcome::Completed { ref task_id } if task_id == "c1"));

        let outcome = orch.run_unit(ctx(&inputs), &client, "c0", None).await.unwrap();
        assert!(matches!(outcome, UnitOutcome::Skipped(SkipReason::NothingToRun)));
        assert!(!orch.auto_mode());
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_content_and_stops_auto() {
        let (backend, client, mut orch) = setup(2);
        backend.push_broken_stream(
            CallPurpose::Chapter,
            ["## Chapter 0\n", "half"],
            LlmError::Transport("connection reset".into()),
        );
        orch.set_auto_mode(true);
        let inputs = UserInputs::new("s");
        let outcome = orch.run_unit(ctx(&inputs), &client, "c0", None).await.unwrap();
        match outcome {
            UnitOutcome::Failed { title, .. } => assert_eq!(title, "Chapter 0"),
            other => panic!("expected failure, got {other:?}"),
        }
        let task = orch.tasks().get("c0").unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.content, "## Chapter 0\nhalf");
        assert!(
            task.error_message
                .as_deref()
                .unwrap()
                .contains("connection reset")
        );
        assert!(!orch.auto_mode());
        assert_eq!(backend.calls_for(CallPurpose::Chapter).len(), 1);
    }

    #[tokio::test]
    async fn rewrite_flow_disables_auto_and_clears_content() {
        let (backend, client, mut orch) = setup(1);
        {
            let t = orch.tasks.get_mut("c0").unwrap();
            t.status = TaskStatus::Done;
            t.content = "old text".into();
        }
        orch.set_auto_mode(true);
        orch.open_rewrite("c0").unwrap();
        assert!(!orch.auto_mode());
        assert_eq!(orch.try_advance_queue(true), NextStep::Idle);

        let inputs = UserInputs::new("s");
        assert!(matches!(
            orch.submit_rewrite(ctx(&inputs), &client, "   ").await,
            Err(KbookError::EmptyRewriteInstructions)
        ));
        backend.push_text(CallPurpose::Chapter, ["## Chapter 0\nnew text"]);
        let outcome = orch
            .submit_rewrite(ctx(&inputs), &client, "More jokes")
            .await
            .unwrap();
        assert!(matches!(outcome, UnitOutcome::Completed { .. }));
        assert_eq!(orch.tasks().get("c0").unwrap().content, "## Chapter 0\nnew text");
        assert!(orch.rewrite_target().is_none());
        assert!(backend.calls()[0].prompt.contains("More jokes"));
    }

    #[test]
    fn only_one_rewrite_request_at_a_time() {
        let (_, _, mut orch) = setup(2);
        orch.open_rewrite("c0").unwrap();
        orch.open_rewrite("c0").unwrap();
        assert!(matches!(
            orch.open_rewrite("c1"),
            Err(KbookError::RewriteInProgress(id)) if id == "c0"
        ));
        assert!(orch.cancel_rewrite());
        assert!(!orch.cancel_rewrite());
        orch.open_rewrite("c1").unwrap();
    }

    #[test]
    fn switch_clones_share_state() {
        let switch = AutoModeSwitch::new();
        let clone = switch.clone();
        assert!(!clone.set(true));
        assert!(switch.is_on());
    }
}
