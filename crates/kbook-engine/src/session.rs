//! Workflow session
//!
//! A [`Session`] owns everything one book needs: the phase, inputs, reference
//! text, the outline under review, the chapter orchestrator, and the error
//! banner. It is the only writer of phase transitions; every operation checks
//! the phase it is legal in and fails with [`KbookError::PhaseViolation`]
//! otherwise.
//!
//! ```text
//! collecting input -> generating outline -> reviewing outline -> generating chapters -> viewing result
//!        ^                                        |  ^                    |
//!        +----------------------------------------+  +--------------------+
//! ```

use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::info;

use kbook_config::Config;
use kbook_llm::{BookStructure, GenerationClient};
use kbook_utils::{ReferenceFile, UserInputs, concat_reference_texts};

use crate::decomposition::decompose;
use crate::error::KbookError;
use crate::events::{EventBus, SessionEvent};
use crate::export::{ExportFormat, compile_document, write_document};
use crate::orchestrator::{
    AutoModeSwitch, ChapterOrchestrator, NextStep, UnitContext, UnitOutcome,
};
use crate::outline::{OutlineDraft, acquire_outline};
use crate::phase::{Banner, Phase};
use crate::progress::ProgressSummary;
use crate::tasks::TaskStore;

/// What one [`Session::step`] did
#[derive(Debug, Clone)]
pub enum StepResult {
    Ran(UnitOutcome),
    /// Every chapter is processed; automatic mode was switched off
    Finished,
    Idle,
}

pub struct Session {
    client: GenerationClient,
    phase: Phase,
    inputs: Option<UserInputs>,
    references: Vec<ReferenceFile>,
    reference_text: String,
    outline: Option<OutlineDraft>,
    full_structure: String,
    regenerating: bool,
    banner: Option<String>,
    chapters: ChapterOrchestrator,
    events: EventBus,
}

impl Session {
    #[must_use]
    pub fn new(client: GenerationClient) -> Self {
        let events = EventBus::default();
        Self {
            client,
            phase: Phase::default(),
            inputs: None,
            references: Vec::new(),
            reference_text: String::new(),
            outline: None,
            full_structure: String::new(),
            regenerating: false,
            banner: None,
            chapters: ChapterOrchestrator::new(events.clone(), AutoModeSwitch::new()),
            events,
        }
    }

    /// Session over the backend named in `config`.
    ///
    /// # Errors
    ///
    /// Unknown provider or missing credentials.
    pub fn from_config(config: &Config) -> Result<Self, KbookError> {
        Ok(Self::new(GenerationClient::from_config(config)?))
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Handle for pausing automatic mode from outside the session
    #[must_use]
    pub fn auto_switch(&self) -> AutoModeSwitch {
        self.chapters.auto_switch()
    }

    #[must_use]
    pub fn client(&self) -> &GenerationClient {
        &self.client
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn inputs(&self) -> Option<&UserInputs> {
        self.inputs.as_ref()
    }

    #[must_use]
    pub fn references(&self) -> &[ReferenceFile] {
        &self.references
    }

    #[must_use]
    pub fn structure(&self) -> Option<&BookStructure> {
        self.outline.as_ref().map(|o| &o.structure)
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.outline.as_ref().map(|o| o.title.as_str())
    }

    #[must_use]
    pub fn tasks(&self) -> &TaskStore {
        self.chapters.tasks()
    }

    #[must_use]
    pub fn is_regenerating(&self) -> bool {
        self.regenerating
    }

    #[must_use]
    pub fn auto_mode(&self) -> bool {
        self.chapters.auto_mode()
    }

    #[must_use]
    pub fn rewrite_target(&self) -> Option<&str> {
        self.chapters.rewrite_target()
    }

    /// The current error, with guidance for the current phase
    #[must_use]
    pub fn banner(&self) -> Option<Banner> {
        self.banner
            .as_ref()
            .map(|message| Banner::new(message.clone(), self.phase))
    }

    #[must_use]
    pub fn progress(&self) -> ProgressSummary {
        ProgressSummary::compute(
            self.chapters.tasks(),
            self.chapters.auto_mode(),
            self.chapters.active(),
        )
    }

    fn require(&self, operation: &'static str, phase: Phase) -> Result<(), KbookError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(KbookError::phase(operation, self.phase))
        }
    }

    fn set_phase(&mut self, to: Phase) {
        if self.phase != to {
            let from = self.phase;
            info!(%from, %to, "phase changed");
            self.phase = to;
            self.events.publish(SessionEvent::PhaseChanged { from, to });
        }
    }

    fn raise(&mut self, message: String) {
        self.events.publish(SessionEvent::ErrorRaised {
            message: message.clone(),
        });
        self.banner = Some(message);
    }

    fn clear_banner(&mut self) {
        if self.banner.take().is_some() {
            self.events.publish(SessionEvent::ErrorCleared);
        }
    }

    fn preview_tasks(&mut self) {
        match &self.outline {
            Some(outline) => self.chapters.load(decompose(&outline.structure)),
            None => self.chapters.clear(),
        }
    }

    /// Validate and store the inputs, then acquire the first outline.
    ///
    /// Inputs and references replace any earlier submission.
    ///
    /// # Errors
    ///
    /// Validation failures (banner raised, no remote call made) or the final
    /// outline error, after which the session is back in `collecting input`.
    pub async fn submit_inputs(
        &mut self,
        inputs: UserInputs,
        references: Vec<ReferenceFile>,
    ) -> Result<(), KbookError> {
        self.require("submit inputs", Phase::CollectingInput)?;
        if let Err(e) = inputs.validate() {
            self.raise(e.to_string());
            return Err(e.into());
        }
        self.reference_text = concat_reference_texts(&references);
        self.references = references;
        self.inputs = Some(inputs);
        self.acquire(false).await
    }

    /// Ask for a revised outline using `feedback`. The current outline stays
    /// in place until the new one arrives, and survives a failure.
    ///
    /// # Errors
    ///
    /// Blank feedback, or the final outline error.
    pub async fn regenerate_outline(&mut self, feedback: &str) -> Result<(), KbookError> {
        self.require("regenerate the outline", Phase::ReviewingOutline)?;
        if feedback.trim().is_empty() {
            return Err(KbookError::EmptyFeedback);
        }
        let inputs = self
            .inputs
            .as_ref()
            .ok_or_else(|| KbookError::phase("regenerate the outline", self.phase))?
            .with_regeneration_prompt(feedback);
        self.inputs = Some(inputs);
        self.acquire(true).await
    }

    async fn acquire(&mut self, regeneration: bool) -> Result<(), KbookError> {
        let Some(inputs) = self.inputs.clone() else {
            return Err(KbookError::phase("generate an outline", self.phase));
        };
        if regeneration {
            self.regenerating = true;
        } else {
            self.set_phase(Phase::GeneratingOutline);
            self.outline = None;
            self.full_structure.clear();
            self.chapters.clear();
        }
        self.clear_banner();

        // The banner tracks the latest failed attempt while retries run.
        let banner = &mut self.banner;
        let events = &self.events;
        let result = acquire_outline(
            &self.client,
            &inputs,
            &self.reference_text,
            events,
            |_, err| {
                let message = err.to_string();
                events.publish(SessionEvent::ErrorRaised {
                    message: message.clone(),
                });
                *banner = Some(message);
            },
        )
        .await;
        self.regenerating = false;
        match result {
            Ok(draft) => {
                self.full_structure = draft.structure.to_pretty_json();
                self.events.publish(SessionEvent::OutlineReady {
                    title: draft.title.clone(),
                    sections: draft.structure.len(),
                });
                self.outline = Some(draft);
                self.preview_tasks();
                self.set_phase(Phase::ReviewingOutline);
                self.clear_banner();
                Ok(())
            }
            Err(e) => {
                if self.banner.is_none() {
                    self.raise(e.to_string());
                }
                if !regeneration {
                    self.set_phase(Phase::CollectingInput);
                }
                Err(e.into())
            }
        }
    }

    /// Approve the outline; chapters are derived afresh from it
    ///
    /// # Errors
    ///
    /// Only legal while reviewing an outline.
    pub fn proceed_to_chapters(&mut self) -> Result<(), KbookError> {
        self.require("proceed to chapters", Phase::ReviewingOutline)?;
        if self.outline.is_none() {
            return Err(KbookError::phase("proceed to chapters", self.phase));
        }
        self.preview_tasks();
        self.set_phase(Phase::GeneratingChapters);
        self.clear_banner();
        Ok(())
    }

    /// Drop the outline and go back to editing inputs, which are kept
    ///
    /// # Errors
    ///
    /// Only legal while reviewing an outline.
    pub fn back_to_inputs(&mut self) -> Result<(), KbookError> {
        self.require("go back to inputs", Phase::ReviewingOutline)?;
        self.outline = None;
        self.full_structure.clear();
        self.chapters.clear();
        self.regenerating = false;
        self.clear_banner();
        self.set_phase(Phase::CollectingInput);
        Ok(())
    }

    /// Stop automatic mode and return to the outline
    ///
    /// # Errors
    ///
    /// Only legal while generating chapters.
    pub fn back_to_outline(&mut self) -> Result<(), KbookError> {
        self.require("go back to the outline", Phase::GeneratingChapters)?;
        self.chapters.halt();
        self.chapters.cancel_rewrite();
        self.preview_tasks();
        self.set_phase(Phase::ReviewingOutline);
        Ok(())
    }

    /// # Errors
    ///
    /// Only legal while generating chapters.
    pub fn view_result(&mut self) -> Result<(), KbookError> {
        self.require("view the book", Phase::GeneratingChapters)?;
        self.chapters.halt();
        self.chapters.cancel_rewrite();
        self.set_phase(Phase::ViewingResult);
        Ok(())
    }

    /// # Errors
    ///
    /// Only legal while viewing the result.
    pub fn back_to_chapters(&mut self) -> Result<(), KbookError> {
        self.require("go back to chapters", Phase::ViewingResult)?;
        self.set_phase(Phase::GeneratingChapters);
        Ok(())
    }

    /// Return to a blank session in `collecting input`
    pub fn reset(&mut self) {
        self.chapters.halt();
        self.chapters.clear();
        self.inputs = None;
        self.references.clear();
        self.reference_text.clear();
        self.outline = None;
        self.full_structure.clear();
        self.regenerating = false;
        self.clear_banner();
        self.set_phase(Phase::CollectingInput);
    }

    /// Switch automatic mode. Turning it on clears the banner.
    ///
    /// # Errors
    ///
    /// Turning it on is only legal while generating chapters.
    pub fn set_auto_mode(&mut self, on: bool) -> Result<(), KbookError> {
        if on {
            self.require("start automatic generation", Phase::GeneratingChapters)?;
            self.clear_banner();
        }
        self.chapters.set_auto_mode(on);
        Ok(())
    }

    /// Flip automatic mode when the progress summary allows it
    ///
    /// # Errors
    ///
    /// See [`Session::set_auto_mode`].
    pub fn toggle_auto_mode(&mut self) -> Result<bool, KbookError> {
        let on = self.chapters.auto_mode();
        if !on && !self.progress().can_toggle {
            return Ok(false);
        }
        self.set_auto_mode(!on)?;
        Ok(!on)
    }

    /// Advance the queue by at most one chapter
    ///
    /// # Errors
    ///
    /// Propagates engine errors; generation failures come back as
    /// [`UnitOutcome::Failed`].
    pub async fn step(&mut self) -> Result<StepResult, KbookError> {
        let in_chapter_phase = self.phase == Phase::GeneratingChapters;
        match self.chapters.try_advance_queue(in_chapter_phase) {
            NextStep::Start(id) => Ok(StepResult::Ran(self.run(&id, None).await?)),
            NextStep::Finished => Ok(StepResult::Finished),
            NextStep::Idle => Ok(StepResult::Idle),
        }
    }

    /// Run the queue until it stops: finished, failed, or paused
    ///
    /// # Errors
    ///
    /// See [`Session::step`].
    pub async fn drive(&mut self) -> Result<ProgressSummary, KbookError> {
        while let StepResult::Ran(_) = self.step().await? {}
        Ok(self.progress())
    }

    /// Run one chapter directly; a fresh run needs automatic mode on
    ///
    /// # Errors
    ///
    /// Only legal while generating chapters; unknown ids fail.
    pub async fn run_unit(&mut self, task_id: &str) -> Result<UnitOutcome, KbookError> {
        self.require("generate a chapter", Phase::GeneratingChapters)?;
        self.run(task_id, None).await
    }

    async fn run(
        &mut self,
        task_id: &str,
        rewrite: Option<&str>,
    ) -> Result<UnitOutcome, KbookError> {
        let inputs = self
            .inputs
            .as_ref()
            .ok_or_else(|| KbookError::phase("generate a chapter", self.phase))?;
        let ctx = UnitContext {
            inputs,
            reference_text: &self.reference_text,
            full_structure: &self.full_structure,
        };
        let outcome = match rewrite {
            Some(instructions) => {
                self.chapters
                    .submit_rewrite(ctx, &self.client, instructions)
                    .await?
            }
            None => self.chapters.run_unit(ctx, &self.client, task_id, None).await?,
        };
        if let UnitOutcome::Failed { title, error, .. } = &outcome {
            self.raise(format!("Error in chapter: {title}. {error}"));
        }
        Ok(outcome)
    }

    /// Open a rewrite request; automatic mode switches off
    ///
    /// # Errors
    ///
    /// Only legal while generating chapters; one request at a time.
    pub fn open_rewrite(&mut self, task_id: &str) -> Result<(), KbookError> {
        self.require("rewrite a chapter", Phase::GeneratingChapters)?;
        self.chapters.open_rewrite(task_id)
    }

    pub fn cancel_rewrite(&mut self) -> bool {
        self.chapters.cancel_rewrite()
    }

    /// Regenerate the chapter with the open request using `instructions`
    ///
    /// # Errors
    ///
    /// No open request, blank instructions, or the wrong phase.
    pub async fn submit_rewrite(&mut self, instructions: &str) -> Result<UnitOutcome, KbookError> {
        self.require("rewrite a chapter", Phase::GeneratingChapters)?;
        let id = self
            .chapters
            .rewrite_target()
            .map(str::to_string)
            .ok_or(KbookError::NoRewriteOpen)?;
        self.run(&id, Some(instructions)).await
    }

    /// The compiled Markdown document
    #[must_use]
    pub fn export(&self) -> String {
        compile_document(self.title().unwrap_or_default(), self.chapters.tasks())
    }

    /// Write the compiled document into `dir`, named after the title
    ///
    /// # Errors
    ///
    /// IO failures.
    pub fn write_export(&self, dir: &Path, format: ExportFormat) -> Result<PathBuf, KbookError> {
        let title = self.title().unwrap_or_default();
        Ok(write_document(dir, title, &self.export(), format)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbook_llm::{CallPurpose, GenerationBackend, LlmError, ScriptedBackend};
    use kbook_utils::ValidationError;
    use std::sync::Arc;

    const OUTLINE: &str = r#"{"One":"first","Two":{"a":"x"}}"#;

    fn session(backend: &Arc<ScriptedBackend>) -> Session {
        Session::new(GenerationClient::with_backend(
            Arc::clone(backend) as Arc<dyn GenerationBackend>,
            &Config::default(),
        ))
    }

    async fn reviewed(backend: &Arc<ScriptedBackend>) -> Session {
        backend
            .push_text(CallPurpose::Outline, [OUTLINE])
            .push_text(CallPurpose::Title, ["Title"]);
        let mut s = session(backend);
        s.submit_inputs(UserInputs::new("subject"), Vec::new())
            .await
            .unwrap();
        s
    }

    #[tokio::test]
    async fn invalid_inputs_raise_banner_without_calls() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut s = session(&backend);
        let err = s
            .submit_inputs(UserInputs::new("  "), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KbookError::Validation(ValidationError::EmptySubject)));
        assert_eq!(s.phase(), Phase::CollectingInput);
        let banner = s.banner().unwrap();
        assert_eq!(banner.guidance, Phase::CollectingInput.banner_guidance());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn outline_review_shows_preview_tasks() {
        let backend = Arc::new(ScriptedBackend::new());
        let s = reviewed(&backend).await;
        assert_eq!(s.phase(), Phase::ReviewingOutline);
        assert_eq!(s.title(), Some("Title"));
        assert_eq!(s.tasks().len(), 2);
        assert!(s.banner().is_none());
    }

    #[tokio::test]
    async fn operations_are_gated_by_phase() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut s = session(&backend);
        assert!(matches!(
            s.proceed_to_chapters(),
            Err(KbookError::PhaseViolation { phase: Phase::CollectingInput, .. })
        ));
        assert!(s.set_auto_mode(true).is_err());
        assert!(s.open_rewrite("x").is_err());
        assert!(s.view_result().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_regeneration_keeps_outline_and_stays_in_review() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut s = reviewed(&backend).await;
        assert!(matches!(s.regenerate_outline(" ").await, Err(KbookError::EmptyFeedback)));
        for _ in 0..3 {
            backend.push_text(CallPurpose::Outline, ["not json"]);
        }
        let err = s.regenerate_outline("More maps").await.unwrap_err();
        assert!(matches!(err, KbookError::Llm(LlmError::MalformedResponse { .. })));
        assert_eq!(s.phase(), Phase::ReviewingOutline);
        assert_eq!(s.title(), Some("Title"));
        assert!(!s.is_regenerating());
        assert!(s.banner().is_some());
        assert_eq!(
            s.inputs().unwrap().outline_regeneration_prompt.as_deref(),
            Some("More maps")
        );
        assert!(backend.calls_for(CallPurpose::Outline)[1].prompt.contains("More maps"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_outline_attempt_raises_banner_until_a_retry_succeeds() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push_failure(CallPurpose::Outline, LlmError::ProviderOutage("503".into()))
            .push_text(CallPurpose::Outline, [OUTLINE])
            .push_text(CallPurpose::Title, ["Title"]);
        let mut s = session(&backend);
        let mut rx = s.subscribe();
        s.submit_inputs(UserInputs::new("subject"), Vec::new())
            .await
            .unwrap();
        assert!(s.banner().is_none());

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let raised = events
            .iter()
            .position(|e| {
                matches!(e, SessionEvent::ErrorRaised { message } if message.contains("503"))
            })
            .unwrap();
        let cleared = events
            .iter()
            .position(|e| matches!(e, SessionEvent::ErrorCleared))
            .unwrap();
        assert!(raised < cleared);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_outline_leaves_last_attempt_in_banner() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push_failure(CallPurpose::Outline, LlmError::ProviderOutage("first".into()))
            .push_failure(CallPurpose::Outline, LlmError::ProviderOutage("second".into()))
            .push_failure(CallPurpose::Outline, LlmError::ProviderOutage("third".into()));
        let mut s = session(&backend);
        let mut rx = s.subscribe();
        assert!(s.submit_inputs(UserInputs::new("subject"), Vec::new()).await.is_err());

        assert!(s.banner().unwrap().message.contains("third"));
        let mut raised = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SessionEvent::ErrorRaised { .. }) {
                raised += 1;
            }
        }
        assert_eq!(raised, 3);
    }

    #[tokio::test]
    async fn back_to_inputs_keeps_inputs_only() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut s = reviewed(&backend).await;
        s.back_to_inputs().unwrap();
        assert_eq!(s.phase(), Phase::CollectingInput);
        assert!(s.structure().is_none());
        assert!(s.tasks().is_empty());
        assert_eq!(s.inputs().unwrap().subject, "subject");
    }

    #[tokio::test]
    async fn drive_runs_every_chapter_then_turns_auto_off() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut s = reviewed(&backend).await;
        s.proceed_to_chapters().unwrap();
        backend
            .push_text(CallPurpose::Chapter, ["## One\nfirst body"])
            .push_text(CallPurpose::Chapter, ["## Two\nsecond body"]);
        s.set_auto_mode(true).unwrap();
        let progress = s.drive().await.unwrap();
        assert_eq!(progress.completed, 2);
        assert!(progress.all_processed);
        assert!(!s.auto_mode());
        s.view_result().unwrap();
        assert_eq!(
            s.export(),
            "# Title\n\n## One\nfirst body\n\n## Two\nsecond body"
        );
    }

    #[tokio::test]
    async fn back_to_outline_stops_auto_mode() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut s = reviewed(&backend).await;
        s.proceed_to_chapters().unwrap();
        s.set_auto_mode(true).unwrap();
        s.back_to_outline().unwrap();
        assert!(!s.auto_mode());
        assert_eq!(s.phase(), Phase::ReviewingOutline);
        assert!(matches!(s.step().await.unwrap(), StepResult::Idle));
    }

    #[tokio::test]
    async fn reset_returns_to_blank_session() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut s = reviewed(&backend).await;
        s.proceed_to_chapters().unwrap();
        s.reset();
        assert_eq!(s.phase(), Phase::CollectingInput);
        assert!(s.inputs().is_none());
        assert!(s.tasks().is_empty());
        assert!(s.title().is_none());
    }
}
