//! Book generation engine
//!
//! Turns an approved outline into chapters generated one at a time, each with
//! the text of every earlier finished chapter as context. [`Session`] is the
//! entry point; the other modules are usable on their own for custom front ends.

pub mod decomposition;
pub mod error;
pub mod events;
pub mod export;
pub mod orchestrator;
pub mod outline;
pub mod phase;
pub mod progress;
pub mod session;
pub mod tasks;

pub use decomposition::{decompose, decompose_with_token, sanitize_title};
pub use error::KbookError;
pub use events::{EventBus, SessionEvent};
pub use export::{ExportFormat, compile_document, safe_file_name, write_document};
pub use orchestrator::{
    AutoModeSwitch, ChapterOrchestrator, NextStep, QueueGate, SkipReason, UnitContext,
    UnitOutcome, next_decision,
};
pub use outline::{OutlineDraft, acquire_outline};
pub use phase::{Banner, Phase};
pub use progress::{AutoControl, ProgressStatus, ProgressSummary};
pub use session::{Session, StepResult};
pub use tasks::{ChapterTask, TaskStatus, TaskStore};
