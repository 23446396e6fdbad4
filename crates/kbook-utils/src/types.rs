//! Shared input types
//!
//! `UserInputs` is the immutable-per-submission record the whole workflow is
//! parameterized by. It lives here so both the generation adapter and the engine
//! can depend on it without depending on each other.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::ValidationError;

/// Smallest chapter count accepted on submission
pub const MIN_CHAPTERS: u32 = 6;
/// Largest chapter count accepted on submission
pub const MAX_CHAPTERS: u32 = 20;
pub const DEFAULT_CHAPTERS: u32 = MIN_CHAPTERS;

/// Target chapter length bounds, in words
pub const MIN_CONTENT_LENGTH: u32 = 200;
pub const MAX_CONTENT_LENGTH: u32 = 20_000;
pub const CONTENT_LENGTH_STEP: u32 = 100;
pub const DEFAULT_CONTENT_LENGTH: u32 = 7_000;

/// Reading complexity bounds (1 = simplest, 10 = most advanced)
pub const MIN_READING_LEVEL: u32 = 1;
pub const MAX_READING_LEVEL: u32 = 10;
pub const DEFAULT_READING_LEVEL: u32 = 5;

pub const DEFAULT_LANGUAGE: &str = "en";

/// Generation quality mode; each maps to a different backing model
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum GenerationMode {
    #[default]
    #[serde(alias = "normal")]
    #[strum(to_string = "fast", serialize = "normal")]
    Fast,
    #[serde(alias = "advanced")]
    #[strum(to_string = "high-quality", serialize = "advanced")]
    HighQuality,
}

/// Everything the user supplies for one book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInputs {
    pub subject: String,
    /// Language code passed verbatim to the prompts
    pub language: String,
    /// Free-text instructions applied to every call
    #[serde(default)]
    pub additional_info: String,
    #[serde(default)]
    pub generation_mode: GenerationMode,
    /// Target chapter length in words
    pub content_length: u32,
    /// Target reading complexity, 1..=10
    pub reading_level: u32,
    /// Requested number of top-level outline sections
    pub number_of_chapters: u32,
    /// Feedback attached only for outline regeneration calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_regeneration_prompt: Option<String>,
}

impl UserInputs {
    /// Create inputs for a subject with every other field at its default
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            additional_info: String::new(),
            generation_mode: GenerationMode::default(),
            content_length: DEFAULT_CONTENT_LENGTH,
            reading_level: DEFAULT_READING_LEVEL,
            number_of_chapters: DEFAULT_CHAPTERS,
            outline_regeneration_prompt: None,
        }
    }

    /// Copy of these inputs carrying regeneration feedback
    #[must_use]
    pub fn with_regeneration_prompt(&self, feedback: impl Into<String>) -> Self {
        Self {
            outline_regeneration_prompt: Some(feedback.into()),
            ..self.clone()
        }
    }

    /// Check the submission constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.subject.trim().is_empty() {
            return Err(ValidationError::EmptySubject);
        }
        check_range(
            "chapters",
            self.number_of_chapters,
            MIN_CHAPTERS,
            MAX_CHAPTERS,
        )?;
        check_range(
            "content length",
            self.content_length,
            MIN_CONTENT_LENGTH,
            MAX_CONTENT_LENGTH,
        )?;
        if self.content_length % CONTENT_LENGTH_STEP != 0 {
            return Err(ValidationError::Misaligned {
                field: "content length",
                step: CONTENT_LENGTH_STEP,
                value: self.content_length,
            });
        }
        check_range(
            "reading level",
            self.reading_level,
            MIN_READING_LEVEL,
            MAX_READING_LEVEL,
        )
    }
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            value,
        })
    }
}

/// A user-supplied reference document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceFile {
    pub name: String,
    pub content: String,
}

impl ReferenceFile {
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Concatenate reference files into the single block the prompts expect.
///
/// Empty when no files are supplied.
#[must_use]
pub fn concat_reference_texts(files: &[ReferenceFile]) -> String {
    files
        .iter()
        .map(|f| format!("Reference File: {}\nContent:\n{}", f.name, f.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// A selectable output language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageOption {
    pub code: &'static str,
    pub name: &'static str,
}

pub const AVAILABLE_LANGUAGES: &[LanguageOption] = &[
    LanguageOption { code: "en", name: "English" },
    LanguageOption { code: "es", name: "Español" },
    LanguageOption { code: "fr", name: "Français" },
    LanguageOption { code: "de", name: "Deutsch" },
    LanguageOption { code: "ja", name: "日本語" },
    LanguageOption { code: "zh", name: "中文" },
];

/// Display name for a language code; unknown codes are passed through unchanged
#[must_use]
pub fn language_name(code: &str) -> &str {
    AVAILABLE_LANGUAGES
        .iter()
        .find(|l| l.code.eq_ignore_ascii_case(code))
        .map_or(code, |l| l.name)
}

const READING_LEVEL_LABELS: &[(u32, &str)] = &[
    (1, "Early reader"),
    (3, "Middle school"),
    (5, "General audience"),
    (7, "Undergraduate"),
    (9, "Specialist"),
    (10, "Expert"),
];

/// Descriptive label for a reading level.
///
/// Exact presets get their label; other levels borrow the nearest preset's
/// label (ties go to the lower preset) with the level appended.
#[must_use]
pub fn reading_level_label(level: u32) -> String {
    if let Some((_, label)) = READING_LEVEL_LABELS.iter().find(|(v, _)| *v == level) {
        return (*label).to_string();
    }
    let (_, nearest) = READING_LEVEL_LABELS
        .iter()
        .min_by_key(|(v, _)| (v.abs_diff(level), *v))
        .copied()
        .unwrap_or((DEFAULT_READING_LEVEL, "General audience"));
    format!("~{nearest} (Level {level}/10)")
}
