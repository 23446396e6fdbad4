//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use kbook_config::{CliArgs, Config};
use kbook_engine::ExportFormat;
use kbook_utils::{GenerationMode, UserInputs};

/// kbook - book generation on top of a streaming text-generation service
#[derive(Parser, Debug)]
#[command(name = "kbook")]
#[command(about = "Generate a book outline, then its chapters, with a text-generation service")]
#[command(long_about = r#"
kbook asks a text-generation service for a book outline and title, optionally
revises the outline with your feedback, then writes every chapter in order.
Each chapter is written with the text of all earlier chapters as context.

EXAMPLES:
  # Outline only, printed as JSON
  kbook outline --subject "Tide pools of the Pacific coast"

  # Full book, revised once, written to ./out/<title>.md
  kbook generate --subject "Tide pools" --revise "Add a chapter on crabs" --out out

  # Show the effective configuration and where each value came from
  kbook config

CONFIGURATION:
  Precedence: CLI flags > environment (KBOOK_*) > config file > defaults.
  The config file is .kbook/config.toml, searched upward from the working
  directory, then $KBOOK_HOME/config.toml, then the user config directory.
  The API key is read from the variable named by [llm] api_key_env
  (GEMINI_API_KEY by default).
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Generation provider
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Override the provider's API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Model used in fast mode
    #[arg(long, global = true)]
    pub model_fast: Option<String>,

    /// Model used in high-quality mode
    #[arg(long, global = true)]
    pub model_high_quality: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Total attempts per retried call
    #[arg(long, global = true)]
    pub retry_attempts: Option<u32>,

    /// Delay between attempts in milliseconds
    #[arg(long, global = true)]
    pub retry_delay_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    #[must_use]
    pub fn config_overrides(&self) -> CliArgs {
        CliArgs {
            config_path: self.config.clone(),
            provider: self.provider.clone(),
            base_url: self.base_url.clone(),
            model_fast: self.model_fast.clone(),
            model_high_quality: self.model_high_quality.clone(),
            timeout_secs: self.timeout_secs,
            retry_attempts: self.retry_attempts,
            retry_delay_ms: self.retry_delay_ms,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a complete book and export it
    Generate {
        #[command(flatten)]
        inputs: InputArgs,

        /// Directory to write the book into; prints to stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,

        /// Export format: md or txt
        #[arg(long, default_value = "md")]
        format: ExportFormat,
    },

    /// Generate and print the outline and title as JSON
    Outline {
        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Show the effective configuration with value sources
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the languages with display names
    Languages,
}

/// Book inputs; unset flags fall back to `[defaults]`
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// What the book is about
    #[arg(long)]
    pub subject: String,

    /// Language code, e.g. en, es, fr
    #[arg(long)]
    pub language: Option<String>,

    /// fast or high-quality
    #[arg(long)]
    pub mode: Option<GenerationMode>,

    /// Target words per chapter (200-20000, multiple of 100)
    #[arg(long)]
    pub chapter_length: Option<u32>,

    /// Reading complexity, 1-10
    #[arg(long)]
    pub reading_level: Option<u32>,

    /// Number of chapters (6-20)
    #[arg(long)]
    pub chapters: Option<u32>,

    /// Extra instructions applied to every call
    #[arg(long)]
    pub instructions: Option<String>,

    /// Reference file to include as context; repeatable
    #[arg(long = "reference", value_name = "PATH")]
    pub references: Vec<PathBuf>,

    /// Feedback for one outline revision round; repeatable
    #[arg(long = "revise", value_name = "FEEDBACK")]
    pub revisions: Vec<String>,
}

impl InputArgs {
    /// Inputs seeded from `config` defaults with these flags applied
    #[must_use]
    pub fn to_inputs(&self, config: &Config) -> UserInputs {
        let mut inputs = config.inputs_for(self.subject.clone());
        if let Some(language) = &self.language {
            inputs.language.clone_from(language);
        }
        if let Some(mode) = self.mode {
            inputs.generation_mode = mode;
        }
        if let Some(length) = self.chapter_length {
            inputs.content_length = length;
        }
        if let Some(level) = self.reading_level {
            inputs.reading_level = level;
        }
        if let Some(chapters) = self.chapters {
            inputs.number_of_chapters = chapters;
        }
        if let Some(instructions) = &self.instructions {
            inputs.additional_info.clone_from(instructions);
        }
        inputs
    }
}
