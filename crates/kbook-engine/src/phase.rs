//! Workflow phases and the error banner

use serde::Serialize;
use strum::{AsRefStr, Display};

/// The workflow stage; exactly one is active and it gates which operations are legal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    #[strum(to_string = "collecting input")]
    CollectingInput,
    #[strum(to_string = "generating outline")]
    GeneratingOutline,
    #[strum(to_string = "reviewing outline")]
    ReviewingOutline,
    #[strum(to_string = "generating chapters")]
    GeneratingChapters,
    #[strum(to_string = "viewing result")]
    ViewingResult,
}

impl Phase {
    /// Guidance shown under the banner message
    #[must_use]
    pub fn banner_guidance(self) -> &'static str {
        match self {
            Self::GeneratingOutline | Self::ReviewingOutline => {
                "The outline could not be produced even after retrying. Adjust the inputs or try again."
            }
            Self::GeneratingChapters => {
                "A chapter failed even after retrying and automatic generation may have stopped. Review the finished chapters or rewrite the failed one."
            }
            Self::CollectingInput | Self::ViewingResult => {
                "Check the inputs and try again. If the problem persists, check the API key and network connection."
            }
        }
    }
}

/// The single top-level error message of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Banner {
    pub message: String,
    pub guidance: &'static str,
}

impl Banner {
    #[must_use]
    pub fn new(message: impl Into<String>, phase: Phase) -> Self {
        Self {
            message: message.into(),
            guidance: phase.banner_guidance(),
        }
    }
}
