//! Stable exit codes for researcher CLI commands.

use crate::error::PipelineError;

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid setup: config, credentials, or I/O outside the pipeline stages.
pub const INVALID: i32 = 1;
/// The model's reply could not be turned into 2-4 subtopics.
pub const DECOMPOSITION_FAILED: i32 = 2;
/// A subtopic could not be researched or its note could not be saved.
pub const RESEARCH_FAILED: i32 = 3;
/// The report could not be synthesized or saved.
pub const SYNTHESIS_FAILED: i32 = 4;

/// Exit code for a pipeline failure.
pub fn for_error(err: &PipelineError) -> i32 {
    match err {
        PipelineError::Decomposition { .. } => DECOMPOSITION_FAILED,
        PipelineError::Research { .. } => RESEARCH_FAILED,
        PipelineError::Synthesis { .. } => SYNTHESIS_FAILED,
    }
}
