//! Errors surfaced by the research pipeline.
//!
//! Each variant names the stage that failed. Causes are carried as the
//! flattened `anyhow` chain so callers can print them without the source type.

use crate::core::stage::Stage;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("decomposition failed: {reason}")]
    Decomposition { reason: String },

    #[error("research failed for '{subtopic}': {reason}")]
    Research { subtopic: String, reason: String },

    #[error("synthesis failed: {reason}")]
    Synthesis { reason: String },
}

impl PipelineError {
    pub fn decomposition(err: impl Into<anyhow::Error>) -> Self {
        Self::Decomposition {
            reason: flatten(err.into()),
        }
    }

    pub fn research(subtopic: &str, err: impl Into<anyhow::Error>) -> Self {
        Self::Research {
            subtopic: subtopic.to_string(),
            reason: flatten(err.into()),
        }
    }

    pub fn synthesis(err: impl Into<anyhow::Error>) -> Self {
        Self::Synthesis {
            reason: flatten(err.into()),
        }
    }

    /// Stage that was active when the error occurred.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Decomposition { .. } => Stage::Decomposing,
            Self::Research { .. } => Stage::Researching,
            Self::Synthesis { .. } => Stage::Synthesizing,
        }
    }
}

fn flatten(err: anyhow::Error) -> String {
    format!("{err:#}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn messages_include_cause_chain() {
        let cause: anyhow::Result<()> = Err(anyhow!("connection reset")).context("send request");
        let err = PipelineError::research("Solar", cause.unwrap_err());
        assert_eq!(
            err.to_string(),
            "research failed for 'Solar': send request: connection reset"
        );
        assert_eq!(err.stage(), Stage::Researching);
    }

    #[test]
    fn stage_matches_variant() {
        assert_eq!(
            PipelineError::decomposition(anyhow!("x")).stage(),
            Stage::Decomposing
        );
        assert_eq!(
            PipelineError::synthesis(anyhow!("x")).stage(),
            Stage::Synthesizing
        );
    }
}
