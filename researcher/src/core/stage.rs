//! Linear stage sequence for one research request.
//!
//! `Decomposing -> Researching -> Synthesizing -> Done`, with `Failed` reachable
//! from any non-terminal stage. Every move returns its `Transition` so the
//! session log shows exactly where a request stopped.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decomposing,
    Researching,
    Synthesizing,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Decomposing => "decomposing",
            Stage::Researching => "researching",
            Stage::Synthesizing => "synthesizing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// The only stage that may follow `self` on success.
    fn successor(self) -> Option<Stage> {
        match self {
            Stage::Decomposing => Some(Stage::Researching),
            Stage::Researching => Some(Stage::Synthesizing),
            Stage::Synthesizing => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Stage,
    pub to: Stage,
}

/// Tracks the current stage and rejects out-of-order moves.
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: Stage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: Stage::Decomposing,
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    /// Move to the next stage in the linear sequence.
    pub fn advance(&mut self) -> Result<Transition, String> {
        let next = self
            .current
            .successor()
            .ok_or_else(|| format!("cannot advance from terminal stage {}", self.current))?;
        Ok(self.record(next))
    }

    /// Enter the error-terminal state.
    pub fn fail(&mut self) -> Result<Transition, String> {
        if self.current.is_terminal() {
            return Err(format!("cannot fail from terminal stage {}", self.current));
        }
        Ok(self.record(Stage::Failed))
    }

    fn record(&mut self, to: Stage) -> Transition {
        let transition = Transition {
            from: self.current,
            to,
        };
        self.current = to;
        transition
    }
}
