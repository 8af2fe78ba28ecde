use trafficlight_protocol::analytics::RouterMeta;

use crate::rule::OutputDescriptor;
use crate::tools::ToolOutcome;

/// Result of a single tool inside a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReport {
    pub tool: String,
    pub outcome: ToolOutcome,
}

impl ToolReport {
    pub fn new(tool: impl Into<String>, outcome: ToolOutcome) -> Self {
        Self {
            tool: tool.into(),
            outcome,
        }
    }
}

/// Decision produced once per request for a valid definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub router: String,
    /// `true` selects the `then` branch.
    pub outcome: bool,
    pub render_target: OutputDescriptor,
    pub meta: Option<RouterMeta>,
    /// Per-tool results in declared order. Empty for literal conditions.
    pub tool_results: Vec<ToolReport>,
}

impl Decision {
    pub fn undecided_tools(&self) -> impl Iterator<Item = &ToolReport> {
        self.tool_results
            .iter()
            .filter(|report| report.outcome == ToolOutcome::Undecided)
    }
}

/// True iff no result is a failure or undecided. Zero results pass.
pub fn aggregate(results: &[ToolOutcome]) -> bool {
    results.iter().all(|outcome| outcome.is_pass())
}
