use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::stats::ToolStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Executing,
    Succeeded,
    Failed,
}

/// One tracked tool call within an exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: InvocationId,
    pub tool: String,
    pub args: Value,
    pub status: InvocationStatus,
    pub result: Option<String>,
}

impl ToolInvocation {
    pub fn is_open(&self) -> bool {
        self.status == InvocationStatus::Executing
    }
}

/// Matches `tool_result` events to the `tool_start` they complete.
///
/// The wire carries no invocation id, so a result binds to the most recently
/// opened invocation of the same tool name that is still executing.
#[derive(Debug)]
pub struct ToolCorrelator {
    invocations: Vec<ToolInvocation>,
    stats: Arc<ToolStats>,
}

impl ToolCorrelator {
    pub fn new(stats: Arc<ToolStats>) -> Self {
        Self {
            invocations: Vec::new(),
            stats,
        }
    }

    /// Register a new executing invocation.
    pub fn open(&mut self, tool: impl Into<String>, args: Value) -> &ToolInvocation {
        let id = InvocationId(self.invocations.len());
        let tool = tool.into();
        debug!(tool = %tool, id = id.0, "tool invocation opened");
        self.stats.record_open();
        self.invocations.push(ToolInvocation {
            id,
            tool,
            args,
            status: InvocationStatus::Executing,
            result: None,
        });
        &self.invocations[id.0]
    }

    /// Close the latest open invocation of `tool`. Returns `None`, leaving
    /// every invocation untouched, when nothing of that name is open.
    pub fn close(
        &mut self,
        tool: &str,
        success: bool,
        result: impl Into<String>,
    ) -> Option<&ToolInvocation> {
        let Some(pos) = self
            .invocations
            .iter()
            .rposition(|inv| inv.tool == tool && inv.is_open())
        else {
            warn!(tool, "tool result with no open invocation, ignoring");
            return None;
        };

        self.stats.record_close(success);
        let inv = &mut self.invocations[pos];
        inv.status = if success {
            InvocationStatus::Succeeded
        } else {
            InvocationStatus::Failed
        };
        inv.result = Some(result.into());
        debug!(tool, id = inv.id.0, success, "tool invocation closed");
        Some(inv)
    }

    pub fn get(&self, id: InvocationId) -> Option<&ToolInvocation> {
        self.invocations.get(id.0)
    }

    pub fn invocations(&self) -> &[ToolInvocation] {
        &self.invocations
    }

    pub fn has_open(&self) -> bool {
        self.invocations.iter().any(ToolInvocation::is_open)
    }

    pub fn into_invocations(self) -> Vec<ToolInvocation> {
        self.invocations
    }
}
