pub mod catalog;
pub mod correlator;
pub mod stats;

pub use catalog::{HttpToolCatalog, ToolCatalog, ToolDescriptor};
pub use correlator::{InvocationId, InvocationStatus, ToolCorrelator, ToolInvocation};
pub use stats::{ToolStats, ToolStatsSnapshot};

/// Character budget renderers use when showing a tool result.
pub const DISPLAY_RESULT_CHARS: usize = 500;

/// Cap `text` at `max_chars` characters for display, marking the cut with `...`.
///
/// Rendering only. The correlator always keeps the full result.
pub fn truncate_for_display(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
