/// The assistant message being streamed in the active exchange.
///
/// Purely additive: fragments are appended in arrival order and earlier
/// content is never rewritten.
#[derive(Debug, Clone, Default)]
pub struct MessageAccumulator {
    content: String,
    fragments: usize,
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the full accumulated text.
    pub fn append(&mut self, fragment: &str) -> &str {
        self.content.push_str(fragment);
        self.fragments += 1;
        &self.content
    }

    pub fn current(&self) -> &str {
        &self.content
    }

    /// Number of fragments applied, including empty ones.
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    /// True once any fragment arrived, even an empty one.
    pub fn has_fragments(&self) -> bool {
        self.fragments > 0
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_full_text() {
        let mut acc = MessageAccumulator::new();
        assert_eq!(acc.append("Hi"), "Hi");
        assert_eq!(acc.append(" there"), "Hi there");
        assert_eq!(acc.current(), "Hi there");
        assert_eq!(acc.fragment_count(), 2);
    }

    #[test]
    fn repeated_fragments_are_not_deduplicated() {
        let mut acc = MessageAccumulator::new();
        for fragment in ["a", "b", "a", "a", "", "c"] {
            acc.append(fragment);
        }
        assert_eq!(acc.current(), "abaac");
        assert_eq!(acc.fragment_count(), 6);
    }

    #[test]
    fn empty_fragment_still_counts_as_received() {
        let mut acc = MessageAccumulator::new();
        assert!(!acc.has_fragments());
        acc.append("");
        assert!(acc.has_fragments());
        assert_eq!(acc.current(), "");
    }
}
