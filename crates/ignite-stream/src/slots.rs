use std::collections::HashMap;

use tracing::debug;

use crate::config::{LEGACY_SLOT, SlotPattern, StreamConfig};

/// Maps node titles to content slots and remembers which slot each node of
/// the current stream writes to.
#[derive(Clone, Debug)]
pub struct SlotResolver {
    patterns: Vec<(String, String)>,
    bindings: HashMap<String, String>,
}

impl SlotResolver {
    pub fn new(patterns: &[SlotPattern]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| (p.pattern.to_lowercase(), p.slot.clone()))
                .collect(),
            bindings: HashMap::new(),
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(&config.slot_titles)
    }

    /// Resolves a human-readable node title to its slot, or `legacy`.
    pub fn resolve(&self, title: &str) -> &str {
        let title = title.to_lowercase();
        self.patterns
            .iter()
            .find(|(pattern, _)| title.contains(pattern.as_str()))
            .map(|(_, slot)| slot.as_str())
            .unwrap_or(LEGACY_SLOT)
    }

    /// Records that `node_id` writes into `slot` for the rest of the stream.
    pub fn bind(&mut self, node_id: impl Into<String>, slot: impl Into<String>) {
        self.bindings.insert(node_id.into(), slot.into());
    }

    /// Resolves `title` and binds `node_id` to the result.
    pub fn bind_title(&mut self, node_id: &str, title: &str) -> String {
        let slot = self.resolve(title).to_string();
        debug!(node_id, title, slot = %slot, "bound node to slot");
        self.bind(node_id, slot.clone());
        slot
    }

    /// Slot bound to `node_id`, or `legacy` for unknown nodes.
    pub fn slot_for_node(&self, node_id: &str) -> &str {
        self.bindings
            .get(node_id)
            .map(String::as_str)
            .unwrap_or(LEGACY_SLOT)
    }

    pub fn bound_nodes(&self) -> usize {
        self.bindings.len()
    }

    /// Clears per-stream node bindings. The pattern table is kept.
    pub fn reset(&mut self) {
        self.bindings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> SlotResolver {
        SlotResolver::from_config(&StreamConfig::default())
    }

    #[test]
    fn resolves_titles_in_either_language() {
        let r = resolver();
        assert_eq!(r.resolve("LLM アドバイス生成"), "advice");
        assert_eq!(r.resolve("Generate Phrases"), "phrases");
        assert_eq!(r.resolve("ワード抽出"), "words");
    }

    #[test]
    fn longer_alias_wins_over_contained_pattern() {
        assert_eq!(resolver().resolve("最終フレーズ"), "final_phrase");
    }

    #[test]
    fn unknown_titles_fall_back_to_legacy() {
        assert_eq!(resolver().resolve("Start"), LEGACY_SLOT);
    }

    #[test]
    fn bindings_are_per_stream() {
        let mut r = resolver();
        assert_eq!(r.bind_title("node-1", "Advice"), "advice");
        assert_eq!(r.slot_for_node("node-1"), "advice");
        assert_eq!(r.slot_for_node("node-2"), LEGACY_SLOT);
        r.reset();
        assert_eq!(r.slot_for_node("node-1"), LEGACY_SLOT);
        assert_eq!(r.bound_nodes(), 0);
        assert_eq!(r.resolve("advice"), "advice");
    }
}
