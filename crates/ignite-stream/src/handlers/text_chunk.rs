use tracing::debug;

use super::{HandlerContext, PipelineState};
use crate::config::LEGACY_SLOT;
use crate::emission::Emission;
use crate::event::{EventKind, WorkflowEvent, has_visible_text};

/// Streams `text_chunk` fragments into the slot bound to their source node.
#[derive(Clone, Debug, Default)]
pub struct TextFragmentHandler {
    previous_fragment: String,
}

impl TextFragmentHandler {
    pub fn can_handle(&self, event: &WorkflowEvent) -> bool {
        event.kind == EventKind::TextChunk && event.text().is_some_and(|t| !t.is_empty())
    }

    pub fn handle(
        &mut self,
        event: &WorkflowEvent,
        state: &mut PipelineState,
        ctx: &mut HandlerContext<'_>,
    ) -> Option<Emission> {
        let raw = event.text()?;
        let mut text = raw.to_string();
        if ends_with_heading_marker(&self.previous_fragment)
            && !text.starts_with(char::is_whitespace)
        {
            text.insert(0, ' ');
        }

        if ctx.filter.is_stop_sentinel(&text) {
            debug!("dropping stop fragment");
            return None;
        }
        if !has_visible_text(&text) {
            return None;
        }

        let slot = event
            .source_node_id()
            .map(|node_id| ctx.slots.slot_for_node(node_id))
            .unwrap_or(LEGACY_SLOT)
            .to_string();
        state.accumulated_text.push_str(&text);
        self.previous_fragment.clone_from(&text);
        Some(Emission::fragment(slot, text))
    }

    pub fn reset_session(&mut self) {
        self.previous_fragment.clear();
    }
}

/// True when `text`, trimmed, ends with a `#` marker.
fn ends_with_heading_marker(text: &str) -> bool {
    text.trim().ends_with('#')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::filter::ContentFilter;
    use crate::slots::SlotResolver;

    struct Fixture {
        filter: ContentFilter,
        slots: SlotResolver,
        state: PipelineState,
        handler: TextFragmentHandler,
    }

    impl Fixture {
        fn new() -> Self {
            let config = StreamConfig::default();
            Self {
                filter: ContentFilter::from_config(&config),
                slots: SlotResolver::from_config(&config),
                state: PipelineState::default(),
                handler: TextFragmentHandler::default(),
            }
        }

        fn chunk(&mut self, text: &str, node: &str) -> Option<Emission> {
            let event = WorkflowEvent::new(
                EventKind::TextChunk,
                serde_json::json!({"text": text, "from_variable_selector": [node, "text"]}),
            );
            let mut ctx = HandlerContext {
                filter: &self.filter,
                slots: &mut self.slots,
            };
            self.handler.handle(&event, &mut self.state, &mut ctx)
        }
    }

    #[test]
    fn heading_marker_gets_a_space_before_the_next_fragment() {
        let mut f = Fixture::new();
        f.chunk("## ", "n");
        assert_eq!(f.chunk("Title", "n"), Some(Emission::fragment("legacy", " Title")));
    }

    #[test]
    fn plain_fragments_are_left_alone() {
        let mut f = Fixture::new();
        f.chunk("Text", "n");
        assert_eq!(f.chunk("More", "n"), Some(Emission::fragment("legacy", "More")));
        f.chunk("# ok\n", "n");
        assert_eq!(f.chunk("next", "n"), Some(Emission::fragment("legacy", "next")));
    }

    #[test]
    fn attached_heading_marker_also_gets_a_space() {
        let mut f = Fixture::new();
        f.chunk("見出し\n本文##", "n");
        assert_eq!(f.chunk("まとめ", "n"), Some(Emission::fragment("legacy", " まとめ")));
    }

    #[test]
    fn stop_fragment_is_dropped() {
        let mut f = Fixture::new();
        assert_eq!(f.chunk(" Stop ", "n"), None);
        assert!(f.state.accumulated_text.is_empty());
    }

    #[test]
    fn newline_only_fragment_is_emitted() {
        let mut f = Fixture::new();
        assert_eq!(f.chunk("\n", "n"), Some(Emission::fragment("legacy", "\n")));
        assert_eq!(f.chunk("   ", "n"), None);
    }

    #[test]
    fn fragment_uses_slot_bound_to_source_node() {
        let mut f = Fixture::new();
        f.slots.bind("advice-node", "advice");
        assert_eq!(
            f.chunk("tip", "advice-node"),
            Some(Emission::fragment("advice", "tip"))
        );
        assert_eq!(f.state.accumulated_text, "tip");
    }

    #[test]
    fn empty_text_is_not_claimed() {
        let handler = TextFragmentHandler::default();
        let event = WorkflowEvent::new(EventKind::TextChunk, serde_json::json!({"text": ""}));
        assert!(!handler.can_handle(&event));
    }

    #[test]
    fn heading_marker_detection() {
        assert!(ends_with_heading_marker("## "));
        assert!(ends_with_heading_marker("intro\n###"));
        assert!(ends_with_heading_marker("text##"));
        assert!(ends_with_heading_marker("#######"));
        assert!(!ends_with_heading_marker("# Title"));
        assert!(!ends_with_heading_marker(""));
    }
}
