use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::{LEGACY_SLOT, StreamConfig};
use crate::emission::{COMPLETION_TAG, Emission, EmissionPayload, WORKFLOW_OUTPUTS_TAG};
use crate::errors::StreamError;
use crate::render::{MarkdownToHtml, PulldownMarkdownRenderer, escape_html};

const SESSION_SEPARATOR: &str = "\n\n---\n\n";

/// Text produced by one generation round, per slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub legacy: String,
    pub slots: BTreeMap<String, String>,
}

impl Session {
    pub fn slot(&self, name: &str) -> &str {
        if name == LEGACY_SLOT {
            return &self.legacy;
        }
        self.slots.get(name).map(String::as_str).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.legacy.is_empty() && self.slots.values().all(String::is_empty)
    }

    fn slot_mut(&mut self, name: &str) -> &mut String {
        if name == LEGACY_SLOT {
            &mut self.legacy
        } else {
            self.slots.entry(name.to_string()).or_default()
        }
    }
}

/// Folds emissions into sessions, one per generation round, and composes
/// the text shown to the user.
pub struct SessionAggregator {
    config: StreamConfig,
    renderer: Arc<dyn MarkdownToHtml>,
    history: Vec<Session>,
    current: Session,
    initial: bool,
    generating: bool,
    last_chunk: Option<String>,
    processed: HashSet<String>,
}

impl std::fmt::Debug for SessionAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAggregator")
            .field("history", &self.history.len())
            .field("current", &self.current)
            .field("generating", &self.generating)
            .finish_non_exhaustive()
    }
}

impl SessionAggregator {
    pub fn new(config: StreamConfig) -> Result<Self, StreamError> {
        config.validate()?;
        Ok(Self {
            config,
            renderer: Arc::new(PulldownMarkdownRenderer),
            history: Vec::new(),
            current: Session::default(),
            initial: true,
            generating: false,
            last_chunk: None,
            processed: HashSet::new(),
        })
    }

    /// Uses `renderer` for [`SessionAggregator::display_html`].
    pub fn with_renderer(mut self, renderer: Arc<dyn MarkdownToHtml>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Starts a new round. A current session holding any text moves to
    /// history first.
    pub fn begin_round(&mut self) {
        if self.initial {
            self.initial = false;
        } else if !self.current.is_empty() {
            self.history.push(std::mem::take(&mut self.current));
        }
        self.current = Session::default();
        self.last_chunk = None;
        self.processed.clear();
        self.generating = true;
        debug!(archived = self.history.len(), "round started");
    }

    /// Applies one emission to the current session. Returns false when the
    /// emission was skipped as a repeat.
    pub fn apply(&mut self, emission: &Emission) -> bool {
        let wire = emission.to_wire();
        if self.last_chunk.as_deref() == Some(wire.as_str()) {
            trace!("skipping repeated chunk");
            return false;
        }
        let tag = emission.tag().to_string();
        if emission.is_final && self.processed.contains(&tag) {
            trace!(tag = %tag, "skipping final emission already applied");
            return false;
        }

        match &emission.payload {
            EmissionPayload::Fragment { slot, content } => {
                let target = self.current.slot_mut(slot);
                if emission.is_final {
                    target.clone_from(content);
                } else {
                    target.push_str(content);
                }
            }
            EmissionPayload::NodeOutput { .. } => {}
            EmissionPayload::WorkflowOutputs { outputs } => {
                if emission.is_final {
                    for (slot, text) in outputs.iter().filter(|(_, text)| !text.is_empty()) {
                        self.current.slot_mut(slot).clone_from(text);
                    }
                    self.processed.insert(WORKFLOW_OUTPUTS_TAG.to_string());
                    self.processed.extend(self.config.output_slots.iter().cloned());
                }
            }
            EmissionPayload::Completion { content } => {
                if emission.is_final {
                    if self.current.is_empty() && !content.trim().is_empty() {
                        self.current.legacy.clone_from(content);
                    }
                    self.processed.insert(COMPLETION_TAG.to_string());
                }
            }
        }

        self.last_chunk = Some(wire);
        if emission.is_final {
            self.processed.insert(tag);
            self.generating = false;
        }
        true
    }

    /// Applies a raw `emit(content, is_final)` call.
    pub fn apply_wire(&mut self, content: &str, is_final: bool) -> bool {
        self.apply(&Emission::from_wire(content, is_final))
    }

    /// Marks the round finished even when no final emission arrived.
    pub fn finish_round(&mut self) {
        self.generating = false;
    }

    pub fn history(&self) -> &[Session] {
        &self.history
    }

    pub fn current(&self) -> &Session {
        &self.current
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    /// Markdown for every session, oldest first, separated by rules.
    pub fn display_markdown(&self) -> String {
        if self.initial {
            return self.config.initial_text.clone();
        }
        let mut sections: Vec<String> = self
            .history
            .iter()
            .map(|session| self.session_markdown(session))
            .collect();
        let current = self.session_markdown(&self.current);
        if !current.is_empty() {
            sections.push(current);
        } else if self.generating {
            sections.push(self.config.generating_placeholder.clone());
        }
        sections.join(SESSION_SEPARATOR)
    }

    /// One session as markdown: configured slots in order under their
    /// headings, then any other named slots, then legacy text.
    pub fn session_markdown(&self, session: &Session) -> String {
        let extra = session
            .slots
            .keys()
            .filter(|slot| !self.config.output_slots.contains(slot));
        let mut parts: Vec<String> = self
            .config
            .output_slots
            .iter()
            .chain(extra)
            .filter_map(|slot| {
                let text = session.slot(slot);
                (!text.is_empty())
                    .then(|| format!("## {}\n\n{}", self.config.display_title_for(slot), text))
            })
            .collect();
        if !session.legacy.is_empty() {
            parts.push(session.legacy.clone());
        }
        parts.join("\n\n")
    }

    pub fn display_html(&self) -> String {
        let markdown = self.display_markdown();
        self.renderer.render(&markdown).unwrap_or_else(|e| {
            debug!(error = %e, "session render failed; showing escaped text");
            format!("<pre class=\"streaming-preview\">{}</pre>", escape_html(&markdown))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> SessionAggregator {
        SessionAggregator::new(StreamConfig::default()).expect("aggregator")
    }

    fn outputs(pairs: &[(&str, &str)]) -> Emission {
        Emission::workflow_outputs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn initial_text_before_first_round() {
        let agg = aggregator();
        assert_eq!(agg.display_markdown(), StreamConfig::default().initial_text);
    }

    #[test]
    fn empty_generating_round_shows_placeholder() {
        let mut agg = aggregator();
        agg.begin_round();
        assert!(agg.is_generating());
        assert_eq!(agg.display_markdown(), "## 生成中...");
    }

    #[test]
    fn fragments_append_and_repeats_are_skipped() {
        let mut agg = aggregator();
        agg.begin_round();
        assert!(agg.apply(&Emission::fragment("advice", "Use ")));
        assert!(!agg.apply(&Emission::fragment("advice", "Use ")));
        assert!(agg.apply(&Emission::fragment("advice", "images")));
        assert!(agg.apply(&Emission::fragment("legacy", "note")));
        assert_eq!(agg.current().slot("advice"), "Use images");
        assert_eq!(agg.display_markdown(), "## アドバイス\n\nUse images\n\nnote");
    }

    #[test]
    fn workflow_outputs_overwrite_non_empty_slots_and_block_later_finals() {
        let mut agg = aggregator();
        agg.begin_round();
        agg.apply(&Emission::fragment("advice", "draft"));
        agg.apply(&Emission::fragment("words", "w"));
        assert!(agg.apply(&outputs(&[("advice", "final advice"), ("words", "")])));
        assert!(!agg.is_generating());
        assert_eq!(agg.current().slot("advice"), "final advice");
        assert_eq!(agg.current().slot("words"), "w");
        assert!(!agg.apply(&Emission::final_fragment("advice", "late")));
        assert!(!agg.apply(&outputs(&[("advice", "again")])));
    }

    #[test]
    fn completion_only_fills_an_empty_session() {
        let mut agg = aggregator();
        agg.begin_round();
        agg.apply(&Emission::fragment("legacy", "streamed"));
        agg.apply(&Emission::completion("streamed"));
        assert_eq!(agg.current().legacy, "streamed");

        agg.begin_round();
        agg.apply(&Emission::completion("only text"));
        assert_eq!(agg.current().legacy, "only text");
    }

    #[test]
    fn node_outputs_are_ignored() {
        let mut agg = aggregator();
        agg.begin_round();
        agg.apply(&Emission::node_output(crate::emission::NodeKind::Llm, None, "x"));
        assert!(agg.current().is_empty());
    }

    #[test]
    fn rounds_are_archived_and_joined() {
        let mut agg = aggregator();
        agg.begin_round();
        agg.apply(&Emission::fragment("lyric", "first"));
        agg.finish_round();
        agg.begin_round();
        agg.apply_wire(r#"{"type":"phrases","content":"second"}"#, false);
        assert_eq!(agg.history().len(), 1);
        assert_eq!(
            agg.display_markdown(),
            "## 歌詞\n\nfirst\n\n---\n\n## フレーズ\n\nsecond"
        );
        agg.begin_round();
        agg.begin_round();
        assert_eq!(agg.history().len(), 2);
    }

    #[test]
    fn raw_wire_text_lands_in_legacy_and_unknown_slots_are_named() {
        let mut agg = aggregator();
        agg.begin_round();
        agg.apply_wire("plain", false);
        agg.apply_wire(r#"{"type":"summary","content":"s"}"#, false);
        assert_eq!(agg.display_markdown(), "## summary\n\ns\n\nplain");
    }

    #[test]
    fn display_html_renders_headings() {
        let mut agg = aggregator();
        agg.begin_round();
        agg.apply(&Emission::fragment("advice", "**bold**"));
        let html = agg.display_html();
        assert!(html.contains("<h2>アドバイス</h2>"));
        assert!(html.contains("<strong>bold</strong>"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = StreamConfig::default().output_slots(Vec::<String>::new());
        assert!(SessionAggregator::new(config).is_err());
    }
}
