use std::borrow::Cow;
use std::collections::BTreeMap;

use serde_json::json;

use crate::config::LEGACY_SLOT;
use crate::event::output_text;

pub const NODE_LLM_TAG: &str = "node_llm";
pub const NODE_OTHER_TAG: &str = "node_other";
pub const WORKFLOW_OUTPUTS_TAG: &str = "workflow_outputs";
pub const COMPLETION_TAG: &str = "completion";

/// Whether a finished node was a language-model node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Llm,
    Other,
}

impl NodeKind {
    pub fn from_node_type(node_type: Option<&str>) -> Self {
        match node_type {
            Some("llm") => Self::Llm,
            _ => Self::Other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmissionPayload {
    /// Incremental text for one slot.
    Fragment { slot: String, content: String },
    /// Result of a single finished node. Intermediate, never ends a round.
    NodeOutput {
        kind: NodeKind,
        node_id: Option<String>,
        content: String,
    },
    /// Authoritative per-slot text of a finished workflow.
    WorkflowOutputs { outputs: BTreeMap<String, String> },
    /// Text accumulated by a stream that ended without a terminal event.
    Completion { content: String },
}

/// One unit delivered to the sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Emission {
    pub payload: EmissionPayload,
    pub is_final: bool,
}

impl Emission {
    pub fn fragment(slot: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            payload: EmissionPayload::Fragment {
                slot: slot.into(),
                content: content.into(),
            },
            is_final: false,
        }
    }

    pub fn final_fragment(slot: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            is_final: true,
            ..Self::fragment(slot, content)
        }
    }

    pub fn node_output(kind: NodeKind, node_id: Option<String>, content: impl Into<String>) -> Self {
        Self {
            payload: EmissionPayload::NodeOutput {
                kind,
                node_id,
                content: content.into(),
            },
            is_final: false,
        }
    }

    pub fn workflow_outputs(outputs: BTreeMap<String, String>) -> Self {
        Self {
            payload: EmissionPayload::WorkflowOutputs { outputs },
            is_final: true,
        }
    }

    pub fn completion(content: impl Into<String>) -> Self {
        Self {
            payload: EmissionPayload::Completion {
                content: content.into(),
            },
            is_final: true,
        }
    }

    /// Value of the wire `type` field.
    pub fn tag(&self) -> &str {
        match &self.payload {
            EmissionPayload::Fragment { slot, .. } => slot,
            EmissionPayload::NodeOutput {
                kind: NodeKind::Llm,
                ..
            } => NODE_LLM_TAG,
            EmissionPayload::NodeOutput { .. } => NODE_OTHER_TAG,
            EmissionPayload::WorkflowOutputs { .. } => WORKFLOW_OUTPUTS_TAG,
            EmissionPayload::Completion { .. } => COMPLETION_TAG,
        }
    }

    /// Plain text carried by the emission. Workflow outputs are joined in
    /// key order, one blank line apart.
    pub fn content_text(&self) -> Cow<'_, str> {
        match &self.payload {
            EmissionPayload::Fragment { content, .. }
            | EmissionPayload::NodeOutput { content, .. }
            | EmissionPayload::Completion { content } => Cow::Borrowed(content),
            EmissionPayload::WorkflowOutputs { outputs } => Cow::Owned(
                outputs
                    .values()
                    .filter(|v| !v.is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ),
        }
    }

    /// Serializes to the sink's wire form: `{"type": <tag>, "content": ...}`.
    pub fn to_wire(&self) -> String {
        let content = match &self.payload {
            EmissionPayload::WorkflowOutputs { outputs } => json!(outputs),
            _ => json!(self.content_text()),
        };
        json!({ "type": self.tag(), "content": content }).to_string()
    }

    /// Parses a wire emission. Content that is not a tagged JSON object is
    /// treated as a raw `legacy` fragment.
    pub fn from_wire(content: &str, is_final: bool) -> Self {
        let parsed = serde_json::from_str::<serde_json::Value>(content).ok();
        let tagged = parsed.as_ref().and_then(|value| {
            let tag = value.get("type")?.as_str()?;
            Some((tag, value.get("content").cloned().unwrap_or_default()))
        });
        let Some((tag, body)) = tagged else {
            return Self {
                payload: EmissionPayload::Fragment {
                    slot: LEGACY_SLOT.to_string(),
                    content: content.to_string(),
                },
                is_final,
            };
        };

        let payload = match tag {
            WORKFLOW_OUTPUTS_TAG => EmissionPayload::WorkflowOutputs {
                outputs: body
                    .as_object()
                    .map(|map| {
                        map.iter()
                            .map(|(k, v)| (k.clone(), output_text(v)))
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            COMPLETION_TAG => EmissionPayload::Completion {
                content: output_text(&body),
            },
            NODE_LLM_TAG | NODE_OTHER_TAG => EmissionPayload::NodeOutput {
                kind: if tag == NODE_LLM_TAG {
                    NodeKind::Llm
                } else {
                    NodeKind::Other
                },
                node_id: None,
                content: output_text(&body),
            },
            slot => EmissionPayload::Fragment {
                slot: slot.to_string(),
                content: output_text(&body),
            },
        };
        Self { payload, is_final }
    }
}

/// Push-based consumer of emissions.
pub trait EmissionSink {
    fn emit(&mut self, emission: &Emission);
}

impl<F> EmissionSink for F
where
    F: FnMut(&Emission),
{
    fn emit(&mut self, emission: &Emission) {
        self(emission)
    }
}

/// Adapts an `emit(content, is_final)` callback to [`EmissionSink`].
pub struct WireSink<F>(F);

pub fn wire_sink<F>(callback: F) -> WireSink<F>
where
    F: FnMut(String, bool),
{
    WireSink(callback)
}

impl<F> EmissionSink for WireSink<F>
where
    F: FnMut(String, bool),
{
    fn emit(&mut self, emission: &Emission) {
        (self.0)(emission.to_wire(), emission.is_final)
    }
}
