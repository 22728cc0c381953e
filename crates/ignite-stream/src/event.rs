use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a decoded workflow event.
///
/// Unrecognized kinds are kept as `Other` so they can be skipped instead of
/// failing the decode.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    NodeStarted,
    TextChunk,
    NodeFinished,
    WorkflowFinished,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::NodeStarted => "node_started",
            Self::TextChunk => "text_chunk",
            Self::NodeFinished => "node_finished",
            Self::WorkflowFinished => "workflow_finished",
            Self::Other(kind) => kind,
        }
    }
}

impl Default for EventKind {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "node_started" => Self::NodeStarted,
            "text_chunk" => Self::TextChunk,
            "node_finished" => Self::NodeFinished,
            "workflow_finished" => Self::WorkflowFinished,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<EventKind> for String {
    fn from(value: EventKind) -> Self {
        match value {
            EventKind::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded `data:` line of the workflow stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    #[serde(rename = "event", default)]
    pub kind: EventKind,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl WorkflowEvent {
    pub fn new(kind: impl Into<EventKind>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            workflow_run_id: None,
            task_id: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.workflow_run_id = Some(run_id.into());
        self
    }

    /// String field of the event's `data` object.
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(|v| v.as_str())
    }

    pub fn text(&self) -> Option<&str> {
        self.data_str("text")
    }

    pub fn node_id(&self) -> Option<&str> {
        self.data_str("node_id")
    }

    pub fn node_type(&self) -> Option<&str> {
        self.data_str("node_type")
    }

    pub fn title(&self) -> Option<&str> {
        self.data_str("title")
    }

    pub fn outputs(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.data.get("outputs").and_then(|v| v.as_object())
    }

    /// Node that produced a text fragment: the first element of
    /// `from_variable_selector`.
    pub fn source_node_id(&self) -> Option<&str> {
        self.data
            .get("from_variable_selector")
            .and_then(|v| v.as_array())
            .and_then(|selector| selector.first())
            .and_then(|v| v.as_str())
    }

    /// Run identifier used to deduplicate terminal events: `data.id`, then
    /// `workflow_run_id`, then `task_id`.
    pub fn run_id(&self) -> Option<&str> {
        self.data_str("id")
            .or(self.workflow_run_id.as_deref())
            .or(self.task_id.as_deref())
    }
}

/// Renders an output value as text. Strings are used verbatim, `null` is
/// empty and anything else is serialized as JSON.
pub(crate) fn output_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// True when `text` carries something to show: any non-whitespace, or a
/// line break.
pub(crate) fn has_visible_text(text: &str) -> bool {
    !text.trim().is_empty() || text.contains('\n')
}
