use crate::emission::{Emission, NodeKind};
use crate::event::{EventKind, WorkflowEvent, output_text};
use crate::filter::ContentFilter;

/// Forwards the result of a single finished node as an intermediate output.
#[derive(Clone, Debug)]
pub struct NodeCompletionHandler {
    result_keys: Vec<String>,
}

impl NodeCompletionHandler {
    /// `result_keys` are tried in order; the first non-empty one is the
    /// node's result.
    pub fn new(result_keys: Vec<String>) -> Self {
        Self { result_keys }
    }

    pub fn from_filter(filter: &ContentFilter) -> Self {
        Self::new(filter.result_keys().to_vec())
    }

    pub fn can_handle(&self, event: &WorkflowEvent) -> bool {
        event.kind == EventKind::NodeFinished && self.extract_result(event).is_some()
    }

    pub fn handle(&self, event: &WorkflowEvent) -> Option<Emission> {
        let result = self.extract_result(event)?;
        Some(Emission::node_output(
            NodeKind::from_node_type(event.node_type()),
            event.node_id().map(str::to_string),
            result,
        ))
    }

    fn extract_result(&self, event: &WorkflowEvent) -> Option<String> {
        let outputs = event.outputs()?;
        self.result_keys
            .iter()
            .filter_map(|key| outputs.get(key))
            .map(output_text)
            .find(|text| !text.trim().is_empty())
    }
}
