//! Event handlers and the registry that dispatches decoded events to them.
//!
//! Each handler claims one event kind, reads and updates the running
//! [`PipelineState`] and returns at most one [`Emission`]. The registry owns
//! suppression of duplicate emissions.

mod node_finished;
mod node_started;
mod registry;
mod text_chunk;
mod workflow_finished;

pub use node_finished::NodeCompletionHandler;
pub use node_started::NodeStartHandler;
pub use registry::{Delivery, Dispatch, HandlerRegistry};
pub(crate) use registry::deliver;
pub use text_chunk::TextFragmentHandler;
pub use workflow_finished::WorkflowCompletionHandler;

use crate::emission::Emission;
use crate::event::WorkflowEvent;
use crate::filter::ContentFilter;
use crate::slots::SlotResolver;

/// Running state threaded through every handler call of one stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineState {
    /// Fragment text received since the last final emission.
    pub accumulated_text: String,
    /// Wire form of the last delivered emission.
    pub last_emitted_content: Option<String>,
}

impl PipelineState {
    pub fn reset(&mut self) {
        self.accumulated_text.clear();
        self.last_emitted_content = None;
    }
}

/// Shared collaborators handed to a handler for one event.
pub struct HandlerContext<'a> {
    pub filter: &'a ContentFilter,
    pub slots: &'a mut SlotResolver,
}

/// Closed set of handlers the registry can hold, tried in registration
/// order.
#[derive(Clone, Debug)]
pub enum EventHandler {
    NodeStarted(NodeStartHandler),
    TextChunk(TextFragmentHandler),
    NodeFinished(NodeCompletionHandler),
    WorkflowFinished(WorkflowCompletionHandler),
}

impl EventHandler {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NodeStarted(_) => "node_started",
            Self::TextChunk(_) => "text_chunk",
            Self::NodeFinished(_) => "node_finished",
            Self::WorkflowFinished(_) => "workflow_finished",
        }
    }

    pub fn can_handle(&self, event: &WorkflowEvent) -> bool {
        match self {
            Self::NodeStarted(h) => h.can_handle(event),
            Self::TextChunk(h) => h.can_handle(event),
            Self::NodeFinished(h) => h.can_handle(event),
            Self::WorkflowFinished(h) => h.can_handle(event),
        }
    }

    pub fn handle(
        &mut self,
        event: &WorkflowEvent,
        state: &mut PipelineState,
        ctx: &mut HandlerContext<'_>,
    ) -> Option<Emission> {
        match self {
            Self::NodeStarted(h) => h.handle(event, ctx),
            Self::TextChunk(h) => h.handle(event, state, ctx),
            Self::NodeFinished(h) => h.handle(event),
            Self::WorkflowFinished(h) => h.handle(event, ctx),
        }
    }

    /// Clears per-stream memory kept by the handler.
    pub fn reset_session(&mut self) {
        match self {
            Self::NodeStarted(_) | Self::NodeFinished(_) => {}
            Self::TextChunk(h) => h.reset_session(),
            Self::WorkflowFinished(h) => h.reset_session(),
        }
    }
}

impl From<NodeStartHandler> for EventHandler {
    fn from(value: NodeStartHandler) -> Self {
        Self::NodeStarted(value)
    }
}

impl From<TextFragmentHandler> for EventHandler {
    fn from(value: TextFragmentHandler) -> Self {
        Self::TextChunk(value)
    }
}

impl From<NodeCompletionHandler> for EventHandler {
    fn from(value: NodeCompletionHandler) -> Self {
        Self::NodeFinished(value)
    }
}

impl From<WorkflowCompletionHandler> for EventHandler {
    fn from(value: WorkflowCompletionHandler) -> Self {
        Self::WorkflowFinished(value)
    }
}
