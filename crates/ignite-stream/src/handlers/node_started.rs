use tracing::debug;

use super::HandlerContext;
use crate::emission::Emission;
use crate::event::{EventKind, WorkflowEvent};

/// Binds each starting node to the slot its title resolves to. Never emits.
#[derive(Clone, Debug, Default)]
pub struct NodeStartHandler;

impl NodeStartHandler {
    pub fn can_handle(&self, event: &WorkflowEvent) -> bool {
        event.kind == EventKind::NodeStarted
    }

    pub fn handle(&self, event: &WorkflowEvent, ctx: &mut HandlerContext<'_>) -> Option<Emission> {
        let Some(node_id) = event.node_id() else {
            debug!("node_started without node_id");
            return None;
        };
        ctx.slots.bind_title(node_id, event.title().unwrap_or_default());
        None
    }
}
