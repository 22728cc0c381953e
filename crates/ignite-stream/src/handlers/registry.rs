use tracing::{debug, trace};

use super::{
    EventHandler, HandlerContext, NodeCompletionHandler, NodeStartHandler, PipelineState,
    TextFragmentHandler, WorkflowCompletionHandler,
};
use crate::config::StreamConfig;
use crate::emission::{Emission, EmissionSink};
use crate::errors::StreamError;
use crate::event::{WorkflowEvent, has_visible_text};
use crate::filter::ContentFilter;
use crate::slots::SlotResolver;

/// What happened to the emission a handler produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The handler produced nothing, or the emission was suppressed.
    None,
    NonFinal,
    Final,
}

/// Outcome of dispatching one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// No handler claimed the event.
    Unclaimed,
    Handled {
        handler: &'static str,
        delivery: Delivery,
    },
}

/// Ordered handler table. The first handler that claims an event handles
/// it and dispatch stops there.
#[derive(Clone, Debug)]
pub struct HandlerRegistry {
    handlers: Vec<EventHandler>,
    filter: ContentFilter,
    slots: SlotResolver,
}

impl HandlerRegistry {
    /// Registry with no handlers.
    pub fn empty(config: &StreamConfig) -> Result<Self, StreamError> {
        config.validate()?;
        Ok(Self {
            handlers: Vec::new(),
            filter: ContentFilter::from_config(config),
            slots: SlotResolver::from_config(config),
        })
    }

    /// Registry with the built-in handlers: node start, text fragment, node
    /// completion and workflow completion, in that order.
    pub fn new(config: &StreamConfig) -> Result<Self, StreamError> {
        let mut registry = Self::empty(config)?;
        let node_finished = NodeCompletionHandler::from_filter(&registry.filter);
        registry.register(NodeStartHandler);
        registry.register(TextFragmentHandler::default());
        registry.register(node_finished);
        registry.register(WorkflowCompletionHandler::new(config.output_slots.clone()));
        Ok(registry)
    }

    /// Appends a handler after the existing ones.
    pub fn register(&mut self, handler: impl Into<EventHandler>) {
        let handler = handler.into();
        debug!(handler = handler.name(), "registered event handler");
        self.handlers.push(handler);
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(EventHandler::name).collect()
    }

    pub fn slots(&self) -> &SlotResolver {
        &self.slots
    }

    /// Routes `event` to the first claiming handler and delivers its
    /// emission to `sink` unless it is suppressed.
    pub fn dispatch<S>(&mut self, event: &WorkflowEvent, state: &mut PipelineState, sink: &mut S) -> Dispatch
    where
        S: EmissionSink + ?Sized,
    {
        let Some(handler) = self.handlers.iter_mut().find(|h| h.can_handle(event)) else {
            trace!(kind = %event.kind, "no handler claimed event");
            return Dispatch::Unclaimed;
        };
        let name = handler.name();
        let mut ctx = HandlerContext {
            filter: &self.filter,
            slots: &mut self.slots,
        };
        let delivery = match handler.handle(event, state, &mut ctx) {
            Some(emission) => deliver(emission, state, sink),
            None => Delivery::None,
        };
        debug!(kind = %event.kind, handler = name, ?delivery, "event dispatched");
        Dispatch::Handled {
            handler: name,
            delivery,
        }
    }

    /// Clears per-stream memory in every handler and the node → slot table.
    pub fn reset_session(&mut self) {
        for handler in &mut self.handlers {
            handler.reset_session();
        }
        self.slots.reset();
    }
}

/// Delivers `emission` to `sink` unless it repeats the last delivered wire
/// content or carries no visible text. Final emissions are always
/// delivered and end the accumulation.
pub(crate) fn deliver<S>(emission: Emission, state: &mut PipelineState, sink: &mut S) -> Delivery
where
    S: EmissionSink + ?Sized,
{
    let wire = emission.to_wire();
    if !emission.is_final {
        if state.last_emitted_content.as_deref() == Some(wire.as_str()) {
            trace!(tag = emission.tag(), "suppressed duplicate emission");
            return Delivery::None;
        }
        if !has_visible_text(&emission.content_text()) {
            trace!(tag = emission.tag(), "suppressed blank emission");
            return Delivery::None;
        }
    }
    sink.emit(&emission);
    state.last_emitted_content = Some(wire);
    if emission.is_final {
        state.accumulated_text.clear();
        Delivery::Final
    } else {
        Delivery::NonFinal
    }
}
