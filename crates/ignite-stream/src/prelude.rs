//! Common imports for typical pipeline usage.
pub use crate::{
    Emission, EmissionSink, IncrementalMarkdownRenderer, SessionAggregator, StreamConfig,
    StreamError, StreamPipeline, StreamSummary, WorkflowEvent, wire_sink,
};
