//! Streaming ingestion and incremental markdown rendering for workflow
//! engine responses.
//!
//! Bytes from any async source are cut into frames, decoded into
//! [`WorkflowEvent`]s, routed through the [`HandlerRegistry`] and delivered
//! to an [`EmissionSink`] as slot-tagged emissions. A [`SessionAggregator`]
//! folds emissions into per-round sessions and the
//! [`IncrementalMarkdownRenderer`] turns partial markdown into HTML while it
//! is still arriving.
//!
//! # Replaying a stream
//!
//! ```no_run
//! use futures::stream;
//! use ignite_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StreamError> {
//! let config = StreamConfig::default();
//! let mut pipeline = StreamPipeline::new(config.clone())?;
//! let mut sessions = SessionAggregator::new(config)?;
//!
//! let body = "data: {\"event\":\"text_chunk\",\"data\":{\"text\":\"## Hello\"}}\n\n";
//! let source = stream::iter([Ok::<_, std::io::Error>(body.as_bytes())]);
//!
//! sessions.begin_round();
//! let mut sink = |emission: &Emission| {
//!     sessions.apply(emission);
//! };
//! pipeline.run(source, &mut sink).await?;
//! sessions.finish_round();
//!
//! println!("{}", sessions.display_html());
//! # Ok(())
//! # }
//! ```

/// Stream configuration: slot tables, filter rules and display text.
pub mod config;
/// Incremental frame decoder for the byte stream.
pub mod decoder;
/// Emissions delivered to the sink and their wire form.
pub mod emission;
/// Public error types.
pub mod errors;
/// Decoded workflow events.
pub mod event;
/// Filter for echoed inputs and noise in workflow outputs.
pub mod filter;
/// Event handlers and the dispatching registry.
pub mod handlers;
/// Logging setup.
pub mod observability;
/// Read loop tying decoder, registry and sink together.
pub mod pipeline;
/// Common imports for typical usage.
pub mod prelude;
/// Markdown rendering for partially received text.
pub mod render;
/// Per-round session aggregation and display composition.
pub mod session;
/// Node title to slot resolution.
pub mod slots;

pub use config::{LEGACY_SLOT, SlotPattern, StreamConfig};
pub use decoder::FrameDecoder;
pub use emission::{Emission, EmissionPayload, EmissionSink, NodeKind, WireSink, wire_sink};
pub use errors::{RenderError, StreamError};
pub use event::{EventKind, WorkflowEvent};
pub use filter::{ContentFilter, FilterRules};
pub use handlers::{Delivery, Dispatch, EventHandler, HandlerRegistry, PipelineState};
pub use observability::init_observability;
pub use pipeline::{StreamPipeline, StreamSummary};
pub use render::{
    IncrementalMarkdownRenderer, MarkdownToHtml, PulldownMarkdownRenderer, RenderOutput,
    RenderState,
};
pub use session::{Session, SessionAggregator};
pub use slots::SlotResolver;
