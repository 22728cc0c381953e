use futures::{Stream, StreamExt as _};
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::decoder::FrameDecoder;
use crate::emission::{Emission, EmissionSink};
use crate::errors::StreamError;
use crate::handlers::{Delivery, Dispatch, EventHandler, HandlerRegistry, PipelineState, deliver};

/// Counters for one stream, returned when it ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub events_decoded: usize,
    pub events_handled: usize,
    pub emissions: usize,
    /// True once a final emission was delivered.
    pub terminal_emitted: bool,
}

/// Drives one workflow stream: bytes in, emissions out.
///
/// Use [`StreamPipeline::run`] with an async byte source, or
/// `begin`/`feed`/`finish` when the caller owns the I/O loop. One pipeline
/// handles one stream at a time; every stream starts from a clean state.
#[derive(Debug)]
pub struct StreamPipeline {
    config: StreamConfig,
    decoder: FrameDecoder,
    registry: HandlerRegistry,
    state: PipelineState,
    summary: StreamSummary,
}

impl StreamPipeline {
    pub fn new(config: StreamConfig) -> Result<Self, StreamError> {
        let registry = HandlerRegistry::new(&config)?;
        Ok(Self {
            decoder: FrameDecoder::new(config.data_prefix.clone()),
            registry,
            state: PipelineState::default(),
            summary: StreamSummary::default(),
            config,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Appends a handler after the built-in ones.
    pub fn register_handler(&mut self, handler: impl Into<EventHandler>) {
        self.registry.register(handler);
    }

    /// Resets all per-stream state before a new stream.
    pub fn begin(&mut self) {
        self.registry.reset_session();
        self.state.reset();
        self.decoder.clear();
        self.summary = StreamSummary::default();
        info!("workflow stream started");
    }

    /// Decodes `bytes` and dispatches every completed event. Returns the
    /// number of events decoded from this read.
    pub fn feed<S>(&mut self, bytes: &[u8], sink: &mut S) -> usize
    where
        S: EmissionSink + ?Sized,
    {
        let events = self.decoder.parse(bytes);
        for event in &events {
            let outcome = self.registry.dispatch(event, &mut self.state, sink);
            if let Dispatch::Handled { delivery, .. } = outcome {
                self.summary.events_handled += 1;
                self.record(delivery);
            }
        }
        self.summary.events_decoded += events.len();
        events.len()
    }

    /// Ends the stream: flushes unterminated accumulated text as one final
    /// `completion` emission and drops any trailing partial frame.
    pub fn finish<S>(&mut self, sink: &mut S) -> StreamSummary
    where
        S: EmissionSink + ?Sized,
    {
        if !self.state.accumulated_text.is_empty() {
            let completion = Emission::completion(self.state.accumulated_text.clone());
            if self.state.last_emitted_content.as_deref() != Some(completion.to_wire().as_str()) {
                let delivery = deliver(completion, &mut self.state, sink);
                self.record(delivery);
            }
        }
        let pending = self.decoder.pending().len();
        if pending > 0 {
            debug!(pending_bytes = pending, "dropping trailing partial frame");
        }
        self.decoder.clear();
        info!(
            events = self.summary.events_decoded,
            emissions = self.summary.emissions,
            terminal = self.summary.terminal_emitted,
            "workflow stream finished"
        );
        self.summary
    }

    /// Reads `source` to the end and delivers every emission to `sink`.
    ///
    /// A source error stops the stream immediately: it is returned as
    /// [`StreamError::Source`] and nothing else is emitted, not even the
    /// completion flush.
    pub async fn run<St, B, E, S>(&mut self, source: St, sink: &mut S) -> Result<StreamSummary, StreamError>
    where
        St: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
        S: EmissionSink + ?Sized,
    {
        let mut source = std::pin::pin!(source);
        self.begin();
        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(|e| {
                warn!(error = %e, "byte source failed");
                StreamError::source(e)
            })?;
            self.feed(chunk.as_ref(), sink);
        }
        Ok(self.finish(sink))
    }

    fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::None => {}
            Delivery::NonFinal => self.summary.emissions += 1,
            Delivery::Final => {
                self.summary.emissions += 1;
                self.summary.terminal_emitted = true;
            }
        }
    }
}
