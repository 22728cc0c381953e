/// Top-level error type for the stream pipeline API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Invalid or incomplete pipeline configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The byte source failed while the stream was being read.
    #[error("source error: {0}")]
    Source(String),
    /// Local I/O failed (for example while loading a config file).
    #[error("io error: {0}")]
    Io(String),
    /// A JSON document could not be parsed.
    #[error("json error: {0}")]
    Json(String),
}

impl StreamError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a source error from any displayable transport failure.
    pub fn source(err: impl std::fmt::Display) -> Self {
        Self::Source(err.to_string())
    }
}

impl From<std::io::Error> for StreamError {
    fn from(value: std::io::Error) -> Self {
        StreamError::Io(value.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(value: serde_json::Error) -> Self {
        StreamError::Json(value.to_string())
    }
}

/// Failure reported by a markdown renderer.
///
/// Never escapes `IncrementalMarkdownRenderer::process_chunk`; the renderer
/// falls back to escaped preformatted text instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("markdown render failed: {0}")]
pub struct RenderError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert_to_io_variant() {
        let err: StreamError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing.json").into();
        assert!(matches!(err, StreamError::Io(msg) if msg.contains("missing.json")));
    }

    #[test]
    fn source_error_keeps_transport_message() {
        let err = StreamError::source("connection reset");
        assert_eq!(err.to_string(), "source error: connection reset");
    }
}
