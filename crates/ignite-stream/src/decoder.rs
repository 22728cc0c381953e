use bytes::BytesMut;
use tracing::{trace, warn};

use crate::event::WorkflowEvent;

const SNIPPET_RADIUS: usize = 24;

/// Incremental decoder for the workflow event stream.
///
/// Frames are separated by a blank line and cut at the byte level, so a
/// multi-byte character split across two reads is reassembled before it is
/// decoded. Bytes after the last separator stay pending until more input
/// arrives.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    data_prefix: String,
    scan_from: usize,
    stream_offset: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new("data:")
    }
}

impl FrameDecoder {
    pub fn new(data_prefix: impl Into<String>) -> Self {
        Self {
            buf: BytesMut::new(),
            data_prefix: data_prefix.into(),
            scan_from: 0,
            stream_offset: 0,
        }
    }

    /// Appends `chunk` and returns every event from the frames it completes.
    pub fn parse(&mut self, chunk: &[u8]) -> Vec<WorkflowEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf, self.scan_from) {
            let frame = self.buf.split_to(idx + delim_len);
            let frame_offset = self.stream_offset;
            self.stream_offset += frame.len();
            self.scan_from = 0;
            self.decode_frame(&frame[..idx], frame_offset, &mut events);
        }
        // A separator can straddle the next read; rescan its first bytes.
        self.scan_from = self.buf.len().saturating_sub(3);
        events
    }

    /// Bytes received after the last complete frame.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Total bytes consumed as complete frames since the last `clear`.
    pub fn bytes_consumed(&self) -> usize {
        self.stream_offset
    }

    /// Drops pending bytes and restarts offsets for a new stream.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.scan_from = 0;
        self.stream_offset = 0;
    }

    fn decode_frame(&self, bytes: &[u8], frame_offset: usize, events: &mut Vec<WorkflowEvent>) {
        if bytes.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(bytes);
        for raw_line in text.split('\n') {
            let line = raw_line.trim_end_matches('\r');
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(payload) = line.strip_prefix(self.data_prefix.as_str()) else {
                trace!(line, "skipping non-data line");
                continue;
            };
            let payload = payload.trim();
            if payload.is_empty() {
                continue;
            }
            match serde_json::from_str::<WorkflowEvent>(payload) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(
                        frame_offset,
                        line = e.line(),
                        column = e.column(),
                        snippet = %snippet_around(payload, e.column()),
                        error = %e,
                        "skipping malformed data line"
                    );
                }
            }
        }
    }
}

fn find_frame_delimiter(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len()
            && buf[i] == b'\r'
            && buf[i + 1] == b'\n'
            && buf[i + 2] == b'\r'
            && buf[i + 3] == b'\n'
        {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

/// Text around a 1-based error column, clamped to character boundaries.
fn snippet_around(payload: &str, column: usize) -> String {
    let target = column.saturating_sub(1).min(payload.len());
    let mut start = target.saturating_sub(SNIPPET_RADIUS);
    while !payload.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (target + SNIPPET_RADIUS).min(payload.len());
    while !payload.is_char_boundary(end) {
        end += 1;
    }
    payload[start..end].to_string()
}
