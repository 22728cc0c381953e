//! Incremental markdown rendering for text that is still arriving.
//!
//! Partial markdown is patched only in the copy handed to the renderer:
//! an unterminated code fence is closed, an open blockquote is ended and
//! heading or list markers glued to the preceding prose get a paragraph
//! break. The source text itself is never rewritten.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::warn;

use crate::errors::RenderError;

/// Renderer abstraction: convert markdown to HTML.
pub trait MarkdownToHtml: Send + Sync {
    fn render(&self, markdown: &str) -> Result<String, RenderError>;
}

/// Default implementation using pulldown-cmark, with tables,
/// strikethrough and task lists enabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct PulldownMarkdownRenderer;

impl MarkdownToHtml for PulldownMarkdownRenderer {
    fn render(&self, markdown: &str) -> Result<String, RenderError> {
        use pulldown_cmark::{Options, Parser, html};
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, Parser::new_ext(markdown, options));
        Ok(out)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderOutput {
    /// Accumulated source text, unmodified.
    pub text: String,
    pub html: String,
}

/// Structure found by the last scan of the source text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderState {
    pub source_text: String,
    pub code_block_open: bool,
    pub blockquote_open: bool,
    pub list_items: usize,
    /// Opening fence of the unterminated code block, if any.
    pub fence: Option<String>,
}

static HEADING_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<pre>[^\s#])(?P<gap>[ \t]*)(?P<marker>#{1,6}[ \t])").expect("heading marker pattern")
});

static LIST_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<pre>\S)(?P<gap>[ \t]*)(?P<marker>[-*+][ \t]|\d+[.)][ \t])").expect("list marker pattern")
});

static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([-*+]|\d+[.)])\s").expect("list item pattern"));

/// Accumulates streamed markdown and renders an always-valid preview.
pub struct IncrementalMarkdownRenderer {
    renderer: Arc<dyn MarkdownToHtml>,
    state: RenderState,
}

impl Default for IncrementalMarkdownRenderer {
    fn default() -> Self {
        Self::new(Arc::new(PulldownMarkdownRenderer))
    }
}

impl std::fmt::Debug for IncrementalMarkdownRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalMarkdownRenderer")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl IncrementalMarkdownRenderer {
    pub fn new(renderer: Arc<dyn MarkdownToHtml>) -> Self {
        Self {
            renderer,
            state: RenderState::default(),
        }
    }

    /// Feeds one chunk. A final chunk replaces everything received so far
    /// and is rendered as-is; a non-final chunk is appended and the whole
    /// source is re-scanned and patched before rendering.
    pub fn process_chunk(&mut self, chunk: &str, is_final: bool) -> RenderOutput {
        if is_final {
            self.state.source_text = chunk.to_string();
        } else {
            self.state.source_text.push_str(chunk);
        }
        let prepared = self.rescan();
        let markdown = if is_final {
            self.state.source_text.as_str()
        } else {
            prepared.as_str()
        };
        let html = match self.renderer.render(markdown) {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "markdown render failed; showing escaped preview");
                format!(
                    "<pre class=\"streaming-preview\">{}</pre>",
                    escape_html(&self.state.source_text)
                )
            }
        };
        RenderOutput {
            text: self.state.source_text.clone(),
            html,
        }
    }

    /// Renders a complete document without touching the streaming state.
    pub fn render_document(&self, markdown: &str) -> String {
        self.renderer.render(markdown).unwrap_or_else(|e| {
            warn!(error = %e, "markdown render failed; showing escaped preview");
            format!("<pre class=\"streaming-preview\">{}</pre>", escape_html(markdown))
        })
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = RenderState::default();
    }

    /// Rebuilds the structural state from the source text and returns the
    /// patched copy used for non-final rendering.
    fn rescan(&mut self) -> String {
        let source = &self.state.source_text;
        let mut prepared = String::with_capacity(source.len() + 16);
        let mut fence: Option<String> = None;
        let mut blockquote_open = false;
        let mut list_items = 0;

        for (i, line) in source.split('\n').enumerate() {
            if i > 0 {
                prepared.push('\n');
            }
            let trimmed = line.trim();
            if let Some(open) = &fence {
                if closes_fence(trimmed, open) {
                    fence = None;
                }
                prepared.push_str(line);
                continue;
            }
            if let Some(opening) = fence_marker(trimmed) {
                fence = Some(opening.to_string());
                prepared.push_str(line);
                continue;
            }

            if trimmed.starts_with('>') {
                blockquote_open = true;
            } else if trimmed.is_empty() {
                blockquote_open = false;
            }
            if LIST_ITEM.is_match(trimmed) {
                list_items += 1;
            }
            prepared.push_str(&break_glued_markers(line));
        }

        if let Some(open) = &fence {
            prepared.push('\n');
            prepared.push_str(open);
        }
        if blockquote_open {
            prepared.push('\n');
        }

        self.state.code_block_open = fence.is_some();
        self.state.fence = fence;
        self.state.blockquote_open = blockquote_open;
        self.state.list_items = list_items;
        prepared
    }
}

/// Fence run (three or more backticks or tildes) opening a code block.
fn fence_marker(trimmed: &str) -> Option<&str> {
    let ch = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = trimmed.len() - trimmed.trim_start_matches(ch).len();
    (run >= 3).then(|| &trimmed[..run])
}

fn closes_fence(trimmed: &str, open: &str) -> bool {
    fence_marker(trimmed).is_some_and(|run| {
        run.starts_with(open) && trimmed.len() == run.len()
    })
}

fn break_glued_markers(line: &str) -> String {
    let line = HEADING_MARKER.replace_all(line, |caps: &Captures| {
        let pre = caps["pre"].chars().next().unwrap_or(' ');
        if !caps["gap"].is_empty() || is_break_char(pre) {
            format!("{}\n\n{}", &caps["pre"], &caps["marker"])
        } else {
            caps[0].to_string()
        }
    });
    LIST_MARKER
        .replace_all(&line, |caps: &Captures| {
            let pre = caps["pre"].chars().next().unwrap_or(' ');
            if is_break_char(pre) {
                format!("{}\n\n{}", &caps["pre"], &caps["marker"])
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Sentence-ending punctuation and emoji: a marker right after one of
/// these starts a new block.
fn is_break_char(c: char) -> bool {
    matches!(
        c,
        '.' | '!' | '?' | ':' | ')' | '。' | '！' | '？' | '：' | '）' | '」' | '』'
    ) || matches!(c, '\u{1F300}'..='\u{1F6FF}' | '\u{1F900}'..='\u{1F9FF}' | '\u{2600}'..='\u{27BF}')
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
