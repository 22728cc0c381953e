use std::path::Path;

use anyhow::{Context as _, ensure};
use ignite_stream::{
    Emission, EmissionPayload, IncrementalMarkdownRenderer, SessionAggregator, StreamConfig,
    StreamPipeline,
};
use tokio::io::{AsyncRead, AsyncReadExt as _};
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::args::OutputFormat;

async fn open_input(input: Option<&Path>) -> anyhow::Result<Box<dyn AsyncRead + Unpin>> {
    Ok(match input {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    })
}

/// Replays a captured stream and returns the requested view of it.
pub async fn replay(
    input: Option<&Path>,
    config: Option<&Path>,
    chunk_size: usize,
    format: OutputFormat,
) -> anyhow::Result<String> {
    ensure!(chunk_size > 0, "--chunk-size must be at least 1");
    let config = match config {
        Some(path) => StreamConfig::from_path(path)?,
        None => StreamConfig::default(),
    };
    let mut pipeline = StreamPipeline::new(config.clone())?;
    let mut sessions = SessionAggregator::new(config)?;
    let mut preview = IncrementalMarkdownRenderer::default();
    let mut preview_html = String::new();
    let mut emissions = Vec::new();

    let source = ReaderStream::with_capacity(open_input(input).await?, chunk_size);
    sessions.begin_round();
    let summary = {
        let mut sink = |emission: &Emission| {
            sessions.apply(emission);
            if !matches!(emission.payload, EmissionPayload::NodeOutput { .. }) {
                preview_html = preview
                    .process_chunk(&emission.content_text(), emission.is_final)
                    .html;
            }
            emissions.push(emission.clone());
        };
        pipeline.run(source, &mut sink).await?
    };
    sessions.finish_round();
    info!(
        events = summary.events_decoded,
        emissions = summary.emissions,
        terminal = summary.terminal_emitted,
        "replay finished"
    );

    Ok(match format {
        OutputFormat::Markdown => sessions.display_markdown(),
        OutputFormat::Html => sessions.display_html(),
        OutputFormat::Preview => preview_html,
        OutputFormat::Emissions => emission_lines(&emissions)?,
        OutputFormat::Sessions => serde_json::to_string_pretty(&serde_json::json!({
            "history": sessions.history(),
            "current": sessions.current(),
        }))?,
    })
}

fn emission_lines(emissions: &[Emission]) -> anyhow::Result<String> {
    let mut lines = Vec::with_capacity(emissions.len());
    for emission in emissions {
        let mut value: serde_json::Value = serde_json::from_str(&emission.to_wire())?;
        value["is_final"] = emission.is_final.into();
        lines.push(value.to_string());
    }
    Ok(lines.join("\n"))
}

/// Streams a markdown document through the incremental renderer in
/// `chunk_size`-character pieces and returns the last rendered HTML.
pub async fn render(input: Option<&Path>, chunk_size: usize) -> anyhow::Result<String> {
    ensure!(chunk_size > 0, "--chunk-size must be at least 1");
    let mut text = String::new();
    open_input(input)
        .await?
        .read_to_string(&mut text)
        .await
        .context("failed to read markdown input")?;

    let mut renderer = IncrementalMarkdownRenderer::default();
    let chars: Vec<char> = text.chars().collect();
    let mut html = renderer.process_chunk("", false).html;
    for piece in chars.chunks(chunk_size) {
        let chunk: String = piece.iter().collect();
        html = renderer.process_chunk(&chunk, false).html;
    }
    let state = renderer.state();
    info!(
        code_block_open = state.code_block_open,
        list_items = state.list_items,
        "render finished"
    );
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = concat!(
        "data: {\"event\":\"node_started\",\"data\":{\"node_id\":\"a\",\"title\":\"Advice\"}}\n\n",
        "data: {\"event\":\"text_chunk\",\"data\":{\"text\":\"Rest \",\"from_variable_selector\":[\"a\"]}}\n\n",
        "data: {\"event\":\"text_chunk\",\"data\":{\"text\":\"more\",\"from_variable_selector\":[\"a\"]}}\n\n",
    );

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("ignite-cli-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).expect("write temp file");
        path
    }

    #[tokio::test]
    async fn replay_composes_markdown_from_a_file() {
        let path = write_temp("replay.txt", STREAM);
        let out = replay(Some(&path), None, 5, OutputFormat::Markdown)
            .await
            .expect("replay");
        assert_eq!(out, "## アドバイス\n\nRest more");
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn replay_lists_emissions_with_finality() {
        let path = write_temp("emissions.txt", STREAM);
        let out = replay(Some(&path), None, 64, OutputFormat::Emissions)
            .await
            .expect("replay");
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["type"], "advice");
        assert_eq!(lines[2]["type"], "completion");
        assert_eq!(lines[2]["is_final"], true);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn zero_chunk_size_is_rejected() {
        assert!(replay(None, None, 0, OutputFormat::Markdown).await.is_err());
        assert!(render(None, 0).await.is_err());
    }

    #[tokio::test]
    async fn render_closes_open_fence() {
        let path = write_temp("doc.md", "# Notes\n\n```sh\necho hi");
        let html = render(Some(&path), 4).await.expect("render");
        assert!(html.contains("<h1>Notes</h1>"));
        assert!(html.contains("echo hi"));
        assert!(html.contains("</code></pre>"));
        let _ = std::fs::remove_file(path);
    }
}
