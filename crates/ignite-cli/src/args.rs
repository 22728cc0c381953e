use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Replays captured workflow streams and renders streamed markdown.
#[derive(Parser, Debug)]
#[command(name = "ignite", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a captured event stream through the pipeline
    Replay {
        /// Captured stream file (reads stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// JSON stream config (built-in slot tables when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Bytes per read; small values exercise frame reassembly
        #[arg(long, default_value_t = 8192)]
        chunk_size: usize,

        /// What to print once the stream ends
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
    },
    /// Render a markdown document through the incremental renderer
    Render {
        /// Markdown file (reads stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Characters per streamed chunk
        #[arg(long, default_value_t = 64)]
        chunk_size: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Composed session markdown
    Markdown,
    /// Composed session markdown rendered to HTML
    Html,
    /// Live preview HTML built from the emissions alone
    Preview,
    /// One JSON line per delivered emission
    Emissions,
    /// Archived and current sessions as JSON
    Sessions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_defaults() {
        let cli = Cli::parse_from(["ignite", "replay"]);
        match cli.command {
            Command::Replay {
                input,
                chunk_size,
                format,
                ..
            } => {
                assert!(input.is_none());
                assert_eq!(chunk_size, 8192);
                assert_eq!(format, OutputFormat::Markdown);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn replay_flags_parse() {
        let cli = Cli::parse_from([
            "ignite",
            "replay",
            "--input",
            "stream.txt",
            "--chunk-size",
            "3",
            "--format",
            "emissions",
        ]);
        assert!(matches!(
            cli.command,
            Command::Replay {
                chunk_size: 3,
                format: OutputFormat::Emissions,
                ..
            }
        ));
    }
}
