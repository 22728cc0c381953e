use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_JSON_LOG_FILE: &str = "ignite.logs.jsonl";

/// Where pipeline logs go.
#[derive(Clone, Debug, PartialEq, Eq)]
enum LogTarget {
    Off,
    /// Compact lines on stderr; stdout is left to rendered output.
    Console,
    /// One JSON object per line, appended to `dir/file`.
    JsonFile { dir: PathBuf, file: String },
}

impl LogTarget {
    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("IGNITE_OBSERVABILITY")
            .and_then(|value| parse_bool_env(&value))
            .unwrap_or(true);
        if !enabled {
            return Self::Off;
        }
        let Some(raw) = lookup("IGNITE_JSON_LOG_PATH").filter(|p| !p.trim().is_empty()) else {
            return Self::Console;
        };
        let path = PathBuf::from(raw);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let file = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_JSON_LOG_FILE)
            .to_string();
        Self::JsonFile { dir, file }
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn resolve_env_filter(level: Option<String>) -> EnvFilter {
    level
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `IGNITE_OBSERVABILITY`: enable/disable flag (default enabled).
/// - `IGNITE_LOG_LEVEL`: level or filter directive, wins over `RUST_LOG`.
/// - `IGNITE_JSON_LOG_PATH`: write JSONL to this file instead of stderr.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let lookup = |name: &str| std::env::var(name).ok();
        let target = LogTarget::resolve(lookup);
        let env_filter = resolve_env_filter(lookup("IGNITE_LOG_LEVEL"));
        match target {
            LogTarget::Off => {}
            LogTarget::Console => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
            LogTarget::JsonFile { dir, file } => {
                let _ = std::fs::create_dir_all(&dir);
                let writer = tracing_appender::rolling::never(dir, file);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn bool_env_values() {
        assert_eq!(parse_bool_env(" ON "), Some(true));
        assert_eq!(parse_bool_env("disabled"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn target_defaults_to_console() {
        assert_eq!(LogTarget::resolve(env(&[])), LogTarget::Console);
        assert_eq!(
            LogTarget::resolve(env(&[("IGNITE_OBSERVABILITY", "maybe")])),
            LogTarget::Console
        );
    }

    #[test]
    fn disabled_flag_turns_logging_off() {
        let target = LogTarget::resolve(env(&[
            ("IGNITE_OBSERVABILITY", "off"),
            ("IGNITE_JSON_LOG_PATH", "logs/run.jsonl"),
        ]));
        assert_eq!(target, LogTarget::Off);
    }

    #[test]
    fn json_path_splits_into_dir_and_file() {
        assert_eq!(
            LogTarget::resolve(env(&[("IGNITE_JSON_LOG_PATH", "logs/run.jsonl")])),
            LogTarget::JsonFile {
                dir: PathBuf::from("logs"),
                file: "run.jsonl".to_string(),
            }
        );
        assert_eq!(
            LogTarget::resolve(env(&[("IGNITE_JSON_LOG_PATH", "run.jsonl")])),
            LogTarget::JsonFile {
                dir: PathBuf::from("."),
                file: "run.jsonl".to_string(),
            }
        );
    }

    #[test]
    fn init_is_idempotent() {
        init_observability();
        init_observability();
    }
}
