use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StreamConfig;

/// Allow/deny rules for output fields of a finished workflow.
///
/// These are heuristics over key names: the engine echoes caller inputs and
/// system variables next to generated outputs and nothing in the protocol
/// marks which is which.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    /// Keys that carry results. A key equal to one of these (or to a
    /// configured slot name), or whose last dotted segment is one, is
    /// always kept.
    pub result_keys: Vec<String>,
    /// Substrings that mark a key as echoed input or system metadata.
    pub echo_markers: Vec<String>,
    /// Substring that marks a key as part of an echoed input tree.
    pub input_tree_marker: String,
    /// Suffix that still allows a key inside an input tree.
    pub input_tree_allowed_suffix: String,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            result_keys: ["result", "text", "answer", "content"]
                .into_iter()
                .map(String::from)
                .collect(),
            echo_markers: vec!["currentLyric".to_string(), "sys.".to_string()],
            input_tree_marker: "inputs".to_string(),
            input_tree_allowed_suffix: ".result".to_string(),
        }
    }
}

/// Decides whether an output field is noise that must never be emitted.
#[derive(Clone, Debug)]
pub struct ContentFilter {
    result_keys: Vec<String>,
    echo_markers: Vec<String>,
    input_tree_marker: String,
    input_tree_allowed_suffix: String,
    stop_sentinel: String,
}

impl ContentFilter {
    /// Builds a filter from explicit rules; `output_slots` extend the
    /// result-bearing keys.
    pub fn new(rules: &FilterRules, output_slots: &[String], stop_sentinel: &str) -> Self {
        let mut result_keys = rules.result_keys.clone();
        for slot in output_slots {
            if !result_keys.contains(slot) {
                result_keys.push(slot.clone());
            }
        }
        Self {
            result_keys,
            echo_markers: rules
                .echo_markers
                .iter()
                .filter(|m| !m.is_empty())
                .cloned()
                .collect(),
            input_tree_marker: rules.input_tree_marker.clone(),
            input_tree_allowed_suffix: rules.input_tree_allowed_suffix.clone(),
            stop_sentinel: stop_sentinel.trim().to_lowercase(),
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(&config.filter, &config.output_slots, &config.stop_sentinel)
    }

    /// Result-bearing keys in priority order (generic keys, then slots).
    pub fn result_keys(&self) -> &[String] {
        &self.result_keys
    }

    /// Returns true when `key`/`value` is echoed input, system metadata or
    /// the stop sentinel.
    ///
    /// The allowlist runs first: a result-bearing key is kept even when a
    /// later rule would drop it.
    pub fn should_ignore(&self, key: &str, value: &str) -> bool {
        if self.is_result_key(key) {
            return false;
        }
        if let Some(marker) = self.echo_markers.iter().find(|m| key.contains(m.as_str())) {
            debug!(key, marker = %marker, "ignoring echoed input field");
            return true;
        }
        if !self.input_tree_marker.is_empty()
            && key.contains(&self.input_tree_marker)
            && !key.ends_with(&self.input_tree_allowed_suffix)
        {
            debug!(key, "ignoring field inside echoed input tree");
            return true;
        }
        if self.is_stop_sentinel(value) {
            debug!(key, "ignoring stop sentinel value");
            return true;
        }
        false
    }

    /// Returns true when `text`, trimmed and case-folded, is the sentinel.
    pub fn is_stop_sentinel(&self, text: &str) -> bool {
        text.trim().to_lowercase() == self.stop_sentinel
    }

    fn is_result_key(&self, key: &str) -> bool {
        self.result_keys.iter().any(|k| {
            key == k
                || key
                    .strip_suffix(k.as_str())
                    .is_some_and(|head| head.ends_with('.'))
        })
    }
}
