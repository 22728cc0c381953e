use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::StreamError;
use crate::filter::FilterRules;

/// Catch-all slot for content that cannot be attributed to a named slot.
pub const LEGACY_SLOT: &str = "legacy";

/// One row of the title → slot table used by `SlotResolver`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPattern {
    /// Case-insensitive substring matched against node titles.
    pub pattern: String,
    /// Canonical slot name the pattern maps to.
    pub slot: String,
}

impl SlotPattern {
    pub fn new(pattern: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            slot: slot.into(),
        }
    }
}

/// Configuration shared by the pipeline, its handlers and the session
/// aggregator.
///
/// `StreamConfig::default()` carries the built-in slot tables. Every
/// constructor that accepts a config calls [`StreamConfig::validate`] so a
/// broken table is rejected before any stream is read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Output slots produced by the workflow, in display order.
    pub output_slots: Vec<String>,
    /// Ordered title pattern table. The first matching pattern wins.
    pub slot_titles: Vec<SlotPattern>,
    /// Section heading shown for each slot in composed display text.
    pub slot_display_titles: BTreeMap<String, String>,
    /// Rules deciding which output fields are echoed input or noise.
    pub filter: FilterRules,
    /// Literal text the engine sends to mark an empty or aborted fragment.
    pub stop_sentinel: String,
    /// Line prefix that marks a data line inside a frame.
    pub data_prefix: String,
    /// Markdown shown while a round is generating but has no text yet.
    pub generating_placeholder: String,
    /// Markdown shown before the first round starts.
    pub initial_text: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        let output_slots = ["advice", "phrases", "words", "lyric", "final_phrase"]
            .into_iter()
            .map(String::from)
            .collect();
        let slot_titles = vec![
            SlotPattern::new("アドバイス", "advice"),
            SlotPattern::new("最終フレーズ", "final_phrase"),
            SlotPattern::new("フレーズ", "phrases"),
            SlotPattern::new("ワード", "words"),
            SlotPattern::new("歌詞", "lyric"),
            SlotPattern::new("advice", "advice"),
            SlotPattern::new("final_phrase", "final_phrase"),
            SlotPattern::new("phrases", "phrases"),
            SlotPattern::new("words", "words"),
            SlotPattern::new("lyric", "lyric"),
        ];
        let slot_display_titles = [
            ("advice", "アドバイス"),
            ("phrases", "フレーズ"),
            ("words", "キーワード"),
            ("lyric", "歌詞"),
            ("final_phrase", "最終フレーズ"),
        ]
        .into_iter()
        .map(|(slot, title)| (slot.to_string(), title.to_string()))
        .collect();

        Self {
            output_slots,
            slot_titles,
            slot_display_titles,
            filter: FilterRules::default(),
            stop_sentinel: "stop".to_string(),
            data_prefix: "data:".to_string(),
            generating_placeholder: "## 生成中...".to_string(),
            initial_text: "AIのインスピレーションがここに表示されます".to_string(),
        }
    }
}

impl StreamConfig {
    /// Parses and validates a JSON config document. Missing fields take
    /// their default values.
    pub fn from_json_str(raw: &str) -> Result<Self, StreamError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StreamError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            StreamError::Io(format!("failed to read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Replaces the output slot list.
    pub fn output_slots<I, S>(mut self, slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_slots = slots.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the title pattern table.
    pub fn slot_titles(mut self, patterns: Vec<SlotPattern>) -> Self {
        self.slot_titles = patterns;
        self
    }

    /// Appends a title pattern after the existing ones.
    pub fn slot_title(mut self, pattern: impl Into<String>, slot: impl Into<String>) -> Self {
        self.slot_titles.push(SlotPattern::new(pattern, slot));
        self
    }

    /// Sets the heading shown for `slot` in composed display text.
    pub fn display_title(mut self, slot: impl Into<String>, title: impl Into<String>) -> Self {
        self.slot_display_titles.insert(slot.into(), title.into());
        self
    }

    /// Overrides the content filter rules.
    pub fn filter_rules(mut self, rules: FilterRules) -> Self {
        self.filter = rules;
        self
    }

    /// Overrides the stop sentinel.
    pub fn stop_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.stop_sentinel = sentinel.into();
        self
    }

    /// Returns the heading for `slot`, falling back to the slot name.
    pub fn display_title_for<'a>(&'a self, slot: &'a str) -> &'a str {
        self.slot_display_titles
            .get(slot)
            .map(String::as_str)
            .unwrap_or(slot)
    }

    /// Returns true for configured output slots and the legacy slot.
    pub fn is_known_slot(&self, slot: &str) -> bool {
        slot == LEGACY_SLOT || self.output_slots.iter().any(|s| s == slot)
    }

    /// Checks the config for missing tables and dangling slot references.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.output_slots.is_empty() {
            return Err(StreamError::config("output_slots must not be empty"));
        }
        if let Some(blank) = self.output_slots.iter().find(|s| s.trim().is_empty()) {
            return Err(StreamError::config(format!(
                "output slot names must not be blank (got {blank:?})"
            )));
        }
        if self.slot_titles.is_empty() {
            return Err(StreamError::config("slot title table must not be empty"));
        }
        for row in &self.slot_titles {
            if row.pattern.trim().is_empty() {
                return Err(StreamError::config(format!(
                    "slot title pattern for {:?} must not be blank",
                    row.slot
                )));
            }
            if !self.is_known_slot(&row.slot) {
                return Err(StreamError::config(format!(
                    "slot title {:?} maps to unknown slot {:?}",
                    row.pattern, row.slot
                )));
            }
        }
        if self.data_prefix.trim().is_empty() {
            return Err(StreamError::config("data_prefix must not be empty"));
        }
        if self.stop_sentinel.trim().is_empty() {
            return Err(StreamError::config("stop_sentinel must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(StreamConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_title_table_fails_fast() {
        let config = StreamConfig::default().slot_titles(Vec::new());
        assert!(
            matches!(config.validate(), Err(StreamError::Config(msg)) if msg.contains("title table"))
        );
    }

    #[test]
    fn title_pointing_at_unknown_slot_is_rejected() {
        let config = StreamConfig::default().slot_title("summary", "summary");
        assert!(
            matches!(config.validate(), Err(StreamError::Config(msg)) if msg.contains("unknown slot"))
        );
    }

    #[test]
    fn json_config_fills_missing_fields_from_defaults() {
        let config = StreamConfig::from_json_str(
            r#"{"output_slots":["advice","words"],"slot_titles":[{"pattern":"tips","slot":"advice"}]}"#,
        )
        .expect("config");
        assert_eq!(config.output_slots, vec!["advice", "words"]);
        assert_eq!(config.data_prefix, "data:");
        assert_eq!(config.display_title_for("words"), "キーワード");
        assert_eq!(config.display_title_for("other"), "other");
    }

    #[test]
    fn malformed_json_config_is_a_json_error() {
        assert!(matches!(
            StreamConfig::from_json_str("{not json"),
            Err(StreamError::Json(_))
        ));
    }
}
