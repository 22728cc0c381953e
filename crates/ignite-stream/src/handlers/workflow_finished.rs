use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use super::HandlerContext;
use crate::config::LEGACY_SLOT;
use crate::emission::Emission;
use crate::event::{EventKind, WorkflowEvent, output_text};

/// Turns the terminal `workflow_finished` event into the round's
/// authoritative final emission.
///
/// At most one terminal emission is produced per round: a repeated run id,
/// or any second terminal event after one was emitted, is claimed and
/// swallowed.
#[derive(Clone, Debug)]
pub struct WorkflowCompletionHandler {
    output_slots: Vec<String>,
    processed_runs: HashSet<String>,
    round_finished: bool,
}

impl WorkflowCompletionHandler {
    pub fn new(output_slots: Vec<String>) -> Self {
        Self {
            output_slots,
            processed_runs: HashSet::new(),
            round_finished: false,
        }
    }

    pub fn can_handle(&self, event: &WorkflowEvent) -> bool {
        event.kind == EventKind::WorkflowFinished
            && event
                .outputs()
                .is_some_and(|outputs| outputs.values().any(|v| !output_text(v).trim().is_empty()))
    }

    pub fn handle(&mut self, event: &WorkflowEvent, ctx: &mut HandlerContext<'_>) -> Option<Emission> {
        let run_id = event.run_id();
        if let Some(id) = run_id {
            if !self.processed_runs.insert(id.to_string()) {
                debug!(run_id = id, "duplicate workflow_finished ignored");
                return None;
            }
        }
        if self.round_finished {
            debug!(run_id, "round already finished; ignoring terminal event");
            return None;
        }

        let outputs = event.outputs()?;
        let has_slot_text = self.output_slots.iter().any(|slot| {
            outputs
                .get(slot)
                .is_some_and(|v| !output_text(v).trim().is_empty())
        });
        let emission = if has_slot_text {
            let per_slot: BTreeMap<String, String> = self
                .output_slots
                .iter()
                .map(|slot| {
                    let text = outputs.get(slot).map(output_text).unwrap_or_default();
                    (slot.clone(), text)
                })
                .collect();
            Emission::workflow_outputs(per_slot)
        } else {
            let (key, text) = outputs.iter().find_map(|(key, value)| {
                let text = value.as_str()?;
                (!text.trim().is_empty() && !ctx.filter.should_ignore(key, text))
                    .then_some((key, text))
            })?;
            debug!(key = %key, "using first unfiltered output field");
            Emission::final_fragment(LEGACY_SLOT, text)
        };

        info!(run_id, tag = emission.tag(), "workflow finished");
        self.round_finished = true;
        Some(emission)
    }

    pub fn reset_session(&mut self) {
        self.processed_runs.clear();
        self.round_finished = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::emission::EmissionPayload;
    use crate::filter::ContentFilter;
    use crate::slots::SlotResolver;

    fn finished(id: &str, outputs: serde_json::Value) -> WorkflowEvent {
        WorkflowEvent::new(
            EventKind::WorkflowFinished,
            serde_json::json!({"id": id, "outputs": outputs}),
        )
    }

    fn run(handler: &mut WorkflowCompletionHandler, event: &WorkflowEvent) -> Option<Emission> {
        let config = StreamConfig::default();
        let filter = ContentFilter::from_config(&config);
        let mut slots = SlotResolver::from_config(&config);
        let mut ctx = HandlerContext {
            filter: &filter,
            slots: &mut slots,
        };
        handler.handle(event, &mut ctx)
    }

    fn slots(names: &[&str]) -> WorkflowCompletionHandler {
        WorkflowCompletionHandler::new(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn missing_configured_slots_are_emitted_empty() {
        let mut h = slots(&["advice", "phrases", "words"]);
        let event = finished("run-1", serde_json::json!({"advice": "A", "phrases": "P"}));
        let emission = run(&mut h, &event).expect("emission");
        assert!(emission.is_final);
        let EmissionPayload::WorkflowOutputs { outputs } = emission.payload else {
            panic!("expected workflow outputs");
        };
        assert_eq!(outputs["advice"], "A");
        assert_eq!(outputs["phrases"], "P");
        assert_eq!(outputs["words"], "");
    }

    #[test]
    fn repeated_run_id_emits_once() {
        let mut h = slots(&["advice"]);
        let event = finished("run-1", serde_json::json!({"advice": "A"}));
        assert!(run(&mut h, &event).is_some());
        assert!(h.can_handle(&event));
        assert!(run(&mut h, &event).is_none());
    }

    #[test]
    fn second_terminal_event_in_a_round_is_swallowed() {
        let mut h = slots(&["advice"]);
        assert!(run(&mut h, &finished("run-1", serde_json::json!({"advice": "A"}))).is_some());
        assert!(run(&mut h, &finished("run-2", serde_json::json!({"advice": "B"}))).is_none());
        h.reset_session();
        assert!(run(&mut h, &finished("run-1", serde_json::json!({"advice": "C"}))).is_some());
    }

    #[test]
    fn generic_outputs_skip_filtered_fields() {
        let mut h = slots(&["advice"]);
        let event = finished(
            "run-1",
            serde_json::json!({
                "sys.query": "echo",
                "currentLyric": "old lyric",
                "summary": "stop",
                "answer": "the real answer",
            }),
        );
        assert_eq!(
            run(&mut h, &event),
            Some(Emission::final_fragment(LEGACY_SLOT, "the real answer"))
        );
    }

    #[test]
    fn empty_slot_field_falls_back_to_generic_output() {
        let mut h = slots(&["advice", "phrases"]);
        let event = finished(
            "run-1",
            serde_json::json!({"advice": "", "answer": "the real answer"}),
        );
        let emission = run(&mut h, &event).expect("emission");
        assert_eq!(emission, Emission::final_fragment(LEGACY_SLOT, "the real answer"));
        assert_eq!(emission.content_text(), "the real answer");
    }

    #[test]
    fn empty_outputs_are_not_claimed() {
        let h = slots(&["advice"]);
        assert!(!h.can_handle(&finished("run-1", serde_json::json!({"advice": ""}))));
        assert!(!h.can_handle(&WorkflowEvent::new(EventKind::WorkflowFinished, serde_json::json!({}))));
    }
}
