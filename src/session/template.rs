use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{ReelError, ReelResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSlot {
    pub id: String,
    pub label: String,
    pub duration_secs: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub slots: Vec<TemplateSlot>,
}

impl Template {
    pub fn validate(&self) -> ReelResult<()> {
        if self.slots.is_empty() {
            return Err(ReelError::validation(format!(
                "template '{}' has no slots",
                self.id
            )));
        }
        if let Some(slot) = self.slots.iter().find(|s| s.duration_secs == 0) {
            return Err(ReelError::validation(format!(
                "template slot '{}' must have a non-zero duration",
                slot.id
            )));
        }
        Ok(())
    }

    pub fn total_duration(&self) -> u32 {
        self.slots.iter().map(|s| s.duration_secs).sum()
    }

    /// Built-in template by id.
    pub fn preset(id: &str) -> Option<Self> {
        let slots: &[(&str, &str, u32)] = match id {
            "intro-body-outro" => &[
                ("intro", "Intro", 3),
                ("body", "Main", 10),
                ("outro", "Outro", 3),
            ],
            "quick-cuts" => &[
                ("cut-1", "Cut 1", 2),
                ("cut-2", "Cut 2", 2),
                ("cut-3", "Cut 3", 2),
                ("cut-4", "Cut 4", 2),
            ],
            "story" => &[
                ("setup", "Setup", 5),
                ("conflict", "Conflict", 5),
                ("payoff", "Payoff", 5),
            ],
            _ => return None,
        };
        Some(Self {
            id: id.to_owned(),
            name: id.replace('-', " "),
            slots: slots
                .iter()
                .map(|(id, label, d)| TemplateSlot {
                    id: (*id).to_owned(),
                    label: (*label).to_owned(),
                    duration_secs: *d,
                })
                .collect(),
        })
    }
}

pub const PRESET_TEMPLATES: &[&str] = &["intro-body-outro", "quick-cuts", "story"];

/// Per-slot recording status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotRecording {
    pub recorded: bool,
    pub blob: Option<Arc<[u8]>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequencerState {
    Selecting,
    Ready,
    Recording { remaining_secs: u32 },
    SlotComplete,
    AllComplete,
}

/// Drives recording through a template's ordered, fixed-duration slots.
#[derive(Debug)]
pub struct TemplateSequencer {
    state: SequencerState,
    template: Option<Template>,
    slots: Vec<SlotRecording>,
    index: usize,
}

impl Default for TemplateSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateSequencer {
    pub fn new() -> Self {
        Self {
            state: SequencerState::Selecting,
            template: None,
            slots: Vec::new(),
            index: 0,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn current_slot(&self) -> Option<&TemplateSlot> {
        self.template.as_ref()?.slots.get(self.index)
    }

    pub fn slots(&self) -> &[SlotRecording] {
        &self.slots
    }

    pub fn completed_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.recorded).count()
    }

    fn transition(&mut self, to: SequencerState) {
        if self.state != to {
            tracing::debug!(from = ?self.state, to = ?to, index = self.index, "template transition");
            self.state = to;
        }
    }

    pub fn select_template(&mut self, template: Template) -> ReelResult<()> {
        template.validate()?;
        self.slots = vec![SlotRecording::default(); template.slots.len()];
        self.index = 0;
        tracing::info!(template = %template.id, slots = template.slots.len(), "template selected");
        self.template = Some(template);
        self.transition(SequencerState::Ready);
        Ok(())
    }

    /// Back to selection, dropping all slot recordings.
    pub fn clear(&mut self) {
        self.template = None;
        self.slots.clear();
        self.index = 0;
        self.transition(SequencerState::Selecting);
    }

    /// Ready -> Recording with the current slot's duration as the timer. Returns the duration.
    pub fn start_slot_recording(&mut self) -> Option<u32> {
        if self.state != SequencerState::Ready {
            return None;
        }
        let d = self.current_slot()?.duration_secs;
        self.transition(SequencerState::Recording { remaining_secs: d });
        Some(d)
    }

    /// Count down the slot timer. Returns `true` once it has expired; the caller then
    /// invokes [`Self::complete_slot_recording`].
    pub fn tick_second(&mut self) -> bool {
        let SequencerState::Recording { remaining_secs } = self.state else {
            return false;
        };
        let left = remaining_secs.saturating_sub(1);
        self.state = SequencerState::Recording {
            remaining_secs: left,
        };
        left == 0
    }

    /// Set the slot timer from an external measurement of the running take.
    pub fn sync_remaining(&mut self, remaining_secs: u32) {
        if let SequencerState::Recording { .. } = self.state {
            self.state = SequencerState::Recording { remaining_secs };
        }
    }

    /// Attach the take to the current slot. Completes the template when this was the last
    /// slot or every slot now holds a recording.
    pub fn complete_slot_recording(&mut self, blob: impl Into<Arc<[u8]>>) -> bool {
        if !matches!(self.state, SequencerState::Recording { .. }) {
            return false;
        }
        let Some(slot) = self.slots.get_mut(self.index) else {
            return false;
        };
        slot.recorded = true;
        slot.blob = Some(blob.into());
        let last = self.index + 1 >= self.slots.len() || self.slots.iter().all(|s| s.recorded);
        self.transition(if last {
            SequencerState::AllComplete
        } else {
            SequencerState::SlotComplete
        });
        true
    }

    /// Abort the running slot timer without recording anything.
    pub fn cancel_slot_recording(&mut self) -> bool {
        if !matches!(self.state, SequencerState::Recording { .. }) {
            return false;
        }
        self.transition(SequencerState::Ready);
        true
    }

    pub fn advance_to_next_slot(&mut self) -> bool {
        if self.state != SequencerState::SlotComplete {
            return false;
        }
        if self.index + 1 < self.slots.len() {
            self.index += 1;
            self.transition(SequencerState::Ready);
        } else {
            self.transition(SequencerState::AllComplete);
        }
        true
    }

    /// Clear the current slot and return to `Ready` without moving the index.
    pub fn retake_current_slot(&mut self) -> bool {
        if matches!(
            self.state,
            SequencerState::Selecting | SequencerState::Recording { .. }
        ) {
            return false;
        }
        let Some(slot) = self.slots.get_mut(self.index) else {
            return false;
        };
        *slot = SlotRecording::default();
        self.transition(SequencerState::Ready);
        true
    }

    /// Move the cursor to an earlier slot for a retake. The index only moves backward here.
    pub fn select_slot_for_retake(&mut self, index: usize) -> bool {
        if index >= self.slots.len()
            || index > self.index
            || matches!(
                self.state,
                SequencerState::Selecting | SequencerState::Recording { .. }
            )
        {
            return false;
        }
        self.index = index;
        self.retake_current_slot()
    }

    /// Recorded blobs in slot order, once every slot has one.
    pub fn recorded_blobs(&self) -> Option<Vec<Arc<[u8]>>> {
        self.slots.iter().map(|s| s.blob.clone()).collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/template.rs"]
mod tests;
