pub mod clips;
pub mod combine;
pub mod recording;
pub mod template;

pub use clips::{Artifact, Clip, ClipAccumulator, ClipId};
pub use combine::{CombineJob, CombineOutcome, run_combine};
pub use recording::{EncoderBinding, FinishedTake, RecordingSession, SessionState, TakeRequest};
pub use template::{SequencerState, SlotRecording, Template, TemplateSequencer, TemplateSlot};
