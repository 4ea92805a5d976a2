use std::fmt;
use std::sync::Arc;

use crate::foundation::arena::{ArenaStats, BufferHandle, MediaArena};

/// Stable clip identity, independent of where the bytes are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(pub u64);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip-{}", self.0)
    }
}

/// One finished take held by the accumulator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Clip {
    pub id: ClipId,
    pub handle: BufferHandle,
    pub duration_secs: u32,
    pub mime: String,
}

/// Combined, previewable output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub handle: BufferHandle,
    pub mime: String,
    pub byte_len: usize,
    /// Produced by the fallback path instead of the requested merge/speed transform.
    pub degraded: bool,
}

/// Ordered, bounded list of clips plus the combined preview. Owns every buffer it references.
#[derive(Debug)]
pub struct ClipAccumulator {
    arena: MediaArena,
    clips: Vec<Clip>,
    max_clips: usize,
    next_id: u64,
    total_secs: u32,
    preview: Option<Artifact>,
}

impl ClipAccumulator {
    pub fn new(max_clips: usize) -> Self {
        Self {
            arena: MediaArena::new(),
            clips: Vec::new(),
            max_clips,
            next_id: 1,
            total_secs: 0,
            preview: None,
        }
    }

    pub fn max_clips(&self) -> usize {
        self.max_clips
    }

    pub fn can_add_more_clips(&self) -> bool {
        self.clips.len() < self.max_clips
    }

    /// Append a clip. Returns `None` (and stores nothing) when already at capacity.
    ///
    /// Durations are trusted; budget enforcement is the recording session's job.
    pub fn add(
        &mut self,
        bytes: impl Into<Arc<[u8]>>,
        mime: impl Into<String>,
        duration_secs: u32,
    ) -> Option<ClipId> {
        if !self.can_add_more_clips() {
            tracing::debug!(max_clips = self.max_clips, "clip rejected: accumulator full");
            return None;
        }
        let mime = mime.into();
        let handle = self.arena.insert(bytes, mime.clone());
        let id = ClipId(self.next_id);
        self.next_id += 1;
        self.total_secs = self.total_secs.saturating_add(duration_secs);
        self.clips.push(Clip {
            id,
            handle,
            duration_secs,
            mime,
        });
        tracing::info!(
            clip_id = %id,
            duration_secs,
            total_secs = self.total_secs,
            clips = self.clips.len(),
            "clip added"
        );
        Some(id)
    }

    /// Pop and release the most recent clip.
    pub fn remove_last(&mut self) -> Option<Clip> {
        let clip = self.clips.pop()?;
        self.arena.release(clip.handle);
        self.total_secs = self.total_secs.saturating_sub(clip.duration_secs);
        tracing::info!(
            clip_id = %clip.id,
            duration_secs = clip.duration_secs,
            total_secs = self.total_secs,
            "clip removed"
        );
        Some(clip)
    }

    /// Release every clip and the preview, if any.
    pub fn discard_all(&mut self) {
        let n = self.clips.len();
        for clip in self.clips.drain(..) {
            self.arena.release(clip.handle);
        }
        self.total_secs = 0;
        self.discard_preview();
        if n > 0 {
            tracing::info!(clips = n, "all clips discarded");
        }
    }

    /// `max_duration - total`. Non-positive means recording is disallowed.
    pub fn remaining_budget(&self, max_duration_secs: u32) -> i64 {
        i64::from(max_duration_secs) - i64::from(self.total_secs)
    }

    pub fn total_duration(&self) -> u32 {
        self.total_secs
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn clip_bytes(&self, id: ClipId) -> Option<Arc<[u8]>> {
        let clip = self.clips.iter().find(|c| c.id == id)?;
        self.arena.get(clip.handle).map(|m| m.bytes.clone())
    }

    /// Store the combined artifact, replacing (and releasing) any previous one.
    pub fn set_preview(
        &mut self,
        bytes: impl Into<Arc<[u8]>>,
        mime: impl Into<String>,
        degraded: bool,
    ) -> &Artifact {
        self.discard_preview();
        let bytes: Arc<[u8]> = bytes.into();
        let mime = mime.into();
        let byte_len = bytes.len();
        let handle = self.arena.insert(bytes, mime.clone());
        self.preview.insert(Artifact {
            handle,
            mime,
            byte_len,
            degraded,
        })
    }

    pub fn preview(&self) -> Option<&Artifact> {
        self.preview.as_ref()
    }

    pub fn preview_bytes(&self) -> Option<Arc<[u8]>> {
        let p = self.preview.as_ref()?;
        self.arena.get(p.handle).map(|m| m.bytes.clone())
    }

    /// Release the preview. Clips are kept.
    pub fn discard_preview(&mut self) -> bool {
        match self.preview.take() {
            Some(p) => self.arena.release(p.handle).is_some(),
            None => false,
        }
    }

    pub fn arena_stats(&self) -> ArenaStats {
        self.arena.stats()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/clips.rs"]
mod tests;
