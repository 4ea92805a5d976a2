use std::sync::Arc;

/// Opaque, revocable reference to a buffer owned by a [`MediaArena`].
///
/// Handles are generational: once released, a handle never resolves again even if its slot is
/// reused by a later insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    slot: u32,
    generation: u32,
}

/// Immutable encoded media stored in the arena.
#[derive(Clone, Debug)]
pub struct StoredMedia {
    /// Encoded bytes. Never mutated in place.
    pub bytes: Arc<[u8]>,
    /// Container MIME type.
    pub mime: String,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<StoredMedia>,
}

/// Arena snapshot counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Buffers currently resolvable.
    pub live: usize,
    /// Sum of live buffer sizes.
    pub live_bytes: usize,
    /// Total insertions over the arena lifetime.
    pub inserted: u64,
    /// Total successful releases over the arena lifetime.
    pub released: u64,
}

/// Owning store of encoded media buffers keyed by [`BufferHandle`].
#[derive(Debug, Default)]
pub struct MediaArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    stats: ArenaStats,
}

impl MediaArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bytes: impl Into<Arc<[u8]>>, mime: impl Into<String>) -> BufferHandle {
        let media = StoredMedia {
            bytes: bytes.into(),
            mime: mime.into(),
        };
        self.stats.live += 1;
        self.stats.live_bytes = self.stats.live_bytes.saturating_add(media.bytes.len());
        self.stats.inserted += 1;

        if let Some(slot) = self.free.pop() {
            let s = &mut self.slots[slot as usize];
            s.entry = Some(media);
            return BufferHandle {
                slot,
                generation: s.generation,
            };
        }

        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(media),
        });
        BufferHandle {
            slot,
            generation: 0,
        }
    }

    pub fn get(&self, handle: BufferHandle) -> Option<&StoredMedia> {
        let s = self.slots.get(handle.slot as usize)?;
        if s.generation != handle.generation {
            return None;
        }
        s.entry.as_ref()
    }

    pub fn contains(&self, handle: BufferHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Release the buffer behind `handle`.
    ///
    /// Returns the released media on the first call; later calls with the same handle return
    /// `None`.
    pub fn release(&mut self, handle: BufferHandle) -> Option<StoredMedia> {
        let s = self.slots.get_mut(handle.slot as usize)?;
        if s.generation != handle.generation {
            return None;
        }
        let media = s.entry.take()?;
        s.generation = s.generation.wrapping_add(1);
        self.free.push(handle.slot);

        self.stats.live -= 1;
        self.stats.live_bytes = self.stats.live_bytes.saturating_sub(media.bytes.len());
        self.stats.released += 1;
        Some(media)
    }

    pub fn stats(&self) -> ArenaStats {
        self.stats
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/arena.rs"]
mod tests;
