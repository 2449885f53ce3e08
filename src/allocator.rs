use crate::{config::MAX_POLYPHONY, voice::VoiceId};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AllocatorError {
    #[error("the free channel queue is already full")]
    QueueFull,
    #[error("voice {0} is outside the polyphony limit")]
    OutOfRange(VoiceId),
    #[error("voice {0} is not checked out")]
    NotCheckedOut(VoiceId),
    #[error("voice {0} has been played and comes back when its release ends")]
    Playing(VoiceId),
}

/// Hands out voice ids in first-in, first-out order.
///
/// A released id goes to the back of the queue, so the voice that finished
/// longest ago is reused first. Lives on the control side only.
#[derive(Clone, Debug)]
pub struct ChannelAllocator {
    queue: [u8; MAX_POLYPHONY],
    read_idx: usize,
    len: usize,
    limit: u8,
    /// Bit `i` is set while voice `i + 1` sits in the queue.
    free: u32,
}

impl ChannelAllocator {
    /// Creates an allocator for voices `1..=limit`, all of them free.
    /// `limit` is clamped to `1..=MAX_POLYPHONY`.
    pub fn new(limit: u8) -> Self {
        let mut allocator = Self {
            queue: [0; MAX_POLYPHONY],
            read_idx: 0,
            len: 0,
            limit: limit.clamp(1, MAX_POLYPHONY as u8),
            free: 0,
        };
        allocator.reset();
        allocator
    }

    /// Marks every voice free again, queued in ascending order.
    pub fn reset(&mut self) {
        for (slot, id) in self.queue.iter_mut().zip(1..=self.limit) {
            *slot = id;
        }
        self.read_idx = 0;
        self.len = self.limit as usize;
        self.free = u32::MAX >> (32 - self.limit as u32);
    }

    /// Takes the oldest free voice, or `None` when every voice is in use.
    pub fn acquire(&mut self) -> Option<VoiceId> {
        if self.len == 0 {
            return None;
        }
        let id = VoiceId::new(self.queue[self.read_idx])?;
        self.read_idx = (self.read_idx + 1) % self.capacity();
        self.len -= 1;
        self.free &= !bit(id);
        Some(id)
    }

    /// Returns a voice to the back of the queue.
    pub fn release(&mut self, id: VoiceId) -> Result<(), AllocatorError> {
        if id.get() > self.limit {
            return Err(AllocatorError::OutOfRange(id));
        }
        if self.len == self.capacity() {
            return Err(AllocatorError::QueueFull);
        }
        if self.free & bit(id) != 0 {
            return Err(AllocatorError::NotCheckedOut(id));
        }
        let write_idx = (self.read_idx + self.len) % self.capacity();
        self.queue[write_idx] = id.get();
        self.len += 1;
        self.free |= bit(id);
        Ok(())
    }

    /// Number of voices ready to be acquired.
    pub fn available(&self) -> usize {
        self.len
    }

    pub fn limit(&self) -> u8 {
        self.limit
    }

    pub fn is_free(&self, id: VoiceId) -> bool {
        id.get() <= self.limit && self.free & bit(id) != 0
    }

    fn capacity(&self) -> usize {
        self.limit as usize
    }
}

fn bit(id: VoiceId) -> u32 {
    1 << id.index()
}
