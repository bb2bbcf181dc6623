//! Minimal FIFO over buffer nodes linked through [`Buffer::next`].
//!
//! [`Buffer::next`]: crate::buffer::Buffer

use crate::buffer::{BufferArena, BufferId};

#[derive(Debug, Default)]
pub(crate) struct MiniQueue {
    head: Option<BufferId>,
    tail: Option<BufferId>,
    len: usize,
}

impl MiniQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<K, T>(&mut self, arena: &mut BufferArena<K, T>, id: BufferId) {
        arena.get_mut(id).next = None;
        match self.tail {
            Some(tail) => arena.get_mut(tail).next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
    }

    pub fn pull<K, T>(&mut self, arena: &mut BufferArena<K, T>) -> Option<BufferId> {
        let head = self.head?;
        self.head = arena.get_mut(head).next.take();
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(head)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}
