use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

use crate::{buffer::BufferId, queue::Queue};

/// A buffer acquired by the producer with [`Queue::push_begin`].
///
/// Hand it to [`Queue::push_end`] to publish it. Dropping it instead abandons
/// the buffer: it is recycled on the next cleanup pass without ever reaching
/// the consumer.
pub struct PushSlot<'a, K, T>
where
    K: Copy + PartialEq + Debug,
{
    queue: &'a Queue<K, T>,
    id: BufferId,
    kind: K,
    payload: Option<T>,
}

impl<'a, K, T> PushSlot<'a, K, T>
where
    K: Copy + PartialEq + Debug,
{
    pub(crate) fn new(queue: &'a Queue<K, T>, id: BufferId, kind: K, payload: T) -> Self {
        Self {
            queue,
            id,
            kind,
            payload: Some(payload),
        }
    }

    pub fn kind(&self) -> K {
        self.kind
    }

    pub(crate) fn queue(&self) -> &'a Queue<K, T> {
        self.queue
    }

    pub(crate) fn id(&self) -> BufferId {
        self.id
    }

    pub(crate) fn take_payload(&mut self) -> Option<T> {
        self.payload.take()
    }
}

impl<K, T> Deref for PushSlot<'_, K, T>
where
    K: Copy + PartialEq + Debug,
{
    type Target = T;

    fn deref(&self) -> &T {
        match &self.payload {
            Some(payload) => payload,
            None => unreachable!("push slot used after publishing"),
        }
    }
}

impl<K, T> DerefMut for PushSlot<'_, K, T>
where
    K: Copy + PartialEq + Debug,
{
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.payload {
            Some(payload) => payload,
            None => unreachable!("push slot used after publishing"),
        }
    }
}

impl<K, T> Drop for PushSlot<'_, K, T>
where
    K: Copy + PartialEq + Debug,
{
    fn drop(&mut self) {
        if let Some(payload) = self.payload.take() {
            self.queue.abandon_push(self.id, payload);
        }
    }
}

/// A buffer acquired by the consumer with [`Queue::pull_begin`].
///
/// Hand it to [`Queue::pull_end`] to release it; dropping it releases it as
/// well.
pub struct PullSlot<'a, K, T>
where
    K: Copy + PartialEq + Debug,
{
    queue: &'a Queue<K, T>,
    id: BufferId,
    kind: K,
    payload: Option<T>,
}

impl<'a, K, T> PullSlot<'a, K, T>
where
    K: Copy + PartialEq + Debug,
{
    pub(crate) fn new(queue: &'a Queue<K, T>, id: BufferId, kind: K, payload: T) -> Self {
        Self {
            queue,
            id,
            kind,
            payload: Some(payload),
        }
    }

    /// The kind the producer pushed this buffer with.
    pub fn kind(&self) -> K {
        self.kind
    }

    pub(crate) fn queue(&self) -> &'a Queue<K, T> {
        self.queue
    }

    pub(crate) fn id(&self) -> BufferId {
        self.id
    }

    pub(crate) fn take_payload(&mut self) -> Option<T> {
        self.payload.take()
    }
}

impl<K, T> Deref for PullSlot<'_, K, T>
where
    K: Copy + PartialEq + Debug,
{
    type Target = T;

    fn deref(&self) -> &T {
        match &self.payload {
            Some(payload) => payload,
            None => unreachable!("pull slot used after release"),
        }
    }
}

impl<K, T> DerefMut for PullSlot<'_, K, T>
where
    K: Copy + PartialEq + Debug,
{
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.payload {
            Some(payload) => payload,
            None => unreachable!("pull slot used after release"),
        }
    }
}

impl<K, T> Drop for PullSlot<'_, K, T>
where
    K: Copy + PartialEq + Debug,
{
    fn drop(&mut self) {
        if let Some(payload) = self.payload.take() {
            if let Err(e) = self.queue.release_pull(self.id, payload) {
                log::error!("queue: dropped pull slot not released: {}", e);
            }
        }
    }
}
