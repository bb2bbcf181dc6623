use std::fmt::Debug;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::{
    buffer::{BufferArena, BufferId},
    error::{QueueError, Result, Violation},
    handler::BufferHandler,
    miniqueue::MiniQueue,
    slot::{PullSlot, PushSlot},
    wait::{CANCEL_POLL_INTERVAL, Wait},
};

/// Single-producer/single-consumer queue of typed, reusable buffers.
///
/// Buffers move through three internal lists:
///
/// ```text
///            push_begin         push_end            pull_begin        pull_end
///   free ──► [pushed slot] ──► filled ──► [pulled slot] ──► dirty
///    ▲                                                        │
///    └──────────── clean (next push_begin / detach) ◄─────────┘
/// ```
///
/// Buffers of the pooled kind (see [`Queue::preallocate`]) go back to the free
/// list after cleaning, every other buffer is deallocated. Cleanup runs on the
/// producer's thread, so resources the producer's callbacks touch never leave
/// it.
///
/// A producer can [`detach`](Queue::detach_producer) once everything it
/// published has been consumed, and another producer can attach to keep
/// feeding the same consumer.
pub struct Queue<K, T>
where
    K: Copy + PartialEq + Debug,
{
    state: Mutex<State<K, T>>,
    cond: Condvar,
}

struct Session<K, T> {
    id: u64,
    handler: Box<dyn BufferHandler<K, T> + Send>,
    pooled: Option<K>,
}

struct State<K, T> {
    arena: BufferArena<K, T>,
    free: MiniQueue,
    filled: MiniQueue,
    dirty: MiniQueue,
    pushed: Option<BufferId>,
    pulled: Option<BufferId>,
    session: Option<Session<K, T>>,
    sessions: u64,
    allocated: u64,
    deallocated: u64,
}

/// Snapshot of the queue bookkeeping, see [`Queue::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub free: usize,
    pub filled: usize,
    pub dirty: usize,
    pub pushing: bool,
    pub pulling: bool,
    /// Buffers created through `allocate` since the queue was created.
    pub allocated: u64,
    /// Buffers destroyed through `deallocate` since the queue was created.
    pub deallocated: u64,
    pub attached: bool,
}

impl QueueStats {
    /// Number of buffers currently owned by the queue, in any list or slot.
    pub fn live(&self) -> usize {
        self.free + self.filled + self.dirty + self.pushing as usize + self.pulling as usize
    }
}

impl<K, T> State<K, T>
where
    K: Copy + PartialEq + Debug,
{
    fn new() -> Self {
        Self {
            arena: BufferArena::new(),
            free: MiniQueue::new(),
            filled: MiniQueue::new(),
            dirty: MiniQueue::new(),
            pushed: None,
            pulled: None,
            session: None,
            sessions: 0,
            allocated: 0,
            deallocated: 0,
        }
    }

    fn allocate(&mut self, kind: K) -> Result<BufferId> {
        let session = self.session.as_mut().ok_or(Violation::NotAttached)?;
        let payload = session.handler.allocate(kind);
        self.allocated += 1;
        Ok(self.arena.insert(kind, payload))
    }

    /// Runs every released buffer through `clean`, then recycles pooled
    /// buffers and deallocates the rest.
    fn clean_dirty(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        while let Some(id) = self.dirty.pull(&mut self.arena) {
            let buffer = self.arena.get_mut(id);
            let kind = buffer.kind;
            if let Some(payload) = buffer.payload.as_mut() {
                session.handler.clean(kind, payload);
            }

            if session.pooled == Some(kind) {
                self.free.push(&mut self.arena, id);
            } else {
                release(&mut self.arena, id, session);
                self.deallocated += 1;
            }
        }
    }

    fn release_free(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        while let Some(id) = self.free.pull(&mut self.arena) {
            release(&mut self.arena, id, session);
            self.deallocated += 1;
        }
    }

    /// Hands every buffer still owned by the queue back to the attached
    /// producer, without waiting for the consumer.
    fn teardown(&mut self) {
        self.clean_dirty();
        if let Some(session) = self.session.as_mut() {
            while let Some(id) = self.filled.pull(&mut self.arena) {
                release(&mut self.arena, id, session);
                self.deallocated += 1;
            }
        }
        self.release_free();
        self.session = None;
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            free: self.free.len(),
            filled: self.filled.len(),
            dirty: self.dirty.len(),
            pushing: self.pushed.is_some(),
            pulling: self.pulled.is_some(),
            allocated: self.allocated,
            deallocated: self.deallocated,
            attached: self.session.is_some(),
        }
    }
}

fn release<K: Copy, T>(
    arena: &mut BufferArena<K, T>,
    id: BufferId,
    session: &mut Session<K, T>,
) {
    let buffer = arena.remove(id);
    if let Some(payload) = buffer.payload {
        session.handler.deallocate(buffer.kind, payload);
    }
}

impl<K, T> Queue<K, T>
where
    K: Copy + PartialEq + Debug,
{
    /// Creates an empty queue with no producer attached.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<K, T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until `ready` holds. The lock is released while waiting and
    /// `ready` is re-evaluated after every wake-up, since one condition
    /// variable serves every wait reason.
    fn wait_until<'a, F>(
        &'a self,
        mut state: MutexGuard<'a, State<K, T>>,
        wait: &Wait,
        mut ready: F,
    ) -> Result<MutexGuard<'a, State<K, T>>>
    where
        F: FnMut(&mut State<K, T>) -> bool,
    {
        loop {
            if ready(&mut *state) {
                return Ok(state);
            }
            if wait.is_cancelled() {
                return Err(QueueError::Cancelled);
            }

            let now = Instant::now();
            let mut timeout = match wait.deadline() {
                Some(deadline) if deadline <= now => return Err(QueueError::TimedOut),
                Some(deadline) => Some(deadline - now),
                None => None,
            };
            if wait.is_cancellable() {
                timeout = Some(
                    timeout.map_or(CANCEL_POLL_INTERVAL, |t| t.min(CANCEL_POLL_INTERVAL)),
                );
            }

            state = match timeout {
                Some(timeout) => {
                    self.cond
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.cond.wait(state).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Starts a producer session. Only one producer may be attached at a
    /// time.
    pub fn attach_producer<H>(&self, handler: H) -> Result<()>
    where
        H: BufferHandler<K, T> + Send + 'static,
    {
        let mut state = self.lock();
        if state.session.is_some() {
            return Err(Violation::AlreadyAttached.into());
        }

        state.sessions += 1;
        let id = state.sessions;
        state.session = Some(Session {
            id,
            handler: Box::new(handler),
            pooled: None,
        });
        log::debug!("queue: producer session {} attached", id);
        Ok(())
    }

    /// Allocates `count` buffers of `kind` into the free list and makes
    /// `kind` the pooled kind of the current session.
    pub fn preallocate(&self, count: usize, kind: K) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let session = state.session.as_mut().ok_or(Violation::NotAttached)?;
        if session.pooled.is_some() || !state.free.is_empty() {
            return Err(Violation::AlreadyPreallocated.into());
        }
        if count == 0 {
            return Err(Violation::EmptyPool.into());
        }
        if state.pushed.is_some() {
            return Err(Violation::PushInFlight.into());
        }

        session.pooled = Some(kind);
        let session_id = session.id;
        for _ in 0..count {
            let id = state.allocate(kind)?;
            state.free.push(&mut state.arena, id);
        }
        log::debug!(
            "queue: session {} preallocated {} buffers of {:?}",
            session_id,
            count,
            kind
        );
        Ok(())
    }

    /// Ends the producer session once everything published has been consumed
    /// and released. Remaining buffers are cleaned and deallocated through
    /// the detaching producer's callbacks.
    pub fn detach_producer(&self) -> Result<()> {
        self.detach_producer_with(&Wait::forever())
    }

    pub fn detach_producer_with(&self, wait: &Wait) -> Result<()> {
        let state = self.lock();
        if state.session.is_none() {
            return Err(Violation::NotAttached.into());
        }
        if state.pushed.is_some() {
            return Err(Violation::PushInFlight.into());
        }

        let mut state = self.wait_until(state, wait, |state| {
            state.filled.is_empty() && state.pulled.is_none()
        })?;
        state.clean_dirty();
        state.release_free();
        if let Some(session) = state.session.take() {
            log::debug!(
                "queue: producer session {} detached ({} allocated, {} deallocated)",
                session.id,
                state.allocated,
                state.deallocated
            );
        }
        drop(state);

        self.cond.notify_all();
        Ok(())
    }

    /// Acquires a writable buffer of `kind`.
    ///
    /// A buffer of the pooled kind comes from the free list, waiting for the
    /// consumer to release one if the pool is exhausted. Any other kind is
    /// allocated on the spot.
    pub fn push_begin(&self, kind: K) -> Result<PushSlot<'_, K, T>> {
        self.push_begin_with(kind, &Wait::forever())
    }

    pub fn push_begin_with(&self, kind: K, wait: &Wait) -> Result<PushSlot<'_, K, T>> {
        let mut state = self.lock();
        let session = state.session.as_ref().ok_or(Violation::NotAttached)?;
        let pooled = session.pooled == Some(kind);
        if state.pushed.is_some() {
            return Err(Violation::PushInFlight.into());
        }

        state.clean_dirty();
        let mut guard = if pooled {
            self.wait_until(state, wait, |state| {
                state.clean_dirty();
                !state.free.is_empty()
            })?
        } else {
            state
        };

        let state = &mut *guard;
        let recycled = if pooled {
            state.free.pull(&mut state.arena)
        } else {
            None
        };
        let id = match recycled {
            Some(id) => id,
            None => state.allocate(kind)?,
        };
        let Some(payload) = state.arena.get_mut(id).payload.take() else {
            unreachable!("queued buffer without payload");
        };
        state.pushed = Some(id);

        Ok(PushSlot::new(self, id, kind, payload))
    }

    /// Publishes a buffer acquired with [`Queue::push_begin`].
    pub fn push_end(&self, mut slot: PushSlot<'_, K, T>) -> Result<()> {
        if !std::ptr::eq(slot.queue(), self) {
            return Err(Violation::ForeignSlot.into());
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        if state.pushed != Some(slot.id()) {
            return Err(Violation::NoPushInFlight.into());
        }

        state.arena.get_mut(slot.id()).payload = slot.take_payload();
        state.pushed = None;
        state.filled.push(&mut state.arena, slot.id());
        drop(guard);

        self.cond.notify_all();
        Ok(())
    }

    /// Returns an acquired but unpublished buffer to the dirty list, so the
    /// next cleanup pass recycles it.
    pub(crate) fn abandon_push(&self, id: BufferId, payload: T) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.pushed != Some(id) {
            return;
        }

        log::debug!("queue: unpublished {:?} buffer abandoned", state.arena.get(id).kind);
        state.arena.get_mut(id).payload = Some(payload);
        state.pushed = None;
        state.dirty.push(&mut state.arena, id);
        drop(guard);

        self.cond.notify_all();
    }

    /// Takes the oldest published buffer, waiting until one is available.
    /// Its kind is available through [`PullSlot::kind`].
    pub fn pull_begin(&self) -> Result<PullSlot<'_, K, T>> {
        self.pull_begin_with(&Wait::forever())
    }

    pub fn pull_begin_with(&self, wait: &Wait) -> Result<PullSlot<'_, K, T>> {
        let state = self.lock();
        if state.pulled.is_some() {
            return Err(Violation::PullInFlight.into());
        }

        let mut guard = self.wait_until(state, wait, |state| !state.filled.is_empty())?;
        let state = &mut *guard;
        let Some(id) = state.filled.pull(&mut state.arena) else {
            unreachable!("filled list checked non-empty");
        };
        let buffer = state.arena.get_mut(id);
        let kind = buffer.kind;
        let Some(payload) = buffer.payload.take() else {
            unreachable!("queued buffer without payload");
        };
        state.pulled = Some(id);

        Ok(PullSlot::new(self, id, kind, payload))
    }

    /// Releases a buffer acquired with [`Queue::pull_begin`]. The producer
    /// cleans it on its next `push_begin` or when it detaches.
    pub fn pull_end(&self, mut slot: PullSlot<'_, K, T>) -> Result<()> {
        if !std::ptr::eq(slot.queue(), self) {
            return Err(Violation::ForeignSlot.into());
        }
        match slot.take_payload() {
            Some(payload) => self.release_pull(slot.id(), payload),
            None => Err(Violation::NoPullInFlight.into()),
        }
    }

    pub(crate) fn release_pull(&self, id: BufferId, payload: T) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.pulled != Some(id) {
            return Err(Violation::NoPullInFlight.into());
        }

        state.arena.get_mut(id).payload = Some(payload);
        state.pulled = None;
        state.dirty.push(&mut state.arena, id);
        drop(guard);

        self.cond.notify_all();
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.lock().session.is_some()
    }

    /// The kind preallocated by the current producer, if any.
    pub fn pooled_kind(&self) -> Option<K> {
        self.lock().session.as_ref().and_then(|s| s.pooled)
    }

    pub fn stats(&self) -> QueueStats {
        self.lock().stats()
    }
}

impl<K, T> Default for Queue<K, T>
where
    K: Copy + PartialEq + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> Drop for Queue<K, T>
where
    K: Copy + PartialEq + Debug,
{
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = state.session.as_ref() {
            log::debug!("queue: dropped with producer session {} attached", session.id);
        }
        state.teardown();
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
