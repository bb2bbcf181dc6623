/// Buffer lifecycle callbacks supplied by a producer when it attaches.
///
/// All three methods run on the producer's thread (inside `preallocate`,
/// `push_begin` and `detach_producer`) while the queue lock is held, so they
/// must not call back into the queue.
pub trait BufferHandler<K, T> {
    /// Creates the payload for a new buffer of `kind`.
    fn allocate(&mut self, kind: K) -> T;

    /// Prepares a buffer the consumer has released for reuse or
    /// deallocation.
    fn clean(&mut self, kind: K, payload: &mut T) {
        let _ = (kind, payload);
    }

    /// Destroys a buffer that is not returned to the pool.
    fn deallocate(&mut self, kind: K, payload: T) {
        let _ = kind;
        drop(payload);
    }
}

/// A [`BufferHandler`] built from three closures.
pub struct Callbacks<A, C, D> {
    allocate: A,
    clean: C,
    deallocate: D,
}

impl<A, C, D> Callbacks<A, C, D> {
    pub fn new(allocate: A, clean: C, deallocate: D) -> Self {
        Self {
            allocate,
            clean,
            deallocate,
        }
    }
}

impl<K, T, A, C, D> BufferHandler<K, T> for Callbacks<A, C, D>
where
    A: FnMut(K) -> T,
    C: FnMut(K, &mut T),
    D: FnMut(K, T),
{
    fn allocate(&mut self, kind: K) -> T {
        (self.allocate)(kind)
    }

    fn clean(&mut self, kind: K, payload: &mut T) {
        (self.clean)(kind, payload)
    }

    fn deallocate(&mut self, kind: K, payload: T) {
        (self.deallocate)(kind, payload)
    }
}
