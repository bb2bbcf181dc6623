/// Index of a buffer node inside a [`BufferArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct BufferId(usize);

/// A tagged buffer node.
///
/// `payload` is `None` while the buffer is held by an in-flight push or pull
/// slot, which owns the value for the duration of the operation.
pub(crate) struct Buffer<K, T> {
    pub kind: K,
    pub payload: Option<T>,
    pub next: Option<BufferId>,
}

/// Storage for every buffer node the queue knows about. Lists link nodes
/// through [`Buffer::next`] and never own them.
pub(crate) struct BufferArena<K, T> {
    slots: Vec<Option<Buffer<K, T>>>,
    vacant: Vec<usize>,
}

impl<K, T> BufferArena<K, T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
        }
    }

    pub fn insert(&mut self, kind: K, payload: T) -> BufferId {
        let buffer = Buffer {
            kind,
            payload: Some(payload),
            next: None,
        };
        match self.vacant.pop() {
            Some(index) => {
                self.slots[index] = Some(buffer);
                BufferId(index)
            }
            None => {
                self.slots.push(Some(buffer));
                BufferId(self.slots.len() - 1)
            }
        }
    }

    /// Removes the node and returns it, freeing its index for reuse.
    pub fn remove(&mut self, id: BufferId) -> Buffer<K, T> {
        let buffer = self.slots[id.0]
            .take()
            .unwrap_or_else(|| panic!("buffer {:?} is not live", id));
        self.vacant.push(id.0);
        buffer
    }

    pub fn get(&self, id: BufferId) -> &Buffer<K, T> {
        self.slots[id.0]
            .as_ref()
            .unwrap_or_else(|| panic!("buffer {:?} is not live", id))
    }

    pub fn get_mut(&mut self, id: BufferId) -> &mut Buffer<K, T> {
        self.slots[id.0]
            .as_mut()
            .unwrap_or_else(|| panic!("buffer {:?} is not live", id))
    }

    pub fn live(&self) -> usize {
        self.slots.len() - self.vacant.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reuses_vacant_index() {
        let mut arena = BufferArena::new();
        let a = arena.insert('a', 1);
        let b = arena.insert('b', 2);
        assert_eq!(arena.live(), 2);

        let removed = arena.remove(a);
        assert_eq!(removed.kind, 'a');
        assert_eq!(removed.payload, Some(1));
        assert_eq!(arena.live(), 1);

        let c = arena.insert('c', 3);
        assert_eq!(c, a);
        assert_eq!(arena.get(b).payload, Some(2));
        assert_eq!(arena.get(c).kind, 'c');
    }

    #[test]
    #[should_panic(expected = "is not live")]
    fn test_get_removed_panics() {
        let mut arena = BufferArena::new();
        let a = arena.insert(0u8, ());
        arena.remove(a);
        let _ = arena.get(a);
    }
}
