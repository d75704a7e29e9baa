/// Holds the current and previous snapshot of one source.
///
/// Pushing overwrites the older slot and flips the head, so the pair is
/// always `(previous, current)` without reallocating.
#[derive(Debug, Clone)]
pub struct SnapshotRing<T> {
    slots: [Option<T>; 2],
    head: usize,
}

impl<T> Default for SnapshotRing<T> {
    fn default() -> Self {
        SnapshotRing {
            slots: [None, None],
            head: 1,
        }
    }
}

impl<T> SnapshotRing<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: T) {
        self.head ^= 1;
        self.slots[self.head] = Some(value);
    }

    pub fn current(&self) -> Option<&T> {
        self.slots[self.head].as_ref()
    }

    pub fn previous(&self) -> Option<&T> {
        self.slots[self.head ^ 1].as_ref()
    }

    /// Drops both slots so the next push starts over as a first sample.
    pub fn clear(&mut self) {
        self.slots = [None, None];
        self.head = 1;
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
