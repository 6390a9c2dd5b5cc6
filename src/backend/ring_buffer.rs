/// A fixed capacity circular queue over a preallocated array of slots.
///
/// The head and tail are ever increasing sequence numbers; the slot of a sequence
/// number is the sequence modulo the capacity. This keeps all the arithmetic
/// unsigned: walking backwards is done over the sequence range, never by
/// decrementing an index.
pub(crate) struct RingBuffer<T> {
    slots: Vec<T>,
    // everything before this point has been popped.
    head: u64,
    tail: u64,
}

impl<T> RingBuffer<T> {
    pub(crate) fn new(capacity: u16, mut init: impl FnMut(u16) -> T) -> Self {
        assert!(capacity > 0, "RingBuffer: capacity must be larger than 0");

        let mut slots = Vec::with_capacity(capacity as usize);
        for k in 0..capacity {
            slots.push(init(k));
        }

        Self { slots, head: 0, tail: 0 }
    }

    fn to_index(&self, seq: u64) -> u16 {
        (seq % self.slots.len() as u64) as u16
    }

    pub(crate) fn capacity(&self) -> u16 {
        self.slots.len() as u16
    }

    pub(crate) fn len(&self) -> u16 {
        (self.tail - self.head) as u16
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Appends a value at the tail and returns the slot it landed in.
    pub(crate) fn push_back(&mut self, value: T) -> u16 {
        assert!(!self.is_full(), "RingBuffer: can't push_back when full");

        let index = self.to_index(self.tail);
        self.slots[index as usize] = value;
        self.tail += 1;
        index
    }

    /// Removes the head and returns the slot it occupied.
    pub(crate) fn pop_front(&mut self) -> u16 {
        assert!(!self.is_empty(), "RingBuffer: can't pop_front when empty");

        let index = self.to_index(self.head);
        self.head += 1;
        index
    }

    pub(crate) fn front(&self) -> Option<u16> {
        if self.is_empty() {
            None
        } else {
            Some(self.to_index(self.head))
        }
    }

    pub(crate) fn get(&self, index: u16) -> &T {
        &self.slots[index as usize]
    }

    pub(crate) fn get_mut(&mut self, index: u16) -> &mut T {
        &mut self.slots[index as usize]
    }

    /// The number of entries between the head and the given slot, or None if
    /// the slot isn't part of the occupied window.
    pub(crate) fn distance_from_head(&self, index: u16) -> Option<u16> {
        let capacity = self.slots.len() as u64;
        if index as u64 >= capacity {
            return None;
        }

        let head_index = self.head % capacity;
        let distance = (index as u64 + capacity - head_index) % capacity;
        if distance < self.len() as u64 {
            Some(distance as u16)
        } else {
            None
        }
    }

    /// The occupied slots from the oldest to the youngest.
    pub(crate) fn iter_from_head(&self) -> impl Iterator<Item=u16> + '_ {
        (self.head..self.tail).map(move |seq| self.to_index(seq))
    }

    /// The occupied slots from the youngest to the oldest.
    pub(crate) fn iter_back_from_tail(&self) -> impl Iterator<Item=u16> + '_ {
        (self.head..self.tail).rev().map(move |seq| self.to_index(seq))
    }

    /// The occupied slots strictly older than `index`, nearest first.
    pub(crate) fn iter_back_from(&self, index: u16) -> impl Iterator<Item=u16> + '_ {
        let distance = self.distance_from_head(index)
            .unwrap_or_else(|| panic!("RingBuffer: slot {} is not occupied", index));
        let seq = self.head + distance as u64;
        (self.head..seq).rev().map(move |seq| self.to_index(seq))
    }

    /// Drops everything after the head; returns the slots that were discarded,
    /// youngest first.
    pub(crate) fn truncate_to_head(&mut self) -> Vec<u16> {
        let discarded: Vec<u16> = self.iter_back_from_tail().collect();
        self.tail = self.head;
        discarded
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ring(capacity: u16) -> RingBuffer<u32> {
        RingBuffer::new(capacity, |_| 0)
    }

    #[test]
    fn test_push_pop_wraps_around() {
        let mut ring = ring(3);
        assert_eq!(ring.push_back(1), 0);
        assert_eq!(ring.push_back(2), 1);
        assert_eq!(ring.pop_front(), 0);
        assert_eq!(ring.push_back(3), 2);
        assert_eq!(ring.push_back(4), 0);
        assert!(ring.is_full());
        assert_eq!(*ring.get(0), 4);
        assert_eq!(ring.front(), Some(1));
    }

    #[test]
    fn test_iteration_order_after_wrap() {
        let mut ring = ring(4);
        for v in 0..4 {
            ring.push_back(v);
        }
        ring.pop_front();
        ring.pop_front();
        ring.push_back(4);

        assert_eq!(ring.iter_from_head().collect::<Vec<_>>(), vec![2, 3, 0]);
        assert_eq!(ring.iter_back_from_tail().collect::<Vec<_>>(), vec![0, 3, 2]);
        assert_eq!(ring.iter_back_from(0).collect::<Vec<_>>(), vec![3, 2]);
        assert_eq!(ring.iter_back_from(2).count(), 0);
    }

    #[test]
    fn test_distance_from_head() {
        let mut ring = ring(4);
        for v in 0..3 {
            ring.push_back(v);
        }
        ring.pop_front();
        ring.push_back(3);
        ring.push_back(4);

        assert_eq!(ring.distance_from_head(1), Some(0));
        assert_eq!(ring.distance_from_head(0), Some(3));
        assert_eq!(ring.distance_from_head(7), None);
    }

    #[test]
    fn test_distance_outside_window() {
        let mut ring = ring(4);
        ring.push_back(1);
        assert_eq!(ring.distance_from_head(2), None);
    }

    #[test]
    fn test_truncate_to_head() {
        let mut ring = ring(4);
        for v in 0..3 {
            ring.push_back(v);
        }
        ring.pop_front();

        assert_eq!(ring.truncate_to_head(), vec![2, 1]);
        assert!(ring.is_empty());
        assert_eq!(ring.front(), None);
        // the next push continues where the head is
        assert_eq!(ring.push_back(9), 1);
    }

    #[test]
    #[should_panic(expected = "can't pop_front when empty")]
    fn test_pop_empty_panics() {
        ring(2).pop_front();
    }
}
