//! A table with one slot per sequence number.

use std::fmt;

use seqlink_protocol::SequenceNumber;

/// Fixed table of 65536 optional datagrams, indexed directly by sequence
/// number.
///
/// Lookups are O(1) with no hashing. Each slot owns its datagram; putting a
/// new one into an occupied slot hands the old one back to the caller
/// rather than leaking or silently dropping it.
pub struct SlotTable {
    slots: Box<[Option<Box<[u8]>>]>,
    occupied: usize,
}

impl SlotTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            slots: vec![None; SequenceNumber::SPACE].into_boxed_slice(),
            occupied: 0,
        }
    }

    /// Stores `datagram` at `seq`, returning whatever was there before.
    pub fn insert(
        &mut self,
        seq: SequenceNumber,
        datagram: Box<[u8]>,
    ) -> Option<Box<[u8]>> {
        let previous = self.slots[seq.index()].replace(datagram);
        if previous.is_none() {
            self.occupied += 1;
        }
        previous
    }

    /// Removes and returns the datagram at `seq`.
    pub fn take(&mut self, seq: SequenceNumber) -> Option<Box<[u8]>> {
        let taken = self.slots[seq.index()].take();
        if taken.is_some() {
            self.occupied -= 1;
        }
        taken
    }

    /// Borrows the datagram at `seq` without removing it.
    pub fn get(&self, seq: SequenceNumber) -> Option<&[u8]> {
        self.slots[seq.index()].as_deref()
    }

    /// Whether a datagram is stored at `seq`.
    pub fn contains(&self, seq: SequenceNumber) -> bool {
        self.slots[seq.index()].is_some()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.occupied
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SlotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotTable")
            .field("occupied", &self.occupied)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(n: u16) -> SequenceNumber {
        SequenceNumber(n)
    }

    fn bytes(data: &[u8]) -> Box<[u8]> {
        data.to_vec().into_boxed_slice()
    }

    #[test]
    fn test_new_table_is_empty() {
        let table = SlotTable::new();
        assert!(table.is_empty());
        assert!(!table.contains(seq(0)));
        assert!(table.get(seq(65535)).is_none());
    }

    #[test]
    fn test_insert_get_take() {
        let mut table = SlotTable::new();
        assert!(table.insert(seq(65535), bytes(b"last")).is_none());

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(seq(65535)), Some(&b"last"[..]));

        let taken = table.take(seq(65535)).unwrap();
        assert_eq!(&*taken, b"last");
        assert!(table.is_empty());
    }

    #[test]
    fn test_insert_occupied_returns_previous_and_keeps_count() {
        let mut table = SlotTable::new();
        table.insert(seq(9), bytes(b"first"));

        let previous = table.insert(seq(9), bytes(b"second"));

        assert_eq!(previous.as_deref(), Some(&b"first"[..]));
        assert_eq!(table.len(), 1, "replacement must not grow the table");
        assert_eq!(table.get(seq(9)), Some(&b"second"[..]));
    }

    #[test]
    fn test_take_empty_slot_is_noop() {
        let mut table = SlotTable::new();
        assert!(table.take(seq(3)).is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_debug_does_not_dump_slots() {
        let table = SlotTable::new();
        let text = format!("{table:?}");
        assert!(text.contains("occupied: 0"));
        assert!(text.len() < 64);
    }
}
