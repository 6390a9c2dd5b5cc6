use std::fmt;
use std::fmt::Display;
use std::ops::Range;

use crate::backend::reorder_buffer::RobIndex;
use crate::cpu::StationConfigs;
use crate::instructions::instructions::{mnemonic, Opcode, StationClass, WordType};

/// The global index of a reservation station; it doubles as the tag a waiting
/// operand carries for its producer.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub(crate) struct RsIndex(pub(crate) u16);

impl Display for RsIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rs#{}", self.0)
    }
}

/// Where the value of an operand comes from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum SourceTag {
    // the value is valid.
    Ready,
    // the value will be broadcast by this reservation station.
    Waiting(RsIndex),
    // only for loads (second operand): the loaded value has been obtained, either
    // from memory or forwarded from an older store. No further wait.
    Forwarded,
}

impl SourceTag {
    pub(crate) fn is_resolved(self) -> bool {
        !matches!(self, SourceTag::Waiting(_))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum RSState {
    IDLE,
    BUSY,
    // a store that has broadcast its result; it keeps the station until its
    // deferred memory write completes at commit.
    WRITTEN,
}

// A single reservation station
pub(crate) struct RS {
    pub(crate) index: RsIndex,
    pub(crate) state: RSState,
    pub(crate) opcode: Opcode,
    pub(crate) vj: WordType,
    pub(crate) vk: WordType,
    pub(crate) qj: SourceTag,
    pub(crate) qk: SourceTag,
    pub(crate) rob_slot_index: RobIndex,
    pub(crate) cycles_remaining: u8,
    // the offset for memory instructions, the target for BEQ/CALL.
    pub(crate) address: WordType,
    // dynamic instruction id, used for the timing records.
    pub(crate) instr_id: usize,
}

impl RS {
    fn new(index: u16) -> Self {
        Self {
            index: RsIndex(index),
            state: RSState::IDLE,
            opcode: Opcode::ADD,
            vj: 0,
            vk: 0,
            qj: SourceTag::Ready,
            qk: SourceTag::Ready,
            rob_slot_index: RobIndex(0),
            cycles_remaining: 0,
            address: 0,
            instr_id: 0,
        }
    }

    fn reset(&mut self) {
        self.state = RSState::IDLE;
        self.qj = SourceTag::Ready;
        self.qk = SourceTag::Ready;
        self.cycles_remaining = 0;
    }

    pub(crate) fn operands_resolved(&self) -> bool {
        self.qj.is_resolved() && self.qk.is_resolved()
    }

    /// The effective address of a load or store.
    pub(crate) fn effective_address(&self) -> u16 {
        self.address.wrapping_add(self.vj) as u16
    }
}

impl Display for RS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.index, mnemonic(self.opcode))?;
        match self.qj {
            SourceTag::Waiting(producer) => write!(f, "Qj={}", producer)?,
            _ => write!(f, "Vj={}", self.vj)?,
        }
        match self.qk {
            SourceTag::Waiting(producer) => write!(f, " Qk={}", producer)?,
            _ => write!(f, " Vk={}", self.vk)?,
        }
        write!(f, " {} cycles={}", self.rob_slot_index, self.cycles_remaining)
    }
}

/// The pool of reservation stations, statically partitioned per station class.
pub(crate) struct RSTable {
    pub(crate) capacity: u16,
    array: Vec<RS>,
    partitions: Vec<Range<u16>>,
}

impl RSTable {
    pub(crate) fn new(stations: &StationConfigs) -> Self {
        let mut partitions = Vec::with_capacity(StationClass::ALL.len());
        let mut start = 0;
        for class in StationClass::ALL {
            let end = start + stations.get(class).count;
            partitions.push(start..end);
            start = end;
        }

        let capacity = start;
        let mut array = Vec::with_capacity(capacity as usize);
        for i in 0..capacity {
            array.push(RS::new(i));
        }

        RSTable { capacity, array, partitions }
    }

    pub(crate) fn partition(&self, class: StationClass) -> Range<u16> {
        self.partitions[class.ordinal()].clone()
    }

    pub(crate) fn get(&self, rs_index: RsIndex) -> &RS {
        &self.array[rs_index.0 as usize]
    }

    pub(crate) fn get_mut(&mut self, rs_index: RsIndex) -> &mut RS {
        &mut self.array[rs_index.0 as usize]
    }

    /// Claims the first idle station in the partition of the class.
    pub(crate) fn allocate(&mut self, class: StationClass) -> Option<RsIndex> {
        let index = self.partition(class).find(|i| self.array[*i as usize].state == RSState::IDLE)?;
        let rs = &mut self.array[index as usize];
        rs.reset();
        rs.state = RSState::BUSY;
        Some(RsIndex(index))
    }

    pub(crate) fn deallocate(&mut self, rs_index: RsIndex) {
        let rs = &mut self.array[rs_index.0 as usize];
        debug_assert!(rs.state != RSState::IDLE, "RSTable: {} is already idle", rs_index);
        rs.reset();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item=&RS> {
        self.array.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item=&mut RS> {
        self.array.iter_mut()
    }

    pub(crate) fn busy_count(&self) -> usize {
        self.array.iter().filter(|rs| rs.state != RSState::IDLE).count()
    }

    pub(crate) fn flush(&mut self) {
        for rs in &mut self.array {
            rs.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::cpu::StationConfigs;

    use super::*;

    #[test]
    fn test_partitions_are_contiguous() {
        let table = RSTable::new(&StationConfigs::default());

        assert_eq!(table.capacity, 13);
        assert_eq!(table.partition(StationClass::Load), 0..2);
        assert_eq!(table.partition(StationClass::Store), 2..3);
        assert_eq!(table.partition(StationClass::Branch), 3..5);
        assert_eq!(table.partition(StationClass::CallReturn), 5..6);
        assert_eq!(table.partition(StationClass::AddSub), 6..10);
        assert_eq!(table.partition(StationClass::Nand), 10..12);
        assert_eq!(table.partition(StationClass::Mul), 12..13);
    }

    #[test]
    fn test_allocate_stays_within_partition() {
        let mut table = RSTable::new(&StationConfigs::default());

        assert_eq!(table.allocate(StationClass::Load), Some(RsIndex(0)));
        assert_eq!(table.allocate(StationClass::Load), Some(RsIndex(1)));
        assert_eq!(table.allocate(StationClass::Load), None);
        // other partitions are unaffected
        assert_eq!(table.allocate(StationClass::Store), Some(RsIndex(2)));

        table.deallocate(RsIndex(0));
        assert_eq!(table.allocate(StationClass::Load), Some(RsIndex(0)));
    }

    #[test]
    fn test_flush_frees_all() {
        let mut table = RSTable::new(&StationConfigs::default());
        table.allocate(StationClass::Mul);
        table.allocate(StationClass::AddSub);
        let store = table.allocate(StationClass::Store).unwrap();
        table.get_mut(store).state = RSState::WRITTEN;
        assert_eq!(table.busy_count(), 3);

        table.flush();
        assert_eq!(table.busy_count(), 0);
    }

    #[test]
    fn test_operands_resolved() {
        let mut table = RSTable::new(&StationConfigs::default());
        let index = table.allocate(StationClass::Load).unwrap();
        let rs = table.get_mut(index);
        rs.qj = SourceTag::Waiting(RsIndex(4));
        assert!(!rs.operands_resolved());

        rs.qj = SourceTag::Ready;
        rs.qk = SourceTag::Forwarded;
        assert!(rs.operands_resolved());
    }

    #[test]
    fn test_effective_address_wraps() {
        let mut table = RSTable::new(&StationConfigs::default());
        let index = table.allocate(StationClass::Load).unwrap();
        let rs = table.get_mut(index);
        rs.address = -1;
        rs.vj = 0;
        assert_eq!(rs.effective_address(), 0xFFFF);
    }
}
