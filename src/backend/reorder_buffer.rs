use std::fmt;

use crate::backend::reservation_station::RsIndex;
use crate::backend::ring_buffer::RingBuffer;
use crate::instructions::instructions::{Opcode, RegisterType, WordType};

/// The position of an entry in the reorder buffer.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub(crate) struct RobIndex(pub(crate) u16);

impl fmt::Display for RobIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rob#{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum ROBSlotState {
    UNUSED,
    // issued, but no result has been broadcast yet.
    ISSUED,
    // the result is on the slot; the instruction can retire once it is at the head.
    READY,
}

/// Where the result of an instruction goes when it retires.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Destination {
    None,
    Register(RegisterType),
    // the effective address of a store; known after its writeback.
    Memory(u16),
    // the resolved target of a control instruction; known after its writeback.
    Target(WordType),
}

pub(crate) struct ROBSlot {
    pub(crate) index: RobIndex,
    pub(crate) state: ROBSlotState,
    pub(crate) opcode: Opcode,
    pub(crate) pc: usize,
    pub(crate) destination: Destination,
    pub(crate) value: WordType,
    pub(crate) rs_index: RsIndex,
    // dynamic instruction id, used for the timing records.
    pub(crate) instr_id: usize,
}

impl ROBSlot {
    fn new(index: u16) -> Self {
        Self {
            index: RobIndex(index),
            state: ROBSlotState::UNUSED,
            opcode: Opcode::ADD,
            pc: 0,
            destination: Destination::None,
            value: 0,
            rs_index: RsIndex(0),
            instr_id: 0,
        }
    }
}

/// The reorder buffer: all in flight instructions in program order. It is the only
/// authority on commit order.
pub(crate) struct ROB {
    slots: RingBuffer<ROBSlot>,
}

impl ROB {
    pub(crate) fn new(capacity: u16) -> Self {
        Self { slots: RingBuffer::new(capacity, ROBSlot::new) }
    }

    pub(crate) fn size(&self) -> u16 {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn has_space(&self) -> bool {
        !self.slots.is_full()
    }

    pub(crate) fn allocate(&mut self,
                           opcode: Opcode,
                           pc: usize,
                           destination: Destination,
                           rs_index: RsIndex,
                           instr_id: usize) -> RobIndex {
        assert!(self.has_space(), "ROB: Can't allocate if no space.");

        let index = self.slots.push_back(ROBSlot::new(0));
        let slot = self.slots.get_mut(index);
        slot.index = RobIndex(index);
        slot.state = ROBSlotState::ISSUED;
        slot.opcode = opcode;
        slot.pc = pc;
        slot.destination = destination;
        slot.rs_index = rs_index;
        slot.instr_id = instr_id;
        RobIndex(index)
    }

    pub(crate) fn head(&self) -> Option<RobIndex> {
        self.slots.front().map(RobIndex)
    }

    pub(crate) fn get(&self, index: RobIndex) -> &ROBSlot {
        self.slots.get(index.0)
    }

    pub(crate) fn mark_ready(&mut self, index: RobIndex, value: WordType) {
        let slot = self.slots.get_mut(index.0);
        debug_assert!(slot.state == ROBSlotState::ISSUED, "ROB: {} is not in issued state", index);
        slot.value = value;
        slot.state = ROBSlotState::READY;
    }

    pub(crate) fn change_destination(&mut self, index: RobIndex, destination: Destination) {
        self.slots.get_mut(index.0).destination = destination;
    }

    /// Removes the head; it must be ready.
    pub(crate) fn retire(&mut self) -> RobIndex {
        let Some(index) = self.head() else {
            panic!("ROB: can't retire when empty");
        };
        let slot = self.slots.get_mut(index.0);
        assert!(slot.state == ROBSlotState::READY, "ROB: can't retire {} since it isn't ready", index);
        slot.state = ROBSlotState::UNUSED;
        self.slots.pop_front();
        index
    }

    /// Looks for the youngest ready, non store, entry that writes the given register.
    /// This is the value an issuing instruction sees unless the register status
    /// table says a producer is still in flight.
    pub(crate) fn find_value(&self, reg: RegisterType) -> Option<WordType> {
        self.slots.iter_back_from_tail()
            .map(|index| self.slots.get(index))
            .find(|slot| slot.state == ROBSlotState::READY
                && slot.opcode != Opcode::STORE
                && slot.destination == Destination::Register(reg))
            .map(|slot| slot.value)
    }

    /// The program order position of an entry relative to the head.
    pub(crate) fn order(&self, index: RobIndex) -> u16 {
        self.slots.distance_from_head(index.0)
            .unwrap_or_else(|| panic!("ROB: {} is not in flight", index))
    }

    /// The in flight entries older than the given one, nearest first.
    pub(crate) fn iter_back_from(&self, index: RobIndex) -> impl Iterator<Item=RobIndex> + '_ {
        self.slots.iter_back_from(index.0).map(RobIndex)
    }

    pub(crate) fn iter_from_head(&self) -> impl Iterator<Item=RobIndex> + '_ {
        self.slots.iter_from_head().map(RobIndex)
    }

    /// Discards every non committed entry; returns the discarded entries.
    pub(crate) fn flush(&mut self) -> Vec<RobIndex> {
        let discarded = self.slots.truncate_to_head();
        for index in &discarded {
            self.slots.get_mut(*index).state = ROBSlotState::UNUSED;
        }
        discarded.into_iter().map(RobIndex).collect()
    }
}
