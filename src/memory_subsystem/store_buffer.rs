use crate::backend::reorder_buffer::{RobIndex, ROB};
use crate::instructions::instructions::WordType;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum StoreAddress {
    // the ROB entry owning this slot isn't a store.
    Unused,
    // a store whose effective address isn't computed yet.
    Pending,
    Resolved(u16),
}

struct SBEntry {
    addr: StoreAddress,
    value_ready: bool,
    value: WordType,
}

impl SBEntry {
    fn reset(&mut self) {
        self.addr = StoreAddress::Unused;
        self.value_ready = false;
        self.value = 0;
    }

    fn may_alias(&self, addr: u16) -> bool {
        match self.addr {
            StoreAddress::Unused => false,
            StoreAddress::Pending => true,
            StoreAddress::Resolved(store_addr) => store_addr == addr,
        }
    }
}

/// What a load that finished its address computation should do.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum LoadCheck {
    // no older store may write the address; read memory.
    Memory,
    // the nearest older aliasing store has its value; use it.
    Forward(WordType),
    // the nearest older aliasing store has no value yet; try again next cycle.
    Stall,
}

/// The store buffer. There is one slot per ROB entry, indexed by the ROB index,
/// and it only serves to let loads pass or wait for older in flight stores.
/// The stores themselves are written to memory by the commit stage.
pub(crate) struct SB {
    entries: Vec<SBEntry>,
}

impl SB {
    pub(crate) fn new(rob_capacity: u16) -> SB {
        let mut entries = Vec::with_capacity(rob_capacity as usize);
        for _ in 0..rob_capacity {
            entries.push(SBEntry {
                addr: StoreAddress::Unused,
                value_ready: false,
                value: 0,
            })
        }

        SB { entries }
    }

    /// Claims the slot of a freshly allocated ROB entry.
    pub(crate) fn allocate(&mut self, rob_index: RobIndex, is_store: bool) {
        let entry = &mut self.entries[rob_index.0 as usize];
        entry.reset();
        if is_store {
            entry.addr = StoreAddress::Pending;
        }
    }

    /// Called on the writeback of a store.
    pub(crate) fn resolve(&mut self, rob_index: RobIndex, addr: u16, value: WordType) {
        let entry = &mut self.entries[rob_index.0 as usize];
        debug_assert!(entry.addr == StoreAddress::Pending, "StoreBuffer: {} isn't a pending store", rob_index);
        entry.addr = StoreAddress::Resolved(addr);
        entry.value = value;
        entry.value_ready = true;
    }

    pub(crate) fn release(&mut self, rob_index: RobIndex) {
        self.entries[rob_index.0 as usize].reset();
    }

    /// Decides if the load owning `load_index` may read `addr` from memory.
    ///
    /// Every slot with a pending address, or with exactly this address, may alias.
    /// Only the nearest such store before the load in program order matters.
    pub(crate) fn check_load(&self, rob: &ROB, load_index: RobIndex, addr: u16) -> LoadCheck {
        let aliasing: Vec<bool> = self.entries.iter().map(|entry| entry.may_alias(addr)).collect();

        match rob.iter_back_from(load_index).find(|index| aliasing[index.0 as usize]) {
            None => LoadCheck::Memory,
            Some(store_index) => {
                let entry = &self.entries[store_index.0 as usize];
                if entry.value_ready {
                    LoadCheck::Forward(entry.value)
                } else {
                    LoadCheck::Stall
                }
            }
        }
    }

    pub(crate) fn flush(&mut self) {
        for entry in &mut self.entries {
            entry.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::backend::reorder_buffer::Destination;
    use crate::backend::reservation_station::RsIndex;
    use crate::instructions::instructions::Opcode;

    use super::*;

    fn issue(rob: &mut ROB, sb: &mut SB, opcode: Opcode) -> RobIndex {
        let index = rob.allocate(opcode, 0, Destination::None, RsIndex(0), 0);
        sb.allocate(index, opcode == Opcode::STORE);
        index
    }

    #[test]
    fn test_no_store_reads_memory() {
        let mut rob = ROB::new(4);
        let mut sb = SB::new(4);
        issue(&mut rob, &mut sb, Opcode::ADD);
        let load = issue(&mut rob, &mut sb, Opcode::LOAD);

        assert_eq!(sb.check_load(&rob, load, 10), LoadCheck::Memory);
    }

    #[test]
    fn test_pending_store_stalls() {
        let mut rob = ROB::new(4);
        let mut sb = SB::new(4);
        issue(&mut rob, &mut sb, Opcode::STORE);
        let load = issue(&mut rob, &mut sb, Opcode::LOAD);

        assert_eq!(sb.check_load(&rob, load, 10), LoadCheck::Stall);
    }

    #[test]
    fn test_resolved_store_forwards_only_same_address() {
        let mut rob = ROB::new(4);
        let mut sb = SB::new(4);
        let store = issue(&mut rob, &mut sb, Opcode::STORE);
        let load = issue(&mut rob, &mut sb, Opcode::LOAD);
        sb.resolve(store, 10, 42);

        assert_eq!(sb.check_load(&rob, load, 10), LoadCheck::Forward(42));
        assert_eq!(sb.check_load(&rob, load, 11), LoadCheck::Memory);
    }

    #[test]
    fn test_nearest_older_store_wins() {
        let mut rob = ROB::new(8);
        let mut sb = SB::new(8);
        let older = issue(&mut rob, &mut sb, Opcode::STORE);
        let newer = issue(&mut rob, &mut sb, Opcode::STORE);
        let load = issue(&mut rob, &mut sb, Opcode::LOAD);
        sb.resolve(older, 10, 1);
        sb.resolve(newer, 10, 2);

        assert_eq!(sb.check_load(&rob, load, 10), LoadCheck::Forward(2));
    }

    #[test]
    fn test_younger_store_is_ignored() {
        let mut rob = ROB::new(4);
        let mut sb = SB::new(4);
        let load = issue(&mut rob, &mut sb, Opcode::LOAD);
        issue(&mut rob, &mut sb, Opcode::STORE);

        assert_eq!(sb.check_load(&rob, load, 10), LoadCheck::Memory);
    }

    #[test]
    fn test_reused_slot_forgets_old_store() {
        let mut rob = ROB::new(2);
        let mut sb = SB::new(2);
        let store = issue(&mut rob, &mut sb, Opcode::STORE);
        sb.resolve(store, 10, 1);
        rob.mark_ready(store, 1);
        rob.retire();
        sb.release(store);

        issue(&mut rob, &mut sb, Opcode::ADD);
        let load = issue(&mut rob, &mut sb, Opcode::LOAD);
        assert_eq!(sb.check_load(&rob, load, 10), LoadCheck::Memory);
    }
}
