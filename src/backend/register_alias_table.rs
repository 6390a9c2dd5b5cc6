use crate::backend::reservation_station::RsIndex;
use crate::instructions::instructions::{RegisterType, GENERAL_ARG_REG_CNT, ZERO_REG};

/// The register status table. This structure is used for the register
/// renaming process. The entry for a given architectural register points to
/// the reservation station that is going to produce its next value. As long
/// as such an entry exists, readers should wait for that station.
pub(crate) struct RAT {
    table: Vec<Option<RsIndex>>,
}

impl RAT {
    pub(crate) fn new() -> Self {
        Self { table: vec![None; GENERAL_ARG_REG_CNT as usize] }
    }

    pub(crate) fn get(&self, arch_reg: RegisterType) -> Option<RsIndex> {
        self.table[arch_reg as usize]
    }

    pub(crate) fn set(&mut self, arch_reg: RegisterType, rs_index: RsIndex) {
        self.table[arch_reg as usize] = Some(rs_index);
    }

    /// Resolves every register that still waits for the given station.
    pub(crate) fn clear_producer(&mut self, rs_index: RsIndex) {
        for entry in &mut self.table {
            if *entry == Some(rs_index) {
                *entry = None;
            }
        }
    }

    // R0 is hardwired; it never waits for a producer.
    pub(crate) fn reset_zero_reg(&mut self) {
        self.table[ZERO_REG as usize] = None;
    }

    pub(crate) fn flush(&mut self) {
        self.table.fill(None);
    }
}
