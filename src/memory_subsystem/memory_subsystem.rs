use crate::instructions::instructions::{Program, WordType, MEMORY_SIZE};
use crate::memory_subsystem::store_buffer::SB;

pub(crate) struct MemorySubsystem {
    pub(crate) memory: Vec<WordType>,
    pub(crate) sb: SB,
}

impl MemorySubsystem {
    pub fn new(rob_capacity: u16) -> MemorySubsystem {
        MemorySubsystem {
            memory: vec![0; MEMORY_SIZE],
            sb: SB::new(rob_capacity),
        }
    }

    pub(crate) fn init(&mut self, program: &Program) {
        for &(addr, value) in &program.data_items {
            self.write(addr, value);
        }
    }

    pub(crate) fn read(&self, addr: u16) -> WordType {
        self.memory[addr as usize]
    }

    pub(crate) fn write(&mut self, addr: u16, value: WordType) {
        self.memory[addr as usize] = value;
    }

    /// The words that differ from zero, by address.
    pub(crate) fn non_zero(&self) -> impl Iterator<Item=(usize, WordType)> + '_ {
        self.memory.iter()
            .enumerate()
            .filter(|(_, value)| **value != 0)
            .map(|(addr, value)| (addr, *value))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_init_from_program() {
        let program = Program {
            data_items: vec![(0, 5), (0xFFFF, -1)],
            ..Program::default()
        };

        let mut memory_subsystem = MemorySubsystem::new(4);
        memory_subsystem.init(&program);

        assert_eq!(memory_subsystem.read(0), 5);
        assert_eq!(memory_subsystem.read(0xFFFF), -1);
        assert_eq!(memory_subsystem.non_zero().collect::<Vec<_>>(), vec![(0, 5), (0xFFFF, -1)]);
    }
}
