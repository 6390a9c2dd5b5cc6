use std::rc::Rc;

use crate::instructions::instructions::{Instr, Program, WordType};

/// The fetch side of the pipeline. There is no branch prediction: the frontend
/// always assumes the next instruction is at pc + 1. The backend corrects it
/// with a redirect when a control instruction commits.
pub(crate) struct Frontend {
    program_option: Option<Rc<Program>>,
    pub(crate) pc: usize,
}

impl Frontend {
    pub(crate) fn new() -> Frontend {
        Frontend { program_option: None, pc: 0 }
    }

    pub(crate) fn init(&mut self, program: &Rc<Program>) {
        self.program_option = Some(Rc::clone(program));
        self.pc = 0;
    }

    /// The next instruction to issue, if any.
    pub(crate) fn peek(&self) -> Option<&Instr> {
        self.program_option.as_ref()?.get_instr(self.pc)
    }

    /// Called when the instruction returned by peek has been issued.
    pub(crate) fn advance(&mut self) {
        self.pc += 1;
    }

    /// Re-steers the frontend. A target outside of the program ends the fetching.
    pub(crate) fn redirect(&mut self, target: WordType) {
        let len = self.program_option.as_ref().map_or(0, |program| program.len());
        self.pc = usize::try_from(target).map_or(len, |target| target.min(len));
    }

    pub(crate) fn is_done(&self) -> bool {
        self.peek().is_none()
    }
}

#[cfg(test)]
mod tests {
    use crate::instructions::instructions::Opcode;

    use super::*;

    fn program(len: usize) -> Rc<Program> {
        let code = (0..len).map(|pc| Instr::new(Opcode::ADD, pc)).collect();
        Rc::new(Program { code, ..Program::default() })
    }

    #[test]
    fn test_sequential_fetch() {
        let mut frontend = Frontend::new();
        assert!(frontend.is_done());

        frontend.init(&program(2));
        assert_eq!(frontend.peek().map(|instr| instr.pc), Some(0));
        frontend.advance();
        assert_eq!(frontend.peek().map(|instr| instr.pc), Some(1));
        frontend.advance();
        assert!(frontend.is_done());
    }

    #[test]
    fn test_redirect() {
        let mut frontend = Frontend::new();
        frontend.init(&program(4));

        frontend.redirect(2);
        assert_eq!(frontend.pc, 2);

        frontend.redirect(-3);
        assert_eq!(frontend.pc, 4);
        assert!(frontend.is_done());

        frontend.redirect(100);
        assert_eq!(frontend.pc, 4);
    }
}
