use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::assembly::LineParser;
use crate::instructions::instructions::{get_register, Diagnostic, Instr, Opcode, Program, RegisterType, WordType, LINK_REG,
                                         MAX_PROGRAM_LEN};
use crate::loader::ast::{Line, Statement, Target};

#[derive(Error, Debug)]
pub(crate) enum LoadError {
    #[error("Failed to read {path}: {source}")]
    IOError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// An instruction whose position in the program isn't final yet.
struct PendingInstr {
    instr: Instr,
    // the label the offset of a BEQ or CALL refers to
    target: Option<String>,
    // the labels naming this instruction
    labels: Vec<String>,
}

enum Decoded {
    Instr(PendingInstr),
    Data(u16, WordType),
}

struct Loader {
    parser: LineParser,
    code: Vec<PendingInstr>,
    // labels not followed by an instruction (yet); at the end of the source
    // they name the position right after the last instruction.
    open_labels: Vec<String>,
    labels: HashSet<String>,
    data_items: Vec<(u16, WordType)>,
    diagnostics: Vec<Diagnostic>,
}

impl Loader {
    fn new() -> Loader {
        Loader {
            parser: LineParser::new(),
            code: Vec::new(),
            open_labels: Vec::new(),
            labels: HashSet::new(),
            data_items: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn load(mut self, src: &str) -> Program {
        for (index, text) in src.lines().enumerate() {
            self.parse_line(index + 1, text);
        }
        self.drop_unresolved();
        self.build()
    }

    fn parse_line(&mut self, line: usize, text: &str) {
        let Line { label, statement } = match self.parser.parse(text) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.report(line, format!("syntax error: {}", err));
                return;
            }
        };

        if let Some(label) = label {
            if self.labels.insert(label.clone()) {
                self.open_labels.push(label);
            } else {
                self.report(line, format!("duplicate label '{}'", label));
            }
        }

        let Some(statement) = statement else {
            return;
        };

        match decode(line, statement) {
            Ok(Decoded::Instr(_)) if self.code.len() >= MAX_PROGRAM_LEN => {
                self.report(line, format!("program exceeds {} instructions", MAX_PROGRAM_LEN));
            }
            Ok(Decoded::Instr(mut pending)) => {
                pending.labels = mem::take(&mut self.open_labels);
                self.code.push(pending);
            }
            Ok(Decoded::Data(addr, value)) => self.data_items.push((addr, value)),
            Err(message) => self.report(line, message),
        }
    }

    // Skips every instruction that refers to an undefined label. The labels of a
    // skipped instruction move on to the instruction after it.
    fn drop_unresolved(&mut self) {
        let mut carried = Vec::new();
        let mut kept = Vec::with_capacity(self.code.len());

        for mut pending in mem::take(&mut self.code) {
            carried.append(&mut pending.labels);

            if let Some(label) = &pending.target {
                if !self.labels.contains(label) {
                    if let Some(line) = pending.instr.line {
                        self.report(line, format!("unknown label '{}'", label));
                    }
                    continue;
                }
            }

            pending.labels = mem::take(&mut carried);
            kept.push(pending);
        }

        carried.append(&mut self.open_labels);
        self.open_labels = carried;
        self.code = kept;
    }

    fn build(self) -> Program {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (pc, pending) in self.code.iter().enumerate() {
            for label in &pending.labels {
                positions.insert(label, pc);
            }
        }
        for label in &self.open_labels {
            positions.insert(label, self.code.len());
        }

        let code = self.code.iter()
            .enumerate()
            .map(|(pc, pending)| {
                let mut instr = pending.instr;
                instr.pc = pc;
                if let Some(label) = &pending.target {
                    let target = positions[label.as_str()] as i64;
                    // BEQ offsets are relative to the next instruction
                    let base = if instr.opcode == Opcode::BEQ { pc as i64 + 1 } else { pc as i64 };
                    instr.imm = (target - base) as WordType;
                }
                instr
            })
            .collect();

        let mut diagnostics = self.diagnostics;
        diagnostics.sort_by_key(|diagnostic| diagnostic.line);

        Program { code, data_items: self.data_items, diagnostics }
    }

    fn report(&mut self, line: usize, message: String) {
        self.diagnostics.push(Diagnostic { line, message });
    }
}

fn decode(line: usize, statement: Statement) -> Result<Decoded, String> {
    let (opcode, dst, src1, src2, offset) = match statement {
        Statement::Load { dst, base, offset } =>
            (Opcode::LOAD, Some(register(&dst)?), Some(register(&base)?), None, Target::Offset(offset)),
        Statement::Store { src, base, offset } =>
            (Opcode::STORE, None, Some(register(&base)?), Some(register(&src)?), Target::Offset(offset)),
        Statement::Beq { src1, src2, target } =>
            (Opcode::BEQ, None, Some(register(&src1)?), Some(register(&src2)?), target),
        Statement::Call { target } =>
            (Opcode::CALL, Some(LINK_REG), None, None, target),
        Statement::Ret =>
            (Opcode::RET, None, Some(LINK_REG), None, Target::Offset(0)),
        Statement::Alu { opcode, dst, src1, src2 } =>
            (opcode, Some(register(&dst)?), Some(register(&src1)?), Some(register(&src2)?), Target::Offset(0)),
        Statement::Data { addr, value } => {
            let addr = u16::try_from(addr).map_err(|_| format!("data address {} out of range", addr))?;
            return Ok(Decoded::Data(addr, immediate(value)?));
        }
    };

    let mut instr = Instr::new(opcode, 0);
    instr.dst = dst;
    instr.src1 = src1;
    instr.src2 = src2;
    instr.line = Some(line);

    let target = match offset {
        Target::Offset(offset) => {
            instr.imm = immediate(offset)?;
            None
        }
        Target::Label(label) => Some(label),
    };

    Ok(Decoded::Instr(PendingInstr { instr, target, labels: Vec::new() }))
}

fn register(name: &str) -> Result<RegisterType, String> {
    get_register(name).ok_or_else(|| format!("invalid register '{}'", name))
}

fn immediate(value: i64) -> Result<WordType, String> {
    WordType::try_from(value).map_err(|_| format!("immediate {} does not fit in 16 bits", value))
}

pub(crate) fn load(path: &Path) -> Result<Program, LoadError> {
    let src = fs::read_to_string(path)
        .map_err(|source| LoadError::IOError { path: path.to_path_buf(), source })?;
    info!("Loading {}", path.display());
    Ok(load_from_string(&src))
}

/// Assembles the source. Lines that can't be assembled are skipped and
/// reported in the diagnostics of the program.
pub(crate) fn load_from_string(src: &str) -> Program {
    let program = Loader::new().load(src);
    for diagnostic in &program.diagnostics {
        warn!("{}", diagnostic);
    }
    program
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn lines(program: &Program) -> Vec<String> {
        program.code.iter().map(|instr| {
            let mut instr = *instr;
            instr.line = None;
            instr.to_string()
        }).collect()
    }

    #[test]
    fn test_all_statements() {
        let src = r#"
# memory
.data 0, 5
.data 1, -100
    LOAD R1, 0(R0)
    store r1, -2(r2)   ; lower case works too
    BEQ R1, R2, 3
    CALL 2
    RET
    ADD R3, R1, R2
    SUB R3, R1, R2
    NAND R3, R1, R2
    MUL R3, R1, R2
"#;
        let program = load_from_string(src);

        assert_eq!(program.diagnostics, vec![]);
        assert_eq!(program.data_items, vec![(0, 5), (1, -100)]);
        assert_eq!(lines(&program), vec![
            "LOAD R1,0(R0)",
            "STORE R1,-2(R2)",
            "BEQ R1,R2,3",
            "CALL 2",
            "RET ",
            "ADD R3,R1,R2",
            "SUB R3,R1,R2",
            "NAND R3,R1,R2",
            "MUL R3,R1,R2",
        ]);

        let call = program.code[3];
        assert_eq!(call.dst, Some(LINK_REG));
        let ret = program.code[4];
        assert_eq!(ret.src1, Some(LINK_REG));
        assert_eq!(program.code[8].pc, 8);
        assert_eq!(program.code[8].line, Some(13));
    }

    #[test]
    fn test_labels() {
        let src = r#"
start:
    ADD R1, R0, R0
loop: BEQ R1, R0, done
    CALL start
    BEQ R0, R0, loop
done:
"#;
        let program = load_from_string(src);

        assert_eq!(program.diagnostics, vec![]);
        // done is right after the last instruction: 4 - (1 + 1)
        assert_eq!(program.code[1].imm, 2);
        assert_eq!(program.code[1].static_target(), Some(4));
        // CALL is relative to its own position
        assert_eq!(program.code[2].imm, -2);
        assert_eq!(program.code[2].static_target(), Some(0));
        assert_eq!(program.code[3].static_target(), Some(1));
    }

    #[test]
    fn test_labels_spelled_like_keywords() {
        let src = r#"
    BEQ R0, R0, r1
sub: ADD R1, R0, R0
r1: CALL sub
    BEQ R0, R0, ret
ret: RET
"#;
        let program = load_from_string(src);

        assert_eq!(program.diagnostics, vec![]);
        assert_eq!(program.code.len(), 5);
        assert_eq!(program.code[0].static_target(), Some(2));
        assert_eq!(program.code[2].static_target(), Some(1));
        assert_eq!(program.code[3].static_target(), Some(4));
        assert_eq!(program.code[4].opcode, Opcode::RET);
    }

    #[test]
    fn test_program_size_limit() {
        let src = "ADD R1, R0, R0\n".repeat(MAX_PROGRAM_LEN + 1);
        let program = load_from_string(&src);

        assert_eq!(program.code.len(), MAX_PROGRAM_LEN);
        assert_eq!(program.code[MAX_PROGRAM_LEN - 1].pc, WordType::MAX as usize);
        assert_eq!(program.diagnostics.len(), 1);
        assert_eq!(program.diagnostics[0].line, MAX_PROGRAM_LEN + 1);
    }

    #[rstest]
    #[case("ADD R1, R8, R0", "invalid register 'R8'")]
    #[case("LOAD R1, 40000(R0)", "immediate 40000 does not fit in 16 bits")]
    #[case(".data 70000, 1", "data address 70000 out of range")]
    #[case("BEQ R0, R0, nowhere", "unknown label 'nowhere'")]
    fn test_invalid_line_is_skipped(#[case] line: &str, #[case] message: &str) {
        let src = format!("ADD R1, R0, R0\n{}\nADD R2, R0, R0\n", line);
        let program = load_from_string(&src);

        assert_eq!(program.diagnostics, vec![Diagnostic { line: 2, message: message.to_string() }]);
        assert_eq!(program.len(), 2);
        assert_eq!(program.code[1].pc, 1);
    }

    #[test]
    fn test_syntax_error() {
        let program = load_from_string("ADD R1, R0\nJMP 4\nRET");

        assert_eq!(program.diagnostics.iter().map(|d| d.line).collect::<Vec<_>>(), vec![1, 2]);
        assert!(program.diagnostics[0].message.starts_with("syntax error"));
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn test_labels_of_skipped_instruction_move_on() {
        let src = r#"
    BEQ R0, R0, target
target: CALL missing
    ADD R1, R0, R0
"#;
        let program = load_from_string(src);

        assert_eq!(program.diagnostics, vec![Diagnostic { line: 3, message: "unknown label 'missing'".to_string() }]);
        assert_eq!(program.len(), 2);
        assert_eq!(program.code[0].static_target(), Some(1));
    }

    #[test]
    fn test_duplicate_label_keeps_first() {
        let src = "a: ADD R1, R0, R0\na: ADD R2, R0, R0\nBEQ R0, R0, a";
        let program = load_from_string(src);

        assert_eq!(program.diagnostics, vec![Diagnostic { line: 2, message: "duplicate label 'a'".to_string() }]);
        // the instruction on the duplicate line is still assembled
        assert_eq!(program.len(), 3);
        assert_eq!(program.code[2].static_target(), Some(0));
    }

    #[test]
    fn test_missing_file() {
        let result = load(Path::new("/does/not/exist.asm"));
        assert!(matches!(result, Err(LoadError::IOError { .. })));
    }
}
