use crate::instructions::instructions::Opcode;

/// The parse of a single source line. Registers and numbers are kept as they
/// were written; the loader validates them so it can report the line.
pub(crate) struct Line {
    pub(crate) label: Option<String>,
    pub(crate) statement: Option<Statement>,
}

pub(crate) enum Statement {
    Load { dst: String, base: String, offset: i64 },
    Store { src: String, base: String, offset: i64 },
    Beq { src1: String, src2: String, target: Target },
    Call { target: Target },
    Ret,
    Alu { opcode: Opcode, dst: String, src1: String, src2: String },
    Data { addr: i64, value: i64 },
}

pub(crate) enum Target {
    Label(String),
    Offset(i64),
}
