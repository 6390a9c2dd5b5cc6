use std::fmt;

// The number of architectural registers.
pub(crate) const GENERAL_ARG_REG_CNT: u16 = 8;

// Register 0 is hard wired to 0.
pub(crate) const ZERO_REG: RegisterType = 0;

// CALL writes the return address into R1 and RET jumps to it.
pub(crate) const LINK_REG: RegisterType = 1;

// The size of the data memory in words; every 16 bit address is valid.
pub(crate) const MEMORY_SIZE: usize = 1 << 16;

// Every pc has to fit in a word, since CALL links it into R1 and RET jumps to
// a register value. The loader rejects the instructions past this limit.
pub(crate) const MAX_PROGRAM_LEN: usize = WordType::MAX as usize + 1;

pub(crate) type RegisterType = u16;
pub(crate) type WordType = i16;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Opcode {
    LOAD,
    STORE,
    BEQ,
    CALL,
    RET,
    ADD,
    SUB,
    NAND,
    MUL,
}

impl Opcode {
    pub(crate) fn station_class(self) -> StationClass {
        match self {
            Opcode::LOAD => StationClass::Load,
            Opcode::STORE => StationClass::Store,
            Opcode::BEQ => StationClass::Branch,
            Opcode::CALL |
            Opcode::RET => StationClass::CallReturn,
            Opcode::ADD |
            Opcode::SUB => StationClass::AddSub,
            Opcode::NAND => StationClass::Nand,
            Opcode::MUL => StationClass::Mul,
        }
    }

    /// True for instructions that claim their destination register in the
    /// register status table when they issue.
    pub(crate) fn claims_register(self) -> bool {
        matches!(self, Opcode::LOAD | Opcode::ADD | Opcode::SUB | Opcode::NAND | Opcode::MUL)
    }
}

/// The reservation station partition an instruction is issued into.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum StationClass {
    Load,
    Store,
    Branch,
    CallReturn,
    AddSub,
    Nand,
    Mul,
}

impl StationClass {
    // Partitions are laid out in this order in the reservation station table.
    pub(crate) const ALL: [StationClass; 7] = [
        StationClass::Load,
        StationClass::Store,
        StationClass::Branch,
        StationClass::CallReturn,
        StationClass::AddSub,
        StationClass::Nand,
        StationClass::Mul,
    ];

    pub(crate) fn ordinal(self) -> usize {
        self as usize
    }
}

pub(crate) fn mnemonic(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::LOAD => "LOAD",
        Opcode::STORE => "STORE",
        Opcode::BEQ => "BEQ",
        Opcode::CALL => "CALL",
        Opcode::RET => "RET",
        Opcode::ADD => "ADD",
        Opcode::SUB => "SUB",
        Opcode::NAND => "NAND",
        Opcode::MUL => "MUL",
    }
}

pub(crate) fn get_opcode(mnemonic: &str) -> Option<Opcode> {
    let string = mnemonic.to_uppercase();

    match string.as_str() {
        "LOAD" => Some(Opcode::LOAD),
        "STORE" => Some(Opcode::STORE),
        "BEQ" => Some(Opcode::BEQ),
        "CALL" => Some(Opcode::CALL),
        "RET" => Some(Opcode::RET),
        "ADD" => Some(Opcode::ADD),
        "SUB" => Some(Opcode::SUB),
        "NAND" => Some(Opcode::NAND),
        "MUL" => Some(Opcode::MUL),
        _ => None,
    }
}

pub(crate) fn get_register(name: &str) -> Option<RegisterType> {
    let name_uppercased = name.to_uppercase();
    let reg_name = name_uppercased.strip_prefix('R')?;
    let reg: RegisterType = reg_name.parse().ok()?;

    if reg >= GENERAL_ARG_REG_CNT {
        return None;
    }
    Some(reg)
}

/// A decoded instruction as produced by the loader. It is never mutated after loading.
///
/// The meaning of the register fields depends on the opcode:
/// - LOAD: `dst` is loaded from `imm(src1)`.
/// - STORE: `src2` is stored at `imm(src1)`.
/// - BEQ: compares `src1` and `src2`; `imm` is relative to `pc + 1`.
/// - CALL: `dst` is the link register; `imm` is relative to `pc`.
/// - RET: jumps to the value of `src1`.
/// - ADD/SUB/NAND/MUL: `dst = src1 op src2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Instr {
    pub(crate) opcode: Opcode,
    pub(crate) dst: Option<RegisterType>,
    pub(crate) src1: Option<RegisterType>,
    pub(crate) src2: Option<RegisterType>,
    pub(crate) imm: WordType,
    // position in program order
    pub(crate) pc: usize,
    // line in the assembly source, if loaded from one
    pub(crate) line: Option<usize>,
}

impl Instr {
    pub(crate) fn new(opcode: Opcode, pc: usize) -> Self {
        Self { opcode, dst: None, src1: None, src2: None, imm: 0, pc, line: None }
    }

    /// The control transfer target encoded in the instruction itself (BEQ and CALL).
    pub(crate) fn static_target(&self) -> Option<WordType> {
        // pc < MAX_PROGRAM_LEN
        let pc = self.pc as WordType;
        match self.opcode {
            Opcode::BEQ => Some(pc.wrapping_add(1).wrapping_add(self.imm)),
            Opcode::CALL => Some(pc.wrapping_add(self.imm)),
            _ => None,
        }
    }
}

fn reg(f: &mut fmt::Formatter<'_>, reg: Option<RegisterType>) -> fmt::Result {
    match reg {
        Some(r) => write!(f, "R{}", r),
        None => write!(f, "-"),
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", mnemonic(self.opcode))?;

        match self.opcode {
            Opcode::LOAD => {
                reg(f, self.dst)?;
                write!(f, ",{}(", self.imm)?;
                reg(f, self.src1)?;
                write!(f, ")")?;
            }
            Opcode::STORE => {
                reg(f, self.src2)?;
                write!(f, ",{}(", self.imm)?;
                reg(f, self.src1)?;
                write!(f, ")")?;
            }
            Opcode::BEQ => {
                reg(f, self.src1)?;
                write!(f, ",")?;
                reg(f, self.src2)?;
                write!(f, ",{}", self.imm)?;
            }
            Opcode::CALL => write!(f, "{}", self.imm)?,
            Opcode::RET => {}
            Opcode::ADD |
            Opcode::SUB |
            Opcode::NAND |
            Opcode::MUL => {
                reg(f, self.dst)?;
                write!(f, ",")?;
                reg(f, self.src1)?;
                write!(f, ",")?;
                reg(f, self.src2)?;
            }
        }

        if let Some(line) = self.line {
            write!(f, " ; line {}", line)?;
        }

        Ok(())
    }
}

/// A problem found while loading; the offending line never reaches the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Diagnostic {
    pub(crate) line: usize,
    pub(crate) message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Program {
    pub(crate) code: Vec<Instr>,
    // initial data memory contents as (address, value)
    pub(crate) data_items: Vec<(u16, WordType)>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl Program {
    pub(crate) fn get_instr(&self, pos: usize) -> Option<&Instr> {
        self.code.get(pos)
    }

    pub(crate) fn len(&self) -> usize {
        self.code.len()
    }
}
