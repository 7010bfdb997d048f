//! Syntax tree of assembly source.

use std::fmt;

use crate::instruction::{OpCode, OperandFormat, Register};
use crate::parsing::Span;

/// Binary operators of bracketed expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    And,
    Or,
    Xor,
}

impl Operator {
    /// Binding strength. Operators with a higher precedence bind tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            Operator::Multiply | Operator::Divide => 3,
            Operator::Add | Operator::Subtract => 2,
            Operator::And | Operator::Or | Operator::Xor => 1,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::And => "&",
            Operator::Or => "|",
            Operator::Xor => "^",
        };

        write!(f, "{}", symbol)
    }
}

/// A value computed at assembly time.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// `$hex`
    Literal(u32),
    /// `!name`: the value bound to a label, constant or data block.
    Symbol(String),
    /// `<Structure> symbol.member`: the address of `symbol` plus the offset of `member`.
    InterpretAs {
        structure: String,
        symbol: String,
        member: String,
    },
    Binary {
        operator: Operator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Literal(value) => write!(f, "${:x}", value),
            Expression::Symbol(name) => write!(f, "!{}", name),
            Expression::InterpretAs { structure, symbol, member } =>
                write!(f, "<{}> {}.{}", structure, symbol, member),
            Expression::Binary { operator, lhs, rhs } =>
                write!(f, "({} {} {})", lhs, operator, rhs),
        }
    }
}

/// Formats an expression in a literal operand position.
struct LiteralOperand<'a>(&'a Expression);

impl fmt::Display for LiteralOperand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Expression::Literal(value) => write!(f, "${:04x}", value),
            expr => write!(f, "[{}]", expr),
        }
    }
}

/// Formats an expression in a memory operand position.
struct MemoryOperand<'a>(&'a Expression);

impl fmt::Display for MemoryOperand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Expression::Literal(value) => write!(f, "&{:04x}", value),
            expr => write!(f, "&[{}]", expr),
        }
    }
}

/// Operands of an instruction, one variant per [OperandFormat].
#[derive(Clone, Debug, PartialEq)]
pub enum Operands {
    LitReg(Expression, Register),
    RegLit(Register, Expression),
    RegLit8(Register, Expression),
    RegReg(Register, Register),
    RegMem(Register, Expression),
    MemReg(Expression, Register),
    LitMem(Expression, Expression),
    RegPtrReg(Register, Register),
    LitOffReg(Expression, Register, Register),
    LitRegPtr(Expression, Register),
    NoArgs,
    SingleReg(Register),
    SingleLit(Expression),
    SingleMem(Expression),
}

impl Operands {
    pub fn format(&self) -> OperandFormat {
        match self {
            Operands::LitReg(..) => OperandFormat::LitReg,
            Operands::RegLit(..) => OperandFormat::RegLit,
            Operands::RegLit8(..) => OperandFormat::RegLit8,
            Operands::RegReg(..) => OperandFormat::RegReg,
            Operands::RegMem(..) => OperandFormat::RegMem,
            Operands::MemReg(..) => OperandFormat::MemReg,
            Operands::LitMem(..) => OperandFormat::LitMem,
            Operands::RegPtrReg(..) => OperandFormat::RegPtrReg,
            Operands::LitOffReg(..) => OperandFormat::LitOffReg,
            Operands::LitRegPtr(..) => OperandFormat::LitRegPtr,
            Operands::NoArgs => OperandFormat::NoArgs,
            Operands::SingleReg(..) => OperandFormat::SingleReg,
            Operands::SingleLit(..) => OperandFormat::SingleLit,
            Operands::SingleMem(..) => OperandFormat::SingleMem,
        }
    }
}

impl fmt::Display for Operands {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::{LiteralOperand as Lit, MemoryOperand as Mem};

        match self {
            Operands::LitReg(lit, reg) => write!(f, "{}, {}", Lit(lit), reg),
            Operands::RegLit(reg, lit) | Operands::RegLit8(reg, lit) =>
                write!(f, "{}, {}", reg, Lit(lit)),
            Operands::RegReg(a, b) => write!(f, "{}, {}", a, b),
            Operands::RegMem(reg, addr) => write!(f, "{}, {}", reg, Mem(addr)),
            Operands::MemReg(addr, reg) => write!(f, "{}, {}", Mem(addr), reg),
            Operands::LitMem(lit, addr) => write!(f, "{}, {}", Lit(lit), Mem(addr)),
            Operands::RegPtrReg(ptr, reg) => write!(f, "&{}, {}", ptr, reg),
            Operands::LitOffReg(lit, ptr, reg) => write!(f, "{}, &{}, {}", Lit(lit), ptr, reg),
            Operands::LitRegPtr(lit, ptr) => write!(f, "{}, &({})", Lit(lit), ptr),
            Operands::NoArgs => Ok(()),
            Operands::SingleReg(reg) => write!(f, "{}", reg),
            Operands::SingleLit(lit) => write!(f, "{}", Lit(lit)),
            Operands::SingleMem(addr) => write!(f, "{}", Mem(addr)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub opcode: OpCode,
    pub operands: Operands,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.operands {
            Operands::NoArgs => write!(f, "{}", self.opcode.mnemonic()),
            ref operands => write!(f, "{} {}", self.opcode.mnemonic(), operands),
        }
    }
}

/// Element width of a data block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataSize {
    Bits8,
    Bits16,
}

impl DataSize {
    /// Size of one element in bytes.
    pub fn bytes(&self) -> u16 {
        match self {
            DataSize::Bits8 => 1,
            DataSize::Bits16 => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Member {
    pub name: String,
    pub size: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// `name:`
    Label(String),
    /// `constant name = $value`
    Constant {
        exported: bool,
        name: String,
        value: u32,
    },
    /// `data8 name = { ... }` or `data16 name = { ... }`
    Data {
        exported: bool,
        size: DataSize,
        name: String,
        values: Vec<u32>,
    },
    /// `structure Name { member: $size, ... }`
    Structure {
        exported: bool,
        name: String,
        members: Vec<Member>,
    },
    Instruction(Instruction),
}

fn export_marker(exported: bool) -> &'static str {
    if exported { "+" } else { "" }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NodeKind::Label(name) => write!(f, "{}:", name),
            NodeKind::Constant { exported, name, value } =>
                write!(f, "{}constant {} = ${:04x}", export_marker(*exported), name, value),
            NodeKind::Data { exported, size, name, values } => {
                let keyword = match size {
                    DataSize::Bits8 => "data8",
                    DataSize::Bits16 => "data16",
                };

                write!(f, "{}{} {} = {{ ", export_marker(*exported), keyword, name)?;

                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }

                    write!(f, "${:02x}", value)?;
                }

                write!(f, " }}")
            },
            NodeKind::Structure { exported, name, members } => {
                write!(f, "{}structure {} {{ ", export_marker(*exported), name)?;

                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }

                    write!(f, "{}: ${:02x}", member.name, member.size)?;
                }

                write!(f, " }}")
            },
            NodeKind::Instruction(ins) => write!(f, "{}", ins),
        }
    }
}

/// A parsed node together with its location in the source.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}
