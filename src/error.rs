//! Error types of the assembler, the memory subsystem and the emulator.

use std::fmt::{self, Display};

use itertools::Itertools;
use nom::error::ErrorKind;

use crate::instruction::OpCode;
use crate::parsing::Span;
use crate::symbolic::ast::Operator;

#[derive(Debug, Clone)]
enum InnerError<Kind> {
    Incomplete,
    Context(&'static str),
    Other(Kind),
    Nom(ErrorKind),
}

impl<Kind: Display> fmt::Display for InnerError<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InnerError::Context(ctx) => write!(f, "invalid {}", ctx),
            InnerError::Nom(_err) => write!(f, "unexpected input"),
            InnerError::Other(op) => fmt::Display::fmt(op, f),
            InnerError::Incomplete => write!(f, "expected more input"),
        }
    }
}

/// Error type that contains the reason of the error and the unconsumed input.
///
/// For error location information see [ParseError::verbose].
#[derive(Clone, Debug)]
pub struct ParseError<Kind> {
    stack: Vec<(String, InnerError<Kind>)>,
}

impl<Kind> ParseError<Kind> {
    pub(crate) fn from_kind(input: &str, kind: Kind) -> ParseError<Kind> {
        ParseError {
            stack: vec![(input.to_string(), InnerError::Other(kind))],
        }
    }

    pub(crate) fn incomplete() -> ParseError<Kind> {
        ParseError {
            stack: vec![(String::new(), InnerError::Incomplete)],
        }
    }
}

/// Error type containing location information in addition to the reason of the error.
///
/// Created from a [ParseError] with [ParseError::verbose].
#[derive(Clone, Debug, PartialEq)]
pub struct VerboseParseError {
    /// The line number of the error location.
    pub line: usize,
    /// The column number of the error location.
    pub column: usize,
    /// Description of what went wrong, innermost reason first.
    pub message: String,
    /// A short excerpt of the input at the error location.
    pub rest: String,
}

impl fmt::Display for VerboseParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "at line {} col {}: {}, at '{}'", self.line, self.column, self.message, self.rest)
    }
}

impl<Kind: Display> ParseError<Kind> {
    /// Calculates the error location information from the [ParseError] and the original input
    /// buffer.
    ///
    /// # Parameters
    /// - `input`: The original input buffer or an exact copy of it.
    pub fn verbose(self, input: &str) -> VerboseParseError {
        let message = self.stack.iter()
            .map(|(_, kind)| kind.to_string())
            .dedup()
            .join(": ");

        let rest = self.stack.first()
            .map(|(rest, _)| rest.len())
            .unwrap_or(0);

        let start = input.len().saturating_sub(rest);

        let mut line = 1;
        let mut column = 1;

        for ch in input[..start].chars() {
            if ch == '\n' {
                line += 1;
                column = 0;
            }

            column += 1;
        }

        let rest = input[start..]
            .chars()
            .take_while(|ch| *ch != '\n')
            .take(20)
            .collect();

        VerboseParseError {
            line,
            column,
            message,
            rest,
        }
    }
}

impl<Kind: Display> fmt::Display for ParseError<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (input, kind) = &self.stack[0];

        let excerpt: String = input
            .chars()
            .take_while(|ch| *ch != '\n')
            .take(20)
            .collect();

        write!(f, "{} at: {}", kind, excerpt)
    }
}

impl<Kind> nom::error::ParseError<&str> for ParseError<Kind> {
    fn from_error_kind(input: &str, kind: ErrorKind) -> Self {
        ParseError {
            stack: vec![(input.to_string(), InnerError::Nom(kind))],
        }
    }

    fn append(input: &str, kind: ErrorKind, mut other: Self) -> Self {
        other.stack.push((input.to_string(), InnerError::Nom(kind)));
        other
    }

    fn add_context(input: &str, ctx: &'static str, mut other: Self) -> Self {
        other.stack.push((input.to_string(), InnerError::Context(ctx)));
        other
    }
}

/// Reasons for a syntax error that nom itself does not know about.
#[derive(Clone, Debug, PartialEq)]
pub enum SyntaxErrorKind {
    /// A hex literal does not fit in 32 bits.
    LiteralOverflow,
    /// A bracketed expression could not be parsed.
    Expression {
        /// Byte offset inside the brackets.
        offset: usize,
        reason: &'static str,
    },
    /// None of the operand formats of the mnemonic matched.
    Operands {
        mnemonic: &'static str,
    },
}

impl fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyntaxErrorKind::LiteralOverflow => write!(f, "literal too large"),
            SyntaxErrorKind::Expression { offset, reason } =>
                write!(f, "invalid expression at offset {}: {}", offset, reason),
            SyntaxErrorKind::Operands { mnemonic } =>
                write!(f, "operands do not match any form of '{}'", mnemonic),
        }
    }
}

/// Errors detected while resolving symbols and encoding a parsed program.
#[derive(Clone, Debug, PartialEq)]
pub enum CompileError {
    /// A label, constant, data block or structure reuses a name that is already bound.
    DuplicateBinding {
        name: String,
        span: Option<Span>,
    },
    /// A symbol reference names a label, constant or data block that was never bound.
    UnresolvedSymbol {
        name: String,
        /// The closest known name, if any is close enough.
        suggestion: Option<String>,
    },
    /// A `<Struct>` interpretation names an unknown structure.
    UnknownStructure {
        name: String,
    },
    /// A `<Struct> symbol.member` interpretation names a member the structure does not have.
    UnknownMember {
        structure: String,
        member: String,
    },
    /// The expression uses an operator the assembler cannot evaluate.
    UnsupportedOperator {
        operator: Operator,
    },
    /// The operands of an instruction node do not have the shape its opcode requires.
    FormatMismatch {
        opcode: OpCode,
    },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompileError::DuplicateBinding { name, .. } =>
                write!(f, "can't bind '{}' because a binding with this name already exists", name),
            CompileError::UnresolvedSymbol { name, suggestion: Some(suggestion) } =>
                write!(f, "symbol '{}' wasn't resolved (did you mean '{}'?)", name, suggestion),
            CompileError::UnresolvedSymbol { name, suggestion: None } =>
                write!(f, "symbol '{}' wasn't resolved", name),
            CompileError::UnknownStructure { name } =>
                write!(f, "structure '{}' wasn't resolved", name),
            CompileError::UnknownMember { structure, member } =>
                write!(f, "member '{}' in structure '{}' wasn't resolved", member, structure),
            CompileError::UnsupportedOperator { operator } =>
                write!(f, "unsupported binary operation '{}'", operator),
            CompileError::FormatMismatch { opcode } =>
                write!(f, "operands do not match the format of {}", opcode),
        }
    }
}

/// Error returned by [assemble](crate::assemble): either the source did not parse or
/// it could not be compiled.
#[derive(Clone, Debug, PartialEq)]
pub enum AssemblyError {
    Syntax(VerboseParseError),
    Compile(CompileError),
}

impl From<CompileError> for AssemblyError {
    fn from(e: CompileError) -> AssemblyError {
        AssemblyError::Compile(e)
    }
}

impl From<VerboseParseError> for AssemblyError {
    fn from(e: VerboseParseError) -> AssemblyError {
        AssemblyError::Syntax(e)
    }
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AssemblyError::Syntax(e) => write!(f, "syntax error {}", e),
            AssemblyError::Compile(e) => write!(f, "compile error: {}", e),
        }
    }
}

impl std::error::Error for AssemblyError {}

/// An encoded program does not follow the instruction set.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodeError {
    /// The byte at `address` is not an opcode.
    UnknownOpCode {
        address: u16,
        byte: u8,
    },
    /// The program ends in the middle of the instruction starting at `address`.
    Truncated {
        address: u16,
        opcode: OpCode,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::UnknownOpCode { address, byte } =>
                write!(f, "unknown opcode 0x{:02x} at 0x{:04x}", byte, address),
            DecodeError::Truncated { address, opcode } =>
                write!(f, "truncated {} at 0x{:04x}", opcode, address),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors of backing stores, devices and the memory mapper.
#[derive(Clone, Debug, PartialEq)]
pub enum MemoryError {
    /// An access outside of a backing buffer.
    OutOfBounds {
        offset: usize,
        size: usize,
    },
    /// A mapping request with `start > end` or an end outside of the address space.
    InvalidRange {
        start: usize,
        end: usize,
    },
    /// A device failed to perform the side effect of a write.
    Device {
        address: u16,
        message: String,
    },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MemoryError::OutOfBounds { offset, size } =>
                write!(f, "offset 0x{:x} out of bounds for memory of size 0x{:x}", offset, size),
            MemoryError::InvalidRange { start, end } =>
                write!(f, "invalid mapping range 0x{:x}..=0x{:x}", start, end),
            MemoryError::Device { address, message } =>
                write!(f, "device error at 0x{:04x}: {}", address, message),
        }
    }
}

impl std::error::Error for MemoryError {}

/// A register was requested by a name outside of the register file.
#[derive(Clone, Debug, PartialEq)]
pub struct UnknownRegister(pub String);

impl fmt::Display for UnknownRegister {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "no such register {}", self.0)
    }
}

impl std::error::Error for UnknownRegister {}

/// Errors that abort a single emulator operation.
#[derive(Clone, Debug, PartialEq)]
pub enum EmulatorError {
    Memory(MemoryError),
    UnknownRegister(UnknownRegister),
}

impl From<MemoryError> for EmulatorError {
    fn from(e: MemoryError) -> EmulatorError {
        EmulatorError::Memory(e)
    }
}

impl From<UnknownRegister> for EmulatorError {
    fn from(e: UnknownRegister) -> EmulatorError {
        EmulatorError::UnknownRegister(e)
    }
}

impl fmt::Display for EmulatorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EmulatorError::Memory(e) => write!(f, "memory error: {}", e),
            EmulatorError::UnknownRegister(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for EmulatorError {}

#[test]
fn test_verbose_location() {
    let input = "mov $1, r1\nmov ?, r2\n";
    let error = ParseError::<SyntaxErrorKind>::from_kind(&input[15..], SyntaxErrorKind::LiteralOverflow);
    let verbose = error.verbose(input);

    assert_eq!(verbose.line, 2);
    assert_eq!(verbose.column, 5);
    assert_eq!(verbose.rest, "?, r2");
    assert_eq!(verbose.message, "literal too large");
}
