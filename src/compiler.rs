//! Compilation from parsed assembly into bytecode.
//!
//! Compilation is done in two passes over the nodes of a [Program](symbolic::Program).
//! The first pass binds every label, constant, data block and structure and computes the
//! address of each node. The second pass evaluates operand expressions and encodes the
//! instructions and data. Forward references are allowed everywhere.

use slog::{o, trace, Discard, Logger};

use crate::bytecode::Program;
use crate::error::CompileError;
use crate::instruction::Register;
use crate::parsing::Span;
use crate::source_map::SourceMap;
use crate::symbol_table::{StructureInfo, StructureTable, SymbolInfo, SymbolKind, SymbolTable};
use crate::symbolic;
use crate::symbolic::ast::{DataSize, Expression, Instruction, NodeKind, Operands, Operator};

/// Defines an interface for a data structure into which bytecode can be compiled.
pub trait CompileTarget: Sized {
    /// Create an empty instance of itself.
    fn create() -> Self;

    /// Create an empty instance with room for `size` bytes.
    /// This is just a hint. The provided default implementation is a call to
    /// [CompileTarget::create].
    fn with_capacity(_size: usize) -> Self {
        Self::create()
    }

    /// Appends the encoding of one node, which starts at `address`.
    ///
    /// Nodes are pushed in address order without gaps.
    fn push_bytes(&mut self, span: Option<Span>, address: u16, bytes: &[u8]);

    /// Finalize the compilation.
    /// The compiler will not modify the data structure after this.
    fn finish(self) -> Self {
        self
    }
}

impl CompileTarget for Program {
    fn create() -> Program {
        Program::default()
    }

    fn with_capacity(size: usize) -> Program {
        Program::from(Vec::with_capacity(size))
    }

    fn push_bytes(&mut self, _span: Option<Span>, _address: u16, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }
}

/// Captures the source spans seen during compilation and produces a mapping from
/// addresses into the nodes that produced them.
pub struct WithSourceMap<T: CompileTarget> {
    /// The actual artifact of the compilation.
    pub compiled: T,

    /// Map from every encoded address into the span of its node.
    pub source_map: SourceMap<Span>,
}

impl<T: CompileTarget> CompileTarget for WithSourceMap<T> {
    fn create() -> Self {
        WithSourceMap {
            compiled: T::create(),
            source_map: SourceMap::default(),
        }
    }

    fn with_capacity(size: usize) -> Self {
        WithSourceMap {
            compiled: T::with_capacity(size),
            source_map: SourceMap::default(),
        }
    }

    fn push_bytes(&mut self, span: Option<Span>, address: u16, bytes: &[u8]) {
        if let Some(ref span) = span {
            for offset in 0..bytes.len() {
                self.source_map.insert(address.wrapping_add(offset as u16), span.clone());
            }
        }

        self.compiled.push_bytes(span, address, bytes);
    }

    fn finish(self) -> Self {
        WithSourceMap {
            compiled: self.compiled.finish(),
            source_map: self.source_map,
        }
    }
}

/// Bindings of one compilation.
#[derive(Debug, Default)]
pub struct Context {
    pub symbols: SymbolTable,
    pub structures: StructureTable,
    /// Address of the next node.
    pub address: u16,
}

impl Context {
    fn ensure_unbound(&self, name: &str, span: &Span) -> Result<(), CompileError> {
        if self.symbols.contains(name) || self.structures.contains(name) {
            return Err(CompileError::DuplicateBinding {
                name: name.to_string(),
                span: Some(span.clone()),
            });
        }

        Ok(())
    }

    fn bind_symbol(&mut self, name: &str, kind: SymbolKind, value: u16, exported: bool, span: &Span)
        -> Result<(), CompileError>
    {
        self.ensure_unbound(name, span)?;

        self.symbols.define(name, SymbolInfo {
            kind,
            value,
            exported,
            defined: Some(span.clone()),
        })
    }

    /// Evaluates an operand expression. Every operator result is truncated to 16 bits.
    pub fn evaluate(&self, expression: &Expression) -> Result<u16, CompileError> {
        match expression {
            Expression::Literal(value) => Ok(*value as u16),
            Expression::Symbol(name) => self.symbols.resolve(name),
            Expression::InterpretAs { structure, symbol, member } => {
                let offset = self.structures.resolve(structure, member)?;
                let base = self.symbols.resolve(symbol)?;

                Ok(base.wrapping_add(offset))
            },
            Expression::Binary { operator, lhs, rhs } => {
                let lhs = self.evaluate(lhs)?;
                let rhs = self.evaluate(rhs)?;

                match operator {
                    Operator::Add => Ok(lhs.wrapping_add(rhs)),
                    Operator::Subtract => Ok(lhs.wrapping_sub(rhs)),
                    Operator::Multiply => Ok(lhs.wrapping_mul(rhs)),
                    operator => Err(CompileError::UnsupportedOperator { operator: *operator }),
                }
            },
        }
    }

    fn encode(&self, instruction: &Instruction) -> Result<Vec<u8>, CompileError> {
        let opcode = instruction.opcode;

        if instruction.operands.format() != opcode.format() {
            return Err(CompileError::FormatMismatch { opcode });
        }

        let mut bytes = Vec::with_capacity(opcode.size() as usize);
        bytes.push(opcode.as_byte());

        let word = |bytes: &mut Vec<u8>, expr: &Expression| -> Result<(), CompileError> {
            bytes.extend_from_slice(&self.evaluate(expr)?.to_be_bytes());
            Ok(())
        };

        let reg = |bytes: &mut Vec<u8>, register: &Register| bytes.push(register.as_byte());

        match &instruction.operands {
            Operands::LitReg(lit, r) | Operands::MemReg(lit, r) | Operands::LitRegPtr(lit, r) => {
                word(&mut bytes, lit)?;
                reg(&mut bytes, r);
            },
            Operands::RegLit(r, lit) | Operands::RegMem(r, lit) => {
                reg(&mut bytes, r);
                word(&mut bytes, lit)?;
            },
            Operands::RegLit8(r, lit) => {
                reg(&mut bytes, r);
                bytes.push(self.evaluate(lit)? as u8);
            },
            Operands::RegReg(a, b) | Operands::RegPtrReg(a, b) => {
                reg(&mut bytes, a);
                reg(&mut bytes, b);
            },
            Operands::LitMem(lit, addr) => {
                word(&mut bytes, lit)?;
                word(&mut bytes, addr)?;
            },
            Operands::LitOffReg(lit, ptr, r) => {
                word(&mut bytes, lit)?;
                reg(&mut bytes, ptr);
                reg(&mut bytes, r);
            },
            Operands::NoArgs => (),
            Operands::SingleReg(r) => reg(&mut bytes, r),
            Operands::SingleLit(expr) | Operands::SingleMem(expr) => word(&mut bytes, expr)?,
        }

        Ok(bytes)
    }
}

fn encode_data(size: DataSize, values: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * size.bytes() as usize);

    for value in values {
        match size {
            DataSize::Bits8 => bytes.push(*value as u8),
            DataSize::Bits16 => bytes.extend_from_slice(&(*value as u16).to_be_bytes()),
        }
    }

    bytes
}

/// Binds every name of the program and computes its size.
///
/// # Errors
/// [CompileError::DuplicateBinding] if a name is bound twice, as any kind of binding.
pub fn bind_symbols(program: &symbolic::Program, logger: &Logger) -> Result<Context, CompileError> {
    let mut context = Context::default();

    for node in &program.nodes {
        let span = &node.span;

        match &node.kind {
            NodeKind::Label(name) => {
                trace!(logger, "bind label"; "name" => name, "address" => context.address);
                context.bind_symbol(name, SymbolKind::Label, context.address, false, span)?;
            },
            NodeKind::Constant { exported, name, value } => {
                trace!(logger, "bind constant"; "name" => name, "value" => value);
                context.bind_symbol(name, SymbolKind::Constant, *value as u16, *exported, span)?;
            },
            NodeKind::Data { exported, size, name, values } => {
                trace!(logger, "bind data"; "name" => name, "address" => context.address);
                context.bind_symbol(name, SymbolKind::Data, context.address, *exported, span)?;

                let length = size.bytes().wrapping_mul(values.len() as u16);
                context.address = context.address.wrapping_add(length);
            },
            NodeKind::Structure { exported, name, members } => {
                trace!(logger, "bind structure"; "name" => name, "members" => members.len());
                context.ensure_unbound(name, span)?;

                let info = StructureInfo::from_sizes(
                    members.iter().map(|member| (member.name.as_str(), member.size)),
                    *exported,
                    Some(span.clone()),
                );

                context.structures.define(name, info)?;
            },
            NodeKind::Instruction(instruction) => {
                context.address = context.address.wrapping_add(instruction.opcode.size());
            },
        }
    }

    Ok(context)
}

/// Compiles the given assembly program into bytecode.
/// Supports compilation into multiple data structures, but most often the compilation target is
/// [crate::bytecode::Program] possibly wrapped in [WithSourceMap].
pub fn compile<T>(program: &symbolic::Program) -> Result<T, CompileError>
where
    T: CompileTarget,
{
    compile_with_logger(program, None)
}

pub fn compile_with_logger<T, L>(program: &symbolic::Program, logger: L) -> Result<T, CompileError>
where
    T: CompileTarget,
    L: Into<Option<Logger>>,
{
    let logger = logger
        .into()
        .unwrap_or_else(|| Logger::root(Discard, o!()))
        .new(o!("stage" => "compilation"));

    let context = bind_symbols(program, &logger)?;

    let mut target = T::with_capacity(context.address as usize);
    let mut address = 0u16;

    for node in &program.nodes {
        let bytes = match &node.kind {
            NodeKind::Data { size, values, .. } => encode_data(*size, values),
            NodeKind::Instruction(instruction) => {
                let bytes = context.encode(instruction)?;
                trace!(logger, "encode instruction"; "address" => address, "opcode" => %instruction.opcode);
                bytes
            },
            _ => continue,
        };

        target.push_bytes(Some(node.span.clone()), address, &bytes);
        address = address.wrapping_add(bytes.len() as u16);
    }

    Ok(target.finish())
}

#[cfg(test)]
fn assemble(source: &str) -> Result<Vec<u8>, CompileError> {
    let program = symbolic::Program::parse(source).unwrap();
    compile::<Program>(&program).map(Program::into_bytes)
}

#[test]
fn test_compile() {
    let bytes = assemble("
        mov $1234, r1
        mov $abcd, r2
        add r1, r2
        mov acc, r3
        hlt
    ").unwrap();

    assert_eq!(bytes, vec![
        0x10, 0x12, 0x34, 0x00,
        0x10, 0xab, 0xcd, 0x01,
        0x14, 0x00, 0x01,
        0x11, 0x0B, 0x02,
        0xFF,
    ]);
}

#[test]
fn test_compile_forward_references_and_data() {
    let bytes = assemble("
        constant OFFSET = $2
        jmp &[!end]
        data8 bytes = { $1, $1ff }
        data16 words = { $beef }
        end:
            mov [!words + !OFFSET], r1
            lsf r1, $108
    ").unwrap();

    assert_eq!(bytes, vec![
        0x4A, 0x00, 0x07,
        0x01, 0xff,
        0xbe, 0xef,
        0x10, 0x00, 0x07, 0x00,
        0x26, 0x00, 0x08,
    ]);
}

#[test]
fn test_compile_structures() {
    let bytes = assemble("
        structure Point {
            x: $02,
            y: $02
        }

        mov [<Point> origin.y], r1
        origin:
        data16 coords = { $1, $2 }
    ").unwrap();

    assert_eq!(&bytes[..4], &[0x10, 0x00, 0x06, 0x00]);
}

#[test]
fn test_compile_duplicate_bindings() {
    let cases = vec![
        "constant x = $1\nx:\nhlt",
        "x:\ndata8 x = { $1 }",
        "structure x { a: $1 }\nx:",
        "x:\nstructure x { a: $1 }",
        "x:\nx:",
    ];

    for source in cases {
        match assemble(source) {
            Err(CompileError::DuplicateBinding { name, span: Some(_) }) => assert_eq!(name, "x"),
            other => panic!("{:?}: {:?}", source, other),
        }
    }
}

#[test]
fn test_compile_errors() {
    assert_eq!(
        assemble("start:\njmp &[!strat]"),
        Err(CompileError::UnresolvedSymbol { name: "strat".into(), suggestion: Some("start".into()) }),
    );

    assert_eq!(
        assemble("mov [$4 / $2], r1"),
        Err(CompileError::UnsupportedOperator { operator: Operator::Divide }),
    );

    assert_eq!(
        assemble("structure P { x: $1 }\nmov [<P> nowhere.x], r1"),
        Err(CompileError::UnresolvedSymbol { name: "nowhere".into(), suggestion: None }),
    );

    assert_eq!(
        assemble("a:\nmov [<Q> a.x], r1"),
        Err(CompileError::UnknownStructure { name: "Q".into() }),
    );
}

#[test]
fn test_evaluate_truncates() {
    let context = Context::default();
    let program = symbolic::Program::parse("mov [$ffff * $3 + $10 - $20], r1").unwrap();

    let expression = match &program.nodes[0].kind {
        NodeKind::Instruction(Instruction { operands: Operands::LitReg(expr, _), .. }) => expr.clone(),
        other => panic!("{:?}", other),
    };

    assert_eq!(context.evaluate(&expression), Ok(0xFFFDu16.wrapping_add(0x10).wrapping_sub(0x20)));
}

#[test]
fn test_compile_sourcemap() {
    let source = "start:\n  mov $1, r1\n  data8 d = { $5 }\n  hlt\n";

    let program = symbolic::Program::parse(source).unwrap();
    let compiled: WithSourceMap<Program> = compile(&program).unwrap();

    let line_of = |addr: u16| compiled.source_map
        .get_source_span(addr)
        .map(|span| &source[span.clone()]);

    assert_eq!(line_of(0), Some("mov $1, r1"));
    assert_eq!(line_of(3), Some("mov $1, r1"));
    assert_eq!(line_of(4), Some("data8 d = { $5 }"));
    assert_eq!(line_of(5), Some("hlt"));
    assert_eq!(line_of(6), None);
    assert_eq!(compiled.compiled.as_bytes(), &[0x10, 0x00, 0x01, 0x00, 0x05, 0xFF]);
}
