use std::fmt;

use crate::bytecode;
use crate::compiler::{compile, WithSourceMap};
use crate::error::{CompileError, VerboseParseError};
use crate::parsing::Span;
use crate::source_map::SourceMap;

use super::ast::Node;
use super::parser::parse_nodes;

/// A parsed assembly program: the nodes of the source in order of appearance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    pub nodes: Vec<Node>,
}

impl Program {
    /// Parses assembly source.
    ///
    /// # Errors
    /// The first syntax error, with its line and column in `input`.
    pub fn parse(input: &str) -> Result<Program, VerboseParseError> {
        let nodes = parse_nodes(input).map_err(|e| e.verbose(input))?;

        Ok(Program { nodes })
    }

    /// Encodes the program, resolving every symbol.
    pub fn compile(&self) -> Result<bytecode::Program, CompileError> {
        compile(self)
    }

    /// Like [Program::compile], but also records which node produced each address.
    pub fn compile_sourcemap(&self) -> Result<(bytecode::Program, SourceMap<Span>), CompileError> {
        let compiled: WithSourceMap<bytecode::Program> = compile(self)?;

        Ok((compiled.compiled, compiled.source_map))
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for node in &self.nodes {
            writeln!(f, "{}", node.kind)?;
        }

        Ok(())
    }
}

#[test]
fn test_program_display_reparses() {
    let source = "
        +constant LIMIT = $10
        data8 bytes = { $1, $2 }
        start:
            mov [!LIMIT * $2], r1
            jne $0, &[!start]
            hlt
    ";

    let program = Program::parse(source).unwrap();
    let printed = program.to_string();
    let reparsed = Program::parse(&printed).unwrap();

    let kinds = |p: &Program| p.nodes.iter().map(|n| n.kind.clone()).collect::<Vec<_>>();
    assert_eq!(kinds(&program), kinds(&reparsed));
}

#[test]
fn test_program_parse_error() {
    let error = Program::parse("start:\n  mov r1\n").unwrap_err();

    assert_eq!(error.line, 2);
    assert_eq!(error.column, 7);
}
