//! A crate for assembling and running programs for a small 16-bit virtual machine with a
//! memory-mapped address space.
//!
//! Currently this crate provides the functionality to:
//! - Parse assembly source with labels, constants, data blocks, structures and bracketed
//!   compile-time expressions.
//! - Compile the source into the flat binary encoding of the instruction set.
//! - Validate and disassemble encoded programs.
//! - Execute encoded programs on an emulator whose bus maps RAM and peripherals, such as
//!   a character-cell screen, into one address space.
//!
//! # Example
//! ```
//! use vm16::{
//!     emulator::Emulator,
//!     instruction::Register,
//!     memory::{Memory, MemoryMapper},
//!     symbolic::Program,
//! };
//!
//! // Adds two numbers and copies the sum from the accumulator to r3.
//! let source = "
//!     mov $1234, r1
//!     mov $abcd, r2
//!     add r1, r2
//!     mov acc, r3
//!     hlt
//! ";
//!
//! // Parse the source into a list of nodes.
//! let program = Program::parse(source).unwrap();
//!
//! // Resolve the symbols and encode the program.
//! let compiled = program.compile().unwrap();
//!
//! // Map 64 KiB of RAM and load the program at address 0.
//! let mut mapper = MemoryMapper::new();
//! mapper.map(Memory::new(0x10000), 0x0000, 0xFFFF, true).unwrap();
//! mapper.load(0, compiled.as_bytes()).unwrap();
//!
//! // Execute until `hlt`.
//! let mut emulator = Emulator::new(mapper);
//! emulator.run().unwrap();
//!
//! assert_eq!(emulator.register(Register::R3), 0xbe01);
//! ```
//!
//! # Executables
//!
//! Both are behind cargo features.
//!
//! ## `vm16asm`
//!
//! Assembles a source file and writes the encoding to an output file. Nothing is
//! written unless the whole file assembles.
//!
//! ```text
//! $ vm16asm program.asm program.bin
//! ```
//!
//! ## `vm16run`
//!
//! Runs an assembly source file or an encoded program with a screen mapped at
//! `0x3000..=0x31ff`.

pub mod bytecode;
pub mod compiler;
pub mod device;
pub mod emulator;
pub mod error;
pub mod event;
pub mod instruction;
pub mod memory;
pub mod parsing;
pub mod source_map;
pub mod symbol_table;
pub mod symbolic;

use crate::error::AssemblyError;

/// Parses and compiles assembly source in one go.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblyError> {
    let program = symbolic::Program::parse(source)?;
    let compiled = program.compile()?;

    Ok(compiled.into_bytes())
}

#[test]
fn test_assemble_reports_both_error_kinds() {
    match assemble("mov ?, r1") {
        Err(AssemblyError::Syntax(e)) => assert_eq!((e.line, e.column), (1, 5)),
        other => panic!("{:?}", other),
    }

    match assemble("jmp &[!nowhere]") {
        Err(AssemblyError::Compile(_)) => (),
        other => panic!("{:?}", other),
    }
}
