//! Encoded programs: validation against the instruction set and disassembly.

mod program;

pub use self::program::Program;
