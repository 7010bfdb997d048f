//! Parsing and storing assembly source programs.

pub mod ast;
pub mod parser;
pub mod program;
pub mod token;

pub use self::program::Program;
