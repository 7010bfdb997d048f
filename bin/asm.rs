use std::fmt;

use clap::{App, Arg, ArgMatches};
use slog::{o, Discard, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

use vm16::{
    bytecode,
    compiler::compile_with_logger,
    error::{CompileError, VerboseParseError},
    symbolic,
};

enum Error {
    Parse(VerboseParseError),
    Compile(CompileError),
    IO(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::IO(e)
    }
}

impl From<VerboseParseError> for Error {
    fn from(e: VerboseParseError) -> Error {
        Error::Parse(e)
    }
}

impl From<CompileError> for Error {
    fn from(e: CompileError) -> Error {
        Error::Compile(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "parse error {}", e),
            Error::Compile(e) => write!(f, "compile error: {}", e),
            Error::IO(e) => write!(f, "IO error: {}", e),
        }
    }
}

fn parse_arguments() -> ArgMatches<'static> {
    App::new("vm16asm")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Assembles vm16 source into its binary encoding")
        .arg(Arg::with_name("source")
             .help("File containing assembly source")
             .value_name("SOURCE")
             .required(true)
             .index(1))
        .arg(Arg::with_name("output")
             .help("File to write the encoded program to")
             .value_name("OUTPUT")
             .index(2))
        .arg(Arg::with_name("verbose")
             .help("Enables verbose logging")
             .long("verbose")
             .short("v"))
        .get_matches()
}

fn main() {
    let args = parse_arguments();

    let logger = if args.is_present("verbose") {
        let decorator = TermDecorator::new().build();
        let drain = FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        Logger::root(drain, o!())
    } else {
        Logger::root(Discard, o!())
    };

    let source = args.value_of("source").unwrap_or_default();

    if let Err(e) = assemble(source, args.value_of("output"), logger) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn assemble(source_path: &str, output_path: Option<&str>, logger: Logger) -> Result<(), Error> {
    let source = std::fs::read_to_string(source_path)?;

    let program = symbolic::Program::parse(&source)?;
    let compiled: bytecode::Program = compile_with_logger(&program, logger)?;

    match output_path {
        Some(path) => std::fs::write(path, compiled.as_bytes())?,
        None => print!("{}", compiled),
    }

    Ok(())
}
