use std::fmt;

use clap::{App, Arg, ArgMatches};
use slog::{o, Discard, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

use vm16::{
    device::ScreenDevice,
    emulator::{Config, Emulator},
    error::{AssemblyError, EmulatorError, MemoryError},
    memory::{Memory, MemoryMapper},
};

enum Error {
    Assembly(AssemblyError),
    Execution(EmulatorError),
    Arguments(String),
    IO(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::IO(e)
    }
}

impl From<AssemblyError> for Error {
    fn from(e: AssemblyError) -> Error {
        Error::Assembly(e)
    }
}

impl From<EmulatorError> for Error {
    fn from(e: EmulatorError) -> Error {
        Error::Execution(e)
    }
}

impl From<MemoryError> for Error {
    fn from(e: MemoryError) -> Error {
        Error::Execution(e.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Assembly(e) => write!(f, "{}", e),
            Error::Execution(e) => write!(f, "execution error: {}", e),
            Error::Arguments(e) => write!(f, "{}", e),
            Error::IO(e) => write!(f, "IO error: {}", e),
        }
    }
}

fn parse_arguments() -> ArgMatches<'static> {
    App::new("vm16run")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility for assembling and executing vm16 programs")
        .arg(Arg::with_name("source")
             .help("File containing assembly source (.asm) or an encoded program")
             .value_name("SOURCE")
             .required(true)
             .index(1))
        .arg(Arg::with_name("interrupt-vector")
             .help("Hex address of the interrupt vector table")
             .long("interrupt-vector")
             .value_name("ADDRESS")
             .default_value("1000"))
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

    if let Err(e) = run(&args, logger) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &ArgMatches, logger: Logger) -> Result<(), Error> {
    let file_path = args.value_of("source").unwrap_or_default();
    let vector = args.value_of("interrupt-vector").unwrap_or("1000");

    let config = Config {
        interrupt_vector_address: u16::from_str_radix(vector.trim_start_matches("0x"), 16)
            .map_err(|_| Error::Arguments(format!("invalid interrupt vector address '{}'", vector)))?,
    };

    let program = if file_path.ends_with(".asm") {
        let source = std::fs::read_to_string(file_path)?;
        vm16::assemble(&source)?
    } else {
        std::fs::read(file_path)?
    };

    let mut mapper = MemoryMapper::new();
    mapper.map(Memory::new(0x10000), 0x0000, 0xFFFF, true)?;
    mapper.map(ScreenDevice::new(std::io::stdout()), 0x3000, 0x31FF, true)?;
    mapper.load(0, &program)?;

    let mut emulator = Emulator::with_logger(mapper, config, logger);
    emulator.run()?;

    Ok(())
}
