use slog::{o, Discard, Logger};

use vm16::{
    compiler::bind_symbols,
    emulator::{Emulator, STACK_START},
    instruction::Register,
    memory::{Device, Memory, MemoryMapper},
    symbol_table::SymbolKind,
    symbolic,
};

fn parse() -> symbolic::Program {
    symbolic::Program::parse(include_str!("structures.asm")).unwrap()
}

#[test]
fn test_structures_bindings() {
    let program = parse();
    let context = bind_symbols(&program, &Logger::root(Discard, o!())).unwrap();

    let origin = context.symbols.resolve("origin").unwrap();
    let coords = context.symbols.get("coords").unwrap();
    let result = context.symbols.get("result").unwrap();

    assert_eq!(coords.value, origin);
    assert_eq!(coords.kind, SymbolKind::Data);
    assert_eq!(result.value, origin + 4);
    assert!(result.exported);

    assert_eq!(context.structures.resolve("Point", "y"), Ok(2));
    assert_eq!(context.address as usize, program.compile().unwrap().len());
}

#[test]
fn test_structures_execute() {
    let program = parse();
    let compiled = program.compile().unwrap();
    let result = (compiled.len() - 2) as u16;

    let mut mapper = MemoryMapper::new();
    mapper.map(Memory::new(0x10000), 0x0000, 0xFFFF, true).unwrap();
    mapper.load(0, compiled.as_bytes()).unwrap();

    let mut emulator = Emulator::new(mapper);
    emulator.run().unwrap();

    assert_eq!(emulator.memory.get_u16(result).unwrap(), 0x2a);
    assert_eq!(emulator.register(Register::R1), 0x15);
    assert_eq!(emulator.register(Register::Sp), STACK_START);
    assert_eq!(emulator.register(Register::Fp), STACK_START);
    assert_eq!(emulator.stack_frame_size(), 0);
}
