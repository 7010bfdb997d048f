use vm16::{
    bytecode::Program,
    emulator::Emulator,
    instruction::Register,
    memory::{Device, Memory, MemoryMapper},
    symbolic,
};

fn compile() -> Program {
    let source = include_str!("sum.asm");

    symbolic::Program::parse(source)
        .unwrap()
        .compile()
        .unwrap()
}

fn emulator(program: &Program) -> Emulator {
    let mut mapper = MemoryMapper::new();
    mapper.map(Memory::new(0x10000), 0x0000, 0xFFFF, true).unwrap();
    mapper.load(0, program.as_bytes()).unwrap();

    Emulator::new(mapper)
}

#[test]
fn test_sum_compile() {
    let program = compile();

    assert_eq!(&program.as_bytes()[..8], &[
        0x10, 0x00, 0x0a, 0x00,
        0x10, 0x00, 0x00, 0x02,
    ]);

    // The program ends with the zeroed result word.
    assert_eq!(&program.as_bytes()[program.len() - 3..], &[0xFF, 0x00, 0x00]);
}

#[test]
fn test_sum_execute() {
    let program = compile();
    let result = (program.len() - 2) as u16;

    let mut emulator = emulator(&program);
    let mut halted_with = None;

    emulator.run_with_callback(|emulator| {
        halted_with = Some(emulator.register(Register::R3));
    }).unwrap();

    assert_eq!(halted_with, Some(55));
    assert_eq!(emulator.memory.get_u16(result).unwrap(), 55);
    assert_eq!(emulator.register(Register::R1), 0);
}

#[test]
fn test_sum_step_limit() {
    let program = compile();
    let mut emulator = emulator(&program);

    assert_eq!(emulator.run_for(5).unwrap(), false);
    assert_eq!(emulator.register(Register::R3), 10);
    assert_eq!(emulator.run_for(1000).unwrap(), true);
}
