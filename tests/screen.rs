use std::cell::RefCell;
use std::rc::Rc;

use vm16::{
    device::ScreenDevice,
    emulator::{Config, Emulator, STACK_START},
    event::Event,
    instruction::Register,
    memory::{Memory, MemoryMapper},
};

fn setup(config: Config) -> (Emulator, Rc<RefCell<ScreenDevice<Vec<u8>>>>) {
    let program = vm16::assemble(include_str!("screen.asm")).unwrap();
    let screen = Rc::new(RefCell::new(ScreenDevice::new(Vec::new())));

    let mut mapper = MemoryMapper::new();
    mapper.map(Memory::new(0x10000), 0x0000, 0xFFFF, true).unwrap();
    mapper.map(screen.clone(), 0x3000, 0x31FF, true).unwrap();
    mapper.load(0, &program).unwrap();

    (Emulator::with_config(mapper, config), screen)
}

#[test]
fn test_screen_output() {
    let (mut emulator, screen) = setup(Config::default());

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    emulator.add_listener(move |event: &Event| sink.borrow_mut().push(event.clone()));

    emulator.run().unwrap();

    let output = String::from_utf8(screen.borrow().get_ref().clone()).unwrap();

    assert_eq!(output, "\x1b[2J\x1b[1;2HH\x1b[1m\x1b[1;3Hi\x1b[1;4H!");
    assert_eq!(emulator.register(Register::Sp), STACK_START);
    assert!(!emulator.in_interrupt_handler());

    let events = events.borrow();
    assert!(events.contains(&Event::Interrupt { vector: 1 }));
    assert_eq!(events.last(), Some(&Event::Halt));
}

#[test]
fn test_screen_interrupt_masked() {
    let (mut emulator, screen) = setup(Config::default());

    emulator.set_register(Register::Im, 0xFFFD);
    emulator.run().unwrap();

    let output = String::from_utf8(screen.borrow().get_ref().clone()).unwrap();

    assert_eq!(output, "\x1b[2J\x1b[1;2HH\x1b[1;4H!");
}
