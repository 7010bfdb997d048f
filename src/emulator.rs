//! [Emulator] for executing encoded programs.
//!
//! The emulator fetches instructions from a [Device], usually a [MemoryMapper] that has
//! RAM and peripherals mapped into it. One call to [Emulator::step] performs exactly one
//! fetch-decode-execute cycle; [Emulator::run] and friends drive it until the program
//! halts.

use std::fmt::Write;
use std::time::Duration;

use slog::{o, trace, Discard, Logger};

use crate::error::{EmulatorError, UnknownRegister};
use crate::event::{Event, EventDispatcher, EventListener};
use crate::instruction::{OpCode, OperandFormat, Register, REGISTER_COUNT};
use crate::memory::{Device, MemoryMapper};

/// Initial value of the stack and frame pointers.
pub const STACK_START: u16 = 0xFFFE;

/// Runtime parameters of the emulator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Start of the interrupt vector table: 16 big-endian handler addresses.
    pub interrupt_vector_address: u16,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            interrupt_vector_address: 0x1000,
        }
    }
}

/// Outcome of a single fetch-decode-execute cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Fetch the next instruction right away.
    Continue,
    /// Wait the given number of milliseconds before the next fetch.
    Sleep(u16),
    /// The program executed `hlt`.
    Halt,
}

/// The emulator contains the register file and the memory bus of the processor.
pub struct Emulator<M = MemoryMapper> {
    /// The bus the processor fetches instructions and data from.
    pub memory: M,

    /// Runtime parameters.
    pub config: Config,

    /// True if the execution has been halted.
    pub halted: bool,

    registers: [u16; REGISTER_COUNT],
    in_interrupt_handler: bool,
    stack_frame_size: u16,
    logger: Logger,
    events: EventDispatcher,
}

impl<M: Device> Emulator<M> {
    /// Create a new emulator with the default [Config].
    pub fn new(memory: M) -> Emulator<M> {
        Emulator::with_logger(memory, Config::default(), None)
    }

    pub fn with_config(memory: M, config: Config) -> Emulator<M> {
        Emulator::with_logger(memory, config, None)
    }

    /// Create a new emulator that traces every executed instruction to `logger`.
    pub fn with_logger<L>(memory: M, config: Config, logger: L) -> Emulator<M>
    where
        L: Into<Option<Logger>>,
    {
        let logger = logger.into()
            .unwrap_or(Logger::root(Discard, o!()))
            .new(o!("stage" => "emulation"));

        let mut registers = [0; REGISTER_COUNT];
        registers[Register::Sp.index()] = STACK_START;
        registers[Register::Fp.index()] = STACK_START;
        registers[Register::Im.index()] = 0xFFFF;

        Emulator {
            memory,
            config,
            halted: false,
            registers,
            in_interrupt_handler: false,
            stack_frame_size: 0,
            logger,
            events: EventDispatcher::new(),
        }
    }

    /// Registers a listener that gets notified of register writes, memory writes,
    /// interrupts, sleeps and halts.
    pub fn add_listener<L: EventListener + 'static>(&mut self, listener: L) {
        self.events.add_listener(listener);
    }

    pub fn register(&self, register: Register) -> u16 {
        self.registers[register.index()]
    }

    pub fn set_register(&mut self, register: Register, value: u16) {
        self.registers[register.index()] = value;
    }

    /// Reads a register by its name.
    ///
    /// # Errors
    /// [UnknownRegister] if `name` is not one of the registers of the processor.
    pub fn get_register(&self, name: &str) -> Result<u16, UnknownRegister> {
        let register = name.parse::<Register>()?;
        Ok(self.register(register))
    }

    /// Overwrites a register by its name.
    ///
    /// # Errors
    /// [UnknownRegister] if `name` is not one of the registers of the processor.
    pub fn set_register_by_name(&mut self, name: &str, value: u16) -> Result<(), UnknownRegister> {
        let register = name.parse::<Register>()?;
        self.set_register(register, value);
        Ok(())
    }

    /// True while an interrupt handler runs.
    pub fn in_interrupt_handler(&self) -> bool {
        self.in_interrupt_handler
    }

    /// Number of stack bytes used by the current frame.
    pub fn stack_frame_size(&self) -> u16 {
        self.stack_frame_size
    }

    fn write_register(&mut self, register: Register, data: u16) {
        self.set_register(register, data);

        if !self.events.is_empty() {
            self.events.dispatch(Event::RegisterChange { register, data });
        }
    }

    fn write_memory(&mut self, address: u16, data: u16) -> Result<(), EmulatorError> {
        self.memory.set_u16(address, data)?;

        if !self.events.is_empty() {
            self.events.dispatch(Event::MemoryChange { address, data });
        }

        Ok(())
    }

    /// Reads the byte at `ip` and advances `ip` by one.
    pub fn fetch(&mut self) -> Result<u8, EmulatorError> {
        let ip = self.register(Register::Ip);
        let byte = self.memory.get_u8(ip)?;
        self.set_register(Register::Ip, ip.wrapping_add(1));

        Ok(byte)
    }

    /// Reads the big-endian word at `ip` and advances `ip` by two.
    pub fn fetch16(&mut self) -> Result<u16, EmulatorError> {
        let ip = self.register(Register::Ip);
        let word = self.memory.get_u16(ip)?;
        self.set_register(Register::Ip, ip.wrapping_add(2));

        Ok(word)
    }

    /// Reads a register selector byte and returns the byte offset of the selected
    /// register in the register file. Out of range selectors wrap around.
    pub fn fetch_register_index(&mut self) -> Result<usize, EmulatorError> {
        Ok(self.fetch_register()?.offset())
    }

    fn fetch_register(&mut self) -> Result<Register, EmulatorError> {
        Ok(Register::from_byte(self.fetch()?))
    }

    fn fetch_register_value(&mut self) -> Result<u16, EmulatorError> {
        let register = self.fetch_register()?;
        Ok(self.register(register))
    }

    /// Writes `value` at `sp` and moves `sp` to the next free slot below it.
    pub fn push(&mut self, value: u16) -> Result<(), EmulatorError> {
        let sp = self.register(Register::Sp);
        self.write_memory(sp, value)?;
        self.write_register(Register::Sp, sp.wrapping_sub(2));
        self.stack_frame_size = self.stack_frame_size.wrapping_add(2);

        Ok(())
    }

    /// Moves `sp` up to the last pushed value and returns it.
    pub fn pop(&mut self) -> Result<u16, EmulatorError> {
        let sp = self.register(Register::Sp).wrapping_add(2);
        self.write_register(Register::Sp, sp);
        self.stack_frame_size = self.stack_frame_size.wrapping_sub(2);

        Ok(self.memory.get_u16(sp)?)
    }

    /// Saves `r1`..`r8`, `ip` and the frame size, then starts a new empty frame at `sp`.
    ///
    /// The caller is expected to have pushed the number of stacked arguments of the
    /// call before this.
    pub fn push_state(&mut self) -> Result<(), EmulatorError> {
        for register in Register::GENERAL.iter() {
            self.push(self.register(*register))?;
        }

        self.push(self.register(Register::Ip))?;
        self.push(self.stack_frame_size.wrapping_add(2))?;

        let sp = self.register(Register::Sp);
        self.write_register(Register::Fp, sp);
        self.stack_frame_size = 0;

        Ok(())
    }

    /// Restores the frame saved by [push_state](Emulator::push_state) and drops the
    /// stacked arguments of the call.
    pub fn pop_state(&mut self) -> Result<(), EmulatorError> {
        let frame_pointer = self.register(Register::Fp);
        self.write_register(Register::Sp, frame_pointer);

        let saved_frame_size = self.pop()?;
        self.stack_frame_size = saved_frame_size;

        let ip = self.pop()?;
        self.write_register(Register::Ip, ip);

        for register in Register::GENERAL.iter().rev() {
            let value = self.pop()?;
            self.write_register(*register, value);
        }

        let argument_count = self.pop()?;
        for _ in 0..argument_count {
            self.pop()?;
        }

        let fp = frame_pointer.wrapping_add(saved_frame_size);
        self.write_register(Register::Fp, fp);
        self.stack_frame_size = fp.wrapping_sub(self.register(Register::Sp));

        Ok(())
    }

    /// Dispatches interrupt `vector` to its handler if the vector is enabled in `im`.
    ///
    /// Only the low four bits of `vector` are used. An interrupt raised while a handler
    /// runs jumps to the new handler without saving another frame.
    pub fn handle_interrupt(&mut self, vector: u16) -> Result<(), EmulatorError> {
        let index = vector & 0xF;

        if self.register(Register::Im) & (1 << index) == 0 {
            trace!(self.logger, "interrupt masked"; "vector" => index);
            return Ok(());
        }

        let slot = self.config.interrupt_vector_address.wrapping_add(index * 2);
        let handler = self.memory.get_u16(slot)?;

        if !self.in_interrupt_handler {
            self.push(0)?;
            self.push_state()?;
        }

        self.in_interrupt_handler = true;
        self.write_register(Register::Ip, handler);

        trace!(self.logger, "interrupt"; "vector" => index, "handler" => handler);
        self.events.dispatch(Event::Interrupt { vector: index });

        Ok(())
    }

    /// Executes the instruction `byte`, fetching its operands from `ip`.
    ///
    /// Bytes that are not part of the instruction set are treated as no-ops.
    ///
    /// # Errors
    /// Returns an error if a device on the bus fails.
    pub fn execute(&mut self, byte: u8) -> Result<Step, EmulatorError> {
        let opcode = match OpCode::from_byte(byte) {
            Some(opcode) => opcode,
            None => {
                trace!(self.logger, "unknown opcode"; "byte" => byte);
                return Ok(Step::Continue);
            },
        };

        match opcode {
            OpCode::MovLitReg => {
                let value = self.fetch16()?;
                let to = self.fetch_register()?;
                self.write_register(to, value);
            },
            OpCode::MovRegReg => {
                let value = self.fetch_register_value()?;
                let to = self.fetch_register()?;
                self.write_register(to, value);
            },
            OpCode::MovRegMem => {
                let value = self.fetch_register_value()?;
                let address = self.fetch16()?;
                self.write_memory(address, value)?;
            },
            OpCode::MovMemReg => {
                let address = self.fetch16()?;
                let to = self.fetch_register()?;
                let value = self.memory.get_u16(address)?;
                self.write_register(to, value);
            },
            OpCode::MovLitMem => {
                let value = self.fetch16()?;
                let address = self.fetch16()?;
                self.write_memory(address, value)?;
            },
            OpCode::MovRegPtrReg => {
                let pointer = self.fetch_register_value()?;
                let to = self.fetch_register()?;
                let value = self.memory.get_u16(pointer)?;
                self.write_register(to, value);
            },
            OpCode::MovLitOffReg => {
                let base = self.fetch16()?;
                let offset = self.fetch_register_value()?;
                let to = self.fetch_register()?;
                let value = self.memory.get_u16(base.wrapping_add(offset))?;
                self.write_register(to, value);
            },
            OpCode::MovLitRegPtr => {
                let value = self.fetch16()?;
                let pointer = self.fetch_register_value()?;
                self.write_memory(pointer, value)?;
            },

            OpCode::AddRegReg => {
                let a = self.fetch_register_value()?;
                let b = self.fetch_register_value()?;
                self.write_register(Register::Acc, a.wrapping_add(b));
            },
            OpCode::AddLitReg => {
                let literal = self.fetch16()?;
                let value = self.fetch_register_value()?;
                self.write_register(Register::Acc, literal.wrapping_add(value));
            },
            OpCode::SubLitReg => {
                let literal = self.fetch16()?;
                let value = self.fetch_register_value()?;
                self.write_register(Register::Acc, value.wrapping_sub(literal));
            },
            OpCode::SubRegLit => {
                let value = self.fetch_register_value()?;
                let literal = self.fetch16()?;
                self.write_register(Register::Acc, literal.wrapping_sub(value));
            },
            OpCode::SubRegReg => {
                let a = self.fetch_register_value()?;
                let b = self.fetch_register_value()?;
                self.write_register(Register::Acc, a.wrapping_sub(b));
            },
            OpCode::IncReg | OpCode::DecReg => {
                let register = self.fetch_register()?;
                let value = self.register(register);

                let value = match opcode {
                    OpCode::IncReg => value.wrapping_add(1),
                    _ => value.wrapping_sub(1),
                };

                self.write_register(register, value);
            },
            OpCode::MulLitReg => {
                let literal = self.fetch16()?;
                let value = self.fetch_register_value()?;
                self.write_register(Register::Acc, literal.wrapping_mul(value));
            },
            OpCode::MulRegReg => {
                let a = self.fetch_register_value()?;
                let b = self.fetch_register_value()?;
                self.write_register(Register::Acc, a.wrapping_mul(b));
            },

            OpCode::LsfRegLit | OpCode::LsfRegReg | OpCode::RsfRegLit | OpCode::RsfRegReg => {
                let register = self.fetch_register()?;

                let amount = match opcode.format() {
                    OperandFormat::RegLit8 => self.fetch()? as u32,
                    _ => self.fetch_register_value()? as u32,
                };

                let value = self.register(register) as u32;

                let value = match opcode {
                    OpCode::LsfRegLit | OpCode::LsfRegReg => value.wrapping_shl(amount),
                    _ => value.wrapping_shr(amount),
                };

                self.write_register(register, value as u16);
            },

            OpCode::AndRegLit | OpCode::OrRegLit | OpCode::XorRegLit => {
                let value = self.fetch_register_value()?;
                let literal = self.fetch16()?;
                self.write_register(Register::Acc, bitwise(opcode, value, literal));
            },
            OpCode::AndRegReg | OpCode::OrRegReg | OpCode::XorRegReg => {
                let a = self.fetch_register_value()?;
                let b = self.fetch_register_value()?;
                self.write_register(Register::Acc, bitwise(opcode, a, b));
            },
            OpCode::Not => {
                let value = self.fetch_register_value()?;
                self.write_register(Register::Acc, !value);
            },

            OpCode::JmpNotEq | OpCode::JneReg | OpCode::JeqReg | OpCode::JeqLit |
            OpCode::JltReg | OpCode::JltLit | OpCode::JgtReg | OpCode::JgtLit |
            OpCode::JleReg | OpCode::JleLit | OpCode::JgeReg | OpCode::JgeLit => {
                let value = match opcode.format() {
                    OperandFormat::RegMem => self.fetch_register_value()?,
                    _ => self.fetch16()?,
                };

                let address = self.fetch16()?;
                let acc = self.register(Register::Acc);

                let taken = match opcode {
                    OpCode::JmpNotEq | OpCode::JneReg => value != acc,
                    OpCode::JeqReg | OpCode::JeqLit => value == acc,
                    OpCode::JltReg | OpCode::JltLit => value < acc,
                    OpCode::JgtReg | OpCode::JgtLit => value > acc,
                    OpCode::JleReg | OpCode::JleLit => value <= acc,
                    _ => value >= acc,
                };

                if taken {
                    self.write_register(Register::Ip, address);
                }
            },
            OpCode::Jmp => {
                let address = self.fetch16()?;
                self.write_register(Register::Ip, address);
            },

            OpCode::PshLit => {
                let value = self.fetch16()?;
                self.push(value)?;
            },
            OpCode::PshReg => {
                let value = self.fetch_register_value()?;
                self.push(value)?;
            },
            OpCode::Pop => {
                let register = self.fetch_register()?;
                let value = self.pop()?;
                self.write_register(register, value);
            },
            OpCode::CalLit | OpCode::CalReg => {
                let address = match opcode {
                    OpCode::CalLit => self.fetch16()?,
                    _ => self.fetch_register_value()?,
                };

                self.push_state()?;
                self.write_register(Register::Ip, address);
            },
            OpCode::Ret => {
                self.pop_state()?;
            },

            OpCode::Slp => {
                let milliseconds = self.fetch16()?;
                self.events.dispatch(Event::Sleep { milliseconds });
                return Ok(Step::Sleep(milliseconds));
            },
            OpCode::Hlt => {
                self.halted = true;
                self.events.dispatch(Event::Halt);
                return Ok(Step::Halt);
            },

            OpCode::RetInt => {
                self.in_interrupt_handler = false;
                self.pop_state()?;
            },
            OpCode::Int => {
                let vector = self.fetch16()?;
                self.handle_interrupt(vector)?;
            },
        }

        Ok(Step::Continue)
    }

    /// Fetches the next instruction and executes it.
    ///
    /// Returns [Step::Halt] without doing anything once the program has halted.
    pub fn step(&mut self) -> Result<Step, EmulatorError> {
        if self.halted {
            return Ok(Step::Halt);
        }

        let ip = self.register(Register::Ip);
        let byte = self.fetch()?;

        trace!(self.logger, "step"; "ip" => ip, "opcode" => byte);

        self.execute(byte)
    }

    /// Executes the program until it halts, sleeping the current thread whenever the
    /// program asks for it.
    pub fn run(&mut self) -> Result<(), EmulatorError> {
        loop {
            match self.step()? {
                Step::Continue => (),
                Step::Sleep(milliseconds) =>
                    std::thread::sleep(Duration::from_millis(milliseconds as u64)),
                Step::Halt => return Ok(()),
            }
        }
    }

    /// Like [run](Emulator::run), but calls `on_halt` once the program has halted.
    pub fn run_with_callback<F>(&mut self, on_halt: F) -> Result<(), EmulatorError>
    where
        F: FnOnce(&mut Emulator<M>),
    {
        self.run()?;
        on_halt(self);
        Ok(())
    }

    /// Executes at most `steps` instructions without ever sleeping.
    ///
    /// # Returns
    /// True if the program has halted.
    pub fn run_for(&mut self, steps: usize) -> Result<bool, EmulatorError> {
        for _ in 0..steps {
            if self.step()? == Step::Halt {
                return Ok(true);
            }
        }

        Ok(self.halted)
    }

    /// Formats every register as `name: 0xXXXX`, one per line.
    pub fn dump_registers(&self) -> String {
        let mut out = String::new();

        for register in Register::ALL.iter() {
            let _ = writeln!(out, "{:<3}: 0x{:04x}", register.name(), self.register(*register));
        }

        out
    }

    /// Formats `count` bytes starting at `address` as a single hex dump line.
    pub fn view_memory_at(&mut self, address: u16, count: u16) -> Result<String, EmulatorError> {
        let mut out = format!("0x{:04x}:", address);

        for i in 0..count {
            let byte = self.memory.get_u8(address.wrapping_add(i))?;
            let _ = write!(out, " 0x{:02x}", byte);
        }

        Ok(out)
    }
}

fn bitwise(opcode: OpCode, a: u16, b: u16) -> u16 {
    match opcode {
        OpCode::AndRegLit | OpCode::AndRegReg => a & b,
        OpCode::OrRegLit | OpCode::OrRegReg => a | b,
        _ => a ^ b,
    }
}

#[cfg(test)]
fn emulator_with(program: &[u8]) -> Emulator {
    let mut mapper = MemoryMapper::new();
    mapper.map(crate::memory::Memory::new(0x10000), 0x0000, 0xFFFF, true).unwrap();
    mapper.load(0, program).unwrap();

    Emulator::new(mapper)
}

#[cfg(test)]
fn op(opcode: OpCode) -> u8 {
    opcode.as_byte()
}

#[test]
fn test_registers_by_name() {
    let mut emulator = emulator_with(&[]);

    for register in Register::ALL.iter() {
        emulator.set_register_by_name(register.name(), 0xBEEF).unwrap();
        assert_eq!(emulator.get_register(register.name()), Ok(0xBEEF));
    }

    assert_eq!(
        emulator.get_register("r0"),
        Err(UnknownRegister("r0".to_string())),
    );
    assert!(emulator.set_register_by_name("pc", 1).is_err());
}

#[test]
fn test_initial_state() {
    let emulator = emulator_with(&[]);

    assert_eq!(emulator.register(Register::Sp), STACK_START);
    assert_eq!(emulator.register(Register::Fp), STACK_START);
    assert_eq!(emulator.register(Register::Im), 0xFFFF);
    assert_eq!(emulator.register(Register::Ip), 0);
    assert_eq!(emulator.stack_frame_size(), 0);
}

#[test]
fn test_push_pop_round_trip() {
    let mut emulator = emulator_with(&[]);
    let values = [0x0001, 0xFFFF, 0x1234, 0x0000, 0xABCD];

    for value in values.iter() {
        emulator.push(*value).unwrap();
    }

    assert_eq!(emulator.register(Register::Sp), STACK_START - 10);

    for value in values.iter().rev() {
        assert_eq!(emulator.pop().unwrap(), *value);
    }

    assert_eq!(emulator.register(Register::Sp), STACK_START);
    assert_eq!(emulator.stack_frame_size(), 0);
}

#[test]
fn test_push_state_pop_state() {
    let mut emulator = emulator_with(&[]);

    for (i, register) in Register::GENERAL.iter().enumerate() {
        emulator.set_register(*register, 0x100 + i as u16);
    }
    emulator.set_register(Register::Ip, 0x0042);
    emulator.push(0x7777).unwrap();

    let sp = emulator.register(Register::Sp);
    let fp = emulator.register(Register::Fp);
    let frame_size = emulator.stack_frame_size();

    emulator.push(0).unwrap();
    emulator.push_state().unwrap();

    for register in Register::GENERAL.iter() {
        emulator.set_register(*register, 0);
    }
    emulator.set_register(Register::Ip, 0x2000);
    emulator.push(0x5555).unwrap();

    emulator.pop_state().unwrap();

    for (i, register) in Register::GENERAL.iter().enumerate() {
        assert_eq!(emulator.register(*register), 0x100 + i as u16);
    }
    assert_eq!(emulator.register(Register::Ip), 0x0042);
    assert_eq!(emulator.register(Register::Sp), sp);
    assert_eq!(emulator.register(Register::Fp), fp);
    assert_eq!(emulator.stack_frame_size(), frame_size);
    assert_eq!(emulator.pop().unwrap(), 0x7777);
}

#[test]
fn test_call_drains_arguments() {
    let program = [
        op(OpCode::PshLit), 0x00, 0x11,
        op(OpCode::PshLit), 0x00, 0x22,
        op(OpCode::PshLit), 0x00, 0x02,
        op(OpCode::CalLit), 0x00, 0x20,
        op(OpCode::Hlt),
    ];

    let mut subroutine = vec![0; 0x20];
    subroutine[..program.len()].copy_from_slice(&program);
    subroutine.extend_from_slice(&[
        op(OpCode::MovLitReg), 0x99, 0x99, Register::R1.as_byte(),
        op(OpCode::Ret),
    ]);

    let mut emulator = emulator_with(&subroutine);
    emulator.set_register(Register::R1, 0x0101);

    assert_eq!(emulator.run_for(100), Ok(true));
    assert_eq!(emulator.register(Register::R1), 0x0101);
    assert_eq!(emulator.register(Register::Sp), STACK_START);
    assert_eq!(emulator.register(Register::Fp), STACK_START);
    assert_eq!(emulator.register(Register::Ip), 13);
}

#[test]
fn test_conditional_jumps() {
    let cases = [
        (OpCode::JmpNotEq, 1, 2, true),
        (OpCode::JmpNotEq, 2, 2, false),
        (OpCode::JneReg, 1, 2, true),
        (OpCode::JneReg, 2, 2, false),
        (OpCode::JeqReg, 3, 3, true),
        (OpCode::JeqReg, 3, 4, false),
        (OpCode::JeqLit, 3, 3, true),
        (OpCode::JeqLit, 4, 3, false),
        (OpCode::JltReg, 1, 2, true),
        (OpCode::JltReg, 2, 2, false),
        (OpCode::JltLit, 1, 2, true),
        (OpCode::JltLit, 3, 2, false),
        (OpCode::JgtReg, 3, 2, true),
        (OpCode::JgtReg, 2, 2, false),
        (OpCode::JgtLit, 3, 2, true),
        (OpCode::JgtLit, 1, 2, false),
        (OpCode::JleReg, 2, 2, true),
        (OpCode::JleReg, 3, 2, false),
        (OpCode::JleLit, 1, 2, true),
        (OpCode::JleLit, 3, 2, false),
        (OpCode::JgeReg, 2, 2, true),
        (OpCode::JgeReg, 1, 2, false),
        (OpCode::JgeLit, 3, 2, true),
        (OpCode::JgeLit, 1, 2, false),
    ];

    for (opcode, value, acc, taken) in cases.iter() {
        let [high, low] = (*value as u16).to_be_bytes();

        let program = match opcode.format() {
            OperandFormat::RegMem => vec![op(*opcode), Register::R1.as_byte(), 0x12, 0x34],
            _ => vec![op(*opcode), high, low, 0x12, 0x34],
        };

        let mut emulator = emulator_with(&program);
        emulator.set_register(Register::R1, *value as u16);
        emulator.set_register(Register::Acc, *acc as u16);

        assert_eq!(emulator.step(), Ok(Step::Continue));

        let expected = if *taken { 0x1234 } else { opcode.size() };
        assert_eq!(emulator.register(Register::Ip), expected, "{} {} {}", opcode, value, acc);
    }
}

#[test]
fn test_unconditional_jump() {
    let mut emulator = emulator_with(&[op(OpCode::Jmp), 0xAB, 0xCD]);

    emulator.step().unwrap();

    assert_eq!(emulator.register(Register::Ip), 0xABCD);
}

#[test]
fn test_subtraction_order() {
    let r1 = Register::R1.as_byte();

    let mut emulator = emulator_with(&[
        op(OpCode::SubLitReg), 0x00, 0x03, r1,
        op(OpCode::MovRegReg), Register::Acc.as_byte(), Register::R2.as_byte(),
        op(OpCode::SubRegLit), r1, 0x00, 0x03,
        op(OpCode::Hlt),
    ]);
    emulator.set_register(Register::R1, 10);

    emulator.run().unwrap();

    assert_eq!(emulator.register(Register::R2), 7);
    assert_eq!(emulator.register(Register::Acc), 3u16.wrapping_sub(10));
}

#[test]
fn test_arithmetic_wraps() {
    let r1 = Register::R1.as_byte();
    let r2 = Register::R2.as_byte();

    let mut emulator = emulator_with(&[
        op(OpCode::MulRegReg), r1, r2,
        op(OpCode::MovRegReg), Register::Acc.as_byte(), Register::R3.as_byte(),
        op(OpCode::AddLitReg), 0x00, 0x02, r2,
        op(OpCode::IncReg), r1,
        op(OpCode::DecReg), Register::R4.as_byte(),
        op(OpCode::Hlt),
    ]);
    emulator.set_register(Register::R1, 0xFFFF);
    emulator.set_register(Register::R2, 0xFFFF);

    emulator.run().unwrap();

    assert_eq!(emulator.register(Register::R3), 1);
    assert_eq!(emulator.register(Register::Acc), 1);
    assert_eq!(emulator.register(Register::R1), 0);
    assert_eq!(emulator.register(Register::R4), 0xFFFF);
}

#[test]
fn test_shifts_and_bitwise() {
    let r1 = Register::R1.as_byte();
    let r2 = Register::R2.as_byte();

    let mut emulator = emulator_with(&[
        op(OpCode::LsfRegLit), r1, 4,
        op(OpCode::RsfRegReg), r2, r1,
        op(OpCode::XorRegLit), r1, 0x0F, 0x00,
        op(OpCode::Hlt),
    ]);
    emulator.set_register(Register::R1, 0x0F01);
    emulator.set_register(Register::R2, 0x8000);

    emulator.run().unwrap();

    assert_eq!(emulator.register(Register::R1), 0xF010);
    assert_eq!(emulator.register(Register::R2), 0x0000);
    assert_eq!(emulator.register(Register::Acc), 0xFF10);

    let mut emulator = emulator_with(&[op(OpCode::LsfRegLit), r1, 33, op(OpCode::Not), r1]);
    emulator.set_register(Register::R1, 0x0001);

    emulator.run_for(2).unwrap();

    assert_eq!(emulator.register(Register::R1), 0x0002);
    assert_eq!(emulator.register(Register::Acc), 0xFFFD);
}

#[test]
fn test_memory_moves() {
    let r1 = Register::R1.as_byte();
    let r2 = Register::R2.as_byte();

    let mut emulator = emulator_with(&[
        op(OpCode::MovLitMem), 0xBE, 0xEF, 0x80, 0x00,
        op(OpCode::MovMemReg), 0x80, 0x00, r1,
        op(OpCode::MovLitReg), 0x00, 0x02, r2,
        op(OpCode::MovLitRegPtr), 0x12, 0x34, r2,
        op(OpCode::MovLitOffReg), 0x7F, 0xFE, r2, Register::R3.as_byte(),
        op(OpCode::MovLitReg), 0x80, 0x00, r2,
        op(OpCode::MovRegPtrReg), r2, Register::R4.as_byte(),
        op(OpCode::MovRegMem), r1, 0x90, 0x00,
        op(OpCode::Hlt),
    ]);

    emulator.run().unwrap();

    assert_eq!(emulator.register(Register::R1), 0xBEEF);
    assert_eq!(emulator.register(Register::R3), 0xBEEF);
    assert_eq!(emulator.register(Register::R4), 0xBEEF);
    assert_eq!(emulator.memory.get_u16(0x0002), Ok(0x1234));
    assert_eq!(emulator.memory.get_u16(0x9000), Ok(0xBEEF));
}

#[test]
fn test_interrupt_dispatch() {
    let mut program = vec![
        op(OpCode::Int), 0x00, 0x03,
        op(OpCode::Hlt),
    ];
    program.resize(0x20, 0);
    program.extend_from_slice(&[
        op(OpCode::MovLitMem), 0x00, 0x77, 0x40, 0x00,
        op(OpCode::RetInt),
    ]);

    let mut emulator = emulator_with(&program);
    emulator.memory.set_u16(0x1000 + 3 * 2, 0x0020).unwrap();

    assert_eq!(emulator.step(), Ok(Step::Continue));
    assert!(emulator.in_interrupt_handler());
    assert_eq!(emulator.register(Register::Ip), 0x0020);

    assert_eq!(emulator.run_for(10), Ok(true));
    assert!(!emulator.in_interrupt_handler());
    assert_eq!(emulator.memory.get_u16(0x4000), Ok(0x0077));
    assert_eq!(emulator.register(Register::Ip), 4);
    assert_eq!(emulator.register(Register::Sp), STACK_START);
}

#[test]
fn test_interrupt_masked() {
    let mut emulator = emulator_with(&[op(OpCode::Int), 0x00, 0x13]);
    emulator.memory.set_u16(0x1000 + 3 * 2, 0x0020).unwrap();
    emulator.set_register(Register::Im, !(1 << 3));

    emulator.step().unwrap();

    assert!(!emulator.in_interrupt_handler());
    assert_eq!(emulator.register(Register::Ip), 3);
    assert_eq!(emulator.register(Register::Sp), STACK_START);
}

#[test]
fn test_interrupt_custom_vector_table() {
    let mut emulator = Emulator::with_config(
        emulator_with(&[]).memory,
        Config { interrupt_vector_address: 0x2000 },
    );
    emulator.memory.set_u16(0x2002, 0x4444).unwrap();

    emulator.handle_interrupt(1).unwrap();
    let sp = emulator.register(Register::Sp);

    emulator.handle_interrupt(1).unwrap();

    assert_eq!(emulator.register(Register::Ip), 0x4444);
    assert_eq!(emulator.register(Register::Sp), sp);
}

#[test]
fn test_sleep_halt_and_unknown_opcodes() {
    let mut emulator = emulator_with(&[0x00, 0x01, op(OpCode::Slp), 0x01, 0xF4, op(OpCode::Hlt)]);

    assert_eq!(emulator.step(), Ok(Step::Continue));
    assert_eq!(emulator.step(), Ok(Step::Continue));
    assert_eq!(emulator.step(), Ok(Step::Sleep(500)));
    assert_eq!(emulator.step(), Ok(Step::Halt));
    assert!(emulator.halted);

    let ip = emulator.register(Register::Ip);
    assert_eq!(emulator.step(), Ok(Step::Halt));
    assert_eq!(emulator.register(Register::Ip), ip);
}

#[test]
fn test_events() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();

    let mut emulator = emulator_with(&[
        op(OpCode::MovLitReg), 0x00, 0x05, Register::R2.as_byte(),
        op(OpCode::MovLitMem), 0x00, 0x06, 0x40, 0x00,
        op(OpCode::Hlt),
    ]);
    emulator.add_listener(move |event: &Event| sink.borrow_mut().push(event.clone()));

    let mut halted = false;
    emulator.run_with_callback(|_| halted = true).unwrap();

    assert!(halted);
    assert_eq!(&events.borrow()[..], &[
        Event::RegisterChange { register: Register::R2, data: 5 },
        Event::MemoryChange { address: 0x4000, data: 6 },
        Event::Halt,
    ]);
}

#[test]
fn test_debug_views() {
    let mut emulator = emulator_with(&[0xDE, 0xAD, 0xBE, 0xEF]);
    emulator.set_register(Register::Acc, 0x1234);

    assert!(emulator.dump_registers().contains("acc: 0x1234"));
    assert_eq!(emulator.view_memory_at(1, 3).unwrap(), "0x0001: 0xad 0xbe 0xef");
}
