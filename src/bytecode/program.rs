use std::fmt;

use crate::error::DecodeError;
use crate::instruction::{OpCode, OperandFormat, Register};
use crate::symbolic::ast::{Expression, Instruction, Operands};

/// A flat encoded program, loaded at address 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub bytes: Vec<u8>,
}

impl From<Vec<u8>> for Program {
    fn from(bytes: Vec<u8>) -> Program {
        Program { bytes }
    }
}

impl Program {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Checks that the program is a sequence of whole instructions.
    ///
    /// Data blocks mixed into the code will usually fail this check, so only programs
    /// that keep their data out of the instruction stream validate.
    pub fn validate(&self) -> Result<(), DecodeError> {
        let mut address = 0;

        while address < self.bytes.len() {
            let (size, _) = self.decode_at(address)?;
            address += size;
        }

        Ok(())
    }

    /// Decodes every instruction, together with its address.
    pub fn disassemble(&self) -> Result<Vec<(u16, Instruction)>, DecodeError> {
        let mut address = 0;
        let mut instructions = Vec::new();

        while address < self.bytes.len() {
            let (size, instruction) = self.decode_at(address)?;
            instructions.push((address as u16, instruction));
            address += size;
        }

        Ok(instructions)
    }

    fn decode_at(&self, address: usize) -> Result<(usize, Instruction), DecodeError> {
        let byte = self.bytes[address];

        let opcode = OpCode::from_byte(byte)
            .ok_or(DecodeError::UnknownOpCode { address: address as u16, byte })?;

        let size = opcode.size() as usize;

        let operand_bytes = self.bytes.get(address + 1..address + size)
            .ok_or(DecodeError::Truncated { address: address as u16, opcode })?;

        let operands = decode_operands(opcode.format(), operand_bytes);

        Ok((size, Instruction { opcode, operands }))
    }
}

/// Decodes operands from exactly `format.size() - 1` bytes.
fn decode_operands(format: OperandFormat, bytes: &[u8]) -> Operands {
    let word = |i: usize| Expression::Literal(u16::from_be_bytes([bytes[i], bytes[i + 1]]) as u32);
    let reg = |i: usize| Register::from_byte(bytes[i]);

    match format {
        OperandFormat::LitReg => Operands::LitReg(word(0), reg(2)),
        OperandFormat::RegLit => Operands::RegLit(reg(0), word(1)),
        OperandFormat::RegLit8 => Operands::RegLit8(reg(0), Expression::Literal(bytes[1] as u32)),
        OperandFormat::RegReg => Operands::RegReg(reg(0), reg(1)),
        OperandFormat::RegMem => Operands::RegMem(reg(0), word(1)),
        OperandFormat::MemReg => Operands::MemReg(word(0), reg(2)),
        OperandFormat::LitMem => Operands::LitMem(word(0), word(2)),
        OperandFormat::RegPtrReg => Operands::RegPtrReg(reg(0), reg(1)),
        OperandFormat::LitOffReg => Operands::LitOffReg(word(0), reg(2), reg(3)),
        OperandFormat::LitRegPtr => Operands::LitRegPtr(word(0), reg(2)),
        OperandFormat::NoArgs => Operands::NoArgs,
        OperandFormat::SingleReg => Operands::SingleReg(reg(0)),
        OperandFormat::SingleLit => Operands::SingleLit(word(0)),
        OperandFormat::SingleMem => Operands::SingleMem(word(0)),
    }
}

/// Prints the disassembly, one instruction per line. Programs that do not decode are
/// printed as a hex dump.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.disassemble() {
            Ok(instructions) => {
                for (address, instruction) in instructions {
                    writeln!(f, "0x{:04x}: {}", address, instruction)?;
                }
            },
            Err(_) => {
                for (i, chunk) in self.bytes.chunks(8).enumerate() {
                    write!(f, "0x{:04x}:", i * 8)?;

                    for byte in chunk {
                        write!(f, " {:02x}", byte)?;
                    }

                    writeln!(f)?;
                }
            },
        }

        Ok(())
    }
}

#[test]
fn test_disassemble() {
    let program = Program::from(vec![
        0x10, 0x12, 0x34, 0x00,
        0x1C, 0x02, 0x03,
        0x26, 0x00, 0x08,
        0xFF,
    ]);

    assert_eq!(program.validate(), Ok(()));
    assert_eq!(program.to_string(), "\
0x0000: mov $1234, r1
0x0004: mov &r3, r4
0x0007: lsf r1, $0008
0x000a: hlt
");
}

#[test]
fn test_validate_errors() {
    assert_eq!(
        Program::from(vec![0xFF, 0x02]).validate(),
        Err(DecodeError::UnknownOpCode { address: 1, byte: 0x02 }),
    );

    assert_eq!(
        Program::from(vec![0x10, 0x12, 0x34]).validate(),
        Err(DecodeError::Truncated { address: 0, opcode: OpCode::MovLitReg }),
    );
}

#[test]
fn test_assemble_disassemble() {
    let source = "
        mov $10, &(r2)
        mov $4, &acc, r1
        jeq r2, &0010
        psh $ff
        cal r8
        rti
    ";

    let program = crate::symbolic::Program::parse(source).unwrap();
    let compiled = program.compile().unwrap();

    let text = compiled.disassemble()
        .unwrap()
        .into_iter()
        .map(|(_, ins)| ins.to_string())
        .collect::<Vec<_>>();

    assert_eq!(text, vec![
        "mov $0010, &(r2)",
        "mov $0004, &acc, r1",
        "jeq r2, &0010",
        "psh $00ff",
        "cal r8",
        "rti",
    ]);
}
