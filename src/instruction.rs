//! Types for representing instructions and their parts.
//!
//! The [descriptor table](DESCRIPTORS) is the one place where an opcode is tied to
//! its mnemonic, [operand format](OperandFormat) and encoded size. Both the
//! [compiler](crate::compiler) and the [emulator](crate::emulator) read it from here.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;

use crate::error::UnknownRegister;

/// Registers of the processor, in the order of the register file.
///
/// The position of a register in [Register::ALL] is its encoding on the instruction
/// stream and `index * 2` is its byte offset in the register file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Register {
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    /// Stack pointer.
    Sp,
    /// Frame pointer.
    Fp,
    /// Instruction pointer.
    Ip,
    /// Accumulator. Arithmetic and bitwise results end up here.
    Acc,
    /// Memory base.
    Mb,
    /// Interrupt mask. Bit `n` enables interrupt vector `n`.
    Im,
}

/// Number of registers in the register file.
pub const REGISTER_COUNT: usize = 14;

impl Register {
    pub const ALL: [Register; REGISTER_COUNT] = [
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
        Register::R8,
        Register::Sp,
        Register::Fp,
        Register::Ip,
        Register::Acc,
        Register::Mb,
        Register::Im,
    ];

    /// General purpose registers saved in a call frame, in push order.
    pub const GENERAL: [Register; 8] = [
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
        Register::R8,
    ];

    /// Decodes a register selector byte. Out of range selectors wrap around.
    pub fn from_byte(byte: u8) -> Register {
        Register::ALL[byte as usize % REGISTER_COUNT]
    }

    pub fn index(&self) -> usize {
        match self {
            Register::R1 => 0,
            Register::R2 => 1,
            Register::R3 => 2,
            Register::R4 => 3,
            Register::R5 => 4,
            Register::R6 => 5,
            Register::R7 => 6,
            Register::R8 => 7,
            Register::Sp => 8,
            Register::Fp => 9,
            Register::Ip => 10,
            Register::Acc => 11,
            Register::Mb => 12,
            Register::Im => 13,
        }
    }

    /// Byte offset of the register in the register file.
    pub fn offset(&self) -> usize {
        self.index() * 2
    }

    pub fn as_byte(&self) -> u8 {
        self.index() as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Register::R1 => "r1",
            Register::R2 => "r2",
            Register::R3 => "r3",
            Register::R4 => "r4",
            Register::R5 => "r5",
            Register::R6 => "r6",
            Register::R7 => "r7",
            Register::R8 => "r8",
            Register::Sp => "sp",
            Register::Fp => "fp",
            Register::Ip => "ip",
            Register::Acc => "acc",
            Register::Mb => "mb",
            Register::Im => "im",
        }
    }
}

impl FromStr for Register {
    type Err = UnknownRegister;

    fn from_str(name: &str) -> Result<Register, UnknownRegister> {
        Register::ALL
            .iter()
            .find(|reg| reg.name().eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| UnknownRegister(name.to_string()))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Describes the operands of an instruction and their order on the instruction stream.
///
/// `lit` and `addr` operands are 16-bit big-endian values, `lit8` is a single byte and
/// `reg` is a register selector byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperandFormat {
    /// `lit, reg`
    LitReg,
    /// `reg, lit`
    RegLit,
    /// `reg, lit8`
    RegLit8,
    /// `reg, reg`
    RegReg,
    /// `reg, addr`
    RegMem,
    /// `addr, reg`
    MemReg,
    /// `lit, addr`
    LitMem,
    /// `&reg, reg`: the first register holds an address.
    RegPtrReg,
    /// `lit, &reg, reg`: base address plus the offset held in a register.
    LitOffReg,
    /// `lit, &(reg)`: store a literal through the address held in a register.
    LitRegPtr,
    NoArgs,
    SingleReg,
    SingleLit,
    SingleMem,
}

impl OperandFormat {
    /// Size of an encoded instruction of this format in bytes, opcode included.
    pub fn size(&self) -> u16 {
        match self {
            OperandFormat::LitReg => 4,
            OperandFormat::RegLit => 4,
            OperandFormat::RegLit8 => 3,
            OperandFormat::RegReg => 3,
            OperandFormat::RegMem => 4,
            OperandFormat::MemReg => 4,
            OperandFormat::LitMem => 5,
            OperandFormat::RegPtrReg => 3,
            OperandFormat::LitOffReg => 5,
            OperandFormat::LitRegPtr => 4,
            OperandFormat::NoArgs => 1,
            OperandFormat::SingleReg => 2,
            OperandFormat::SingleLit => 3,
            OperandFormat::SingleMem => 3,
        }
    }
}

/// Instructions of the architecture.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    MovLitReg,
    MovRegReg,
    MovRegMem,
    MovMemReg,
    MovLitMem,
    MovRegPtrReg,
    MovLitOffReg,
    MovLitRegPtr,

    AddRegReg,
    AddLitReg,
    /// `register - literal`
    SubLitReg,
    /// `literal - register`
    SubRegLit,
    SubRegReg,
    IncReg,
    DecReg,
    MulLitReg,
    MulRegReg,

    LsfRegLit,
    LsfRegReg,
    RsfRegLit,
    RsfRegReg,
    AndRegLit,
    AndRegReg,
    OrRegLit,
    OrRegReg,
    XorRegLit,
    XorRegReg,
    Not,

    JmpNotEq,
    JneReg,
    JeqReg,
    JeqLit,
    JltReg,
    JltLit,
    JgtReg,
    JgtLit,
    JleReg,
    JleLit,
    JgeReg,
    JgeLit,
    Jmp,

    PshLit,
    PshReg,
    Pop,
    CalLit,
    CalReg,
    Ret,

    /// Asks the driver loop to wait before the next fetch.
    Slp,
    /// Stops the driver loop.
    Hlt,

    RetInt,
    Int,
}

/// Static information about one opcode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub opcode: OpCode,
    /// Name of the descriptor, eg. `MOV_LIT_REG`.
    pub name: &'static str,
    pub mnemonic: &'static str,
    pub byte: u8,
    pub format: OperandFormat,
}

impl Descriptor {
    pub fn size(&self) -> u16 {
        self.format.size()
    }
}

macro_rules! descriptors {
    ( $( $opcode:ident, $name:literal, $mnemonic:literal, $byte:literal, $format:ident; )* ) => {
        /// All instructions of the architecture.
        ///
        /// Descriptors sharing a mnemonic are tried by the parser in this order.
        pub const DESCRIPTORS: &[Descriptor] = &[
            $( Descriptor {
                opcode: OpCode::$opcode,
                name: $name,
                mnemonic: $mnemonic,
                byte: $byte,
                format: OperandFormat::$format,
            }, )*
        ];

        impl OpCode {
            pub fn descriptor(&self) -> &'static Descriptor {
                match self {
                    $( OpCode::$opcode => &DESCRIPTORS[OpCode::$opcode as usize], )*
                }
            }
        }
    };
}

descriptors! {
    MovLitReg,    "MOV_LIT_REG",         "mov", 0x10, LitReg;
    MovRegReg,    "MOV_REG_REG",         "mov", 0x11, RegReg;
    MovRegMem,    "MOV_REG_MEM",         "mov", 0x12, RegMem;
    MovMemReg,    "MOV_MEM_REG",         "mov", 0x13, MemReg;
    MovLitMem,    "MOV_LIT_MEM",         "mov", 0x1B, LitMem;
    MovRegPtrReg, "MOV_REG_PTR_REG",     "mov", 0x1C, RegPtrReg;
    MovLitOffReg, "MOV_LIT_OFF_REG",     "mov", 0x1D, LitOffReg;
    MovLitRegPtr, "MOV_LIT_MEM_REG_PTR", "mov", 0x19, LitRegPtr;

    AddRegReg,    "ADD_REG_REG",         "add", 0x14, RegReg;
    AddLitReg,    "ADD_LIT_REG",         "add", 0x3F, LitReg;
    SubLitReg,    "SUB_LIT_REG",         "sub", 0x16, LitReg;
    SubRegLit,    "SUB_REG_LIT",         "sub", 0x1E, RegLit;
    SubRegReg,    "SUB_REG_REG",         "sub", 0x1F, RegReg;
    IncReg,       "INC_REG",             "inc", 0x35, SingleReg;
    DecReg,       "DEC_REG",             "dec", 0x36, SingleReg;
    MulLitReg,    "MUL_LIT_REG",         "mul", 0x20, LitReg;
    MulRegReg,    "MUL_REG_REG",         "mul", 0x21, RegReg;

    LsfRegLit,    "LSF_REG_LIT",         "lsf", 0x26, RegLit8;
    LsfRegReg,    "LSF_REG_REG",         "lsf", 0x27, RegReg;
    RsfRegLit,    "RSF_REG_LIT",         "rsf", 0x2A, RegLit8;
    RsfRegReg,    "RSF_REG_REG",         "rsf", 0x2B, RegReg;
    AndRegLit,    "AND_REG_LIT",         "and", 0x2E, RegLit;
    AndRegReg,    "AND_REG_REG",         "and", 0x2F, RegReg;
    OrRegLit,     "OR_REG_LIT",          "or",  0x30, RegLit;
    OrRegReg,     "OR_REG_REG",          "or",  0x31, RegReg;
    XorRegLit,    "XOR_REG_LIT",         "xor", 0x32, RegLit;
    XorRegReg,    "XOR_REG_REG",         "xor", 0x33, RegReg;
    Not,          "NOT",                 "not", 0x34, SingleReg;

    JmpNotEq,     "JMP_NOT_EQ",          "jne", 0x15, LitMem;
    JneReg,       "JNE_REG",             "jne", 0x40, RegMem;
    JeqReg,       "JEQ_REG",             "jeq", 0x3E, RegMem;
    JeqLit,       "JEQ_LIT",             "jeq", 0x41, LitMem;
    JltReg,       "JLT_REG",             "jlt", 0x42, RegMem;
    JltLit,       "JLT_LIT",             "jlt", 0x43, LitMem;
    JgtReg,       "JGT_REG",             "jgt", 0x44, RegMem;
    JgtLit,       "JGT_LIT",             "jgt", 0x45, LitMem;
    JleReg,       "JLE_REG",             "jle", 0x46, RegMem;
    JleLit,       "JLE_LIT",             "jle", 0x47, LitMem;
    JgeReg,       "JGE_REG",             "jge", 0x48, RegMem;
    JgeLit,       "JGE_LIT",             "jge", 0x49, LitMem;
    Jmp,          "JMP",                 "jmp", 0x4A, SingleMem;

    PshLit,       "PSH_LIT",             "psh", 0x17, SingleLit;
    PshReg,       "PSH_REG",             "psh", 0x18, SingleReg;
    Pop,          "POP",                 "pop", 0x1A, SingleReg;
    CalLit,       "CAL_LIT",             "cal", 0x5E, SingleLit;
    CalReg,       "CAL_REG",             "cal", 0x5F, SingleReg;
    Ret,          "RET",                 "ret", 0x60, NoArgs;

    Slp,          "SLP_LIT",             "slp", 0x50, SingleLit;
    Hlt,          "HLT",                 "hlt", 0xFF, NoArgs;

    RetInt,       "RET_INT",             "rti", 0xFC, NoArgs;
    Int,          "INT",                 "int", 0xFD, SingleLit;
}

lazy_static! {
    static ref BY_BYTE: HashMap<u8, &'static Descriptor> = DESCRIPTORS
        .iter()
        .map(|descriptor| (descriptor.byte, descriptor))
        .collect();

    static ref BY_MNEMONIC: HashMap<&'static str, Vec<&'static Descriptor>> = {
        let mut map: HashMap<&'static str, Vec<&'static Descriptor>> = HashMap::new();

        for descriptor in DESCRIPTORS {
            map.entry(descriptor.mnemonic).or_default().push(descriptor);
        }

        map
    };
}

impl OpCode {
    pub fn as_byte(&self) -> u8 {
        self.descriptor().byte
    }

    /// Looks up the opcode encoded as `byte`. Returns `None` for bytes that are not
    /// part of the instruction set.
    pub fn from_byte(byte: u8) -> Option<OpCode> {
        BY_BYTE.get(&byte).map(|descriptor| descriptor.opcode)
    }

    pub fn format(&self) -> OperandFormat {
        self.descriptor().format
    }

    pub fn size(&self) -> u16 {
        self.descriptor().size()
    }

    pub fn mnemonic(&self) -> &'static str {
        self.descriptor().mnemonic
    }
}

/// Returns every descriptor using `mnemonic`, in table order.
pub fn descriptors_for(mnemonic: &str) -> &'static [&'static Descriptor] {
    BY_MNEMONIC
        .get(mnemonic.to_ascii_lowercase().as_str())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

/// All distinct mnemonics, in table order.
pub fn mnemonics() -> impl Iterator<Item = &'static str> {
    let mut seen = Vec::new();

    DESCRIPTORS.iter().filter_map(move |descriptor| {
        if seen.contains(&descriptor.mnemonic) {
            None
        } else {
            seen.push(descriptor.mnemonic);
            Some(descriptor.mnemonic)
        }
    })
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.descriptor().name)
    }
}

#[test]
fn test_descriptor_table_consistent() {
    for (i, descriptor) in DESCRIPTORS.iter().enumerate() {
        assert_eq!(descriptor.opcode as usize, i, "{} out of place", descriptor.name);
        assert_eq!(descriptor.opcode.descriptor(), descriptor);
        assert_eq!(OpCode::from_byte(descriptor.byte), Some(descriptor.opcode));
    }

    assert_eq!(BY_BYTE.len(), DESCRIPTORS.len(), "opcode bytes must be unique");
}

#[test]
fn test_register_lookup() {
    assert_eq!("acc".parse::<Register>().unwrap(), Register::Acc);
    assert_eq!("R8".parse::<Register>().unwrap(), Register::R8);
    assert!("r9".parse::<Register>().is_err());

    assert_eq!(Register::from_byte(11), Register::Acc);
    assert_eq!(Register::from_byte(14), Register::R1);
    assert_eq!(Register::Im.offset(), 26);
}

#[test]
fn test_mnemonic_lookup() {
    let movs = descriptors_for("MOV");
    assert_eq!(movs.len(), 8);
    assert_eq!(movs[0].opcode, OpCode::MovLitReg);

    assert!(descriptors_for("nop").is_empty());
    assert_eq!(mnemonics().filter(|m| *m == "jne").count(), 1);
}
