//! Canonical instruction set, ROM header layout, and syscall table shared by
//! the assembler and the virtual machine.
//!
//! Numeric opcode assignments here are load-bearing: the assembler and the
//! VM must agree on them bit-for-bit, since a ROM produced by one is only
//! ever interpreted by the other through this table.

use std::fmt;

/// Size of the ROM header, in bytes.
pub const HEADER_LEN: usize = 16;
/// Magic number every valid ROM must start with.
pub const MAGIC_NUMBER: u8 = 0x69;
/// Current language version understood by this toolchain.
pub const LANGUAGE_VERSION: u8 = 1;
/// Entry point used when the source defines no `_START` label.
pub const DEFAULT_ENTRY_POINT: u16 = HEADER_LEN as u16;
/// Byte written into the header's reserved region.
pub const RESERVED_FILL: u8 = 0xCC;

pub const ROM_SIZE: usize = 1 << 16;
pub const WRAM_SIZE: usize = 1 << 16;
pub const STACK_SIZE: usize = 1024;

/// The 16-byte ROM header, bit-exact with spec.md Section 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub language_version: u8,
    pub entry_point: u16,
    pub debug_mode: bool,
}

impl Header {
    pub fn new(entry_point: u16, debug_mode: bool) -> Header {
        Header {
            language_version: LANGUAGE_VERSION,
            entry_point,
            debug_mode,
        }
    }

    /// Serialize into the 16-byte on-disk representation.
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut bytes = [RESERVED_FILL; HEADER_LEN];
        bytes[0] = MAGIC_NUMBER;
        bytes[1] = self.language_version;
        let entry = self.entry_point.to_le_bytes();
        bytes[2] = entry[0];
        bytes[3] = entry[1];
        bytes[15] = self.debug_mode as u8;
        bytes
    }

    /// Parse and validate the 16-byte header at the front of `rom`.
    pub fn parse(rom: &[u8]) -> Result<Header, HeaderError> {
        if rom.len() < HEADER_LEN {
            return Err(HeaderError::Truncated);
        }
        if rom[0] != MAGIC_NUMBER {
            return Err(HeaderError::BadMagicNumber { found: rom[0] });
        }
        if rom[1] != LANGUAGE_VERSION {
            return Err(HeaderError::OutdatedRomVersion { found: rom[1] });
        }
        let entry_point = u16::from_le_bytes([rom[2], rom[3]]);
        Ok(Header {
            language_version: rom[1],
            entry_point,
            debug_mode: rom[15] != 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    Truncated,
    BadMagicNumber { found: u8 },
    OutdatedRomVersion { found: u8 },
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderError::Truncated => write!(f, "ROM is shorter than the 16-byte header"),
            HeaderError::BadMagicNumber { found } => {
                write!(f, "bad magic number: expected 0x{MAGIC_NUMBER:02X}, found 0x{found:02X}")
            }
            HeaderError::OutdatedRomVersion { found } => write!(
                f,
                "outdated ROM version: this toolchain understands version {LANGUAGE_VERSION}, ROM is version {found}"
            ),
        }
    }
}

impl std::error::Error for HeaderError {}

/// A general-purpose register: accumulator or one of the two index registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    A,
    X,
    Y,
}

/// The four condition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Carry,
    Zero,
    Negative,
    Overflow,
}

/// The right-hand operand shape of an `ADD`/`SUB`/`CMP` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Literal,
    Addr,
    Register(Register),
}

/// One opcode byte, fixed per spec.md Section 6. Ordering must never change:
/// both the assembler and the VM derive their numeric encoding from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Panic = 0x00,
    Systemcall = 0x01,
    StrideLit = 0x02,
    Brk = 0x03,
    Nop = 0x04,
    Clc = 0x05,
    Sec = 0x06,
    Ret = 0x07,
    LdaLit = 0x08,
    LdxLit = 0x09,
    LdyLit = 0x0A,
    LdaAddr = 0x0B,
    LdxAddr = 0x0C,
    LdyAddr = 0x0D,
    LdaX = 0x0E,
    LdaY = 0x0F,
    LdxA = 0x10,
    LdxY = 0x11,
    LdyA = 0x12,
    LdyX = 0x13,
    LdaAddrX = 0x14,
    LdaAddrY = 0x15,
    LeaAddr = 0x16,
    LexAddr = 0x17,
    LeyAddr = 0x18,
    StaAddr = 0x19,
    StxAddr = 0x1A,
    StyAddr = 0x1B,
    JmpAddr = 0x1C,
    JsrAddr = 0x1D,
    CmpAX = 0x1E,
    CmpAY = 0x1F,
    CmpALit = 0x20,
    CmpAAddr = 0x21,
    CmpXA = 0x22,
    CmpXY = 0x23,
    CmpXLit = 0x24,
    CmpXAddr = 0x25,
    CmpYA = 0x26,
    CmpYX = 0x27,
    CmpYLit = 0x28,
    CmpYAddr = 0x29,
    BcsAddr = 0x2A,
    BccAddr = 0x2B,
    BeqAddr = 0x2C,
    BneAddr = 0x2D,
    BmiAddr = 0x2E,
    BplAddr = 0x2F,
    BvsAddr = 0x30,
    BvcAddr = 0x31,
    AddLit = 0x32,
    AddAddr = 0x33,
    AddX = 0x34,
    AddY = 0x35,
    SubLit = 0x36,
    SubAddr = 0x37,
    SubX = 0x38,
    SubY = 0x39,
    IncA = 0x3A,
    IncX = 0x3B,
    IncY = 0x3C,
    IncAddr = 0x3D,
    DecA = 0x3E,
    DecX = 0x3F,
    DecY = 0x40,
    DecAddr = 0x41,
    PushA = 0x42,
    PushX = 0x43,
    PushY = 0x44,
    PopA = 0x45,
    PopX = 0x46,
    PopY = 0x47,
    DebugMetadataSignal = 0xFF,
}

impl Opcode {
    /// Every opcode, in numeric order. Used by the disassembler and by
    /// tests that check the table is injective.
    pub const ALL: &'static [Opcode] = &[
        Opcode::Panic, Opcode::Systemcall, Opcode::StrideLit, Opcode::Brk, Opcode::Nop,
        Opcode::Clc, Opcode::Sec, Opcode::Ret,
        Opcode::LdaLit, Opcode::LdxLit, Opcode::LdyLit,
        Opcode::LdaAddr, Opcode::LdxAddr, Opcode::LdyAddr,
        Opcode::LdaX, Opcode::LdaY, Opcode::LdxA, Opcode::LdxY, Opcode::LdyA, Opcode::LdyX,
        Opcode::LdaAddrX, Opcode::LdaAddrY,
        Opcode::LeaAddr, Opcode::LexAddr, Opcode::LeyAddr,
        Opcode::StaAddr, Opcode::StxAddr, Opcode::StyAddr,
        Opcode::JmpAddr, Opcode::JsrAddr,
        Opcode::CmpAX, Opcode::CmpAY, Opcode::CmpALit, Opcode::CmpAAddr,
        Opcode::CmpXA, Opcode::CmpXY, Opcode::CmpXLit, Opcode::CmpXAddr,
        Opcode::CmpYA, Opcode::CmpYX, Opcode::CmpYLit, Opcode::CmpYAddr,
        Opcode::BcsAddr, Opcode::BccAddr, Opcode::BeqAddr, Opcode::BneAddr,
        Opcode::BmiAddr, Opcode::BplAddr, Opcode::BvsAddr, Opcode::BvcAddr,
        Opcode::AddLit, Opcode::AddAddr, Opcode::AddX, Opcode::AddY,
        Opcode::SubLit, Opcode::SubAddr, Opcode::SubX, Opcode::SubY,
        Opcode::IncA, Opcode::IncX, Opcode::IncY, Opcode::IncAddr,
        Opcode::DecA, Opcode::DecX, Opcode::DecY, Opcode::DecAddr,
        Opcode::PushA, Opcode::PushX, Opcode::PushY,
        Opcode::PopA, Opcode::PopX, Opcode::PopY,
        Opcode::DebugMetadataSignal,
    ];

    pub fn from_byte(byte: u8) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| *op as u8 == byte)
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Panic => "PANIC",
            Systemcall => "SYSCALL",
            StrideLit => "STRIDE",
            Brk => "BRK",
            Nop => "NOP",
            Clc => "CLC",
            Sec => "SEC",
            Ret => "RET",
            LdaLit => "LDA",
            LdxLit => "LDX",
            LdyLit => "LDY",
            LdaAddr => "LDA",
            LdxAddr => "LDX",
            LdyAddr => "LDY",
            LdaX => "LDA",
            LdaY => "LDA",
            LdxA => "LDX",
            LdxY => "LDX",
            LdyA => "LDY",
            LdyX => "LDY",
            LdaAddrX => "LDA",
            LdaAddrY => "LDA",
            LeaAddr => "LEA",
            LexAddr => "LEX",
            LeyAddr => "LEY",
            StaAddr => "STA",
            StxAddr => "STX",
            StyAddr => "STY",
            JmpAddr => "JMP",
            JsrAddr => "JSR",
            CmpAX | CmpAY | CmpALit | CmpAAddr | CmpXA | CmpXY | CmpXLit | CmpXAddr
            | CmpYA | CmpYX | CmpYLit | CmpYAddr => "CMP",
            BcsAddr => "BCS",
            BccAddr => "BCC",
            BeqAddr => "BEQ",
            BneAddr => "BNE",
            BmiAddr => "BMI",
            BplAddr => "BPL",
            BvsAddr => "BVS",
            BvcAddr => "BVC",
            AddLit | AddAddr | AddX | AddY => "ADD",
            SubLit | SubAddr | SubX | SubY => "SUB",
            IncA | IncX | IncY | IncAddr => "INC",
            DecA | DecX | DecY | DecAddr => "DEC",
            PushA | PushX | PushY => "PUSH",
            PopA | PopX | PopY => "POP",
            DebugMetadataSignal => "DEBUG",
        }
    }

    /// Fixed instruction length in bytes, opcode byte included. `None` for
    /// `DEBUG_METADATA_SIGNAL`, whose length depends on its payload and is
    /// resolved by scanning forward for the closing signal byte instead
    /// (see `vm::scan_debug_metadata`).
    pub fn instruction_length(self) -> Option<u16> {
        use Opcode::*;
        Some(match self {
            Panic | Systemcall | Brk | Nop | Clc | Sec | Ret => 1,
            StrideLit => 2,
            LdaLit | LdxLit | LdyLit => 5,
            LdaAddr | LdxAddr | LdyAddr => 3,
            LdaX | LdaY | LdxA | LdxY | LdyA | LdyX => 1,
            LdaAddrX | LdaAddrY => 3,
            LeaAddr | LexAddr | LeyAddr => 3,
            StaAddr | StxAddr | StyAddr => 3,
            JmpAddr | JsrAddr => 3,
            CmpAX | CmpAY | CmpXA | CmpXY | CmpYA | CmpYX => 1,
            CmpALit | CmpXLit | CmpYLit => 5,
            CmpAAddr | CmpXAddr | CmpYAddr => 3,
            BcsAddr | BccAddr | BeqAddr | BneAddr | BmiAddr | BplAddr | BvsAddr | BvcAddr => 3,
            AddLit | SubLit => 5,
            AddAddr | SubAddr => 3,
            AddX | AddY | SubX | SubY => 1,
            IncA | IncX | IncY | DecA | DecX | DecY => 1,
            IncAddr | DecAddr => 3,
            PushA | PushX | PushY | PopA | PopX | PopY => 1,
            DebugMetadataSignal => return None,
        })
    }
}

/// Syscall codes dispatched by `SYSTEMCALL`, keyed on the low byte of `A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Syscall {
    PrintRomString = 0x00,
    PrintWramString = 0x01,
    PrintNewlines = 0x02,
    PrintChar = 0x03,
    PrintSignedDecimal = 0x04,
    PrintHex = 0x05,
}

impl Syscall {
    pub fn from_byte(byte: u8) -> Option<Syscall> {
        Some(match byte {
            0x00 => Syscall::PrintRomString,
            0x01 => Syscall::PrintWramString,
            0x02 => Syscall::PrintNewlines,
            0x03 => Syscall::PrintChar,
            0x04 => Syscall::PrintSignedDecimal,
            0x05 => Syscall::PrintHex,
            _ => return None,
        })
    }
}

/// Debug metadata type byte following a `DEBUG_METADATA_SIGNAL` opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DebugMetadataKind {
    LabelName = 0x01,
}

pub const ANON_LABEL_METADATA_NAME: &str = "ANON_LABEL";
