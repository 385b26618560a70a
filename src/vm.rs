//! The virtual machine core: register file, three isolated memory regions,
//! wrap-safe accessors, flag-setting arithmetic, and the fetch/decode/
//! dispatch loop described in spec.md Section 4.5.

use crate::spec::{self, Header, HeaderError, Opcode};
use crate::syscalls;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    StackOverflow,
    StackUnderflow,
    PcOutOfBounds { pc: u16 },
    PanicByte,
    BadSyscall { code: u32 },
    RomFileTooBig { size: usize },
    BadHeader(HeaderError),
    Halted,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::StackOverflow => write!(f, "stack overflow"),
            Error::StackUnderflow => write!(f, "stack underflow"),
            Error::PcOutOfBounds { pc } => write!(f, "PC 0x{pc:04X} is out of bounds"),
            Error::PanicByte => write!(f, "executed null byte"),
            Error::BadSyscall { code } => write!(f, "unknown or malformed syscall 0x{code:02X}"),
            Error::RomFileTooBig { size } => write!(f, "ROM is {size} bytes, exceeding the 64KiB address space"),
            Error::BadHeader(e) => write!(f, "{e}"),
            Error::Halted => write!(f, "machine has already halted"),
        }
    }
}

impl std::error::Error for Error {}

impl From<HeaderError> for Error {
    fn from(e: HeaderError) -> Error {
        Error::BadHeader(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub carry: bool,
    pub zero: bool,
    pub negative: bool,
    pub overflow: bool,
}

/// Why the machine stopped. Distinguishes a voluntary `BRK` from everything
/// else so callers (the release VM vs. the debugger) can pick an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    Break,
    Panic,
}

pub struct Machine {
    pub rom: Box<[u8; spec::ROM_SIZE]>,
    pub rom_len: usize,
    pub wram: Box<[u8; spec::WRAM_SIZE]>,
    pub stack: Box<[u8; spec::STACK_SIZE]>,
    pub a: u32,
    pub x: u32,
    pub y: u32,
    pub pc: u16,
    pub sp: u16,
    pub flags: Flags,
    pub index_byte_stride: u8,
    pub header: Header,
    halted: Option<Halt>,
}

impl Machine {
    /// Load a ROM image. `fill_byte`, when given, primes registers and both
    /// memory regions with a fixed byte instead of zero - useful for tests
    /// that want to catch code relying on implicit zeroing.
    pub fn load(rom_bytes: &[u8], fill_byte: Option<u8>) -> Result<Machine, Error> {
        if rom_bytes.len() > spec::ROM_SIZE {
            return Err(Error::RomFileTooBig { size: rom_bytes.len() });
        }
        let header = Header::parse(rom_bytes)?;

        let fill = fill_byte.unwrap_or(0);
        let mut rom = Box::new([fill; spec::ROM_SIZE]);
        rom[..rom_bytes.len()].copy_from_slice(rom_bytes);

        let wram = Box::new([fill; spec::WRAM_SIZE]);
        let stack = Box::new([fill; spec::STACK_SIZE]);
        let reg_fill = fill as u32;

        Ok(Machine {
            rom,
            rom_len: rom_bytes.len(),
            wram,
            stack,
            a: reg_fill,
            x: reg_fill,
            y: reg_fill,
            pc: header.entry_point,
            sp: (spec::STACK_SIZE - 1) as u16,
            flags: Flags::default(),
            index_byte_stride: fill,
            header,
            halted: None,
        })
    }

    pub fn halted(&self) -> Option<Halt> {
        self.halted
    }

    /// Run until halt or a fatal error.
    pub fn run(&mut self) -> Result<Halt, Error> {
        loop {
            if let Some(h) = self.step()? {
                return Ok(h);
            }
        }
    }

    /// Execute exactly one instruction. Returns `Some(halt reason)` if this
    /// step brought the machine to a stop.
    pub fn step(&mut self) -> Result<Option<Halt>, Error> {
        if self.halted.is_some() {
            return Err(Error::Halted);
        }
        if (self.pc as usize) >= self.rom_len {
            return Err(Error::PcOutOfBounds { pc: self.pc });
        }
        let byte = self.rom[self.pc as usize];
        let Some(op) = Opcode::from_byte(byte) else {
            self.halted = Some(Halt::Panic);
            return Err(Error::PanicByte);
        };

        let mut pc_modified = false;
        self.dispatch(op, &mut pc_modified)?;

        if self.halted.is_some() {
            return Ok(self.halted);
        }
        if !pc_modified {
            self.pc = self.pc.wrapping_add(op.instruction_length().unwrap_or(1));
        }
        Ok(None)
    }

    fn dispatch(&mut self, op: Opcode, pc_modified: &mut bool) -> Result<(), Error> {
        use Opcode::*;
        match op {
            Panic => {
                self.halted = Some(Halt::Panic);
                return Err(Error::PanicByte);
            }
            Systemcall => syscalls::dispatch(self)?,
            StrideLit => self.index_byte_stride = self.rom_byte(self.pc.wrapping_add(1)),
            Brk => self.halted = Some(Halt::Break),
            Nop => {}
            Clc => self.flags.carry = false,
            Sec => self.flags.carry = true,

            LdaLit => self.a = self.load_set_z(self.rom_literal4()),
            LdxLit => self.x = self.load_set_z(self.rom_literal4()),
            LdyLit => self.y = self.load_set_z(self.rom_literal4()),

            LdaAddr => {
                let addr = self.rom_addr2();
                self.a = self.load_set_z(read_wram4(&self.wram, addr));
            }
            LdxAddr => {
                let addr = self.rom_addr2();
                self.x = self.load_set_z(read_wram4(&self.wram, addr));
            }
            LdyAddr => {
                let addr = self.rom_addr2();
                self.y = self.load_set_z(read_wram4(&self.wram, addr));
            }

            LdaX => self.a = self.load_set_z(self.x),
            LdaY => self.a = self.load_set_z(self.y),
            LdxA => self.x = self.load_set_z(self.a),
            LdxY => self.x = self.load_set_z(self.y),
            LdyA => self.y = self.load_set_z(self.a),
            LdyX => self.y = self.load_set_z(self.x),

            LdaAddrX => {
                let base = self.rom_addr2();
                let effective = base.wrapping_add((self.x as u16).wrapping_mul(self.index_byte_stride as u16));
                self.a = self.load_set_z(read_wram4(&self.wram, effective));
            }
            LdaAddrY => {
                let base = self.rom_addr2();
                let effective = base.wrapping_add((self.y as u16).wrapping_mul(self.index_byte_stride as u16));
                self.a = self.load_set_z(read_wram4(&self.wram, effective));
            }

            LeaAddr => self.a = self.load_set_z(self.rom_addr2() as u32),
            LexAddr => self.x = self.load_set_z(self.rom_addr2() as u32),
            LeyAddr => self.y = self.load_set_z(self.rom_addr2() as u32),

            StaAddr => {
                let addr = self.rom_addr2();
                write_wram4(&mut self.wram, addr, self.a);
            }
            StxAddr => {
                let addr = self.rom_addr2();
                write_wram4(&mut self.wram, addr, self.x);
            }
            StyAddr => {
                let addr = self.rom_addr2();
                write_wram4(&mut self.wram, addr, self.y);
            }

            JmpAddr => {
                self.pc = self.rom_addr2();
                *pc_modified = true;
            }
            JsrAddr => {
                let target = self.rom_addr2();
                self.push_bytes(self.pc.wrapping_add(3) as u32, 2)?;
                self.pc = target;
                *pc_modified = true;
            }
            Ret => {
                let addr = self.pop_bytes(2)?;
                self.pc = addr as u16;
                *pc_modified = true;
            }

            CmpAX => self.flags = compare(self.a, self.x),
            CmpAY => self.flags = compare(self.a, self.y),
            CmpALit => self.flags = compare(self.a, self.rom_literal4()),
            CmpAAddr => {
                let addr = self.rom_addr2();
                self.flags = compare(self.a, read_wram4(&self.wram, addr));
            }
            CmpXA => self.flags = compare(self.x, self.a),
            CmpXY => self.flags = compare(self.x, self.y),
            CmpXLit => self.flags = compare(self.x, self.rom_literal4()),
            CmpXAddr => {
                let addr = self.rom_addr2();
                self.flags = compare(self.x, read_wram4(&self.wram, addr));
            }
            CmpYA => self.flags = compare(self.y, self.a),
            CmpYX => self.flags = compare(self.y, self.x),
            CmpYLit => self.flags = compare(self.y, self.rom_literal4()),
            CmpYAddr => {
                let addr = self.rom_addr2();
                self.flags = compare(self.y, read_wram4(&self.wram, addr));
            }

            BcsAddr => self.branch_if(self.flags.carry, pc_modified),
            BccAddr => self.branch_if(!self.flags.carry, pc_modified),
            BeqAddr => self.branch_if(self.flags.zero, pc_modified),
            BneAddr => self.branch_if(!self.flags.zero, pc_modified),
            BmiAddr => self.branch_if(self.flags.negative, pc_modified),
            BplAddr => self.branch_if(!self.flags.negative, pc_modified),
            BvsAddr => self.branch_if(self.flags.overflow, pc_modified),
            BvcAddr => self.branch_if(!self.flags.overflow, pc_modified),

            AddLit => {
                let (v, f) = add_with_carry(self.a, self.rom_literal4(), self.flags.carry);
                self.a = v;
                self.flags = f;
            }
            AddAddr => {
                let addr = self.rom_addr2();
                let (v, f) = add_with_carry(self.a, read_wram4(&self.wram, addr), self.flags.carry);
                self.a = v;
                self.flags = f;
            }
            AddX => {
                let (v, f) = add_with_carry(self.a, self.x, self.flags.carry);
                self.a = v;
                self.flags = f;
            }
            AddY => {
                let (v, f) = add_with_carry(self.a, self.y, self.flags.carry);
                self.a = v;
                self.flags = f;
            }

            SubLit => {
                let (v, f) = sub_with_borrow(self.a, self.rom_literal4(), self.flags.carry);
                self.a = v;
                self.flags = f;
            }
            SubAddr => {
                let addr = self.rom_addr2();
                let (v, f) = sub_with_borrow(self.a, read_wram4(&self.wram, addr), self.flags.carry);
                self.a = v;
                self.flags = f;
            }
            SubX => {
                let (v, f) = sub_with_borrow(self.a, self.x, self.flags.carry);
                self.a = v;
                self.flags = f;
            }
            SubY => {
                let (v, f) = sub_with_borrow(self.a, self.y, self.flags.carry);
                self.a = v;
                self.flags = f;
            }

            // INC always adds with an explicit carry-in of 0, independent of the stored C flag.
            IncA => {
                let (v, f) = add_with_carry(self.a, 1, false);
                self.a = v;
                self.flags = f;
            }
            IncX => {
                let (v, f) = add_with_carry(self.x, 1, false);
                self.x = v;
                self.flags = f;
            }
            IncY => {
                let (v, f) = add_with_carry(self.y, 1, false);
                self.y = v;
                self.flags = f;
            }
            IncAddr => {
                let addr = self.rom_addr2();
                let (v, f) = add_with_carry(read_wram4(&self.wram, addr), 1, false);
                write_wram4(&mut self.wram, addr, v);
                self.flags = f;
            }

            // DEC is a one-byte instruction; its implicit operand is always 1.
            DecA => {
                let (v, f) = sub_with_borrow(self.a, 1, true);
                self.a = v;
                self.flags = f;
            }
            DecX => {
                let (v, f) = sub_with_borrow(self.x, 1, true);
                self.x = v;
                self.flags = f;
            }
            DecY => {
                let (v, f) = sub_with_borrow(self.y, 1, true);
                self.y = v;
                self.flags = f;
            }
            DecAddr => {
                let addr = self.rom_addr2();
                let (v, f) = sub_with_borrow(read_wram4(&self.wram, addr), 1, true);
                write_wram4(&mut self.wram, addr, v);
                self.flags = f;
            }

            PushA => self.push_bytes(self.a, 4)?,
            PushX => self.push_bytes(self.x, 4)?,
            PushY => self.push_bytes(self.y, 4)?,
            PopA => self.a = self.pop_bytes(4)?,
            PopX => self.x = self.pop_bytes(4)?,
            PopY => self.y = self.pop_bytes(4)?,

            DebugMetadataSignal => {
                let mut cursor = self.pc.wrapping_add(2);
                while cursor < self.rom_len as u16 && self.rom[cursor as usize] != DebugMetadataSignal as u8 {
                    cursor = cursor.wrapping_add(1);
                }
                self.pc = cursor.wrapping_add(1);
                *pc_modified = true;
            }
        }
        Ok(())
    }

    fn branch_if(&mut self, taken: bool, pc_modified: &mut bool) {
        if taken {
            self.pc = self.rom_addr2();
            *pc_modified = true;
        }
    }

    fn load_set_z(&mut self, value: u32) -> u32 {
        self.flags.zero = value == 0;
        value
    }

    fn rom_byte(&self, addr: u16) -> u8 {
        self.rom[addr as usize % spec::ROM_SIZE]
    }

    fn rom_literal4(&self) -> u32 {
        read_bytes_wrapped(&*self.rom, self.pc.wrapping_add(1), 4, spec::ROM_SIZE)
    }

    fn rom_addr2(&self) -> u16 {
        let lo = self.rom_byte(self.pc.wrapping_add(1));
        let hi = self.rom_byte(self.pc.wrapping_add(2));
        u16::from_le_bytes([lo, hi])
    }

    fn push_bytes(&mut self, value: u32, n: u16) -> Result<(), Error> {
        if self.sp < n {
            return Err(Error::StackOverflow);
        }
        self.sp -= n;
        write_bytes_wrapped(&mut *self.stack, self.sp, value, n as usize, spec::STACK_SIZE);
        Ok(())
    }

    fn pop_bytes(&mut self, n: u16) -> Result<u32, Error> {
        if self.sp as usize + n as usize >= spec::STACK_SIZE {
            return Err(Error::StackUnderflow);
        }
        let value = read_bytes_wrapped(&*self.stack, self.sp, n as usize, spec::STACK_SIZE);
        self.sp += n;
        Ok(value)
    }

    /// Read `n` bytes from WRAM starting at `addr`, wrap-safe, little-endian.
    pub fn read_wram(&self, addr: u16, n: usize) -> u32 {
        read_bytes_wrapped(&*self.wram, addr, n, spec::WRAM_SIZE)
    }

    pub fn read_wram_byte(&self, addr: u16) -> u8 {
        self.wram[addr as usize % spec::WRAM_SIZE]
    }

    pub fn read_rom_byte(&self, addr: u16) -> u8 {
        self.rom_byte(addr)
    }
}

fn read_bytes_wrapped(region: &[u8], addr: u16, n: usize, modulus: usize) -> u32 {
    let mut value = 0u32;
    for i in 0..n {
        let idx = (addr as usize + i) % modulus;
        value |= (region[idx] as u32) << (8 * i);
    }
    value
}

fn write_bytes_wrapped(region: &mut [u8], addr: u16, value: u32, n: usize, modulus: usize) {
    for i in 0..n {
        let idx = (addr as usize + i) % modulus;
        region[idx] = ((value >> (8 * i)) & 0xFF) as u8;
    }
}

fn read_wram4(region: &[u8], addr: u16) -> u32 {
    read_bytes_wrapped(region, addr, 4, region.len())
}

fn write_wram4(region: &mut [u8], addr: u16, value: u32) {
    let len = region.len();
    write_bytes_wrapped(region, addr, value, 4, len)
}

/// `a + b + c_in`, wrapping, with all four flags set per spec.md Section 4.8.
pub fn add_with_carry(a: u32, b: u32, c_in: bool) -> (u32, Flags) {
    let (r1, o1) = a.overflowing_add(b);
    let (result, o2) = r1.overflowing_add(c_in as u32);
    let carry = o1 || o2;
    let same_sign = (a ^ b) & 0x8000_0000 == 0;
    let overflow = same_sign && (a ^ result) & 0x8000_0000 != 0;
    (
        result,
        Flags { carry, zero: result == 0, negative: result & 0x8000_0000 != 0, overflow },
    )
}

/// `a - (b + (1 - c_in))`, wrapping, with all four flags set.
pub fn sub_with_borrow(a: u32, b: u32, c_in: bool) -> (u32, Flags) {
    let subtrahend = b.wrapping_add(1u32.wrapping_sub(c_in as u32));
    let (result, borrowed) = a.overflowing_sub(subtrahend);
    let neg_b = subtrahend.wrapping_neg();
    let same_sign = (a ^ neg_b) & 0x8000_0000 == 0;
    let overflow = same_sign && (a ^ result) & 0x8000_0000 != 0;
    (
        result,
        Flags { carry: borrowed, zero: result == 0, negative: result & 0x8000_0000 != 0, overflow },
    )
}

/// `sub_with_borrow(a, b, true)`, result discarded.
pub fn compare(a: u32, b: u32) -> Flags {
    sub_with_borrow(a, b, true).1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen;
    use crate::lexer;
    use crate::preprocessor;

    fn assemble(source: &str) -> Vec<u8> {
        let (tokens, mut symbols) = preprocessor::preprocess(lexer::lex(source.as_bytes()).unwrap()).unwrap();
        codegen::generate(&tokens, &mut symbols, false).unwrap()
    }

    #[test]
    fn breaks_immediately() {
        let rom = assemble("_START:\nBRK\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        assert_eq!(vm.run().unwrap(), Halt::Break);
    }

    #[test]
    fn lda_lit_sets_register_and_zero_flag() {
        let rom = assemble("_START:\nLDA 0x00\nBRK\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        vm.step().unwrap();
        assert_eq!(vm.a, 0);
        assert!(vm.flags.zero);
    }

    #[test]
    fn sta_then_lda_addr_round_trips() {
        let rom = assemble("_START:\nLDA 0x2A\nSTA $0x100\nLDX $0x100\nBRK\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        vm.run().unwrap();
        assert_eq!(vm.x, 0x2A);
    }

    #[test]
    fn lea_loads_the_address_not_the_contents() {
        let rom = assemble("_START:\nLEA $0x1234\nBRK\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        vm.run().unwrap();
        assert_eq!(vm.a, 0x1234);
    }

    #[test]
    fn push_pop_round_trips_sp() {
        let rom = assemble("_START:\nLDA 0x99\nPUSH A\nPOP X\nBRK\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        let sp_before = (spec::STACK_SIZE - 1) as u16;
        vm.run().unwrap();
        assert_eq!(vm.x, 0x99);
        assert_eq!(vm.sp, sp_before);
    }

    #[test]
    fn jsr_ret_reaches_brk_and_halts() {
        let rom = assemble("_START:\nJSR sub\nBRK\nsub:\nRET\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        assert_eq!(vm.run().unwrap(), Halt::Break);
    }

    #[test]
    fn dec_a_is_one_byte_no_trailing_literal() {
        let rom = assemble("_START:\nLDA 0x01\nDEC A\nBRK\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        vm.run().unwrap();
        assert_eq!(vm.a, 0);
    }

    #[test]
    fn ldx_y_moves_y_into_x() {
        let rom = assemble("_START:\nLDY 0x07\nLDX Y\nBRK\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        vm.run().unwrap();
        assert_eq!(vm.x, 0x07);
        assert_eq!(vm.y, 0x07);
    }

    #[test]
    fn sub_x_uses_sub_with_borrow_not_add() {
        let rom = assemble("_START:\nLDA 0x05\nLDX 0x02\nSEC\nSUB X\nBRK\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        vm.run().unwrap();
        assert_eq!(vm.a, 3);
    }

    #[test]
    fn inc_ignores_stored_carry_but_still_sets_it() {
        let rom = assemble("_START:\nLDA 0xFFFFFFFF\nSEC\nINC A\nBRK\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        vm.run().unwrap();
        assert_eq!(vm.a, 0);
        assert!(vm.flags.carry);
        assert!(vm.flags.zero);
    }

    #[test]
    fn add_with_carry_sets_overflow_on_signed_overflow() {
        let (result, flags) = add_with_carry(0x7FFF_FFFF, 1, false);
        assert_eq!(result, 0x8000_0000);
        assert!(flags.overflow);
        assert!(flags.negative);
    }

    #[test]
    fn compare_does_not_mutate_operands() {
        let flags = compare(5, 5);
        assert!(flags.zero);
    }

    #[test]
    fn panic_byte_halts_with_error() {
        let mut rom = assemble("_START:\nBRK\n");
        rom[16] = Opcode::Panic as u8;
        let mut vm = Machine::load(&rom, None).unwrap();
        let err = vm.run().unwrap_err();
        assert_eq!(err, Error::PanicByte);
    }

    #[test]
    fn mixed_width_push_pop_round_trip_restores_sp() {
        let rom = assemble("_START:\nBRK\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        let sp_initial = vm.sp;

        vm.push_bytes(0xF001, 2).unwrap();
        vm.push_bytes(0xF002, 2).unwrap();
        vm.push_bytes(0x1122_3344, 4).unwrap();
        vm.push_bytes(0xF005, 2).unwrap();

        assert_eq!(vm.pop_bytes(2).unwrap(), 0xF005);
        assert_eq!(vm.pop_bytes(4).unwrap(), 0x1122_3344);
        assert_eq!(vm.pop_bytes(2).unwrap(), 0xF002);
        assert_eq!(vm.pop_bytes(2).unwrap(), 0xF001);
        assert_eq!(vm.sp, sp_initial);
    }

    #[test]
    fn stack_overflow_on_deep_push() {
        let rom = assemble("_START:\nBRK\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        vm.sp = 1;
        let err = vm.push_bytes(0xFF, 4).unwrap_err();
        assert_eq!(err, Error::StackOverflow);
    }

    #[test]
    fn wrap_safe_wram_access_crosses_boundary() {
        let mut wram = [0u8; spec::WRAM_SIZE];
        write_wram4(&mut wram, 0xFFFE, 0xAABBCCDD);
        assert_eq!(wram[0xFFFE], 0xDD);
        assert_eq!(wram[0xFFFF], 0xCC);
        assert_eq!(wram[0x0000], 0xBB);
        assert_eq!(wram[0x0001], 0xAA);
        assert_eq!(read_wram4(&wram, 0xFFFE), 0xAABBCCDD);
    }

    #[test]
    fn bad_magic_number_is_rejected_at_load() {
        let mut rom = assemble("_START:\nBRK\n");
        rom[0] = 0x00;
        let err = Machine::load(&rom, None).unwrap_err();
        assert!(matches!(err, Error::BadHeader(HeaderError::BadMagicNumber { .. })));
    }
}
