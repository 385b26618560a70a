//! Dispatch table for the `SYSTEMCALL` opcode: the only way a running
//! program talks to the outside world. All output goes to stdout.

use crate::spec::Syscall;
use crate::vm::{Error, Machine};

const MAX_STRING_SCAN: usize = 1 << 16;

/// Dispatch on `A`'s low byte, with `X`/`Y` as arguments, per spec.md
/// Section 4.7. Called once per `SYSTEMCALL` instruction.
pub fn dispatch(vm: &mut Machine) -> Result<(), Error> {
    let code = vm.a & 0xFF;
    let Some(call) = Syscall::from_byte(code as u8) else {
        return Err(Error::BadSyscall { code });
    };

    match call {
        Syscall::PrintRomString => print_string(vm, vm.x as u16, Source::Rom)?,
        Syscall::PrintWramString => print_string(vm, vm.x as u16, Source::Wram)?,
        Syscall::PrintNewlines => {
            for _ in 0..vm.x {
                println!();
            }
        }
        Syscall::PrintChar => {
            let ch = u8::try_from(vm.x & 0xFF).unwrap_or(b'?');
            let printable = if ch.is_ascii() { ch as char } else { '?' };
            print!("{printable}");
        }
        Syscall::PrintSignedDecimal => print!("{}", vm.x as i32),
        Syscall::PrintHex => print!("{:08X}", vm.x),
    }
    Ok(())
}

enum Source {
    Rom,
    Wram,
}

fn print_string(vm: &Machine, start: u16, source: Source) -> Result<(), Error> {
    let mut addr = start;
    let mut bytes = Vec::new();
    for _ in 0..MAX_STRING_SCAN {
        let byte = match source {
            Source::Rom => vm.read_rom_byte(addr),
            Source::Wram => vm.read_wram_byte(addr),
        };
        if byte == 0 {
            print!("{}", String::from_utf8_lossy(&bytes));
            return Ok(());
        }
        bytes.push(byte);
        addr = addr.wrapping_add(1);
    }
    Err(Error::BadSyscall { code: match source { Source::Rom => 0x00, Source::Wram => 0x01 } })
}
