//! A thin tracing wrapper around [`crate::vm::Machine`]. Grounded on the
//! teacher's `interpreter::mainloop`: fetch, print a trace line, execute,
//! then cooperatively sleep before the next cycle. No preemption, no
//! parallelism - just a slower `run`.

use std::time::{Duration, Instant};

use crate::disasm;
use crate::spec::Opcode;
use crate::vm::{Error, Halt, Machine};

pub struct DebugOptions {
    pub trace: bool,
    pub delay: Duration,
    pub nop_delay: Duration,
}

impl Default for DebugOptions {
    fn default() -> DebugOptions {
        DebugOptions { trace: false, delay: Duration::ZERO, nop_delay: Duration::ZERO }
    }
}

/// Run to completion, tracing and throttling per `opts`.
pub fn run(vm: &mut Machine, opts: &DebugOptions) -> Result<Halt, Error> {
    loop {
        let cycle_start = Instant::now();
        let pc = vm.pc;
        let byte = vm.read_rom_byte(pc);
        let op = Opcode::from_byte(byte);

        if opts.trace {
            print!("PC: 0x{pc:04X} ");
            match op {
                Some(op) => println!("OPCODE: 0x{:02X} ({})", byte, op.mnemonic()),
                None => println!("OPCODE: 0x{byte:02X} (invalid)"),
            }
        }

        let halted = vm.step()?;

        if opts.trace {
            print!("  A=0x{:08X} X=0x{:08X} Y=0x{:08X} SP=0x{:04X} ", vm.a, vm.x, vm.y, vm.sp);
            println!(
                "C={} Z={} N={} V={}",
                vm.flags.carry as u8, vm.flags.zero as u8, vm.flags.negative as u8, vm.flags.overflow as u8
            );
        }

        if let Some(halt) = halted {
            return Ok(halt);
        }

        let mut budget = opts.delay;
        if op == Some(Opcode::Nop) {
            budget += opts.nop_delay;
        }
        let elapsed = cycle_start.elapsed();
        if elapsed < budget {
            std::thread::sleep(budget - elapsed);
        }
    }
}

/// Render a ROM's disassembly without executing it.
pub fn disassemble(rom: &[u8]) -> String {
    disasm::disassemble(rom)
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
    fn untraced_run_with_zero_delay_completes_immediately() {
        let rom = assemble("_START:\nNOP\nBRK\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        let opts = DebugOptions::default();
        assert_eq!(run(&mut vm, &opts).unwrap(), Halt::Break);
    }

    #[test]
    fn traced_run_still_reaches_break() {
        let rom = assemble("_START:\nLDA 0x01\nBRK\n");
        let mut vm = Machine::load(&rom, None).unwrap();
        let opts = DebugOptions { trace: true, ..DebugOptions::default() };
        assert_eq!(run(&mut vm, &opts).unwrap(), Halt::Break);
    }

    #[test]
    fn disassemble_delegates_to_disasm_module() {
        let rom = assemble("_START:\nBRK\n");
        assert!(disassemble(&rom).contains("BRK"));
    }
}
