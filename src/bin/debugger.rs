use std::env;
use std::fs;
use std::time::Duration;

use regvm::debugger::{self, DebugOptions};
use regvm::logging::error;
use regvm::vm::Machine;

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {program} <input.rom> [--disassemble] [--trace] [--delay-ms N] [--nop-delay-ms N]"
    );
    std::process::exit(1);
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
    }

    let rom_path = &args[1];
    let mut disassemble = false;
    let mut opts = DebugOptions::default();

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--disassemble" => disassemble = true,
            "--trace" => opts.trace = true,
            "--delay-ms" => {
                i += 1;
                let Some(ms) = args.get(i).and_then(|s| s.parse::<u64>().ok()) else { usage(&args[0]) };
                opts.delay = Duration::from_millis(ms);
            }
            "--nop-delay-ms" => {
                i += 1;
                let Some(ms) = args.get(i).and_then(|s| s.parse::<u64>().ok()) else { usage(&args[0]) };
                opts.nop_delay = Duration::from_millis(ms);
            }
            _ => usage(&args[0]),
        }
        i += 1;
    }

    let rom = fs::read(rom_path).unwrap_or_else(|e| {
        error(format!("failed to read ROM file: {e}"));
        std::process::exit(2);
    });

    if disassemble {
        print!("{}", debugger::disassemble(&rom));
        return;
    }

    let mut machine = Machine::load(&rom, None).unwrap_or_else(|e| {
        error(e.to_string());
        std::process::exit(4);
    });

    if let Err(e) = debugger::run(&mut machine, &opts) {
        error(e.to_string());
        std::process::exit(4);
    }
}
