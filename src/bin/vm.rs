use std::{env, fs};

use regvm::logging::error;
use regvm::vm::Machine;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <input.rom>", args[0]);
        std::process::exit(1);
    }

    let rom = fs::read(&args[1]).unwrap_or_else(|e| {
        error(format!("failed to read ROM file: {e}"));
        std::process::exit(2);
    });

    let mut machine = Machine::load(&rom, None).unwrap_or_else(|e| {
        error(e.to_string());
        std::process::exit(4);
    });

    if let Err(e) = machine.run() {
        error(e.to_string());
        std::process::exit(4);
    }
}
