use std::{env, fs};

use regvm::assembler;
use regvm::logging::{error, warning};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        eprintln!("Usage: {} <input.asm> <output.rom> [--debug]", args[0]);
        std::process::exit(1);
    }
    if args.len() == 4 && args[3] != "--debug" {
        eprintln!("Usage: {} <input.asm> <output.rom> [--debug]", args[0]);
        std::process::exit(1);
    }
    let debug_mode = args.len() == 4;

    let input_path = &args[1];
    let output_path = &args[2];

    let source = fs::read(input_path).unwrap_or_else(|e| {
        error(format!("failed to read input file: {e}"));
        std::process::exit(2);
    });

    let assembled = assembler::assemble(&source, debug_mode).unwrap_or_else(|e| {
        error(e.to_string());
        std::process::exit(3);
    });

    for w in &assembled.warnings {
        warning(w.to_string(), 0);
    }

    fs::write(output_path, assembled.rom).unwrap_or_else(|e| {
        error(format!("failed to write output file: {e}"));
        std::process::exit(2);
    });
}
