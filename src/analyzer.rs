//! Post-codegen sanity pass: walks the emitted ROM and raises warnings (and
//! one hard error) that codegen itself has no way to notice, since it never
//! sees the whole picture at once.

use crate::spec::{self, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    IndexedWithoutStride,
    NoBreak,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::IndexedWithoutStride => {
                write!(f, "indexed load used without ever setting STRIDE; effective address is undefined")
            }
            Warning::NoBreak => write!(f, "program never executes BRK and will not terminate voluntarily"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    CompilationError { size: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::CompilationError { size } => {
                write!(f, "ROM is {size} bytes, exceeding the 65536-byte address space")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Walk `rom` from its entry point to the end, collecting warnings. Fails
/// outright if the ROM itself cannot fit in the 16-bit address space.
pub fn analyze(rom: &[u8], entry_point: u16) -> Result<Vec<Warning>, Error> {
    if rom.len() >= spec::ROM_SIZE {
        return Err(Error::CompilationError { size: rom.len() });
    }

    let mut is_stride_defined = false;
    let mut is_indexed_defined = false;
    let mut is_break_defined = false;

    let mut pc = entry_point as usize;
    while pc < rom.len() {
        let byte = rom[pc];
        let Some(op) = Opcode::from_byte(byte) else { break };

        match op {
            Opcode::StrideLit => is_stride_defined = true,
            Opcode::LdaAddrX | Opcode::LdaAddrY => is_indexed_defined = true,
            Opcode::Brk => is_break_defined = true,
            _ => {}
        }

        match op.instruction_length() {
            Some(len) => pc += len as usize,
            None => {
                // DEBUG_METADATA_SIGNAL: skip type byte, scan to the closing signal.
                let mut cursor = pc + 2;
                while cursor < rom.len() && rom[cursor] != Opcode::DebugMetadataSignal as u8 {
                    cursor += 1;
                }
                pc = cursor + 1;
            }
        }
    }

    let mut warnings = Vec::new();
    if is_indexed_defined && !is_stride_defined {
        warnings.push(Warning::IndexedWithoutStride);
    }
    if !is_break_defined {
        warnings.push(Warning::NoBreak);
    }
    Ok(warnings)
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
    fn clean_program_has_no_warnings() {
        let rom = assemble("_START:\nBRK\n");
        let warnings = analyze(&rom, spec::DEFAULT_ENTRY_POINT).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn missing_break_warns() {
        let rom = assemble("_START:\nNOP\n");
        let warnings = analyze(&rom, spec::DEFAULT_ENTRY_POINT).unwrap();
        assert!(warnings.contains(&Warning::NoBreak));
    }

    #[test]
    fn indexed_load_without_stride_warns() {
        let rom = assemble("_START:\nLDA $0x10 X\nBRK\n");
        let warnings = analyze(&rom, spec::DEFAULT_ENTRY_POINT).unwrap();
        assert!(warnings.contains(&Warning::IndexedWithoutStride));
    }

    #[test]
    fn indexed_load_with_stride_is_clean() {
        let rom = assemble("_START:\nSTRIDE 0x4\nLDA $0x10 X\nBRK\n");
        let warnings = analyze(&rom, spec::DEFAULT_ENTRY_POINT).unwrap();
        assert!(!warnings.contains(&Warning::IndexedWithoutStride));
    }

    #[test]
    fn oversized_rom_is_a_hard_error() {
        let mut rom = vec![0u8; spec::ROM_SIZE];
        rom[0] = spec::MAGIC_NUMBER;
        let err = analyze(&rom, spec::DEFAULT_ENTRY_POINT).unwrap_err();
        assert!(matches!(err, Error::CompilationError { .. }));
    }

    #[test]
    fn debug_metadata_span_is_skipped_during_walk() {
        let rom = assemble("_START:\nfoo:\nBRK\n");
        // regenerate with debug metadata enabled to exercise the skip path
        let (tokens, mut symbols) =
            preprocessor::preprocess(lexer::lex("_START:\nfoo:\nBRK\n".as_bytes()).unwrap()).unwrap();
        let rom_debug = codegen::generate(&tokens, &mut symbols, true).unwrap();
        let warnings = analyze(&rom_debug, spec::DEFAULT_ENTRY_POINT).unwrap();
        assert!(!warnings.contains(&Warning::NoBreak));
        let _ = rom;
    }
}
