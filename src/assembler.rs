//! Top-level orchestrator that runs a source string through the lexer, the
//! preprocessor, two-pass codegen, and the post-codegen analyzer, producing
//! a finished ROM image plus any warnings the analyzer raised.

use crate::analyzer;
use crate::codegen;
use crate::lexer;
use crate::preprocessor;

#[derive(Debug)]
pub enum Error {
    Lexer(lexer::Error),
    Preprocessor(preprocessor::Error),
    Codegen(codegen::Error),
    Analyzer(analyzer::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Lexer(e) => write!(f, "{e}"),
            Error::Preprocessor(e) => write!(f, "{e}"),
            Error::Codegen(e) => write!(f, "{e}"),
            Error::Analyzer(e) => write!(f, "{e}"),
            Error::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<lexer::Error> for Error {
    fn from(e: lexer::Error) -> Error {
        Error::Lexer(e)
    }
}
impl From<preprocessor::Error> for Error {
    fn from(e: preprocessor::Error) -> Error {
        Error::Preprocessor(e)
    }
}
impl From<codegen::Error> for Error {
    fn from(e: codegen::Error) -> Error {
        Error::Codegen(e)
    }
}
impl From<analyzer::Error> for Error {
    fn from(e: analyzer::Error) -> Error {
        Error::Analyzer(e)
    }
}
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

pub struct Assembled {
    pub rom: Vec<u8>,
    pub warnings: Vec<analyzer::Warning>,
}

/// Assemble a complete source string into a ROM image. `debug_mode`
/// controls whether label-name metadata is interleaved into the output.
pub fn assemble(source: &[u8], debug_mode: bool) -> Result<Assembled, Error> {
    let tokens = lexer::lex(source)?;
    let (tokens, mut symbols) = preprocessor::preprocess(tokens)?;
    let rom = codegen::generate(&tokens, &mut symbols, debug_mode)?;
    let entry_point = crate::spec::Header::parse(&rom)
        .map(|h| h.entry_point)
        .unwrap_or(crate::spec::DEFAULT_ENTRY_POINT);
    let warnings = analyzer::analyze(&rom, entry_point)?;
    Ok(Assembled { rom, warnings })
}

/// Read `path`, assemble it, and return the result. Warnings are logged
/// through [`crate::logging`]; only a hard error aborts assembly.
pub fn assemble_from_file(path: &std::path::Path, debug_mode: bool) -> Result<Assembled, Error> {
    let source = std::fs::read(path)?;
    assemble(&source, debug_mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_a_minimal_program() {
        let result = assemble(b"_START:\nBRK\n", false).unwrap();
        assert_eq!(result.rom[0], crate::spec::MAGIC_NUMBER);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn propagates_lexer_errors() {
        let err = assemble(b"NOP\n", false).unwrap_err();
        assert!(matches!(err, Error::Lexer(_)));
    }

    #[test]
    fn propagates_codegen_errors() {
        let err = assemble(b"_START:\nJMP ghost\nBRK\n", false).unwrap_err();
        assert!(matches!(err, Error::Codegen(_)));
    }

    #[test]
    fn surfaces_analyzer_warnings_without_failing() {
        let result = assemble(b"_START:\nNOP\n", false).unwrap();
        assert!(result.warnings.contains(&analyzer::Warning::NoBreak));
    }
}
