//! Two-pass code generation: expanded token stream -> ROM bytes.
//!
//! `generate` runs the identical emission routine twice and discards the
//! first pass's bytes. Pass 1 walks the stream to fix every label's final
//! ROM offset (instruction widths never depend on which pass is running, so
//! offsets computed in pass 1 are exact); pass 2 re-walks with a fully
//! populated symbol table and substitutes real addresses wherever pass 1 had
//! to emit a placeholder.

mod encode;

use crate::spec::{self, DebugMetadataKind, Opcode};
use crate::symbol_table::{Symbol, SymbolTable, SymbolTableError, ENTRY_POINT_LABEL};
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    First,
    Second,
}

struct EncodeCtx<'a> {
    symbols: &'a SymbolTable,
    offset: u16,
    pass: Pass,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InstructionLineTooLong { line: usize },
    BadByteDefinition { line: usize },
    UnknownIdentifier { name: String, line: usize },
    UnexpandedMacro { name: String, line: usize },
    UnexpandedDefine { name: String, line: usize },
    MisuseOfLabels { line: usize },
    UnknownOpcodeShape { mnemonic: String, line: usize },
    UnresolvedRelativeLabel { line: usize, source: SymbolTableError },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InstructionLineTooLong { line } => {
                write!(f, "line {line}: instruction line longer than 8 tokens")
            }
            Error::BadByteDefinition { line } => {
                write!(f, "line {line}: .db/.dw/.dd expects only literal or address tokens")
            }
            Error::UnknownIdentifier { name, line } => write!(f, "line {line}: unknown identifier '{name}'"),
            Error::UnexpandedMacro { name, line } => {
                write!(f, "line {line}: macro '{name}' used where a value was expected")
            }
            Error::UnexpandedDefine { name, line } => {
                write!(f, "line {line}: define '{name}' survived to codegen unexpanded")
            }
            Error::MisuseOfLabels { line } => write!(f, "line {line}: _START does not name a label"),
            Error::UnknownOpcodeShape { mnemonic, line } => {
                write!(f, "line {line}: no instruction shape matches '{mnemonic}'")
            }
            Error::UnresolvedRelativeLabel { line, source } => write!(f, "line {line}: {source}"),
        }
    }
}

impl std::error::Error for Error {}

/// Run the two-pass emission routine and return the final ROM bytes.
pub fn generate(tokens: &[Token], symbols: &mut SymbolTable, debug_mode: bool) -> Result<Vec<u8>, Error> {
    emit(tokens, symbols, Pass::First, debug_mode)?;
    emit(tokens, symbols, Pass::Second, debug_mode)
}

fn emit(tokens: &[Token], symbols: &mut SymbolTable, pass: Pass, debug_mode: bool) -> Result<Vec<u8>, Error> {
    let mut out = vec![0u8; spec::HEADER_LEN];
    let mut line_buf: Vec<Token> = Vec::new();
    let mut db_mode: Option<usize> = None;

    for tok in tokens {
        match tok.kind {
            TokenKind::EndOfFile => break,

            TokenKind::LineFinish => {
                db_mode = None;
                if !line_buf.is_empty() {
                    let offset = out.len() as u16;
                    let ctx = EncodeCtx { symbols, offset, pass };
                    let (opcode, operand) = encode::encode_line(&line_buf, &ctx)?;
                    out.push(opcode as u8);
                    out.extend(operand);
                    line_buf.clear();
                }
            }

            TokenKind::Label | TokenKind::AnonLabel => {
                let offset = out.len() as u32;
                let name = match (tok.kind, pass) {
                    (TokenKind::Label, _) => tok.identifier_str().to_string(),
                    (TokenKind::AnonLabel, Pass::First) => symbols.next_anon_label_name(),
                    (TokenKind::AnonLabel, Pass::Second) => String::new(),
                    _ => unreachable!(),
                };
                if matches!(pass, Pass::First) {
                    symbols.add(name.clone(), Symbol::Label(Token::address(offset, tok.line)));
                }
                if debug_mode {
                    let metadata_name =
                        if tok.kind == TokenKind::Label { name.as_str() } else { spec::ANON_LABEL_METADATA_NAME };
                    out.push(Opcode::DebugMetadataSignal as u8);
                    out.push(DebugMetadataKind::LabelName as u8);
                    out.extend(metadata_name.bytes());
                    out.push(Opcode::DebugMetadataSignal as u8);
                }
            }

            TokenKind::Keyword if matches!(tok.identifier_str(), ".db" | ".dw" | ".dd") => {
                db_mode = Some(match tok.identifier_str() {
                    ".db" => 1,
                    ".dw" => 2,
                    ".dd" => 4,
                    _ => unreachable!(),
                });
            }

            _ => {
                if let Some(width) = db_mode {
                    match tok.kind {
                        TokenKind::Literal | TokenKind::Address => {
                            out.extend_from_slice(&tok.value.to_le_bytes()[..width]);
                        }
                        _ => return Err(Error::BadByteDefinition { line: tok.line }),
                    }
                } else {
                    if line_buf.len() >= 8 {
                        return Err(Error::InstructionLineTooLong { line: tok.line });
                    }
                    line_buf.push(tok.clone());
                }
            }
        }
    }

    let entry_point = match pass {
        Pass::First => spec::DEFAULT_ENTRY_POINT,
        Pass::Second => match symbols.get(ENTRY_POINT_LABEL) {
            Some(Symbol::Label(addr)) => addr.value as u16,
            Some(_) => return Err(Error::MisuseOfLabels { line: 0 }),
            None => spec::DEFAULT_ENTRY_POINT,
        },
    };
    let header = spec::Header::new(entry_point, debug_mode).to_bytes();
    out[..spec::HEADER_LEN].copy_from_slice(&header);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::preprocessor;

    fn build(source: &str) -> (Vec<u8>, SymbolTable) {
        let (tokens, mut symbols) = preprocessor::preprocess(lexer::lex(source.as_bytes()).unwrap()).unwrap();
        let rom = generate(&tokens, &mut symbols, false).unwrap();
        (rom, symbols)
    }

    #[test]
    fn header_resolves_entry_point_at_start_of_stream() {
        let (rom, _) = build("_START:\nNOP\nBRK\n");
        assert_eq!(rom[0], spec::MAGIC_NUMBER);
        assert_eq!(u16::from_le_bytes([rom[2], rom[3]]), spec::DEFAULT_ENTRY_POINT);
    }

    #[test]
    fn header_patches_start_label_address() {
        let (rom, _) = build("NOP\n_START:\nBRK\n");
        // one NOP (1 byte) before the label, so _START resolves to header + 1
        assert_eq!(u16::from_le_bytes([rom[2], rom[3]]), spec::HEADER_LEN as u16 + 1);
    }

    #[test]
    fn lda_lit_emits_opcode_and_four_byte_literal() {
        let (rom, _) = build("_START:\nLDA 0x2A\nBRK\n");
        assert_eq!(rom[16], Opcode::LdaLit as u8);
        assert_eq!(&rom[17..21], &0x2Au32.to_le_bytes());
        assert_eq!(rom[21], Opcode::Brk as u8);
    }

    #[test]
    fn lda_register_transfer_has_no_operand() {
        let (rom, _) = build("_START:\nLDA X\nBRK\n");
        assert_eq!(rom[16], Opcode::LdaX as u8);
        assert_eq!(rom[17], Opcode::Brk as u8);
    }

    #[test]
    fn db_directive_emits_raw_bytes() {
        let (rom, _) = build("_START:\n.db 0x48 0x49 0x00\nBRK\n");
        assert_eq!(&rom[16..19], &[0x48, 0x49, 0x00]);
        assert_eq!(rom[19], Opcode::Brk as u8);
    }

    #[test]
    fn dw_directive_emits_little_endian_pairs() {
        let (rom, _) = build("_START:\n.dw 0x1234\nBRK\n");
        assert_eq!(&rom[16..18], &[0x34, 0x12]);
    }

    #[test]
    fn jmp_to_forward_label_resolves_on_second_pass() {
        let (rom, symbols) = build("_START:\nJMP skip\nNOP\nskip:\nBRK\n");
        assert_eq!(rom[16], Opcode::JmpAddr as u8);
        let target = u16::from_le_bytes([rom[17], rom[18]]);
        assert_eq!(Some(target), symbols.get("skip").map(|s| match s {
            Symbol::Label(t) => t.value as u16,
            _ => panic!("expected label"),
        }));
    }

    #[test]
    fn relative_backward_label_resolves() {
        let (rom, _) = build("_START:\n@:\nNOP\nJMP @-\nBRK\n");
        // @: at offset 16, NOP at 16 (1 byte), JMP @- at 17
        assert_eq!(rom[17], Opcode::JmpAddr as u8);
        let target = u16::from_le_bytes([rom[18], rom[19]]);
        assert_eq!(target, 16);
    }

    #[test]
    fn two_pass_emission_is_a_fixed_point() {
        let (tokens, mut symbols) = preprocess_for_test("_START:\nLDA 0x01\nJMP done\nNOP\ndone:\nBRK\n");
        let second_a = emit(&tokens, &mut symbols, Pass::First, false).unwrap();
        let third = emit(&tokens, &mut symbols, Pass::Second, false).unwrap();
        let _ = second_a;
        let fourth = emit(&tokens, &mut symbols, Pass::Second, false).unwrap();
        assert_eq!(third, fourth);
    }

    fn preprocess_for_test(source: &str) -> (Vec<Token>, SymbolTable) {
        preprocessor::preprocess(lexer::lex(source.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn db_on_non_value_token_is_rejected() {
        let (tokens, mut symbols) = preprocess_for_test("_START:\nNOP\n.db NOP\nBRK\n");
        let err = generate(&tokens, &mut symbols, false).unwrap_err();
        assert!(matches!(err, Error::BadByteDefinition { .. }));
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        let (tokens, mut symbols) = preprocess_for_test("_START:\nJMP ghost\nBRK\n");
        let err = generate(&tokens, &mut symbols, false).unwrap_err();
        assert!(matches!(err, Error::UnknownIdentifier { .. }));
    }

    #[test]
    fn unrecognized_shape_is_rejected() {
        let (tokens, mut symbols) = preprocess_for_test("_START:\nLDA A X\nBRK\n");
        let err = generate(&tokens, &mut symbols, false).unwrap_err();
        assert!(matches!(err, Error::UnknownOpcodeShape { .. }));
    }

    #[test]
    fn debug_mode_emits_label_metadata() {
        let (tokens, mut symbols) = preprocess_for_test("_START:\nfoo:\nBRK\n");
        let rom = generate(&tokens, &mut symbols, true).unwrap();
        assert!(rom[16..].windows(6).any(|w| w == b"_START"));
        assert!(rom[16..].windows(3).any(|w| w == b"foo"));
        let start_name = rom.iter().position(|&b| b == b'_').unwrap();
        assert_eq!(rom[start_name - 2], Opcode::DebugMetadataSignal as u8);
        assert_eq!(rom[start_name - 1], DebugMetadataKind::LabelName as u8);
        assert_eq!(rom[start_name + ENTRY_POINT_LABEL.len()], Opcode::DebugMetadataSignal as u8);
        assert_eq!(*rom.last().unwrap(), Opcode::Brk as u8);
    }
}
