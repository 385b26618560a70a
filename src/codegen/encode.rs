//! Per-mnemonic shape dispatch: token-line buffer -> (opcode, operand bytes).
//!
//! One function per mnemonic family, mirroring how the line buffer actually
//! reads: first token names the operation, the rest describe its operand
//! shape. Unrecognized shapes fall through to `UnknownOpcodeShape`.

use crate::codegen::{EncodeCtx, Error};
use crate::spec::Opcode;
use crate::token::{Token, TokenKind};

fn le(value: u32, width: usize) -> Vec<u8> {
    value.to_le_bytes()[..width].to_vec()
}

/// Resolve any token standing in an `ADDR` slot: a literal `$addr`, a plain
/// label identifier, or a relative label reference.
fn resolve_addr(tok: &Token, ctx: &EncodeCtx) -> Result<u16, Error> {
    use crate::symbol_table::Symbol;
    match tok.kind {
        TokenKind::Address => Ok(tok.value as u16),
        TokenKind::Identifier => match ctx.symbols.get(tok.identifier_str()) {
            Some(Symbol::Label(addr)) => Ok(addr.value as u16),
            Some(Symbol::Macro(_)) => {
                Err(Error::UnexpandedMacro { name: tok.identifier_str().to_string(), line: tok.line })
            }
            Some(Symbol::Define(_)) => {
                Err(Error::UnexpandedDefine { name: tok.identifier_str().to_string(), line: tok.line })
            }
            None => Err(Error::UnknownIdentifier { name: tok.identifier_str().to_string(), line: tok.line }),
        },
        TokenKind::BackwardLabelRef | TokenKind::ForwardLabelRef => match ctx.pass {
            super::Pass::First => Ok(0),
            super::Pass::Second => ctx
                .symbols
                .search_relative_label(tok, ctx.offset)
                .map_err(|e| Error::UnresolvedRelativeLabel { line: tok.line, source: e }),
        },
        _ => Err(Error::UnknownOpcodeShape { mnemonic: String::new(), line: tok.line }),
    }
}

fn is_addr_like(tok: &Token) -> bool {
    matches!(
        tok.kind,
        TokenKind::Address | TokenKind::Identifier | TokenKind::BackwardLabelRef | TokenKind::ForwardLabelRef
    )
}

fn reg(tok: &Token) -> Option<&str> {
    tok.is(TokenKind::Register).then(|| tok.identifier_str())
}

fn shape_err(mnemonic: &str, line: usize) -> Error {
    Error::UnknownOpcodeShape { mnemonic: mnemonic.to_string(), line }
}

/// Dispatch one buffered instruction line (mnemonic token plus its operand
/// tokens) to the matching opcode and operand bytes.
pub fn encode_line(line: &[Token], ctx: &EncodeCtx) -> Result<(Opcode, Vec<u8>), Error> {
    let head = &line[0];
    if !head.is(TokenKind::Keyword) {
        return Err(shape_err(head.identifier_str(), head.line));
    }
    let mnemonic = head.identifier_str();
    let args = &line[1..];
    let line_no = head.line;

    match mnemonic {
        "PANIC" if args.is_empty() => Ok((Opcode::Panic, vec![])),
        "SYSCALL" if args.is_empty() => Ok((Opcode::Systemcall, vec![])),
        "BRK" if args.is_empty() => Ok((Opcode::Brk, vec![])),
        "NOP" if args.is_empty() => Ok((Opcode::Nop, vec![])),
        "CLC" if args.is_empty() => Ok((Opcode::Clc, vec![])),
        "SEC" if args.is_empty() => Ok((Opcode::Sec, vec![])),
        "RET" if args.is_empty() => Ok((Opcode::Ret, vec![])),

        "STRIDE" => match args {
            [t] if t.is(TokenKind::Literal) => Ok((Opcode::StrideLit, vec![(t.value & 0xFF) as u8])),
            _ => Err(shape_err(mnemonic, line_no)),
        },

        "LDA" => match args {
            [t] if t.is(TokenKind::Literal) => Ok((Opcode::LdaLit, le(t.value, 4))),
            [t] if reg(t) == Some("X") => Ok((Opcode::LdaX, vec![])),
            [t] if reg(t) == Some("Y") => Ok((Opcode::LdaY, vec![])),
            [t] if is_addr_like(t) => Ok((Opcode::LdaAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            [t, r] if is_addr_like(t) && reg(r) == Some("X") => {
                Ok((Opcode::LdaAddrX, le(resolve_addr(t, ctx)? as u32, 2)))
            }
            [t, r] if is_addr_like(t) && reg(r) == Some("Y") => {
                Ok((Opcode::LdaAddrY, le(resolve_addr(t, ctx)? as u32, 2)))
            }
            _ => Err(shape_err(mnemonic, line_no)),
        },
        "LDX" => match args {
            [t] if t.is(TokenKind::Literal) => Ok((Opcode::LdxLit, le(t.value, 4))),
            [t] if reg(t) == Some("A") => Ok((Opcode::LdxA, vec![])),
            [t] if reg(t) == Some("Y") => Ok((Opcode::LdxY, vec![])),
            [t] if is_addr_like(t) => Ok((Opcode::LdxAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },
        "LDY" => match args {
            [t] if t.is(TokenKind::Literal) => Ok((Opcode::LdyLit, le(t.value, 4))),
            [t] if reg(t) == Some("A") => Ok((Opcode::LdyA, vec![])),
            [t] if reg(t) == Some("X") => Ok((Opcode::LdyX, vec![])),
            [t] if is_addr_like(t) => Ok((Opcode::LdyAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },

        "LEA" => match args {
            [t] if is_addr_like(t) => Ok((Opcode::LeaAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },
        "LEX" => match args {
            [t] if is_addr_like(t) => Ok((Opcode::LexAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },
        "LEY" => match args {
            [t] if is_addr_like(t) => Ok((Opcode::LeyAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },

        "STA" => match args {
            [t] if is_addr_like(t) => Ok((Opcode::StaAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },
        "STX" => match args {
            [t] if is_addr_like(t) => Ok((Opcode::StxAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },
        "STY" => match args {
            [t] if is_addr_like(t) => Ok((Opcode::StyAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },

        "JMP" => match args {
            [t] if is_addr_like(t) => Ok((Opcode::JmpAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },
        "JSR" => match args {
            [t] if is_addr_like(t) => Ok((Opcode::JsrAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },

        "CMP" => match args {
            [r1, t] if reg(r1) == Some("A") && reg(t) == Some("X") => Ok((Opcode::CmpAX, vec![])),
            [r1, t] if reg(r1) == Some("A") && reg(t) == Some("Y") => Ok((Opcode::CmpAY, vec![])),
            [r1, t] if reg(r1) == Some("A") && t.is(TokenKind::Literal) => Ok((Opcode::CmpALit, le(t.value, 4))),
            [r1, t] if reg(r1) == Some("A") && is_addr_like(t) => {
                Ok((Opcode::CmpAAddr, le(resolve_addr(t, ctx)? as u32, 2)))
            }
            [r1, t] if reg(r1) == Some("X") && reg(t) == Some("A") => Ok((Opcode::CmpXA, vec![])),
            [r1, t] if reg(r1) == Some("X") && reg(t) == Some("Y") => Ok((Opcode::CmpXY, vec![])),
            [r1, t] if reg(r1) == Some("X") && t.is(TokenKind::Literal) => Ok((Opcode::CmpXLit, le(t.value, 4))),
            [r1, t] if reg(r1) == Some("X") && is_addr_like(t) => {
                Ok((Opcode::CmpXAddr, le(resolve_addr(t, ctx)? as u32, 2)))
            }
            [r1, t] if reg(r1) == Some("Y") && reg(t) == Some("A") => Ok((Opcode::CmpYA, vec![])),
            [r1, t] if reg(r1) == Some("Y") && reg(t) == Some("X") => Ok((Opcode::CmpYX, vec![])),
            [r1, t] if reg(r1) == Some("Y") && t.is(TokenKind::Literal) => Ok((Opcode::CmpYLit, le(t.value, 4))),
            [r1, t] if reg(r1) == Some("Y") && is_addr_like(t) => {
                Ok((Opcode::CmpYAddr, le(resolve_addr(t, ctx)? as u32, 2)))
            }
            _ => Err(shape_err(mnemonic, line_no)),
        },

        "BCS" => branch(Opcode::BcsAddr, args, ctx, mnemonic, line_no),
        "BCC" => branch(Opcode::BccAddr, args, ctx, mnemonic, line_no),
        "BEQ" => branch(Opcode::BeqAddr, args, ctx, mnemonic, line_no),
        "BNE" => branch(Opcode::BneAddr, args, ctx, mnemonic, line_no),
        "BMI" => branch(Opcode::BmiAddr, args, ctx, mnemonic, line_no),
        "BPL" => branch(Opcode::BplAddr, args, ctx, mnemonic, line_no),
        "BVS" => branch(Opcode::BvsAddr, args, ctx, mnemonic, line_no),
        "BVC" => branch(Opcode::BvcAddr, args, ctx, mnemonic, line_no),

        "ADD" => match args {
            [t] if t.is(TokenKind::Literal) => Ok((Opcode::AddLit, le(t.value, 4))),
            [t] if reg(t) == Some("X") => Ok((Opcode::AddX, vec![])),
            [t] if reg(t) == Some("Y") => Ok((Opcode::AddY, vec![])),
            [t] if is_addr_like(t) => Ok((Opcode::AddAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },
        "SUB" => match args {
            [t] if t.is(TokenKind::Literal) => Ok((Opcode::SubLit, le(t.value, 4))),
            [t] if reg(t) == Some("X") => Ok((Opcode::SubX, vec![])),
            [t] if reg(t) == Some("Y") => Ok((Opcode::SubY, vec![])),
            [t] if is_addr_like(t) => Ok((Opcode::SubAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },

        "INC" => match args {
            [t] if reg(t) == Some("A") => Ok((Opcode::IncA, vec![])),
            [t] if reg(t) == Some("X") => Ok((Opcode::IncX, vec![])),
            [t] if reg(t) == Some("Y") => Ok((Opcode::IncY, vec![])),
            [t] if is_addr_like(t) => Ok((Opcode::IncAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },
        "DEC" => match args {
            [t] if reg(t) == Some("A") => Ok((Opcode::DecA, vec![])),
            [t] if reg(t) == Some("X") => Ok((Opcode::DecX, vec![])),
            [t] if reg(t) == Some("Y") => Ok((Opcode::DecY, vec![])),
            [t] if is_addr_like(t) => Ok((Opcode::DecAddr, le(resolve_addr(t, ctx)? as u32, 2))),
            _ => Err(shape_err(mnemonic, line_no)),
        },

        "PUSH" => match args {
            [t] if reg(t) == Some("A") => Ok((Opcode::PushA, vec![])),
            [t] if reg(t) == Some("X") => Ok((Opcode::PushX, vec![])),
            [t] if reg(t) == Some("Y") => Ok((Opcode::PushY, vec![])),
            _ => Err(shape_err(mnemonic, line_no)),
        },
        "POP" => match args {
            [t] if reg(t) == Some("A") => Ok((Opcode::PopA, vec![])),
            [t] if reg(t) == Some("X") => Ok((Opcode::PopX, vec![])),
            [t] if reg(t) == Some("Y") => Ok((Opcode::PopY, vec![])),
            _ => Err(shape_err(mnemonic, line_no)),
        },

        _ => Err(shape_err(mnemonic, line_no)),
    }
}

fn branch(op: Opcode, args: &[Token], ctx: &EncodeCtx, mnemonic: &str, line: usize) -> Result<(Opcode, Vec<u8>), Error> {
    match args {
        [t] if is_addr_like(t) => Ok((op, le(resolve_addr(t, ctx)? as u32, 2))),
        _ => Err(shape_err(mnemonic, line)),
    }
}
