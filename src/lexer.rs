//! Converts raw source bytes into a sequence of [Token]s.
//!
//! The source language has no block comments, no signed numeric literals,
//! and no numeric base beyond hex (`0x`) and decimal (`0d`) — see spec.md
//! Section 4.1 for the full scanning contract.

use crate::symbol_table::ENTRY_POINT_LABEL;
use crate::token::{Token, TokenKind};

const KEYWORDS: &[&str] = &[
    "PANIC", "BRK", "NOP", "CLC", "SEC", "RET",
    "LDA", "LDX", "LDY", "LEA", "LEX", "LEY",
    "STA", "STX", "STY", "JMP", "JSR", "CMP",
    "BCS", "BCC", "BEQ", "BNE", "BMI", "BPL", "BVS", "BVC",
    "ADD", "SUB", "INC", "DEC", "PUSH", "POP",
    "SYSCALL", "STRIDE",
    ".db", ".dw", ".dd", ".macro", ".endmacro", ".repeat", ".endrepeat", ".define",
];

const REGISTERS: &[&str] = &["A", "X", "Y", "PC", "SC"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    NumTooLarge { word: String, line: usize },
    AddrTooLarge { word: String, line: usize },
    MixedOperatorsInRelativeLabel { word: String, line: usize },
    EntryPointNotDefined,
    MultipleEntryPoints,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NumTooLarge { word, line } => {
                write!(f, "line {line}: numeric literal \"{word}\" does not fit in 32 bits")
            }
            Error::AddrTooLarge { word, line } => {
                write!(f, "line {line}: address literal \"{word}\" does not fit in 16 bits")
            }
            Error::MixedOperatorsInRelativeLabel { word, line } => write!(
                f,
                "line {line}: relative label reference \"{word}\" mixes '+' and '-'"
            ),
            Error::EntryPointNotDefined => write!(f, "no {ENTRY_POINT_LABEL} label defined"),
            Error::MultipleEntryPoints => write!(f, "{ENTRY_POINT_LABEL} defined more than once"),
        }
    }
}

impl std::error::Error for Error {}

/// Lex `input` into a token sequence ending in `LineFinish`, `EndOfFile`.
pub fn lex(input: &[u8]) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut line = 1usize;
    let mut i = 0usize;
    let mut in_string: Option<(u8, usize)> = None; // (quote char, start line)

    while i < input.len() {
        let b = input[i];

        if let Some((quote, _start_line)) = in_string {
            if b == quote {
                if quote == b'"' {
                    tokens.push(Token::literal(0, line));
                }
                in_string = None;
                i += 1;
                continue;
            }
            if b == b'\\' && i + 1 < input.len() {
                if let Some(decoded) = decode_escape(input[i + 1]) {
                    tokens.push(Token::literal(decoded as u32, line));
                }
                i += 2;
                continue;
            }
            if b == b'\n' {
                line += 1;
            }
            tokens.push(Token::literal(b as u32, line));
            i += 1;
            continue;
        }

        match b {
            b'"' | b'\'' => {
                in_string = Some((b, line));
                i += 1;
            }
            b';' => {
                while i < input.len() && input[i] != b'\n' {
                    i += 1;
                }
            }
            b'\n' => {
                if tokens.last().map(|t| t.kind) != Some(TokenKind::LineFinish) && !tokens.is_empty() {
                    tokens.push(Token::line_finish(line));
                }
                line += 1;
                i += 1;
            }
            _ if is_source_whitespace(b) => {
                i += 1;
            }
            _ => {
                let start = i;
                while i < input.len()
                    && !is_source_whitespace(input[i])
                    && !matches!(input[i], b';' | b'\n' | b'"' | b'\'')
                {
                    i += 1;
                }
                let word = std::str::from_utf8(&input[start..i]).unwrap_or("");
                tokens.push(classify_word(word, line)?);
            }
        }
    }

    if tokens.last().map(|t| t.kind) != Some(TokenKind::LineFinish) && !tokens.is_empty() {
        tokens.push(Token::line_finish(line));
    }
    tokens.push(Token::end_of_file(line));

    let start_count = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Label && t.identifier.as_deref() == Some(ENTRY_POINT_LABEL))
        .count();
    if start_count == 0 {
        return Err(Error::EntryPointNotDefined);
    }
    if start_count > 1 {
        return Err(Error::MultipleEntryPoints);
    }

    Ok(tokens)
}

fn is_source_whitespace(b: u8) -> bool {
    b == 0 || b.is_ascii_whitespace()
}

fn decode_escape(b: u8) -> Option<u8> {
    match b {
        b'0' => Some(0x00),
        b'n' => Some(0x0A),
        b't' => Some(0x09),
        b'\\' => Some(0x5C),
        b'"' => Some(0x22),
        b'\'' => Some(0x27),
        _ => None,
    }
}

fn classify_word(word: &str, line: usize) -> Result<Token, Error> {
    if is_numeric_word(word) {
        return parse_numeric(word, line);
    }
    if word.starts_with('@') && word.ends_with(':') {
        return Ok(Token::anon_label(line));
    }
    if word.ends_with(':') {
        let name = &word[..word.len() - 1];
        return Ok(Token::label(name, line));
    }
    if let Some(rest) = word.strip_prefix('@') {
        if !rest.is_empty() && rest.chars().all(|c| c == '+') {
            return Ok(Token::relative_label_ref(TokenKind::ForwardLabelRef, rest.len() as u32, line));
        }
        if !rest.is_empty() && rest.chars().all(|c| c == '-') {
            return Ok(Token::relative_label_ref(TokenKind::BackwardLabelRef, rest.len() as u32, line));
        }
        if !rest.is_empty() {
            return Err(Error::MixedOperatorsInRelativeLabel { word: word.to_string(), line });
        }
    }
    if KEYWORDS.contains(&word) {
        return Ok(Token::keyword(word, line));
    }
    if REGISTERS.contains(&word) {
        return Ok(Token::register(word, line));
    }
    Ok(Token::identifier(word, line))
}

fn is_numeric_word(word: &str) -> bool {
    let rest = word.strip_prefix('$').unwrap_or(word);
    rest.starts_with("0x") || rest.starts_with("0d")
}

fn parse_numeric(word: &str, line: usize) -> Result<Token, Error> {
    let is_addr = word.starts_with('$');
    let rest = word.strip_prefix('$').unwrap_or(word);
    let (radix, digits) = if let Some(hex) = rest.strip_prefix("0x") {
        (16, hex)
    } else {
        (10, rest.strip_prefix("0d").unwrap_or(rest))
    };

    let value = u64::from_str_radix(digits, radix).unwrap_or(u64::MAX);

    if is_addr {
        if value > 0xFFFF {
            return Err(Error::AddrTooLarge { word: word.to_string(), line });
        }
        Ok(Token::address(value as u32, line))
    } else {
        if value > u32::MAX as u64 {
            return Err(Error::NumTooLarge { word: word.to_string(), line });
        }
        Ok(Token::literal(value as u32, line))
    }
}
