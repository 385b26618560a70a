//! Strips `.macro`/`.define` blocks into the symbol table and expands
//! `.repeat` blocks, macro calls, and define references in place.
//!
//! Run as two passes over the lexed token stream (see spec.md Section 4.2):
//! `strip` first, so forward references to labels/macros/defines both work
//! once `expand` runs.

use std::collections::VecDeque;

use crate::symbol_table::{Symbol, SymbolTable, ENTRY_POINT_LABEL};
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    BadMacro { line: usize },
    NamelessMacro { line: usize },
    BadName { name: String, line: usize },
    MissingMacroContents { line: usize },
    BadDefine { line: usize },
    NamelessDefine { line: usize },
    EmptyRepeatContents { line: usize },
    MissingRepeatLiteralParameter { line: usize },
    MissingNewlineAtRepeat { line: usize },
    UnterminatedRepeat { line: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::BadMacro { line } => write!(f, "line {line}: malformed or nested .macro block"),
            Error::NamelessMacro { line } => write!(f, "line {line}: .macro is missing a name"),
            Error::BadName { name, line } => write!(f, "line {line}: \"{name}\" is not a valid macro/define name"),
            Error::MissingMacroContents { line } => write!(f, "line {line}: .macro body is empty"),
            Error::BadDefine { line } => write!(f, "line {line}: .define is missing its payload token"),
            Error::NamelessDefine { line } => write!(f, "line {line}: .define is missing a name"),
            Error::EmptyRepeatContents { line } => write!(f, "line {line}: .repeat body is empty"),
            Error::MissingRepeatLiteralParameter { line } => {
                write!(f, "line {line}: .repeat is missing its literal repeat count")
            }
            Error::MissingNewlineAtRepeat { line } => {
                write!(f, "line {line}: .repeat's count must be followed by a newline")
            }
            Error::UnterminatedRepeat { line } => write!(f, "line {line}: .repeat has no matching .endrepeat"),
        }
    }
}

impl std::error::Error for Error {}

/// Run both preprocessor passes, returning the fully expanded token stream
/// and the symbol table populated with labels (as zero-valued placeholders),
/// macros, and defines.
pub fn preprocess(tokens: Vec<Token>) -> Result<(Vec<Token>, SymbolTable), Error> {
    let mut symbols = SymbolTable::new();
    let stripped = strip(tokens, &mut symbols)?;
    let repeats_expanded = expand_repeats(stripped)?;
    let expanded = expand_identifiers(repeats_expanded, &symbols);
    Ok((expanded, symbols))
}

fn strip(tokens: Vec<Token>, symbols: &mut SymbolTable) -> Result<Vec<Token>, Error> {
    let mut output = Vec::new();
    let mut i = 0usize;

    while i < tokens.len() {
        let tok = &tokens[i];

        if tok.kind == TokenKind::Label {
            symbols.add(tok.identifier_str(), Symbol::Label(Token::address(0, tok.line)));
            output.push(tok.clone());
            i += 1;
            continue;
        }

        if tok.kind == TokenKind::Keyword && tok.identifier_str() == ".macro" {
            let line = tok.line;
            i += 1;
            let name_tok = tokens.get(i).ok_or(Error::NamelessMacro { line })?;
            if name_tok.kind != TokenKind::Identifier {
                return Err(Error::NamelessMacro { line });
            }
            let name = name_tok.identifier_str().to_string();
            if name == ENTRY_POINT_LABEL {
                return Err(Error::BadName { name, line });
            }
            i += 1;
            match tokens.get(i) {
                Some(t) if t.kind == TokenKind::LineFinish => i += 1,
                _ => return Err(Error::BadMacro { line }),
            }

            let body_start = i;
            loop {
                let t = tokens.get(i).ok_or(Error::BadMacro { line })?;
                if t.kind == TokenKind::Keyword && t.identifier_str() == ".macro" {
                    return Err(Error::BadMacro { line: t.line });
                }
                if t.kind == TokenKind::Keyword && t.identifier_str() == ".endmacro" {
                    break;
                }
                i += 1;
            }
            let body = tokens[body_start..i].to_vec();
            if body.is_empty() {
                return Err(Error::MissingMacroContents { line });
            }
            i += 1; // consume .endmacro
            if tokens.get(i).map(|t| t.kind) == Some(TokenKind::LineFinish) {
                i += 1;
            }
            symbols.add(name, Symbol::Macro(body));
            continue;
        }

        if tok.kind == TokenKind::Keyword && tok.identifier_str() == ".define" {
            let line = tok.line;
            i += 1;
            let name_tok = tokens.get(i).ok_or(Error::NamelessDefine { line })?;
            if name_tok.kind != TokenKind::Identifier {
                return Err(Error::NamelessDefine { line });
            }
            let name = name_tok.identifier_str().to_string();
            if name == ENTRY_POINT_LABEL {
                return Err(Error::BadName { name, line });
            }
            i += 1;
            let payload = match tokens.get(i) {
                Some(t) if t.kind != TokenKind::LineFinish && t.kind != TokenKind::EndOfFile => t.clone(),
                _ => return Err(Error::BadDefine { line }),
            };
            i += 1;
            while tokens.get(i).map(|t| t.kind) != Some(TokenKind::LineFinish)
                && tokens.get(i).map(|t| t.kind) != Some(TokenKind::EndOfFile)
            {
                i += 1;
            }
            if tokens.get(i).map(|t| t.kind) == Some(TokenKind::LineFinish) {
                i += 1;
            }
            symbols.add(name, Symbol::Define(payload));
            continue;
        }

        output.push(tok.clone());
        i += 1;
    }

    Ok(output)
}

fn expand_repeats(tokens: Vec<Token>) -> Result<Vec<Token>, Error> {
    let mut output = Vec::new();
    let mut i = 0usize;

    while i < tokens.len() {
        let tok = &tokens[i];

        if tok.kind == TokenKind::Keyword && tok.identifier_str() == ".repeat" {
            let line = tok.line;
            i += 1;
            let n_tok = tokens.get(i).ok_or(Error::MissingRepeatLiteralParameter { line })?;
            if n_tok.kind != TokenKind::Literal {
                return Err(Error::MissingRepeatLiteralParameter { line });
            }
            let n = n_tok.value;
            i += 1;
            match tokens.get(i) {
                Some(t) if t.kind == TokenKind::LineFinish => i += 1,
                _ => return Err(Error::MissingNewlineAtRepeat { line }),
            }

            let body_start = i;
            let mut depth = 1usize;
            loop {
                let t = tokens.get(i).ok_or(Error::UnterminatedRepeat { line })?;
                if t.kind == TokenKind::Keyword && t.identifier_str() == ".repeat" {
                    depth += 1;
                } else if t.kind == TokenKind::Keyword && t.identifier_str() == ".endrepeat" {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                i += 1;
            }
            let body = &tokens[body_start..i];
            if body.is_empty() {
                return Err(Error::EmptyRepeatContents { line });
            }
            for _ in 0..n {
                output.extend(body.iter().cloned());
            }
            i += 1; // consume .endrepeat
            if tokens.get(i).map(|t| t.kind) == Some(TokenKind::LineFinish) {
                i += 1;
            }
            continue;
        }

        output.push(tok.clone());
        i += 1;
    }

    Ok(output)
}

fn expand_identifiers(tokens: Vec<Token>, symbols: &SymbolTable) -> Vec<Token> {
    let mut queue: VecDeque<Token> = tokens.into();
    let mut output = Vec::new();

    while let Some(tok) = queue.pop_front() {
        if tok.kind == TokenKind::Identifier {
            match symbols.get(tok.identifier_str()) {
                Some(Symbol::Macro(body)) => {
                    let next_kind = queue.front().map(|t| t.kind);
                    for t in body.iter().rev() {
                        queue.push_front(t.clone());
                    }
                    if body.last().map(|t| t.kind) == Some(TokenKind::LineFinish)
                        && next_kind == Some(TokenKind::LineFinish)
                    {
                        queue.remove(body.len());
                    }
                    continue;
                }
                Some(Symbol::Define(payload)) => {
                    output.push(payload.clone());
                    continue;
                }
                _ => {}
            }
        }
        output.push(tok);
    }

    output
}
