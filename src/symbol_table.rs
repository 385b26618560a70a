//! [Symbol] and [SymbolTable]: the keyed store of labels, macros, and
//! defines threaded through the preprocessor and codegen.

use std::collections::HashMap;

use crate::token::{Token, TokenKind};

pub const ENTRY_POINT_LABEL: &str = "_START";

/// The payload carried by a named entry in the symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    /// A label and the address token recording where it resolved (zero
    /// until pass 1 of codegen has walked that far).
    Label(Token),
    /// The interior token sequence of a `.macro` block.
    Macro(Vec<Token>),
    /// The single payload token of a `.define`.
    Define(Token),
}

/// Insertion-ordered, replace-on-reinsert mapping from identifier to
/// [Symbol], plus the counter used to name anonymous labels.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    order: Vec<String>,
    entries: HashMap<String, Symbol>,
    anonlabel_count: u32,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// Insert or replace the symbol stored under `name`. The new payload
    /// wins; if `name` was already present its position in insertion order
    /// is kept rather than moved to the end.
    pub fn add(&mut self, name: impl Into<String>, symbol: Symbol) {
        let name = name.into();
        if !self.entries.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.entries.insert(name, symbol);
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Generate the next deterministic anonymous label name,
    /// `ANON_LABEL_XXXXXXXX` (8 hex digits), and advance the counter.
    pub fn next_anon_label_name(&mut self) -> String {
        let name = format!("ANON_LABEL_{:08X}", self.anonlabel_count);
        self.anonlabel_count += 1;
        name
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.order.iter().map(|name| (name.as_str(), &self.entries[name]))
    }

    /// The resolved ROM entry point: the address of `_START` if it names a
    /// `Label`, else the default entry point.
    pub fn entry_point(&self) -> Option<u16> {
        match self.get(ENTRY_POINT_LABEL) {
            Some(Symbol::Label(token)) => Some(token.value as u16),
            _ => None,
        }
    }

    /// Resolve a `BackwardLabelRef`/`ForwardLabelRef` token to an address,
    /// per spec.md Section 3's "Relative-label search":
    ///
    /// For a `BackwardLabelRef` of count *n* at ROM offset *P*, return the
    /// *n*-th anonymous-label symbol whose address is `< P`, anonymous
    /// labels listed in ROM-address order, ties (equal address) broken by
    /// insertion order. `ForwardLabelRef` is the symmetric case with
    /// address `>= P`.
    pub fn search_relative_label(
        &self,
        token: &Token,
        current_rom_offset: u16,
    ) -> Result<u16, SymbolTableError> {
        let backward = match token.kind {
            TokenKind::BackwardLabelRef => true,
            TokenKind::ForwardLabelRef => false,
            _ => panic!("search_relative_label called on non-relative-label token"),
        };
        let n = token.value;
        debug_assert!(n >= 1);

        let mut candidates: Vec<(usize, u16)> = self
            .order
            .iter()
            .enumerate()
            .filter_map(|(insertion_index, name)| match &self.entries[name] {
                Symbol::Label(addr_token) if name.starts_with("ANON_LABEL") => {
                    Some((insertion_index, addr_token.value as u16))
                }
                _ => None,
            })
            .filter(|(_, addr)| if backward { *addr < current_rom_offset } else { *addr >= current_rom_offset })
            .collect();

        if backward {
            // nearest-first: highest address first, ties broken by later insertion
            candidates.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
        } else {
            // nearest-first: lowest address first, ties broken by later insertion
            candidates.sort_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)));
        }

        candidates
            .get((n - 1) as usize)
            .map(|(_, addr)| *addr)
            .ok_or(SymbolTableError::UnresolvedRelativeLabel { count: n, backward })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolTableError {
    UnresolvedRelativeLabel { count: u32, backward: bool },
}

impl std::fmt::Display for SymbolTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolTableError::UnresolvedRelativeLabel { count, backward } => write!(
                f,
                "unresolved relative label reference: no {} anonymous label {} this point",
                count,
                if *backward { "before" } else { "at or after" }
            ),
        }
    }
}

impl std::error::Error for SymbolTableError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn anon_label(addr: u16) -> Symbol {
        Symbol::Label(Token::address(addr as u32, 0))
    }

    #[test]
    fn replace_on_reinsert_keeps_insertion_position() {
        let mut table = SymbolTable::new();
        table.add("a", anon_label(1));
        table.add("b", anon_label(2));
        table.add("a", anon_label(99));
        let names: Vec<_> = table.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(table.get("a"), Some(&anon_label(99)));
    }

    #[test]
    fn anon_label_names_are_deterministic_and_increasing() {
        let mut table = SymbolTable::new();
        assert_eq!(table.next_anon_label_name(), "ANON_LABEL_00000000");
        assert_eq!(table.next_anon_label_name(), "ANON_LABEL_00000001");
    }

    #[test]
    fn entry_point_defaults_to_none_without_start() {
        let table = SymbolTable::new();
        assert_eq!(table.entry_point(), None);
    }

    #[test]
    fn entry_point_resolves_start_label() {
        let mut table = SymbolTable::new();
        table.add(ENTRY_POINT_LABEL, Symbol::Label(Token::address(0x18, 0)));
        assert_eq!(table.entry_point(), Some(0x18));
    }

    #[test]
    fn search_relative_label_backward() {
        let mut table = SymbolTable::new();
        table.add("ANON_LABEL_00000000", anon_label(0x10));
        table.add("ANON_LABEL_00000001", anon_label(0x14));
        let backward_ref = Token::relative_label_ref(TokenKind::BackwardLabelRef, 1, 0);
        assert_eq!(table.search_relative_label(&backward_ref, 0x18), Ok(0x14));
        let backward_ref_2 = Token::relative_label_ref(TokenKind::BackwardLabelRef, 2, 0);
        assert_eq!(table.search_relative_label(&backward_ref_2, 0x18), Ok(0x10));
    }

    #[test]
    fn search_relative_label_forward() {
        let mut table = SymbolTable::new();
        table.add("ANON_LABEL_00000000", anon_label(0x10));
        table.add("ANON_LABEL_00000001", anon_label(0x20));
        let forward_ref = Token::relative_label_ref(TokenKind::ForwardLabelRef, 1, 0);
        assert_eq!(table.search_relative_label(&forward_ref, 0x18), Ok(0x20));
    }

    #[test]
    fn search_relative_label_fails_past_available_count() {
        let mut table = SymbolTable::new();
        table.add("ANON_LABEL_00000000", anon_label(0x10));
        let backward_ref = Token::relative_label_ref(TokenKind::BackwardLabelRef, 2, 0);
        assert!(table.search_relative_label(&backward_ref, 0x18).is_err());
    }

    #[test]
    fn search_relative_label_ties_break_on_insertion_order() {
        let mut table = SymbolTable::new();
        table.add("ANON_LABEL_00000000", anon_label(0x10));
        table.add("ANON_LABEL_00000001", anon_label(0x10));
        let backward_ref = Token::relative_label_ref(TokenKind::BackwardLabelRef, 1, 0);
        // Tie at the same address: the later insertion wins as "nearest".
        assert_eq!(table.search_relative_label(&backward_ref, 0x18), Ok(0x10));
        let backward_ref_2 = Token::relative_label_ref(TokenKind::BackwardLabelRef, 2, 0);
        assert_eq!(table.search_relative_label(&backward_ref_2, 0x18), Ok(0x10));
    }
}
