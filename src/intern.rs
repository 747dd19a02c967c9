//! Lexeme interning. Every token stores a `Symbol`; comparing two lexemes
//! is an integer compare. A string is classified once, the moment it first
//! enters the table, so asking "is this token a keyword" later never
//! touches the keyword list again.

use std::collections::HashMap;

/// C and C++ keywords recognized by the tokenizer. The set is closed: a
/// keyword token's lexeme is always drawn from this table.
pub const KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "do", "switch", "case", "default", "break",
    "continue", "return", "goto", "sizeof", "typedef", "struct", "union",
    "enum", "class", "namespace", "template", "typename", "public",
    "protected", "private", "virtual", "operator", "new", "delete", "const",
    "static", "extern", "register", "volatile", "inline", "friend", "using",
    "try", "catch", "throw", "this", "mutable", "explicit",
];

/// Built-in and standard type names. These lex as type tokens, and the
/// platform table knows their widths.
pub const STANDARD_TYPES: &[&str] = &[
    "void", "bool", "char", "short", "int", "long", "float", "double",
    "unsigned", "signed", "wchar_t", "size_t",
];

/// Index into an `Interner`'s table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Symbol(u32);

impl Symbol {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum WordClass {
    Plain,
    Keyword,
    StandardType,
}

fn classify(s: &str) -> WordClass {
    if KEYWORDS.contains(&s) {
        WordClass::Keyword
    } else if STANDARD_TYPES.contains(&s) {
        WordClass::StandardType
    } else {
        WordClass::Plain
    }
}

/// String table with one entry per distinct lexeme. Each entry carries its
/// word class alongside the text.
#[derive(Debug)]
pub struct Interner {
    ids: HashMap<String, u32>,
    strings: Vec<String>,
    classes: Vec<WordClass>,
}

impl Interner {
    pub fn new() -> Self {
        Interner {
            ids: HashMap::new(),
            strings: Vec::new(),
            classes: Vec::new(),
        }
    }

    /// Symbol for `s`, creating and classifying the entry on first sight.
    pub fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&id) = self.ids.get(s) {
            return Symbol(id);
        }
        let id = self.strings.len() as u32;
        self.ids.insert(s.to_string(), id);
        self.strings.push(s.to_string());
        self.classes.push(classify(s));
        Symbol(id)
    }

    /// Text behind a symbol. A symbol that was minted by a different
    /// interner resolves to "" instead of panicking.
    pub fn resolve(&self, sym: Symbol) -> &str {
        self.strings
            .get(sym.index())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Symbol of an already-interned string, without growing the table.
    /// Probing for a lexeme that never occurred in the source is the
    /// pattern matcher's common fast path, and it must stay allocation-free.
    pub fn find(&self, s: &str) -> Option<Symbol> {
        self.ids.get(s).copied().map(Symbol)
    }

    pub fn is_keyword(&self, sym: Symbol) -> bool {
        self.classes.get(sym.index()) == Some(&WordClass::Keyword)
    }

    pub fn is_standard_type(&self, sym: Symbol) -> bool {
        self.classes.get(sym.index()) == Some(&WordClass::StandardType)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_string_yields_same_symbol() {
        let mut interner = Interner::new();
        let s1 = interner.intern("pointer");
        let s2 = interner.intern("pointer");
        assert_eq!(s1, s2);
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn different_strings_yield_different_symbols() {
        let mut interner = Interner::new();
        let s1 = interner.intern("alpha");
        let s2 = interner.intern("beta");
        assert_ne!(s1, s2);
    }

    #[test]
    fn resolve_returns_the_original_text() {
        let mut interner = Interner::new();
        let sym = interner.intern("buf");
        assert_eq!(interner.resolve(sym), "buf");
    }

    #[test]
    fn foreign_symbol_resolves_to_empty() {
        let interner = Interner::new();
        assert_eq!(interner.resolve(Symbol(7)), "");
        assert!(!interner.is_keyword(Symbol(7)));
    }

    #[test]
    fn keywords_classify_on_first_intern() {
        let mut interner = Interner::new();
        let sym = interner.intern("while");
        assert!(interner.is_keyword(sym));
        assert!(!interner.is_standard_type(sym));
    }

    #[test]
    fn standard_types_classify_on_first_intern() {
        let mut interner = Interner::new();
        let sym = interner.intern("int");
        assert!(interner.is_standard_type(sym));
        assert!(!interner.is_keyword(sym));
    }

    #[test]
    fn identifiers_are_plain() {
        let mut interner = Interner::new();
        let sym = interner.intern("my_variable");
        assert!(!interner.is_keyword(sym));
        assert!(!interner.is_standard_type(sym));
    }

    #[test]
    fn classification_survives_reinterning() {
        let mut interner = Interner::new();
        let first = interner.intern("return");
        let again = interner.intern("return");
        assert_eq!(first, again);
        assert!(interner.is_keyword(again));
    }

    #[test]
    fn find_never_creates_entries() {
        let mut interner = Interner::new();
        interner.intern("present");
        let before = interner.len();
        assert!(interner.find("present").is_some());
        assert!(interner.find("absent").is_none());
        assert_eq!(interner.len(), before);
    }

    #[test]
    fn find_agrees_with_intern() {
        let mut interner = Interner::new();
        let sym = interner.intern("agree");
        assert_eq!(interner.find("agree"), Some(sym));
    }

    #[test]
    fn empty_table_reports_empty() {
        let mut interner = Interner::new();
        assert!(interner.is_empty());
        interner.intern("x");
        assert!(!interner.is_empty());
    }

    #[test]
    fn symbol_index_matches_insertion_order() {
        let mut interner = Interner::new();
        let a = interner.intern("first");
        let b = interner.intern("second");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
    }
}
