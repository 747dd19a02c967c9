//! Token-stream pattern matching.
//!
//! Checkers never write raw traversal loops; they describe the shape they
//! are looking for in a space-separated mini-language and ask a compiled
//! `Pattern` whether the stream matches at a cursor:
//!
//! * `foo`      - token is exactly `foo`
//! * `%any%`    - any single token
//! * `%var%`    - any identifier
//! * `%num%`    - numeric literal
//! * `%str%`    - string literal
//! * `%type%`   - built-in or standard type name
//! * `%or%`     - the `|` operator itself
//! * `a|b`      - one of the alternatives (also `[ab|cd]`, `[;{}]`)
//! * `!!foo`    - any token except `foo`
//!
//! A pattern is parsed once at construction; matching is a single forward
//! scan, O(pattern length), with no backtracking.

use crate::token::{TokenId, TokenKind, TokenList};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Alternatives(Vec<String>),
    Any,
    Var,
    Num,
    Str,
    Type,
    Not(String),
}

#[derive(Debug, Clone)]
pub struct Pattern {
    parts: Vec<Part>,
}

/// Operator lexemes that contain `|` and must not be split on it.
fn is_pipe_operator(word: &str) -> bool {
    matches!(word, "|" | "||" | "|=")
}

impl Pattern {
    pub fn new(text: &str) -> Self {
        let mut parts = Vec::new();
        for word in text.split_whitespace() {
            parts.push(Self::parse_word(word));
        }
        Pattern { parts }
    }

    fn parse_word(word: &str) -> Part {
        match word {
            "%any%" => return Part::Any,
            "%var%" => return Part::Var,
            "%num%" => return Part::Num,
            "%str%" => return Part::Str,
            "%type%" => return Part::Type,
            // the only way to say a literal `|`, since a bare pipe would
            // read as an alternatives separator
            "%or%" => return Part::Literal("|".to_string()),
            _ => {}
        }
        if let Some(rest) = word.strip_prefix("!!") {
            return Part::Not(rest.to_string());
        }
        if word.len() > 2 && word.starts_with('[') && word.ends_with(']') {
            let inner = &word[1..word.len() - 1];
            let alts: Vec<String> = if inner.contains('|') {
                inner.split('|').map(|s| s.to_string()).collect()
            } else {
                inner.chars().map(|c| c.to_string()).collect()
            };
            return Part::Alternatives(alts);
        }
        if word.contains('|') && !is_pipe_operator(word) {
            let alts: Vec<String> = word.split('|').map(|s| s.to_string()).collect();
            return Part::Alternatives(alts);
        }
        Part::Literal(word.to_string())
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Match the pattern against the stream starting at `cursor`. Returns
    /// the number of tokens matched (the pattern length) or 0.
    pub fn match_at(&self, list: &TokenList, cursor: TokenId) -> usize {
        let mut cur = Some(cursor);
        for part in &self.parts {
            let id = match cur {
                Some(id) => id,
                None => return 0,
            };
            let ok = match part {
                Part::Literal(s) => list.is_str(id, s),
                Part::Alternatives(alts) => alts.iter().any(|a| list.is_str(id, a)),
                Part::Any => true,
                Part::Var => list.kind(id) == TokenKind::Name,
                Part::Num => list.kind(id) == TokenKind::Number,
                Part::Str => list.kind(id) == TokenKind::StringLiteral,
                Part::Type => list.kind(id) == TokenKind::Type,
                Part::Not(s) => !list.is_str(id, s),
            };
            if !ok {
                return 0;
            }
            cur = list.next(id);
        }
        self.parts.len()
    }

    pub fn matches(&self, list: &TokenList, cursor: TokenId) -> bool {
        self.match_at(list, cursor) > 0
    }
}

/// One-shot match for cold paths and tests; hot paths hold a `Pattern`.
pub fn simple_match(list: &TokenList, cursor: TokenId, pattern: &str) -> bool {
    Pattern::new(pattern).matches(list, cursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn build(tokens: &[(&str, TokenKind)]) -> TokenList {
        let mut list = TokenList::new();
        list.add_file("test.c");
        for (s, kind) in tokens {
            list.push_str_back(s, *kind, 0, 1);
        }
        list
    }

    #[test]
    fn literal_word_matches_exactly() {
        let list = build(&[("free", TokenKind::Name), ("(", TokenKind::Operator)]);
        let front = list.front().unwrap();
        assert_eq!(Pattern::new("free (").match_at(&list, front), 2);
        assert_eq!(Pattern::new("malloc (").match_at(&list, front), 0);
    }

    #[test]
    fn any_matches_every_token() {
        let list = build(&[("x", TokenKind::Name), (";", TokenKind::Operator)]);
        let front = list.front().unwrap();
        assert_eq!(Pattern::new("%any% %any%").match_at(&list, front), 2);
    }

    #[test]
    fn var_matches_identifier_only() {
        let list = build(&[("count", TokenKind::Name)]);
        let front = list.front().unwrap();
        assert!(Pattern::new("%var%").matches(&list, front));

        let list = build(&[("42", TokenKind::Number)]);
        let front = list.front().unwrap();
        assert!(!Pattern::new("%var%").matches(&list, front));
    }

    #[test]
    fn num_and_str_match_literals() {
        let list = build(&[("10", TokenKind::Number), ("\"hi\"", TokenKind::StringLiteral)]);
        let front = list.front().unwrap();
        assert_eq!(Pattern::new("%num% %str%").match_at(&list, front), 2);
    }

    #[test]
    fn type_matches_type_kind() {
        let list = build(&[("int", TokenKind::Type), ("x", TokenKind::Name)]);
        let front = list.front().unwrap();
        assert_eq!(Pattern::new("%type% %var%").match_at(&list, front), 2);
        assert!(!Pattern::new("%type%").matches(&list, list.back().unwrap()));
    }

    #[test]
    fn alternatives_match_any_member() {
        let list = build(&[(";", TokenKind::Operator)]);
        let front = list.front().unwrap();
        assert!(Pattern::new(";|{").matches(&list, front));
        assert!(Pattern::new("[;{}]").matches(&list, front));
        assert!(!Pattern::new("(|)").matches(&list, front));
    }

    #[test]
    fn bracketed_word_alternatives() {
        let list = build(&[("ab", TokenKind::Name)]);
        let front = list.front().unwrap();
        assert!(Pattern::new("[ab|cd]").matches(&list, front));
        let list = build(&[("cd", TokenKind::Name)]);
        assert!(Pattern::new("[ab|cd]").matches(&list, list.front().unwrap()));
        let list = build(&[("ef", TokenKind::Name)]);
        assert!(!Pattern::new("[ab|cd]").matches(&list, list.front().unwrap()));
    }

    #[test]
    fn pipe_operator_is_a_literal() {
        let list = build(&[("|", TokenKind::Operator)]);
        assert!(Pattern::new("|").matches(&list, list.front().unwrap()));
        assert!(Pattern::new("%or%").matches(&list, list.front().unwrap()));
        let list = build(&[("||", TokenKind::Operator)]);
        assert!(Pattern::new("||").matches(&list, list.front().unwrap()));
    }

    #[test]
    fn negation_rejects_named_token() {
        let list = build(&[("x", TokenKind::Name)]);
        let front = list.front().unwrap();
        assert!(Pattern::new("!!else").matches(&list, front));
        assert!(!Pattern::new("!!x").matches(&list, front));
    }

    #[test]
    fn match_fails_past_end_of_stream() {
        let list = build(&[("x", TokenKind::Name)]);
        let front = list.front().unwrap();
        assert_eq!(Pattern::new("x ;").match_at(&list, front), 0);
    }

    #[test]
    fn returns_token_count_on_match() {
        let list = build(&[
            ("int", TokenKind::Type),
            ("a", TokenKind::Name),
            ("[", TokenKind::Operator),
            ("10", TokenKind::Number),
            ("]", TokenKind::Operator),
        ]);
        let front = list.front().unwrap();
        assert_eq!(Pattern::new("%type% %var% [ %num% ]").match_at(&list, front), 5);
    }
}
