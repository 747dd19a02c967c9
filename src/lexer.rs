//! Raw preprocessed text -> token list.
//!
//! Input is one configuration's expanded source: comments are already gone,
//! continuations joined, includes inlined between `#file "..."`/`#endfile`
//! sentinel lines. The lexer turns every other line into tokens carrying
//! file index and 1-based line, with maximal-munch operator scanning.

use crate::token::{TokenKind, TokenList};

/// Multi-character operators, longest first so the scan is maximal-munch.
const OPERATORS3: &[&str] = &["<<=", ">>=", "...", "->*"];
const OPERATORS2: &[&str] = &[
    "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "++", "--", "+=", "-=",
    "*=", "/=", "%=", "&=", "|=", "^=", "->", "::", "##",
];

pub fn tokenize_text(text: &str, path: &str) -> TokenList {
    let mut list = TokenList::new();
    let main_index = list.add_file(path);

    // (file, line) of the includer, restored at #endfile
    let mut file_stack: Vec<(u32, u32)> = Vec::new();
    let mut file_index = main_index;
    let mut line: u32 = 0;

    for raw_line in text.split('\n') {
        line += 1;
        let trimmed = raw_line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("#file ") {
            let name = rest.trim().trim_matches('"');
            file_stack.push((file_index, line));
            file_index = list.add_file(name);
            line = 0;
            continue;
        }
        if trimmed.starts_with("#endfile") {
            if let Some((f, l)) = file_stack.pop() {
                file_index = f;
                line = l;
            }
            continue;
        }
        lex_line(&mut list, raw_line, file_index, line);
    }
    list
}

fn lex_line(list: &mut TokenList, text: &str, file_index: u32, line: u32) {
    let bytes = text.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        if c == b'_' || c.is_ascii_alphabetic() {
            pos = lex_identifier(list, text, pos, file_index, line);
        } else if c.is_ascii_digit() || (c == b'.' && pos + 1 < bytes.len() && bytes[pos + 1].is_ascii_digit()) {
            pos = lex_number(list, text, pos, file_index, line);
        } else if c == b'"' {
            pos = lex_quoted(list, text, pos, b'"', TokenKind::StringLiteral, file_index, line);
        } else if c == b'\'' {
            pos = lex_quoted(list, text, pos, b'\'', TokenKind::CharLiteral, file_index, line);
        } else {
            pos = lex_operator(list, text, pos, file_index, line);
        }
    }
}

fn lex_identifier(list: &mut TokenList, text: &str, start: usize, file_index: u32, line: u32) -> usize {
    let bytes = text.as_bytes();
    let mut end = start;
    while end < bytes.len() && (bytes[end] == b'_' || bytes[end].is_ascii_alphanumeric()) {
        end += 1;
    }
    let word = &text[start..end];
    let sym = list.intern(word);
    let kind = if list.interner().is_keyword(sym) {
        TokenKind::Keyword
    } else if list.interner().is_standard_type(sym) {
        TokenKind::Type
    } else {
        TokenKind::Name
    };
    let id = list.push_str_back(word, kind, file_index, line);
    if kind == TokenKind::Type {
        match word {
            "unsigned" => list.get_mut(id).is_unsigned = true,
            "long" => list.get_mut(id).is_long = true,
            _ => {}
        }
    }
    end
}

fn lex_number(list: &mut TokenList, text: &str, start: usize, file_index: u32, line: u32) -> usize {
    let bytes = text.as_bytes();
    let mut end = start;
    while end < bytes.len() {
        let c = bytes[end];
        let take = c.is_ascii_alphanumeric()
            || c == b'.'
            // exponent sign: 1e+5, 1E-5
            || ((c == b'+' || c == b'-')
                && end > start
                && matches!(bytes[end - 1], b'e' | b'E')
                && !text[start..end].starts_with("0x")
                && !text[start..end].starts_with("0X"));
        if !take {
            break;
        }
        end += 1;
    }
    let word = &text[start..end];
    let id = list.push_str_back(word, TokenKind::Number, file_index, line);
    let lower = word.to_ascii_lowercase();
    let suffix: String = lower.chars().rev().take_while(|c| matches!(c, 'u' | 'l')).collect();
    if suffix.contains('u') {
        list.get_mut(id).is_unsigned = true;
    }
    if suffix.contains('l') {
        list.get_mut(id).is_long = true;
    }
    end
}

fn lex_quoted(
    list: &mut TokenList,
    text: &str,
    start: usize,
    quote: u8,
    kind: TokenKind,
    file_index: u32,
    line: u32,
) -> usize {
    let bytes = text.as_bytes();
    let mut end = start + 1;
    while end < bytes.len() {
        if bytes[end] == b'\\' {
            end += 2;
            continue;
        }
        if bytes[end] == quote {
            end += 1;
            break;
        }
        end += 1;
    }
    let end = end.min(bytes.len());
    list.push_str_back(&text[start..end], kind, file_index, line);
    end
}

fn lex_operator(list: &mut TokenList, text: &str, start: usize, file_index: u32, line: u32) -> usize {
    for op in OPERATORS3 {
        if text[start..].starts_with(op) {
            list.push_str_back(op, TokenKind::Operator, file_index, line);
            return start + op.len();
        }
    }
    for op in OPERATORS2 {
        if text[start..].starts_with(op) {
            list.push_str_back(op, TokenKind::Operator, file_index, line);
            return start + op.len();
        }
    }
    // single char, stepping a full UTF-8 sequence for stray non-ASCII bytes
    let ch = text[start..].chars().next().unwrap_or(' ');
    let end = start + ch.len_utf8();
    list.push_str_back(&text[start..end], TokenKind::Operator, file_index, line);
    end
}
