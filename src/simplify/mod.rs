//! Token stream canonicalization.
//!
//! The tokenizer lexes one configuration's expanded source and applies the
//! simplification phases in a fixed order: bracket linking, typedef
//! resolution, template instantiation, sugar removal, constant folding and
//! variable-id assignment. Each phase is idempotent on its own output, and
//! none of them panics through the phase boundary: anomalies degrade to a
//! `debug` diagnostic and a best-effort stream. After `tokenize` returns,
//! checkers treat the list as read-only.

mod templates;
mod typedefs;

use std::collections::HashMap;
use std::fmt;

use crate::errorlogger::{ErrorLogger, ErrorMessage, Severity};
use crate::intern::Symbol;
use crate::lexer;
use crate::mathlib;
use crate::settings::Settings;
use crate::token::{TokenId, TokenKind, TokenList};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    UnbalancedBrackets { file: String, line: u32 },
    Terminated,
}

impl fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenizeError::UnbalancedBrackets { file, line } => {
                write!(f, "unbalanced brackets in {} at line {}", file, line)
            }
            TokenizeError::Terminated => write!(f, "analysis terminated"),
        }
    }
}

impl std::error::Error for TokenizeError {}

#[derive(Debug)]
pub struct Tokenizer<'a> {
    pub list: TokenList,
    settings: &'a Settings,
}

impl<'a> Tokenizer<'a> {
    /// Lex and fully simplify one configuration.
    pub fn tokenize(
        code: &str,
        path: &str,
        settings: &'a Settings,
        logger: &mut dyn ErrorLogger,
    ) -> Result<Tokenizer<'a>, TokenizeError> {
        let list = lexer::tokenize_text(code, path);
        let mut tokenizer = Tokenizer { list, settings };
        tokenizer.simplify(logger)?;
        Ok(tokenizer)
    }

    fn check_terminated(&self) -> Result<(), TokenizeError> {
        if self.settings.is_terminated() {
            Err(TokenizeError::Terminated)
        } else {
            Ok(())
        }
    }

    fn simplify(&mut self, logger: &mut dyn ErrorLogger) -> Result<(), TokenizeError> {
        self.link_brackets(logger)?;
        self.check_terminated()?;
        typedefs::simplify_typedefs(&mut self.list);
        self.check_terminated()?;
        templates::instantiate(&mut self.list, logger);
        self.check_terminated()?;
        self.simplify_else_if();
        self.split_declarations();
        self.remove_redundant_parens();
        self.remove_redundant_braces();
        self.check_terminated()?;
        self.fold_constants();
        self.check_terminated()?;
        self.assign_varids();
        Ok(())
    }

    /// Phase 2: pair every `(`/`)`, `[`/`]`, `{`/`}`; then `<`/`>` for
    /// template syntax. Round-bracket imbalance is fatal for the
    /// configuration; unlinkable angle brackets are simply left unlinked.
    fn link_brackets(&mut self, _logger: &mut dyn ErrorLogger) -> Result<(), TokenizeError> {
        let mut stack: Vec<(TokenId, &'static str)> = Vec::new();
        let mut cur = self.list.front();
        while let Some(id) = cur {
            let expected = match self.list.str_of(id) {
                "(" | "[" | "{" => {
                    let open = match self.list.str_of(id) {
                        "(" => ")",
                        "[" => "]",
                        _ => "}",
                    };
                    stack.push((id, open));
                    None
                }
                s @ (")" | "]" | "}") => Some(s.to_string()),
                _ => None,
            };
            if let Some(close) = expected {
                match stack.pop() {
                    Some((open_id, want)) if want == close => {
                        self.list.link_pair(open_id, id);
                    }
                    _ => {
                        let tok = self.list.get(id);
                        return Err(TokenizeError::UnbalancedBrackets {
                            file: self.list.file_of(id).to_string(),
                            line: tok.line,
                        });
                    }
                }
            }
            cur = self.list.next(id);
        }
        if let Some((open_id, _)) = stack.first() {
            return Err(TokenizeError::UnbalancedBrackets {
                file: self.list.file_of(*open_id).to_string(),
                line: self.list.get(*open_id).line,
            });
        }
        link_template_angles(&mut self.list);
        Ok(())
    }

    /// Phase 5a: `else if (...) ...` becomes `else { if (...) ... }` so
    /// every conditional chain nests uniformly.
    fn simplify_else_if(&mut self) {
        let mut cur = self.list.front();
        while let Some(id) = cur {
            cur = self.list.next(id);
            if !self.list.is_str(id, "else") {
                continue;
            }
            let if_tok = match self.list.next(id) {
                Some(n) if self.list.is_str(n, "if") => n,
                _ => continue,
            };
            let end = match end_of_if_chain(&self.list, if_tok) {
                Some(e) => e,
                None => continue,
            };
            let open = self.list.insert_str_after(id, "{", TokenKind::Operator);
            let close = self.list.insert_str_after(end, "}", TokenKind::Operator);
            self.list.link_pair(open, close);
        }
    }

    /// Phase 5b: `int a, b;` becomes `int a; int b;`. Each declarator keeps
    /// its own pointer stars; initializers travel with their declarator.
    fn split_declarations(&mut self) {
        let mut cur = self.list.front();
        while let Some(id) = cur {
            cur = self.list.next(id);
            if !is_statement_start(&self.list, id) {
                continue;
            }
            let Some(decl) = parse_split_candidate(&self.list, id) else {
                continue;
            };
            // decl.comma points at the `,` after the first declarator
            let type_text: Vec<(String, TokenKind)> = decl
                .type_tokens
                .iter()
                .map(|t| (self.list.str_of(*t).to_string(), self.list.kind(*t)))
                .collect();
            let comma = decl.comma;
            self.list.set_str(comma, ";");
            let mut at = comma;
            for (text, kind) in &type_text {
                at = self.list.insert_str_after(at, text, *kind);
            }
            // rescan from the fresh statement start
            cur = Some(comma);
        }
    }

    /// Phase 5c: drop parentheses around a single literal or identifier,
    /// and collapse doubled parentheses.
    fn remove_redundant_parens(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            let mut cur = self.list.front();
            while let Some(id) = cur {
                cur = self.list.next(id);
                if !self.list.is_str(id, "(") {
                    continue;
                }
                let Some(close) = self.list.link(id) else { continue };
                let prev_callish = match self.list.prev(id) {
                    Some(p) => {
                        matches!(self.list.kind(p), TokenKind::Name | TokenKind::Type)
                            || self.list.is_str(p, ")")
                            || self.list.is_str(p, "]")
                            || self.list.is_str(p, "sizeof")
                            || self.list.is_str(p, "if")
                            || self.list.is_str(p, "while")
                            || self.list.is_str(p, "for")
                            || self.list.is_str(p, "switch")
                            || self.list.is_str(p, "catch")
                    }
                    None => false,
                };
                if prev_callish {
                    continue;
                }
                // ( ( ... ) ) -> ( ... )
                if let Some(inner) = self.list.next(id) {
                    if self.list.is_str(inner, "(") && self.list.link(inner) == self.list.prev(close)
                    {
                        self.list.erase(id);
                        self.list.erase(close);
                        changed = true;
                        continue;
                    }
                }
                // ( x ) -> x
                let inner = self.list.next(id);
                if let Some(inner) = inner {
                    if self.list.next(inner) == Some(close)
                        && matches!(self.list.kind(inner), TokenKind::Name | TokenKind::Number)
                        && !self.list.is_str(inner, "(")
                    {
                        let after = self.list.next(close);
                        let is_cast_or_call = matches!(
                            after.map(|a| self.list.str_of(a).to_string()),
                            Some(ref s) if s == "(" || s == "["
                        );
                        if !is_cast_or_call {
                            self.list.erase(id);
                            self.list.erase(close);
                            changed = true;
                        }
                    }
                }
            }
        }
    }

    /// Phase 5d: unwrap a bare compound statement nested directly inside
    /// another block: `{ { ... } }` -> `{ ... }`.
    fn remove_redundant_braces(&mut self) {
        let mut cur = self.list.front();
        while let Some(id) = cur {
            cur = self.list.next(id);
            if !self.list.is_str(id, "{") {
                continue;
            }
            let Some(close) = self.list.link(id) else { continue };
            let Some(inner) = self.list.next(id) else { continue };
            if self.list.is_str(inner, "{") && self.list.link(inner) == self.list.prev(close) {
                let inner_close = self.list.prev(close).unwrap();
                self.list.erase(inner);
                self.list.erase(inner_close);
                cur = self.list.next(id);
            }
        }
    }

    /// Phase 6: fold literal arithmetic through the math library and
    /// replace `sizeof(builtin)` with the platform width. Iterates to a
    /// fixpoint, folding tighter-binding operators first in each pass.
    fn fold_constants(&mut self) {
        self.fold_sizeof();
        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for ops in [
                &["*", "/", "%"][..],
                &["+", "-"][..],
                &["<<", ">>"][..],
                &["&"][..],
                &["^"][..],
                &["|"][..],
            ] {
                changed |= self.fold_binary_tier(ops);
            }
            changed |= self.fold_comparisons();
            changed |= self.fold_parenthesized_number();
            if !changed || rounds > 1000 {
                break;
            }
        }
    }

    fn fold_sizeof(&mut self) {
        let mut cur = self.list.front();
        while let Some(id) = cur {
            cur = self.list.next(id);
            if !self.list.is_str(id, "sizeof") {
                continue;
            }
            let Some(open) = self.list.next(id) else { continue };
            if !self.list.is_str(open, "(") {
                continue;
            }
            let Some(ty) = self.list.next(open) else { continue };
            if self.list.kind(ty) != TokenKind::Type {
                continue;
            }
            let Some(after_ty) = self.list.next(ty) else { continue };
            let (size, close) = if self.list.is_str(after_ty, ")") {
                let name = self.list.str_of(ty).to_string();
                match self.settings.platform.sizeof_type(&name) {
                    Some(s) => (s, after_ty),
                    None => continue,
                }
            } else if self.list.is_str(after_ty, "*")
                && self.list.next(after_ty).map(|c| self.list.is_str(c, ")")) == Some(true)
            {
                (
                    self.settings.platform.sizeof_pointer(),
                    self.list.next(after_ty).unwrap(),
                )
            } else {
                continue;
            };
            match self.list.next(close) {
                Some(next) => self.list.erase_between(id, next),
                None => {
                    let mut c = self.list.next(id);
                    while let Some(x) = c {
                        c = self.list.erase(x);
                    }
                }
            }
            self.list.set_str(id, &size.to_string());
            self.list.get_mut(id).kind = TokenKind::Number;
            cur = self.list.next(id);
        }
    }

    fn fold_binary_tier(&mut self, ops: &[&str]) -> bool {
        let mut changed = false;
        let mut cur = self.list.front();
        while let Some(a) = cur {
            cur = self.list.next(a);
            if self.list.kind(a) != TokenKind::Number {
                continue;
            }
            let Some(op) = self.list.next(a) else { continue };
            let op_str = self.list.str_of(op).to_string();
            if !ops.contains(&op_str.as_str()) {
                continue;
            }
            let Some(b) = self.list.next(op) else { continue };
            if self.list.kind(b) != TokenKind::Number {
                continue;
            }
            if !fold_guard(&self.list, a, b) {
                continue;
            }
            let left = self.list.str_of(a).to_string();
            let right = self.list.str_of(b).to_string();
            let Some(result) = mathlib::calculate(&left, &right, &op_str) else {
                continue;
            };
            self.list.erase(op);
            self.list.erase(b);
            self.list.set_str(a, &result);
            changed = true;
            cur = Some(a);
        }
        changed
    }

    /// Comparisons fold only when isolated between condition punctuation,
    /// so `a < 1 == 2` style chains are left alone.
    fn fold_comparisons(&mut self) -> bool {
        let mut changed = false;
        let mut cur = self.list.front();
        while let Some(a) = cur {
            cur = self.list.next(a);
            if self.list.kind(a) != TokenKind::Number {
                continue;
            }
            let Some(op) = self.list.next(a) else { continue };
            let op_str = self.list.str_of(op).to_string();
            if !matches!(op_str.as_str(), "<" | "<=" | ">" | ">=" | "==" | "!=") {
                continue;
            }
            let Some(b) = self.list.next(op) else { continue };
            if self.list.kind(b) != TokenKind::Number {
                continue;
            }
            let prev_ok = match self.list.prev(a) {
                Some(p) => matches!(self.list.str_of(p), "(" | "&&" | "||" | ";" | "{" | "}"),
                None => true,
            };
            let next_ok = match self.list.next(b) {
                Some(n) => matches!(self.list.str_of(n), ")" | "&&" | "||" | ";"),
                None => true,
            };
            if !prev_ok || !next_ok {
                continue;
            }
            let left = self.list.str_of(a).to_string();
            let right = self.list.str_of(b).to_string();
            let Some(result) = mathlib::calculate(&left, &right, &op_str) else {
                continue;
            };
            self.list.erase(op);
            self.list.erase(b);
            self.list.set_str(a, &result);
            changed = true;
            cur = self.list.next(a);
        }
        changed
    }

    fn fold_parenthesized_number(&mut self) -> bool {
        let mut changed = false;
        let mut cur = self.list.front();
        while let Some(id) = cur {
            cur = self.list.next(id);
            if !self.list.is_str(id, "(") {
                continue;
            }
            let Some(close) = self.list.link(id) else { continue };
            let Some(inner) = self.list.next(id) else { continue };
            if self.list.next(inner) != Some(close) || self.list.kind(inner) != TokenKind::Number {
                continue;
            }
            let keep = match self.list.prev(id) {
                Some(p) => {
                    matches!(self.list.kind(p), TokenKind::Name | TokenKind::Type)
                        || matches!(
                            self.list.str_of(p),
                            ")" | "sizeof" | "if" | "while" | "for" | "switch"
                        )
                }
                None => false,
            };
            if keep {
                continue;
            }
            self.list.erase(id);
            self.list.erase(close);
            changed = true;
        }
        changed
    }

    /// Phase 7: dense variable ids. A scope is a brace pair; shadowing in an
    /// inner scope gets a fresh id, and every use site is annotated.
    fn assign_varids(&mut self) {
        let mut counter: u32 = 0;
        let mut scopes: Vec<HashMap<Symbol, u32>> = vec![HashMap::new()];
        let mut cur = self.list.front();
        while let Some(id) = cur {
            let text = self.list.str_of(id);
            match text {
                "{" => scopes.push(HashMap::new()),
                "}" => {
                    if scopes.len() > 1 {
                        scopes.pop();
                    }
                }
                _ => {}
            }

            if let Some(name_tok) = declared_name(&self.list, id) {
                counter += 1;
                let sym = self.list.get(name_tok).lexeme;
                scopes.last_mut().unwrap().insert(sym, counter);
                self.list.get_mut(name_tok).var_id = Some(counter);
                cur = self.list.next(name_tok);
                continue;
            }

            if self.list.kind(id) == TokenKind::Name {
                let member_access = match self.list.prev(id) {
                    Some(p) => matches!(self.list.str_of(p), "." | "->" | "::"),
                    None => false,
                };
                if !member_access {
                    let sym = self.list.get(id).lexeme;
                    if let Some(var_id) =
                        scopes.iter().rev().find_map(|scope| scope.get(&sym)).copied()
                    {
                        self.list.get_mut(id).var_id = Some(var_id);
                    }
                }
            }
            cur = self.list.next(id);
        }
    }

    /// Hand the simplified list to the checkers and, when asked, a debug
    /// dump of what simplification produced.
    pub fn into_list(self, logger: &mut dyn ErrorLogger) -> TokenList {
        if self.settings.verbose {
            let path = self
                .list
                .front()
                .map(|id| self.list.file_of(id).to_string())
                .unwrap_or_default();
            logger.report_err(&ErrorMessage::at(
                Severity::Debug,
                "simplified",
                &self.list.stringify(),
                &path,
                0,
            ));
        }
        self.list
    }
}

/// End token of a complete `if (...) stmt [else stmt]` chain, used by the
/// else-if rewrite.
fn end_of_if_chain(list: &TokenList, if_tok: TokenId) -> Option<TokenId> {
    let open = list.next(if_tok)?;
    if !list.is_str(open, "(") {
        return None;
    }
    let close = list.link(open)?;
    let body = list.next(close)?;
    let body_end = end_of_statement(list, body)?;
    match list.next(body_end) {
        Some(next) if list.is_str(next, "else") => {
            let after_else = list.next(next)?;
            if list.is_str(after_else, "if") {
                end_of_if_chain(list, after_else)
            } else {
                end_of_statement(list, after_else)
            }
        }
        _ => Some(body_end),
    }
}

/// Last token of the statement starting at `tok`: the matching `}` of a
/// block, or the terminating `;`.
pub(crate) fn end_of_statement(list: &TokenList, tok: TokenId) -> Option<TokenId> {
    if list.is_str(tok, "{") {
        return list.link(tok);
    }
    if list.is_str(tok, "if") || list.is_str(tok, "while") || list.is_str(tok, "for") {
        return end_of_if_chain(list, tok).or_else(|| {
            // while/for share the if shape: head parens then statement
            let open = list.next(tok)?;
            let close = list.link(open)?;
            end_of_statement(list, list.next(close)?)
        });
    }
    let mut cur = Some(tok);
    while let Some(id) = cur {
        if list.is_str(id, ";") {
            return Some(id);
        }
        if list.is_str(id, "(") || list.is_str(id, "[") {
            cur = list.next(list.link(id)?);
            continue;
        }
        if list.is_str(id, "{") || list.is_str(id, "}") {
            return None;
        }
        cur = list.next(id);
    }
    None
}

fn is_statement_start(list: &TokenList, id: TokenId) -> bool {
    match list.prev(id) {
        None => true,
        Some(p) => matches!(list.str_of(p), ";" | "{" | "}"),
    }
}

struct SplitCandidate {
    type_tokens: Vec<TokenId>,
    comma: TokenId,
}

/// Recognize `type declarator , ...` where the declarator list can be
/// split. Initializers and array extents are skipped over; function
/// declarations and anything with parentheses are left alone.
fn parse_split_candidate(list: &TokenList, start: TokenId) -> Option<SplitCandidate> {
    let mut type_tokens = Vec::new();
    let mut cur = start;
    // type prefix: qualifiers and type words
    loop {
        let text = list.str_of(cur);
        let is_type_word = list.kind(cur) == TokenKind::Type
            || matches!(text, "const" | "static" | "register" | "volatile");
        if !is_type_word {
            break;
        }
        type_tokens.push(cur);
        cur = list.next(cur)?;
    }
    if type_tokens.is_empty() {
        return None;
    }
    // declarator: stars then name
    while list.is_str(cur, "*") {
        cur = list.next(cur)?;
    }
    if list.kind(cur) != TokenKind::Name {
        return None;
    }
    let mut cur = list.next(cur)?;
    // array extent or initializer before the comma
    loop {
        let text = list.str_of(cur);
        match text {
            "," => {
                return Some(SplitCandidate {
                    type_tokens,
                    comma: cur,
                })
            }
            ";" => return None,
            "[" => cur = list.next(list.link(cur)?)?,
            "(" => return None,
            "=" => {
                // initializer: scan to the `,` or `;` at this level
                cur = list.next(cur)?;
                loop {
                    let t = list.str_of(cur);
                    match t {
                        "," => {
                            return Some(SplitCandidate {
                                type_tokens,
                                comma: cur,
                            })
                        }
                        ";" => return None,
                        "(" | "[" => cur = list.next(list.link(cur)?)?,
                        "{" | "}" => return None,
                        _ => cur = list.next(cur)?,
                    }
                }
            }
            "{" | "}" => return None,
            _ => return None,
        }
    }
}

/// Numbers fold only when the neighborhood cannot change the result: the
/// token before the left operand and after the right operand must not bind
/// tighter than the operator being folded.
fn fold_guard(list: &TokenList, a: TokenId, b: TokenId) -> bool {
    let op = list.next(a).map(|o| list.str_of(o).to_string()).unwrap_or_default();
    let tier = |s: &str| match s {
        "*" | "/" | "%" => 3,
        "+" | "-" => 2,
        "<<" | ">>" => 1,
        _ => 0,
    };
    let my_tier = tier(&op);
    if let Some(p) = list.prev(a) {
        let ps = list.str_of(p);
        // an equal-tier operator before the left operand means this fold
        // would break left associativity (`x - 1 - 2`), so require strictly
        // looser binding on the left
        if tier(ps) >= my_tier && tier(ps) > 0 {
            return false;
        }
        if matches!(ps, "++" | "--" | ".") {
            return false;
        }
    }
    if let Some(n) = list.advance(b, 1) {
        let ns = list.str_of(n);
        if tier(ns) > my_tier {
            return false;
        }
    }
    true
}

/// Declaration detection for varid assignment. Returns the declared name
/// token when `id` starts a declaration.
fn declared_name(list: &TokenList, id: TokenId) -> Option<TokenId> {
    let start_ok = match list.prev(id) {
        None => true,
        Some(p) => matches!(list.str_of(p), ";" | "{" | "}" | "(" | ","),
    };
    if !start_ok {
        return None;
    }
    let mut cur = id;
    let mut saw_type = false;
    // qualifiers and type words; `struct Foo` counts as a type
    loop {
        let text = list.str_of(cur);
        if matches!(text, "const" | "static" | "register" | "volatile") {
            cur = list.next(cur)?;
            continue;
        }
        if matches!(text, "struct" | "union" | "enum" | "class") {
            cur = list.next(cur)?;
            if list.kind(cur) == TokenKind::Name {
                saw_type = true;
                cur = list.next(cur)?;
            }
            continue;
        }
        if list.kind(cur) == TokenKind::Type {
            saw_type = true;
            cur = list.next(cur)?;
            continue;
        }
        break;
    }
    if !saw_type {
        // `MyType name` style: an unknown name followed by stars/name, or a
        // linked template type like `vector < int > v`
        if list.kind(cur) != TokenKind::Name || cur != id {
            return None;
        }
        let next = list.next(cur)?;
        if list.is_str(next, "<") {
            let close = list.link(next)?;
            saw_type = true;
            cur = list.next(close)?;
        } else {
            let looks_like_type = list.kind(next) == TokenKind::Name
                || (list.is_str(next, "*")
                    && list.next(next).map(|n| list.kind(n) == TokenKind::Name) == Some(true));
            if !looks_like_type {
                return None;
            }
            saw_type = true;
            cur = next;
        }
    }
    if !saw_type {
        return None;
    }
    while list.is_str(cur, "*") || list.is_str(cur, "&") {
        cur = list.next(cur)?;
    }
    if list.kind(cur) != TokenKind::Name {
        return None;
    }
    let after = list.next(cur)?;
    match list.str_of(after) {
        ";" | "," | "=" | "[" | ")" => Some(cur),
        _ => None,
    }
}

/// Standard library class templates; a `<` after one of these names opens a
/// template argument list.
const KNOWN_TEMPLATES: &[&str] = &[
    "vector", "deque", "list", "set", "multiset", "map", "multimap", "queue",
    "stack", "pair", "auto_ptr", "iterator", "basic_string",
];

/// Link `<`/`>` pairs for template syntax. A `<` opens a template argument
/// list when it follows the `template` keyword or a known template name;
/// `>>` closing two lists at once is split into `> >`. Regions that do not
/// close before `;`, `{` or `)` imbalance are abandoned unlinked.
pub(crate) fn link_template_angles(list: &mut TokenList) {
    let declared = templates::declared_template_names(list);
    let is_template_name = |list: &TokenList, id: TokenId| -> bool {
        let text = list.str_of(id);
        KNOWN_TEMPLATES.contains(&text) || declared.contains(text)
    };

    let mut cur = list.front();
    while let Some(id) = cur {
        cur = list.next(id);
        let opens = if list.is_str(id, "<") {
            match list.prev(id) {
                Some(p) => {
                    list.is_str(p, "template")
                        || (matches!(list.kind(p), TokenKind::Name) && is_template_name(list, p))
                }
                None => false,
            }
        } else {
            false
        };
        if !opens || list.link(id).is_some() {
            continue;
        }
        try_link_angle_region(list, id, &declared);
    }
}

fn try_link_angle_region(
    list: &mut TokenList,
    open: TokenId,
    declared: &std::collections::HashSet<String>,
) {
    let mut stack: Vec<TokenId> = vec![open];
    let mut pairs: Vec<(TokenId, TokenId)> = Vec::new();
    let mut cur = list.next(open);
    let mut steps = 0;
    while let Some(id) = cur {
        steps += 1;
        if steps > 1000 {
            return;
        }
        let text = list.str_of(id).to_string();
        match text.as_str() {
            "<" => {
                let after_name = match list.prev(id) {
                    Some(p) => {
                        matches!(list.kind(p), TokenKind::Name)
                            && (KNOWN_TEMPLATES.contains(&list.str_of(p))
                                || declared.contains(list.str_of(p)))
                    }
                    None => false,
                };
                if after_name {
                    stack.push(id);
                }
            }
            ">" => {
                let o = stack.pop().expect("stack starts non-empty");
                pairs.push((o, id));
                if stack.is_empty() {
                    for (a, b) in pairs {
                        list.link_pair(a, b);
                    }
                    return;
                }
            }
            ">>" if stack.len() >= 2 => {
                list.set_str(id, ">");
                let second = list.insert_str_after(id, ">", TokenKind::Operator);
                let o = stack.pop().unwrap();
                pairs.push((o, id));
                cur = Some(second);
                continue;
            }
            ";" | "{" | "}" => return,
            "(" | "[" => {
                cur = list.link(id).and_then(|c| list.next(c));
                continue;
            }
            _ => {}
        }
        cur = list.next(id);
    }
}
