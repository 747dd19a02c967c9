//! Typedef resolution: `typedef T N;` is removed and later uses of `N` as a
//! type are replaced by the token sequence of `T`, with fresh bracket links
//! on the copies. A variable declaration that reuses the name shadows the
//! typedef until its scope closes. Function-pointer typedefs are left
//! untouched; checkers skip what they do not recognize.

use std::collections::{HashMap, HashSet};

use crate::token::{TokenId, TokenKind, TokenList};

pub(crate) fn simplify_typedefs(list: &mut TokenList) {
    let mut typedefs: HashMap<String, Vec<(String, TokenKind)>> = HashMap::new();
    let mut shadows: Vec<HashSet<String>> = vec![HashSet::new()];

    let mut cur = list.front();
    while let Some(id) = cur {
        if list.is_str(id, "{") {
            shadows.push(HashSet::new());
            cur = list.next(id);
            continue;
        }
        if list.is_str(id, "}") {
            if shadows.len() > 1 {
                shadows.pop();
            }
            cur = list.next(id);
            continue;
        }
        if list.is_str(id, "typedef") {
            cur = collect_typedef(list, id, &mut typedefs);
            continue;
        }

        if list.kind(id) == TokenKind::Name {
            let name = list.str_of(id).to_string();
            if typedefs.contains_key(&name) && !shadows.iter().any(|s| s.contains(&name)) {
                let member_access = match list.prev(id) {
                    Some(p) => matches!(list.str_of(p), "." | "->" | "::"),
                    None => false,
                };
                if member_access {
                    cur = list.next(id);
                    continue;
                }
                if is_shadowing_declaration(list, id) {
                    shadows.last_mut().unwrap().insert(name);
                    cur = list.next(id);
                    continue;
                }
                let replacement = typedefs.get(&name).unwrap().clone();
                cur = replace_use(list, id, &replacement);
                continue;
            }
        }
        cur = list.next(id);
    }
}

/// Read one `typedef ... name ;` declaration, record it, erase it. Returns
/// the token after the erased declaration.
fn collect_typedef(
    list: &mut TokenList,
    typedef_tok: TokenId,
    typedefs: &mut HashMap<String, Vec<(String, TokenKind)>>,
) -> Option<TokenId> {
    let mut tokens: Vec<TokenId> = Vec::new();
    let mut cur = list.next(typedef_tok);
    let mut has_paren = false;
    while let Some(id) = cur {
        match list.str_of(id) {
            ";" => break,
            "(" | ")" => has_paren = true,
            "{" | "}" => return list.next(id),
            _ => {}
        }
        tokens.push(id);
        cur = list.next(id);
    }
    let semicolon = cur?;
    if has_paren || tokens.len() < 2 {
        // unsupported form (function pointer etc.): leave it alone
        return list.next(semicolon);
    }
    let name_tok = *tokens
        .iter()
        .rev()
        .find(|t| list.kind(**t) == TokenKind::Name)?;
    if name_tok != *tokens.last().unwrap() {
        return list.next(semicolon);
    }
    let name = list.str_of(name_tok).to_string();
    let mut replacement: Vec<(String, TokenKind)> = Vec::new();
    for id in tokens.iter().take(tokens.len() - 1) {
        let text = list.str_of(*id).to_string();
        let kind = list.kind(*id);
        // resolve typedef chains at definition time
        match typedefs.get(&text) {
            Some(existing) if kind == TokenKind::Name => replacement.extend(existing.clone()),
            _ => replacement.push((text, kind)),
        }
    }
    typedefs.insert(name, replacement);

    let after = list.next(semicolon);
    let mut c = Some(typedef_tok);
    while let Some(id) = c {
        c = list.erase(id);
        if id == semicolon {
            break;
        }
    }
    after
}

/// `int name ;` where `name` is a typedef'd identifier redeclares it as a
/// variable for the current scope.
fn is_shadowing_declaration(list: &TokenList, id: TokenId) -> bool {
    let prev_is_type = match list.prev(id) {
        Some(p) => {
            list.kind(p) == TokenKind::Type
                || list.is_str(p, "*")
                || list.is_str(p, "&")
        }
        None => false,
    };
    if !prev_is_type {
        return false;
    }
    match list.next(id) {
        Some(n) => matches!(list.str_of(n), ";" | "," | "=" | ")" | "["),
        None => false,
    }
}

/// Replace one use token by the replacement sequence, relinking brackets
/// inside the copy. Returns the token after the inserted sequence.
fn replace_use(
    list: &mut TokenList,
    use_tok: TokenId,
    replacement: &[(String, TokenKind)],
) -> Option<TokenId> {
    let mut inserted: Vec<TokenId> = Vec::new();
    let mut at = use_tok;
    for (text, kind) in replacement {
        at = list.insert_str_after(at, text, *kind);
        inserted.push(at);
    }
    list.erase(use_tok);
    relink_range(list, &inserted);
    list.next(at)
}

/// Pair up brackets within a freshly inserted token range.
pub(crate) fn relink_range(list: &mut TokenList, ids: &[TokenId]) {
    let mut stack: Vec<(TokenId, &'static str)> = Vec::new();
    for &id in ids {
        match list.str_of(id) {
            "(" => stack.push((id, ")")),
            "[" => stack.push((id, "]")),
            "{" => stack.push((id, "}")),
            "<" => stack.push((id, ">")),
            s @ (")" | "]" | "}" | ">") => {
                if let Some((open, want)) = stack.last() {
                    if *want == s {
                        let open = *open;
                        stack.pop();
                        list.link_pair(open, id);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errorlogger::CollectingLogger;
    use crate::settings::Settings;
    use crate::simplify::Tokenizer;
    use crate::token::TokenList;

    fn simplify(code: &str) -> TokenList {
        let settings = Settings::new();
        let mut logger = CollectingLogger::new();
        Tokenizer::tokenize(code, "test.c", &settings, &mut logger)
            .unwrap()
            .list
    }

    #[test]
    fn simple_typedef_resolves() {
        let list = simplify("typedef unsigned int uint; uint x;");
        let text = list.stringify();
        assert!(text.contains("unsigned int x ;"), "got: {}", text);
        assert!(!text.contains("typedef"), "got: {}", text);
    }

    #[test]
    fn pointer_typedef_resolves() {
        let list = simplify("typedef char* str; str s;");
        let text = list.stringify();
        assert!(text.contains("char * s ;"), "got: {}", text);
    }

    #[test]
    fn typedef_chain_resolves() {
        let list = simplify("typedef int base; typedef base derived; derived d;");
        let text = list.stringify();
        assert!(text.contains("int d ;"), "got: {}", text);
    }

    #[test]
    fn shadowed_typedef_is_honored() {
        let list = simplify("typedef int len; void f(){ char len; len = 0; }");
        let text = list.stringify();
        assert!(text.contains("char len ;"), "got: {}", text);
        assert!(text.contains("len = 0"), "got: {}", text);
    }

    #[test]
    fn shadow_ends_with_scope() {
        let list = simplify("typedef int len; void f(){ char len; } len g;");
        let text = list.stringify();
        assert!(text.contains("int g ;"), "got: {}", text);
    }

    #[test]
    fn function_pointer_typedef_left_alone() {
        let list = simplify("typedef void (*cb)(int); int x;");
        let text = list.stringify();
        assert!(text.contains("typedef"), "got: {}", text);
        assert!(text.contains("int x ;"), "got: {}", text);
    }

    #[test]
    fn member_access_is_not_replaced() {
        let list = simplify("typedef int t; void f(){ s . t = 1 ; }");
        let text = list.stringify();
        assert!(text.contains(". t ="), "got: {}", text);
    }

    #[test]
    fn struct_typedef_resolves() {
        let list = simplify("typedef struct Foo Foo; void f(Foo* p){ }");
        let text = list.stringify();
        assert!(text.contains("struct Foo * p"), "got: {}", text);
    }
}
