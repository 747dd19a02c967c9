//! Template instantiation by textual substitution.
//!
//! For every `template<...>` class or function definition and every
//! instantiation point in the stream, a copy of the definition body is
//! appended with the formal parameters replaced by the actual arguments and
//! the template name replaced by an expanded name such as `Foo<int>`. The
//! instantiation point itself collapses to that single name token.
//! Instantiations found inside freshly appended bodies are picked up by the
//! next round; the round count is bounded and the phase fails open.

use std::collections::HashSet;

use crate::errorlogger::{ErrorLogger, ErrorMessage, Severity};
use crate::token::{TokenId, TokenKind, TokenList};

use super::typedefs::relink_range;

const MAX_INSTANTIATION_ROUNDS: usize = 100;

struct TemplateDef {
    name: String,
    params: Vec<String>,
    /// the `template` keyword token
    start: TokenId,
    /// first token of the copied region (`class`/`struct` or the return type)
    copy_from: TokenId,
    /// last token of the definition (`}` or `;`)
    end: TokenId,
    has_body: bool,
}

/// Names declared by `template <...> class|struct NAME` or a function
/// template, collected without relying on angle links.
pub(crate) fn declared_template_names(list: &TokenList) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut cur = list.front();
    while let Some(id) = cur {
        cur = list.next(id);
        if !list.is_str(id, "template") {
            continue;
        }
        let Some(open) = list.next(id) else { continue };
        if !list.is_str(open, "<") {
            continue;
        }
        let Some(close) = scan_angle_close(list, open) else { continue };
        if let Some(name) = template_name_after(list, close) {
            names.insert(name);
        }
    }
    names
}

/// Matching `>` for a template parameter list, by depth counting.
fn scan_angle_close(list: &TokenList, open: TokenId) -> Option<TokenId> {
    let mut depth = 1;
    let mut cur = list.next(open);
    let mut steps = 0;
    while let Some(id) = cur {
        steps += 1;
        if steps > 200 {
            return None;
        }
        match list.str_of(id) {
            "<" => depth += 1,
            ">" => {
                depth -= 1;
                if depth == 0 {
                    return Some(id);
                }
            }
            ";" | "{" | "}" => return None,
            _ => {}
        }
        cur = list.next(id);
    }
    None
}

/// The declared name following a template parameter list: the class name,
/// or for a function template the identifier before the argument parens.
fn template_name_after(list: &TokenList, close: TokenId) -> Option<String> {
    let mut cur = list.next(close)?;
    if list.is_str(cur, "class") || list.is_str(cur, "struct") {
        cur = list.next(cur)?;
        if list.kind(cur) == TokenKind::Name {
            return Some(list.str_of(cur).to_string());
        }
        return None;
    }
    let mut steps = 0;
    loop {
        steps += 1;
        if steps > 20 {
            return None;
        }
        let next = list.next(cur)?;
        if list.kind(cur) == TokenKind::Name && list.is_str(next, "(") {
            return Some(list.str_of(cur).to_string());
        }
        if matches!(list.str_of(cur), ";" | "{" | "}") {
            return None;
        }
        cur = next;
    }
}

fn collect_definitions(list: &TokenList) -> Vec<TemplateDef> {
    let mut defs = Vec::new();
    let mut cur = list.front();
    while let Some(id) = cur {
        cur = list.next(id);
        if !list.is_str(id, "template") {
            continue;
        }
        let Some(open) = list.next(id) else { continue };
        if !list.is_str(open, "<") {
            continue;
        }
        let Some(close) = list.link(open).or_else(|| scan_angle_close(list, open)) else {
            continue;
        };
        let params = collect_params(list, open, close);
        let Some(name) = template_name_after(list, close) else { continue };
        let Some(copy_from) = list.next(close) else { continue };

        // definition end: matching `}` of the first `{`, or the `;` of a
        // forward declaration
        let mut body_open = None;
        let mut end = None;
        let mut scan = list.next(close);
        let mut steps = 0;
        while let Some(t) = scan {
            steps += 1;
            if steps > 500 {
                break;
            }
            if list.is_str(t, "{") {
                body_open = Some(t);
                end = list.link(t);
                break;
            }
            if list.is_str(t, ";") {
                end = Some(t);
                break;
            }
            scan = list.next(t);
        }
        let Some(end) = end else { continue };
        // a class body is followed by its `;`
        let end = match list.next(end) {
            Some(semi) if list.is_str(semi, ";") && body_open.is_some() => semi,
            _ => end,
        };
        defs.push(TemplateDef {
            name,
            params,
            start: id,
            copy_from,
            end,
            has_body: body_open.is_some(),
        });
        cur = list.next(end);
    }
    defs
}

/// Formal parameter names: the identifier after `class`/`typename`, or the
/// last name of a non-type parameter.
fn collect_params(list: &TokenList, open: TokenId, close: TokenId) -> Vec<String> {
    let mut params = Vec::new();
    let mut cur = list.next(open);
    while let Some(id) = cur {
        if id == close {
            break;
        }
        let next = list.next(id);
        let at_boundary = match next {
            Some(n) => n == close || list.is_str(n, ","),
            None => true,
        };
        if at_boundary && list.kind(id) == TokenKind::Name {
            params.push(list.str_of(id).to_string());
        }
        cur = next;
    }
    params
}

struct Instantiation {
    name_tok: TokenId,
    open: TokenId,
    close: TokenId,
    args: Vec<Vec<(String, TokenKind)>>,
    expanded: String,
}

fn find_instantiations(list: &TokenList, def: &TemplateDef, defs: &[TemplateDef]) -> Vec<Instantiation> {
    let mut sites = Vec::new();
    let mut cur = list.front();
    while let Some(id) = cur {
        cur = list.next(id);
        if list.kind(id) != TokenKind::Name || !list.is_str(id, &def.name) {
            continue;
        }
        if defs.iter().any(|d| inside(list, id, d.start, d.end)) {
            continue;
        }
        let Some(open) = list.next(id) else { continue };
        if !list.is_str(open, "<") {
            continue;
        }
        let Some(close) = list.link(open).or_else(|| scan_angle_close(list, open)) else {
            continue;
        };
        let mut args: Vec<Vec<(String, TokenKind)>> = vec![Vec::new()];
        let mut t = list.next(open);
        while let Some(a) = t {
            if a == close {
                break;
            }
            if list.is_str(a, ",") {
                args.push(Vec::new());
            } else {
                args.last_mut()
                    .unwrap()
                    .push((list.str_of(a).to_string(), list.kind(a)));
            }
            t = list.next(a);
        }
        if args.len() == 1 && args[0].is_empty() {
            continue;
        }
        let expanded = expanded_name(&def.name, &args);
        sites.push(Instantiation {
            name_tok: id,
            open,
            close,
            args,
            expanded,
        });
    }
    sites
}

fn inside(list: &TokenList, id: TokenId, start: TokenId, end: TokenId) -> bool {
    let mut cur = Some(start);
    while let Some(t) = cur {
        if t == id {
            return true;
        }
        if t == end {
            return false;
        }
        cur = list.next(t);
    }
    false
}

fn expanded_name(name: &str, args: &[Vec<(String, TokenKind)>]) -> String {
    let parts: Vec<String> = args
        .iter()
        .map(|a| {
            a.iter()
                .map(|(t, _)| t.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    format!("{}<{}>", name, parts.join(","))
}

/// Append one instantiated copy of the definition to the end of the list.
fn emit_copy(list: &mut TokenList, def: &TemplateDef, inst: &Instantiation) {
    let mut source: Vec<(String, TokenKind, u32, u32)> = Vec::new();
    let mut cur = Some(def.copy_from);
    while let Some(id) = cur {
        let tok = list.get(id);
        source.push((
            list.str_of(id).to_string(),
            tok.kind,
            tok.file_index,
            tok.line,
        ));
        if id == def.end {
            break;
        }
        cur = list.next(id);
    }

    let mut inserted: Vec<TokenId> = Vec::new();
    let mut i = 0;
    while i < source.len() {
        let (text, kind, file, line) = &source[i];
        if *kind == TokenKind::Name {
            if let Some(pos) = def.params.iter().position(|p| p == text) {
                if let Some(arg) = inst.args.get(pos) {
                    for (atext, akind) in arg {
                        let id = list.push_str_back(atext, *akind, *file, *line);
                        inserted.push(id);
                    }
                    i += 1;
                    continue;
                }
            }
            if text == &def.name {
                let id = list.push_str_back(&inst.expanded, TokenKind::Name, *file, *line);
                inserted.push(id);
                // a self-reference with explicit arguments collapses too
                if source.get(i + 1).map(|s| s.0.as_str()) == Some("<") {
                    let mut depth = 0;
                    let mut j = i + 1;
                    while j < source.len() {
                        match source[j].0.as_str() {
                            "<" => depth += 1,
                            ">" => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            ";" | "{" => break,
                            _ => {}
                        }
                        j += 1;
                    }
                    if j < source.len() && source[j].0 == ">" {
                        i = j + 1;
                        continue;
                    }
                }
                i += 1;
                continue;
            }
        }
        let id = list.push_str_back(text, *kind, *file, *line);
        inserted.push(id);
        i += 1;
    }
    relink_range(list, &inserted);
}

/// Collapse `Name < args >` at the instantiation point into the expanded
/// name token.
fn collapse_site(list: &mut TokenList, inst: &Instantiation) {
    let mut cur = Some(inst.open);
    while let Some(id) = cur {
        let stop = id == inst.close;
        cur = list.erase(id);
        if stop {
            break;
        }
    }
    let expanded = inst.expanded.clone();
    list.set_str(inst.name_tok, &expanded);
    list.get_mut(inst.name_tok).kind = TokenKind::Name;
}

pub(crate) fn instantiate(list: &mut TokenList, logger: &mut dyn ErrorLogger) {
    let mut emitted: HashSet<String> = HashSet::new();
    let mut rounds = 0;
    loop {
        rounds += 1;
        if rounds > MAX_INSTANTIATION_ROUNDS {
            let file = list
                .front()
                .map(|id| list.file_of(id).to_string())
                .unwrap_or_default();
            logger.report_err(&ErrorMessage::at(
                Severity::Debug,
                "templateRecursion",
                "template instantiation depth limit reached",
                &file,
                0,
            ));
            break;
        }
        let defs = collect_definitions(list);
        if defs.is_empty() {
            break;
        }
        let mut any = false;
        for def in &defs {
            if !def.has_body {
                continue;
            }
            // one site at a time, innermost first: a site whose arguments
            // still contain `<` waits for its inner instantiation to
            // collapse into a plain name
            let mut guard = 0;
            loop {
                guard += 1;
                if guard > 200 {
                    break;
                }
                let site = find_instantiations(list, def, &defs)
                    .into_iter()
                    .find(|s| s.args.iter().flatten().all(|(t, _)| t != "<"));
                let Some(inst) = site else { break };
                if emitted.insert(inst.expanded.clone()) {
                    emit_copy(list, def, &inst);
                }
                collapse_site(list, &inst);
                any = true;
            }
        }
        if !any {
            break;
        }
    }
    erase_definitions(list);
}

fn erase_definitions(list: &mut TokenList) {
    loop {
        let defs = collect_definitions(list);
        let Some(def) = defs.first() else { break };
        let (start, end) = (def.start, def.end);
        let mut cur = Some(start);
        while let Some(id) = cur {
            let stop = id == end;
            cur = list.erase(id);
            if stop {
                break;
            }
        }
    }
}
