//! Memory and resource leaks.
//!
//! A tracked variable is one bound to the result of an allocation primitive.
//! Ownership leaves through `free`/`delete`/`fclose`, a `return`, an
//! assignment into something else, or being passed to a function. Whatever
//! is still owned when a path reaches the end of the function is a leak.
//! Scalar/array `new`/`delete` mismatches are a separate diagnostic.

use std::collections::HashMap;

use crate::check::Check;
use crate::errorlogger::{ErrorLogger, ErrorMessage, Severity};
use crate::executionpath::{function_bodies, Action, PathEngine, PathState};
use crate::settings::Settings;
use crate::token::{TokenId, TokenKind, TokenList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllocKind {
    Malloc,
    New,
    NewArray,
    File,
}

impl AllocKind {
    fn of_function(name: &str) -> Option<AllocKind> {
        match name {
            "malloc" | "calloc" | "realloc" | "strdup" | "strndup" | "kmalloc" => {
                Some(AllocKind::Malloc)
            }
            "fopen" | "tmpfile" | "fdopen" | "popen" | "opendir" => Some(AllocKind::File),
            _ => None,
        }
    }

    fn dealloc_name(&self) -> &'static str {
        match self {
            AllocKind::Malloc => "free",
            AllocKind::New => "delete",
            AllocKind::NewArray => "delete []",
            AllocKind::File => "fclose",
        }
    }
}

#[derive(Clone, Default)]
struct LeakState {
    /// varid -> (allocation kind, variable name)
    owned: HashMap<u32, (AllocKind, String)>,
}

impl LeakState {
    fn track(&mut self, var_id: u32, kind: AllocKind, name: &str) {
        self.owned.insert(var_id, (kind, name.to_string()));
    }

    fn release(&mut self, var_id: u32) {
        self.owned.remove(&var_id);
    }

    fn mismatch(
        &mut self,
        list: &TokenList,
        tok: TokenId,
        var_id: u32,
        used: &str,
        logger: &mut dyn ErrorLogger,
    ) {
        if let Some((kind, name)) = self.owned.get(&var_id) {
            logger.report_err(&ErrorMessage::at(
                Severity::Error,
                "mismatchAllocDealloc",
                &format!(
                    "Mismatching allocation and deallocation: {} is released with {} but was allocated for {}",
                    name,
                    used,
                    kind.dealloc_name()
                ),
                list.file_of(tok),
                list.get(tok).line,
            ));
        }
        self.release(var_id);
    }
}

/// Allocation bound at `var = ...`; returns the kind when the right side is
/// an allocation primitive.
fn alloc_kind_of_rhs(list: &TokenList, rhs: TokenId) -> Option<AllocKind> {
    let text = list.str_of(rhs);
    if text == "new" {
        // array when a `[` shows up before the initializer ends
        let mut cur = list.next(rhs);
        let mut steps = 0;
        while let Some(id) = cur {
            steps += 1;
            if steps > 30 {
                break;
            }
            match list.str_of(id) {
                "[" => return Some(AllocKind::NewArray),
                ";" | "(" | "," => return Some(AllocKind::New),
                _ => {}
            }
            cur = list.next(id);
        }
        return Some(AllocKind::New);
    }
    // a cast may sit between `=` and the call: (char *) malloc (10)
    if text == "(" {
        let close = list.link(rhs)?;
        return alloc_kind_of_rhs(list, list.next(close)?);
    }
    if list.kind(rhs) == TokenKind::Name
        && list.next(rhs).map(|n| list.is_str(n, "(")) == Some(true)
    {
        return AllocKind::of_function(text);
    }
    None
}

impl PathState for LeakState {
    fn parse(&mut self, list: &TokenList, tok: TokenId, logger: &mut dyn ErrorLogger) -> Action {
        let text = list.str_of(tok);

        // free ( p ) / fclose ( p )
        if text == "free" || text == "fclose" {
            if let Some(arg) = call_single_var_arg(list, tok) {
                if let Some(var_id) = list.get(arg).var_id {
                    let expected = if text == "free" {
                        AllocKind::Malloc
                    } else {
                        AllocKind::File
                    };
                    let wrong =
                        matches!(self.owned.get(&var_id), Some((kind, _)) if *kind != expected);
                    if wrong {
                        let used = text.to_string();
                        self.mismatch(list, tok, var_id, &used, logger);
                    } else {
                        self.release(var_id);
                    }
                }
                return Action::Continue;
            }
        }

        // delete p / delete [] p
        if text == "delete" {
            let mut cur = list.next(tok);
            let mut array = false;
            if let Some(b) = cur {
                if list.is_str(b, "[") {
                    array = true;
                    cur = list.link(b).and_then(|c| list.next(c));
                }
            }
            if let Some(var) = cur {
                if let Some(var_id) = list.get(var).var_id {
                    let expected = if array {
                        AllocKind::NewArray
                    } else {
                        AllocKind::New
                    };
                    let used = if array { "delete []" } else { "delete" };
                    let wrong =
                        matches!(self.owned.get(&var_id), Some((kind, _)) if *kind != expected);
                    if wrong {
                        self.mismatch(list, tok, var_id, used, logger);
                    } else {
                        self.release(var_id);
                    }
                }
            }
            return Action::Continue;
        }

        // return ...: everything mentioned escapes
        if text == "return" {
            let mut cur = list.next(tok);
            while let Some(id) = cur {
                if list.is_str(id, ";") {
                    break;
                }
                if let Some(var_id) = list.get(id).var_id {
                    self.release(var_id);
                }
                cur = list.next(id);
            }
            return Action::Continue;
        }

        // p = <alloc> / p = anything
        if list.kind(tok) == TokenKind::Name {
            if let Some(var_id) = list.get(tok).var_id {
                let next = list.next(tok);
                if next.map(|n| list.is_str(n, "=")) == Some(true) {
                    if let Some(rhs) = next.and_then(|n| list.next(n)) {
                        match alloc_kind_of_rhs(list, rhs) {
                            Some(kind) => {
                                self.track(var_id, kind, list.str_of(tok));
                            }
                            None => self.release(var_id),
                        }
                        return Action::Continue;
                    }
                }
                // ownership copied out: `x = p`, `s.q = p`, `arr[i] = p`
                if let Some(prev) = list.prev(tok) {
                    if list.is_str(prev, "=") && self.owned.contains_key(&var_id) {
                        self.release(var_id);
                        return Action::Continue;
                    }
                }
            }

            // unknown function call: passing an owned pointer hands it over
            if list.get(tok).var_id.is_none()
                && list.next(tok).map(|n| list.is_str(n, "(")) == Some(true)
            {
                let open = list.next(tok).unwrap();
                if let Some(close) = list.link(open) {
                    let mut cur = list.next(open);
                    while let Some(id) = cur {
                        if id == close {
                            break;
                        }
                        if let Some(var_id) = list.get(id).var_id {
                            self.release(var_id);
                        }
                        cur = list.next(id);
                    }
                }
            }
        }
        Action::Continue
    }

    fn merge(&mut self, other: &Self) {
        // leak only when every path to this join still owns the pointer
        self.owned.retain(|id, _| other.owned.contains_key(id));
    }

    fn end_of_path(&mut self, list: &TokenList, tok: TokenId, logger: &mut dyn ErrorLogger) {
        let mut leaks: Vec<&String> = self.owned.values().map(|(_, name)| name).collect();
        leaks.sort();
        for name in leaks {
            logger.report_err(&ErrorMessage::at(
                Severity::Error,
                "memleak",
                &format!("Memory leak: {}", name),
                list.file_of(tok),
                list.get(tok).line,
            ));
        }
    }
}

/// For `name ( x )` calls: the lone variable argument token.
fn call_single_var_arg(list: &TokenList, name_tok: TokenId) -> Option<TokenId> {
    let open = list.next(name_tok)?;
    if !list.is_str(open, "(") {
        return None;
    }
    let close = list.link(open)?;
    let arg = list.next(open)?;
    if list.next(arg)? == close && list.kind(arg) == TokenKind::Name {
        Some(arg)
    } else {
        None
    }
}

pub struct MemleakCheck;

impl MemleakCheck {
    pub fn new() -> Self {
        MemleakCheck
    }
}

impl Default for MemleakCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for MemleakCheck {
    fn name(&self) -> &'static str {
        "Memleak"
    }

    fn run(&mut self, list: &TokenList, settings: &Settings, logger: &mut dyn ErrorLogger) {
        for (_, body) in function_bodies(list) {
            if settings.is_terminated() {
                return;
            }
            let mut engine = PathEngine::new(settings);
            engine.walk(list, body, LeakState::default(), logger);
        }
    }

    fn report_examples(&self, logger: &mut dyn ErrorLogger) {
        logger.report_err(&ErrorMessage::bare(
            Severity::Error,
            "memleak",
            "Memory leak: p",
        ));
        logger.report_err(&ErrorMessage::bare(
            Severity::Error,
            "mismatchAllocDealloc",
            "Mismatching allocation and deallocation: p is released with free but was allocated for delete",
        ));
    }
}
