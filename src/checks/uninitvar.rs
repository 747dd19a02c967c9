//! Uninitialized variable reads.
//!
//! Tracks scalar and pointer locals from their declaration through the
//! execution-path engine. A read before any store on some path is reported;
//! taking the variable's address counts as initialization (out-parameter),
//! and `static`/`extern` locals are zero-initialized by the language.

use std::collections::HashMap;

use crate::check::Check;
use crate::errorlogger::{ErrorLogger, ErrorMessage, Severity};
use crate::executionpath::{function_bodies, Action, PathEngine, PathState};
use crate::settings::Settings;
use crate::token::{TokenId, TokenKind, TokenList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Init {
    No,
    Maybe,
    Yes,
}

impl Init {
    fn join(self, other: Init) -> Init {
        match (self, other) {
            (Init::No, Init::No) => Init::No,
            (Init::Yes, Init::Yes) => Init::Yes,
            _ => Init::Maybe,
        }
    }
}

#[derive(Clone)]
struct TrackedVar {
    state: Init,
    name: String,
    is_pointer: bool,
}

#[derive(Clone, Default)]
struct UninitState {
    vars: HashMap<u32, TrackedVar>,
}

impl UninitState {
    fn report(&mut self, list: &TokenList, tok: TokenId, var_id: u32, logger: &mut dyn ErrorLogger) {
        if let Some(var) = self.vars.get_mut(&var_id) {
            logger.report_err(&ErrorMessage::at(
                Severity::Error,
                "uninitvar",
                &format!("Uninitialized variable: {}", var.name),
                list.file_of(tok),
                list.get(tok).line,
            ));
            // one report per variable per path
            var.state = Init::Yes;
        }
    }
}

/// The variable token of a declaration: its previous tokens are the type,
/// possibly with stars. Returns (is_declaration, is_pointer).
fn declaration_shape(list: &TokenList, tok: TokenId) -> (bool, bool) {
    let mut cur = match list.prev(tok) {
        Some(p) => p,
        None => return (false, false),
    };
    let mut is_pointer = false;
    while list.is_str(cur, "*") {
        is_pointer = true;
        cur = match list.prev(cur) {
            Some(p) => p,
            None => return (false, false),
        };
    }
    (list.kind(cur) == TokenKind::Type, is_pointer)
}

/// `static`/`extern` anywhere in the declaration's type prefix.
fn has_static_storage(list: &TokenList, tok: TokenId) -> bool {
    let mut cur = list.prev(tok);
    while let Some(id) = cur {
        match list.str_of(id) {
            ";" | "{" | "}" => return false,
            "static" | "extern" => return true,
            _ => {}
        }
        cur = list.prev(id);
    }
    false
}

impl PathState for UninitState {
    fn parse(&mut self, list: &TokenList, tok: TokenId, logger: &mut dyn ErrorLogger) -> Action {
        if list.str_of(tok) == "return" {
            let mut cur = list.next(tok);
            while let Some(id) = cur {
                if list.is_str(id, ";") {
                    break;
                }
                if let Some(var_id) = list.get(id).var_id {
                    if let Some(var) = self.vars.get(&var_id) {
                        if var.state != Init::Yes {
                            self.report(list, id, var_id, logger);
                        }
                    }
                }
                cur = list.next(id);
            }
            return Action::Continue;
        }

        if list.kind(tok) != TokenKind::Name {
            return Action::Continue;
        }
        let Some(var_id) = list.get(tok).var_id else {
            return Action::Continue;
        };

        let (is_decl, is_pointer) = declaration_shape(list, tok);
        if is_decl && !self.vars.contains_key(&var_id) {
            if has_static_storage(list, tok) {
                return Action::Continue;
            }
            let state = match list.next(tok).map(|n| list.str_of(n).to_string()) {
                Some(ref n) if n == ";" => Init::No,
                Some(ref n) if n == "=" => Init::Yes,
                // arrays, function declarators, parameters
                _ => return Action::Continue,
            };
            // parameters are initialized by the caller; they are filtered
            // out here because their declaration sits inside `( )`, which
            // never ends in `;` or `=`
            self.vars.insert(
                var_id,
                TrackedVar {
                    state,
                    name: list.str_of(tok).to_string(),
                    is_pointer,
                },
            );
            return Action::Continue;
        }

        let Some(var) = self.vars.get(&var_id) else {
            return Action::Continue;
        };

        let prev = list.prev(tok).map(|p| list.str_of(p).to_string()).unwrap_or_default();
        let next = list.next(tok).map(|n| list.str_of(n).to_string()).unwrap_or_default();

        // sizeof never evaluates its operand
        if prev == "(" {
            if let Some(pp) = list.prev(tok).and_then(|p| list.prev(p)) {
                if list.is_str(pp, "sizeof") {
                    return Action::Continue;
                }
            }
        }

        // address taken: the callee may initialize it
        if prev == "&" {
            if let Some(v) = self.vars.get_mut(&var_id) {
                v.state = Init::Yes;
            }
            return Action::Continue;
        }

        // stream read initializes
        if prev == ">>" {
            if let Some(v) = self.vars.get_mut(&var_id) {
                v.state = Init::Yes;
            }
            return Action::Continue;
        }

        if next == "=" {
            if prev == "*" && var.is_pointer {
                // write through an uninitialized pointer reads the pointer
                if var.state != Init::Yes {
                    self.report(list, tok, var_id, logger);
                }
                return Action::Continue;
            }
            if let Some(v) = self.vars.get_mut(&var_id) {
                v.state = Init::Yes;
            }
            return Action::Continue;
        }

        // compound assignment reads before it writes
        if matches!(next.as_str(), "+=" | "-=" | "*=" | "/=" | "%=" | "|=" | "&=" | "^=") {
            if var.state != Init::Yes {
                self.report(list, tok, var_id, logger);
            }
            if let Some(v) = self.vars.get_mut(&var_id) {
                v.state = Init::Yes;
            }
            return Action::Continue;
        }

        if var.state != Init::Yes {
            self.report(list, tok, var_id, logger);
        }
        Action::Continue
    }

    fn merge(&mut self, other: &Self) {
        for (id, var) in self.vars.iter_mut() {
            if let Some(o) = other.vars.get(id) {
                var.state = var.state.join(o.state);
            }
        }
    }
}

pub struct UninitVarCheck;

impl UninitVarCheck {
    pub fn new() -> Self {
        UninitVarCheck
    }
}

impl Default for UninitVarCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for UninitVarCheck {
    fn name(&self) -> &'static str {
        "UninitVar"
    }

    fn run(&mut self, list: &TokenList, settings: &Settings, logger: &mut dyn ErrorLogger) {
        for (_, body) in function_bodies(list) {
            if settings.is_terminated() {
                return;
            }
            let mut engine = PathEngine::new(settings);
            engine.walk(list, body, UninitState::default(), logger);
        }
    }

    fn report_examples(&self, logger: &mut dyn ErrorLogger) {
        logger.report_err(&ErrorMessage::bare(
            Severity::Error,
            "uninitvar",
            "Uninitialized variable: x",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errorlogger::CollectingLogger;
    use crate::simplify::Tokenizer;

    fn check(code: &str) -> CollectingLogger {
        let settings = Settings::new();
        let mut logger = CollectingLogger::new();
        let tokenizer = Tokenizer::tokenize(code, "test.c", &settings, &mut logger).unwrap();
        let mut check = UninitVarCheck::new();
        check.run(&tokenizer.list, &settings, &mut logger);
        logger
    }

    #[test]
    fn return_of_uninitialized_scalar() {
        let logger = check("int f(){ int x; return x; }");
        assert_eq!(logger.ids(), vec!["uninitvar"]);
        assert_eq!(logger.errors[0].line(), 1);
        assert!(logger.errors[0].msg.contains("x"));
    }

    #[test]
    fn initialized_declaration_is_silent() {
        let logger = check("int f(){ int x = 1; return x; }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn assignment_before_use_is_silent() {
        let logger = check("int f(){ int x; x = 2; return x; }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn use_in_expression_is_reported() {
        let logger = check("void f(){ int x; int y; y = x + 1; }");
        assert_eq!(logger.ids(), vec!["uninitvar"]);
    }

    #[test]
    fn both_branches_assign_is_silent() {
        let logger = check("int f(int c){ int x; if(c){ x = 1; } else { x = 2; } return x; }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn one_branch_assign_is_reported() {
        let logger = check("int f(int c){ int x; if(c){ x = 1; } return x; }");
        assert_eq!(logger.ids(), vec!["uninitvar"]);
    }

    #[test]
    fn address_of_counts_as_initialization() {
        let logger = check("int f(){ int x; init(&x); return x; }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn parameters_are_not_tracked() {
        let logger = check("int f(int x){ return x; }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn static_local_is_not_tracked() {
        let logger = check("int f(){ static int x; return x; }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn write_through_uninit_pointer_is_reported() {
        let logger = check("void f(){ int* p; *p = 0; }");
        assert_eq!(logger.ids(), vec!["uninitvar"]);
    }

    #[test]
    fn condition_read_is_reported() {
        let logger = check("void f(){ int x; if(x){ } }");
        assert_eq!(logger.ids(), vec!["uninitvar"]);
    }

    #[test]
    fn sizeof_does_not_read() {
        let logger = check("void f(){ int x; int y; y = sizeof(x); }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn arrays_are_not_tracked() {
        let logger = check("void f(){ int a[10]; a[0] = 1; }");
        assert!(logger.errors.is_empty());
    }
}
