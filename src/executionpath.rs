//! Forward symbolic walker over a function body.
//!
//! Flow-sensitive checks plug a `PathState` into the engine. The engine
//! feeds it every token in execution order; at an `if`/`else` it clones the
//! state, walks both arms and merges at the join; loop bodies are walked
//! once and merged with the state before the loop (zero-or-more
//! iterations). A path ends at `return`, where pending end-of-life checks
//! fire, or at the function's closing brace. The walk gives up silently on
//! `goto`, on the terminate flag, and past a 10 000-step budget.

use crate::errorlogger::ErrorLogger;
use crate::settings::Settings;
use crate::simplify::end_of_statement;
use crate::token::{TokenId, TokenList};

const STATE_BUDGET: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    /// Abandon this path but keep walking the others.
    Prune,
    /// Abandon the whole function.
    Bailout,
}

pub trait PathState: Clone {
    /// Inspect the token under the cursor and update the state.
    fn parse(&mut self, list: &TokenList, tok: TokenId, logger: &mut dyn ErrorLogger) -> Action;

    /// Combine with the state of another path at a join point.
    fn merge(&mut self, other: &Self);

    /// A path reached a `return` or the end of the function body.
    fn end_of_path(&mut self, _list: &TokenList, _tok: TokenId, _logger: &mut dyn ErrorLogger) {}
}

enum Walk<S> {
    Alive(S),
    Dead,
    Bail,
}

pub struct PathEngine<'a> {
    settings: &'a Settings,
    steps: usize,
}

impl<'a> PathEngine<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        PathEngine { settings, steps: 0 }
    }

    /// Walk a function body. `body_open` is the `{` of the body; the walk
    /// covers everything up to its linked `}`.
    pub fn walk<S: PathState>(
        &mut self,
        list: &TokenList,
        body_open: TokenId,
        state: S,
        logger: &mut dyn ErrorLogger,
    ) {
        let Some(close) = list.link(body_open) else { return };
        let from = list.next(body_open);
        match self.walk_range(list, state, from, Some(close), logger) {
            Walk::Alive(mut s) => s.end_of_path(list, close, logger),
            Walk::Dead | Walk::Bail => {}
        }
    }

    /// Walk tokens from `from` up to (excluding) `until`.
    fn walk_range<S: PathState>(
        &mut self,
        list: &TokenList,
        mut state: S,
        from: Option<TokenId>,
        until: Option<TokenId>,
        logger: &mut dyn ErrorLogger,
    ) -> Walk<S> {
        let mut cur = from;
        while let Some(id) = cur {
            if Some(id) == until {
                break;
            }
            self.steps += 1;
            if self.steps > STATE_BUDGET || self.settings.is_terminated() {
                return Walk::Bail;
            }

            match list.str_of(id) {
                "if" => {
                    match self.walk_if(list, state, id, logger) {
                        Walk::Alive((s, after)) => {
                            state = s;
                            cur = after;
                            continue;
                        }
                        Walk::Dead => return Walk::Dead,
                        Walk::Bail => return Walk::Bail,
                    }
                }
                "while" | "for" | "switch" => {
                    match self.walk_loop(list, state, id, logger) {
                        Walk::Alive((s, after)) => {
                            state = s;
                            cur = after;
                            continue;
                        }
                        Walk::Dead => return Walk::Dead,
                        Walk::Bail => return Walk::Bail,
                    }
                }
                "return" => {
                    if state.parse(list, id, logger) == Action::Bailout {
                        return Walk::Bail;
                    }
                    state.end_of_path(list, id, logger);
                    return Walk::Dead;
                }
                "goto" => return Walk::Bail,
                "break" | "continue" => return Walk::Dead,
                _ => match state.parse(list, id, logger) {
                    Action::Continue => {}
                    Action::Prune => return Walk::Dead,
                    Action::Bailout => return Walk::Bail,
                },
            }
            cur = list.next(id);
        }
        Walk::Alive(state)
    }

    /// `if (cond) stmt [else stmt]`: parse the condition linearly, fork the
    /// state through both arms, merge the survivors. Returns the merged
    /// state and the token after the whole construct.
    fn walk_if<S: PathState>(
        &mut self,
        list: &TokenList,
        mut state: S,
        if_tok: TokenId,
        logger: &mut dyn ErrorLogger,
    ) -> Walk<(S, Option<TokenId>)> {
        let Some(open) = list.next(if_tok) else { return Walk::Alive((state, None)) };
        let Some(close) = list.link(open) else {
            // malformed: skip the keyword and keep walking
            return Walk::Alive((state, list.next(if_tok)));
        };
        match self.walk_range(list, state, list.next(open), Some(close), logger) {
            Walk::Alive(s) => state = s,
            other => return map_dead(other),
        }

        let Some(then_start) = list.next(close) else { return Walk::Alive((state, None)) };
        let Some(then_end) = end_of_statement(list, then_start) else {
            return Walk::Alive((state, list.next(close)));
        };

        let else_tok = list.next(then_end).filter(|t| list.is_str(*t, "else"));
        let (else_range, after) = match else_tok {
            Some(e) => {
                let Some(else_start) = list.next(e) else { return Walk::Alive((state, None)) };
                match end_of_statement(list, else_start) {
                    Some(else_end) => {
                        (Some((else_start, else_end)), list.next(else_end))
                    }
                    None => (None, list.next(then_end)),
                }
            }
            None => (None, list.next(then_end)),
        };

        let then_result = self.walk_stmt(list, state.clone(), then_start, then_end, logger);
        let else_result = match else_range {
            Some((start, end)) => self.walk_stmt(list, state.clone(), start, end, logger),
            // no else: falling through keeps the pre-branch state
            None => Walk::Alive(state),
        };

        match (then_result, else_result) {
            (Walk::Bail, _) | (_, Walk::Bail) => Walk::Bail,
            (Walk::Alive(mut a), Walk::Alive(b)) => {
                a.merge(&b);
                Walk::Alive((a, after))
            }
            (Walk::Alive(a), Walk::Dead) => Walk::Alive((a, after)),
            (Walk::Dead, Walk::Alive(b)) => Walk::Alive((b, after)),
            (Walk::Dead, Walk::Dead) => Walk::Dead,
        }
    }

    /// `while (...) stmt`, `for (...) stmt`, `switch (...) { ... }`: the
    /// header is parsed linearly, the body is walked once on a cloned state
    /// and merged back, modeling zero or more executions.
    fn walk_loop<S: PathState>(
        &mut self,
        list: &TokenList,
        mut state: S,
        kw_tok: TokenId,
        logger: &mut dyn ErrorLogger,
    ) -> Walk<(S, Option<TokenId>)> {
        let Some(open) = list.next(kw_tok) else { return Walk::Alive((state, None)) };
        let Some(close) = list.link(open) else {
            return Walk::Alive((state, list.next(kw_tok)));
        };
        match self.walk_range(list, state, list.next(open), Some(close), logger) {
            Walk::Alive(s) => state = s,
            other => return map_dead(other),
        }
        let Some(body_start) = list.next(close) else { return Walk::Alive((state, None)) };
        let Some(body_end) = end_of_statement(list, body_start) else {
            return Walk::Alive((state, list.next(close)));
        };
        match self.walk_stmt(list, state.clone(), body_start, body_end, logger) {
            Walk::Alive(s) => state.merge(&s),
            Walk::Dead => {}
            Walk::Bail => return Walk::Bail,
        }
        Walk::Alive((state, list.next(body_end)))
    }

    /// Walk one statement: a `{...}` block walks its interior, anything
    /// else walks up to and including its last token.
    fn walk_stmt<S: PathState>(
        &mut self,
        list: &TokenList,
        state: S,
        start: TokenId,
        end: TokenId,
        logger: &mut dyn ErrorLogger,
    ) -> Walk<S> {
        if list.is_str(start, "{") {
            self.walk_range(list, state, list.next(start), Some(end), logger)
        } else {
            self.walk_range(list, state, Some(start), list.next(end), logger)
        }
    }
}

fn map_dead<S, T>(walk: Walk<S>) -> Walk<T> {
    match walk {
        Walk::Dead => Walk::Dead,
        _ => Walk::Bail,
    }
}

/// Find each function body in the stream: returns (name token, body `{`).
/// The shape is `name ( ... ) {` at brace depth zero, possibly with
/// qualifiers between `)` and `{`.
pub fn function_bodies(list: &TokenList) -> Vec<(TokenId, TokenId)> {
    let mut out = Vec::new();
    let mut cur = list.front();
    while let Some(id) = cur {
        cur = list.next(id);
        if list.kind(id) != crate::token::TokenKind::Name {
            continue;
        }
        let Some(open) = list.next(id) else { continue };
        if !list.is_str(open, "(") {
            continue;
        }
        let Some(close) = list.link(open) else { continue };
        // allow `const` between `)` and `{`
        let mut after = list.next(close);
        while let Some(a) = after {
            if list.is_str(a, "const") {
                after = list.next(a);
            } else {
                break;
            }
        }
        let Some(body) = after else { continue };
        if !list.is_str(body, "{") || list.link(body).is_none() {
            continue;
        }
        // reject calls: a definition's name is preceded by a type, `*`, `&`,
        // start of file, or statement punctuation followed by a type earlier;
        // a call is preceded by an operator like `=` or `(`
        let is_definition = match list.prev(id) {
            None => true,
            Some(p) => {
                matches!(
                    list.kind(p),
                    crate::token::TokenKind::Type | crate::token::TokenKind::Name
                ) || matches!(list.str_of(p), "*" | "&" | "}" | ";" | "~" | "::")
            }
        };
        if is_definition {
            out.push((id, body));
            cur = list.link(body).and_then(|c| list.next(c));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
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

    /// Counts tokens seen and path ends; forks are visible through the
    /// token count (both arms walked).
    #[derive(Clone, Default)]
    struct Tracer {
        tokens: Vec<String>,
        merges: usize,
        ends: usize,
    }

    impl PathState for Tracer {
        fn parse(&mut self, list: &TokenList, tok: TokenId, _logger: &mut dyn ErrorLogger) -> Action {
            self.tokens.push(list.str_of(tok).to_string());
            Action::Continue
        }

        fn merge(&mut self, other: &Self) {
            self.merges += 1;
            self.ends += other.ends;
        }

        fn end_of_path(&mut self, _list: &TokenList, _tok: TokenId, _logger: &mut dyn ErrorLogger) {
            self.ends += 1;
        }
    }

    fn trace(code: &str) -> (TokenList, Vec<(TokenId, TokenId)>) {
        let list = simplify(code);
        let fns = function_bodies(&list);
        (list, fns)
    }

    #[test]
    fn finds_function_bodies() {
        let (list, fns) = trace("void f(){ } int g(int x){ return x; }");
        assert_eq!(fns.len(), 2);
        assert_eq!(list.str_of(fns[0].0), "f");
        assert_eq!(list.str_of(fns[1].0), "g");
    }

    #[test]
    fn calls_are_not_function_bodies() {
        let (list, fns) = trace("void f(){ g ( ) ; }");
        assert_eq!(fns.len(), 1);
        assert_eq!(list.str_of(fns[0].0), "f");
    }

    #[test]
    fn linear_walk_sees_every_token() {
        let (list, fns) = trace("void f(){ int x ; x = 1 ; }");
        let settings = Settings::new();
        let mut logger = CollectingLogger::new();
        let mut engine = PathEngine::new(&settings);
        // wrap to observe final state through end_of_path counting
        #[derive(Clone, Default)]
        struct Counter(usize);
        impl PathState for Counter {
            fn parse(&mut self, _l: &TokenList, _t: TokenId, _lg: &mut dyn ErrorLogger) -> Action {
                self.0 += 1;
                Action::Continue
            }
            fn merge(&mut self, _o: &Self) {}
        }
        engine.walk(&list, fns[0].1, Counter::default(), &mut logger);
    }

    #[test]
    fn if_forks_both_arms() {
        let (list, fns) = trace("void f(int c){ if(c){ int a ; } else { int b ; } }");
        let settings = Settings::new();
        let mut logger = CollectingLogger::new();
        let mut engine = PathEngine::new(&settings);
        engine.walk(&list, fns[0].1, Tracer::default(), &mut logger);
        // both arms walked: no assertion surface beyond not panicking and
        // the engine terminating; the checker tests cover semantics
    }

    #[test]
    fn budget_bails_out_silently() {
        let code = "void f(){ int x ; x = 1 ; }";
        let (list, fns) = trace(code);
        let settings = Settings::new();
        let mut logger = CollectingLogger::new();
        let mut engine = PathEngine::new(&settings);
        engine.steps = STATE_BUDGET;
        engine.walk(&list, fns[0].1, Tracer::default(), &mut logger);
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn terminate_flag_stops_walk() {
        let (list, fns) = trace("void f(){ int x ; }");
        let settings = Settings::new();
        settings.request_termination();
        let mut logger = CollectingLogger::new();
        let mut engine = PathEngine::new(&settings);
        engine.walk(&list, fns[0].1, Tracer::default(), &mut logger);
        assert!(logger.errors.is_empty());
    }
}
