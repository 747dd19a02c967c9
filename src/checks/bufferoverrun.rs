//! Buffer overruns on constant-size arrays.
//!
//! Direct constant indexing outside `[0, N)` is a pure pattern match.
//! Everything that needs flow sensitivity goes through the execution-path
//! engine: the path state tracks the highest value each scalar can reach,
//! loop conditions cap the induction variable's range, and a subscript
//! whose tracked range meets or exceeds the array size is reported at the
//! access. String copies into a too-small buffer are caught for literal
//! sources.

use std::collections::HashMap;

use crate::check::Check;
use crate::errorlogger::{ErrorLogger, ErrorMessage, Severity};
use crate::executionpath::{function_bodies, Action, PathEngine, PathState};
use crate::mathlib;
use crate::pattern::Pattern;
use crate::settings::Settings;
use crate::token::{TokenId, TokenKind, TokenList};

#[derive(Clone)]
struct ArrayInfo {
    name: String,
    size: i64,
}

/// Highest value a tracked variable can hold on this path. `capped` means
/// the ceiling came from a loop condition, so further `++` cannot push the
/// variable past it (the condition is rechecked before every iteration).
#[derive(Clone, Copy)]
struct VarRange {
    max: i64,
    capped: bool,
}

/// Per-path state: constant-size arrays are immutable facts; ranges fork
/// and merge with the path.
#[derive(Clone)]
struct RangeState {
    arrays: HashMap<u32, ArrayInfo>,
    ranges: HashMap<u32, VarRange>,
}

impl RangeState {
    fn new(arrays: HashMap<u32, ArrayInfo>) -> Self {
        RangeState {
            arrays,
            ranges: HashMap::new(),
        }
    }

    fn report(
        &self,
        list: &TokenList,
        tok: TokenId,
        array: &ArrayInfo,
        index: i64,
        logger: &mut dyn ErrorLogger,
    ) {
        logger.report_err(&ErrorMessage::at(
            Severity::Error,
            "arrayIndexOutOfBounds",
            &format!(
                "Array '{}[{}]' index {} out of bounds",
                array.name, array.size, index
            ),
            list.file_of(tok),
            list.get(tok).line,
        ));
    }

    /// `a [ i ]` where `i` carries a range that reaches past the array.
    fn check_subscript(
        &self,
        list: &TokenList,
        tok: TokenId,
        array_id: u32,
        logger: &mut dyn ErrorLogger,
    ) {
        let Some(open) = list.next(tok) else { return };
        if !list.is_str(open, "[") {
            return;
        }
        let Some(idx) = list.next(open) else { return };
        if list.kind(idx) != TokenKind::Name {
            return;
        }
        if list.next(idx).map(|c| list.is_str(c, "]")) != Some(true) {
            return;
        }
        let Some(idx_id) = list.get(idx).var_id else { return };
        let Some(range) = self.ranges.get(&idx_id) else { return };
        let Some(array) = self.arrays.get(&array_id) else { return };
        if range.max >= array.size {
            self.report(list, tok, array, range.max, logger);
        }
    }
}

impl PathState for RangeState {
    fn parse(&mut self, list: &TokenList, tok: TokenId, logger: &mut dyn ErrorLogger) -> Action {
        if list.kind(tok) != TokenKind::Name {
            return Action::Continue;
        }
        let Some(var_id) = list.get(tok).var_id else {
            return Action::Continue;
        };

        if self.arrays.contains_key(&var_id) {
            self.check_subscript(list, tok, var_id, logger);
            return Action::Continue;
        }

        let next = list
            .next(tok)
            .map(|n| list.str_of(n).to_string())
            .unwrap_or_default();
        let prev = list
            .prev(tok)
            .map(|p| list.str_of(p).to_string())
            .unwrap_or_default();

        match next.as_str() {
            "=" => {
                // only literal assignments produce a known ceiling
                let rhs = list.next(tok).and_then(|n| list.next(n));
                match rhs {
                    Some(r) if list.kind(r) == TokenKind::Number => {
                        self.ranges.insert(
                            var_id,
                            VarRange {
                                max: mathlib::to_i64(list.str_of(r)),
                                capped: false,
                            },
                        );
                    }
                    _ => {
                        self.ranges.remove(&var_id);
                    }
                }
            }
            "<" | "<=" => {
                // a loop condition bounds the variable inside the body; a
                // ceiling is only trusted for variables already tracked
                let bound_tok = list.next(tok).and_then(|op| list.next(op));
                if let Some(b) = bound_tok {
                    if list.kind(b) == TokenKind::Number && self.ranges.contains_key(&var_id) {
                        let bound = mathlib::to_i64(list.str_of(b));
                        let max = if next == "<" { bound - 1 } else { bound };
                        self.ranges.insert(var_id, VarRange { max, capped: true });
                    }
                }
            }
            "++" => {
                if let Some(range) = self.ranges.get_mut(&var_id) {
                    if !range.capped {
                        range.max += 1;
                    }
                }
            }
            "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^=" | ">>=" | "<<=" => {
                self.ranges.remove(&var_id);
            }
            _ => {
                if prev == "++" {
                    if let Some(range) = self.ranges.get_mut(&var_id) {
                        if !range.capped {
                            range.max += 1;
                        }
                    }
                }
            }
        }
        Action::Continue
    }

    fn merge(&mut self, other: &Self) {
        // a variable unknown on either path is unknown at the join; known
        // on both, it can be as large as the larger path allows
        self.ranges.retain(|id, _| other.ranges.contains_key(id));
        for (id, range) in self.ranges.iter_mut() {
            if let Some(o) = other.ranges.get(id) {
                range.max = range.max.max(o.max);
                range.capped = range.capped && o.capped;
            }
        }
    }
}

pub struct BufferOverrunCheck {
    decl: Pattern,
    index: Pattern,
    index_negative: Pattern,
    strcpy: Pattern,
}

impl BufferOverrunCheck {
    pub fn new() -> Self {
        BufferOverrunCheck {
            decl: Pattern::new("%type% %var% [ %num% ] ;"),
            index: Pattern::new("%var% [ %num% ]"),
            index_negative: Pattern::new("%var% [ - %num% ]"),
            strcpy: Pattern::new("strcpy ( %var% , %str% )"),
        }
    }

    fn collect_arrays(&self, list: &TokenList) -> HashMap<u32, ArrayInfo> {
        let mut arrays = HashMap::new();
        for id in list.ids() {
            if self.decl.match_at(list, id) == 0 {
                continue;
            }
            let name_tok = list.next(id).unwrap();
            let size_tok = list.advance(id, 3).unwrap();
            if let Some(var_id) = list.get(name_tok).var_id {
                arrays.insert(
                    var_id,
                    ArrayInfo {
                        name: list.str_of(name_tok).to_string(),
                        size: mathlib::to_i64(list.str_of(size_tok)),
                    },
                );
            }
        }
        arrays
    }

    fn check_direct_indexing(
        &self,
        list: &TokenList,
        arrays: &HashMap<u32, ArrayInfo>,
        logger: &mut dyn ErrorLogger,
    ) {
        for id in list.ids() {
            let negative = self.index_negative.matches(list, id);
            if !negative && self.index.match_at(list, id) == 0 {
                continue;
            }
            // skip the declaration itself
            if let Some(prev) = list.prev(id) {
                if list.kind(prev) == TokenKind::Type {
                    continue;
                }
            }
            let Some(var_id) = list.get(id).var_id else { continue };
            let Some(array) = arrays.get(&var_id) else { continue };
            let index_tok = list.advance(id, if negative { 3 } else { 2 }).unwrap();
            let mut index = mathlib::to_i64(list.str_of(index_tok));
            if negative {
                index = -index;
            }
            if index < 0 || index >= array.size {
                logger.report_err(&ErrorMessage::at(
                    Severity::Error,
                    "arrayIndexOutOfBounds",
                    &format!(
                        "Array '{}[{}]' index {} out of bounds",
                        array.name, array.size, index
                    ),
                    list.file_of(id),
                    list.get(id).line,
                ));
            }
        }
    }

    /// `strcpy(buf, "literal")` needs room for the terminator too.
    fn check_string_copies(
        &self,
        list: &TokenList,
        arrays: &HashMap<u32, ArrayInfo>,
        logger: &mut dyn ErrorLogger,
    ) {
        for id in list.ids() {
            if self.strcpy.match_at(list, id) == 0 {
                continue;
            }
            let dest = list.advance(id, 2).unwrap();
            let Some(var_id) = list.get(dest).var_id else { continue };
            let Some(array) = arrays.get(&var_id) else { continue };
            let literal = list.str_at(id, 4).unwrap_or("");
            let payload = literal.len().saturating_sub(2) as i64;
            if payload + 1 > array.size {
                logger.report_err(&ErrorMessage::at(
                    Severity::Error,
                    "bufferAccessOutOfBounds",
                    &format!("Buffer access out-of-bounds: {}", array.name),
                    list.file_of(id),
                    list.get(id).line,
                ));
            }
        }
    }
}

impl Default for BufferOverrunCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for BufferOverrunCheck {
    fn name(&self) -> &'static str {
        "BufferOverrun"
    }

    fn run(&mut self, list: &TokenList, settings: &Settings, logger: &mut dyn ErrorLogger) {
        if settings.is_terminated() {
            return;
        }
        let arrays = self.collect_arrays(list);
        if arrays.is_empty() {
            return;
        }
        self.check_direct_indexing(list, &arrays, logger);
        self.check_string_copies(list, &arrays, logger);
        for (_, body) in function_bodies(list) {
            if settings.is_terminated() {
                return;
            }
            let mut engine = PathEngine::new(settings);
            engine.walk(list, body, RangeState::new(arrays.clone()), logger);
        }
    }

    fn report_examples(&self, logger: &mut dyn ErrorLogger) {
        logger.report_err(&ErrorMessage::bare(
            Severity::Error,
            "arrayIndexOutOfBounds",
            "Array 'a[10]' index 10 out of bounds",
        ));
        logger.report_err(&ErrorMessage::bare(
            Severity::Error,
            "bufferAccessOutOfBounds",
            "Buffer access out-of-bounds: buf",
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
        let mut check = BufferOverrunCheck::new();
        check.run(&tokenizer.list, &settings, &mut logger);
        logger
    }

    #[test]
    fn constant_index_out_of_bounds() {
        let logger = check("void f(){ int a[10]; a[10]=0; }");
        assert_eq!(logger.ids(), vec!["arrayIndexOutOfBounds"]);
        assert_eq!(logger.errors[0].line(), 1);
        assert!(logger.errors[0].msg.contains("a[10]"));
    }

    #[test]
    fn last_valid_index_is_silent() {
        let logger = check("void f(){ int a[10]; a[9]=0; }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn loop_with_less_equal_overruns() {
        let logger = check("void f(){ int a[10]; int i; for(i = 0; i <= 10; i++){ a[i] = 0; } }");
        assert_eq!(logger.ids(), vec!["arrayIndexOutOfBounds"]);
        assert!(logger.errors[0].msg.contains("index 10"));
    }

    #[test]
    fn loop_with_less_than_is_silent() {
        let logger = check("void f(){ int a[10]; int i; for(i = 0; i < 10; i++){ a[i] = 0; } }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn loop_bound_past_size_overruns() {
        let logger = check("void f(){ int a[10]; int i; for(i = 0; i < 11; i++){ a[i] = 0; } }");
        assert_eq!(logger.ids(), vec!["arrayIndexOutOfBounds"]);
    }

    #[test]
    fn while_loop_overrun_detected() {
        let logger =
            check("void f(){ int a[10]; int i; i = 0; while(i <= 10){ a[i] = 0; i++; } }");
        assert_eq!(logger.ids(), vec!["arrayIndexOutOfBounds"]);
        assert!(logger.errors[0].msg.contains("index 10"));
    }

    #[test]
    fn while_loop_within_bounds_is_silent() {
        let logger = check("void f(){ int a[10]; int i; i = 0; while(i < 10){ a[i] = 0; i++; } }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn variable_bound_is_silent() {
        let logger =
            check("void f(int n){ int a[10]; int i; for(i = 0; i < n; i++){ a[i] = 0; } }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn assigned_index_past_size_is_reported() {
        let logger = check("void f(){ int a[10]; int i; i = 10; a[i] = 0; }");
        assert_eq!(logger.ids(), vec!["arrayIndexOutOfBounds"]);
        assert!(logger.errors[0].msg.contains("index 10"));
    }

    #[test]
    fn reassigned_index_below_size_is_silent() {
        let logger = check("void f(){ int a[10]; int i; i = 10; i = 2; a[i] = 0; }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn branch_merge_keeps_the_larger_range() {
        let logger =
            check("void f(int c){ int a[10]; int i; if(c){ i = 3; } else { i = 12; } a[i] = 0; }");
        assert_eq!(logger.ids(), vec!["arrayIndexOutOfBounds"]);
        assert!(logger.errors[0].msg.contains("index 12"));
    }

    #[test]
    fn other_array_in_loop_is_silent() {
        let logger =
            check("void f(){ int a[10]; int b[20]; int i; for(i = 0; i < 15; i++){ b[i] = 0; } }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn strcpy_literal_too_long() {
        let logger = check("void f(){ char buf[4]; strcpy(buf, \"hello\"); }");
        assert_eq!(logger.ids(), vec!["bufferAccessOutOfBounds"]);
    }

    #[test]
    fn strcpy_literal_fits() {
        let logger = check("void f(){ char buf[6]; strcpy(buf, \"hello\"); }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn negative_index_reported() {
        let logger = check("void f(){ int a[10]; a[-1]=0; }");
        assert_eq!(logger.ids(), vec!["arrayIndexOutOfBounds"]);
    }

    #[test]
    fn unknown_size_is_silent() {
        let logger = check("void f(int n){ int a[10]; a[n]=0; }");
        assert!(logger.errors.is_empty());
    }
}
