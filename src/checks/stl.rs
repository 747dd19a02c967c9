//! STL misuse: iterators used after `erase`/`clear`, iterators mixed
//! between containers, and `size()` where `empty()` is meant.

use std::collections::HashMap;

use crate::check::Check;
use crate::errorlogger::{ErrorLogger, ErrorMessage, Severity};
use crate::pattern::Pattern;
use crate::settings::Settings;
use crate::token::TokenList;

pub struct StlCheck {
    erase_call: Pattern,
    clear_call: Pattern,
    begin_assign: Pattern,
    end_compare: Pattern,
    size_compare: Pattern,
    iterator_reassign: Pattern,
}

impl StlCheck {
    pub fn new() -> Self {
        StlCheck {
            erase_call: Pattern::new("%var% . erase ( %var% )"),
            clear_call: Pattern::new("%var% . clear ( )"),
            begin_assign: Pattern::new("%var% = %var% . begin ( )"),
            end_compare: Pattern::new("%var% != %var% . end ( )"),
            size_compare: Pattern::new("%var% . size ( ) ==|!=|> 0"),
            iterator_reassign: Pattern::new("%var% ="),
        }
    }

    /// Iterator invalidation: after `c.erase(it)` the iterator itself is
    /// dead; after `c.clear()` every iterator obtained from `c` is. Any use
    /// before reassignment is reported.
    fn check_invalidated_iterators(&self, list: &TokenList, logger: &mut dyn ErrorLogger) {
        // iterator varid -> container varid, from `it = c.begin()`
        let mut from_container: HashMap<u32, u32> = HashMap::new();
        for id in list.ids() {
            if self.begin_assign.matches(list, id) {
                let it = list.get(id).var_id;
                let container = list.advance(id, 2).and_then(|c| list.get(c).var_id);
                if let (Some(it), Some(container)) = (it, container) {
                    from_container.insert(it, container);
                }
            }
        }

        for id in list.ids() {
            let (dead, resume_at) = if self.erase_call.matches(list, id) {
                // skip `it = c.erase(it)` which refreshes the iterator
                if list.prev(id).map(|p| list.is_str(p, "=")) == Some(true) {
                    continue;
                }
                let it_tok = list.advance(id, 4).unwrap();
                match list.get(it_tok).var_id {
                    Some(v) => (vec![v], list.advance(id, 6)),
                    None => continue,
                }
            } else if self.clear_call.matches(list, id) {
                let Some(container) = list.get(id).var_id else { continue };
                let dead: Vec<u32> = from_container
                    .iter()
                    .filter(|(_, c)| **c == container)
                    .map(|(it, _)| *it)
                    .collect();
                if dead.is_empty() {
                    continue;
                }
                (dead, list.advance(id, 5))
            } else {
                continue;
            };

            // scan to the end of the enclosing scope
            let mut cur = resume_at;
            let mut depth = 0i32;
            'scan: while let Some(t) = cur {
                match list.str_of(t) {
                    "{" => depth += 1,
                    "}" => {
                        depth -= 1;
                        if depth < 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                if let Some(v) = list.get(t).var_id {
                    if dead.contains(&v) {
                        if self.iterator_reassign.matches(list, t) {
                            break 'scan;
                        }
                        logger.report_err(&ErrorMessage::at(
                            Severity::Error,
                            "eraseDereference",
                            &format!(
                                "Dangerous iterator usage after erase/clear: {}",
                                list.str_of(t)
                            ),
                            list.file_of(t),
                            list.get(t).line,
                        ));
                        break 'scan;
                    }
                }
                cur = list.next(t);
            }
        }
    }

    /// `it = a.begin()` remembered; `it != b.end()` with a different
    /// container is a mismatch.
    fn check_iterator_container_mismatch(&self, list: &TokenList, logger: &mut dyn ErrorLogger) {
        let mut containers: HashMap<u32, u32> = HashMap::new();
        for id in list.ids() {
            if self.begin_assign.matches(list, id) {
                let it = list.get(id).var_id;
                let container = list.advance(id, 2).and_then(|c| list.get(c).var_id);
                if let (Some(it), Some(container)) = (it, container) {
                    containers.insert(it, container);
                }
                continue;
            }
            if self.end_compare.matches(list, id) {
                let it = list.get(id).var_id;
                let container = list.advance(id, 2).and_then(|c| list.get(c).var_id);
                if let (Some(it), Some(container)) = (it, container) {
                    if let Some(expected) = containers.get(&it) {
                        if *expected != container {
                            logger.report_err(&ErrorMessage::at(
                                Severity::Error,
                                "iterators",
                                "Same iterator is used with different containers.",
                                list.file_of(id),
                                list.get(id).line,
                            ));
                        }
                    }
                }
            }
        }
    }

    /// `x.size() == 0` and friends: `empty()` says it without counting.
    fn check_size_for_emptiness(
        &self,
        list: &TokenList,
        settings: &Settings,
        logger: &mut dyn ErrorLogger,
    ) {
        if !settings.severity_enabled(Severity::Style) {
            return;
        }
        for id in list.ids() {
            if !self.size_compare.matches(list, id) {
                continue;
            }
            logger.report_err(&ErrorMessage::at(
                Severity::Style,
                "stlSize",
                &format!(
                    "Use {}.empty() instead of {}.size() to guarantee fast code.",
                    list.str_of(id),
                    list.str_of(id)
                ),
                list.file_of(id),
                list.get(id).line,
            ));
        }
    }
}

impl Default for StlCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for StlCheck {
    fn name(&self) -> &'static str {
        "Stl"
    }

    fn run(&mut self, list: &TokenList, settings: &Settings, logger: &mut dyn ErrorLogger) {
        if settings.is_terminated() {
            return;
        }
        self.check_invalidated_iterators(list, logger);
        self.check_iterator_container_mismatch(list, logger);
        self.check_size_for_emptiness(list, settings, logger);
    }

    fn report_examples(&self, logger: &mut dyn ErrorLogger) {
        logger.report_err(&ErrorMessage::bare(
            Severity::Error,
            "eraseDereference",
            "Dangerous iterator usage after erase: it",
        ));
        logger.report_err(&ErrorMessage::bare(
            Severity::Error,
            "iterators",
            "Same iterator is used with different containers.",
        ));
        logger.report_err(&ErrorMessage::bare(
            Severity::Style,
            "stlSize",
            "Use x.empty() instead of x.size() to guarantee fast code.",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errorlogger::CollectingLogger;
    use crate::settings::Enable;
    use crate::simplify::Tokenizer;

    fn check_with(code: &str, enables: &[Enable]) -> CollectingLogger {
        let mut settings = Settings::new();
        for e in enables {
            settings.enabled.insert(*e);
        }
        let mut logger = CollectingLogger::new();
        let tokenizer = Tokenizer::tokenize(code, "test.cpp", &settings, &mut logger).unwrap();
        let mut check = StlCheck::new();
        check.run(&tokenizer.list, &settings, &mut logger);
        logger
    }

    fn check(code: &str) -> CollectingLogger {
        check_with(code, &[])
    }

    #[test]
    fn use_after_erase_reported() {
        let logger = check(
            "void f ( vector < int > v , int it ) { v . erase ( it ) ; g ( it ) ; }",
        );
        assert_eq!(logger.ids(), vec!["eraseDereference"]);
    }

    #[test]
    fn reassigned_iterator_after_erase_is_silent() {
        let logger = check(
            "void f ( vector < int > v , int it ) { v . erase ( it ) ; it = v . begin ( ) ; g ( it ) ; }",
        );
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn refreshing_erase_result_is_silent() {
        let logger = check(
            "void f ( vector < int > v , int it ) { it = v . erase ( it ) ; g ( it ) ; }",
        );
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn use_after_clear_reported() {
        let logger = check(
            "void f ( vector < int > v , int it ) { it = v . begin ( ) ; v . clear ( ) ; g ( it ) ; }",
        );
        assert_eq!(logger.ids(), vec!["eraseDereference"]);
    }

    #[test]
    fn iterator_used_with_other_container() {
        let logger = check(
            "void f ( vector < int > a , vector < int > b , int it ) { it = a . begin ( ) ; while ( it != b . end ( ) ) { } }",
        );
        assert_eq!(logger.ids(), vec!["iterators"]);
    }

    #[test]
    fn iterator_with_own_container_is_silent() {
        let logger = check(
            "void f ( vector < int > a , int it ) { it = a . begin ( ) ; while ( it != a . end ( ) ) { } }",
        );
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn size_comparison_flagged_with_style() {
        let logger = check_with(
            "void f ( vector < int > v ) { if ( v . size ( ) == 0 ) { } }",
            &[Enable::Style],
        );
        assert_eq!(logger.ids(), vec!["stlSize"]);
        assert!(logger.errors[0].msg.contains("v.empty()"));
    }

    #[test]
    fn size_comparison_needs_style_enabled() {
        let logger = check("void f ( vector < int > v ) { if ( v . size ( ) == 0 ) { } }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn size_against_nonzero_is_silent() {
        let logger = check_with(
            "void f ( vector < int > v ) { if ( v . size ( ) == 2 ) { } }",
            &[Enable::Style],
        );
        assert!(logger.errors.is_empty());
    }
}
