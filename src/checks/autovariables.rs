//! Addresses of locals escaping the function: stored through an
//! out-parameter or returned to the caller.

use std::collections::HashSet;

use crate::check::Check;
use crate::errorlogger::{ErrorLogger, ErrorMessage, Severity};
use crate::executionpath::function_bodies;
use crate::pattern::Pattern;
use crate::settings::Settings;
use crate::token::{TokenId, TokenList};

pub struct AutoVariablesCheck {
    deref_store: Pattern,
    index_store: Pattern,
    return_addr: Pattern,
}

impl AutoVariablesCheck {
    pub fn new() -> Self {
        AutoVariablesCheck {
            deref_store: Pattern::new("* %var% = & %var% ;"),
            index_store: Pattern::new("%var% [ %any% ] = & %var% ;"),
            return_addr: Pattern::new("return & %var% ;"),
        }
    }

    /// Parameter varids of a function: declarations between the header
    /// parens.
    fn parameter_ids(list: &TokenList, name_tok: TokenId) -> HashSet<u32> {
        let mut params = HashSet::new();
        let Some(open) = list.next(name_tok) else { return params };
        let Some(close) = list.link(open) else { return params };
        let mut cur = list.next(open);
        while let Some(id) = cur {
            if id == close {
                break;
            }
            if let Some(var_id) = list.get(id).var_id {
                params.insert(var_id);
            }
            cur = list.next(id);
        }
        params
    }

    /// Local varids: everything declared or used inside the body that is
    /// not a parameter.
    fn local_ids(list: &TokenList, body: TokenId, params: &HashSet<u32>) -> HashSet<u32> {
        let mut locals = HashSet::new();
        let Some(close) = list.link(body) else { return locals };
        let mut cur = list.next(body);
        while let Some(id) = cur {
            if id == close {
                break;
            }
            if let Some(var_id) = list.get(id).var_id {
                if !params.contains(&var_id) {
                    locals.insert(var_id);
                }
            }
            cur = list.next(id);
        }
        locals
    }
}

impl Default for AutoVariablesCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for AutoVariablesCheck {
    fn name(&self) -> &'static str {
        "AutoVariables"
    }

    fn run(&mut self, list: &TokenList, settings: &Settings, logger: &mut dyn ErrorLogger) {
        for (name_tok, body) in function_bodies(list) {
            if settings.is_terminated() {
                return;
            }
            let params = Self::parameter_ids(list, name_tok);
            let locals = Self::local_ids(list, body, &params);
            let Some(close) = list.link(body) else { continue };

            let mut cur = list.next(body);
            while let Some(id) = cur {
                if id == close {
                    break;
                }
                // *param = &local;
                if self.deref_store.matches(list, id) {
                    let target = list.advance(id, 1).unwrap();
                    let source = list.advance(id, 4).unwrap();
                    if let (Some(t), Some(s)) =
                        (list.get(target).var_id, list.get(source).var_id)
                    {
                        if params.contains(&t) && locals.contains(&s) {
                            logger.report_err(&ErrorMessage::at(
                                Severity::Error,
                                "autoVariables",
                                "Assigning address of local auto-variable to a function parameter.",
                                list.file_of(id),
                                list.get(id).line,
                            ));
                        }
                    }
                }
                // param[i] = &local;
                if self.index_store.matches(list, id) {
                    let source = list.advance(id, 5).unwrap();
                    if let (Some(t), Some(s)) = (list.get(id).var_id, list.get(source).var_id) {
                        if params.contains(&t) && locals.contains(&s) {
                            logger.report_err(&ErrorMessage::at(
                                Severity::Error,
                                "autoVariables",
                                "Assigning address of local auto-variable to a function parameter.",
                                list.file_of(id),
                                list.get(id).line,
                            ));
                        }
                    }
                }
                // return &local;
                if self.return_addr.matches(list, id) {
                    let source = list.advance(id, 2).unwrap();
                    if let Some(s) = list.get(source).var_id {
                        if locals.contains(&s) {
                            logger.report_err(&ErrorMessage::at(
                                Severity::Error,
                                "returnAddressOfAutoVariable",
                                "Returning address of local auto-variable.",
                                list.file_of(id),
                                list.get(id).line,
                            ));
                        }
                    }
                }
                cur = list.next(id);
            }
        }
    }

    fn report_examples(&self, logger: &mut dyn ErrorLogger) {
        logger.report_err(&ErrorMessage::bare(
            Severity::Error,
            "autoVariables",
            "Assigning address of local auto-variable to a function parameter.",
        ));
        logger.report_err(&ErrorMessage::bare(
            Severity::Error,
            "returnAddressOfAutoVariable",
            "Returning address of local auto-variable.",
        ));
    }
}
