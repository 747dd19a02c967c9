//! Cross-file unused function detection.
//!
//! `run` accumulates definitions and call sites file by file; the verdict
//! waits until `finalize`, after the orchestrator has fed every file
//! through. A non-static function that is defined but never named anywhere
//! else (and is not `main`) is reported.

use std::collections::{HashMap, HashSet};

use crate::check::Check;
use crate::errorlogger::{ErrorLogger, ErrorMessage, Severity};
use crate::executionpath::function_bodies;
use crate::settings::{Enable, Settings};
use crate::token::{TokenId, TokenKind, TokenList};

pub struct UnusedFunctionsCheck {
    /// name -> definition location
    defined: HashMap<String, (String, u32)>,
    used: HashSet<String>,
}

impl UnusedFunctionsCheck {
    pub fn new() -> Self {
        UnusedFunctionsCheck {
            defined: HashMap::new(),
            used: HashSet::new(),
        }
    }

    /// `static` anywhere in the declaration prefix makes the function
    /// file-local, which this cross-file check ignores.
    fn is_static(list: &TokenList, name_tok: TokenId) -> bool {
        let mut cur = list.prev(name_tok);
        while let Some(id) = cur {
            match list.str_of(id) {
                ";" | "}" | "{" => return false,
                "static" => return true,
                _ => {}
            }
            cur = list.prev(id);
        }
        false
    }
}

impl Default for UnusedFunctionsCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for UnusedFunctionsCheck {
    fn name(&self) -> &'static str {
        "UnusedFunctions"
    }

    fn run(&mut self, list: &TokenList, _settings: &Settings, _logger: &mut dyn ErrorLogger) {
        let mut definition_names: HashSet<TokenId> = HashSet::new();
        for (name_tok, _) in function_bodies(list) {
            definition_names.insert(name_tok);
            // methods and qualified definitions are out of scope here
            let qualified = list
                .prev(name_tok)
                .map(|p| list.is_str(p, "::"))
                .unwrap_or(false);
            if qualified || Self::is_static(list, name_tok) {
                continue;
            }
            let name = list.str_of(name_tok).to_string();
            self.defined.entry(name).or_insert_with(|| {
                (
                    list.file_of(name_tok).to_string(),
                    list.get(name_tok).line,
                )
            });
        }

        for id in list.ids() {
            if list.kind(id) != TokenKind::Name || definition_names.contains(&id) {
                continue;
            }
            self.used.insert(list.str_of(id).to_string());
        }
    }

    fn finalize(&mut self, settings: &Settings, logger: &mut dyn ErrorLogger) {
        if !settings.is_enabled(Enable::UnusedFunction) {
            return;
        }
        let mut unused: Vec<(&String, &(String, u32))> = self
            .defined
            .iter()
            .filter(|(name, _)| *name != "main" && !self.used.contains(*name))
            .collect();
        unused.sort_by(|a, b| (&a.1 .0, a.1 .1).cmp(&(&b.1 .0, b.1 .1)));
        for (name, (file, line)) in unused {
            logger.report_err(&ErrorMessage::at(
                Severity::Style,
                "unusedFunction",
                &format!("The function '{}' is never used.", name),
                file,
                *line,
            ));
        }
    }

    fn report_examples(&self, logger: &mut dyn ErrorLogger) {
        logger.report_err(&ErrorMessage::bare(
            Severity::Style,
            "unusedFunction",
            "The function 'f' is never used.",
        ));
    }
}
