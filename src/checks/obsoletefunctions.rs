//! Obsolete function calls, a pure table-driven pattern match. The base
//! table is always checked; the POSIX entries join in when the posix
//! standard is selected.

use crate::check::Check;
use crate::errorlogger::{ErrorLogger, ErrorMessage, Severity};
use crate::settings::Settings;
use crate::token::{TokenId, TokenKind, TokenList};

/// (name, replacement hint)
const OBSOLETE_STANDARD: &[(&str, &str)] = &[
    ("gets", "fgets"),
    ("mktemp", "mkstemp"),
    ("tmpnam", "tmpfile"),
];

const OBSOLETE_POSIX: &[(&str, &str)] = &[
    ("bsd_signal", "sigaction"),
    ("gethostbyaddr", "getnameinfo"),
    ("gethostbyname", "getaddrinfo"),
    ("usleep", "nanosleep"),
    ("bcmp", "memcmp"),
    ("bcopy", "memmove"),
    ("bzero", "memset"),
    ("ecvt", "sprintf"),
    ("fcvt", "sprintf"),
    ("gcvt", "sprintf"),
    ("getwd", "getcwd"),
    ("index", "strchr"),
    ("rindex", "strrchr"),
    ("ualarm", "setitimer"),
    ("vfork", "fork"),
];

pub struct ObsoleteFunctionsCheck;

impl ObsoleteFunctionsCheck {
    pub fn new() -> Self {
        ObsoleteFunctionsCheck
    }

    /// A call site: `name (` not preceded by member access, scope
    /// qualification, or a type (which would make it a declaration).
    fn is_call(list: &TokenList, id: TokenId) -> bool {
        if list.next(id).map(|n| list.is_str(n, "(")) != Some(true) {
            return false;
        }
        match list.prev(id) {
            None => true,
            Some(p) => {
                !matches!(list.str_of(p), "." | "->" | "::" | "*" | "&")
                    && !matches!(list.kind(p), TokenKind::Type)
            }
        }
    }
}

impl Default for ObsoleteFunctionsCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for ObsoleteFunctionsCheck {
    fn name(&self) -> &'static str {
        "ObsoleteFunctions"
    }

    fn run(&mut self, list: &TokenList, settings: &Settings, logger: &mut dyn ErrorLogger) {
        if !settings.severity_enabled(Severity::Style) {
            return;
        }
        for id in list.ids() {
            if settings.is_terminated() {
                return;
            }
            if list.kind(id) != TokenKind::Name {
                continue;
            }
            let text = list.str_of(id);
            let entry = OBSOLETE_STANDARD
                .iter()
                .find(|(name, _)| *name == text)
                .or_else(|| {
                    if settings.standards.posix {
                        OBSOLETE_POSIX.iter().find(|(name, _)| *name == text)
                    } else {
                        None
                    }
                });
            let Some((name, replacement)) = entry else { continue };
            if !Self::is_call(list, id) {
                continue;
            }
            logger.report_err(&ErrorMessage::at(
                Severity::Style,
                &format!("obsoleteFunctions{}", name),
                &format!(
                    "Found obsolete function '{}'. It is recommended to use the function '{}' instead.",
                    name, replacement
                ),
                list.file_of(id),
                list.get(id).line,
            ));
        }
    }

    fn report_examples(&self, logger: &mut dyn ErrorLogger) {
        for (name, replacement) in OBSOLETE_STANDARD.iter().chain(OBSOLETE_POSIX) {
            logger.report_err(&ErrorMessage::bare(
                Severity::Style,
                &format!("obsoleteFunctions{}", name),
                &format!(
                    "Found obsolete function '{}'. It is recommended to use the function '{}' instead.",
                    name, replacement
                ),
            ));
        }
    }
}
