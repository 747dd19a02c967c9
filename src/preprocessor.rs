//! Conditional-compilation expansion.
//!
//! One input file becomes 1..N configurations, each a fully expanded,
//! include-inlined source text ready for the lexer. The stages: strip
//! comments (collecting inline suppressions), join line continuations,
//! inline `#include`s between `#file`/`#endfile` sentinels, enumerate the
//! interesting `#ifdef` configurations, then for each configuration process
//! directives and expand macros. Line counts are preserved at every stage so
//! diagnostics point into the original file.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errorlogger::{ErrorLogger, ErrorMessage, Severity};
use crate::filelister::FileLister;
use crate::settings::Settings;
use crate::suppressions::{Suppression, Suppressions};

/// Headers assumed to exist when the matching standard is enabled; angle
/// includes of these are never reported missing.
const C_HEADERS: &[&str] = &[
    "assert.h", "ctype.h", "errno.h", "float.h", "limits.h", "locale.h",
    "math.h", "setjmp.h", "signal.h", "stdarg.h", "stddef.h", "stdio.h",
    "stdlib.h", "string.h", "time.h", "wchar.h", "wctype.h", "stdint.h",
];
const CPP_HEADERS: &[&str] = &[
    "algorithm", "bitset", "deque", "exception", "fstream", "functional",
    "iomanip", "ios", "iosfwd", "iostream", "istream", "iterator", "limits",
    "list", "locale", "map", "memory", "new", "numeric", "ostream", "queue",
    "set", "sstream", "stack", "stdexcept", "streambuf", "string", "typeinfo",
    "utility", "valarray", "vector", "cassert", "cctype", "cerrno", "cfloat",
    "climits", "cmath", "csetjmp", "csignal", "cstdarg", "cstddef", "cstdio",
    "cstdlib", "cstring", "ctime", "cwchar", "cwctype",
];
const POSIX_HEADERS: &[&str] = &[
    "unistd.h", "fcntl.h", "dirent.h", "pthread.h", "sys/types.h",
    "sys/stat.h", "sys/time.h", "sys/wait.h", "netinet/in.h", "arpa/inet.h",
];

/// Hard cap on distinct condition macros considered for enumeration; past
/// this the subset space is not worth walking even under --force.
const MAX_CONFIG_MACROS: usize = 20;

#[derive(Debug, Clone)]
pub struct Configuration {
    pub name: String,
    pub code: String,
}

#[derive(Debug)]
pub struct Preprocessed {
    pub configs: Vec<Configuration>,
    pub suppressions: Suppressions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreprocessError {
    UnbalancedConditional { file: String, line: u32 },
    Terminated,
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreprocessError::UnbalancedConditional { file, line } => {
                write!(f, "mismatching #if and #endif in {} at line {}", file, line)
            }
            PreprocessError::Terminated => write!(f, "analysis terminated"),
        }
    }
}

impl std::error::Error for PreprocessError {}

#[derive(Debug, Clone)]
struct MacroDef {
    params: Option<Vec<String>>,
    body: String,
}

enum ConfigAbort {
    Unbalanced { line: u32 },
    ErrorDirective { line: u32, msg: String },
}

pub struct Preprocessor<'a> {
    settings: &'a Settings,
    lister: &'a dyn FileLister,
}

impl<'a> Preprocessor<'a> {
    pub fn new(settings: &'a Settings, lister: &'a dyn FileLister) -> Self {
        Preprocessor { settings, lister }
    }

    /// Run the whole preprocessing pipeline for one file.
    pub fn preprocess(
        &self,
        text: &str,
        path: &str,
        logger: &mut dyn ErrorLogger,
    ) -> Result<Preprocessed, PreprocessError> {
        let mut suppressions = Suppressions::new();
        let code = self.read_code(text, path, &mut suppressions);

        let mut included = HashSet::new();
        included.insert(path.to_string());
        let mut missing = HashSet::new();
        let code = self.handle_includes(
            &code,
            path,
            logger,
            &mut included,
            &mut missing,
            &mut suppressions,
        );

        let macros = self.collect_config_macros(&code);
        let configs = self.enumerate_configs(&code, path, &macros, logger)?;

        Ok(Preprocessed {
            configs,
            suppressions,
        })
    }

    /// Comment stripping and continuation joining, both line-count
    /// preserving. Inline suppression comments are collected here, while
    /// the comment text still exists.
    pub fn read_code(&self, text: &str, path: &str, suppressions: &mut Suppressions) -> String {
        let joined = join_continuations(&text.replace("\r\n", "\n").replace('\r', "\n"));
        strip_comments(
            &joined,
            path,
            self.settings.inline_suppressions,
            suppressions,
        )
    }

    fn resolve_include(&self, header: &str, quoted: bool, current: &str) -> Option<PathBuf> {
        if quoted {
            let dir = Path::new(current).parent().unwrap_or_else(|| Path::new(""));
            let candidate = if dir.as_os_str().is_empty() {
                PathBuf::from(header)
            } else {
                dir.join(header)
            };
            if self.lister.open(&candidate).is_ok() {
                return Some(candidate);
            }
        }
        for root in &self.settings.include_paths {
            let candidate = root.join(header);
            if self.lister.open(&candidate).is_ok() {
                return Some(candidate);
            }
        }
        None
    }

    fn header_is_known(&self, header: &str) -> bool {
        let std = &self.settings.standards;
        (std.c && C_HEADERS.contains(&header))
            || (std.cpp && CPP_HEADERS.contains(&header))
            || (std.posix && POSIX_HEADERS.contains(&header))
    }

    /// Inline every resolvable include, wrapping the content in
    /// `#file`/`#endfile` sentinels. Each file is inlined at most once per
    /// translation unit, which also cuts include cycles.
    fn handle_includes(
        &self,
        code: &str,
        path: &str,
        logger: &mut dyn ErrorLogger,
        included: &mut HashSet<String>,
        missing: &mut HashSet<String>,
        suppressions: &mut Suppressions,
    ) -> String {
        let mut out = String::new();
        for (idx, line) in code.split('\n').enumerate() {
            let line_no = (idx + 1) as u32;
            let trimmed = line.trim_start();
            let header = match parse_include(trimmed) {
                Some(h) => h,
                None => {
                    out.push_str(line);
                    out.push('\n');
                    continue;
                }
            };
            let (name, quoted) = header;
            match self.resolve_include(&name, quoted, path) {
                Some(resolved) => {
                    let key = resolved.to_string_lossy().to_string();
                    if !included.insert(key.clone()) {
                        out.push('\n');
                        continue;
                    }
                    match self.lister.open(&resolved) {
                        Ok(content) => {
                            let content = self.read_code(&content, &key, suppressions);
                            let inner = self.handle_includes(
                                &content,
                                &key,
                                logger,
                                included,
                                missing,
                                suppressions,
                            );
                            out.push_str(&format!("#file \"{}\"\n", key));
                            out.push_str(inner.trim_end_matches('\n'));
                            out.push_str("\n#endfile\n");
                        }
                        Err(_) => {
                            self.report_missing(&name, path, line_no, missing, logger);
                            out.push('\n');
                        }
                    }
                }
                None => {
                    if !self.header_is_known(&name) {
                        self.report_missing(&name, path, line_no, missing, logger);
                    }
                    out.push('\n');
                }
            }
        }
        // keep the original line count: no trailing growth
        out.truncate(out.trim_end_matches('\n').len());
        out.push('\n');
        out
    }

    fn report_missing(
        &self,
        name: &str,
        path: &str,
        line: u32,
        missing: &mut HashSet<String>,
        logger: &mut dyn ErrorLogger,
    ) {
        if missing.insert(name.to_string()) {
            logger.report_err(&ErrorMessage::at(
                Severity::Information,
                "missingInclude",
                &format!("Include file: \"{}\" not found.", name),
                path,
                line,
            ));
        }
    }

    /// Macro names appearing in `#if*` conditions that the translation unit
    /// never defines itself (this skips include guards) and that the user
    /// has not pinned with -D or -U. First-encounter order.
    pub fn collect_config_macros(&self, code: &str) -> Vec<String> {
        let mut defined_here = HashSet::new();
        for line in code.split('\n') {
            let trimmed = line.trim_start();
            if let Some(rest) = directive_body(trimmed, "define") {
                if let Some(name) = first_identifier(rest) {
                    defined_here.insert(name.to_string());
                }
            }
            if let Some(rest) = directive_body(trimmed, "undef") {
                if let Some(name) = first_identifier(rest) {
                    defined_here.insert(name.to_string());
                }
            }
        }

        let user_defined: HashSet<String> = self
            .settings
            .user_defines
            .iter()
            .map(|d| d.split('=').next().unwrap_or("").to_string())
            .collect();
        let user_undefined: HashSet<&String> = self.settings.user_undefs.iter().collect();

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for line in code.split('\n') {
            let trimmed = line.trim_start();
            let condition = if let Some(rest) = directive_body(trimmed, "ifdef") {
                rest
            } else if let Some(rest) = directive_body(trimmed, "ifndef") {
                rest
            } else if let Some(rest) = directive_body(trimmed, "if") {
                rest
            } else if let Some(rest) = directive_body(trimmed, "elif") {
                rest
            } else {
                continue;
            };
            for name in condition_identifiers(condition) {
                if name == "defined"
                    || defined_here.contains(&name)
                    || user_defined.contains(&name)
                    || user_undefined.contains(&name)
                {
                    continue;
                }
                if seen.insert(name.clone()) {
                    result.push(name);
                }
            }
        }
        result.truncate(MAX_CONFIG_MACROS);
        result
    }

    /// Enumerate configuration subsets by binary counting (first-seen macro
    /// is the least significant bit), dropping subsets whose expanded text
    /// duplicates an earlier one, and honoring `max_configs` unless --force.
    fn enumerate_configs(
        &self,
        code: &str,
        path: &str,
        macros: &[String],
        logger: &mut dyn ErrorLogger,
    ) -> Result<Vec<Configuration>, PreprocessError> {
        let mask_count: u64 = 1u64 << macros.len();
        let mut configs = Vec::new();
        let mut seen_texts = HashSet::new();
        let mut truncated = false;

        for mask in 0..mask_count {
            if self.settings.is_terminated() {
                return Err(PreprocessError::Terminated);
            }
            if !self.settings.force && configs.len() >= self.settings.max_configs {
                truncated = true;
                break;
            }
            let members: Vec<&str> = macros
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1u64 << i) != 0)
                .map(|(_, m)| m.as_str())
                .collect();
            let name = members.join(";");
            match self.process_directives(code, &members) {
                Ok(expanded) => {
                    if seen_texts.insert(expanded.clone()) {
                        configs.push(Configuration {
                            name,
                            code: expanded,
                        });
                    }
                }
                Err(ConfigAbort::Unbalanced { line }) => {
                    logger.report_err(&ErrorMessage::at(
                        Severity::Error,
                        "syntaxError",
                        "mismatching #if and #endif",
                        path,
                        line,
                    ));
                    return Err(PreprocessError::UnbalancedConditional {
                        file: path.to_string(),
                        line,
                    });
                }
                Err(ConfigAbort::ErrorDirective { line, msg }) => {
                    logger.report_err(&ErrorMessage::at(
                        Severity::Debug,
                        "preprocessorErrorDirective",
                        &format!("#error {}", msg),
                        path,
                        line,
                    ));
                }
            }
        }

        if truncated {
            logger.report_err(&ErrorMessage::at(
                Severity::Information,
                "tooManyConfigs",
                &format!(
                    "Too many #ifdef configurations - only {} checked; use --force to check all.",
                    self.settings.max_configs
                ),
                path,
                0,
            ));
        }
        Ok(configs)
    }

    /// Apply conditional directives and macro expansion for one set of
    /// predefined configuration macros. Directive lines become blank lines;
    /// inactive regions become blank lines; `#file` sentinels pass through.
    fn process_directives(&self, code: &str, config: &[&str]) -> Result<String, ConfigAbort> {
        let mut defines: HashMap<String, MacroDef> = HashMap::new();
        for name in config {
            defines.insert(
                name.to_string(),
                MacroDef {
                    params: None,
                    body: "1".to_string(),
                },
            );
        }
        for def in &self.settings.user_defines {
            let (name, value) = match def.split_once('=') {
                Some((n, v)) => (n.to_string(), v.to_string()),
                None => (def.clone(), "1".to_string()),
            };
            defines.insert(
                name,
                MacroDef {
                    params: None,
                    body: value,
                },
            );
        }
        let undefs: HashSet<&String> = self.settings.user_undefs.iter().collect();

        struct Frame {
            parent_active: bool,
            taken: bool,
            active: bool,
        }
        let mut stack: Vec<Frame> = Vec::new();
        let mut out = String::new();

        for (idx, line) in code.split('\n').enumerate() {
            let line_no = (idx + 1) as u32;
            let active = stack.last().map(|f| f.active).unwrap_or(true);
            let trimmed = line.trim_start();

            if trimmed.starts_with("#file") || trimmed.starts_with("#endfile") {
                out.push_str(trimmed);
                out.push('\n');
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix('#') {
                let rest = rest.trim_start();
                if let Some(cond) = directive_tail(rest, "ifdef") {
                    let name = first_identifier(cond).unwrap_or("");
                    let value = active && defines.contains_key(name);
                    stack.push(Frame {
                        parent_active: active,
                        taken: value,
                        active: value,
                    });
                } else if let Some(cond) = directive_tail(rest, "ifndef") {
                    let name = first_identifier(cond).unwrap_or("");
                    let value = active && !defines.contains_key(name);
                    stack.push(Frame {
                        parent_active: active,
                        taken: value,
                        active: value,
                    });
                } else if let Some(cond) = directive_tail(rest, "if") {
                    let value = active && eval_condition(cond, &defines);
                    stack.push(Frame {
                        parent_active: active,
                        taken: value,
                        active: value,
                    });
                } else if let Some(cond) = directive_tail(rest, "elif") {
                    match stack.last_mut() {
                        Some(frame) => {
                            let value =
                                frame.parent_active && !frame.taken && eval_condition(cond, &defines);
                            frame.active = value;
                            frame.taken |= value;
                        }
                        None => return Err(ConfigAbort::Unbalanced { line: line_no }),
                    }
                } else if rest == "else" || rest.starts_with("else") {
                    match stack.last_mut() {
                        Some(frame) => {
                            frame.active = frame.parent_active && !frame.taken;
                            frame.taken = true;
                        }
                        None => return Err(ConfigAbort::Unbalanced { line: line_no }),
                    }
                } else if rest == "endif" || rest.starts_with("endif") {
                    if stack.pop().is_none() {
                        return Err(ConfigAbort::Unbalanced { line: line_no });
                    }
                } else if let Some(body) = directive_tail(rest, "define") {
                    if active {
                        if let Some((name, def)) = parse_define(body) {
                            if !undefs.contains(&name) {
                                defines.insert(name, def);
                            }
                        }
                    }
                } else if let Some(body) = directive_tail(rest, "undef") {
                    if active {
                        if let Some(name) = first_identifier(body) {
                            defines.remove(name);
                        }
                    }
                } else if let Some(body) = directive_tail(rest, "error") {
                    if active {
                        return Err(ConfigAbort::ErrorDirective {
                            line: line_no,
                            msg: body.trim().to_string(),
                        });
                    }
                }
                // every directive line becomes a blank line
                out.push('\n');
                continue;
            }

            if active {
                out.push_str(&expand_line(line, &defines));
            }
            out.push('\n');
        }

        if !stack.is_empty() {
            return Err(ConfigAbort::Unbalanced {
                line: code.split('\n').count() as u32,
            });
        }
        // split('\n') yields one extra empty tail element
        out.truncate(out.trim_end_matches('\n').len());
        out.push('\n');
        Ok(out)
    }
}

/// `#include "x"` -> (x, true); `#include <x>` -> (x, false).
fn parse_include(line: &str) -> Option<(String, bool)> {
    let rest = directive_body(line, "include")?;
    let rest = rest.trim();
    if let Some(inner) = rest.strip_prefix('"') {
        let end = inner.find('"')?;
        return Some((inner[..end].to_string(), true));
    }
    if let Some(inner) = rest.strip_prefix('<') {
        let end = inner.find('>')?;
        return Some((inner[..end].to_string(), false));
    }
    None
}

/// Body of `#name ...` when `line` is that directive (whole-word match).
fn directive_body<'t>(line: &'t str, name: &str) -> Option<&'t str> {
    let rest = line.strip_prefix('#')?.trim_start();
    directive_tail(rest, name)
}

fn directive_tail<'t>(rest: &'t str, name: &str) -> Option<&'t str> {
    let tail = rest.strip_prefix(name)?;
    if tail.is_empty() || tail.starts_with(|c: char| c.is_whitespace() || c == '(') {
        Some(tail)
    } else {
        None
    }
}

fn first_identifier(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c.is_ascii_alphabetic() || c == '_')?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

fn condition_identifiers(condition: &str) -> Vec<String> {
    let mut out = Vec::new();
    let bytes = condition.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len()
                && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
            {
                i += 1;
            }
            out.push(condition[start..i].to_string());
        } else if c.is_ascii_digit() {
            // skip the whole literal so 0x1f does not yield an identifier
            while i < bytes.len() && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'.')
            {
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    out
}

/// Join backslash continuations, padding with blank lines so the total
/// line count never changes.
fn join_continuations(text: &str) -> String {
    let mut out = String::new();
    let mut joined = String::new();
    let mut pending_blanks = 0usize;
    for line in text.split('\n') {
        if let Some(stripped) = line.strip_suffix('\\') {
            joined.push_str(stripped);
            pending_blanks += 1;
            continue;
        }
        joined.push_str(line);
        out.push_str(&joined);
        out.push('\n');
        for _ in 0..pending_blanks {
            out.push('\n');
        }
        joined.clear();
        pending_blanks = 0;
    }
    if !joined.is_empty() {
        out.push_str(&joined);
        out.push('\n');
    }
    out.truncate(out.trim_end_matches('\n').len());
    out.push('\n');
    out
}

/// Remove comments, emitting a newline for every newline consumed. Inline
/// suppression comments register against the following line.
fn strip_comments(
    text: &str,
    path: &str,
    inline_suppressions: bool,
    suppressions: &mut Suppressions,
) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut line: u32 = 1;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
            let end = text[i..].find('\n').map(|o| i + o).unwrap_or(bytes.len());
            record_suppression(&text[i + 2..end], path, line + 1, inline_suppressions, suppressions);
            i = end;
        } else if c == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            let end = text[i + 2..]
                .find("*/")
                .map(|o| i + 2 + o + 2)
                .unwrap_or(bytes.len());
            let body = &text[i + 2..end.saturating_sub(2).max(i + 2)];
            let newlines = body.matches('\n').count() as u32;
            record_suppression(body, path, line + newlines + 1, inline_suppressions, suppressions);
            for _ in 0..newlines {
                out.push('\n');
            }
            line += newlines;
            i = end;
        } else if c == b'"' || c == b'\'' {
            let quote = c;
            let start = i;
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b'\\' && i + 1 < bytes.len() {
                    i += 2;
                    continue;
                }
                if bytes[i] == quote || bytes[i] == b'\n' {
                    i += 1;
                    break;
                }
                i += 1;
            }
            let end = i.min(bytes.len());
            out.push_str(&text[start..end]);
            line += text[start..end].matches('\n').count() as u32;
        } else {
            if c == b'\n' {
                line += 1;
            }
            // step whole UTF-8 sequences so multibyte text survives intact
            let ch = text[i..].chars().next().unwrap_or(' ');
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    out
}

fn record_suppression(
    comment: &str,
    path: &str,
    next_line: u32,
    enabled: bool,
    suppressions: &mut Suppressions,
) {
    if !enabled {
        return;
    }
    let trimmed = comment.trim();
    if let Some(rest) = trimmed.strip_prefix("cppcheck-suppress") {
        if let Some(id) = rest.split_whitespace().next() {
            suppressions.add(Suppression::inline(id, path, next_line));
        }
    }
}

fn parse_define(body: &str) -> Option<(String, MacroDef)> {
    let body = body.trim_start();
    let name = first_identifier(body)?;
    if !body.starts_with(name) {
        return None;
    }
    let rest = &body[name.len()..];
    if let Some(params_part) = rest.strip_prefix('(') {
        let close = params_part.find(')')?;
        let params: Vec<String> = params_part[..close]
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        let macro_body = params_part[close + 1..].trim().to_string();
        Some((
            name.to_string(),
            MacroDef {
                params: Some(params),
                body: macro_body,
            },
        ))
    } else {
        Some((
            name.to_string(),
            MacroDef {
                params: None,
                body: rest.trim().to_string(),
            },
        ))
    }
}

// ---------------------------------------------------------------------------
// macro expansion
// ---------------------------------------------------------------------------

fn is_ident(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
}

/// Split a line into preprocessing tokens: identifiers, numbers, string and
/// char literals, and operators.
fn pp_tokens(line: &str) -> Vec<String> {
    let bytes = line.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
        } else if c == b'_' || c.is_ascii_alphabetic() {
            let start = i;
            while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                i += 1;
            }
            out.push(line[start..i].to_string());
        } else if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                i += 1;
            }
            out.push(line[start..i].to_string());
        } else if c == b'"' || c == b'\'' {
            let quote = c;
            let start = i;
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b'\\' {
                    i += 2;
                    continue;
                }
                if bytes[i] == quote {
                    i += 1;
                    break;
                }
                i += 1;
            }
            out.push(line[start..i.min(bytes.len())].to_string());
        } else {
            let mut matched = false;
            for op in &["##", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||"] {
                if line[i..].starts_with(op) {
                    out.push(op.to_string());
                    i += op.len();
                    matched = true;
                    break;
                }
            }
            if !matched {
                out.push((c as char).to_string());
                i += 1;
            }
        }
    }
    out
}

fn expand_line(line: &str, defines: &HashMap<String, MacroDef>) -> String {
    if defines.is_empty() {
        return line.to_string();
    }
    let tokens = pp_tokens(line);
    if !tokens.iter().any(|t| defines.contains_key(t)) {
        return line.to_string();
    }
    let mut expanding = Vec::new();
    let expanded = expand_tokens(&tokens, defines, &mut expanding);
    expanded.join(" ")
}

/// Expand macros in a token sequence. A macro currently being expanded is
/// treated as a plain identifier, which cuts self-recursion.
fn expand_tokens(
    tokens: &[String],
    defines: &HashMap<String, MacroDef>,
    expanding: &mut Vec<String>,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        let def = if is_ident(tok) && !expanding.contains(tok) {
            defines.get(tok)
        } else {
            None
        };
        let def = match def {
            Some(d) => d,
            None => {
                out.push(tok.clone());
                i += 1;
                continue;
            }
        };
        match &def.params {
            None => {
                let body_tokens = pp_tokens(&def.body);
                expanding.push(tok.clone());
                let expanded = expand_tokens(&body_tokens, defines, expanding);
                expanding.pop();
                out.extend(expanded);
                i += 1;
            }
            Some(params) => {
                if tokens.get(i + 1).map(|t| t.as_str()) != Some("(") {
                    out.push(tok.clone());
                    i += 1;
                    continue;
                }
                let (args, next) = match collect_args(tokens, i + 1) {
                    Some(v) => v,
                    None => {
                        out.push(tok.clone());
                        i += 1;
                        continue;
                    }
                };
                let substituted = substitute_params(&def.body, params, &args);
                expanding.push(tok.clone());
                let expanded = expand_tokens(&substituted, defines, expanding);
                expanding.pop();
                out.extend(expanded);
                i = next;
            }
        }
    }
    out
}

/// Collect the argument token lists of a function-like invocation starting
/// at the `(`. Returns (args, index-after-close-paren).
fn collect_args(tokens: &[String], open: usize) -> Option<(Vec<Vec<String>>, usize)> {
    let mut args: Vec<Vec<String>> = vec![Vec::new()];
    let mut depth = 0usize;
    let mut i = open;
    loop {
        let tok = tokens.get(i)?;
        match tok.as_str() {
            "(" => {
                depth += 1;
                if depth > 1 {
                    args.last_mut().unwrap().push(tok.clone());
                }
            }
            ")" => {
                depth -= 1;
                if depth == 0 {
                    if args.len() == 1 && args[0].is_empty() {
                        args.clear();
                    }
                    return Some((args, i + 1));
                }
                args.last_mut().unwrap().push(tok.clone());
            }
            "," if depth == 1 => args.push(Vec::new()),
            _ => args.last_mut().unwrap().push(tok.clone()),
        }
        i += 1;
    }
}

/// Parameter substitution with `#` stringize and `##` paste.
fn substitute_params(body: &str, params: &[String], args: &[Vec<String>]) -> Vec<String> {
    let body_tokens = pp_tokens(body);
    let arg_of = |name: &str| -> Option<&Vec<String>> {
        params.iter().position(|p| p == name).map(|i| {
            static EMPTY: Vec<String> = Vec::new();
            args.get(i).unwrap_or(&EMPTY)
        })
    };

    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    while i < body_tokens.len() {
        let tok = &body_tokens[i];
        if tok == "#" && i + 1 < body_tokens.len() {
            if let Some(arg) = arg_of(&body_tokens[i + 1]) {
                out.push(format!("\"{}\"", arg.join(" ").replace('"', "\\\"")));
                i += 2;
                continue;
            }
        }
        if tok == "##" {
            // paste previous output token with the next (substituted) token
            let next = body_tokens.get(i + 1).cloned().unwrap_or_default();
            let next_text = match arg_of(&next) {
                Some(arg) => arg.join(""),
                None => next,
            };
            if let Some(last) = out.last_mut() {
                last.push_str(&next_text);
            } else {
                out.push(next_text);
            }
            i += 2;
            continue;
        }
        match arg_of(tok) {
            Some(arg) => out.extend(arg.iter().cloned()),
            None => out.push(tok.clone()),
        }
        i += 1;
    }
    out
}

// ---------------------------------------------------------------------------
// #if expression evaluation
// ---------------------------------------------------------------------------

/// Evaluate a `#if`/`#elif` condition. `defined` is resolved first, macros
/// are expanded, and any identifier left evaluates to 0.
pub fn eval_condition(condition: &str, defines: &HashMap<String, MacroDef>) -> bool {
    let tokens = pp_tokens(condition);
    let mut resolved: Vec<String> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i] == "defined" {
            if tokens.get(i + 1).map(|t| t.as_str()) == Some("(") {
                if let Some(name) = tokens.get(i + 2) {
                    resolved.push(if defines.contains_key(name) { "1" } else { "0" }.to_string());
                }
                i += 4; // defined ( X )
                continue;
            }
            if let Some(name) = tokens.get(i + 1) {
                resolved.push(if defines.contains_key(name) { "1" } else { "0" }.to_string());
                i += 2;
                continue;
            }
        }
        resolved.push(tokens[i].clone());
        i += 1;
    }
    let mut expanding = Vec::new();
    let expanded = expand_tokens(&resolved, defines, &mut expanding);
    let mut parser = CondParser {
        tokens: &expanded,
        pos: 0,
    };
    let value = parser.ternary();
    value.map(|v| v != 0).unwrap_or(false)
}

struct CondParser<'t> {
    tokens: &'t [String],
    pos: usize,
}

impl<'t> CondParser<'t> {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(|s| s.as_str())
    }

    fn bump(&mut self) -> Option<&'t str> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(tok)
    }

    fn ternary(&mut self) -> Option<i64> {
        let cond = self.logical_or()?;
        if self.peek() == Some("?") {
            self.bump();
            let then = self.ternary()?;
            if self.peek() != Some(":") {
                return None;
            }
            self.bump();
            let otherwise = self.ternary()?;
            return Some(if cond != 0 { then } else { otherwise });
        }
        Some(cond)
    }

    fn logical_or(&mut self) -> Option<i64> {
        let mut left = self.logical_and()?;
        while self.peek() == Some("||") {
            self.bump();
            let right = self.logical_and()?;
            left = (left != 0 || right != 0) as i64;
        }
        Some(left)
    }

    fn logical_and(&mut self) -> Option<i64> {
        let mut left = self.bit_or()?;
        while self.peek() == Some("&&") {
            self.bump();
            let right = self.bit_or()?;
            left = (left != 0 && right != 0) as i64;
        }
        Some(left)
    }

    fn bit_or(&mut self) -> Option<i64> {
        let mut left = self.bit_xor()?;
        while self.peek() == Some("|") {
            self.bump();
            left |= self.bit_xor()?;
        }
        Some(left)
    }

    fn bit_xor(&mut self) -> Option<i64> {
        let mut left = self.bit_and()?;
        while self.peek() == Some("^") {
            self.bump();
            left ^= self.bit_and()?;
        }
        Some(left)
    }

    fn bit_and(&mut self) -> Option<i64> {
        let mut left = self.equality()?;
        while self.peek() == Some("&") {
            self.bump();
            left &= self.equality()?;
        }
        Some(left)
    }

    fn equality(&mut self) -> Option<i64> {
        let mut left = self.relational()?;
        loop {
            match self.peek() {
                Some("==") => {
                    self.bump();
                    left = (left == self.relational()?) as i64;
                }
                Some("!=") => {
                    self.bump();
                    left = (left != self.relational()?) as i64;
                }
                _ => return Some(left),
            }
        }
    }

    fn relational(&mut self) -> Option<i64> {
        let mut left = self.shift()?;
        loop {
            match self.peek() {
                Some("<") => {
                    self.bump();
                    left = (left < self.shift()?) as i64;
                }
                Some("<=") => {
                    self.bump();
                    left = (left <= self.shift()?) as i64;
                }
                Some(">") => {
                    self.bump();
                    left = (left > self.shift()?) as i64;
                }
                Some(">=") => {
                    self.bump();
                    left = (left >= self.shift()?) as i64;
                }
                _ => return Some(left),
            }
        }
    }

    fn shift(&mut self) -> Option<i64> {
        let mut left = self.additive()?;
        loop {
            match self.peek() {
                Some("<<") => {
                    self.bump();
                    left = left.wrapping_shl(self.additive()? as u32);
                }
                Some(">>") => {
                    self.bump();
                    left = left.wrapping_shr(self.additive()? as u32);
                }
                _ => return Some(left),
            }
        }
    }

    fn additive(&mut self) -> Option<i64> {
        let mut left = self.multiplicative()?;
        loop {
            match self.peek() {
                Some("+") => {
                    self.bump();
                    left = left.wrapping_add(self.multiplicative()?);
                }
                Some("-") => {
                    self.bump();
                    left = left.wrapping_sub(self.multiplicative()?);
                }
                _ => return Some(left),
            }
        }
    }

    fn multiplicative(&mut self) -> Option<i64> {
        let mut left = self.unary()?;
        loop {
            match self.peek() {
                Some("*") => {
                    self.bump();
                    left = left.wrapping_mul(self.unary()?);
                }
                Some("/") => {
                    self.bump();
                    let right = self.unary()?;
                    if right == 0 {
                        return None;
                    }
                    left = left.wrapping_div(right);
                }
                Some("%") => {
                    self.bump();
                    let right = self.unary()?;
                    if right == 0 {
                        return None;
                    }
                    left = left.wrapping_rem(right);
                }
                _ => return Some(left),
            }
        }
    }

    fn unary(&mut self) -> Option<i64> {
        match self.peek() {
            Some("!") => {
                self.bump();
                Some((self.unary()? == 0) as i64)
            }
            Some("~") => {
                self.bump();
                Some(!self.unary()?)
            }
            Some("-") => {
                self.bump();
                Some(-self.unary()?)
            }
            Some("+") => {
                self.bump();
                self.unary()
            }
            Some("(") => {
                self.bump();
                let value = self.ternary()?;
                if self.peek() != Some(")") {
                    return None;
                }
                self.bump();
                Some(value)
            }
            Some(tok) if tok.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) => {
                let value = crate::mathlib::to_i64(tok);
                self.bump();
                Some(value)
            }
            Some(tok) if is_ident(tok) => {
                // unexpanded identifier: evaluates to 0
                self.bump();
                Some(0)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errorlogger::CollectingLogger;
    use crate::filelister::MemFileLister;

    fn run(settings: &Settings, lister: &MemFileLister, text: &str) -> Preprocessed {
        let mut logger = CollectingLogger::new();
        Preprocessor::new(settings, lister)
            .preprocess(text, "test.c", &mut logger)
            .unwrap()
    }

    #[test]
    fn comment_stripping_preserves_line_count() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let pre = Preprocessor::new(&settings, &lister);
        let mut supp = Suppressions::new();
        let code = pre.read_code("a; // x\n/* b\nc */ d;\n", "t.c", &mut supp);
        assert_eq!(code, "a; \n\n d;\n");
    }

    #[test]
    fn continuations_join_and_pad() {
        let joined = join_continuations("ab\\\ncd\nxy\n");
        assert_eq!(joined, "abcd\n\nxy\n");
    }

    #[test]
    fn strings_survive_comment_stripping() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let pre = Preprocessor::new(&settings, &lister);
        let mut supp = Suppressions::new();
        let code = pre.read_code("s = \"a//b\";\n", "t.c", &mut supp);
        assert_eq!(code, "s = \"a//b\";\n");
    }

    #[test]
    fn two_ifdefs_yield_four_configurations() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let text = "#ifdef A\nint a;\n#endif\n#ifdef B\nint b;\n#endif\n";
        let result = run(&settings, &lister, text);
        let names: Vec<&str> = result.configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["", "A", "B", "A;B"]);
    }

    #[test]
    fn max_configs_caps_enumeration() {
        let mut settings = Settings::new();
        settings.max_configs = 2;
        let lister = MemFileLister::new();
        let text = "#ifdef A\nint a;\n#endif\n#ifdef B\nint b;\n#endif\n";
        let result = run(&settings, &lister, text);
        let names: Vec<&str> = result.configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["", "A"]);
    }

    #[test]
    fn force_lifts_the_cap() {
        let mut settings = Settings::new();
        settings.max_configs = 2;
        settings.force = true;
        let lister = MemFileLister::new();
        let text = "#ifdef A\nint a;\n#endif\n#ifdef B\nint b;\n#endif\n";
        let result = run(&settings, &lister, text);
        assert_eq!(result.configs.len(), 4);
    }

    #[test]
    fn duplicate_slices_are_dropped() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        // A guards nothing that changes the emitted text
        let text = "#ifdef A\n#endif\nint x;\n";
        let result = run(&settings, &lister, text);
        assert_eq!(result.configs.len(), 1);
        assert_eq!(result.configs[0].name, "");
    }

    #[test]
    fn include_guard_is_not_a_configuration() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let text = "#ifndef H_GUARD\n#define H_GUARD\nint x;\n#endif\n";
        let result = run(&settings, &lister, text);
        assert_eq!(result.configs.len(), 1);
    }

    #[test]
    fn ifdef_selects_lines() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let text = "#ifdef A\nint a;\n#else\nint b;\n#endif\n";
        let result = run(&settings, &lister, text);
        let base = &result.configs[0];
        assert_eq!(base.name, "");
        assert!(base.code.contains("int b ;") || base.code.contains("int b;"));
        let with_a = &result.configs[1];
        assert!(with_a.code.contains("int a"));
        assert!(!with_a.code.contains("int b"));
    }

    #[test]
    fn line_numbers_survive_conditionals() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let text = "#ifdef A\nint a;\n#endif\nint tail;\n";
        let result = run(&settings, &lister, text);
        let base = &result.configs[0];
        let lines: Vec<&str> = base.code.split('\n').collect();
        assert_eq!(lines[3].trim(), "int tail;");
    }

    #[test]
    fn object_macro_expands() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let text = "#define SIZE 10\nint a[SIZE];\n";
        let result = run(&settings, &lister, text);
        assert!(result.configs[0].code.contains("10"));
        assert!(!result.configs[0].code.contains("SIZE"));
    }

    #[test]
    fn function_macro_substitutes_params() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let text = "#define MAX(a,b) ((a)>(b)?(a):(b))\nint m = MAX(1,2);\n";
        let result = run(&settings, &lister, text);
        let code = &result.configs[0].code;
        assert!(code.contains("( ( 1 ) > ( 2 ) ? ( 1 ) : ( 2 ) )"));
    }

    #[test]
    fn stringize_operator() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let text = "#define STR(x) #x\nconst char* s = STR(hello);\n";
        let result = run(&settings, &lister, text);
        assert!(result.configs[0].code.contains("\"hello\""));
    }

    #[test]
    fn paste_operator() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let text = "#define GLUE(a,b) a##b\nint GLUE(var,1) = 0;\n";
        let result = run(&settings, &lister, text);
        assert!(result.configs[0].code.contains("var1"));
    }

    #[test]
    fn self_recursive_macro_stops() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let text = "#define X X + 1\nint y = X;\n";
        let result = run(&settings, &lister, text);
        assert!(result.configs[0].code.contains("X + 1"));
    }

    #[test]
    fn rescanning_expands_nested_macros() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let text = "#define A B\n#define B 42\nint x = A;\n";
        let result = run(&settings, &lister, text);
        assert!(result.configs[0].code.contains("42"));
    }

    #[test]
    fn if_expression_evaluation() {
        let mut defines = HashMap::new();
        defines.insert(
            "V".to_string(),
            MacroDef {
                params: None,
                body: "3".to_string(),
            },
        );
        assert!(eval_condition("1 + 1 == 2", &defines));
        assert!(eval_condition("V >= 3", &defines));
        assert!(eval_condition("defined(V)", &defines));
        assert!(eval_condition("defined V", &defines));
        assert!(!eval_condition("defined(W)", &defines));
        assert!(eval_condition("!defined(W)", &defines));
        assert!(eval_condition("(1 ? 5 : 7) == 5", &defines));
        assert!(eval_condition("UNKNOWN == 0", &defines));
        assert!(eval_condition("1 << 3 == 8", &defines));
        assert!(!eval_condition("1 / 0", &defines));
    }

    #[test]
    fn elif_chains() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let text = "#if defined(A)\nint a;\n#elif defined(B)\nint b;\n#else\nint c;\n#endif\n";
        let result = run(&settings, &lister, text);
        let names: Vec<&str> = result.configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["", "A", "B"]);
        assert!(result.configs[0].code.contains("int c"));
        assert!(result.configs[1].code.contains("int a"));
        assert!(result.configs[2].code.contains("int b"));
    }

    #[test]
    fn quote_include_resolves_and_wraps() {
        let settings = Settings::new();
        let mut lister = MemFileLister::new();
        lister.insert("inc.h", "int from_header;\n");
        let text = "#include \"inc.h\"\nint main_var;\n";
        let result = run(&settings, &lister, text);
        let code = &result.configs[0].code;
        assert!(code.contains("#file \"inc.h\""));
        assert!(code.contains("from_header"));
        assert!(code.contains("#endfile"));
    }

    #[test]
    fn missing_include_is_reported_once() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let mut logger = CollectingLogger::new();
        let text = "#include \"nope.h\"\n#include \"nope.h\"\n";
        Preprocessor::new(&settings, &lister)
            .preprocess(text, "test.c", &mut logger)
            .unwrap();
        let ids = logger.ids();
        assert_eq!(ids.iter().filter(|i| **i == "missingInclude").count(), 1);
    }

    #[test]
    fn known_standard_header_is_not_missing() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let mut logger = CollectingLogger::new();
        Preprocessor::new(&settings, &lister)
            .preprocess("#include <stdio.h>\n", "test.c", &mut logger)
            .unwrap();
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn include_cycle_is_cut() {
        let settings = Settings::new();
        let mut lister = MemFileLister::new();
        lister.insert("a.h", "#include \"b.h\"\nint a;\n");
        lister.insert("b.h", "#include \"a.h\"\nint b;\n");
        let result = run(&settings, &lister, "#include \"a.h\"\n");
        assert_eq!(result.configs.len(), 1);
        assert!(result.configs[0].code.contains("int a"));
        assert!(result.configs[0].code.contains("int b"));
    }

    #[test]
    fn unbalanced_endif_is_fatal() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let mut logger = CollectingLogger::new();
        let err = Preprocessor::new(&settings, &lister)
            .preprocess("#endif\n", "test.c", &mut logger)
            .unwrap_err();
        assert!(matches!(err, PreprocessError::UnbalancedConditional { .. }));
        assert_eq!(logger.ids(), vec!["syntaxError"]);
    }

    #[test]
    fn unterminated_if_is_fatal() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let mut logger = CollectingLogger::new();
        let err = Preprocessor::new(&settings, &lister)
            .preprocess("#ifdef A\nint x;\n", "test.c", &mut logger)
            .unwrap_err();
        assert!(matches!(err, PreprocessError::UnbalancedConditional { .. }));
    }

    #[test]
    fn inline_suppression_is_collected() {
        let mut settings = Settings::new();
        settings.inline_suppressions = true;
        let lister = MemFileLister::new();
        let text = "// cppcheck-suppress memleak\nvoid f() {}\n";
        let result = run(&settings, &lister, text);
        assert!(result.suppressions.is_suppressed("memleak", "test.c", 2));
        assert!(!result.suppressions.is_suppressed("memleak", "test.c", 1));
    }

    #[test]
    fn inline_suppression_ignored_when_disabled() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let text = "// cppcheck-suppress memleak\nvoid f() {}\n";
        let result = run(&settings, &lister, text);
        assert!(result.suppressions.is_empty());
    }

    #[test]
    fn user_defines_are_fixed_not_enumerated() {
        let mut settings = Settings::new();
        settings.user_defines.push("A=2".to_string());
        let lister = MemFileLister::new();
        let text = "#if A == 2\nint yes;\n#endif\n#ifdef B\nint b;\n#endif\n";
        let result = run(&settings, &lister, text);
        let names: Vec<&str> = result.configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["", "B"]);
        assert!(result.configs[0].code.contains("int yes"));
    }

    #[test]
    fn user_undefs_never_join_a_configuration() {
        let mut settings = Settings::new();
        settings.user_undefs.push("A".to_string());
        let lister = MemFileLister::new();
        let text = "#ifdef A\nint a;\n#endif\nint x;\n";
        let result = run(&settings, &lister, text);
        assert_eq!(result.configs.len(), 1);
        assert!(!result.configs[0].code.contains("int a"));
    }

    #[test]
    fn error_directive_drops_that_configuration() {
        let settings = Settings::new();
        let lister = MemFileLister::new();
        let text = "#ifdef BROKEN\n#error not supported\n#endif\nint x;\n";
        let result = run(&settings, &lister, text);
        let names: Vec<&str> = result.configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec![""]);
    }

    #[test]
    fn terminate_flag_stops_enumeration() {
        let settings = Settings::new();
        settings.request_termination();
        let lister = MemFileLister::new();
        let mut logger = CollectingLogger::new();
        let err = Preprocessor::new(&settings, &lister)
            .preprocess("int x;\n", "test.c", &mut logger)
            .unwrap_err();
        assert_eq!(err, PreprocessError::Terminated);
    }
}
