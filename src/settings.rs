//! Analysis options. Built once by the front-end, then immutable for the
//! whole run; the only live state is the cooperative terminate flag.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errorlogger::Severity;
use crate::suppressions::Suppressions;

/// Message classes switched on with `--enable`. `error` is always on and has
/// no entry here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Enable {
    Style,
    Warning,
    Performance,
    Portability,
    Information,
    UnusedFunction,
    MissingInclude,
}

impl Enable {
    pub const ALL: &'static [Enable] = &[
        Enable::Style,
        Enable::Warning,
        Enable::Performance,
        Enable::Portability,
        Enable::Information,
        Enable::UnusedFunction,
        Enable::MissingInclude,
    ];

    pub fn parse(name: &str) -> Option<Vec<Enable>> {
        match name {
            "all" => Some(Self::ALL.to_vec()),
            "style" => Some(vec![Enable::Style]),
            "warning" => Some(vec![Enable::Warning]),
            "performance" => Some(vec![Enable::Performance]),
            "portability" => Some(vec![Enable::Portability]),
            "information" => Some(vec![Enable::Information]),
            "unusedFunction" => Some(vec![Enable::UnusedFunction]),
            "missingInclude" => Some(vec![Enable::MissingInclude]),
            _ => None,
        }
    }
}

/// Target platform: decides the widths `sizeof` folds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Unspecified,
    Unix32,
    Unix64,
    Win32A,
    Win32W,
    Win64,
}

impl Platform {
    pub fn parse(name: &str) -> Option<Platform> {
        match name {
            "unix32" => Some(Platform::Unix32),
            "unix64" => Some(Platform::Unix64),
            "win32A" => Some(Platform::Win32A),
            "win32W" => Some(Platform::Win32W),
            "win64" => Some(Platform::Win64),
            "unspecified" => Some(Platform::Unspecified),
            _ => None,
        }
    }

    pub fn sizeof_long(&self) -> u32 {
        match self {
            Platform::Unix64 => 8,
            _ => 4,
        }
    }

    pub fn sizeof_pointer(&self) -> u32 {
        match self {
            Platform::Unix64 | Platform::Win64 => 8,
            _ => 4,
        }
    }

    pub fn sizeof_size_t(&self) -> u32 {
        self.sizeof_pointer()
    }

    pub fn sizeof_wchar_t(&self) -> u32 {
        match self {
            Platform::Unix32 | Platform::Unix64 => 4,
            _ => 2,
        }
    }

    /// Width of a built-in type name, None for non-builtins. `unsigned` and
    /// `signed` alone mean `int`.
    pub fn sizeof_type(&self, name: &str) -> Option<u32> {
        match name {
            "bool" | "char" => Some(1),
            "short" => Some(2),
            "int" | "unsigned" | "signed" | "float" => Some(4),
            "long" => Some(self.sizeof_long()),
            "double" => Some(8),
            "wchar_t" => Some(self.sizeof_wchar_t()),
            "size_t" => Some(self.sizeof_size_t()),
            _ => None,
        }
    }
}

/// Header sets considered known when resolving includes.
#[derive(Debug, Clone, Copy)]
pub struct Standards {
    pub c: bool,
    pub cpp: bool,
    pub posix: bool,
}

impl Default for Standards {
    fn default() -> Self {
        Standards {
            c: true,
            cpp: true,
            posix: false,
        }
    }
}

impl Standards {
    /// Apply one `--std=` argument; unknown values are reported by the CLI.
    pub fn set(&mut self, name: &str) -> bool {
        match name {
            "c89" | "c99" | "c11" => {
                self.c = true;
                true
            }
            "c++03" | "c++11" | "c++" => {
                self.cpp = true;
                true
            }
            "posix" => {
                self.posix = true;
                true
            }
            _ => false,
        }
    }
}

#[derive(Clone)]
#[derive(Debug)]
pub struct Settings {
    pub enabled: HashSet<Enable>,
    pub inconclusive: bool,
    pub inline_suppressions: bool,
    /// Check all configurations even past `max_configs`.
    pub force: bool,
    pub max_configs: usize,
    pub user_defines: Vec<String>,
    pub user_undefs: Vec<String>,
    pub include_paths: Vec<PathBuf>,
    pub standards: Standards,
    pub platform: Platform,
    /// Parallelism hint for the external orchestrator; the core ignores it.
    pub job_count: usize,
    pub suppressions: Suppressions,
    pub xml: bool,
    pub xml_version: u8,
    pub quiet: bool,
    pub verbose: bool,
    terminate: Arc<AtomicBool>,
}

impl Settings {
    pub fn new() -> Self {
        Settings {
            enabled: HashSet::new(),
            inconclusive: false,
            inline_suppressions: false,
            force: false,
            max_configs: 12,
            user_defines: Vec::new(),
            user_undefs: Vec::new(),
            include_paths: Vec::new(),
            standards: Standards::default(),
            platform: Platform::default(),
            job_count: 1,
            suppressions: Suppressions::new(),
            xml: false,
            xml_version: 1,
            quiet: false,
            verbose: false,
            terminate: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_enabled(&self, what: Enable) -> bool {
        self.enabled.contains(&what)
    }

    /// Whether a message of this severity may be emitted at all.
    pub fn severity_enabled(&self, severity: Severity) -> bool {
        match severity {
            Severity::Error => true,
            Severity::Warning => self.is_enabled(Enable::Warning),
            Severity::Style => self.is_enabled(Enable::Style),
            Severity::Performance => self.is_enabled(Enable::Performance),
            Severity::Portability => self.is_enabled(Enable::Portability),
            Severity::Information => self.is_enabled(Enable::Information),
            Severity::Debug => self.verbose,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminate.load(Ordering::Relaxed)
    }

    pub fn request_termination(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }

    /// Shared handle for an external watchdog.
    pub fn terminate_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.terminate)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
