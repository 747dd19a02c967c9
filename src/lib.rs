//! Static analyzer for C and C++ source code.
//!
//! The pipeline: the preprocessor expands one input file into its
//! interesting `#ifdef` configurations; the tokenizer lexes each
//! configuration into a doubly-linked token stream and simplifies it into a
//! canonical form; the registered checks pattern-match the simplified
//! stream (some through the execution-path engine) and report diagnostics
//! through the error-logger sink. The analyzer orchestrates the whole run
//! per file and keeps output deterministic.

pub mod analyzer;
pub mod check;
pub mod checks;
pub mod cli;
pub mod errorlogger;
pub mod executionpath;
pub mod filelister;
pub mod intern;
pub mod lexer;
pub mod mathlib;
pub mod pattern;
pub mod preprocessor;
pub mod settings;
pub mod simplify;
pub mod suppressions;
pub mod token;

pub use analyzer::Analyzer;
pub use check::{Check, CheckRegistry};
pub use errorlogger::{
    CollectingLogger, ErrorLogger, ErrorMessage, FileLocation, OutputFormat, PrintLogger, Severity,
};
pub use executionpath::{Action, PathEngine, PathState};
pub use filelister::{FileLister, FsFileLister, MemFileLister};
pub use intern::{Interner, Symbol};
pub use pattern::Pattern;
pub use preprocessor::{Configuration, Preprocessed, PreprocessError, Preprocessor};
pub use settings::{Enable, Platform, Settings, Standards};
pub use simplify::{Tokenizer, TokenizeError};
pub use suppressions::{Suppression, Suppressions};
pub use token::{Token, TokenId, TokenKind, TokenList};
