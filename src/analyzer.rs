//! Orchestrator.
//!
//! Drives the full pipeline for each file: read, preprocess into
//! configurations, tokenize and simplify each configuration, run every
//! registered check, then flush the file's diagnostics in source order with
//! duplicates collapsed, disabled severities dropped, and suppressions
//! honored. Cross-file checks report in `finalize`, after the last file.

use std::collections::HashSet;
use std::path::Path;

use crate::check::CheckRegistry;
use crate::errorlogger::{CollectingLogger, ErrorLogger, ErrorMessage, Severity};
use crate::filelister::{FileLister, FsFileLister};
use crate::preprocessor::Preprocessor;
use crate::settings::{Enable, Settings};
use crate::simplify::{Tokenizer, TokenizeError};
use crate::suppressions::Suppressions;

pub struct Analyzer {
    settings: Settings,
    lister: Box<dyn FileLister>,
    registry: CheckRegistry,
}

impl Analyzer {
    pub fn new(settings: Settings) -> Self {
        Self::with_lister(settings, Box::new(FsFileLister))
    }

    pub fn with_lister(settings: Settings, lister: Box<dyn FileLister>) -> Self {
        Analyzer {
            settings,
            lister,
            registry: CheckRegistry::with_builtin_checks(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    /// Check one file from the lister. Returns the number of
    /// error-severity diagnostics emitted for it.
    pub fn check_file(&mut self, path: &str, logger: &mut dyn ErrorLogger) -> usize {
        match self.lister.open(Path::new(path)) {
            Ok(content) => self.check_content(path, &content, logger),
            Err(_) => {
                logger.report_out(&format!("Checking {}...", path));
                let msg = ErrorMessage::bare(
                    Severity::Information,
                    "couldNotRead",
                    &format!("couldn't read file: {}", path),
                );
                if self.settings.severity_enabled(Severity::Information) {
                    logger.report_err(&msg);
                }
                0
            }
        }
    }

    /// Check one file with its content supplied directly (synthetic
    /// sources, editor buffers, tests).
    pub fn check_content(
        &mut self,
        path: &str,
        content: &str,
        logger: &mut dyn ErrorLogger,
    ) -> usize {
        logger.report_out(&format!("Checking {}...", path));
        let mut collector = CollectingLogger::new();

        let preprocessor = Preprocessor::new(&self.settings, self.lister.as_ref());
        let inline_suppressions = match preprocessor.preprocess(content, path, &mut collector) {
            Ok(preprocessed) => {
                for config in &preprocessed.configs {
                    if self.settings.is_terminated() {
                        break;
                    }
                    if !config.name.is_empty() {
                        logger.report_out(&format!("Checking {}: {}...", path, config.name));
                    }
                    match Tokenizer::tokenize(&config.code, path, &self.settings, &mut collector) {
                        Ok(tokenizer) => {
                            let list = tokenizer.into_list(&mut collector);
                            self.registry.run_all(&list, &self.settings, &mut collector);
                        }
                        Err(TokenizeError::UnbalancedBrackets { file, line }) => {
                            // per-configuration fatal; the next one may parse
                            collector.report_err(&ErrorMessage::at(
                                Severity::Error,
                                "syntaxError",
                                "Invalid number of brackets",
                                &file,
                                line,
                            ));
                        }
                        Err(TokenizeError::Terminated) => break,
                    }
                }
                preprocessed.suppressions
            }
            // the preprocessor already reported syntaxError into the
            // collector; the file is abandoned
            Err(_) => Suppressions::new(),
        };

        self.flush_file(path, collector.errors, &inline_suppressions, logger)
    }

    /// Apply the emission policy for one file's buffered diagnostics:
    /// drop disabled severities, drop suppressed ids, collapse duplicates
    /// across configurations, emit in source order, count errors.
    fn flush_file(
        &self,
        path: &str,
        messages: Vec<ErrorMessage>,
        inline_suppressions: &Suppressions,
        logger: &mut dyn ErrorLogger,
    ) -> usize {
        let mut seen: HashSet<String> = HashSet::new();
        let mut kept: Vec<ErrorMessage> = Vec::new();
        for msg in messages {
            if !self.message_enabled(&msg) {
                continue;
            }
            if self.settings.suppressions.is_suppressed(&msg.id, msg.file(), msg.line())
                || inline_suppressions.is_suppressed(&msg.id, msg.file(), msg.line())
            {
                continue;
            }
            let key = format!("{}:{}:{}:{}", msg.file(), msg.line(), msg.id, msg.msg);
            if seen.insert(key) {
                kept.push(msg);
            }
        }
        // source order: the checked file first, then included files
        kept.sort_by(|a, b| {
            let a_key = (a.file() != path, a.file().to_string(), a.line());
            let b_key = (b.file() != path, b.file().to_string(), b.line());
            a_key.cmp(&b_key)
        });
        let mut error_count = 0;
        for msg in &kept {
            if msg.severity == Severity::Error {
                error_count += 1;
            }
            logger.report_err(msg);
        }
        error_count
    }

    fn message_enabled(&self, msg: &ErrorMessage) -> bool {
        // missingInclude is its own message class
        if msg.id == "missingInclude" {
            return self.settings.is_enabled(Enable::MissingInclude);
        }
        if msg.id == "unusedFunction" {
            return self.settings.is_enabled(Enable::UnusedFunction);
        }
        self.settings.severity_enabled(msg.severity)
    }

    /// Run the cross-file checks. Call once, after the last file.
    pub fn finalize(&mut self, logger: &mut dyn ErrorLogger) {
        let mut collector = CollectingLogger::new();
        self.registry.finalize_all(&self.settings, &mut collector);
        let mut seen: HashSet<String> = HashSet::new();
        for msg in collector.errors {
            if !self.message_enabled(&msg) {
                continue;
            }
            if self
                .settings
                .suppressions
                .is_suppressed(&msg.id, msg.file(), msg.line())
            {
                continue;
            }
            let key = format!("{}:{}:{}:{}", msg.file(), msg.line(), msg.id, msg.msg);
            if seen.insert(key) {
                logger.report_err(&msg);
            }
        }
    }

    /// The documentation dump behind `--errorlist`.
    pub fn report_error_list(&self, logger: &mut dyn ErrorLogger) {
        self.registry.report_all_examples(logger);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filelister::MemFileLister;

    fn analyzer_with(settings: Settings) -> Analyzer {
        Analyzer::with_lister(settings, Box::new(MemFileLister::new()))
    }

    fn run_one(settings: Settings, code: &str) -> (CollectingLogger, usize) {
        let mut analyzer = analyzer_with(settings);
        let mut logger = CollectingLogger::new();
        let errors = analyzer.check_content("test.c", code, &mut logger);
        analyzer.finalize(&mut logger);
        (logger, errors)
    }

    #[test]
    fn memleak_scenario() {
        let (logger, errors) = run_one(Settings::new(), "void f(){ char* p = malloc(10); }");
        assert_eq!(logger.ids(), vec!["memleak"]);
        assert_eq!(logger.errors[0].severity, Severity::Error);
        assert_eq!(logger.errors[0].line(), 1);
        assert_eq!(errors, 1);
    }

    #[test]
    fn bufferoverrun_scenario() {
        let (logger, errors) = run_one(Settings::new(), "void f(){ int a[10]; a[10]=0; }");
        assert_eq!(logger.ids(), vec!["arrayIndexOutOfBounds"]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn uninitvar_scenario() {
        let (logger, errors) = run_one(Settings::new(), "int f(){ int x; return x; }");
        assert_eq!(logger.ids(), vec!["uninitvar"]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn empty_input_is_clean() {
        let (logger, errors) = run_one(Settings::new(), "");
        assert!(logger.errors.is_empty());
        assert_eq!(errors, 0);
    }

    #[test]
    fn comments_only_is_clean() {
        let (logger, errors) = run_one(Settings::new(), "// just a comment\n/* and another */\n");
        assert!(logger.errors.is_empty());
        assert_eq!(errors, 0);
    }

    #[test]
    fn disabled_severities_are_never_emitted() {
        // style finding without --enable=style
        let (logger, _) = run_one(Settings::new(), "void f(char*b){ gets(b); }");
        assert!(logger.errors.is_empty());
    }

    #[test]
    fn inline_suppression_silences_finding() {
        let mut settings = Settings::new();
        settings.inline_suppressions = true;
        let code = "// cppcheck-suppress memleak\nvoid f(){ char* p = malloc(10); }";
        let mut analyzer = analyzer_with(settings);
        let mut logger = CollectingLogger::new();
        let errors = analyzer.check_content("test.c", code, &mut logger);
        assert!(logger.errors.is_empty());
        assert_eq!(errors, 0);
    }

    #[test]
    fn inline_suppression_requires_flag() {
        let code = "// cppcheck-suppress memleak\nvoid f(){ char* p = malloc(10); }";
        let (logger, errors) = run_one(Settings::new(), code);
        assert_eq!(logger.ids(), vec!["memleak"]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn suppress_option_silences_finding() {
        let mut settings = Settings::new();
        settings.suppressions.parse_and_add("memleak").unwrap();
        let (logger, errors) = run_one(settings, "void f(){ char* p = malloc(10); }");
        assert!(logger.errors.is_empty());
        assert_eq!(errors, 0);
    }

    #[test]
    fn duplicate_findings_across_configs_collapse() {
        // the leak sits outside the conditional, so both configurations
        // report the identical message
        let code = "#ifdef A\nint unused_a;\n#endif\nvoid f(){ char* p = malloc(10); }";
        let (logger, errors) = run_one(Settings::new(), code);
        assert_eq!(logger.ids(), vec!["memleak"]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn output_is_deterministic_between_runs() {
        let settings = Settings::new();
        let code = "void f(){ int a[4]; a[4]=0; char* p = malloc(1); }";
        let (first, _) = run_one(settings.clone(), code);
        let (second, _) = run_one(settings, code);
        let first_text: Vec<String> = first.errors.iter().map(|e| e.to_text()).collect();
        let second_text: Vec<String> = second.errors.iter().map(|e| e.to_text()).collect();
        assert_eq!(first_text, second_text);
    }

    #[test]
    fn diagnostics_sorted_by_line() {
        let code = "void g(){ int y; int z; z = y; }\nvoid f(){ char* p = malloc(10); }";
        let (logger, _) = run_one(Settings::new(), code);
        let lines: Vec<u32> = logger.errors.iter().map(|e| e.line()).collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
    }

    #[test]
    fn missing_include_needs_enable() {
        let code = "#include \"nope.h\"\nint x;";
        let (logger, _) = run_one(Settings::new(), code);
        assert!(logger.errors.is_empty());

        let mut settings = Settings::new();
        settings.enabled.insert(Enable::MissingInclude);
        let (logger, errors) = run_one(settings, code);
        assert_eq!(logger.ids(), vec!["missingInclude"]);
        assert_eq!(errors, 0);
    }

    #[test]
    fn syntax_error_on_unbalanced_conditional() {
        let (logger, errors) = run_one(Settings::new(), "#endif\n");
        assert_eq!(logger.ids(), vec!["syntaxError"]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn unreadable_file_reports_information() {
        let mut settings = Settings::new();
        settings.enabled.insert(Enable::Information);
        let mut analyzer = analyzer_with(settings);
        let mut logger = CollectingLogger::new();
        let errors = analyzer.check_file("missing.c", &mut logger);
        assert_eq!(errors, 0);
        assert_eq!(logger.ids(), vec!["couldNotRead"]);
    }

    #[test]
    fn include_resolution_flows_through_lister() {
        let mut lister = MemFileLister::new();
        lister.insert("dir/header.h", "void helper(char* b);\n");
        lister.insert("dir/main.c", "#include \"header.h\"\nvoid f(){ char* p = malloc(1); }\n");
        let mut analyzer = Analyzer::with_lister(Settings::new(), Box::new(lister));
        let mut logger = CollectingLogger::new();
        let errors = analyzer.check_file("dir/main.c", &mut logger);
        assert_eq!(logger.ids(), vec!["memleak"]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn progress_output_mentions_configurations() {
        let code = "#ifdef A\nint a;\n#endif\nint x;";
        let mut analyzer = analyzer_with(Settings::new());
        let mut logger = CollectingLogger::new();
        analyzer.check_content("test.c", code, &mut logger);
        assert!(logger.output.iter().any(|l| l.contains("test.c: A")));
    }

    #[test]
    fn terminate_flag_short_circuits() {
        let settings = Settings::new();
        settings.request_termination();
        let (logger, errors) = run_one(settings, "void f(){ char* p = malloc(10); }");
        assert!(logger.errors.is_empty());
        assert_eq!(errors, 0);
    }
}
