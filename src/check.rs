//! Check interface and registry.
//!
//! Every analysis is a concrete type behind the `Check` trait, held in an
//! explicit `CheckRegistry` that the orchestrator builds at startup and
//! walks for every simplified token stream. There is no process-global
//! registration; tests build their own registries.

use crate::errorlogger::ErrorLogger;
use crate::settings::Settings;
use crate::token::TokenList;

pub trait Check {
    fn name(&self) -> &'static str;

    /// Walk one simplified token stream and report findings.
    fn run(&mut self, list: &TokenList, settings: &Settings, logger: &mut dyn ErrorLogger);

    /// Emit one example message per diagnostic id this check can produce,
    /// for the documentation dump.
    fn report_examples(&self, logger: &mut dyn ErrorLogger);

    /// Called once after the last file; cross-file checks report here.
    fn finalize(&mut self, _settings: &Settings, _logger: &mut dyn ErrorLogger) {}
}

pub struct CheckRegistry {
    checks: Vec<Box<dyn Check>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        CheckRegistry { checks: Vec::new() }
    }

    /// The standard analysis set, in a fixed order so diagnostic output is
    /// deterministic.
    pub fn with_builtin_checks() -> Self {
        let mut registry = CheckRegistry::new();
        registry.register(Box::new(crate::checks::memleak::MemleakCheck::new()));
        registry.register(Box::new(crate::checks::bufferoverrun::BufferOverrunCheck::new()));
        registry.register(Box::new(crate::checks::uninitvar::UninitVarCheck::new()));
        registry.register(Box::new(crate::checks::classes::ClassCheck::new()));
        registry.register(Box::new(crate::checks::stl::StlCheck::new()));
        registry.register(Box::new(crate::checks::autovariables::AutoVariablesCheck::new()));
        registry.register(Box::new(
            crate::checks::obsoletefunctions::ObsoleteFunctionsCheck::new(),
        ));
        registry.register(Box::new(
            crate::checks::unusedfunctions::UnusedFunctionsCheck::new(),
        ));
        registry
    }

    pub fn register(&mut self, check: Box<dyn Check>) {
        self.checks.push(check);
    }

    pub fn run_all(
        &mut self,
        list: &TokenList,
        settings: &Settings,
        logger: &mut dyn ErrorLogger,
    ) {
        for check in &mut self.checks {
            if settings.is_terminated() {
                return;
            }
            check.run(list, settings, logger);
        }
    }

    pub fn finalize_all(&mut self, settings: &Settings, logger: &mut dyn ErrorLogger) {
        for check in &mut self.checks {
            check.finalize(settings, logger);
        }
    }

    pub fn report_all_examples(&self, logger: &mut dyn ErrorLogger) {
        for check in &self.checks {
            check.report_examples(logger);
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::with_builtin_checks()
    }
}
