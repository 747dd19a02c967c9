//! Command-line front-end.
//!
//! A thin translation layer: argv becomes a `Settings` struct and a list of
//! source paths, then the analyzer core does the rest. The exit code is the
//! number of files with at least one error-severity diagnostic, capped at
//! 255.

use clap::Parser;
use std::path::{Path, PathBuf};

use crate::analyzer::Analyzer;
use crate::errorlogger::{OutputFormat, PrintLogger};
use crate::filelister::{FileLister, FsFileLister};
use crate::settings::{Enable, Platform, Settings};

#[derive(Parser)]
#[command(name = "cppscan")]
#[command(about = "Static analysis of C and C++ code", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Define a preprocessor symbol: -D<ID> or -D<ID>=<VALUE>
    #[arg(short = 'D', value_name = "ID[=VALUE]")]
    pub define: Vec<String>,

    /// Undefine a preprocessor symbol; it never joins a configuration
    #[arg(short = 'U', value_name = "ID")]
    pub undef: Vec<String>,

    /// Add a search root for #include resolution
    #[arg(short = 'I', value_name = "DIR")]
    pub include_dir: Vec<PathBuf>,

    /// Enable message classes: all, style, warning, performance,
    /// portability, information, unusedFunction, missingInclude
    #[arg(long, value_delimiter = ',', value_name = "CLASS")]
    pub enable: Vec<String>,

    /// Report findings even when the analysis is not certain
    #[arg(long)]
    pub inconclusive: bool,

    /// Honor `// cppcheck-suppress <id>` comments
    #[arg(long = "inline-suppr")]
    pub inline_suppr: bool,

    /// Check all preprocessor configurations
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Maximum configurations checked per file
    #[arg(long = "max-configs", value_name = "N", default_value_t = 12)]
    pub max_configs: usize,

    /// Target platform: unix32, unix64, win32A, win32W, win64
    #[arg(long, value_name = "PLATFORM")]
    pub platform: Option<String>,

    /// Language standard: c89/c99/c11, c++03/c++11, posix
    #[arg(long = "std", value_name = "STD")]
    pub std: Vec<String>,

    /// Suppress a diagnostic: <id>[:<file>[:<line>]]
    #[arg(long, value_name = "ID[:FILE[:LINE]]")]
    pub suppress: Vec<String>,

    /// Write results as XML
    #[arg(long)]
    pub xml: bool,

    /// XML format version
    #[arg(long = "xml-version", value_name = "V", default_value_t = 1)]
    pub xml_version: u8,

    /// Write results as JSON records
    #[arg(long = "output-format", value_name = "FMT")]
    pub output_format: Option<String>,

    /// Print one example message per diagnostic id and exit
    #[arg(long)]
    pub errorlist: bool,

    /// Worker count hint for the external dispatcher
    #[arg(short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// Only print the diagnostics
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// More detailed output, including debug messages
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Files or directories to check
    #[arg(value_name = "PATH")]
    pub paths: Vec<String>,
}

fn build_settings(cli: &Cli) -> Result<Settings, String> {
    let mut settings = Settings::new();
    settings.user_defines = cli.define.clone();
    settings.user_undefs = cli.undef.clone();
    settings.include_paths = cli.include_dir.clone();
    settings.inconclusive = cli.inconclusive;
    settings.inline_suppressions = cli.inline_suppr;
    settings.force = cli.force;
    settings.max_configs = cli.max_configs;
    settings.quiet = cli.quiet;
    settings.verbose = cli.verbose;
    settings.xml = cli.xml;
    settings.xml_version = cli.xml_version;
    if let Some(jobs) = cli.jobs {
        settings.job_count = jobs;
    }

    for class in &cli.enable {
        match Enable::parse(class) {
            Some(enables) => settings.enabled.extend(enables),
            None => return Err(format!("unknown --enable class '{}'", class)),
        }
    }
    if let Some(platform) = &cli.platform {
        settings.platform = Platform::parse(platform)
            .ok_or_else(|| format!("unknown platform '{}'", platform))?;
    }
    for std in &cli.std {
        if !settings.standards.set(std) {
            return Err(format!("unknown standard '{}'", std));
        }
    }
    for spec in &cli.suppress {
        settings
            .suppressions
            .parse_and_add(spec)
            .map_err(|e| e.to_string())?;
    }
    if cli.xml_version != 1 && cli.xml_version != 2 {
        return Err(format!("unknown xml version '{}'", cli.xml_version));
    }
    Ok(settings)
}

fn output_format(cli: &Cli) -> Result<OutputFormat, String> {
    if let Some(fmt) = &cli.output_format {
        return match fmt.as_str() {
            "json" => Ok(OutputFormat::Json),
            "text" => Ok(OutputFormat::Text),
            "xml" => Ok(OutputFormat::Xml),
            other => Err(format!("unknown output format '{}'", other)),
        };
    }
    Ok(if cli.xml {
        OutputFormat::Xml
    } else {
        OutputFormat::Text
    })
}

/// Expand path arguments into the source file worklist.
fn expand_paths(lister: &dyn FileLister, paths: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        files.extend(lister.list(Path::new(path), true));
    }
    files
}

pub fn run_cli() -> Result<i32, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = build_settings(&cli)?;
    let format = output_format(&cli)?;
    let mut logger = PrintLogger::new(format, cli.xml_version, cli.quiet);

    let analyzer_settings = settings.clone();
    let mut analyzer = Analyzer::new(analyzer_settings);

    if cli.errorlist {
        if let Some(header) = logger.header() {
            eprintln!("{}", header);
        }
        analyzer.report_error_list(&mut logger);
        if let Some(footer) = logger.footer() {
            eprintln!("{}", footer);
        }
        return Ok(0);
    }

    if cli.paths.is_empty() {
        return Err("no input files; try --help".into());
    }

    let files = expand_paths(&FsFileLister, &cli.paths);
    if files.is_empty() {
        return Err("no C or C++ source files found".into());
    }

    if let Some(header) = logger.header() {
        eprintln!("{}", header);
    }
    let mut failed_files = 0usize;
    for file in &files {
        if settings.is_terminated() {
            break;
        }
        let errors = analyzer.check_file(&file.to_string_lossy(), &mut logger);
        if errors > 0 {
            failed_files += 1;
        }
    }
    analyzer.finalize(&mut logger);
    if let Some(footer) = logger.footer() {
        eprintln!("{}", footer);
    }

    Ok(failed_files.min(255) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("argv should parse")
    }

    #[test]
    fn defines_and_includes_parse_attached() {
        let cli = parse(&["cppscan", "-DA=1", "-DB", "-Iinc", "file.c"]);
        assert_eq!(cli.define, vec!["A=1", "B"]);
        assert_eq!(cli.include_dir, vec![PathBuf::from("inc")]);
        assert_eq!(cli.paths, vec!["file.c"]);
    }

    #[test]
    fn enable_list_splits_on_comma() {
        let cli = parse(&["cppscan", "--enable=style,warning", "f.c"]);
        let settings = build_settings(&cli).unwrap();
        assert!(settings.is_enabled(Enable::Style));
        assert!(settings.is_enabled(Enable::Warning));
        assert!(!settings.is_enabled(Enable::Performance));
    }

    #[test]
    fn enable_all_turns_everything_on() {
        let cli = parse(&["cppscan", "--enable=all", "f.c"]);
        let settings = build_settings(&cli).unwrap();
        for class in Enable::ALL {
            assert!(settings.is_enabled(*class));
        }
    }

    #[test]
    fn unknown_enable_is_an_error() {
        let cli = parse(&["cppscan", "--enable=everything", "f.c"]);
        assert!(build_settings(&cli).is_err());
    }

    #[test]
    fn platform_and_std_flow_into_settings() {
        let cli = parse(&["cppscan", "--platform=unix64", "--std=posix", "f.c"]);
        let settings = build_settings(&cli).unwrap();
        assert_eq!(settings.platform, Platform::Unix64);
        assert!(settings.standards.posix);
    }

    #[test]
    fn suppress_specs_are_parsed() {
        let cli = parse(&["cppscan", "--suppress=memleak:a.c:3", "f.c"]);
        let settings = build_settings(&cli).unwrap();
        assert!(settings.suppressions.is_suppressed("memleak", "a.c", 3));
    }

    #[test]
    fn bad_suppress_spec_is_an_error() {
        let cli = parse(&["cppscan", "--suppress=:a.c", "f.c"]);
        assert!(build_settings(&cli).is_err());
    }

    #[test]
    fn xml_flag_selects_xml_output() {
        let cli = parse(&["cppscan", "--xml", "--xml-version=2", "f.c"]);
        assert_eq!(output_format(&cli).unwrap(), OutputFormat::Xml);
        let settings = build_settings(&cli).unwrap();
        assert_eq!(settings.xml_version, 2);
    }

    #[test]
    fn json_output_format() {
        let cli = parse(&["cppscan", "--output-format=json", "f.c"]);
        assert_eq!(output_format(&cli).unwrap(), OutputFormat::Json);
    }

    #[test]
    fn bad_xml_version_is_an_error() {
        let cli = parse(&["cppscan", "--xml-version=3", "f.c"]);
        assert!(build_settings(&cli).is_err());
    }

    #[test]
    fn jobs_and_flags_parse() {
        let cli = parse(&["cppscan", "-j4", "-q", "-v", "--force", "--inline-suppr", "f.c"]);
        let settings = build_settings(&cli).unwrap();
        assert_eq!(settings.job_count, 4);
        assert!(settings.quiet);
        assert!(settings.verbose);
        assert!(settings.force);
        assert!(settings.inline_suppressions);
    }

    #[test]
    fn max_configs_defaults_and_overrides() {
        let cli = parse(&["cppscan", "f.c"]);
        assert_eq!(build_settings(&cli).unwrap().max_configs, 12);
        let cli = parse(&["cppscan", "--max-configs=3", "f.c"]);
        assert_eq!(build_settings(&cli).unwrap().max_configs, 3);
    }
}
