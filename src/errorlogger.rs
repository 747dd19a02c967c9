//! Diagnostic records and the sink interface they are reported through.
//!
//! Everything the analyzer tells the user flows through `ErrorLogger`:
//! findings from checkers, preprocessor complaints, and `debug` messages
//! from the simplifier. Sinks decide presentation (plain text, XML, JSON);
//! the core only builds `ErrorMessage` values.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Style,
    Performance,
    Portability,
    Information,
    Debug,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Style => "style",
            Severity::Performance => "performance",
            Severity::Portability => "portability",
            Severity::Information => "information",
            Severity::Debug => "debug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLocation {
    pub file: String,
    pub line: u32,
}

impl FileLocation {
    pub fn new(file: &str, line: u32) -> Self {
        FileLocation {
            file: file.to_string(),
            line,
        }
    }
}

/// One diagnostic. The callstack holds the innermost location first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorMessage {
    pub callstack: Vec<FileLocation>,
    pub severity: Severity,
    pub id: String,
    pub msg: String,
}

impl ErrorMessage {
    pub fn new(
        severity: Severity,
        id: &str,
        msg: &str,
        callstack: Vec<FileLocation>,
    ) -> Self {
        ErrorMessage {
            callstack,
            severity,
            id: id.to_string(),
            msg: msg.to_string(),
        }
    }

    /// Single-location diagnostic.
    pub fn at(severity: Severity, id: &str, msg: &str, file: &str, line: u32) -> Self {
        Self::new(severity, id, msg, vec![FileLocation::new(file, line)])
    }

    /// Diagnostic with no source location (e.g. an unreadable file).
    pub fn bare(severity: Severity, id: &str, msg: &str) -> Self {
        Self::new(severity, id, msg, Vec::new())
    }

    /// Innermost location's file, or "" when there is none.
    pub fn file(&self) -> &str {
        self.callstack.first().map(|l| l.file.as_str()).unwrap_or("")
    }

    pub fn line(&self) -> u32 {
        self.callstack.first().map(|l| l.line).unwrap_or(0)
    }

    /// `[file:line]: (severity) message`. Extra callstack entries are
    /// prepended outermost first, the error point last.
    pub fn to_text(&self) -> String {
        if self.callstack.is_empty() {
            return format!("({}) {}", self.severity, self.msg);
        }
        let locs: Vec<String> = self
            .callstack
            .iter()
            .rev()
            .map(|l| format!("[{}:{}]", l.file, l.line))
            .collect();
        format!("{}: ({}) {}", locs.join(" -> "), self.severity, self.msg)
    }

    pub fn to_xml_v1(&self) -> String {
        format!(
            "    <error file=\"{}\" line=\"{}\" id=\"{}\" severity=\"{}\" msg=\"{}\"/>",
            xml_escape(self.file()),
            self.line(),
            xml_escape(&self.id),
            self.severity,
            xml_escape(&self.msg)
        )
    }

    pub fn to_xml_v2(&self) -> String {
        let mut out = format!(
            "        <error id=\"{}\" severity=\"{}\" msg=\"{}\" verbose=\"{}\">",
            xml_escape(&self.id),
            self.severity,
            xml_escape(&self.msg),
            xml_escape(&self.msg)
        );
        for loc in &self.callstack {
            out.push_str(&format!(
                "\n            <location file=\"{}\" line=\"{}\"/>",
                xml_escape(&loc.file),
                loc.line
            ));
        }
        out.push_str("\n        </error>");
        out
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Abstract diagnostic sink. `report_err` carries findings; `report_out`
/// carries progress text ("Checking foo.c...").
pub trait ErrorLogger {
    fn report_err(&mut self, msg: &ErrorMessage);
    fn report_out(&mut self, text: &str);
}

/// Buffering sink, used by the orchestrator for per-file ordering and by
/// tests for assertions.
#[derive(Default)]
pub struct CollectingLogger {
    pub errors: Vec<ErrorMessage>,
    pub output: Vec<String>,
}

impl CollectingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.id.as_str()).collect()
    }
}

impl ErrorLogger for CollectingLogger {
    fn report_err(&mut self, msg: &ErrorMessage) {
        self.errors.push(msg.clone());
    }

    fn report_out(&mut self, text: &str) {
        self.output.push(text.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Xml,
    Json,
}

/// Console sink: errors to stderr, progress to stdout, like any compiler.
pub struct PrintLogger {
    pub format: OutputFormat,
    pub xml_version: u8,
    pub quiet: bool,
}

impl PrintLogger {
    pub fn new(format: OutputFormat, xml_version: u8, quiet: bool) -> Self {
        PrintLogger {
            format,
            xml_version,
            quiet,
        }
    }

    pub fn header(&self) -> Option<String> {
        match (self.format, self.xml_version) {
            (OutputFormat::Xml, 2) => Some(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<results version=\"2\">\n    <errors>"
                    .to_string(),
            ),
            (OutputFormat::Xml, _) => {
                Some("<?xml version=\"1.0\"?>\n<results>".to_string())
            }
            _ => None,
        }
    }

    pub fn footer(&self) -> Option<String> {
        match (self.format, self.xml_version) {
            (OutputFormat::Xml, 2) => Some("    </errors>\n</results>".to_string()),
            (OutputFormat::Xml, _) => Some("</results>".to_string()),
            _ => None,
        }
    }
}

impl ErrorLogger for PrintLogger {
    fn report_err(&mut self, msg: &ErrorMessage) {
        let text = match self.format {
            OutputFormat::Text => msg.to_text(),
            OutputFormat::Xml if self.xml_version == 2 => msg.to_xml_v2(),
            OutputFormat::Xml => msg.to_xml_v1(),
            OutputFormat::Json => msg.to_json(),
        };
        eprintln!("{}", text);
    }

    fn report_out(&mut self, text: &str) {
        if !self.quiet {
            println!("{}", text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_format_matches_contract() {
        let msg = ErrorMessage::at(Severity::Error, "memleak", "Memory leak: p", "a.c", 3);
        assert_eq!(msg.to_text(), "[a.c:3]: (error) Memory leak: p");
    }

    #[test]
    fn text_format_without_location() {
        let msg = ErrorMessage::bare(Severity::Information, "note", "hello");
        assert_eq!(msg.to_text(), "(information) hello");
    }

    #[test]
    fn callstack_prints_outermost_first() {
        let msg = ErrorMessage::new(
            Severity::Error,
            "x",
            "m",
            vec![FileLocation::new("inner.h", 2), FileLocation::new("outer.c", 9)],
        );
        assert_eq!(msg.to_text(), "[outer.c:9] -> [inner.h:2]: (error) m");
    }

    #[test]
    fn primary_location_is_newest() {
        let msg = ErrorMessage::new(
            Severity::Error,
            "x",
            "m",
            vec![FileLocation::new("inner.h", 2), FileLocation::new("outer.c", 9)],
        );
        assert_eq!(msg.file(), "inner.h");
        assert_eq!(msg.line(), 2);
    }

    #[test]
    fn xml_v1_is_a_flat_element() {
        let msg = ErrorMessage::at(Severity::Error, "id1", "a<b", "f.c", 1);
        let xml = msg.to_xml_v1();
        assert!(xml.contains("file=\"f.c\""));
        assert!(xml.contains("msg=\"a&lt;b\""));
        assert!(xml.ends_with("/>"));
    }

    #[test]
    fn xml_v2_nests_locations_innermost_first() {
        let msg = ErrorMessage::new(
            Severity::Warning,
            "id2",
            "m",
            vec![FileLocation::new("inner.h", 2), FileLocation::new("outer.c", 9)],
        );
        let xml = msg.to_xml_v2();
        let inner = xml.find("inner.h").unwrap();
        let outer = xml.find("outer.c").unwrap();
        assert!(inner < outer);
        assert!(xml.contains("verbose=\"m\""));
    }

    #[test]
    fn xml_escaping_covers_quotes_and_ampersand() {
        assert_eq!(xml_escape("a\"b&c'd"), "a&quot;b&amp;c&apos;d");
    }

    #[test]
    fn json_roundtrips_the_fields() {
        let msg = ErrorMessage::at(Severity::Style, "stlSize", "use empty()", "x.cpp", 7);
        let json = msg.to_json();
        assert!(json.contains("\"severity\":\"style\""));
        assert!(json.contains("\"id\":\"stlSize\""));
        assert!(json.contains("\"line\":7"));
    }

    #[test]
    fn collecting_logger_buffers() {
        let mut logger = CollectingLogger::new();
        logger.report_err(&ErrorMessage::at(Severity::Error, "a", "m", "f.c", 1));
        logger.report_out("Checking f.c...");
        assert_eq!(logger.ids(), vec!["a"]);
        assert_eq!(logger.output.len(), 1);
    }

    #[test]
    fn xml_v2_header_and_footer() {
        let logger = PrintLogger::new(OutputFormat::Xml, 2, false);
        assert!(logger.header().unwrap().contains("<results version=\"2\">"));
        assert!(logger.footer().unwrap().contains("</results>"));
    }

    #[test]
    fn text_format_has_no_header() {
        let logger = PrintLogger::new(OutputFormat::Text, 1, false);
        assert!(logger.header().is_none());
        assert!(logger.footer().is_none());
    }
}
