//! Diagnostic suppression, from `--suppress` entries and from in-source
//! `// cppcheck-suppress <id>` comments collected by the preprocessor.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suppression {
    pub id: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl Suppression {
    /// Parse a `--suppress` argument: `id[:file[:line]]`.
    pub fn parse(text: &str) -> Result<Suppression, SuppressionError> {
        let mut parts = text.splitn(3, ':');
        let id = parts.next().unwrap_or("").trim();
        if id.is_empty() {
            return Err(SuppressionError::EmptyId);
        }
        let file = parts.next().map(|f| f.to_string());
        let line = match parts.next() {
            Some(l) => Some(
                l.parse::<u32>()
                    .map_err(|_| SuppressionError::BadLine(l.to_string()))?,
            ),
            None => None,
        };
        Ok(Suppression {
            id: id.to_string(),
            file,
            line,
        })
    }

    /// An inline suppression pins both file and line.
    pub fn inline(id: &str, file: &str, line: u32) -> Self {
        Suppression {
            id: id.to_string(),
            file: Some(file.to_string()),
            line: Some(line),
        }
    }

    pub fn matches(&self, id: &str, file: &str, line: u32) -> bool {
        if self.id != id {
            return false;
        }
        if let Some(f) = &self.file {
            if f != file {
                return false;
            }
        }
        if let Some(l) = self.line {
            if l != line {
                return false;
            }
        }
        true
    }
}

/// Suppression table. Duplicate entries collapse on add, so several inline
/// comments naming the same id on the same line behave as one.
#[derive(Debug, Clone, Default)]
pub struct Suppressions {
    entries: Vec<Suppression>,
}

impl Suppressions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, suppression: Suppression) {
        if !self.entries.contains(&suppression) {
            self.entries.push(suppression);
        }
    }

    pub fn parse_and_add(&mut self, text: &str) -> Result<(), SuppressionError> {
        self.add(Suppression::parse(text)?);
        Ok(())
    }

    pub fn extend(&mut self, other: &Suppressions) {
        for entry in &other.entries {
            self.add(entry.clone());
        }
    }

    pub fn is_suppressed(&self, id: &str, file: &str, line: u32) -> bool {
        self.entries.iter().any(|s| s.matches(id, file, line))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressionError {
    EmptyId,
    BadLine(String),
}

impl fmt::Display for SuppressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressionError::EmptyId => write!(f, "suppression has no id"),
            SuppressionError::BadLine(l) => write!(f, "invalid suppression line number '{}'", l),
        }
    }
}

impl std::error::Error for SuppressionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_id() {
        let s = Suppression::parse("memleak").unwrap();
        assert_eq!(s.id, "memleak");
        assert!(s.file.is_none());
        assert!(s.line.is_none());
    }

    #[test]
    fn parse_id_file_line() {
        let s = Suppression::parse("uninitvar:src/a.c:10").unwrap();
        assert_eq!(s.id, "uninitvar");
        assert_eq!(s.file.as_deref(), Some("src/a.c"));
        assert_eq!(s.line, Some(10));
    }

    #[test]
    fn parse_rejects_empty_id() {
        assert_eq!(Suppression::parse("").unwrap_err(), SuppressionError::EmptyId);
        assert_eq!(Suppression::parse(":a.c").unwrap_err(), SuppressionError::EmptyId);
    }

    #[test]
    fn parse_rejects_bad_line() {
        assert!(matches!(
            Suppression::parse("id:a.c:xx").unwrap_err(),
            SuppressionError::BadLine(_)
        ));
    }

    #[test]
    fn bare_id_matches_everywhere() {
        let s = Suppression::parse("memleak").unwrap();
        assert!(s.matches("memleak", "any.c", 99));
        assert!(!s.matches("uninitvar", "any.c", 99));
    }

    #[test]
    fn file_scoped_matches_only_that_file() {
        let s = Suppression::parse("memleak:a.c").unwrap();
        assert!(s.matches("memleak", "a.c", 5));
        assert!(!s.matches("memleak", "b.c", 5));
    }

    #[test]
    fn line_scoped_matches_only_that_line() {
        let s = Suppression::parse("memleak:a.c:5").unwrap();
        assert!(s.matches("memleak", "a.c", 5));
        assert!(!s.matches("memleak", "a.c", 6));
    }

    #[test]
    fn table_lookup() {
        let mut table = Suppressions::new();
        table.parse_and_add("memleak:a.c:1").unwrap();
        assert!(table.is_suppressed("memleak", "a.c", 1));
        assert!(!table.is_suppressed("memleak", "a.c", 2));
    }

    #[test]
    fn duplicate_entries_collapse() {
        let mut table = Suppressions::new();
        table.add(Suppression::inline("memleak", "a.c", 3));
        table.add(Suppression::inline("memleak", "a.c", 3));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn extend_merges_tables() {
        let mut a = Suppressions::new();
        a.parse_and_add("one").unwrap();
        let mut b = Suppressions::new();
        b.parse_and_add("two").unwrap();
        b.parse_and_add("one").unwrap();
        a.extend(&b);
        assert_eq!(a.len(), 2);
    }
}
