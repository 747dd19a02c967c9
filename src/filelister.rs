//! File access abstraction. The analyzer core never touches `std::fs`
//! directly; it goes through a `FileLister`, so tests can feed the whole
//! pipeline from an in-memory map.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extensions accepted when expanding a directory argument.
const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "c++", "tpp", "txx"];

pub fn is_source_file(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => SOURCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

pub trait FileLister {
    /// Expand a path into source files. A file argument is returned as-is;
    /// a directory is walked (recursively when asked) and filtered to
    /// C/C++ sources. Results are sorted for deterministic runs.
    fn list(&self, path: &Path, recursive: bool) -> Vec<PathBuf>;

    fn open(&self, path: &Path) -> io::Result<String>;
}

/// Real-filesystem lister.
pub struct FsFileLister;

impl FsFileLister {
    fn walk(&self, dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if recursive {
                    self.walk(&path, recursive, out);
                }
            } else if is_source_file(&path) {
                out.push(path);
            }
        }
    }
}

impl FileLister for FsFileLister {
    fn list(&self, path: &Path, recursive: bool) -> Vec<PathBuf> {
        if path.is_file() {
            return vec![path.to_path_buf()];
        }
        let mut out = Vec::new();
        self.walk(path, recursive, &mut out);
        out.sort();
        out
    }

    fn open(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

/// In-memory lister for tests: path -> synthetic content.
#[derive(Default)]
pub struct MemFileLister {
    files: BTreeMap<String, String>,
}

impl MemFileLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, content: &str) {
        self.files.insert(path.to_string(), content.to_string());
    }
}

impl FileLister for MemFileLister {
    fn list(&self, path: &Path, recursive: bool) -> Vec<PathBuf> {
        let key = path.to_string_lossy();
        if self.files.contains_key(key.as_ref()) {
            return vec![path.to_path_buf()];
        }
        let prefix = format!("{}/", key.trim_end_matches('/'));
        self.files
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .filter(|k| recursive || !k[prefix.len()..].contains('/'))
            .filter(|k| is_source_file(Path::new(k)))
            .map(PathBuf::from)
            .collect()
    }

    fn open(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(path.to_string_lossy().as_ref())
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file not found"))
    }
}
