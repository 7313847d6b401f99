use anyhow::{Context, Result};
use camino::Utf8Path;
use tree_sitter::{Language, Parser, Tree};

use crate::error::{ErrorCode, ForkError};

/// The Java grammar every snapshot is parsed with.
pub fn java_language() -> Language {
    Language::new(tree_sitter_java::LANGUAGE)
}

/// Whether `path` is a source file the extractor understands.
pub fn is_java_path(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("java"))
}

/// Parse Java source bytes.
pub fn parse_java(source: &[u8], path: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&java_language())
        .context("Failed to set parser language")?;

    parser
        .parse(source, None)
        .ok_or_else(|| ForkError::parse_error(path).into())
}

/// Maximum file size: 100 MB.
const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Zero-copy capable source buffer.
/// Uses mmap for files > 64KB (avoids copying), Vec<u8> for smaller files.
pub enum SourceBuf {
    Mmap(memmap2::Mmap),
    Vec(Vec<u8>),
}

impl SourceBuf {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            SourceBuf::Mmap(m) => m,
            SourceBuf::Vec(v) => v,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl std::ops::Deref for SourceBuf {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Read a file into a zero-copy buffer (mmap for large files, Vec for small).
pub fn read_file(path: &Utf8Path) -> Result<SourceBuf> {
    use std::fs::File;
    let file =
        File::open(path.as_std_path()).map_err(|_| ForkError::file_not_found(path.as_str()))?;
    let metadata = file.metadata()?;

    if metadata.len() == 0 {
        return Ok(SourceBuf::Vec(Vec::new()));
    }

    if metadata.len() > MAX_FILE_SIZE {
        anyhow::bail!(ForkError::new(
            ErrorCode::InvalidRequest,
            format!(
                "File too large ({} bytes > {} bytes): {}",
                metadata.len(),
                MAX_FILE_SIZE,
                path
            ),
        ));
    }

    if metadata.len() > 65536 {
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Ok(SourceBuf::Mmap(mmap))
    } else {
        use std::io::Read;
        let mut buf = Vec::with_capacity(metadata.len() as usize);
        let mut reader = std::io::BufReader::new(file);
        reader.read_to_end(&mut buf)?;
        Ok(SourceBuf::Vec(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn java_extension_detection() {
        assert!(is_java_path(Utf8Path::new("src/com/acme/Main.java")));
        assert!(is_java_path(Utf8Path::new("Legacy.JAVA")));
        assert!(!is_java_path(Utf8Path::new("build.gradle")));
        assert!(!is_java_path(Utf8Path::new("README")));
    }

    #[test]
    fn parse_simple_class() {
        let tree = parse_java(b"class A { void f() {} }", "A.java").unwrap();
        let root = tree.root_node();
        assert_eq!(root.kind(), "program");
        assert!(!root.has_error());
    }

    #[test]
    fn read_missing_file_is_file_not_found() {
        let err = read_file(Utf8Path::new("/nonexistent/Foo.java")).err().unwrap();
        let fe = err.downcast_ref::<ForkError>().unwrap();
        assert_eq!(fe.code, ErrorCode::FileNotFound);
    }

    #[test]
    fn read_empty_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("Empty.java");
        std::fs::write(&path, "").unwrap();
        let buf = read_file(Utf8Path::new(path.to_str().unwrap())).unwrap();
        assert!(buf.is_empty());
    }
}
