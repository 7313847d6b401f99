use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::engine::{parser, tokens};
use crate::error::{ErrorCode, ForkError};

/// Canonical, snapshot-independent key of a method:
/// `pkg.Outer.Inner.name(T1,T2[])`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodIdentity(String);

impl MethodIdentity {
    /// Wrap an already canonical signature (e.g. one printed by an external tool).
    pub fn from_signature(signature: impl Into<String>) -> Self {
        Self(signature.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&MethodSignature> for MethodIdentity {
    fn from(sig: &MethodSignature) -> Self {
        Self(format!(
            "{}.{}({})",
            sig.declaring_type,
            sig.name,
            sig.parameters.join(",")
        ))
    }
}

/// Structured form of a canonical signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Fully qualified declaring type, nested types joined with `.`
    pub declaring_type: String,
    pub name: String,
    /// Erased parameter types
    pub parameters: Vec<String>,
}

impl MethodSignature {
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        parameters: &[&str],
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Same signature relocated to another declaring type.
    pub fn in_type(&self, declaring_type: &str) -> Self {
        Self {
            declaring_type: declaring_type.to_string(),
            name: self.name.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// One method as extracted from one snapshot.
#[derive(Debug, Serialize)]
pub struct MethodModel {
    pub identity: MethodIdentity,
    pub signature: MethodSignature,
    pub file_path: Utf8PathBuf,
    /// Byte span of the declaration inside `file_path`
    pub span: Range<usize>,
    /// BLAKE3 of the declaration's comment-free token stream
    pub fingerprint: String,
    #[serde(skip)]
    pub body_tokens: Vec<String>,
    #[serde(skip)]
    text: OnceLock<String>,
}

impl MethodModel {
    pub fn new(
        signature: MethodSignature,
        file_path: Utf8PathBuf,
        span: Range<usize>,
        decl_tokens: &[String],
        body_tokens: Vec<String>,
    ) -> Self {
        Self {
            identity: MethodIdentity::from(&signature),
            signature,
            file_path,
            span,
            fingerprint: tokens::fingerprint(decl_tokens),
            body_tokens,
            text: OnceLock::new(),
        }
    }

    /// Build a model whose source text is already in memory.
    pub fn with_text(signature: MethodSignature, file_path: &str, text: &str) -> Self {
        let toks = tokens::split_words(text);
        let model = Self::new(
            signature,
            Utf8PathBuf::from(file_path),
            0..text.len(),
            &toks,
            toks.clone(),
        );
        let _ = model.text.set(text.to_string());
        model
    }

    /// Full source text of the declaration, read from disk on first use.
    pub fn source_text(&self) -> Result<&str> {
        if let Some(text) = self.text.get() {
            return Ok(text);
        }
        let text = read_span(&self.file_path, &self.span)?;
        Ok(self.text.get_or_init(|| text))
    }
}

fn read_span(path: &Utf8Path, span: &Range<usize>) -> Result<String> {
    let source = parser::read_file(path)?;
    let bytes = source.get(span.clone()).ok_or_else(|| {
        ForkError::new(
            ErrorCode::IoError,
            format!(
                "{path} changed since extraction (span {}..{} out of {} bytes)",
                span.start,
                span.end,
                source.len()
            ),
        )
    })?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// A method universe: every method of one source tree, keyed by identity,
/// plus the qualified-class index some detectors consult.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub root: Utf8PathBuf,
    pub methods: BTreeMap<MethodIdentity, MethodModel>,
    /// Qualified class name -> declaring file
    pub classes: BTreeMap<String, Utf8PathBuf>,
}

impl Snapshot {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Insert a method, registering its declaring type in the class index.
    /// Returns `false` (and keeps the first one) on a duplicate identity.
    pub fn insert(&mut self, method: MethodModel) -> bool {
        if self.methods.contains_key(&method.identity) {
            return false;
        }
        self.classes
            .entry(method.signature.declaring_type.clone())
            .or_insert_with(|| method.file_path.clone());
        self.methods.insert(method.identity.clone(), method);
        true
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn get(&self, id: &MethodIdentity) -> Option<&MethodModel> {
        self.methods.get(id)
    }

    pub fn contains(&self, id: &MethodIdentity) -> bool {
        self.methods.contains_key(id)
    }

    pub fn has_class(&self, qualified: &str) -> bool {
        self.classes.contains_key(qualified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_canonical_signature() {
        let sig = MethodSignature::new("com.acme.Outer.Inner", "run", &["int", "String[]"]);
        let id = MethodIdentity::from(&sig);
        assert_eq!(id.as_str(), "com.acme.Outer.Inner.run(int,String[])");
        assert_eq!(id, MethodIdentity::from_signature("com.acme.Outer.Inner.run(int,String[])"));
    }

    #[test]
    fn identity_without_parameters() {
        let sig = MethodSignature::new("Main", "main", &[]);
        assert_eq!(MethodIdentity::from(&sig).to_string(), "Main.main()");
    }

    #[test]
    fn in_type_keeps_name_and_parameters() {
        let sig = MethodSignature::new("a.Old", "f", &["long"]);
        let moved = sig.in_type("b.New");
        assert_eq!(MethodIdentity::from(&moved).as_str(), "b.New.f(long)");
    }

    #[test]
    fn source_text_is_lazily_read_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("A.java");
        let content = "class A { void f() { g(); } }";
        std::fs::write(&path, content).unwrap();

        let start = content.find("void").unwrap();
        let end = content.rfind('}').unwrap();
        let model = MethodModel::new(
            MethodSignature::new("A", "f", &[]),
            Utf8PathBuf::from(path.to_str().unwrap()),
            start..end,
            &[],
            Vec::new(),
        );

        assert_eq!(model.source_text().unwrap(), "void f() { g(); } ");
    }

    #[test]
    fn source_text_reports_stale_span() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("B.java");
        std::fs::write(&path, "class B {}").unwrap();

        let model = MethodModel::new(
            MethodSignature::new("B", "f", &[]),
            Utf8PathBuf::from(path.to_str().unwrap()),
            5..500,
            &[],
            Vec::new(),
        );

        assert!(model.source_text().is_err());
    }

    #[test]
    fn snapshot_keeps_first_duplicate() {
        let mut snap = Snapshot::new("/tmp/x");
        let sig = MethodSignature::new("p.A", "f", &[]);
        assert!(snap.insert(MethodModel::with_text(sig.clone(), "one/A.java", "void f() {}")));
        assert!(!snap.insert(MethodModel::with_text(sig.clone(), "two/A.java", "void f() {}")));

        let id = MethodIdentity::from(&sig);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get(&id).unwrap().file_path, "one/A.java");
        assert!(snap.has_class("p.A"));
    }
}
