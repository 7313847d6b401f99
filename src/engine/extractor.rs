//! Java method extraction: source tree -> `Snapshot`.

use std::path::Path;

use anyhow::{Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use tracing::{debug, warn};
use tree_sitter::Node;

use crate::engine::{parser, tokens};
use crate::error::{ErrorCode, ForkError};
use crate::models::method::{MethodModel, MethodSignature, Snapshot};

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

/// Methods and declared types of one file.
#[derive(Debug, Default)]
pub struct FileExtraction {
    pub classes: Vec<String>,
    pub methods: Vec<MethodModel>,
}

/// Extract every method below `root`.
///
/// Files are parsed in parallel and merged in path order, so the result is
/// deterministic. Unreadable files are skipped; on a duplicate identity the
/// first file in path order wins.
pub fn extract_snapshot(root: &Path) -> Result<Snapshot> {
    if !root.is_dir() {
        bail!(ForkError::new(
            ErrorCode::FileNotFound,
            format!("Directory not found: {}", root.display()),
        ));
    }
    let utf8_root = Utf8PathBuf::from_path_buf(root.to_path_buf()).map_err(|p| {
        ForkError::new(
            ErrorCode::InvalidRequest,
            format!("Non UTF-8 path: {}", p.display()),
        )
    })?;

    let files = collect_java_files(root)?;
    let extracted: Vec<(Utf8PathBuf, Result<FileExtraction>)> = files
        .par_iter()
        .map(|path| (path.clone(), extract_file(path)))
        .collect();

    let mut snapshot = Snapshot::new(utf8_root);
    for (path, result) in extracted {
        let extraction = match result {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %path, error = %e, "skipping unreadable source file");
                continue;
            }
        };
        for class in extraction.classes {
            snapshot.classes.entry(class).or_insert_with(|| path.clone());
        }
        for method in extraction.methods {
            let identity = method.identity.clone();
            if !snapshot.insert(method) {
                warn!(path = %path, method = %identity, "duplicate method identity ignored");
            }
        }
    }

    debug!(
        root = %root.display(),
        files = files.len(),
        methods = snapshot.len(),
        classes = snapshot.classes.len(),
        "extract_snapshot completed"
    );
    Ok(snapshot)
}

/// Collect `.java` files below `dir`, sorted. Hidden entries are skipped;
/// ignore files are not honored since snapshots are plain copies.
pub fn collect_java_files(dir: &Path) -> Result<Vec<Utf8PathBuf>> {
    use ignore::WalkBuilder;

    let mut builder = WalkBuilder::new(dir);
    builder
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false);

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = entry?;
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        match Utf8PathBuf::from_path_buf(entry.into_path()) {
            Ok(path) if parser::is_java_path(&path) => files.push(path),
            Ok(_) => {}
            Err(path) => warn!(path = %path.display(), "skipping non UTF-8 path"),
        }
    }
    files.sort();
    Ok(files)
}

pub fn extract_file(path: &Utf8Path) -> Result<FileExtraction> {
    let source = parser::read_file(path)?;
    extract_source(&source, path)
}

/// Extract methods from in-memory Java source attributed to `path`.
pub fn extract_source(source: &[u8], path: &Utf8Path) -> Result<FileExtraction> {
    let tree = parser::parse_java(source, path.as_str())?;
    let root = tree.root_node();
    if root.has_error() {
        debug!(path = %path, "source has syntax errors; extracting what parsed");
    }

    let mut walker = Walker {
        source,
        path,
        out: FileExtraction::default(),
    };
    let package = package_name(root, source);
    for child in named_children(root) {
        if TYPE_DECLARATIONS.contains(&child.kind()) {
            walker.visit_type(child, package.as_deref());
        }
    }
    Ok(walker.out)
}

struct Walker<'a> {
    source: &'a [u8],
    path: &'a Utf8Path,
    out: FileExtraction,
}

impl Walker<'_> {
    fn visit_type(&mut self, node: Node<'_>, outer: Option<&str>) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };
        let qualified = match outer {
            Some(o) if !o.is_empty() => format!("{o}.{name}"),
            _ => name,
        };
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_body(body, &qualified);
        }
        self.out.classes.push(qualified);
    }

    // Method bodies are not entered: local and anonymous classes have no
    // stable identity across snapshots.
    fn visit_body(&mut self, body: Node<'_>, owner: &str) {
        for child in named_children(body) {
            match child.kind() {
                "method_declaration"
                | "constructor_declaration"
                | "compact_constructor_declaration" => {
                    if let Some(method) = self.method(child, owner) {
                        self.out.methods.push(method);
                    }
                }
                "enum_body_declarations" => self.visit_body(child, owner),
                kind if TYPE_DECLARATIONS.contains(&kind) => self.visit_type(child, Some(owner)),
                _ => {}
            }
        }
    }

    fn method(&self, node: Node<'_>, owner: &str) -> Option<MethodModel> {
        let name = field_text(node, "name", self.source)?;
        let parameters = parameter_list(node)
            .map(|p| erase_parameters(p, self.source))
            .unwrap_or_default();
        let signature = MethodSignature {
            declaring_type: owner.to_string(),
            name,
            parameters,
        };
        let decl_tokens = tokens::leaf_tokens(node, self.source);
        let body_tokens = node
            .child_by_field_name("body")
            .map(|b| tokens::leaf_tokens(b, self.source))
            .unwrap_or_default();
        Some(MethodModel::new(
            signature,
            self.path.to_owned(),
            node.byte_range(),
            &decl_tokens,
            body_tokens,
        ))
    }
}

/// A compact constructor takes the record header's components.
fn parameter_list(node: Node<'_>) -> Option<Node<'_>> {
    if node.kind() == "compact_constructor_declaration" {
        let record = node.parent()?.parent()?;
        return record.child_by_field_name("parameters");
    }
    node.child_by_field_name("parameters")
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn field_text(node: Node<'_>, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)?
        .utf8_text(source)
        .ok()
        .map(|s| s.trim().to_string())
}

fn package_name(root: Node<'_>, source: &[u8]) -> Option<String> {
    let decl = named_children(root)
        .into_iter()
        .find(|c| c.kind() == "package_declaration")?;
    let name = named_children(decl)
        .into_iter()
        .find(|c| c.kind() == "scoped_identifier" || c.kind() == "identifier")?;
    let text = name.utf8_text(source).ok()?;
    Some(text.chars().filter(|c| !c.is_whitespace()).collect())
}

fn erase_parameters(params: Node<'_>, source: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    for param in named_children(params) {
        match param.kind() {
            "formal_parameter" => {
                let Some(ty) = param.child_by_field_name("type") else {
                    continue;
                };
                let mut erased = erase_type(ty.utf8_text(source).unwrap_or(""));
                // `String args[]`
                if let Some(dims) = param.child_by_field_name("dimensions") {
                    let count = dims.utf8_text(source).unwrap_or("").matches('[').count();
                    erased.push_str(&"[]".repeat(count));
                }
                out.push(erased);
            }
            "spread_parameter" => {
                let ty = named_children(param).into_iter().find(|c| {
                    !matches!(
                        c.kind(),
                        "modifiers" | "variable_declarator" | "annotation" | "marker_annotation"
                    )
                });
                if let Some(ty) = ty {
                    let mut erased = erase_type(ty.utf8_text(source).unwrap_or(""));
                    erased.push_str("[]");
                    out.push(erased);
                }
            }
            _ => {}
        }
    }
    out
}

/// Erase a written type: drop generic arguments, type annotations and
/// whitespace. `Map.Entry<K, List<V>> []` -> `Map.Entry[]`.
pub fn erase_type(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            '@' if depth == 0 => {
                i += 1;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$' | '.'))
                {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_whitespace() {
                    i += 1;
                }
                if i < chars.len() && chars[i] == '(' {
                    let mut parens = 0usize;
                    while i < chars.len() {
                        match chars[i] {
                            '(' => parens += 1,
                            ')' => {
                                parens -= 1;
                                if parens == 0 {
                                    i += 1;
                                    break;
                                }
                            }
                            _ => {}
                        }
                        i += 1;
                    }
                }
                continue;
            }
            c if c.is_whitespace() => {}
            c if depth == 0 => out.push(c),
            _ => {}
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::method::MethodIdentity;

    fn signatures(src: &str) -> Vec<String> {
        let ex = extract_source(src.as_bytes(), Utf8Path::new("T.java")).unwrap();
        ex.methods
            .iter()
            .map(|m| m.identity.as_str().to_string())
            .collect()
    }

    #[test]
    fn erase_type_drops_generics_and_annotations() {
        assert_eq!(erase_type("List<String>"), "List");
        assert_eq!(erase_type("Map.Entry<K, List<V>> []"), "Map.Entry[]");
        assert_eq!(erase_type("@NonNull String"), "String");
        assert_eq!(erase_type("@Size(max = 3) int[][]"), "int[][]");
        assert_eq!(erase_type("java.util.Map<String,Integer>"), "java.util.Map");
    }

    #[test]
    fn packaged_class_methods_and_constructor() {
        let src = r#"
package com.acme.app;

import java.util.List;

public class Store<T> {
    public Store(int capacity) {}
    public void put(List<T> items, String... tags) {}
    static int size(final String names[]) { return names.length; }
}
"#;
        assert_eq!(
            signatures(src),
            vec![
                "com.acme.app.Store.Store(int)",
                "com.acme.app.Store.put(List,String[])",
                "com.acme.app.Store.size(String[])",
            ]
        );
    }

    #[test]
    fn nested_types_and_enums() {
        let src = r#"
package p;
interface Api { void call(); }
enum Mode {
    ON { void flip() {} },
    OFF;
    boolean enabled() { return this == ON; }
    static class Helper { int help(long x) { return 0; } }
}
"#;
        assert_eq!(
            signatures(src),
            vec!["p.Api.call()", "p.Mode.enabled()", "p.Mode.Helper.help(long)"]
        );
    }

    #[test]
    fn compact_constructor_takes_record_components() {
        let src = r#"
package geo;
record Point(int x, java.util.List<String> tags) {
    Point { if (x < 0) throw new IllegalArgumentException(); }
    int sum() { return x; }
}
"#;
        assert_eq!(
            signatures(src),
            vec!["geo.Point.Point(int,java.util.List)", "geo.Point.sum()"]
        );
        let ex = extract_source(src.as_bytes(), Utf8Path::new("Point.java")).unwrap();
        assert!(!ex.methods[0].body_tokens.is_empty());
    }

    #[test]
    fn anonymous_and_local_classes_are_skipped() {
        let src = r#"
class Outer {
    Runnable make() {
        class Local { void inner() {} }
        return new Runnable() { public void run() {} };
    }
}
"#;
        assert_eq!(signatures(src), vec!["Outer.make()"]);
    }

    #[test]
    fn comments_do_not_change_fingerprint() {
        let a = "class A { int f() { return 1; } }";
        let b = "class A {\n  // doc\n  int f() {\n    /* x */ return 1;\n  }\n}";
        let ea = extract_source(a.as_bytes(), Utf8Path::new("A.java")).unwrap();
        let eb = extract_source(b.as_bytes(), Utf8Path::new("A.java")).unwrap();
        assert_eq!(ea.methods[0].fingerprint, eb.methods[0].fingerprint);
        assert_eq!(ea.methods[0].body_tokens, vec!["{", "return", "1", ";", "}"]);
    }

    #[test]
    fn snapshot_from_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let pkg = dir.path().join("src").join("p");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(pkg.join("A.java"), "package p; class A { void f() {} }").unwrap();
        std::fs::write(pkg.join("B.java"), "package p; class B { void g(int x) {} }").unwrap();
        std::fs::write(pkg.join("notes.txt"), "class C { void h() {} }").unwrap();
        std::fs::write(pkg.join("Empty.java"), "package p; class Empty {}").unwrap();

        let snap = extract_snapshot(dir.path()).unwrap();
        assert_eq!(snap.len(), 2);
        assert!(snap.contains(&MethodIdentity::from_signature("p.A.f()")));
        assert!(snap.contains(&MethodIdentity::from_signature("p.B.g(int)")));
        assert!(snap.has_class("p.Empty"));

        let f = snap
            .get(&MethodIdentity::from_signature("p.A.f()"))
            .unwrap();
        assert_eq!(f.source_text().unwrap(), "void f() {}");
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(extract_snapshot(Path::new("/nonexistent/fork-sight/tree")).is_err());
    }
}
