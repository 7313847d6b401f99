//! Token streams, fingerprints and similarity for method bodies.

use std::collections::HashMap;

use tree_sitter::Node;

/// Comment-free leaf tokens of `node`.
pub fn leaf_tokens(node: Node<'_>, source: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    collect_leaves(node, source, &mut out);
    out
}

fn collect_leaves(node: Node<'_>, source: &[u8], out: &mut Vec<String>) {
    if node.kind().ends_with("comment") {
        return;
    }
    if node.child_count() == 0 {
        if let Ok(text) = node.utf8_text(source) {
            let text = text.trim();
            if !text.is_empty() {
                out.push(text.to_string());
            }
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_leaves(child, source, out);
    }
}

/// Split raw text into identifier/number runs and single punctuation marks.
pub fn split_words(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut word = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == '$' {
            word.push(ch);
            continue;
        }
        if !word.is_empty() {
            out.push(std::mem::take(&mut word));
        }
        if !ch.is_whitespace() {
            out.push(ch.to_string());
        }
    }
    if !word.is_empty() {
        out.push(word);
    }
    out
}

/// BLAKE3 over the token stream; layout and comments do not change it.
pub fn fingerprint(tokens: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    for tok in tokens {
        hasher.update(tok.as_bytes());
        hasher.update(&[0x1f]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Dice coefficient over token multisets, in `[0, 1]`.
pub fn similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tok in a {
        *counts.entry(tok.as_str()).or_insert(0) += 1;
    }
    let mut shared = 0usize;
    for tok in b {
        if let Some(n) = counts.get_mut(tok.as_str())
            && *n > 0
        {
            *n -= 1;
            shared += 1;
        }
    }
    (2 * shared) as f64 / (a.len() + b.len()) as f64
}
