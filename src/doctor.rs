use serde::Serialize;

use crate::config::Config;
use crate::engine::{git, parser};

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub version: String,
    pub grammar: GrammarStatus,
    pub git: bool,
    pub clone_detector: CloneDetectorStatus,
    pub similarity_threshold: f64,
}

#[derive(Debug, Serialize)]
pub struct GrammarStatus {
    pub language: &'static str,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CloneDetectorStatus {
    /// `builtin` when no external tool is configured
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub available: bool,
}

/// Run the doctor check: Java grammar, `git`, and the clone detector.
pub fn run_doctor(config: &Config) -> DoctorReport {
    let available = check_grammar();
    let grammar = GrammarStatus {
        language: "java",
        available,
        parser_version: available.then(|| parser::java_language().abi_version().to_string()),
    };

    let clone_detector = match &config.clone_detector {
        Some(path) => CloneDetectorStatus {
            kind: "external",
            path: Some(path.display().to_string()),
            available: path.is_file(),
        },
        None => CloneDetectorStatus {
            kind: "builtin",
            path: None,
            available: true,
        },
    };

    DoctorReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        grammar,
        git: git::available(),
        clone_detector,
        similarity_threshold: config.similarity_threshold,
    }
}

fn check_grammar() -> bool {
    let mut parser = tree_sitter::Parser::new();
    parser.set_language(&parser::java_language()).is_ok()
}
